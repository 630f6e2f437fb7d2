//! Remote Beacon API client.
//!
//! Every request is a JSON POST under `<base>/beacon/<version>/`, carries a
//! bearer token, and has the client meta merged into its body. Responses
//! are mapped onto [`ApiError`] the same way for every endpoint.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{Map, Value};

use crate::config::ApiConfig;
use crate::error::ApiError;

/// Maximum redirects followed per request.
const MAX_REDIRECTS: usize = 3;

/// A successful (2xx, `ok` not false) API response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub code: u16,
    pub message: Option<String>,
    pub data: Map<String, Value>,
}

/// Remote endpoint accepting report submissions.
#[async_trait]
pub trait SubmissionApi: Send + Sync {
    async fn submit_report(&self, body: &Value) -> Result<ApiResponse, ApiError>;
}

/// HTTP client for the Beacon API.
pub struct ApiClient {
    config: ApiConfig,
    site_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: ApiConfig, site_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(format!("Beacon/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            site_url: site_url.into(),
            client,
        })
    }

    /// Full URL for an API path.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/beacon/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_version,
            path.trim_start_matches('/')
        )
    }

    /// Check the configured key against the backend.
    pub async fn verify_api_key(&self) -> Result<ApiResponse, ApiError> {
        self.post("verify-api-key", Value::Object(Map::new())).await
    }

    /// Merge client meta into `body`. Meta wins over caller-supplied keys.
    fn with_client_meta(&self, body: Value) -> Value {
        let mut map = match body {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("payload".into(), other);
                map
            }
        };
        map.insert("site_url".into(), Value::String(self.site_url.clone()));
        map.insert(
            "producer_version".into(),
            Value::String(env!("CARGO_PKG_VERSION").to_string()),
        );
        map.insert(
            "producer_os".into(),
            Value::String(std::env::consts::OS.to_string()),
        );
        Value::Object(map)
    }

    async fn post(&self, path: &str, body: Value) -> Result<ApiResponse, ApiError> {
        let Some(api_key) = self.config.api_key.as_ref() else {
            return Err(ApiError::MissingApiKey);
        };

        let url = self.endpoint(path);
        let body = self.with_client_meta(body);

        tracing::debug!(url = %url, "Beacon API request");

        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let code = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        interpret_response(code, &text)
    }
}

#[async_trait]
impl SubmissionApi for ApiClient {
    async fn submit_report(&self, body: &Value) -> Result<ApiResponse, ApiError> {
        self.post("reports/submit", body.clone()).await
    }
}

/// Map a raw status and body onto the API result.
pub fn interpret_response(code: u16, body: &str) -> Result<ApiResponse, ApiError> {
    let data = if body.trim().is_empty() {
        Map::new()
    } else {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => map,
            _ => return Err(ApiError::Protocol { code }),
        }
    };

    let message = data
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string);

    if code == 401 || code == 403 {
        return Err(ApiError::Unauthorized {
            code,
            message: message.unwrap_or_else(|| "Unauthorized.".to_string()),
        });
    }

    if !(200..300).contains(&code) {
        return Err(ApiError::Status {
            code,
            message: message.unwrap_or_else(|| format!("Beacon API error ({code}).")),
        });
    }

    if data.get("ok").and_then(Value::as_bool) == Some(false) {
        return Err(ApiError::Rejected {
            code,
            message: message.unwrap_or_else(|| "Report submission failed.".to_string()),
        });
    }

    Ok(ApiResponse {
        code,
        message,
        data,
    })
}
