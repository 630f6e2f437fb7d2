//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::reports::SiteInfo;

/// Remote Beacon API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL without the `/beacon/<version>` prefix.
    pub base_url: String,
    /// API version path segment.
    pub api_version: String,
    /// Bearer token. `None` until the site has been connected.
    pub api_key: Option<SecretString>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.digitalroyalty.io".to_string(),
            api_version: "v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(15),
        }
    }
}

/// Background queue worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Job-queue group owned by this pipeline.
    pub group: String,
    /// How often the worker polls for pending jobs.
    pub poll_interval: Duration,
    /// Maximum jobs processed per tick.
    pub batch: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            group: "beacon".to_string(),
            poll_interval: Duration::from_secs(5),
            batch: 10,
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct BeaconConfig {
    pub api: ApiConfig,
    pub worker: WorkerConfig,
    pub site: SiteInfo,
    /// libSQL database file.
    pub db_path: String,
    /// HTTP listen port for the operator API.
    pub port: u16,
}

impl BeaconConfig {
    /// Build configuration from `BEACON_*` environment variables.
    pub fn from_env() -> Self {
        let api_defaults = ApiConfig::default();
        let worker_defaults = WorkerConfig::default();

        let api_key = std::env::var("BEACON_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(SecretString::from);

        let timeout_secs = positive_secs(std::env::var("BEACON_HTTP_TIMEOUT_SECS").ok(), 15);
        let poll_secs = positive_secs(std::env::var("BEACON_WORKER_INTERVAL_SECS").ok(), 5);

        let batch: usize = std::env::var("BEACON_WORKER_BATCH")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|b| *b > 0)
            .unwrap_or(worker_defaults.batch);

        Self {
            api: ApiConfig {
                base_url: std::env::var("BEACON_API_BASE")
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or(api_defaults.base_url),
                api_version: std::env::var("BEACON_API_VERSION")
                    .unwrap_or(api_defaults.api_version),
                api_key,
                timeout: Duration::from_secs(timeout_secs),
            },
            worker: WorkerConfig {
                group: std::env::var("BEACON_QUEUE_GROUP").unwrap_or(worker_defaults.group),
                poll_interval: Duration::from_secs(poll_secs),
                batch,
            },
            site: SiteInfo {
                name: std::env::var("BEACON_SITE_NAME").unwrap_or_default(),
                description: std::env::var("BEACON_SITE_DESCRIPTION").unwrap_or_default(),
                url: std::env::var("BEACON_SITE_URL").unwrap_or_default(),
            },
            db_path: std::env::var("BEACON_DB_PATH")
                .unwrap_or_else(|_| "./data/beacon.db".to_string()),
            port: std::env::var("BEACON_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site.url.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar("BEACON_SITE_URL".to_string()));
        }
        let base = &self.api.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "BEACON_API_BASE".to_string(),
                message: format!("expected an http(s) URL, got '{base}'"),
            });
        }
        if self.api.api_version.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "BEACON_API_VERSION".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.worker.group.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "BEACON_QUEUE_GROUP".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.db_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "BEACON_DB_PATH".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse a whole number of seconds; zero, negative or garbage input falls
/// back to `default`.
fn positive_secs(raw: Option<String>, default: u64) -> u64 {
    raw.and_then(|s| s.trim().parse().ok())
        .filter(|s| *s > 0)
        .unwrap_or(default)
}
