//! Error types for Beacon.

/// Top-level error type for the onboarding pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Job queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue backend cannot accept or report work at all.
    #[error("Job queue not available")]
    Unavailable,

    #[error("Queue storage failed: {0}")]
    Storage(String),

    #[error("Unknown job hook: {0}")]
    UnknownHook(String),

    #[error("Invalid arguments for hook {hook}: {reason}")]
    InvalidArgs { hook: String, reason: String },
}

/// Remote Beacon API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing Beacon API key.")]
    MissingApiKey,

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("{message}")]
    Unauthorized { code: u16, message: String },

    #[error("{message}")]
    Status { code: u16, message: String },

    #[error("Invalid response from Beacon API.")]
    Protocol { code: u16 },

    #[error("{message}")]
    Rejected { code: u16, message: String },
}

impl ApiError {
    /// HTTP status associated with the failure (0 when no response was received).
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingApiKey => 401,
            Self::Transport(_) => 0,
            Self::Unauthorized { code, .. }
            | Self::Status { code, .. }
            | Self::Protocol { code }
            | Self::Rejected { code, .. } => *code,
        }
    }

    /// Whether the remote side refused our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::MissingApiKey | Self::Unauthorized { .. })
    }
}

/// Report generation errors.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Site field '{0}' is not configured")]
    MissingSiteField(&'static str),

    #[error("Failed to encode report JSON: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Pipeline request errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid report key: type={report_type:?} version={version}")]
    InvalidReportKey { report_type: String, version: u32 },
}

/// Result type alias for the pipeline.
pub type Result<T> = std::result::Result<T, Error>;
