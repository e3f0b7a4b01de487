//! Error types for applicant-sync.

/// Configuration-related errors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Outbound channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Channel {name} is not configured")]
    NotConfigured { name: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} is disabled")]
    Disabled { provider: String },
}

/// Why a model-assisted extraction attempt produced nothing usable.
///
/// Kept separate from `LlmError` so callers can tell a service that could not
/// be reached from one that answered with something unparseable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("extraction service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("extraction response malformed: {0}")]
    MalformedResponse(String),

    /// No service configured; not a fault and never retried.
    #[error("extraction service disabled")]
    Disabled,
}

/// Spreadsheet store errors.
#[derive(Debug, thiserror::Error)]
pub enum SheetsError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Request to {operation} failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response from {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    #[error("Partition not found: {0}")]
    PartitionNotFound(String),
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Sheet write failed: {0}")]
    SheetWrite(#[from] SheetsError),
}
