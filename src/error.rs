//! Error types for health-sync.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Biometric source error: {0}")]
    Biometric(#[from] BiometricError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors, shared by the file and libSQL stores.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote file store errors (listing, folder resolution, download, upload).
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Folder not found: '{segment}' under parent {parent}")]
    FolderNotFound { segment: String, parent: String },

    #[error("Ambiguous folder: several '{segment}' folders under parent {parent}")]
    AmbiguousFolder { segment: String, parent: String },

    #[error("Remote request failed: {0}")]
    Http(String),

    #[error("Remote API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response from remote store: {0}")]
    InvalidResponse(String),
}

/// Text extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("Unsupported content type: {0}")]
    Unsupported(String),
}

/// Wearable API errors.
#[derive(Debug, thiserror::Error)]
pub enum BiometricError {
    #[error("Biometric request failed: {0}")]
    Http(String),

    #[error("Biometric API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid biometric payload: {0}")]
    InvalidPayload(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Report delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Pipeline-level errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Scan failed: {0}")]
    Scan(String),

    #[error("Invalid schedule: {0}")]
    Schedule(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
