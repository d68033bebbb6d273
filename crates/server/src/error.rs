use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Rejected target fields. Returned to the caller as-is, never logged as a fault.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Target name is required")]
    EmptyName,
    #[error("Target address is required")]
    EmptyAddress,
    #[error("Unsupported protocol '{0}' (expected http, tcp or ping)")]
    UnsupportedProtocol(String),
    #[error("Target id is required for an update")]
    MissingId,
    #[error("Unknown target: {0}")]
    UnknownTarget(String),
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("{0}")]
    Transport(String),
    #[error("Ping failed")]
    Ping,
    #[error("unsupported protocol '{0}'")]
    Unsupported(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("No outbound SMTP host configured")]
    NotConfigured,
    #[error("No recipient email configured")]
    MissingRecipient,
    #[error("Invalid address '{0}'")]
    Address(String),
    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    #[error("Failed to bind mail listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("Mail listener I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Mail relay timed out after {0:?}")]
    Timeout(Duration),
}

impl RelayError {
    /// Whether the failure came from the caller's configuration rather than the network.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RelayError::NotConfigured | RelayError::MissingRecipient | RelayError::Address(_)
        )
    }
}
