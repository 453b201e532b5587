//! Common error types for the telemetry/command hub

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Unknown procedure: {0}")]
    UnknownProcedure(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Remote error ({kind}): {message}")]
    Remote { kind: ErrorKind, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wire-level failure classification, carried in RPC error responses so the
/// consumer proxy can map a failure back to a typed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownProcedure,
    InvalidArgs,
    UpstreamUnavailable,
    Internal,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::UnknownProcedure => "unknown_procedure",
            ErrorKind::InvalidArgs => "invalid_args",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HubError {
    /// Classification used when this error crosses the consumer wire.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HubError::UnknownProcedure(_) => ErrorKind::UnknownProcedure,
            HubError::InvalidArgs(_) => ErrorKind::InvalidArgs,
            HubError::Upstream(_) | HubError::Io(_) | HubError::ConnectionClosed => {
                ErrorKind::UpstreamUnavailable
            }
            HubError::Remote { kind, .. } => *kind,
            _ => ErrorKind::Internal,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, HubError>;
