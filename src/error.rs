use std::path::PathBuf;
use thiserror::Error;

/// Failures while decoding or encoding broker frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON frame: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Serialization failed: {0}")]
    SerializationError(#[source] serde_json::Error),
}

/// Failures while assembling a [`LinkConfig`](crate::config::LinkConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// Transport-level failures reported by a broker connection.
///
/// These never escape the link; they are logged and the connection is
/// treated as closed.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
}
