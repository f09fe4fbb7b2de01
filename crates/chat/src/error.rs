//! Error types for message sinks.

use thiserror::Error;

/// Errors that can occur when delivering a message.
#[derive(Debug, Error)]
pub enum SinkError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway rejected the message
    #[error("gateway rejected message with status {status}: {detail}")]
    Rejected { status: u16, detail: String },

    /// Sink is not configured
    #[error("sink not configured: {0}")]
    NotConfigured(String),
}
