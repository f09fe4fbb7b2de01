//! Chat message sinks for Subatomic.
//!
//! A provisioning run reports progress through a [`MessageSink`]: one
//! rendered message body, re-sent under a stable correlation identifier so
//! the destination shows a single, continuously updated status board rather
//! than a growing transcript.
//!
//! # Usage
//!
//! ```no_run
//! use chat::{CorrelationId, Destination, MessageSink, OutboundMessage, WebhookSink};
//!
//! # async fn demo() -> Result<(), chat::SinkError> {
//! let sink = WebhookSink::new("https://chat.example.com/api".to_string());
//! let correlation_id = CorrelationId::new();
//!
//! sink.post(&OutboundMessage {
//!     destination: Destination::Channel("team-a".to_string()),
//!     correlation_id,
//!     body: "▢ Create namespace".to_string(),
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`MessageSink`] is the capability trait the provisioning core consumes
//! - [`WebhookSink`] upserts messages against a chat gateway over HTTP
//! - [`ConsoleSink`] prints the board to the terminal for local runs

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod console;
pub mod error;
pub mod message;
pub mod webhook;

pub use console::ConsoleSink;
pub use error::SinkError;
pub use message::{CorrelationId, Destination, OutboundMessage};
pub use webhook::WebhookSink;

use async_trait::async_trait;

/// Trait for outbound message destinations (chat gateway, console, etc.).
///
/// Implementations must treat the correlation identifier as the message
/// identity: posting twice with the same id updates the earlier message
/// instead of appending a new one, where the medium allows it.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Get the name of this sink.
    fn name(&self) -> &'static str;

    /// Deliver (or update) a message.
    async fn post(&self, message: &OutboundMessage) -> Result<(), SinkError>;
}
