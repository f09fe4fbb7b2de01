//! Console message sink.
//!
//! Prints the board to stdout for local runs. A terminal cannot edit
//! earlier output, so each publish reprints the full board under a short
//! header carrying the correlation id.

use async_trait::async_trait;
use colored::Colorize;

use crate::error::SinkError;
use crate::message::OutboundMessage;
use crate::MessageSink;

/// Terminal sink for local provisioning runs.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    /// Create a console sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageSink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn post(&self, message: &OutboundMessage) -> Result<(), SinkError> {
        let header = format!(
            "── {} · {} ──",
            message.destination,
            message.correlation_id
        );
        println!("{}", header.bright_black());
        println!("{}", message.body);
        Ok(())
    }
}
