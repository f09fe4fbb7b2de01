//! Webhook message sink.
//!
//! Delivers messages to a chat gateway over HTTP. Messages are upserted by
//! correlation id (`PUT /messages/{id}`), so re-posting with the same id
//! edits the existing chat message instead of adding a new one.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::SinkError;
use crate::message::{Destination, OutboundMessage};
use crate::MessageSink;

/// Environment variable for the gateway base URL.
const ENV_WEBHOOK_URL: &str = "SUBATOMIC_WEBHOOK_URL";

/// Chat gateway webhook sink.
pub struct WebhookSink {
    base_url: Option<String>,
    client: reqwest::Client,
}

/// Wire payload for a message upsert.
#[derive(Serialize)]
struct UpsertPayload<'a> {
    destination: &'a Destination,
    text: &'a str,
}

impl WebhookSink {
    /// Create a webhook sink from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = std::env::var(ENV_WEBHOOK_URL).ok();

        if base_url.is_some() {
            debug!("Webhook sink enabled");
        } else {
            debug!("Webhook sink disabled ({ENV_WEBHOOK_URL} not set)");
        }

        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Create a webhook sink for a specific gateway base URL.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: Some(base_url.trim_end_matches('/').to_string()),
            client: reqwest::Client::new(),
        }
    }

    /// Check if this sink has a gateway configured.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.base_url.is_some()
    }
}

#[async_trait]
impl MessageSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn post(&self, message: &OutboundMessage) -> Result<(), SinkError> {
        let base_url = self
            .base_url
            .as_ref()
            .ok_or_else(|| SinkError::NotConfigured(ENV_WEBHOOK_URL.to_string()))?;

        let url = format!("{base_url}/messages/{}", message.correlation_id);
        let payload = UpsertPayload {
            destination: &message.destination,
            text: &message.body,
        };

        let response = self.client.put(&url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        debug!(correlation_id = %message.correlation_id, "Message delivered");
        Ok(())
    }
}
