//! Outbound message types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque message identity.
///
/// Every `post` for one provisioning run carries the same correlation id,
/// which is what lets the gateway edit the earlier message in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a message is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// A shared channel, by name.
    Channel(String),
    /// A set of users, by handle.
    Users(Vec<String>),
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Channel(name) => write!(f, "#{name}"),
            Self::Users(handles) => write!(f, "@{}", handles.join(", @")),
        }
    }
}

/// One rendered message, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Destination channel or users.
    pub destination: Destination,
    /// Stable message identity for in-place updates.
    pub correlation_id: CorrelationId,
    /// Rendered message body.
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_ids_are_unique() {
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }

    #[test]
    fn test_destination_display() {
        let channel = Destination::Channel("team-a".to_string());
        assert_eq!(channel.to_string(), "#team-a");

        let users = Destination::Users(vec!["jo".to_string(), "sam".to_string()]);
        assert_eq!(users.to_string(), "@jo, @sam");
    }

    #[test]
    fn test_message_round_trips_as_json() {
        let message = OutboundMessage {
            destination: Destination::Channel("ops".to_string()),
            correlation_id: CorrelationId::new(),
            body: "✅ Done".to_string(),
        };

        let json = serde_json::to_string(&message).unwrap();
        let parsed: OutboundMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, message);
    }
}
