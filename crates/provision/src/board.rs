//! Progress board: registry + sink.
//!
//! Every status change re-renders the registry and re-sends it under the
//! registry's fixed correlation id, so the destination shows one message
//! that updates in place. Delivery failures are logged and never fail the
//! run; the board is best-effort reporting, not a step.

use std::sync::Arc;

use chat::{Destination, MessageSink, OutboundMessage};
use tracing::warn;

use crate::error::RegistryError;
use crate::registry::{TaskRegistry, TaskStatus};

/// Renders a [`TaskRegistry`] to a message destination.
pub struct ProgressBoard {
    registry: TaskRegistry,
    sink: Arc<dyn MessageSink>,
    destination: Destination,
}

impl ProgressBoard {
    /// Create a board over a fresh registry.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        sink: Arc<dyn MessageSink>,
        destination: Destination,
    ) -> Self {
        Self {
            registry: TaskRegistry::new(title),
            sink,
            destination,
        }
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Register a Pending task. Does not publish; tasks are added while
    /// the pipeline is being set up, before the first display.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateKey`] on key reuse.
    pub fn add_task(
        &mut self,
        key: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), RegistryError> {
        self.registry.add_task(key, description)
    }

    /// Render and send the current board.
    pub async fn publish(&self) {
        let message = OutboundMessage {
            destination: self.destination.clone(),
            correlation_id: self.registry.correlation_id(),
            body: self.registry.render(),
        };

        if let Err(e) = self.sink.post(&message).await {
            warn!(
                sink = self.sink.name(),
                correlation_id = %message.correlation_id,
                error = %e,
                "Failed to publish progress board"
            );
        }
    }

    /// Update one task's status and republish if anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownKey`] if the task was never added.
    pub async fn set_status(&mut self, key: &str, status: TaskStatus) -> Result<(), RegistryError> {
        if self.registry.set_status(key, status)? {
            self.publish().await;
        }
        Ok(())
    }

    /// Fail every still-Pending task and republish once. Idempotent: a
    /// second call changes nothing and sends nothing.
    pub async fn fail_remaining(&mut self) {
        if self.registry.fail_remaining() > 0 {
            self.publish().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chat::SinkError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn post(&self, message: &OutboundMessage) -> Result<(), SinkError> {
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl MessageSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn post(&self, _message: &OutboundMessage) -> Result<(), SinkError> {
            Err(SinkError::NotConfigured("test".to_string()))
        }
    }

    fn board(sink: Arc<dyn MessageSink>) -> ProgressBoard {
        let mut board = ProgressBoard::new(
            "Provisioning team-a dev",
            sink,
            Destination::Channel("team-a".to_string()),
        );
        board.add_task("namespace", "Create namespace").unwrap();
        board.add_task("rollout", "Roll out deployment").unwrap();
        board
    }

    #[tokio::test]
    async fn test_every_publish_reuses_the_correlation_id() {
        let sink = Arc::new(RecordingSink::default());
        let mut board = board(sink.clone());

        board.publish().await;
        board
            .set_status("namespace", TaskStatus::Successful)
            .await
            .unwrap();
        board.fail_remaining().await;

        let messages = sink.messages.lock().unwrap();
        assert_eq!(messages.len(), 3);
        let id = messages[0].correlation_id;
        assert!(messages.iter().all(|m| m.correlation_id == id));
    }

    #[tokio::test]
    async fn test_unchanged_status_does_not_republish() {
        let sink = Arc::new(RecordingSink::default());
        let mut board = board(sink.clone());

        board
            .set_status("namespace", TaskStatus::Successful)
            .await
            .unwrap();
        board
            .set_status("namespace", TaskStatus::Successful)
            .await
            .unwrap();

        assert_eq!(sink.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_remaining_publishes_once_then_never_again() {
        let sink = Arc::new(RecordingSink::default());
        let mut board = board(sink.clone());

        board.fail_remaining().await;
        board.fail_remaining().await;

        let messages = sink.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].body.contains("❌ Create namespace"));
        assert!(messages[0].body.contains("❌ Roll out deployment"));
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_poison_the_board() {
        let mut board = board(Arc::new(FailingSink));

        board
            .set_status("namespace", TaskStatus::Successful)
            .await
            .unwrap();

        assert_eq!(
            board.registry().status("namespace"),
            Some(TaskStatus::Successful)
        );
    }
}
