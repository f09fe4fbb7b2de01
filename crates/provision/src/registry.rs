//! Task registry: the user-visible record of one provisioning run.
//!
//! A registry is scoped to a single run and discarded after it. Tasks are
//! keyed, insertion-ordered, and never deleted; only the orchestrator
//! mutates their status.

use std::collections::HashMap;

use chat::CorrelationId;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Status of one tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not yet executed (or still executing).
    Pending,
    /// Completed successfully.
    Successful,
    /// Failed, or abandoned because the run aborted.
    Failed,
}

impl TaskStatus {
    /// Glyph used when rendering the status board.
    #[must_use]
    pub fn glyph(self) -> &'static str {
        match self {
            Self::Pending => "▢",
            Self::Successful => "✅",
            Self::Failed => "❌",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Successful => write!(f, "successful"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One discrete unit of provisioning work, tracked for user visibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    key: String,
    description: String,
    status: TaskStatus,
}

impl Task {
    /// Unique key within the owning registry.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Human-readable label.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status
    }
}

/// Ordered mapping from task key to task, owned by one provisioning run.
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    title: String,
    correlation_id: CorrelationId,
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
}

impl TaskRegistry {
    /// Create an empty registry with a fresh correlation id.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            correlation_id: CorrelationId::new(),
            tasks: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Registry-level title, shown above the task lines.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Correlation id under which every render of this registry is sent.
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Register a new Pending task.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateKey`] if `key` is already present.
    /// Re-adding a key would hide a pipeline construction bug, so it fails
    /// fast instead of overwriting.
    pub fn add_task(
        &mut self,
        key: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let key = key.into();
        if self.index.contains_key(&key) {
            return Err(RegistryError::DuplicateKey(key));
        }

        self.index.insert(key.clone(), self.tasks.len());
        self.tasks.push(Task {
            key,
            description: description.into(),
            status: TaskStatus::Pending,
        });
        Ok(())
    }

    /// Update the status of one task.
    ///
    /// Returns whether the status actually changed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownKey`] if `key` was never added.
    pub fn set_status(&mut self, key: &str, status: TaskStatus) -> Result<bool, RegistryError> {
        let idx = *self
            .index
            .get(key)
            .ok_or_else(|| RegistryError::UnknownKey(key.to_string()))?;

        let task = &mut self.tasks[idx];
        if task.status == status {
            return Ok(false);
        }
        task.status = status;
        Ok(true)
    }

    /// Current status of a task, if registered.
    #[must_use]
    pub fn status(&self, key: &str) -> Option<TaskStatus> {
        self.index.get(key).map(|&idx| self.tasks[idx].status)
    }

    /// Set every still-Pending task to Failed in one pass.
    ///
    /// Returns the number of tasks that changed; calling it again is a
    /// no-op. Successful tasks are never touched.
    pub fn fail_remaining(&mut self) -> usize {
        let mut changed = 0;
        for task in &mut self.tasks {
            if task.status == TaskStatus::Pending {
                task.status = TaskStatus::Failed;
                changed += 1;
            }
        }
        changed
    }

    /// Whether any task is still Pending.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.tasks.iter().any(|t| t.status == TaskStatus::Pending)
    }

    /// Tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Render the registry as one message body: the title, then one
    /// `{glyph} {description}` line per task in insertion order.
    #[must_use]
    pub fn render(&self) -> String {
        let mut body = String::with_capacity(self.title.len() + self.tasks.len() * 32);
        body.push_str(&self.title);
        for task in &self.tasks {
            body.push('\n');
            body.push_str(task.status.glyph());
            body.push(' ');
            body.push_str(&task.description);
        }
        body
    }
}
