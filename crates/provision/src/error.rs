//! Error types for provisioning runs.
//!
//! Step-level errors are caught once, at the orchestrator boundary, where
//! they fail the remaining tasks and reach the caller's abort callback
//! unaltered. Nothing here is ever downgraded to success.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while executing a provisioning run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Network or process failure reaching the external platform.
    #[error("transport failure during {operation}: {detail}")]
    Transport {
        /// Operation that was being attempted.
        operation: String,
        /// Underlying failure detail.
        detail: String,
    },

    /// A retried action never met its success condition.
    #[error("gave up after {attempts} attempts; last observed: {last}")]
    RetriesExhausted {
        /// Attempts consumed (equals the policy's budget).
        attempts: u32,
        /// The last observed result, rendered for the operator.
        last: String,
    },

    /// The platform returned a semantically invalid response.
    #[error("configuration failure during {operation}: {detail}")]
    Configuration {
        /// Operation that was being attempted.
        operation: String,
        /// What was wrong with the response.
        detail: String,
    },

    /// The run-level deadline expired.
    #[error("run deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// The run was cancelled.
    #[error("run cancelled")]
    Cancelled,

    /// Task registry misuse.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ProvisionError {
    /// Shorthand for a transport failure.
    pub fn transport(operation: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::Transport {
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }

    /// Shorthand for a configuration failure.
    pub fn configuration(operation: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::Configuration {
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }
}

/// Programmer errors in task registry usage. Fail fast, never user-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A task key was registered twice.
    #[error("duplicate task key: {0}")]
    DuplicateKey(String),

    /// A status update referenced a key that was never added.
    #[error("unknown task key: {0}")]
    UnknownKey(String),
}
