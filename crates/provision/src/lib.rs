//! Provisioning orchestration core for Subatomic.
//!
//! This crate coordinates one provisioning run: a fixed sequence of stages
//! executed against an abstract platform, with progress reported to a chat
//! destination as a single in-place-updating status board.
//!
//! # Architecture
//!
//! - [`retry`] — bounded retry with an explicit success predicate
//! - [`registry`] — ordered, keyed task records with status transitions
//! - [`board`] — renders the registry and republishes it through a
//!   [`chat::MessageSink`] under one correlation id
//! - [`runner`] — the [`PlatformRunner`] capability the steps call into
//! - [`pipeline`] — steps, concurrent stages, and the validated pipeline
//! - [`orchestrator`] — the run state machine with deadline, cancellation,
//!   and exactly-once completion/abort callbacks
//!
//! Provisioning is not transactional: a failed run leaves already-applied
//! steps in place and relies on per-step idempotence when the operator
//! re-triggers the run.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod board;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod steps;

pub use board::ProgressBoard;
pub use error::{ProvisionError, RegistryError};
pub use orchestrator::{NoopObserver, Orchestrator, RunContext, RunObserver, RunState};
pub use pipeline::{Pipeline, PipelineBuilder, ProvisionStep, StepContext};
pub use registry::{Task, TaskRegistry, TaskStatus};
pub use retry::{retry_until, RetryError, RetryPolicy};
pub use runner::{
    Applied, CredentialSpec, NamespaceSpec, PlatformRunner, QuotaSpec, ResourceManifest,
    RolloutStatus, TemplateSpec,
};
