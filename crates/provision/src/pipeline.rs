//! Provisioning steps, stages, and the validated pipeline.
//!
//! A pipeline is a fixed sequence of stages. A stage holds one or more
//! steps; steps within a stage have no ordering dependency and run
//! concurrently, but the stage itself is a barrier — the orchestrator
//! awaits the whole group before moving on.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{ProvisionError, RegistryError};
use crate::retry::RetryPolicy;
use crate::runner::PlatformRunner;

/// One external-effecting operation within a run.
///
/// Steps should be individually idempotent where the platform allows:
/// create-style calls that find the object pre-existing log a warning and
/// succeed, so an operator can safely re-trigger a failed run.
#[async_trait]
pub trait ProvisionStep: Send + Sync {
    /// Key of the task tracking this step. Unique within the pipeline.
    fn key(&self) -> &str;

    /// Human-readable description, used as the task line on the board.
    fn description(&self) -> String;

    /// Execute the step.
    async fn run(&self, cx: &StepContext<'_>) -> Result<(), ProvisionError>;
}

/// Execution context handed to every step.
pub struct StepContext<'a> {
    /// Platform capability.
    pub runner: &'a dyn PlatformRunner,
    /// Retry policy for steps that poll.
    pub retry: &'a RetryPolicy,
    outputs: &'a Mutex<BTreeMap<String, String>>,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        runner: &'a dyn PlatformRunner,
        retry: &'a RetryPolicy,
        outputs: &'a Mutex<BTreeMap<String, String>>,
    ) -> Self {
        Self {
            runner,
            retry,
            outputs,
        }
    }

    /// Record a named output for the run's completion callback (the route
    /// endpoint, a token name, ...).
    pub fn record_output(&self, key: impl Into<String>, value: impl Into<String>) {
        self.outputs
            .lock()
            .expect("output map lock poisoned")
            .insert(key.into(), value.into());
    }
}

/// A group of steps executed concurrently, awaited as one barrier.
pub struct Stage {
    steps: Vec<Arc<dyn ProvisionStep>>,
}

impl Stage {
    /// Steps in this stage.
    #[must_use]
    pub fn steps(&self) -> &[Arc<dyn ProvisionStep>] {
        &self.steps
    }
}

/// The declared step sequence for one provisioning run.
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Start building a pipeline.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Total number of steps across all stages.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.stages.iter().map(|s| s.steps.len()).sum()
    }
}

/// Builder validating key uniqueness before a run starts.
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Stage>,
}

impl PipelineBuilder {
    /// Append a stage with a single step.
    #[must_use]
    pub fn step(mut self, step: Arc<dyn ProvisionStep>) -> Self {
        self.stages.push(Stage { steps: vec![step] });
        self
    }

    /// Append a stage whose steps run concurrently.
    #[must_use]
    pub fn parallel(mut self, steps: Vec<Arc<dyn ProvisionStep>>) -> Self {
        self.stages.push(Stage { steps });
        self
    }

    /// Validate and build the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateKey`] if two steps share a key —
    /// a construction bug that must not reach the registry silently.
    pub fn build(self) -> Result<Pipeline, RegistryError> {
        let mut seen = HashSet::new();
        for stage in &self.stages {
            for step in &stage.steps {
                if !seen.insert(step.key().to_string()) {
                    return Err(RegistryError::DuplicateKey(step.key().to_string()));
                }
            }
        }
        Ok(Pipeline {
            stages: self.stages,
        })
    }
}
