//! The provisioning orchestrator.
//!
//! Executes a [`Pipeline`] stage by stage against a [`PlatformRunner`],
//! reporting progress through a [`ProgressBoard`] and reacting uniformly to
//! failure: the first step error fails every remaining task, fires the
//! abort callback once, and propagates the original error. There is no
//! rollback — partial infrastructure is left for an idempotent re-run.
//!
//! Every step await is guarded by the run's cancellation token and optional
//! deadline, so a stuck external dependency cannot hang the run forever.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chat::CorrelationId;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::board::ProgressBoard;
use crate::error::ProvisionError;
use crate::pipeline::{Pipeline, StepContext};
use crate::registry::TaskStatus;
use crate::retry::RetryPolicy;
use crate::runner::PlatformRunner;

/// Lifecycle of one provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Created, nothing executed yet.
    NotStarted,
    /// Steps are executing.
    Running,
    /// Every step succeeded.
    Completed,
    /// A step failed; remaining tasks were marked Failed.
    Aborted,
}

/// Snapshot of a finished (or aborted) run, passed to the observer.
#[derive(Debug, Clone)]
pub struct RunContext {
    state: RunState,
    title: String,
    correlation_id: CorrelationId,
    outputs: BTreeMap<String, String>,
}

impl RunContext {
    /// Terminal run state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Run title (the board's title).
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Correlation id of the run's status board.
    #[must_use]
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// All step-recorded outputs.
    #[must_use]
    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    /// One step-recorded output, e.g. `endpoint`.
    #[must_use]
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).map(String::as_str)
    }
}

/// Per-run callbacks, each invoked exactly once.
#[async_trait]
pub trait RunObserver: Send + Sync {
    /// All steps succeeded.
    async fn on_completed(&self, _cx: &RunContext) {}

    /// A step failed (or the run was cancelled / timed out).
    async fn on_aborted(&self, _cx: &RunContext, _error: &ProvisionError) {}
}

/// Observer that does nothing.
pub struct NoopObserver;

#[async_trait]
impl RunObserver for NoopObserver {}

/// Coordinates one provisioning run.
pub struct Orchestrator {
    runner: Arc<dyn PlatformRunner>,
    board: ProgressBoard,
    pipeline: Pipeline,
    retry: RetryPolicy,
    deadline: Option<Duration>,
    cancel: CancellationToken,
    state: watch::Sender<RunState>,
}

impl Orchestrator {
    /// Create an orchestrator for one run.
    #[must_use]
    pub fn new(runner: Arc<dyn PlatformRunner>, board: ProgressBoard, pipeline: Pipeline) -> Self {
        let (state, _) = watch::channel(RunState::NotStarted);
        Self {
            runner,
            board,
            pipeline,
            retry: RetryPolicy::default(),
            deadline: None,
            cancel: CancellationToken::new(),
            state,
        }
    }

    /// Watch the run's lifecycle state.
    ///
    /// The receiver reports `NotStarted` until [`run`](Self::run) has
    /// registered the tasks and published the initial board, `Running`
    /// while steps execute, then the terminal `Completed` or `Aborted`.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Retry policy handed to polling steps.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run-level deadline; expiry aborts the run through the normal
    /// failure path.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// External cancellation token for the run.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Execute the run to completion or abort.
    ///
    /// The observer's `on_completed` or `on_aborted` fires exactly once.
    /// On abort the original step error is returned after the remaining
    /// tasks have been failed on the board.
    ///
    /// # Errors
    ///
    /// Returns the first step error, [`ProvisionError::DeadlineExceeded`],
    /// [`ProvisionError::Cancelled`], or a fail-fast registry error if the
    /// pipeline and board disagree about task keys.
    pub async fn run(self, observer: &dyn RunObserver) -> Result<RunContext, ProvisionError> {
        let Self {
            runner,
            mut board,
            pipeline,
            retry,
            deadline,
            cancel,
            state,
        } = self;

        for stage in pipeline.stages() {
            for step in stage.steps() {
                board.add_task(step.key(), step.description())?;
            }
        }

        info!(
            title = board.registry().title(),
            steps = pipeline.step_count(),
            "Starting provisioning run"
        );
        board.publish().await;
        state.send_replace(RunState::Running);

        let deadline_at = deadline.map(|d| (Instant::now() + d, d));
        let outputs = Mutex::new(BTreeMap::new());

        for stage in pipeline.stages() {
            let results = {
                let step_futures = stage.steps().iter().map(|step| {
                    let cx = StepContext::new(runner.as_ref(), &retry, &outputs);
                    let cancel = cancel.clone();
                    async move {
                        info!(step = step.key(), "Executing step");
                        let result = guard(&cancel, deadline_at, step.run(&cx)).await;
                        (step.key().to_string(), result)
                    }
                });
                futures::future::join_all(step_futures).await
            };

            let mut first_error = None;
            for (key, result) in results {
                match result {
                    Ok(()) => board.set_status(&key, TaskStatus::Successful).await?,
                    Err(e) => {
                        error!(step = key, error = %e, "Step failed");
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }

            if let Some(e) = first_error {
                board.fail_remaining().await;
                state.send_replace(RunState::Aborted);
                let cx = snapshot(RunState::Aborted, &board, &outputs);
                observer.on_aborted(&cx, &e).await;
                return Err(e);
            }
        }

        state.send_replace(RunState::Completed);
        let cx = snapshot(RunState::Completed, &board, &outputs);
        info!(title = cx.title(), "Provisioning run completed");
        observer.on_completed(&cx).await;
        Ok(cx)
    }
}

fn snapshot(
    state: RunState,
    board: &ProgressBoard,
    outputs: &Mutex<BTreeMap<String, String>>,
) -> RunContext {
    RunContext {
        state,
        title: board.registry().title().to_string(),
        correlation_id: board.registry().correlation_id(),
        outputs: outputs.lock().expect("output map lock poisoned").clone(),
    }
}

/// Race a step against cancellation and the run deadline.
async fn guard<F>(
    cancel: &CancellationToken,
    deadline: Option<(Instant, Duration)>,
    step: F,
) -> Result<(), ProvisionError>
where
    F: std::future::Future<Output = Result<(), ProvisionError>>,
{
    tokio::select! {
        () = cancel.cancelled() => Err(ProvisionError::Cancelled),
        total = deadline_expired(deadline) => Err(ProvisionError::DeadlineExceeded(total)),
        result = step => result,
    }
}

async fn deadline_expired(deadline: Option<(Instant, Duration)>) -> Duration {
    match deadline {
        Some((at, total)) => {
            tokio::time::sleep_until(at).await;
            total
        }
        None => std::future::pending().await,
    }
}
