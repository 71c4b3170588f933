//! Sequential step runner.

use crate::cancellation::CancellationToken;
use crate::context::StateBag;
use crate::steps::{Step, StepAction};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Steps whose forward action was invoked, in order.
    pub steps_run: Vec<String>,
    /// The step that returned [`StepAction::Halt`], if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<String>,
    /// Whether the run stopped because of cancellation.
    pub cancelled: bool,
    /// Message of the last recorded step error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When cleanup finished.
    pub ended_at: DateTime<Utc>,
}

impl RunReport {
    /// Returns true if every step continued and nothing cancelled the run.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.halted_at.is_none() && !self.cancelled
    }

    /// Returns the wall-clock duration in milliseconds, cleanup included.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// Runs steps strictly in order, then cleans up in reverse.
///
/// Forward actions stop at the first halt or when the cancellation token
/// fires; the token is checked only between steps. Every step whose
/// forward action was invoked, including the one that halted, gets its
/// cleanup called once, newest first.
pub struct Runner {
    steps: Vec<Box<dyn Step>>,
    cancellation: Arc<CancellationToken>,
}

impl Runner {
    /// Creates a runner over the given steps.
    #[must_use]
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self {
            steps,
            cancellation: Arc::new(CancellationToken::new()),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Returns a handle that can cancel the run from elsewhere.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        self.cancellation.clone()
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Runs the pipeline against a state bag.
    pub async fn run(&mut self, state: &StateBag) -> RunReport {
        let started_at = Utc::now();
        let mut steps_run = Vec::new();
        let mut halted_at = None;
        let mut cancelled = false;

        for step in &mut self.steps {
            if self.cancellation.is_cancelled() {
                info!(
                    reason = ?self.cancellation.reason(),
                    next_step = step.name(),
                    "Pipeline cancelled"
                );
                cancelled = true;
                break;
            }

            let name = step.name().to_string();
            debug!(step = %name, "Running step");
            steps_run.push(name.clone());

            if step.run(state).await == StepAction::Halt {
                warn!(step = %name, "Step halted the pipeline");
                halted_at = Some(name);
                break;
            }
        }

        for step in self.steps[..steps_run.len()].iter_mut().rev() {
            debug!(step = step.name(), "Cleaning up step");
            step.cleanup(state).await;
        }

        let report = RunReport {
            steps_run,
            halted_at,
            cancelled,
            last_error: state.last_error().map(|e| e.to_string()),
            started_at,
            ended_at: Utc::now(),
        };
        info!(
            completed = report.completed(),
            duration_ms = report.duration_ms(),
            "Pipeline finished"
        );
        report
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("steps", &self.steps)
            .field("cancellation", &self.cancellation)
            .finish()
    }
}
