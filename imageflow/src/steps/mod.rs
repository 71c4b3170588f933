//! Step trait and the provisioning steps built on it.
//!
//! A step is a unit of a build pipeline with a forward action and a
//! cleanup action. Steps run strictly in order; once any step halts, the
//! runner cleans up every step that ran, newest first.

mod security_group;

pub use security_group::{StepSecurityGroup, GROUP_DESCRIPTION, GROUP_NAME_PREFIX};

use crate::context::StateBag;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// What the runner should do after a step's forward action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Proceed to the next step.
    Continue,
    /// Stop the pipeline and start cleanup.
    Halt,
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Halt => write!(f, "halt"),
        }
    }
}

/// Trait for pipeline steps.
///
/// A step instance is used for exactly one run and one cleanup.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the name of the step.
    fn name(&self) -> &str;

    /// Performs the forward action.
    ///
    /// Errors are not returned: a failing step records the error in the
    /// state bag, reports it to the user, and returns [`StepAction::Halt`].
    async fn run(&mut self, state: &StateBag) -> StepAction;

    /// Undoes whatever `run` created.
    ///
    /// Called whenever `run` was called, whether it halted or not, and
    /// whether or not a later step halted. Best effort; must not fail.
    async fn cleanup(&mut self, state: &StateBag);
}
