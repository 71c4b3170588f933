//! # Imageflow
//!
//! Building blocks for machine-image build pipelines.
//!
//! A pipeline is an ordered list of steps sharing a state bag. Each step
//! has a forward action and a best-effort cleanup; the runner stops at the
//! first halt and cleans up every step that ran, newest first.
//!
//! The crate ships one provisioning step:
//!
//! - **Temporary security group**: creates a group admitting SSH from
//!   anywhere, or reuses a configured one, publishes its id for later
//!   steps, and deletes what it created with bounded retry
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use imageflow::prelude::*;
//!
//! let state = StateBag::new()
//!     .with_cloud(cloud)
//!     .with_ui(Arc::new(LoggingUi::new()));
//!
//! let mut runner = Runner::new(Vec::new())
//!     .with_step(StepSecurityGroup::new(SecurityGroupConfig::new()));
//!
//! let report = runner.run(&state).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod cloud;
pub mod config;
pub mod context;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod steps;
pub mod testing;
pub mod ui;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::cloud::{IpPermission, SecurityGroup, SecurityGroupApi, SecurityGroupSpec};
    pub use crate::config::SecurityGroupConfig;
    pub use crate::context::{StateBag, StateKey, SECURITY_GROUP_ID};
    pub use crate::errors::{CloudError, StateError, StepError};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{RetryPolicy, RunReport, Runner};
    pub use crate::steps::{Step, StepAction, StepSecurityGroup};
    pub use crate::ui::{LoggingUi, NoOpUi, Ui};
}
