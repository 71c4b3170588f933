//! Shared state for pipeline execution.
//!
//! This module provides:
//! - The [`StateBag`] every step reads collaborators from and publishes into
//! - Typed [`StateKey`]s for published values

mod bags;
mod keys;

pub use bags::StateBag;
pub use keys::{StateKey, CLOUD_CLIENT, LAST_ERROR, SECURITY_GROUP_ID, UI_SINK};
