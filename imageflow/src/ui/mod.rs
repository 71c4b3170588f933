//! User-visible output.
//!
//! Steps report progress and failures through a [`Ui`] handle taken from
//! the state bag. Diagnostics that are not meant for the user go to
//! `tracing` directly.

mod sink;

pub use sink::{LoggingUi, NoOpUi, Ui};
