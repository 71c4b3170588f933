//! Observability utilities.
//!
//! Steps emit `tracing` events; binaries embedding the pipeline install a
//! subscriber once at startup with [`init_tracing`].

mod logging;

pub use logging::{init_tracing, LogFormat, DEFAULT_LOG_LEVEL};
