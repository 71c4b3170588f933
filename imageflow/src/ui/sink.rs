//! User-visible output sinks.

use tracing::{error, info};

/// Sink for messages shown to the person running the build.
///
/// Calls are fire-and-forget: implementations must never fail or block
/// the calling step for long.
pub trait Ui: Send + Sync {
    /// Reports progress.
    fn say(&self, message: &str);

    /// Reports a problem.
    fn error(&self, message: &str);
}

/// A sink that discards all messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpUi;

impl Ui for NoOpUi {
    fn say(&self, _message: &str) {}

    fn error(&self, _message: &str) {}
}

/// A sink that writes messages through the tracing framework.
#[derive(Debug, Clone, Default)]
pub struct LoggingUi {
    prefix: Option<String>,
}

impl LoggingUi {
    /// Creates a sink without a prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that tags every message with a build name.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn render(&self, message: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}: {message}"),
            None => message.to_string(),
        }
    }
}

impl Ui for LoggingUi {
    fn say(&self, message: &str) {
        info!(target: "imageflow::ui", "{}", self.render(message));
    }

    fn error(&self, message: &str) {
        error!(target: "imageflow::ui", "{}", self.render(message));
    }
}
