//! Error types for imageflow steps.
//!
//! Forward-action failures are described by [`StepError`]. Failures reported
//! by a cloud client are [`CloudError`], and misuse of the shared
//! [`StateBag`](crate::context::StateBag) is a [`StateError`].

use thiserror::Error;

/// Errors produced by a step's forward or cleanup action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    /// The step was configured with invalid values.
    ///
    /// Detected before any remote call is made.
    #[error("Invalid step configuration: {0}")]
    Configuration(String),

    /// The remote call creating the security group failed.
    #[error("Error creating temporary security group: {source}")]
    Creation {
        /// The underlying cloud error.
        #[source]
        source: CloudError,
    },

    /// Authorizing ingress on a freshly created group failed.
    #[error("Error authorizing ingress on temporary security group {group_id}: {source}")]
    Authorization {
        /// The group that was created but could not be authorized.
        group_id: String,
        /// The underlying cloud error.
        #[source]
        source: CloudError,
    },

    /// Deleting a created group failed on every attempt.
    #[error("Error cleaning up security group {group_id} after {attempts} attempts: {source}")]
    Cleanup {
        /// The orphaned group.
        group_id: String,
        /// Number of deletion attempts made.
        attempts: u32,
        /// The error from the last attempt.
        #[source]
        source: CloudError,
    },

    /// The shared state did not honor its contract.
    #[error("{0}")]
    State(#[from] StateError),
}

impl StepError {
    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a creation error.
    #[must_use]
    pub fn creation(source: CloudError) -> Self {
        Self::Creation { source }
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn authorization(group_id: impl Into<String>, source: CloudError) -> Self {
        Self::Authorization {
            group_id: group_id.into(),
            source,
        }
    }

    /// Creates a cleanup error.
    #[must_use]
    pub fn cleanup(group_id: impl Into<String>, attempts: u32, source: CloudError) -> Self {
        Self::Cleanup {
            group_id: group_id.into(),
            attempts,
            source,
        }
    }

    /// Returns true if the step left a remote resource that cleanup must remove.
    #[must_use]
    pub fn leaves_resource(&self) -> bool {
        matches!(self, Self::Authorization { .. } | Self::Cleanup { .. })
    }
}

/// Errors reported by a cloud API client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudError {
    /// The API rejected the request.
    #[error("{code}: {message}")]
    Api {
        /// Provider error code (e.g. `InvalidGroup.Duplicate`).
        code: String,
        /// Provider error message.
        message: String,
    },

    /// The API throttled the request.
    #[error("Request throttled")]
    Throttled,

    /// The request never reached the API or the response was lost.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The referenced resource does not exist.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// The missing resource id.
        resource: String,
    },
}

impl CloudError {
    /// Creates an API error.
    #[must_use]
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }
}

/// Contract violations on the shared state bag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// A required key was never put into the bag.
    #[error("State key '{key}' is missing")]
    MissingKey {
        /// The missing key.
        key: String,
    },

    /// The stored value could not be read as the requested type.
    #[error("State key '{key}' holds a value of the wrong type: {message}")]
    TypeMismatch {
        /// The key that was read.
        key: String,
        /// Decoder message.
        message: String,
    },

    /// A different value was already published under the key.
    #[error("State key '{key}' is already set to a different value")]
    Conflict {
        /// The conflicting key.
        key: String,
    },
}

impl StateError {
    /// Creates a missing key error.
    #[must_use]
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingKey { key: key.into() }
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(key: impl Into<String>) -> Self {
        Self::Conflict { key: key.into() }
    }
}
