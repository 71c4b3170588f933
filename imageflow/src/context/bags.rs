//! The state bag shared by every step of a pipeline run.

use super::keys::{StateKey, CLOUD_CLIENT, LAST_ERROR, UI_SINK};
use crate::cloud::SecurityGroupApi;
use crate::errors::{StateError, StepError};
use crate::ui::Ui;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Pipeline-wide state passed by reference through every step.
///
/// Collaborator handles are typed fields. Values published by steps are
/// stored as JSON under string keys and read back through [`StateKey`].
/// A key may be re-published with the same value, but never overwritten
/// with a different one.
#[derive(Default)]
pub struct StateBag {
    cloud: Option<Arc<dyn SecurityGroupApi>>,
    ui: Option<Arc<dyn Ui>>,
    data: RwLock<HashMap<String, serde_json::Value>>,
    last_error: RwLock<Option<StepError>>,
}

impl StateBag {
    /// Creates an empty state bag with no collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the cloud client handle.
    #[must_use]
    pub fn with_cloud(mut self, cloud: Arc<dyn SecurityGroupApi>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    /// Registers the user-visible output sink.
    #[must_use]
    pub fn with_ui(mut self, ui: Arc<dyn Ui>) -> Self {
        self.ui = Some(ui);
        self
    }

    /// Returns the cloud client handle.
    ///
    /// # Errors
    ///
    /// Returns `StateError::MissingKey` if no client was registered.
    pub fn cloud(&self) -> Result<Arc<dyn SecurityGroupApi>, StateError> {
        self.cloud
            .clone()
            .ok_or_else(|| StateError::missing(CLOUD_CLIENT))
    }

    /// Returns the user-visible output sink.
    ///
    /// # Errors
    ///
    /// Returns `StateError::MissingKey` if no sink was registered.
    pub fn ui(&self) -> Result<Arc<dyn Ui>, StateError> {
        self.ui.clone().ok_or_else(|| StateError::missing(UI_SINK))
    }

    /// Reads a published value.
    ///
    /// Returns `Ok(None)` if nothing was published under the key.
    ///
    /// # Errors
    ///
    /// Returns `StateError::TypeMismatch` if the stored value does not decode as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: StateKey<T>) -> Result<Option<T>, StateError> {
        let Some(value) = self.data.read().get(key.name()).cloned() else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StateError::type_mismatch(key.name(), e.to_string()))
    }

    /// Reads a value that an earlier step is required to have published.
    ///
    /// # Errors
    ///
    /// Returns `StateError::MissingKey` if absent, or `TypeMismatch` if it
    /// does not decode as `T`.
    pub fn require<T: DeserializeOwned>(&self, key: StateKey<T>) -> Result<T, StateError> {
        self.get(key)?
            .ok_or_else(|| StateError::missing(key.name()))
    }

    /// Publishes a value.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Conflict` if a different value is already
    /// published under the key.
    pub fn put<T: Serialize>(&self, key: StateKey<T>, value: &T) -> Result<(), StateError> {
        let value = serde_json::to_value(value)
            .map_err(|e| StateError::type_mismatch(key.name(), e.to_string()))?;
        let mut data = self.data.write();

        match data.get(key.name()) {
            Some(existing) if *existing != value => Err(StateError::conflict(key.name())),
            _ => {
                data.insert(key.name().to_string(), value);
                Ok(())
            }
        }
    }

    /// Checks whether a value was published under the key.
    #[must_use]
    pub fn contains<T>(&self, key: StateKey<T>) -> bool {
        self.data.read().contains_key(key.name())
    }

    /// Returns the names of all published keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Records the error that made a step halt.
    pub fn set_last_error(&self, error: StepError) {
        tracing::debug!(key = LAST_ERROR, error = %error, "Recording step error");
        *self.last_error.write() = Some(error);
    }

    /// Returns the most recently recorded step error.
    #[must_use]
    pub fn last_error(&self) -> Option<StepError> {
        self.last_error.read().clone()
    }
}

impl std::fmt::Debug for StateBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBag")
            .field("has_cloud", &self.cloud.is_some())
            .field("has_ui", &self.ui.is_some())
            .field("keys", &self.keys())
            .field("last_error", &self.last_error())
            .finish()
    }
}
