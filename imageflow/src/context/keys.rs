//! Typed keys for the state bag.

use std::fmt;
use std::marker::PhantomData;

/// Name under which the cloud client handle is registered.
pub const CLOUD_CLIENT: &str = "cloud-client";

/// Name under which the user-visible output sink is registered.
pub const UI_SINK: &str = "ui-sink";

/// Name under which the most recent step error is recorded.
pub const LAST_ERROR: &str = "last-error";

/// Identifier of the security group later steps should attach to.
pub const SECURITY_GROUP_ID: StateKey<String> = StateKey::new("security-group-id");

/// A string key bound to the type of the value stored under it.
pub struct StateKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    /// Creates a typed key.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Returns the key name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StateKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StateKey<T> {}

impl<T> fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateKey").field(&self.name).finish()
    }
}

impl<T> fmt::Display for StateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
