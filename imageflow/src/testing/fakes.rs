//! In-memory collaborators for exercising steps without a cloud account.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::cloud::{IpPermission, SecurityGroup, SecurityGroupApi, SecurityGroupSpec};
use crate::context::StateBag;
use crate::errors::CloudError;
use crate::steps::{Step, StepAction};
use crate::ui::Ui;
use crate::utils::TokenGenerator;

/// A call received by [`FakeCloud`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudCall {
    /// `create_security_group`
    Create(SecurityGroupSpec),
    /// `authorize_ingress`
    Authorize {
        /// Target group.
        group_id: String,
        /// Requested rules.
        permissions: Vec<IpPermission>,
    },
    /// `delete_security_group`
    Delete(String),
}

#[derive(Debug, Default)]
struct DeleteScript {
    remaining_failures: u32,
    always_fail: bool,
    error: Option<CloudError>,
}

/// A scriptable in-memory security group API.
///
/// Groups live in a map; deleting an unknown group returns
/// `CloudError::NotFound`, like a provider that treats repeated deletes as
/// errors.
#[derive(Debug, Default)]
pub struct FakeCloud {
    next_group_id: Mutex<Option<String>>,
    create_error: Mutex<Option<CloudError>>,
    authorize_error: Mutex<Option<CloudError>>,
    delete_script: Mutex<DeleteScript>,
    groups: Mutex<HashMap<String, Vec<IpPermission>>>,
    calls: Mutex<Vec<CloudCall>>,
    counter: AtomicU64,
}

impl FakeCloud {
    /// Creates a fake that accepts every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next created group use this id.
    #[must_use]
    pub fn with_group_id(self, id: impl Into<String>) -> Self {
        *self.next_group_id.lock() = Some(id.into());
        self
    }

    /// Makes group creation fail.
    #[must_use]
    pub fn fail_create(self, error: CloudError) -> Self {
        *self.create_error.lock() = Some(error);
        self
    }

    /// Makes ingress authorization fail.
    #[must_use]
    pub fn fail_authorize(self, error: CloudError) -> Self {
        *self.authorize_error.lock() = Some(error);
        self
    }

    /// Makes the next `times` deletions fail before deletion succeeds.
    #[must_use]
    pub fn fail_delete_times(self, times: u32, error: CloudError) -> Self {
        {
            let mut script = self.delete_script.lock();
            script.remaining_failures = times;
            script.error = Some(error);
        }
        self
    }

    /// Makes every deletion fail.
    #[must_use]
    pub fn fail_delete_always(self, error: CloudError) -> Self {
        {
            let mut script = self.delete_script.lock();
            script.always_fail = true;
            script.error = Some(error);
        }
        self
    }

    /// Adds a group as if it had been created outside the pipeline.
    pub fn insert_group(&self, id: impl Into<String>) {
        self.groups.lock().insert(id.into(), Vec::new());
    }

    /// Returns every call received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CloudCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the ids passed to `delete_security_group`, in order.
    #[must_use]
    pub fn delete_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                CloudCall::Delete(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the ids of groups that currently exist.
    #[must_use]
    pub fn existing_groups(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.groups.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the rules authorized on a group.
    #[must_use]
    pub fn ingress_rules(&self, group_id: &str) -> Option<Vec<IpPermission>> {
        self.groups.lock().get(group_id).cloned()
    }

    fn record(&self, call: CloudCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl SecurityGroupApi for FakeCloud {
    async fn create_security_group(
        &self,
        spec: &SecurityGroupSpec,
    ) -> Result<SecurityGroup, CloudError> {
        self.record(CloudCall::Create(spec.clone()));

        if let Some(error) = self.create_error.lock().clone() {
            return Err(error);
        }

        let id = self.next_group_id.lock().take().unwrap_or_else(|| {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            format!("sg-{n:08x}")
        });
        self.groups.lock().insert(id.clone(), Vec::new());

        Ok(SecurityGroup::new(id, spec.name.clone()))
    }

    async fn authorize_ingress(
        &self,
        group_id: &str,
        permissions: &[IpPermission],
    ) -> Result<(), CloudError> {
        self.record(CloudCall::Authorize {
            group_id: group_id.to_string(),
            permissions: permissions.to_vec(),
        });

        if let Some(error) = self.authorize_error.lock().clone() {
            return Err(error);
        }

        match self.groups.lock().get_mut(group_id) {
            Some(rules) => {
                rules.extend_from_slice(permissions);
                Ok(())
            }
            None => Err(CloudError::not_found(group_id)),
        }
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<(), CloudError> {
        self.record(CloudCall::Delete(group_id.to_string()));

        {
            let mut script = self.delete_script.lock();
            if script.always_fail || script.remaining_failures > 0 {
                script.remaining_failures = script.remaining_failures.saturating_sub(1);
                return Err(script.error.clone().unwrap_or(CloudError::Throttled));
            }
        }

        match self.groups.lock().remove(group_id) {
            Some(_) => Ok(()),
            None => Err(CloudError::not_found(group_id)),
        }
    }
}

/// A message received by [`CollectingUi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiMessage {
    /// Sent with `say`.
    Say(String),
    /// Sent with `error`.
    Error(String),
}

/// A UI sink that records every message.
#[derive(Debug, Default)]
pub struct CollectingUi {
    messages: Mutex<Vec<UiMessage>>,
}

impl CollectingUi {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all messages in order.
    #[must_use]
    pub fn messages(&self) -> Vec<UiMessage> {
        self.messages.lock().clone()
    }

    /// Returns the progress messages.
    #[must_use]
    pub fn said(&self) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                UiMessage::Say(text) => Some(text.clone()),
                UiMessage::Error(_) => None,
            })
            .collect()
    }

    /// Returns the error messages.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| match m {
                UiMessage::Error(text) => Some(text.clone()),
                UiMessage::Say(_) => None,
            })
            .collect()
    }
}

impl Ui for CollectingUi {
    fn say(&self, message: &str) {
        self.messages.lock().push(UiMessage::Say(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.messages.lock().push(UiMessage::Error(message.to_string()));
    }
}

/// Deterministic tokens: `token-000001`, `token-000002`, ...
#[derive(Debug, Default)]
pub struct SequentialTokens {
    counter: AtomicU64,
}

impl SequentialTokens {
    /// Creates a generator starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenGenerator for SequentialTokens {
    fn next_token(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("token-{n:06}")
    }
}

/// A step that records its lifecycle calls into a shared journal.
///
/// Journal entries are `run:<name>` and `cleanup:<name>`.
#[derive(Debug)]
pub struct RecordingStep {
    name: String,
    action: StepAction,
    journal: Arc<Mutex<Vec<String>>>,
}

impl RecordingStep {
    /// Creates a step that continues.
    #[must_use]
    pub fn new(name: impl Into<String>, journal: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            action: StepAction::Continue,
            journal,
        }
    }

    /// Creates a step that halts.
    #[must_use]
    pub fn halting(name: impl Into<String>, journal: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.into(),
            action: StepAction::Halt,
            journal,
        }
    }
}

#[async_trait]
impl Step for RecordingStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, _state: &StateBag) -> StepAction {
        self.journal.lock().push(format!("run:{}", self.name));
        self.action
    }

    async fn cleanup(&mut self, _state: &StateBag) {
        self.journal.lock().push(format!("cleanup:{}", self.name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_cloud_lifecycle() {
        let cloud = FakeCloud::new().with_group_id("sg-abc");

        let group = cloud
            .create_security_group(&SecurityGroupSpec::new("n", "d"))
            .await
            .unwrap();
        assert_eq!(group.id, "sg-abc");

        cloud
            .authorize_ingress("sg-abc", &[IpPermission::tcp_from_anywhere(22)])
            .await
            .unwrap();
        assert_eq!(
            cloud.ingress_rules("sg-abc"),
            Some(vec![IpPermission::tcp_from_anywhere(22)])
        );

        cloud.delete_security_group("sg-abc").await.unwrap();
        assert!(cloud.existing_groups().is_empty());
        assert_eq!(cloud.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fake_cloud_generates_ids() {
        let cloud = FakeCloud::new();
        let spec = SecurityGroupSpec::new("n", "d");

        let first = cloud.create_security_group(&spec).await.unwrap();
        let second = cloud.create_security_group(&spec).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(cloud.existing_groups().len(), 2);
    }

    #[tokio::test]
    async fn test_fake_cloud_delete_is_not_idempotent() {
        let cloud = FakeCloud::new();
        cloud.insert_group("sg-1");

        assert!(cloud.delete_security_group("sg-1").await.is_ok());
        assert_eq!(
            cloud.delete_security_group("sg-1").await,
            Err(CloudError::not_found("sg-1"))
        );
    }

    #[tokio::test]
    async fn test_fake_cloud_scripted_delete_failures() {
        let cloud = FakeCloud::new().fail_delete_times(2, CloudError::Throttled);
        cloud.insert_group("sg-1");

        assert!(cloud.delete_security_group("sg-1").await.is_err());
        assert!(cloud.delete_security_group("sg-1").await.is_err());
        assert!(cloud.delete_security_group("sg-1").await.is_ok());
        assert_eq!(cloud.delete_calls().len(), 3);
    }

    #[test]
    fn test_collecting_ui() {
        let ui = CollectingUi::new();
        ui.say("one");
        ui.error("two");
        ui.say("three");

        assert_eq!(ui.said(), vec!["one".to_string(), "three".to_string()]);
        assert_eq!(ui.errors(), vec!["two".to_string()]);
        assert_eq!(ui.messages().len(), 3);
    }

    #[test]
    fn test_sequential_tokens() {
        let tokens = SequentialTokens::new();
        assert_eq!(tokens.next_token(), "token-000001");
        assert_eq!(tokens.next_token(), "token-000002");
    }
}
