//! Temporary security group step.
//!
//! Either reuses a configured security group or creates a temporary one
//! that admits inbound TCP on the SSH port from anywhere, and publishes the
//! group id under `security-group-id`. A created group is deleted during
//! cleanup with bounded retries.

use super::{Step, StepAction};
use crate::cloud::{IpPermission, SecurityGroupSpec};
use crate::config::SecurityGroupConfig;
use crate::context::{StateBag, SECURITY_GROUP_ID};
use crate::errors::StepError;
use crate::ui::{NoOpUi, Ui};
use crate::utils::{TimeOrderedTokens, TokenGenerator};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Prefix of every created group's name.
pub const GROUP_NAME_PREFIX: &str = "imageflow";

/// Description given to every created group.
pub const GROUP_DESCRIPTION: &str = "Temporary group for imageflow";

/// Ensures a security group with SSH ingress exists for the build.
pub struct StepSecurityGroup {
    config: SecurityGroupConfig,
    tokens: Arc<dyn TokenGenerator>,
    created_group_id: Option<String>,
}

impl StepSecurityGroup {
    /// Creates the step.
    #[must_use]
    pub fn new(config: SecurityGroupConfig) -> Self {
        Self {
            config,
            tokens: Arc::new(TimeOrderedTokens),
            created_group_id: None,
        }
    }

    /// Replaces the source of unique group-name tokens.
    #[must_use]
    pub fn with_token_generator(mut self, tokens: Arc<dyn TokenGenerator>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Returns the step configuration.
    #[must_use]
    pub fn config(&self) -> &SecurityGroupConfig {
        &self.config
    }

    /// Returns the id of the group this step created, if it created one.
    #[must_use]
    pub fn created_group_id(&self) -> Option<&str> {
        self.created_group_id.as_deref()
    }

    fn group_name(&self) -> String {
        format!("{GROUP_NAME_PREFIX} {}", self.tokens.next_token())
    }

    async fn provision(&mut self, state: &StateBag) -> Result<String, StepError> {
        if let Some(group_id) = self.config.explicit_group_id() {
            let group_id = group_id.to_string();
            info!(group_id = %group_id, "Using specified security group");
            state.put(SECURITY_GROUP_ID, &group_id)?;
            return Ok(group_id);
        }

        self.config.validate()?;

        let cloud = state.cloud()?;
        let ui = state.ui()?;

        ui.say("Creating temporary security group for this instance...");
        let spec = SecurityGroupSpec::new(self.group_name(), GROUP_DESCRIPTION)
            .with_vpc_id(self.config.vpc_id.clone());
        info!(group_name = %spec.name, vpc_id = ?spec.vpc_id, "Creating temporary security group");

        let group = cloud
            .create_security_group(&spec)
            .await
            .map_err(StepError::creation)?;

        // Recorded before authorizing so cleanup deletes the group even if
        // authorization fails.
        self.created_group_id = Some(group.id.clone());

        ui.say("Authorizing SSH access on the temporary security group...");
        let permissions = [IpPermission::tcp_from_anywhere(self.config.ssh_port)];
        cloud
            .authorize_ingress(&group.id, &permissions)
            .await
            .map_err(|e| StepError::authorization(&group.id, e))?;

        state.put(SECURITY_GROUP_ID, &group.id)?;
        Ok(group.id)
    }

    fn halt(&self, state: &StateBag, err: StepError) -> StepAction {
        error!(
            step = self.name(),
            created_group_id = ?self.created_group_id,
            needs_cleanup = err.leaves_resource(),
            error = %err,
            "Security group step halted"
        );
        if let Ok(ui) = state.ui() {
            ui.error(&err.to_string());
        }
        state.set_last_error(err);
        StepAction::Halt
    }
}

impl std::fmt::Debug for StepSecurityGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepSecurityGroup")
            .field("config", &self.config)
            .field("created_group_id", &self.created_group_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Step for StepSecurityGroup {
    fn name(&self) -> &str {
        "security-group"
    }

    async fn run(&mut self, state: &StateBag) -> StepAction {
        match self.provision(state).await {
            Ok(group_id) => {
                info!(group_id = %group_id, "Security group ready");
                StepAction::Continue
            }
            Err(err) => self.halt(state, err),
        }
    }

    async fn cleanup(&mut self, state: &StateBag) {
        let Some(group_id) = self.created_group_id.as_deref() else {
            return;
        };

        let cloud = match state.cloud() {
            Ok(cloud) => cloud,
            Err(err) => {
                warn!(group_id, error = %err, "Cannot delete temporary security group");
                return;
            }
        };
        let ui: Arc<dyn Ui> = state.ui().unwrap_or_else(|_| Arc::new(NoOpUi));

        ui.say("Deleting temporary security group...");

        let cloud = &cloud;
        let result = self
            .config
            .cleanup_retry
            .run(move || cloud.delete_security_group(group_id))
            .await;

        match result {
            Ok(()) => info!(group_id, "Deleted temporary security group"),
            Err(retry) => {
                let err = StepError::cleanup(group_id, retry.attempts, retry.last_error);
                warn!(group_id, error = %err, "Leaking temporary security group");
                ui.error(&format!(
                    "Error cleaning up security group. Please delete the group manually: {group_id}"
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{MockSecurityGroupApi, SecurityGroup};
    use crate::errors::CloudError;
    use crate::pipeline::RetryPolicy;
    use crate::testing::{CloudCall, CollectingUi, FakeCloud, SequentialTokens};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn state_with(cloud: Arc<FakeCloud>, ui: Arc<CollectingUi>) -> StateBag {
        StateBag::new().with_cloud(cloud).with_ui(ui)
    }

    fn create_config() -> SecurityGroupConfig {
        SecurityGroupConfig::new()
            .with_ssh_port(22)
            .with_vpc_id("vpc-1")
    }

    #[tokio::test]
    async fn test_explicit_group_makes_no_remote_calls() {
        for port in [0, 22, 65535] {
            for vpc in ["", "vpc-1"] {
                // No expectations: any call on the mock panics.
                let cloud = Arc::new(MockSecurityGroupApi::new());
                let ui = Arc::new(CollectingUi::new());
                let state = StateBag::new().with_cloud(cloud).with_ui(ui.clone());

                let config = SecurityGroupConfig::new()
                    .with_security_group_id("sg-existing")
                    .with_ssh_port(port)
                    .with_vpc_id(vpc);
                let mut step = StepSecurityGroup::new(config);

                assert_eq!(step.run(&state).await, StepAction::Continue);
                assert_eq!(state.require(SECURITY_GROUP_ID).unwrap(), "sg-existing");
                assert_eq!(step.created_group_id(), None);

                step.cleanup(&state).await;
                assert!(ui.messages().is_empty());
            }
        }
    }

    #[tokio::test]
    async fn test_explicit_group_needs_no_collaborators() {
        let state = StateBag::new();
        let mut step = StepSecurityGroup::new(
            SecurityGroupConfig::new().with_security_group_id("sg-existing"),
        );

        assert_eq!(step.run(&state).await, StepAction::Continue);
        assert_eq!(state.require(SECURITY_GROUP_ID).unwrap(), "sg-existing");
    }

    #[tokio::test]
    async fn test_zero_port_fails_before_remote_calls() {
        let cloud = Arc::new(FakeCloud::new());
        let ui = Arc::new(CollectingUi::new());
        let state = state_with(cloud.clone(), ui.clone());

        let mut step = StepSecurityGroup::new(SecurityGroupConfig::new().with_ssh_port(0));

        assert_eq!(step.run(&state).await, StepAction::Halt);
        assert!(matches!(state.last_error(), Some(StepError::Configuration(_))));
        assert_eq!(cloud.call_count(), 0);
        assert!(!state.contains(SECURITY_GROUP_ID));
        assert_eq!(ui.errors().len(), 1);
        assert!(ui.errors()[0].contains("ssh_port"));

        step.cleanup(&state).await;
        assert_eq!(cloud.call_count(), 0);
    }

    #[tokio::test]
    async fn test_whitespace_group_id_takes_reuse_path() {
        let cloud = Arc::new(FakeCloud::new());
        let ui = Arc::new(CollectingUi::new());
        let state = state_with(cloud.clone(), ui);

        let mut step =
            StepSecurityGroup::new(SecurityGroupConfig::new().with_security_group_id(" "));

        assert_eq!(step.run(&state).await, StepAction::Continue);
        assert_eq!(state.require(SECURITY_GROUP_ID).unwrap(), " ");
        assert!(step.created_group_id().is_none());

        step.cleanup(&state).await;
        assert_eq!(cloud.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unbounded_cleanup_retry_fails_before_remote_calls() {
        let cloud = Arc::new(FakeCloud::new());
        let ui = Arc::new(CollectingUi::new());
        let state = state_with(cloud.clone(), ui.clone());

        let config = SecurityGroupConfig::new().with_cleanup_retry(
            RetryPolicy::new()
                .with_max_attempts(2000)
                .with_delay(Duration::from_millis(u64::MAX))
                .with_max_delay(Duration::from_millis(u64::MAX)),
        );
        let mut step = StepSecurityGroup::new(config);

        assert_eq!(step.run(&state).await, StepAction::Halt);
        assert!(matches!(state.last_error(), Some(StepError::Configuration(_))));
        assert_eq!(cloud.call_count(), 0);
        assert!(ui.errors()[0].contains("cleanup_retry"));
    }

    #[tokio::test]
    async fn test_create_failure_leaves_nothing_to_clean() {
        let cloud = Arc::new(FakeCloud::new().fail_create(CloudError::api(
            "UnauthorizedOperation",
            "not allowed",
        )));
        let ui = Arc::new(CollectingUi::new());
        let state = state_with(cloud.clone(), ui.clone());
        let mut step = StepSecurityGroup::new(create_config());

        assert_eq!(step.run(&state).await, StepAction::Halt);
        assert_eq!(step.created_group_id(), None);
        assert!(matches!(state.last_error(), Some(StepError::Creation { .. })));
        assert_eq!(ui.errors().len(), 1);
        assert!(ui.errors()[0].contains("UnauthorizedOperation"));

        let calls_before_cleanup = cloud.call_count();
        step.cleanup(&state).await;
        assert_eq!(cloud.call_count(), calls_before_cleanup);
        assert!(cloud.delete_calls().is_empty());
    }

    #[tokio::test]
    async fn test_authorize_failure_still_cleans_up() {
        let cloud = Arc::new(
            FakeCloud::new()
                .with_group_id("sg-abc")
                .fail_authorize(CloudError::api("InvalidPermission.Malformed", "bad rule")),
        );
        let ui = Arc::new(CollectingUi::new());
        let state = state_with(cloud.clone(), ui.clone());
        let mut step = StepSecurityGroup::new(create_config());

        assert_eq!(step.run(&state).await, StepAction::Halt);
        assert_eq!(step.created_group_id(), Some("sg-abc"));
        assert!(!state.contains(SECURITY_GROUP_ID));
        match state.last_error() {
            Some(StepError::Authorization { group_id, .. }) => assert_eq!(group_id, "sg-abc"),
            other => panic!("unexpected last error: {other:?}"),
        }

        step.cleanup(&state).await;
        assert_eq!(cloud.delete_calls(), vec!["sg-abc".to_string()]);
        assert!(cloud.existing_groups().is_empty());
    }

    #[tokio::test]
    async fn test_create_and_authorize_request_shape() {
        let mut cloud = MockSecurityGroupApi::new();
        cloud
            .expect_create_security_group()
            .withf(|spec| {
                spec.name == "imageflow token-000001"
                    && spec.description == GROUP_DESCRIPTION
                    && spec.vpc_id.as_deref() == Some("vpc-1")
            })
            .times(1)
            .returning(|spec| Ok(SecurityGroup::new("sg-abc", spec.name.clone())));
        cloud
            .expect_authorize_ingress()
            .withf(|group_id, permissions| {
                group_id == "sg-abc"
                    && permissions.to_vec() == vec![IpPermission::tcp(2222, vec!["0.0.0.0/0".to_string()])]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let state = StateBag::new()
            .with_cloud(Arc::new(cloud))
            .with_ui(Arc::new(CollectingUi::new()));
        let mut step = StepSecurityGroup::new(create_config().with_ssh_port(2222))
            .with_token_generator(Arc::new(SequentialTokens::new()));

        assert_eq!(step.run(&state).await, StepAction::Continue);
        assert_eq!(state.require(SECURITY_GROUP_ID).unwrap(), "sg-abc");
    }

    #[tokio::test]
    async fn test_group_names_are_unique_per_run() {
        let cloud = Arc::new(FakeCloud::new());
        let ui = Arc::new(CollectingUi::new());

        for _ in 0..2 {
            let state = state_with(cloud.clone(), ui.clone());
            let mut step = StepSecurityGroup::new(create_config());
            assert_eq!(step.run(&state).await, StepAction::Continue);
        }

        let names: Vec<String> = cloud
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                CloudCall::Create(spec) => Some(spec.name),
                _ => None,
            })
            .collect();
        assert_eq!(names.len(), 2);
        assert_ne!(names[0], names[1]);
        assert!(names.iter().all(|n| n.starts_with("imageflow ")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_succeeds_after_k_failures() {
        for k in 0..=4 {
            let cloud = Arc::new(
                FakeCloud::new()
                    .with_group_id("sg-abc")
                    .fail_delete_times(k, CloudError::api("DependencyViolation", "in use")),
            );
            let ui = Arc::new(CollectingUi::new());
            let state = state_with(cloud.clone(), ui.clone());
            let mut step = StepSecurityGroup::new(create_config());

            assert_eq!(step.run(&state).await, StepAction::Continue);
            step.cleanup(&state).await;

            assert_eq!(cloud.delete_calls().len(), k as usize + 1, "k = {k}");
            assert!(ui.errors().is_empty(), "k = {k}");
            assert!(cloud.existing_groups().is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_failing_every_attempt_warns_once() {
        let cloud = Arc::new(
            FakeCloud::new()
                .with_group_id("sg-abc")
                .fail_delete_always(CloudError::Throttled),
        );
        let ui = Arc::new(CollectingUi::new());
        let state = state_with(cloud.clone(), ui.clone());
        let mut step = StepSecurityGroup::new(create_config());

        assert_eq!(step.run(&state).await, StepAction::Continue);

        let start = tokio::time::Instant::now();
        step.cleanup(&state).await;

        assert_eq!(cloud.delete_calls(), vec!["sg-abc".to_string(); 5]);
        assert_eq!(ui.errors().len(), 1);
        assert!(ui.errors()[0].contains("sg-abc"));
        assert!(ui.errors()[0].contains("manually"));
        assert!(start.elapsed() < Duration::from_secs(21));
    }

    #[tokio::test]
    async fn test_cleanup_uses_configured_retry_policy() {
        let cloud = Arc::new(
            FakeCloud::new()
                .with_group_id("sg-abc")
                .fail_delete_always(CloudError::transport("connection reset")),
        );
        let ui = Arc::new(CollectingUi::new());
        let state = state_with(cloud.clone(), ui.clone());
        let config = create_config().with_cleanup_retry(
            RetryPolicy::new()
                .with_max_attempts(2)
                .with_delay(Duration::from_millis(1)),
        );
        let mut step = StepSecurityGroup::new(config);

        assert_eq!(step.run(&state).await, StepAction::Continue);
        step.cleanup(&state).await;

        assert_eq!(cloud.delete_calls().len(), 2);
        assert_eq!(ui.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_end_to_end_create_and_delete() {
        let cloud = Arc::new(FakeCloud::new().with_group_id("sg-abc"));
        let ui = Arc::new(CollectingUi::new());
        let state = state_with(cloud.clone(), ui.clone());
        let mut step = StepSecurityGroup::new(create_config());

        assert_eq!(step.run(&state).await, StepAction::Continue);
        assert_eq!(state.require(SECURITY_GROUP_ID).unwrap(), "sg-abc");
        assert_eq!(
            cloud.ingress_rules("sg-abc"),
            Some(vec![IpPermission::tcp_from_anywhere(22)])
        );
        assert!(state.last_error().is_none());

        step.cleanup(&state).await;
        assert_eq!(cloud.delete_calls(), vec!["sg-abc".to_string()]);
        assert!(ui.errors().is_empty());
        assert_eq!(
            ui.said(),
            vec![
                "Creating temporary security group for this instance...".to_string(),
                "Authorizing SSH access on the temporary security group...".to_string(),
                "Deleting temporary security group...".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_cloud_client_halts() {
        let ui = Arc::new(CollectingUi::new());
        let state = StateBag::new().with_ui(ui.clone());
        let mut step = StepSecurityGroup::new(create_config());

        assert_eq!(step.run(&state).await, StepAction::Halt);
        assert!(matches!(state.last_error(), Some(StepError::State(_))));
        assert_eq!(ui.errors(), vec!["State key 'cloud-client' is missing".to_string()]);
    }

    #[tokio::test]
    async fn test_conflicting_published_id_halts_after_create() {
        let cloud = Arc::new(FakeCloud::new().with_group_id("sg-abc"));
        let ui = Arc::new(CollectingUi::new());
        let state = state_with(cloud.clone(), ui.clone());
        state.put(SECURITY_GROUP_ID, &"sg-other".to_string()).unwrap();
        let mut step = StepSecurityGroup::new(create_config());

        assert_eq!(step.run(&state).await, StepAction::Halt);
        assert_eq!(step.created_group_id(), Some("sg-abc"));

        step.cleanup(&state).await;
        assert_eq!(cloud.delete_calls(), vec!["sg-abc".to_string()]);
    }
}
