//! Cloud capability surface used by provisioning steps.
//!
//! Implementations own authentication and transport. Steps only see the
//! [`SecurityGroupApi`] trait.

mod types;

pub use types::{IpPermission, SecurityGroup, SecurityGroupSpec, ANY_IPV4};

use crate::errors::CloudError;
use async_trait::async_trait;

/// Operations on remote security groups.
///
/// Deletion is not assumed to be idempotent: deleting an already deleted
/// group may return an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecurityGroupApi: Send + Sync {
    /// Creates a security group and returns its identity.
    async fn create_security_group(
        &self,
        spec: &SecurityGroupSpec,
    ) -> Result<SecurityGroup, CloudError>;

    /// Adds inbound rules to an existing group.
    async fn authorize_ingress(
        &self,
        group_id: &str,
        permissions: &[IpPermission],
    ) -> Result<(), CloudError>;

    /// Deletes a group by identifier.
    async fn delete_security_group(&self, group_id: &str) -> Result<(), CloudError>;
}
