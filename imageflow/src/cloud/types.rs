//! Request and response types for security group calls.

use serde::{Deserialize, Serialize};

/// CIDR block matching every IPv4 source.
pub const ANY_IPV4: &str = "0.0.0.0/0";

/// Parameters for creating a security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupSpec {
    /// Group name, unique within the account.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Network scope. `None` selects the provider default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,
}

impl SecurityGroupSpec {
    /// Creates a spec without a network scope.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            vpc_id: None,
        }
    }

    /// Sets the network scope.
    #[must_use]
    pub fn with_vpc_id(mut self, vpc_id: Option<String>) -> Self {
        self.vpc_id = vpc_id;
        self
    }
}

/// A created security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    /// Provider-assigned identifier.
    pub id: String,
    /// Group name.
    pub name: String,
}

impl SecurityGroup {
    /// Creates a group handle.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// An inbound rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpPermission {
    /// IP protocol name (`tcp`, `udp`, ...).
    pub protocol: String,
    /// First port of the range.
    pub from_port: u16,
    /// Last port of the range, inclusive.
    pub to_port: u16,
    /// Allowed source CIDR blocks.
    pub source_cidrs: Vec<String>,
}

impl IpPermission {
    /// A TCP rule for a single port.
    #[must_use]
    pub fn tcp(port: u16, source_cidrs: Vec<String>) -> Self {
        Self {
            protocol: "tcp".to_string(),
            from_port: port,
            to_port: port,
            source_cidrs,
        }
    }

    /// A TCP rule for a single port, open to every IPv4 source.
    #[must_use]
    pub fn tcp_from_anywhere(port: u16) -> Self {
        Self::tcp(port, vec![ANY_IPV4.to_string()])
    }
}
