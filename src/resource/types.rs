//! Resource type, identifier and result object definitions.

use crate::error::{ConnectorError, ConnectorResult};
use crate::resource::AttributeSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of directory object classes handled by the connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    /// A user account.
    Account,
    /// A group.
    Group,
    /// A (group, member, role) edge.
    Membership,
    /// An organisational unit.
    OrgUnit,
    /// A product license assigned to a user.
    LicenseAssignment,
}

impl ResourceType {
    /// All resource types, in registration order.
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Account,
        ResourceType::Group,
        ResourceType::Membership,
        ResourceType::OrgUnit,
        ResourceType::LicenseAssignment,
    ];

    /// Object class name used on the inbound protocol.
    pub fn object_class(&self) -> &'static str {
        match self {
            ResourceType::Account => "__ACCOUNT__",
            ResourceType::Group => "__GROUP__",
            ResourceType::Membership => "Member",
            ResourceType::OrgUnit => "OrgUnit",
            ResourceType::LicenseAssignment => "LicenseAssignment",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.object_class())
    }
}

impl FromStr for ResourceType {
    type Err = ConnectorError;

    fn from_str(s: &str) -> ConnectorResult<Self> {
        ResourceType::ALL
            .iter()
            .find(|t| t.object_class().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| ConnectorError::unsupported(format!("unknown object class '{}'", s)))
    }
}

/// Stable identifier of a resource instance.
///
/// The optional revision is the provider's opaque concurrency tag. It is carried
/// along unchanged and never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uid {
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    revision: Option<String>,
}

impl Uid {
    /// Create an identifier without revision.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            revision: None,
        }
    }

    /// Create an identifier carrying a revision.
    pub fn with_revision(value: impl Into<String>, revision: Option<String>) -> Self {
        Self {
            value: value.into(),
            revision,
        }
    }

    /// Get the identifier value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Get the revision, if the provider supplied one.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// A directory object returned by search.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorObject {
    pub resource_type: ResourceType,
    pub uid: Uid,
    pub name: String,
    pub attributes: AttributeSet,
}

impl ConnectorObject {
    /// Create a result object.
    pub fn new(resource_type: ResourceType, uid: Uid, name: impl Into<String>) -> Self {
        Self {
            resource_type,
            uid,
            name: name.into(),
            attributes: AttributeSet::new(),
        }
    }

    /// Attach attributes.
    pub fn with_attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = attributes;
        self
    }
}
