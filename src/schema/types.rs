//! Schema type definitions reported by the schema operation.
//!
//! Each object class lists its attributes with their data type and
//! characteristics. The same tables drive the mapper, so the reported schema
//! matches exactly what the connector reads and writes.

use crate::resource::ResourceType;
use serde::{Deserialize, Serialize};

/// Definition of one connector attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeInfo {
    /// Attribute name
    pub name: String,
    /// Data type of the attribute
    #[serde(rename = "type")]
    pub data_type: AttributeType,
    /// Whether this attribute can have multiple values
    pub multi_valued: bool,
    /// Whether this attribute is required on create
    pub required: bool,
    /// Mutability characteristics
    pub mutability: Mutability,
    /// Whether search returns it when no attributes are requested
    pub returned_by_default: bool,
}

impl AttributeInfo {
    /// A single-valued, optional, read-write attribute returned by default.
    pub fn new(name: impl Into<String>, data_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            data_type,
            multi_valued: false,
            required: false,
            mutability: Mutability::ReadWrite,
            returned_by_default: true,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    pub fn mutability(mut self, mutability: Mutability) -> Self {
        self.mutability = mutability;
        self
    }

    pub fn not_returned_by_default(mut self) -> Self {
        self.returned_by_default = false;
        self
    }

    /// Whether the attribute can be read back.
    pub fn is_readable(&self) -> bool {
        self.mutability != Mutability::WriteOnly
    }

    /// Whether a client may set the attribute.
    pub fn is_writable(&self) -> bool {
        matches!(self.mutability, Mutability::ReadWrite | Mutability::WriteOnly)
    }
}

/// Attribute data types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum AttributeType {
    #[default]
    String,
    Boolean,
    Integer,
    /// Raw bytes (photos)
    Binary,
    /// Nested map with typed keys
    Complex,
}

/// Attribute mutability characteristics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Mutability {
    /// Managed by the directory
    ReadOnly,
    #[default]
    ReadWrite,
    /// Set on create, never updated
    Immutable,
    /// Passwords
    WriteOnly,
}

/// Attributes of one object class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectClassInfo {
    pub resource_type: ResourceType,
    pub attributes: Vec<AttributeInfo>,
}

impl ObjectClassInfo {
    /// Look up an attribute, ignoring case.
    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }
}

/// The complete schema reported by the connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorSchema {
    pub object_classes: Vec<ObjectClassInfo>,
}

impl ConnectorSchema {
    pub fn object_class(&self, resource_type: ResourceType) -> Option<&ObjectClassInfo> {
        self.object_classes
            .iter()
            .find(|c| c.resource_type == resource_type)
    }
}
