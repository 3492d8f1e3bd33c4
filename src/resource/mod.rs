//! Generic resource model exchanged with the connector's callers.
//!
//! Callers describe directory objects with an [`AttributeSet`] keyed by a
//! [`ResourceType`]; the connector answers with [`ConnectorObject`]s and names
//! instances through a [`Uid`].
//!
//! # Key Components
//!
//! * [`ResourceType`] - Closed set of object classes the connector manages
//! * [`Uid`] - Stable identifier with an optional opaque revision
//! * [`AttributeSet`] - Ordered, case-insensitive bag of typed values
//! * [`AttributeDelta`] - Add/remove/replace value deltas for partial updates
//! * [`ConnectorObject`] - A search or read result

pub mod attributes;
pub mod types;

pub use attributes::{Attribute, AttributeDelta, AttributeSet, AttributeValue};
pub use types::{ConnectorObject, ResourceType, Uid};

/// Well-known attribute names shared by every resource type.
pub mod names {
    /// Primary identifier of the instance.
    pub const UID: &str = "__UID__";
    /// Human-facing naming attribute (email for accounts and groups).
    pub const NAME: &str = "__NAME__";
    /// Account password.
    pub const PASSWORD: &str = "__PASSWORD__";
    /// Account enabled flag (inverse of suspended).
    pub const ENABLE: &str = "__ENABLE__";
    /// Groups an account belongs to.
    pub const GROUPS: &str = "__GROUPS__";
    /// Members of a group.
    pub const MEMBERS: &str = "__MEMBERS__";
    /// Binary account photo.
    pub const PHOTO: &str = "__PHOTO__";
}
