//! Schema reporting and configured custom schemas.
//!
//! # Key Types
//!
//! - [`ConnectorSchema`] - object classes and their attributes, as reported by the
//!   schema operation
//! - [`AttributeInfo`] - one attribute's type and characteristics
//! - [`CustomSchemas`] - validated custom schema leaves exposed as `Schema.field`
//!
//! # Examples
//!
//! ```rust
//! use directory_connector::schema::CustomSchemas;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schemas = CustomSchemas::from_json(
//!     r#"[{"name": "Employment", "type": "object",
//!          "innerSchemas": [{"name": "costCenter", "type": "string"}]}]"#,
//! )?;
//! assert!(schemas.field("employment.costcenter").is_some());
//! # Ok(())
//! # }
//! ```

pub mod custom;
pub mod types;

pub use custom::{CustomField, CustomSchemaDescriptor, CustomSchemaType, CustomSchemas, parse_custom_schemas};
pub use types::{AttributeInfo, AttributeType, ConnectorSchema, Mutability, ObjectClassInfo};
