//! Mapping between attribute sets and the directory's JSON representation.
//!
//! Every resource type has a static field table. The table drives validation
//! (required, read-only and immutable attributes), payload construction, result
//! projection and the reported schema, so all four agree by construction.
//!
//! # Modes
//!
//! * [`MappingMode::Create`] - required attributes must be present and non-blank
//! * [`MappingMode::Update`] - only attributes present in the input are written;
//!   an attribute present with no values clears the field

pub mod account;
pub mod complex;
pub mod group;
pub mod license;
pub mod member;
pub mod orgunit;

pub use account::AccountMapper;
pub use group::GroupMapper;
pub use license::LicenseMapper;
pub use member::MemberMapper;
pub use orgunit::OrgUnitMapper;

use crate::error::{ConnectorError, ConnectorResult};
use crate::resource::{Attribute, AttributeSet, AttributeValue, ConnectorObject, ResourceType};
use crate::schema::{AttributeInfo, AttributeType, Mutability};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use serde_json::{Map, Value};

/// Whether a payload is being built for creation or for a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingMode {
    Create,
    Update,
}

/// Bidirectional mapping for one resource type.
pub trait ResourceMapper: Send + Sync {
    fn resource_type(&self) -> ResourceType;

    /// Attributes of this resource type, for the schema operation.
    fn attribute_infos(&self) -> Vec<AttributeInfo>;

    /// Validate `attrs` and build the provider payload.
    fn to_provider(&self, attrs: &AttributeSet, mode: MappingMode) -> ConnectorResult<Value>;

    /// Project a provider object. `requested` limits the attributes returned; the
    /// uid, name and revision are always included.
    fn from_provider(&self, object: &Value, requested: Option<&[String]>) -> ConnectorResult<ConnectorObject>;

    /// The attributes of `attrs` a client may write in `mode`. Directory-managed
    /// attributes are dropped, so a projected object can be fed back into
    /// [`to_provider`](Self::to_provider).
    fn settable(&self, attrs: &AttributeSet, mode: MappingMode) -> AttributeSet {
        let infos = self.attribute_infos();
        attrs
            .iter()
            .filter(|attribute| {
                infos
                    .iter()
                    .find(|info| info.name.eq_ignore_ascii_case(&attribute.name))
                    .is_some_and(|info| is_writable(info.mutability, mode))
            })
            .cloned()
            .collect()
    }
}

fn is_writable(mutability: Mutability, mode: MappingMode) -> bool {
    match mutability {
        Mutability::ReadOnly => false,
        Mutability::Immutable => mode == MappingMode::Create,
        Mutability::ReadWrite | Mutability::WriteOnly => true,
    }
}

/// How an attribute reaches the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handling {
    /// Written into the main payload at `path`.
    Payload,
    /// Read from `path` but written through a separate call by the handler.
    SideEffect,
    /// Never read from the main object; fetched separately and only on request.
    Virtual,
}

/// One row of a field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    /// Dotted path inside the provider object.
    pub path: &'static str,
    pub data_type: AttributeType,
    pub multi_valued: bool,
    pub required: bool,
    pub mutability: Mutability,
    pub handling: Handling,
    /// Boolean stored negated (`__ENABLE__` vs `suspended`).
    pub inverted: bool,
}

impl Field {
    pub const fn new(name: &'static str, path: &'static str, data_type: AttributeType) -> Self {
        Self {
            name,
            path,
            data_type,
            multi_valued: false,
            required: false,
            mutability: Mutability::ReadWrite,
            handling: Handling::Payload,
            inverted: false,
        }
    }

    pub const fn string(name: &'static str, path: &'static str) -> Self {
        Self::new(name, path, AttributeType::String)
    }

    pub const fn boolean(name: &'static str, path: &'static str) -> Self {
        Self::new(name, path, AttributeType::Boolean)
    }

    pub const fn complex(name: &'static str) -> Self {
        Self::new(name, name, AttributeType::Complex).multi()
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn multi(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    pub const fn read_only(mut self) -> Self {
        self.mutability = Mutability::ReadOnly;
        self
    }

    pub const fn immutable(mut self) -> Self {
        self.mutability = Mutability::Immutable;
        self
    }

    pub const fn write_only(mut self) -> Self {
        self.mutability = Mutability::WriteOnly;
        self
    }

    pub const fn side_effect(mut self) -> Self {
        self.handling = Handling::SideEffect;
        self
    }

    pub const fn virtual_field(mut self) -> Self {
        self.handling = Handling::Virtual;
        self
    }

    pub const fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }

    fn info(&self) -> AttributeInfo {
        let mut info = AttributeInfo::new(self.name, self.data_type).mutability(self.mutability);
        if self.multi_valued {
            info = info.multi_valued();
        }
        if self.required {
            info = info.required();
        }
        if self.handling == Handling::Virtual {
            info = info.not_returned_by_default();
        }
        info
    }
}

/// Look up a field by attribute name, ignoring case.
pub fn find_field<'a>(fields: &'a [Field], name: &str) -> Option<&'a Field> {
    fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
}

/// Schema entries for a field table.
pub fn attribute_infos(fields: &[Field]) -> Vec<AttributeInfo> {
    fields.iter().map(Field::info).collect()
}

/// Whether `name` should be projected.
///
/// Without an explicit list everything but virtual attributes is returned.
pub fn is_requested(requested: Option<&[String]>, name: &str, handling: Handling) -> bool {
    match requested {
        Some(names) => names.iter().any(|n| n.eq_ignore_ascii_case(name)),
        None => handling != Handling::Virtual,
    }
}

fn is_blank(attribute: &Attribute) -> bool {
    match attribute.values.as_slice() {
        [] => true,
        [AttributeValue::String(s)] => s.trim().is_empty(),
        _ => false,
    }
}

/// Check every attribute against the table.
///
/// `extra` accepts names handled outside the table (custom schema leaves).
pub fn validate(
    resource_type: ResourceType,
    fields: &[Field],
    attrs: &AttributeSet,
    mode: MappingMode,
    extra: impl Fn(&str) -> bool,
) -> ConnectorResult<()> {
    for attribute in attrs.iter() {
        let Some(field) = find_field(fields, &attribute.name) else {
            if extra(&attribute.name) {
                continue;
            }
            return Err(ConnectorError::invalid_attribute(
                &attribute.name,
                format!("is not an attribute of {}", resource_type),
            ));
        };
        match (field.mutability, mode) {
            (Mutability::ReadOnly, _) => {
                return Err(ConnectorError::invalid_attribute(&attribute.name, "is read-only"));
            }
            (Mutability::Immutable, MappingMode::Update) => {
                return Err(ConnectorError::invalid_attribute(
                    &attribute.name,
                    "cannot be changed after creation",
                ));
            }
            _ => {}
        }
        if field.required && is_blank(attribute) {
            return Err(ConnectorError::invalid_attribute(&attribute.name, "must not be blank"));
        }
    }
    if mode == MappingMode::Create {
        for field in fields.iter().filter(|f| f.required) {
            if attrs.get(field.name).is_none_or(is_blank) {
                return Err(ConnectorError::invalid_attribute(field.name, "is required"));
            }
        }
    }
    Ok(())
}

/// Write every payload attribute present in `attrs` into `payload`.
pub fn write_fields(fields: &[Field], attrs: &AttributeSet, payload: &mut Map<String, Value>) -> ConnectorResult<()> {
    for attribute in attrs.iter() {
        let Some(field) = find_field(fields, &attribute.name) else {
            continue;
        };
        if field.handling != Handling::Payload || field.mutability == Mutability::ReadOnly {
            continue;
        }
        let value = to_json(field, attribute)?;
        set_path(payload, field.path, value);
    }
    Ok(())
}

/// Project the payload and side-effect fields of `object` into `out`.
pub fn read_fields(fields: &[Field], object: &Value, requested: Option<&[String]>, out: &mut AttributeSet) {
    for field in fields {
        if field.handling == Handling::Virtual
            || field.mutability == Mutability::WriteOnly
            || !is_requested(requested, field.name, field.handling)
        {
            continue;
        }
        let values = from_json(field, get_path(object, field.path));
        if values.is_empty() && requested.is_none() {
            continue;
        }
        out.set(field.name, values);
    }
}

fn to_json(field: &Field, attribute: &Attribute) -> ConnectorResult<Value> {
    if field.data_type == AttributeType::Complex {
        return complex::to_json(field.name, &attribute.values);
    }
    if field.multi_valued {
        if attribute.values.is_empty() {
            return Ok(Value::Null);
        }
        let items = attribute
            .values
            .iter()
            .map(|v| scalar_to_json(field, v))
            .collect::<ConnectorResult<Vec<Value>>>()?;
        return Ok(Value::Array(items));
    }
    match attribute.single()? {
        Some(value) => scalar_to_json(field, value),
        None => Ok(Value::Null),
    }
}

fn scalar_to_json(field: &Field, value: &AttributeValue) -> ConnectorResult<Value> {
    match (field.data_type, value) {
        (AttributeType::String, AttributeValue::String(s)) => Ok(Value::String(s.clone())),
        (AttributeType::Boolean, AttributeValue::Boolean(b)) => Ok(Value::Bool(*b != field.inverted)),
        (AttributeType::Integer, AttributeValue::Integer(i)) => Ok(Value::from(*i)),
        (AttributeType::Binary, AttributeValue::Binary(bytes)) => Ok(Value::String(URL_SAFE.encode(bytes))),
        (expected, other) => Err(ConnectorError::invalid_attribute(
            field.name,
            format!("expected {:?}, got {}", expected, other.type_name()),
        )),
    }
}

fn from_json(field: &Field, value: Option<&Value>) -> Vec<AttributeValue> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Vec::new();
    };
    if field.data_type == AttributeType::Complex {
        return complex::from_json(field.name, value);
    }
    match value {
        Value::Array(items) => items.iter().filter_map(|v| scalar_from_json(field, v)).collect(),
        other => scalar_from_json(field, other).into_iter().collect(),
    }
}

fn scalar_from_json(field: &Field, value: &Value) -> Option<AttributeValue> {
    match (field.data_type, value) {
        (AttributeType::String, Value::String(s)) => Some(AttributeValue::String(s.clone())),
        (AttributeType::String, Value::Number(n)) => Some(AttributeValue::String(n.to_string())),
        (AttributeType::Boolean, Value::Bool(b)) => Some(AttributeValue::Boolean(*b != field.inverted)),
        (AttributeType::Integer, Value::Number(n)) => n.as_i64().map(AttributeValue::Integer),
        (AttributeType::Integer, Value::String(s)) => s.parse().ok().map(AttributeValue::Integer),
        (AttributeType::Binary, Value::String(s)) => URL_SAFE.decode(s).ok().map(AttributeValue::Binary),
        _ => None,
    }
}

/// Value at a dotted path.
pub fn get_path<'a>(object: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(object, |current, part| current.get(part))
}

/// String at a dotted path, empty when absent.
pub fn get_str<'a>(object: &'a Value, path: &str) -> &'a str {
    get_path(object, path).and_then(Value::as_str).unwrap_or_default()
}

/// Set a value at a dotted path, creating intermediate objects.
pub fn set_path(payload: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            payload.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = payload
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                set_path(child, rest, value);
            }
        }
    }
}

/// Identifier and revision of a provider object.
pub fn uid_of(object: &Value, id_path: &str) -> ConnectorResult<crate::resource::Uid> {
    let id = get_str(object, id_path);
    if id.is_empty() {
        return Err(ConnectorError::Fatal {
            status: 200,
            reason: "malformedResponse".to_string(),
            message: format!("directory object has no '{}'", id_path),
        });
    }
    let revision = object
        .get("etag")
        .or_else(|| object.get("etags"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(crate::resource::Uid::with_revision(id, revision))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static FIELDS: &[Field] = &[
        Field::string("__NAME__", "primaryEmail").required(),
        Field::string("givenName", "name.givenName").required(),
        Field::boolean("__ENABLE__", "suspended").inverted(),
        Field::string("customerId", "customerId").read_only(),
        Field::string("aliases", "aliases").multi().side_effect(),
        Field::new("__PHOTO__", "", AttributeType::Binary).virtual_field(),
    ];

    #[test]
    fn test_paths() {
        let mut payload = Map::new();
        set_path(&mut payload, "name.givenName", json!("Jane"));
        set_path(&mut payload, "name.familyName", json!("Doe"));
        let value = Value::Object(payload);
        assert_eq!(value, json!({"name": {"givenName": "Jane", "familyName": "Doe"}}));
        assert_eq!(get_str(&value, "name.familyName"), "Doe");
        assert_eq!(get_path(&value, "name.middle"), None);
    }

    #[test]
    fn test_validation() {
        let attrs = AttributeSet::new().with("__NAME__", "a@example.com");
        let err = validate(ResourceType::Account, FIELDS, &attrs, MappingMode::Create, |_| false).unwrap_err();
        assert!(err.to_string().contains("givenName"));
        validate(ResourceType::Account, FIELDS, &attrs, MappingMode::Update, |_| false).unwrap();

        let blank = AttributeSet::new().with("givenName", "  ");
        assert!(validate(ResourceType::Account, FIELDS, &blank, MappingMode::Update, |_| false).is_err());

        let read_only = AttributeSet::new().with("customerId", "C1");
        assert!(validate(ResourceType::Account, FIELDS, &read_only, MappingMode::Update, |_| false).is_err());

        let unknown = AttributeSet::new().with("Custom.x", "1");
        assert!(validate(ResourceType::Account, FIELDS, &unknown, MappingMode::Update, |_| false).is_err());
        validate(ResourceType::Account, FIELDS, &unknown, MappingMode::Update, |n| n == "Custom.x").unwrap();
    }

    #[test]
    fn test_write_and_read_skip_non_payload_fields() {
        let attrs = AttributeSet::new()
            .with("givenName", "Jane")
            .with("__ENABLE__", false)
            .with_values("aliases", ["j@example.com"]);
        let mut payload = Map::new();
        write_fields(FIELDS, &attrs, &mut payload).unwrap();
        let payload = Value::Object(payload);
        assert_eq!(payload, json!({"name": {"givenName": "Jane"}, "suspended": true}));

        let object = json!({"primaryEmail": "a@example.com", "suspended": true, "aliases": ["j@example.com"]});
        let mut out = AttributeSet::new();
        read_fields(FIELDS, &object, None, &mut out);
        assert_eq!(out.boolean("__ENABLE__").unwrap(), Some(false));
        assert!(out.contains("aliases"));
        assert!(!out.contains("__PHOTO__"));
        assert!(!out.contains("givenName"));

        let mut only = AttributeSet::new();
        read_fields(FIELDS, &object, Some(&["givenName".to_string()]), &mut only);
        assert_eq!(only.names().collect::<Vec<_>>(), vec!["givenName"]);
    }
}
