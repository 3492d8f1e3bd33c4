//! Configured custom schemas and their flat attribute form.
//!
//! The directory stores custom fields one level deep under `customSchemas`:
//!
//! ```json
//! {"customSchemas": {"Employment": {"costCenter": "42", "badges": [{"value": "A"}]}}}
//! ```
//!
//! The connector exposes each leaf as a flat attribute named `Schema.field`
//! (`Employment.costCenter`). Schemas are declared in configuration as a JSON array:
//!
//! ```json
//! [{"name": "Employment", "type": "object", "innerSchemas": [
//!     {"name": "costCenter", "type": "int"},
//!     {"name": "badges", "type": "string", "multiValued": true}
//! ]}]
//! ```
//!
//! Only top-level `object` nodes and their direct leaves are interpreted. Anything
//! else is ignored with a warning.

use crate::error::{ConnectorError, ConnectorResult};
use crate::resource::{AttributeSet, AttributeValue};
use crate::schema::types::{AttributeInfo, AttributeType};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Declared type of a custom schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomSchemaType {
    String,
    Boolean,
    Int,
    Object,
}

/// One node of a custom schema declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomSchemaDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub schema_type: CustomSchemaType,
    #[serde(default)]
    pub multi_valued: bool,
    #[serde(default)]
    pub inner_schemas: Vec<CustomSchemaDescriptor>,
}

/// A leaf that the connector maps, with its owning schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomField {
    pub schema: String,
    pub field: String,
    pub field_type: CustomSchemaType,
    pub multi_valued: bool,
}

impl CustomField {
    /// Flat attribute name, `Schema.field`.
    pub fn attribute_name(&self) -> String {
        format!("{}.{}", self.schema, self.field)
    }

    fn to_value(&self, value: &Value) -> Option<AttributeValue> {
        match (self.field_type, value) {
            (CustomSchemaType::String, Value::String(s)) => Some(AttributeValue::String(s.clone())),
            (CustomSchemaType::Boolean, Value::Bool(b)) => Some(AttributeValue::Boolean(*b)),
            (CustomSchemaType::Boolean, Value::String(s)) => s.parse().ok().map(AttributeValue::Boolean),
            (CustomSchemaType::Int, Value::Number(n)) => n.as_i64().map(AttributeValue::Integer),
            // The directory returns int64 values as strings.
            (CustomSchemaType::Int, Value::String(s)) => s.parse().ok().map(AttributeValue::Integer),
            _ => None,
        }
    }

    fn to_json(&self, value: &AttributeValue) -> ConnectorResult<Value> {
        match (self.field_type, value) {
            (CustomSchemaType::String, AttributeValue::String(s)) => Ok(json!(s)),
            (CustomSchemaType::Boolean, AttributeValue::Boolean(b)) => Ok(json!(b)),
            (CustomSchemaType::Int, AttributeValue::Integer(i)) => Ok(json!(i)),
            (expected, other) => Err(ConnectorError::invalid_attribute(
                self.attribute_name(),
                format!("expected {:?} value, got {}", expected, other.type_name()),
            )),
        }
    }
}

/// Parse and validate a custom schema declaration.
pub fn parse_custom_schemas(json: &str) -> ConnectorResult<Vec<CustomSchemaDescriptor>> {
    let descriptors: Vec<CustomSchemaDescriptor> = serde_json::from_str(json).map_err(|e| {
        ConnectorError::configuration(format!("custom schemas are not valid JSON: {}", e))
    })?;
    for (i, descriptor) in descriptors.iter().enumerate() {
        validate_descriptor(descriptor, &format!("customSchemas[{}]", i))?;
    }
    Ok(descriptors)
}

fn validate_descriptor(descriptor: &CustomSchemaDescriptor, context: &str) -> ConnectorResult<()> {
    if descriptor.name.trim().is_empty() {
        return Err(ConnectorError::configuration(format!("{}: name cannot be empty", context)));
    }
    if descriptor.name.contains('.') {
        return Err(ConnectorError::configuration(format!(
            "{}: name '{}' cannot contain '.'",
            context, descriptor.name
        )));
    }
    match descriptor.schema_type {
        CustomSchemaType::Object => {
            for (i, inner) in descriptor.inner_schemas.iter().enumerate() {
                validate_descriptor(inner, &format!("{}.innerSchemas[{}]", context, i))?;
            }
        }
        _ if !descriptor.inner_schemas.is_empty() => {
            return Err(ConnectorError::configuration(format!(
                "{}: only object schemas may have innerSchemas",
                context
            )));
        }
        _ => {}
    }
    Ok(())
}

/// The validated set of custom schemas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomSchemas {
    fields: Vec<CustomField>,
}

impl CustomSchemas {
    /// Collect the mappable leaves, warning about everything that is ignored.
    pub fn new(descriptors: &[CustomSchemaDescriptor]) -> Self {
        let mut fields = Vec::new();
        for schema in descriptors {
            if schema.schema_type != CustomSchemaType::Object {
                warn!(
                    "Ignoring top-level custom schema '{}': only object schemas are mapped",
                    schema.name
                );
                continue;
            }
            for inner in &schema.inner_schemas {
                if inner.schema_type == CustomSchemaType::Object {
                    warn!(
                        "Ignoring nested custom schema '{}.{}': nesting beyond one level is not mapped",
                        schema.name, inner.name
                    );
                    continue;
                }
                fields.push(CustomField {
                    schema: schema.name.clone(),
                    field: inner.name.clone(),
                    field_type: inner.schema_type,
                    multi_valued: inner.multi_valued,
                });
            }
        }
        Self { fields }
    }

    /// Parse, validate and collect in one step.
    pub fn from_json(json: &str) -> ConnectorResult<Self> {
        Ok(Self::new(&parse_custom_schemas(json)?))
    }

    pub fn fields(&self) -> &[CustomField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up a flat `Schema.field` name, ignoring case.
    pub fn field(&self, attribute_name: &str) -> Option<&CustomField> {
        let (schema, field) = attribute_name.split_once('.')?;
        self.fields.iter().find(|f| {
            f.schema.eq_ignore_ascii_case(schema) && f.field.eq_ignore_ascii_case(field)
        })
    }

    /// Schema entries for every mapped leaf.
    pub fn attribute_infos(&self) -> Vec<AttributeInfo> {
        self.fields
            .iter()
            .map(|f| {
                let data_type = match f.field_type {
                    CustomSchemaType::Boolean => AttributeType::Boolean,
                    CustomSchemaType::Int => AttributeType::Integer,
                    _ => AttributeType::String,
                };
                let info = AttributeInfo::new(f.attribute_name(), data_type);
                if f.multi_valued { info.multi_valued() } else { info }
            })
            .collect()
    }

    /// Read `customSchemas` into flat attributes.
    ///
    /// With `requested`, only the named attributes are projected.
    pub fn flatten(&self, custom_schemas: Option<&Value>, requested: Option<&[String]>, into: &mut AttributeSet) {
        for field in &self.fields {
            let name = field.attribute_name();
            if let Some(requested) = requested {
                if !requested.iter().any(|r| r.eq_ignore_ascii_case(&name)) {
                    continue;
                }
            }
            let raw = custom_schemas
                .and_then(|c| c.get(&field.schema))
                .and_then(|s| s.get(&field.field));
            let values: Vec<AttributeValue> = match raw {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|item| field.to_value(item.get("value").unwrap_or(item)))
                    .collect(),
                Some(value) => field.to_value(value).into_iter().collect(),
            };
            if values.is_empty() && requested.is_none() {
                continue;
            }
            into.set(name, values);
        }
    }

    /// Build the `customSchemas` payload from the flat attributes present in `attrs`.
    ///
    /// Returns `None` when no custom attribute is present. An attribute present with
    /// no values clears the field.
    pub fn unflatten(&self, attrs: &AttributeSet) -> ConnectorResult<Option<Value>> {
        let mut schemas: Map<String, Value> = Map::new();
        for attribute in attrs.iter() {
            let Some(field) = self.field(&attribute.name) else {
                continue;
            };
            let value = if field.multi_valued {
                let items = attribute
                    .values
                    .iter()
                    .map(|v| field.to_json(v).map(|v| json!({"value": v})))
                    .collect::<ConnectorResult<Vec<Value>>>()?;
                if items.is_empty() { Value::Null } else { Value::Array(items) }
            } else {
                match attribute.single()? {
                    Some(v) => field.to_json(v)?,
                    None => Value::Null,
                }
            };
            let schema = schemas
                .entry(field.schema.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(schema) = schema {
                schema.insert(field.field.clone(), value);
            }
        }
        if schemas.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Value::Object(schemas)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECLARATION: &str = r#"[
        {"name": "G", "type": "object", "innerSchemas": [
            {"name": "c", "type": "boolean"},
            {"name": "level", "type": "int"},
            {"name": "tags", "type": "string", "multiValued": true},
            {"name": "deep", "type": "object", "innerSchemas": [{"name": "x", "type": "string"}]}
        ]},
        {"name": "Loose", "type": "string"}
    ]"#;

    #[test]
    fn test_nesting_and_top_level_leaves_are_ignored() {
        let schemas = CustomSchemas::from_json(DECLARATION).unwrap();
        let names: Vec<String> = schemas.fields().iter().map(|f| f.attribute_name()).collect();
        assert_eq!(names, vec!["G.c", "G.level", "G.tags"]);
    }

    #[test]
    fn test_rejects_unknown_type_and_leaf_children() {
        assert!(matches!(
            parse_custom_schemas(r#"[{"name": "G", "type": "date"}]"#),
            Err(ConnectorError::Configuration { .. })
        ));
        assert!(
            parse_custom_schemas(
                r#"[{"name": "G", "type": "string", "innerSchemas": [{"name": "c", "type": "int"}]}]"#
            )
            .is_err()
        );
        assert!(parse_custom_schemas("not json").is_err());
    }

    #[test]
    fn test_flatten_and_unflatten_single_leaf() {
        let schemas = CustomSchemas::from_json(DECLARATION).unwrap();
        let mut attrs = AttributeSet::new();
        schemas.flatten(Some(&json!({"G": {"c": true}})), None, &mut attrs);

        assert_eq!(attrs.boolean("G.c").unwrap(), Some(true));
        assert_eq!(attrs.len(), 1);
        assert_eq!(schemas.unflatten(&attrs).unwrap(), Some(json!({"G": {"c": true}})));
    }

    #[test]
    fn test_multi_valued_and_numeric_strings() {
        let schemas = CustomSchemas::from_json(DECLARATION).unwrap();
        let mut attrs = AttributeSet::new();
        schemas.flatten(
            Some(&json!({"G": {"level": "7", "tags": [{"value": "a"}, {"value": "b"}]}})),
            None,
            &mut attrs,
        );
        assert_eq!(attrs.values("G.level").unwrap(), &[AttributeValue::Integer(7)]);
        assert_eq!(attrs.get("G.tags").unwrap().strings().unwrap(), vec!["a", "b"]);

        let payload = schemas.unflatten(&attrs).unwrap().unwrap();
        assert_eq!(payload["G"]["tags"], json!([{"value": "a"}, {"value": "b"}]));
        assert_eq!(payload["G"]["level"], json!(7));
    }

    #[test]
    fn test_unflatten_type_mismatch_and_clear() {
        let schemas = CustomSchemas::from_json(DECLARATION).unwrap();
        let wrong = AttributeSet::new().with("G.c", "yes");
        assert!(matches!(
            schemas.unflatten(&wrong),
            Err(ConnectorError::InvalidAttribute { .. })
        ));

        let mut clear = AttributeSet::new();
        clear.set_empty("g.C");
        assert_eq!(schemas.unflatten(&clear).unwrap(), Some(json!({"G": {"c": null}})));
        assert_eq!(schemas.unflatten(&AttributeSet::new().with("other", "x")).unwrap(), None);
    }
}
