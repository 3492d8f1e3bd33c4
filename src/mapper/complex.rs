//! Complex multi-valued account attributes.
//!
//! Each value is an [`AttributeValue::Map`] whose keys and value types are checked
//! against a per-attribute table before being sent.

use crate::error::{ConnectorError, ConnectorResult};
use crate::resource::AttributeValue;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    String,
    Boolean,
}

use KeyType::{Boolean, String as Text};

const ADDRESSES: &[(&str, KeyType)] = &[
    ("type", Text),
    ("customType", Text),
    ("sourceIsStructured", Boolean),
    ("formatted", Text),
    ("poBox", Text),
    ("extendedAddress", Text),
    ("streetAddress", Text),
    ("locality", Text),
    ("region", Text),
    ("postalCode", Text),
    ("country", Text),
    ("countryCode", Text),
    ("primary", Boolean),
];

const PHONES: &[(&str, KeyType)] = &[
    ("value", Text),
    ("type", Text),
    ("customType", Text),
    ("primary", Boolean),
];

const ORGANIZATIONS: &[(&str, KeyType)] = &[
    ("name", Text),
    ("title", Text),
    ("department", Text),
    ("symbol", Text),
    ("location", Text),
    ("description", Text),
    ("domain", Text),
    ("costCenter", Text),
    ("type", Text),
    ("customType", Text),
    ("primary", Boolean),
];

const EXTERNAL_IDS: &[(&str, KeyType)] = &[("value", Text), ("type", Text), ("customType", Text)];

const IMS: &[(&str, KeyType)] = &[
    ("type", Text),
    ("customType", Text),
    ("protocol", Text),
    ("customProtocol", Text),
    ("im", Text),
    ("primary", Boolean),
];

const RELATIONS: &[(&str, KeyType)] = &[("value", Text), ("type", Text), ("customType", Text)];

const EMAILS: &[(&str, KeyType)] = &[
    ("address", Text),
    ("type", Text),
    ("customType", Text),
    ("primary", Boolean),
];

/// Names of the complex account attributes.
pub const COMPLEX_ATTRIBUTES: [&str; 7] = [
    "addresses",
    "phones",
    "organizations",
    "externalIds",
    "ims",
    "relations",
    "emails",
];

/// Key table of a complex attribute.
pub fn key_table(attribute: &str) -> Option<&'static [(&'static str, KeyType)]> {
    let table = match attribute {
        "addresses" => ADDRESSES,
        "phones" => PHONES,
        "organizations" => ORGANIZATIONS,
        "externalIds" => EXTERNAL_IDS,
        "ims" => IMS,
        "relations" => RELATIONS,
        "emails" => EMAILS,
        _ => return None,
    };
    Some(table)
}

/// Build the provider array for a complex attribute.
pub fn to_json(attribute: &str, values: &[AttributeValue]) -> ConnectorResult<Value> {
    let table = key_table(attribute).ok_or_else(|| {
        ConnectorError::invalid_attribute(attribute, "is not a complex attribute")
    })?;
    if values.is_empty() {
        return Ok(Value::Null);
    }
    let mut items = Vec::with_capacity(values.len());
    for value in values {
        let AttributeValue::Map(map) = value else {
            return Err(ConnectorError::invalid_attribute(
                attribute,
                format!("expected map values, got {}", value.type_name()),
            ));
        };
        let mut item = Map::new();
        for (key, entry) in map {
            let Some((name, key_type)) = table.iter().find(|(name, _)| name.eq_ignore_ascii_case(key)) else {
                return Err(ConnectorError::invalid_attribute(
                    format!("{}.{}", attribute, key),
                    "unknown key",
                ));
            };
            let json = match (key_type, entry) {
                (KeyType::String, AttributeValue::String(s)) => Value::String(s.clone()),
                (KeyType::Boolean, AttributeValue::Boolean(b)) => Value::Bool(*b),
                (expected, other) => {
                    return Err(ConnectorError::invalid_attribute(
                        format!("{}.{}", attribute, name),
                        format!("expected {:?}, got {}", expected, other.type_name()),
                    ));
                }
            };
            item.insert(name.to_string(), json);
        }
        items.push(Value::Object(item));
    }
    Ok(Value::Array(items))
}

/// Read the provider array of a complex attribute, keeping known keys only.
pub fn from_json(attribute: &str, value: &Value) -> Vec<AttributeValue> {
    let (Some(table), Some(items)) = (key_table(attribute), value.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|item| {
            let map: BTreeMap<String, AttributeValue> = table
                .iter()
                .filter_map(|(name, key_type)| {
                    let converted = match (key_type, item.get(*name)?) {
                        (KeyType::String, Value::String(s)) => AttributeValue::String(s.clone()),
                        (KeyType::Boolean, Value::Bool(b)) => AttributeValue::Boolean(*b),
                        _ => return None,
                    };
                    Some((name.to_string(), converted))
                })
                .collect();
            AttributeValue::Map(map)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn phone(value: &str, primary: bool) -> AttributeValue {
        let mut map = BTreeMap::new();
        map.insert("value".to_string(), AttributeValue::from(value));
        map.insert("type".to_string(), AttributeValue::from("work"));
        map.insert("primary".to_string(), AttributeValue::from(primary));
        AttributeValue::Map(map)
    }

    #[test]
    fn test_builds_typed_items() {
        let json = to_json("phones", &[phone("555-0100", true)]).unwrap();
        assert_eq!(json, json!([{"primary": true, "type": "work", "value": "555-0100"}]));
        assert_eq!(from_json("phones", &json), vec![phone("555-0100", true)]);
    }

    #[test]
    fn test_rejects_unknown_keys_and_wrong_types() {
        let mut map = BTreeMap::new();
        map.insert("colour".to_string(), AttributeValue::from("red"));
        assert!(to_json("phones", &[AttributeValue::Map(map)]).is_err());

        let mut map = BTreeMap::new();
        map.insert("primary".to_string(), AttributeValue::from("yes"));
        let err = to_json("emails", &[AttributeValue::Map(map)]).unwrap_err();
        assert!(err.to_string().contains("emails.primary"));

        assert!(to_json("phones", &[AttributeValue::from("555")]).is_err());
    }

    #[test]
    fn test_reading_drops_provider_only_keys() {
        let json = json!([{"value": "abc", "type": "organization", "etag": "x"}]);
        let values = from_json("externalIds", &json);
        assert_eq!(values[0].as_map().unwrap().len(), 2);
    }
}
