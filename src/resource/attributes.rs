//! Typed attribute bags used for create, update and search results.
//!
//! An [`AttributeSet`] keeps insertion order and compares names without regard to
//! case while preserving the caller's spelling. Whether an attribute is present at
//! all is significant: an update only touches the attributes it carries, and an
//! attribute carried with no values clears the field.

use crate::error::{ConnectorError, ConnectorResult};
use std::collections::BTreeMap;

/// A single typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    Binary(Vec<u8>),
    /// Nested name → value map, used for complex multi-valued structures.
    Map(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Get the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the integer value, if this is an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the bytes, if this is binary.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Get the nested map, if this is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, AttributeValue>> {
        match self {
            AttributeValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Short type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::String(_) => "string",
            AttributeValue::Boolean(_) => "boolean",
            AttributeValue::Integer(_) => "integer",
            AttributeValue::Binary(_) => "binary",
            AttributeValue::Map(_) => "map",
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<i32> for AttributeValue {
    fn from(i: i32) -> Self {
        AttributeValue::Integer(i64::from(i))
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Binary(bytes)
    }
}

impl From<BTreeMap<String, AttributeValue>> for AttributeValue {
    fn from(map: BTreeMap<String, AttributeValue>) -> Self {
        AttributeValue::Map(map)
    }
}

/// A named attribute with zero or more values.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<AttributeValue>,
}

impl Attribute {
    /// Create an attribute.
    pub fn new(name: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Whether this attribute's name matches `name`, ignoring case.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// The only value, or `None` when empty.
    ///
    /// Fails when more than one value is present.
    pub fn single(&self) -> ConnectorResult<Option<&AttributeValue>> {
        match self.values.as_slice() {
            [] => Ok(None),
            [value] => Ok(Some(value)),
            _ => Err(ConnectorError::invalid_attribute(
                &self.name,
                "expected a single value",
            )),
        }
    }

    /// The only value as a string, or `None` when empty.
    pub fn single_string(&self) -> ConnectorResult<Option<&str>> {
        match self.single()? {
            None => Ok(None),
            Some(AttributeValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(ConnectorError::invalid_attribute(
                &self.name,
                format!("expected a string, got {}", other.type_name()),
            )),
        }
    }

    /// The only value as a boolean, or `None` when empty.
    pub fn single_bool(&self) -> ConnectorResult<Option<bool>> {
        match self.single()? {
            None => Ok(None),
            Some(AttributeValue::Boolean(b)) => Ok(Some(*b)),
            Some(other) => Err(ConnectorError::invalid_attribute(
                &self.name,
                format!("expected a boolean, got {}", other.type_name()),
            )),
        }
    }

    /// Every value as a string.
    pub fn strings(&self) -> ConnectorResult<Vec<&str>> {
        self.values
            .iter()
            .map(|v| {
                v.as_str().ok_or_else(|| {
                    ConnectorError::invalid_attribute(
                        &self.name,
                        format!("expected string values, got {}", v.type_name()),
                    )
                })
            })
            .collect()
    }
}

/// Ordered mapping of attribute name to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    attributes: Vec<Attribute>,
}

impl AttributeSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute, replacing any attribute of the same name (any case)
    /// in place.
    pub fn set<V: Into<AttributeValue>>(
        &mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) {
        let name = name.into();
        let values: Vec<AttributeValue> = values.into_iter().map(Into::into).collect();
        match self.attributes.iter_mut().find(|a| a.is(&name)) {
            Some(existing) => existing.values = values,
            None => self.attributes.push(Attribute::new(name, values)),
        }
    }

    /// Set a single-valued attribute.
    pub fn set_single(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.set(name, [value.into()]);
    }

    /// Mark an attribute as present with no values.
    pub fn set_empty(&mut self, name: impl Into<String>) {
        self.set(name, Vec::<AttributeValue>::new());
    }

    /// Builder-style [`set_single`](Self::set_single).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set_single(name, value);
        self
    }

    /// Builder-style [`set`](Self::set).
    pub fn with_values<V: Into<AttributeValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.set(name, values);
        self
    }

    /// Look up an attribute by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.is(name))
    }

    /// Whether an attribute is present, even with no values.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The values of an attribute.
    pub fn values(&self, name: &str) -> Option<&[AttributeValue]> {
        self.get(name).map(|a| a.values.as_slice())
    }

    /// The single string value of an attribute.
    pub fn string(&self, name: &str) -> ConnectorResult<Option<&str>> {
        match self.get(name) {
            Some(attribute) => attribute.single_string(),
            None => Ok(None),
        }
    }

    /// The single boolean value of an attribute.
    pub fn boolean(&self, name: &str) -> ConnectorResult<Option<bool>> {
        match self.get(name) {
            Some(attribute) => attribute.single_bool(),
            None => Ok(None),
        }
    }

    /// Remove an attribute, returning it.
    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        let index = self.attributes.iter().position(|a| a.is(name))?;
        Some(self.attributes.remove(index))
    }

    /// Iterate attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    /// Attribute names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl FromIterator<Attribute> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        let mut set = AttributeSet::new();
        for attribute in iter {
            set.set(attribute.name, attribute.values);
        }
        set
    }
}

impl IntoIterator for AttributeSet {
    type Item = Attribute;
    type IntoIter = std::vec::IntoIter<Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.into_iter()
    }
}

/// A value-level change to one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDelta {
    pub name: String,
    pub values_to_add: Vec<AttributeValue>,
    pub values_to_remove: Vec<AttributeValue>,
    /// When set, the attribute's values are replaced wholesale.
    pub values_to_replace: Option<Vec<AttributeValue>>,
}

impl AttributeDelta {
    /// Delta adding values.
    pub fn add<V: Into<AttributeValue>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            name: name.into(),
            values_to_add: values.into_iter().map(Into::into).collect(),
            values_to_remove: Vec::new(),
            values_to_replace: None,
        }
    }

    /// Delta removing values.
    pub fn remove<V: Into<AttributeValue>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            name: name.into(),
            values_to_add: Vec::new(),
            values_to_remove: values.into_iter().map(Into::into).collect(),
            values_to_replace: None,
        }
    }

    /// Delta replacing all values.
    pub fn replace<V: Into<AttributeValue>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            name: name.into(),
            values_to_add: Vec::new(),
            values_to_remove: Vec::new(),
            values_to_replace: Some(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether this delta targets `name`, ignoring case.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}
