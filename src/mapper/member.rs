//! Group membership edges.
//!
//! The directory's member object does not name its group, so handlers add a
//! `group` key before projecting. The uid of an edge is `group/member`.

use crate::error::{ConnectorError, ConnectorResult};
use crate::mapper::{self, Field, MappingMode, ResourceMapper};
use crate::resource::{AttributeSet, ConnectorObject, ResourceType, Uid};
use crate::schema::AttributeInfo;
use serde_json::{Map, Value, json};

pub const ROLES: [&str; 3] = ["OWNER", "MANAGER", "MEMBER"];
pub const DEFAULT_ROLE: &str = "MEMBER";

pub(crate) static FIELDS: &[Field] = &[
    Field::string("group", "group").required().immutable(),
    Field::string("member", "email").required().immutable(),
    Field::string("role", "role"),
    Field::string("type", "type").read_only(),
    Field::string("status", "status").read_only(),
    Field::string("delivery_settings", "delivery_settings"),
];

/// Split an edge uid into group and member keys.
pub fn split_uid(uid: &str) -> ConnectorResult<(&str, &str)> {
    match uid.split_once('/') {
        Some((group, member)) if !group.is_empty() && !member.is_empty() => Ok((group, member)),
        _ => Err(ConnectorError::invalid_attribute(
            "__UID__",
            format!("'{}' is not of the form group/member", uid),
        )),
    }
}

/// Normalise a role, rejecting unknown ones.
pub fn normalize_role(role: &str) -> ConnectorResult<String> {
    let upper = role.trim().to_ascii_uppercase();
    if ROLES.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(ConnectorError::invalid_attribute(
            "role",
            format!("'{}' is not one of {}", role, ROLES.join(", ")),
        ))
    }
}

/// Maps membership edges.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberMapper;

impl ResourceMapper for MemberMapper {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Membership
    }

    fn attribute_infos(&self) -> Vec<AttributeInfo> {
        mapper::attribute_infos(FIELDS)
    }

    fn to_provider(&self, attrs: &AttributeSet, mode: MappingMode) -> ConnectorResult<Value> {
        mapper::validate(ResourceType::Membership, FIELDS, attrs, mode, |_| false)?;
        let mut payload = Map::new();
        mapper::write_fields(FIELDS, attrs, &mut payload)?;
        match attrs.string("role")? {
            Some(role) => {
                payload.insert("role".to_string(), json!(normalize_role(role)?));
            }
            None if mode == MappingMode::Create => {
                payload.insert("role".to_string(), json!(DEFAULT_ROLE));
            }
            None => {}
        }
        Ok(Value::Object(payload))
    }

    fn from_provider(&self, object: &Value, requested: Option<&[String]>) -> ConnectorResult<ConnectorObject> {
        let group = mapper::get_str(object, "group");
        let member = mapper::get_str(object, "email");
        if group.is_empty() || member.is_empty() {
            return Err(ConnectorError::Fatal {
                status: 200,
                reason: "malformedResponse".to_string(),
                message: "member object without group or email".to_string(),
            });
        }
        let key = format!("{}/{}", group, member);
        let revision = object.get("etag").and_then(Value::as_str).map(str::to_string);
        let mut attributes = AttributeSet::new();
        mapper::read_fields(FIELDS, object, requested, &mut attributes);
        Ok(ConnectorObject::new(ResourceType::Membership, Uid::with_revision(key.clone(), revision), key)
            .with_attributes(attributes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_defaults_role() {
        let attrs = AttributeSet::new()
            .with("group", "staff@example.com")
            .with("member", "jane@example.com");
        let payload = MemberMapper.to_provider(&attrs, MappingMode::Create).unwrap();
        assert_eq!(
            payload,
            json!({"group": "staff@example.com", "email": "jane@example.com", "role": "MEMBER"})
        );
    }

    #[test]
    fn test_role_validation_and_immutability() {
        let update = AttributeSet::new().with("role", "owner");
        assert_eq!(
            MemberMapper.to_provider(&update, MappingMode::Update).unwrap(),
            json!({"role": "OWNER"})
        );
        let bad = AttributeSet::new().with("role", "ADMIN");
        assert!(MemberMapper.to_provider(&bad, MappingMode::Update).is_err());
        let moved = AttributeSet::new().with("group", "other@example.com");
        assert!(MemberMapper.to_provider(&moved, MappingMode::Update).is_err());
    }

    #[test]
    fn test_uid_is_composite() {
        let object = json!({"group": "staff@example.com", "email": "jane@example.com", "role": "MEMBER", "etag": "e"});
        let edge = MemberMapper.from_provider(&object, None).unwrap();
        assert_eq!(edge.uid.value(), "staff@example.com/jane@example.com");
        assert_eq!(split_uid(edge.uid.value()).unwrap(), ("staff@example.com", "jane@example.com"));
        assert!(split_uid("nogroup").is_err());
    }
}
