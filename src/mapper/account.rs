//! User accounts.

use crate::error::{ConnectorError, ConnectorResult};
use crate::mapper::{self, Field, MappingMode, ResourceMapper};
use crate::resource::names::{ENABLE, GROUPS, NAME, PASSWORD, PHOTO};
use crate::resource::{AttributeSet, ConnectorObject, ResourceType};
use crate::schema::{AttributeInfo, AttributeType, CustomSchemas};
use serde_json::{Map, Value};

pub(crate) static FIELDS: &[Field] = &[
    Field::string(NAME, "primaryEmail").required(),
    Field::string(PASSWORD, "password").required().write_only(),
    Field::string("hashFunction", "hashFunction").write_only(),
    Field::string("givenName", "name.givenName").required(),
    Field::string("familyName", "name.familyName").required(),
    Field::string("fullName", "name.fullName").read_only(),
    Field::boolean(ENABLE, "suspended").inverted(),
    Field::boolean("suspended", "suspended").read_only(),
    Field::string("suspensionReason", "suspensionReason").read_only(),
    Field::string("orgUnitPath", "orgUnitPath"),
    Field::boolean("changePasswordAtNextLogin", "changePasswordAtNextLogin"),
    Field::boolean("includeInGlobalAddressList", "includeInGlobalAddressList"),
    Field::boolean("ipWhitelisted", "ipWhitelisted"),
    Field::string("recoveryEmail", "recoveryEmail"),
    Field::string("recoveryPhone", "recoveryPhone"),
    Field::boolean("isAdmin", "isAdmin").side_effect(),
    Field::boolean("isDelegatedAdmin", "isDelegatedAdmin").read_only(),
    Field::boolean("isEnrolledIn2Sv", "isEnrolledIn2Sv").read_only(),
    Field::boolean("isEnforcedIn2Sv", "isEnforcedIn2Sv").read_only(),
    Field::boolean("isMailboxSetup", "isMailboxSetup").read_only(),
    Field::boolean("agreedToTerms", "agreedToTerms").read_only(),
    Field::string("aliases", "aliases").multi().side_effect(),
    Field::string("nonEditableAliases", "nonEditableAliases").multi().read_only(),
    Field::string("customerId", "customerId").read_only(),
    Field::string("creationTime", "creationTime").read_only(),
    Field::string("lastLoginTime", "lastLoginTime").read_only(),
    Field::string("thumbnailPhotoUrl", "thumbnailPhotoUrl").read_only(),
    Field::complex("addresses"),
    Field::complex("phones"),
    Field::complex("organizations"),
    Field::complex("externalIds"),
    Field::complex("ims"),
    Field::complex("relations"),
    Field::complex("emails"),
    Field::string(GROUPS, "").multi().virtual_field(),
    Field::new(PHOTO, "", AttributeType::Binary).virtual_field(),
];

/// Maps accounts, including configured custom schema leaves.
#[derive(Debug, Clone, Default)]
pub struct AccountMapper {
    custom: CustomSchemas,
}

impl AccountMapper {
    pub fn new(custom: CustomSchemas) -> Self {
        Self { custom }
    }

    pub fn custom_schemas(&self) -> &CustomSchemas {
        &self.custom
    }
}

impl ResourceMapper for AccountMapper {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Account
    }

    fn attribute_infos(&self) -> Vec<AttributeInfo> {
        let mut infos = mapper::attribute_infos(FIELDS);
        infos.extend(self.custom.attribute_infos());
        infos
    }

    fn to_provider(&self, attrs: &AttributeSet, mode: MappingMode) -> ConnectorResult<Value> {
        mapper::validate(ResourceType::Account, FIELDS, attrs, mode, |name| {
            self.custom.field(name).is_some()
        })?;
        let mut payload = Map::new();
        mapper::write_fields(FIELDS, attrs, &mut payload)?;
        if attrs.contains("hashFunction") && !attrs.contains(PASSWORD) {
            return Err(ConnectorError::invalid_attribute(
                "hashFunction",
                "requires __PASSWORD__",
            ));
        }
        if let Some(custom) = self.custom.unflatten(attrs)? {
            payload.insert("customSchemas".to_string(), custom);
        }
        Ok(Value::Object(payload))
    }

    fn from_provider(&self, object: &Value, requested: Option<&[String]>) -> ConnectorResult<ConnectorObject> {
        let uid = mapper::uid_of(object, "id")?;
        let name = mapper::get_str(object, "primaryEmail").to_string();
        let mut attributes = AttributeSet::new();
        mapper::read_fields(FIELDS, object, requested, &mut attributes);
        self.custom
            .flatten(object.get("customSchemas"), requested, &mut attributes);
        Ok(ConnectorObject::new(ResourceType::Account, uid, name).with_attributes(attributes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::AttributeValue;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn create_attrs() -> AttributeSet {
        AttributeSet::new()
            .with(NAME, "jane@example.com")
            .with(PASSWORD, "s3cret!")
            .with("givenName", "Jane")
            .with("familyName", "Doe")
    }

    #[test]
    fn test_create_requires_core_attributes() {
        let mapper = AccountMapper::default();
        mapper.to_provider(&create_attrs(), MappingMode::Create).unwrap();

        for missing in [NAME, PASSWORD, "givenName", "familyName"] {
            let mut attrs = create_attrs();
            attrs.remove(missing);
            let err = mapper.to_provider(&attrs, MappingMode::Create).unwrap_err();
            assert!(matches!(err, ConnectorError::InvalidAttribute { .. }), "{}", missing);
        }
    }

    #[test]
    fn test_create_payload_shape() {
        let mut org = BTreeMap::new();
        org.insert("name".to_string(), AttributeValue::from("Acme"));
        org.insert("primary".to_string(), AttributeValue::from(true));

        let attrs = create_attrs()
            .with(ENABLE, true)
            .with_values("organizations", [AttributeValue::Map(org)])
            .with_values("aliases", ["jd@example.com"]);
        let payload = AccountMapper::default()
            .to_provider(&attrs, MappingMode::Create)
            .unwrap();

        assert_eq!(
            payload,
            json!({
                "primaryEmail": "jane@example.com",
                "password": "s3cret!",
                "name": {"givenName": "Jane", "familyName": "Doe"},
                "suspended": false,
                "organizations": [{"name": "Acme", "primary": true}]
            })
        );
    }

    #[test]
    fn test_update_is_minimal_and_clears() {
        let mut attrs = AttributeSet::new().with("familyName", "Smith");
        attrs.set_empty("recoveryPhone");
        let payload = AccountMapper::default()
            .to_provider(&attrs, MappingMode::Update)
            .unwrap();
        assert_eq!(payload, json!({"name": {"familyName": "Smith"}, "recoveryPhone": null}));
    }

    #[test]
    fn test_projection() {
        let object = json!({
            "id": "1001",
            "etag": "\"abc\"",
            "primaryEmail": "jane@example.com",
            "name": {"givenName": "Jane", "familyName": "Doe", "fullName": "Jane Doe"},
            "suspended": false,
            "customerId": "C01"
        });
        let mapper = AccountMapper::default();

        let all = mapper.from_provider(&object, None).unwrap();
        assert_eq!(all.uid.value(), "1001");
        assert_eq!(all.uid.revision(), Some("\"abc\""));
        assert_eq!(all.name, "jane@example.com");
        assert_eq!(all.attributes.boolean(ENABLE).unwrap(), Some(true));
        assert!(!all.attributes.contains(GROUPS));
        assert!(!all.attributes.contains(PASSWORD));

        let some = mapper
            .from_provider(&object, Some(&["fullName".to_string()]))
            .unwrap();
        assert_eq!(some.attributes.len(), 1);
        assert_eq!(some.attributes.string("fullName").unwrap(), Some("Jane Doe"));
        assert_eq!(some.uid.revision(), Some("\"abc\""));
    }

    #[test]
    fn test_read_object_maps_back_to_its_settable_fields() {
        let custom = CustomSchemas::from_json(
            r#"[{"name": "Employment", "type": "object", "innerSchemas": [{"name": "costCenter", "type": "string"}]}]"#,
        )
        .unwrap();
        let mapper = AccountMapper::new(custom);
        let object = json!({
            "id": "1001",
            "etag": "\"abc\"",
            "primaryEmail": "jane@example.com",
            "name": {"givenName": "Jane", "familyName": "Doe", "fullName": "Jane Doe"},
            "suspended": false,
            "orgUnitPath": "/Eng",
            "recoveryEmail": "jane@home.example",
            "isAdmin": false,
            "aliases": ["jd@example.com"],
            "phones": [{"value": "+1-555-0100", "type": "work", "primary": true}],
            "customerId": "C01",
            "creationTime": "2024-01-01T00:00:00.000Z",
            "customSchemas": {"Employment": {"costCenter": "CC-7"}}
        });

        let read = mapper.from_provider(&object, None).unwrap();
        let err = mapper.to_provider(&read.attributes, MappingMode::Update).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidAttribute { .. }));

        let settable = mapper.settable(&read.attributes, MappingMode::Update);
        assert!(!settable.contains("fullName"));
        assert!(!settable.contains("customerId"));
        let payload = mapper.to_provider(&settable, MappingMode::Update).unwrap();

        assert_eq!(
            payload,
            json!({
                "primaryEmail": "jane@example.com",
                "name": {"givenName": "Jane", "familyName": "Doe"},
                "suspended": false,
                "orgUnitPath": "/Eng",
                "recoveryEmail": "jane@home.example",
                "phones": [{"value": "+1-555-0100", "type": "work", "primary": true}],
                "customSchemas": {"Employment": {"costCenter": "CC-7"}}
            })
        );
    }
}
