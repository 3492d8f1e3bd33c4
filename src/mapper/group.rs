use crate::error::ConnectorResult;
use crate::mapper::{self, Field, MappingMode, ResourceMapper};
use crate::resource::names::{MEMBERS, NAME};
use crate::resource::{AttributeSet, ConnectorObject, ResourceType};
use crate::schema::{AttributeInfo, AttributeType};
use serde_json::{Map, Value};

pub(crate) static FIELDS: &[Field] = &[
    Field::string(NAME, "email").required(),
    Field::string("name", "name"),
    Field::string("description", "description"),
    Field::string("aliases", "aliases").multi().side_effect(),
    Field::string("nonEditableAliases", "nonEditableAliases").multi().read_only(),
    Field::new("directMembersCount", "directMembersCount", AttributeType::Integer).read_only(),
    Field::boolean("adminCreated", "adminCreated").read_only(),
    Field::string(MEMBERS, "").multi().virtual_field(),
];

/// Maps groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupMapper;

impl ResourceMapper for GroupMapper {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Group
    }

    fn attribute_infos(&self) -> Vec<AttributeInfo> {
        mapper::attribute_infos(FIELDS)
    }

    fn to_provider(&self, attrs: &AttributeSet, mode: MappingMode) -> ConnectorResult<Value> {
        mapper::validate(ResourceType::Group, FIELDS, attrs, mode, |_| false)?;
        let mut payload = Map::new();
        mapper::write_fields(FIELDS, attrs, &mut payload)?;
        Ok(Value::Object(payload))
    }

    fn from_provider(&self, object: &Value, requested: Option<&[String]>) -> ConnectorResult<ConnectorObject> {
        let uid = mapper::uid_of(object, "id")?;
        let name = mapper::get_str(object, "email").to_string();
        let mut attributes = AttributeSet::new();
        mapper::read_fields(FIELDS, object, requested, &mut attributes);
        Ok(ConnectorObject::new(ResourceType::Group, uid, name).with_attributes(attributes))
    }
}
