//! Organisational units, identified by their full path.

use crate::error::ConnectorResult;
use crate::mapper::{self, Field, MappingMode, ResourceMapper};
use crate::resource::names::NAME;
use crate::resource::{AttributeSet, ConnectorObject, ResourceType};
use crate::schema::AttributeInfo;
use serde_json::{Map, Value};

pub(crate) static FIELDS: &[Field] = &[
    Field::string(NAME, "name").required(),
    Field::string("parentOrgUnitPath", "parentOrgUnitPath").required(),
    Field::string("description", "description"),
    Field::boolean("blockInheritance", "blockInheritance"),
    Field::string("orgUnitPath", "orgUnitPath").read_only(),
    Field::string("orgUnitId", "orgUnitId").read_only(),
    Field::string("parentOrgUnitId", "parentOrgUnitId").read_only(),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct OrgUnitMapper;

impl ResourceMapper for OrgUnitMapper {
    fn resource_type(&self) -> ResourceType {
        ResourceType::OrgUnit
    }

    fn attribute_infos(&self) -> Vec<AttributeInfo> {
        mapper::attribute_infos(FIELDS)
    }

    fn to_provider(&self, attrs: &AttributeSet, mode: MappingMode) -> ConnectorResult<Value> {
        mapper::validate(ResourceType::OrgUnit, FIELDS, attrs, mode, |_| false)?;
        let mut payload = Map::new();
        mapper::write_fields(FIELDS, attrs, &mut payload)?;
        Ok(Value::Object(payload))
    }

    fn from_provider(&self, object: &Value, requested: Option<&[String]>) -> ConnectorResult<ConnectorObject> {
        let uid = mapper::uid_of(object, "orgUnitPath")?;
        let name = mapper::get_str(object, "name").to_string();
        let mut attributes = AttributeSet::new();
        mapper::read_fields(FIELDS, object, requested, &mut attributes);
        Ok(ConnectorObject::new(ResourceType::OrgUnit, uid, name).with_attributes(attributes))
    }
}
