//! Product license assignments. The uid is `productId/skuId/userId`.

use crate::error::{ConnectorError, ConnectorResult};
use crate::mapper::{self, Field, MappingMode, ResourceMapper};
use crate::resource::{AttributeSet, ConnectorObject, ResourceType, Uid};
use crate::schema::AttributeInfo;
use serde_json::{Map, Value};

pub(crate) static FIELDS: &[Field] = &[
    Field::string("productId", "productId").required().immutable(),
    Field::string("skuId", "skuId").required(),
    Field::string("userId", "userId").required().immutable(),
    Field::string("productName", "productName").read_only(),
    Field::string("skuName", "skuName").read_only(),
];

/// Split an assignment uid into product, SKU and user.
pub fn split_uid(uid: &str) -> ConnectorResult<(&str, &str, &str)> {
    let mut parts = uid.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(product), Some(sku), Some(user))
            if !product.is_empty() && !sku.is_empty() && !user.is_empty() =>
        {
            Ok((product, sku, user))
        }
        _ => Err(ConnectorError::invalid_attribute(
            "__UID__",
            format!("'{}' is not of the form productId/skuId/userId", uid),
        )),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LicenseMapper;

impl ResourceMapper for LicenseMapper {
    fn resource_type(&self) -> ResourceType {
        ResourceType::LicenseAssignment
    }

    fn attribute_infos(&self) -> Vec<AttributeInfo> {
        mapper::attribute_infos(FIELDS)
    }

    fn to_provider(&self, attrs: &AttributeSet, mode: MappingMode) -> ConnectorResult<Value> {
        mapper::validate(ResourceType::LicenseAssignment, FIELDS, attrs, mode, |_| false)?;
        let mut payload = Map::new();
        mapper::write_fields(FIELDS, attrs, &mut payload)?;
        Ok(Value::Object(payload))
    }

    fn from_provider(&self, object: &Value, requested: Option<&[String]>) -> ConnectorResult<ConnectorObject> {
        let key = format!(
            "{}/{}/{}",
            mapper::get_str(object, "productId"),
            mapper::get_str(object, "skuId"),
            mapper::get_str(object, "userId")
        );
        split_uid(&key).map_err(|_| ConnectorError::Fatal {
            status: 200,
            reason: "malformedResponse".to_string(),
            message: "license assignment without product, SKU or user".to_string(),
        })?;
        let revision = object.get("etags").and_then(Value::as_str).map(str::to_string);
        let mut attributes = AttributeSet::new();
        mapper::read_fields(FIELDS, object, requested, &mut attributes);
        Ok(
            ConnectorObject::new(ResourceType::LicenseAssignment, Uid::with_revision(key.clone(), revision), key)
                .with_attributes(attributes),
        )
    }
}
