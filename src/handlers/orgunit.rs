use crate::client::{DirectoryClient, endpoints};
use crate::error::ConnectorResult;
use crate::executor::{Decode, Discard};
use crate::filter::{FilterNode, translate};
use crate::handlers::{
    HandlerContext, ResourceHandler, ResultCallback, SearchOptions, SearchResult, delta_patch, has_fields,
    or_unknown, unknown,
};
use crate::mapper::{self, MappingMode, OrgUnitMapper, ResourceMapper};
use crate::pagination::fetch_one;
use crate::resource::{AttributeDelta, AttributeSet, ResourceType, Uid};
use crate::schema::ObjectClassInfo;
use crate::transport::ApiRequest;
use async_trait::async_trait;
use log::debug;
use serde_json::Value;

/// Organisational units. The listing endpoint is not paged.
pub struct OrgUnitHandler {
    context: HandlerContext,
}

impl OrgUnitHandler {
    pub fn new(context: HandlerContext) -> Self {
        Self { context }
    }

    fn client(&self) -> &DirectoryClient {
        &self.context.client
    }

    fn customer(&self) -> &str {
        &self.context.config.customer_id
    }

    async fn fetch(&self, path: &str) -> ConnectorResult<Option<Value>> {
        fetch_one(self.client(), ApiRequest::get(endpoints::org_unit(self.customer(), path))).await
    }
}

#[async_trait]
impl ResourceHandler for OrgUnitHandler {
    fn resource_type(&self) -> ResourceType {
        ResourceType::OrgUnit
    }

    fn object_class_info(&self) -> ObjectClassInfo {
        ObjectClassInfo {
            resource_type: ResourceType::OrgUnit,
            attributes: OrgUnitMapper.attribute_infos(),
        }
    }

    async fn create(&self, attrs: &AttributeSet) -> ConnectorResult<Uid> {
        let payload = OrgUnitMapper.to_provider(attrs, MappingMode::Create)?;
        let unit: Value = self
            .client()
            .call(ApiRequest::post(endpoints::org_units(self.customer()), payload), &Decode::new())
            .await?;
        mapper::uid_of(&unit, "orgUnitPath")
    }

    async fn update(&self, uid: &Uid, attrs: &AttributeSet) -> ConnectorResult<Uid> {
        let payload = OrgUnitMapper.to_provider(attrs, MappingMode::Update)?;
        let unit: Value = if has_fields(&payload) {
            self.client()
                .call(
                    ApiRequest::patch(endpoints::org_unit(self.customer(), uid.value()), payload),
                    &Decode::new(),
                )
                .await
                .map_err(or_unknown(ResourceType::OrgUnit, uid))?
        } else {
            self.fetch(uid.value())
                .await?
                .ok_or_else(|| unknown(ResourceType::OrgUnit, uid))?
        };
        mapper::uid_of(&unit, "orgUnitPath")
    }

    async fn update_delta(&self, uid: &Uid, deltas: &[AttributeDelta]) -> ConnectorResult<Uid> {
        let deltas: Vec<&AttributeDelta> = deltas.iter().collect();
        let attrs = delta_patch(&OrgUnitMapper, uid, &deltas, self.fetch(uid.value())).await?;
        self.update(uid, &attrs).await
    }

    async fn delete(&self, uid: &Uid) -> ConnectorResult<()> {
        self.client()
            .call(ApiRequest::delete(endpoints::org_unit(self.customer(), uid.value())), &Discard)
            .await
            .map_err(or_unknown(ResourceType::OrgUnit, uid))
    }

    async fn search(
        &self,
        filter: Option<&FilterNode>,
        options: &SearchOptions,
        callback: &mut ResultCallback<'_>,
    ) -> ConnectorResult<SearchResult> {
        let translation = translate(ResourceType::OrgUnit, filter, &self.context.config.custom_schemas)?;
        let scope = translation.scope;
        let requested = options.requested();

        if let Some(path) = &scope.key {
            if let Some(unit) = self.fetch(path).await? {
                callback(OrgUnitMapper.from_provider(&unit, requested)?);
            }
            return Ok(SearchResult::default());
        }
        if options.page_size.is_some() {
            debug!("Org units are listed in one response, ignoring page size");
        }

        let request = ApiRequest::get(endpoints::org_units(self.customer()))
            .with_optional_query("orgUnitPath", scope.parent_org_unit_path.clone())
            .with_query("type", scope.org_unit_type.as_deref().unwrap_or("all"));
        let body: Value = self.client().call(request, &Decode::new()).await?;
        let units = body
            .get("organizationUnits")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        debug!("Listed {} org units", units.len());
        for unit in units {
            if !callback(OrgUnitMapper.from_provider(unit, requested)?) {
                break;
            }
        }
        Ok(SearchResult::default())
    }
}
