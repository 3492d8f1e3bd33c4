//! License assignments. Listings are per product (optionally per SKU) and need
//! the customer id.

use crate::client::{DirectoryClient, endpoints};
use crate::error::{ConnectorError, ConnectorResult};
use crate::executor::{Decode, Discard};
use crate::filter::{FilterNode, translate};
use crate::handlers::{
    HandlerContext, ResourceHandler, ResultCallback, SearchOptions, SearchResult, delta_patch, or_unknown,
};
use crate::mapper::license::split_uid;
use crate::mapper::{LicenseMapper, MappingMode, ResourceMapper};
use crate::pagination::fetch_one;
use crate::resource::{AttributeDelta, AttributeSet, ResourceType, Uid};
use crate::schema::ObjectClassInfo;
use crate::transport::ApiRequest;
use async_trait::async_trait;
use log::debug;
use serde_json::{Value, json};

pub struct LicenseHandler {
    context: HandlerContext,
}

impl LicenseHandler {
    pub fn new(context: HandlerContext) -> Self {
        Self { context }
    }

    fn client(&self) -> &DirectoryClient {
        &self.context.client
    }

    async fn fetch(&self, uid: &str) -> ConnectorResult<Option<Value>> {
        let (product, sku, user) = split_uid(uid)?;
        fetch_one(self.client(), ApiRequest::get(endpoints::license(product, sku, user))).await
    }
}

#[async_trait]
impl ResourceHandler for LicenseHandler {
    fn resource_type(&self) -> ResourceType {
        ResourceType::LicenseAssignment
    }

    fn object_class_info(&self) -> ObjectClassInfo {
        ObjectClassInfo {
            resource_type: ResourceType::LicenseAssignment,
            attributes: LicenseMapper.attribute_infos(),
        }
    }

    async fn create(&self, attrs: &AttributeSet) -> ConnectorResult<Uid> {
        let payload = LicenseMapper.to_provider(attrs, MappingMode::Create)?;
        let product = payload["productId"].as_str().unwrap_or_default();
        let sku = payload["skuId"].as_str().unwrap_or_default();
        let body = json!({"userId": payload["userId"]});
        let assignment: Value = self
            .client()
            .call(ApiRequest::post(endpoints::license_assign(product, sku), body), &Decode::new())
            .await?;
        Ok(LicenseMapper.from_provider(&assignment, None)?.uid)
    }

    /// Reassign the license to another SKU of the same product.
    async fn update(&self, uid: &Uid, attrs: &AttributeSet) -> ConnectorResult<Uid> {
        let (product, sku, user) = split_uid(uid.value())?;
        let payload = LicenseMapper.to_provider(attrs, MappingMode::Update)?;
        let new_sku = match payload.get("skuId").and_then(Value::as_str) {
            Some(new_sku) if new_sku != sku => new_sku,
            _ => {
                debug!("Nothing to change on {}", uid);
                return Ok(uid.clone());
            }
        };
        let assignment: Value = self
            .client()
            .call(
                ApiRequest::patch(endpoints::license(product, sku, user), json!({"skuId": new_sku})),
                &Decode::new(),
            )
            .await
            .map_err(or_unknown(ResourceType::LicenseAssignment, uid))?;
        Ok(LicenseMapper.from_provider(&assignment, None)?.uid)
    }

    async fn update_delta(&self, uid: &Uid, deltas: &[AttributeDelta]) -> ConnectorResult<Uid> {
        let deltas: Vec<&AttributeDelta> = deltas.iter().collect();
        let attrs = delta_patch(&LicenseMapper, uid, &deltas, self.fetch(uid.value())).await?;
        self.update(uid, &attrs).await
    }

    async fn delete(&self, uid: &Uid) -> ConnectorResult<()> {
        let (product, sku, user) = split_uid(uid.value())?;
        self.client()
            .call(ApiRequest::delete(endpoints::license(product, sku, user)), &Discard)
            .await
            .map_err(or_unknown(ResourceType::LicenseAssignment, uid))
    }

    async fn search(
        &self,
        filter: Option<&FilterNode>,
        options: &SearchOptions,
        callback: &mut ResultCallback<'_>,
    ) -> ConnectorResult<SearchResult> {
        let translation = translate(
            ResourceType::LicenseAssignment,
            filter,
            &self.context.config.custom_schemas,
        )?;
        let scope = translation.scope;
        let requested = options.requested();

        let configured = self.context.config.licenses.as_ref().map(|l| l.product_id.clone());
        let direct = match (&scope.key, &scope.product_id, &scope.sku_id, &scope.user_key) {
            (Some(key), ..) => Some(key.clone()),
            (None, Some(product), Some(sku), Some(user)) => Some(format!("{}/{}/{}", product, sku, user)),
            _ => None,
        };
        if let Some(key) = direct {
            if let Some(assignment) = self.fetch(&key).await? {
                callback(LicenseMapper.from_provider(&assignment, requested)?);
            }
            return Ok(SearchResult::default());
        }
        if scope.user_key.is_some() {
            return Err(ConnectorError::unsupported(
                "License assignments of one user are looked up by productId, skuId and userId together",
            ));
        }

        let product = scope.product_id.or(configured).ok_or_else(|| {
            ConnectorError::invalid_attribute("productId", "is required to list license assignments")
        })?;
        let path = match &scope.sku_id {
            Some(sku) => endpoints::licenses_for_sku(&product, sku),
            None => endpoints::licenses_for_product(&product),
        };
        let customer = self.context.config.customer_id.clone();
        let factory = move || ApiRequest::get(path.clone()).with_query("customerId", customer.clone());
        let cursor = self
            .context
            .driver()
            .drive(factory, options.page_size, options.cookie(), "items", |assignment| {
                Ok(callback(LicenseMapper.from_provider(&assignment, requested)?))
            })
            .await?;
        Ok(SearchResult {
            paged_results_cookie: cursor.map(|c| c.token),
        })
    }
}
