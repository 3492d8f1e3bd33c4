//! Groups, with their aliases and members.

use crate::client::{DirectoryClient, endpoints};
use crate::error::ConnectorResult;
use crate::executor::{Decode, Discard};
use crate::filter::{FilterNode, translate};
use crate::handlers::{
    HandlerContext, ResourceHandler, ResultCallback, SearchOptions, SearchResult, apply_relationship_delta,
    delta_patch, has_fields, or_unknown, partition, side_effects, unknown,
};
use crate::mapper::{self, GroupMapper, Handling, MappingMode, ResourceMapper};
use crate::membership::{AliasEditor, AliasOwner, GroupMembersEditor, HeldKey, MembershipReconciler};
use crate::pagination::fetch_one;
use crate::resource::names::MEMBERS;
use crate::resource::{AttributeDelta, AttributeSet, ConnectorObject, ResourceType, Uid};
use crate::schema::ObjectClassInfo;
use crate::transport::ApiRequest;
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;

const ALIASES: &str = "aliases";

/// Groups, their aliases and their member lists.
pub struct GroupHandler {
    context: HandlerContext,
}

impl GroupHandler {
    pub fn new(context: HandlerContext) -> Self {
        Self { context }
    }

    fn client(&self) -> &DirectoryClient {
        &self.context.client
    }

    async fn fetch(&self, key: &str) -> ConnectorResult<Option<Value>> {
        fetch_one(self.client(), ApiRequest::get(endpoints::group(key))).await
    }

    async fn current_aliases(&self, key: &str) -> ConnectorResult<Vec<String>> {
        let body: Value = self
            .client()
            .call(ApiRequest::get(endpoints::group_aliases(key)), &Decode::new())
            .await?;
        Ok(body
            .get("aliases")
            .and_then(Value::as_array)
            .map(|aliases| {
                aliases
                    .iter()
                    .filter_map(|a| a.get("alias").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn current_members(&self, key: &str) -> ConnectorResult<Vec<String>> {
        let held = self.held_members(key).await?;
        Ok(held.iter().map(|h| h.key().to_string()).collect())
    }

    async fn held_members(&self, key: &str) -> ConnectorResult<Vec<HeldKey>> {
        let path = endpoints::members(key);
        self.context
            .collect_held(move || ApiRequest::get(path.clone()), "members")
            .await
    }

    async fn project(&self, object: &Value, requested: Option<&[String]>) -> ConnectorResult<ConnectorObject> {
        let mut projected = GroupMapper.from_provider(object, requested)?;
        if mapper::is_requested(requested, MEMBERS, Handling::Virtual) {
            let members = self.current_members(projected.uid.value()).await?;
            projected.attributes.set(MEMBERS, members);
        }
        Ok(projected)
    }

    async fn apply_side_effects(&self, key: &str, attrs: &AttributeSet, created: bool) -> ConnectorResult<()> {
        if let Some(aliases) = attrs.get(ALIASES) {
            let desired: Vec<String> = aliases.strings()?.into_iter().map(str::to_string).collect();
            let existing = if created { Vec::new() } else { self.current_aliases(key).await? };
            MembershipReconciler::new(&existing, &desired)
                .apply(&AliasEditor::new(self.client(), AliasOwner::Group, key))
                .await?;
        }
        if let Some(members) = attrs.get(MEMBERS) {
            let desired: Vec<String> = members.strings()?.into_iter().map(str::to_string).collect();
            let held = if created { Vec::new() } else { self.held_members(key).await? };
            MembershipReconciler::against(&held, &desired)
                .apply(&GroupMembersEditor::new(self.client(), key))
                .await?;
        }
        Ok(())
    }

    async fn patch(&self, uid: &Uid, attrs: &AttributeSet) -> ConnectorResult<Uid> {
        let payload = GroupMapper.to_provider(attrs, MappingMode::Update)?;
        let object: Value = if has_fields(&payload) {
            self.client()
                .call(ApiRequest::patch(endpoints::group(uid.value()), payload), &Decode::new())
                .await
                .map_err(or_unknown(ResourceType::Group, uid))?
        } else {
            self.fetch(uid.value())
                .await?
                .ok_or_else(|| unknown(ResourceType::Group, uid))?
        };
        mapper::uid_of(&object, "id")
    }
}

#[async_trait]
impl ResourceHandler for GroupHandler {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Group
    }

    fn object_class_info(&self) -> ObjectClassInfo {
        ObjectClassInfo {
            resource_type: ResourceType::Group,
            attributes: GroupMapper.attribute_infos(),
        }
    }

    async fn create(&self, attrs: &AttributeSet) -> ConnectorResult<Uid> {
        let payload = GroupMapper.to_provider(attrs, MappingMode::Create)?;
        let object: Value = self
            .client()
            .call(ApiRequest::post(endpoints::groups(), payload), &Decode::new())
            .await?;
        let uid = mapper::uid_of(&object, "id")?;
        debug!("Inserted group {} as {}", mapper::get_str(&object, "email"), uid);
        side_effects(&uid, self.apply_side_effects(uid.value(), attrs, true).await)?;
        Ok(uid)
    }

    async fn update(&self, uid: &Uid, attrs: &AttributeSet) -> ConnectorResult<Uid> {
        let updated = self.patch(uid, attrs).await?;
        side_effects(&updated, self.apply_side_effects(updated.value(), attrs, false).await)?;
        Ok(updated)
    }

    async fn update_delta(&self, uid: &Uid, deltas: &[AttributeDelta]) -> ConnectorResult<Uid> {
        let (relationships, plain) = partition(deltas, &[MEMBERS, ALIASES]);
        let attrs = delta_patch(&GroupMapper, uid, &plain, self.fetch(uid.value())).await?;
        let updated = self.patch(uid, &attrs).await?;

        let key = updated.value();
        let result: ConnectorResult<()> = async {
            for delta in relationships {
                if delta.is(MEMBERS) {
                    let editor = GroupMembersEditor::new(self.client(), key);
                    apply_relationship_delta(delta, &editor, self.current_members(key)).await?;
                } else {
                    let editor = AliasEditor::new(self.client(), AliasOwner::Group, key);
                    apply_relationship_delta(delta, &editor, self.current_aliases(key)).await?;
                }
            }
            Ok(())
        }
        .await;
        side_effects(&updated, result)?;
        Ok(updated)
    }

    async fn delete(&self, uid: &Uid) -> ConnectorResult<()> {
        self.client()
            .call(ApiRequest::delete(endpoints::group(uid.value())), &Discard)
            .await
            .map_err(or_unknown(ResourceType::Group, uid))
    }

    async fn search(
        &self,
        filter: Option<&FilterNode>,
        options: &SearchOptions,
        callback: &mut ResultCallback<'_>,
    ) -> ConnectorResult<SearchResult> {
        let translation = translate(ResourceType::Group, filter, &self.context.config.custom_schemas)?;
        let requested = options.requested();

        if let Some(key) = &translation.scope.key {
            debug!("Fetching group {} directly", key);
            if let Some(object) = self.fetch(key).await? {
                callback(self.project(&object, requested).await?);
            }
            return Ok(SearchResult::default());
        }
        if !options.sort_keys.is_empty() {
            warn!("Groups cannot be sorted, ignoring sort keys");
        }

        let (tenant, tenant_value) = self.context.tenant(&translation.scope);
        let query = translation.query;
        let factory = move || {
            ApiRequest::get(endpoints::groups())
                .with_query(tenant, tenant_value.clone())
                .with_optional_query("query", query.clone())
        };

        let driver = self.context.driver();
        let mut pages = driver.pages(factory, options.page_size, options.cookie(), "groups")?;
        while let Some(items) = pages.next_page().await? {
            for item in items {
                if !callback(self.project(&item, requested).await?) {
                    debug!("Group search stopped by caller");
                    return Ok(SearchResult {
                        paged_results_cookie: pages.cursor().map(|c| c.token),
                    });
                }
            }
        }
        Ok(SearchResult {
            paged_results_cookie: pages.cursor().map(|c| c.token),
        })
    }
}
