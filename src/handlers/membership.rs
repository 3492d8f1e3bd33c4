//! Membership edges as first-class resources.
//!
//! The directory's member object does not name its group, so every object read
//! here gets a `group` key before it is projected.

use crate::client::{DirectoryClient, endpoints};
use crate::error::{ConnectorError, ConnectorResult};
use crate::executor::{Decode, Discard};
use crate::filter::{FilterNode, QueryScope, translate};
use crate::handlers::{
    HandlerContext, ResourceHandler, ResultCallback, SearchOptions, SearchResult, has_fields, or_unknown,
};
use crate::mapper::member::split_uid;
use crate::mapper::{MappingMode, MemberMapper, ResourceMapper};
use crate::pagination::fetch_one;
use crate::resource::{AttributeDelta, AttributeSet, ConnectorObject, ResourceType, Uid};
use crate::schema::ObjectClassInfo;
use crate::transport::ApiRequest;
use async_trait::async_trait;
use log::debug;
use serde_json::{Value, json};

fn with_group(mut member: Value, group: &str) -> Value {
    if let Value::Object(object) = &mut member {
        object.insert("group".to_string(), json!(group));
    }
    member
}

pub struct MembershipHandler {
    context: HandlerContext,
}

impl MembershipHandler {
    pub fn new(context: HandlerContext) -> Self {
        Self { context }
    }

    fn client(&self) -> &DirectoryClient {
        &self.context.client
    }

    fn project(&self, member: Value, group: &str, requested: Option<&[String]>) -> ConnectorResult<ConnectorObject> {
        MemberMapper.from_provider(&with_group(member, group), requested)
    }

    /// Emit every member of `group`; `false` when the caller stopped.
    async fn emit_group(
        &self,
        group: &str,
        scope: &QueryScope,
        requested: Option<&[String]>,
        callback: &mut ResultCallback<'_>,
    ) -> ConnectorResult<bool> {
        let path = endpoints::members(group);
        let roles = scope.roles.clone();
        let factory = move || ApiRequest::get(path.clone()).with_optional_query("roles", roles.clone());
        let mut keep_going = true;
        self.context
            .driver()
            .drive(factory, None, None, "members", |member| {
                keep_going = callback(self.project(member, group, requested)?);
                Ok(keep_going)
            })
            .await?;
        Ok(keep_going)
    }

    /// Every group email matching the tenant or member scope.
    async fn groups(&self, scope: &QueryScope) -> ConnectorResult<Vec<String>> {
        let (parameter, value) = match &scope.member_key {
            Some(member) => ("userKey", member.clone()),
            None => self.context.tenant(scope),
        };
        self.context
            .collect_all(
                move || ApiRequest::get(endpoints::groups()).with_query(parameter, value.clone()),
                "groups",
                "email",
            )
            .await
    }
}

#[async_trait]
impl ResourceHandler for MembershipHandler {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Membership
    }

    fn object_class_info(&self) -> ObjectClassInfo {
        ObjectClassInfo {
            resource_type: ResourceType::Membership,
            attributes: MemberMapper.attribute_infos(),
        }
    }

    async fn create(&self, attrs: &AttributeSet) -> ConnectorResult<Uid> {
        let mut payload = MemberMapper.to_provider(attrs, MappingMode::Create)?;
        let group = payload
            .as_object_mut()
            .and_then(|o| o.remove("group"))
            .and_then(|g| g.as_str().map(str::to_string))
            .ok_or_else(|| ConnectorError::invalid_attribute("group", "is required"))?;
        let member: Value = self
            .client()
            .call(ApiRequest::post(endpoints::members(&group), payload), &Decode::new())
            .await?;
        Ok(self.project(member, &group, None)?.uid)
    }

    async fn update(&self, uid: &Uid, attrs: &AttributeSet) -> ConnectorResult<Uid> {
        let (group, member) = split_uid(uid.value())?;
        let payload = MemberMapper.to_provider(attrs, MappingMode::Update)?;
        if !has_fields(&payload) {
            debug!("Nothing to change on {}", uid);
            return Ok(uid.clone());
        }
        let updated: Value = self
            .client()
            .call(ApiRequest::patch(endpoints::member(group, member), payload), &Decode::new())
            .await
            .map_err(or_unknown(ResourceType::Membership, uid))?;
        Ok(self.project(updated, group, None)?.uid)
    }

    async fn update_delta(&self, uid: &Uid, deltas: &[AttributeDelta]) -> ConnectorResult<Uid> {
        let mut attrs = AttributeSet::new();
        for delta in deltas {
            match &delta.values_to_replace {
                Some(values) => attrs.set(delta.name.clone(), values.clone()),
                None => {
                    return Err(ConnectorError::unsupported(format!(
                        "{} of a membership can only be replaced",
                        delta.name
                    )));
                }
            }
        }
        self.update(uid, &attrs).await
    }

    async fn delete(&self, uid: &Uid) -> ConnectorResult<()> {
        let (group, member) = split_uid(uid.value())?;
        self.client()
            .call(ApiRequest::delete(endpoints::member(group, member)), &Discard)
            .await
            .map_err(or_unknown(ResourceType::Membership, uid))
    }

    async fn search(
        &self,
        filter: Option<&FilterNode>,
        options: &SearchOptions,
        callback: &mut ResultCallback<'_>,
    ) -> ConnectorResult<SearchResult> {
        let translation = translate(ResourceType::Membership, filter, &self.context.config.custom_schemas)?;
        let scope = translation.scope;
        let requested = options.requested();

        if let Some(key) = &scope.key {
            let (group, member) = split_uid(key)?;
            if let Some(found) = fetch_one(self.client(), ApiRequest::get(endpoints::member(group, member))).await? {
                callback(self.project(found, group, requested)?);
            }
            return Ok(SearchResult::default());
        }

        if let Some(group) = scope.group_key.clone() {
            if scope.member_key.is_some() {
                return Err(ConnectorError::unsupported(
                    "Combine group and member with And to look up one membership",
                ));
            }
            let path = endpoints::members(&group);
            let roles = scope.roles.clone();
            let factory = move || ApiRequest::get(path.clone()).with_optional_query("roles", roles.clone());
            let cursor = self
                .context
                .driver()
                .drive(factory, options.page_size, options.cookie(), "members", |member| {
                    Ok(callback(self.project(member, &group, requested)?))
                })
                .await?;
            return Ok(SearchResult {
                paged_results_cookie: cursor.map(|c| c.token),
            });
        }

        if options.page_size.is_some() {
            return Err(ConnectorError::unsupported(
                "Paged membership search needs a group",
            ));
        }

        let groups = self.groups(&scope).await?;
        debug!("Enumerating members of {} groups", groups.len());
        for group in &groups {
            if let Some(member) = &scope.member_key {
                let path = endpoints::member(group, member);
                if let Some(found) = fetch_one(self.client(), ApiRequest::get(path)).await? {
                    if !callback(self.project(found, group, requested)?) {
                        break;
                    }
                }
            } else if !self.emit_group(group, &scope, requested, callback).await? {
                break;
            }
        }
        Ok(SearchResult::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_is_injected() {
        let member = with_group(json!({"email": "jane@example.com"}), "staff@example.com");
        assert_eq!(member["group"], "staff@example.com");
    }
}
