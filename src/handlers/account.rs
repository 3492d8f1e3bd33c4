//! User accounts.
//!
//! Aliases, the photo, admin status and group membership are not part of the
//! user object the directory accepts; they are written through their own calls
//! once the user itself has been inserted or patched.

use crate::client::{DirectoryClient, endpoints};
use crate::error::{ConnectorError, ConnectorResult};
use crate::executor::{Decode, Discard};
use crate::filter::{FilterNode, translate};
use crate::handlers::{
    HandlerContext, ResourceHandler, ResultCallback, SearchOptions, SearchResult, SortKey,
    apply_relationship_delta, delta_patch, has_fields, or_unknown, partition, side_effects, unknown,
};
use crate::mapper::{self, AccountMapper, Handling, MappingMode, ResourceMapper};
use crate::membership::{AliasEditor, AliasOwner, HeldKey, MembershipReconciler, UserGroupsEditor};
use crate::pagination::fetch_one;
use crate::resource::names::{ENABLE, GROUPS, PHOTO};
use crate::resource::{AttributeDelta, AttributeSet, AttributeValue, ConnectorObject, ResourceType, Uid};
use crate::schema::ObjectClassInfo;
use crate::transport::ApiRequest;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use log::{debug, warn};
use serde_json::{Value, json};

const ALIASES: &str = "aliases";
const IS_ADMIN: &str = "isAdmin";

/// `orderBy` and `sortOrder` for the first sort key.
fn sort_order(keys: &[SortKey]) -> ConnectorResult<Option<(&'static str, &'static str)>> {
    let Some(key) = keys.first() else {
        return Ok(None);
    };
    if keys.len() > 1 {
        warn!("Accounts sort on one key only, ignoring {} more", keys.len() - 1);
    }
    let order_by = match key.attribute.to_ascii_lowercase().as_str() {
        "__name__" | "email" | "primaryemail" => "email",
        "givenname" => "givenName",
        "familyname" => "familyName",
        _ => {
            return Err(ConnectorError::invalid_attribute(
                &key.attribute,
                "accounts sort only by __NAME__, givenName or familyName",
            ));
        }
    };
    let direction = if key.ascending { "ASCENDING" } else { "DESCENDING" };
    Ok(Some((order_by, direction)))
}

pub struct AccountHandler {
    context: HandlerContext,
    mapper: AccountMapper,
}

impl AccountHandler {
    pub fn new(context: HandlerContext) -> Self {
        let mapper = AccountMapper::new(context.config.custom_schemas.clone());
        Self { context, mapper }
    }

    fn client(&self) -> &DirectoryClient {
        &self.context.client
    }

    async fn fetch(&self, key: &str) -> ConnectorResult<Option<Value>> {
        fetch_one(self.client(), ApiRequest::get(endpoints::user(key))).await
    }

    async fn current_aliases(&self, key: &str) -> ConnectorResult<Vec<String>> {
        let body: Value = self
            .client()
            .call(ApiRequest::get(endpoints::user_aliases(key)), &Decode::new())
            .await?;
        Ok(alias_list(&body))
    }

    async fn current_groups(&self, key: &str) -> ConnectorResult<Vec<String>> {
        let held = self.held_groups(key).await?;
        Ok(held.iter().map(|h| h.key().to_string()).collect())
    }

    async fn held_groups(&self, key: &str) -> ConnectorResult<Vec<HeldKey>> {
        let key = key.to_string();
        self.context
            .collect_held(
                move || ApiRequest::get(endpoints::groups()).with_query("userKey", key.clone()),
                "groups",
            )
            .await
    }

    async fn photo(&self, key: &str) -> ConnectorResult<Option<Vec<u8>>> {
        let photo = fetch_one(self.client(), ApiRequest::get(endpoints::user_photo(key))).await?;
        Ok(photo
            .as_ref()
            .and_then(|p| p.get("photoData"))
            .and_then(Value::as_str)
            .and_then(|data| URL_SAFE.decode(data).ok()))
    }

    /// Project a user, fetching requested virtual attributes.
    async fn project(&self, object: &Value, requested: Option<&[String]>) -> ConnectorResult<ConnectorObject> {
        let mut projected = self.mapper.from_provider(object, requested)?;
        let key = projected.uid.value().to_string();
        if mapper::is_requested(requested, GROUPS, Handling::Virtual) {
            projected.attributes.set(GROUPS, self.current_groups(&key).await?);
        }
        if mapper::is_requested(requested, PHOTO, Handling::Virtual) {
            let photo = self.photo(&key).await?;
            projected.attributes.set(PHOTO, photo.map(AttributeValue::Binary));
        }
        Ok(projected)
    }

    /// Write the attributes kept outside the user object.
    ///
    /// `created` means the user has just been inserted, so it has no aliases or
    /// groups yet and admin status is only ever granted.
    async fn apply_side_effects(&self, key: &str, email: &str, attrs: &AttributeSet, created: bool) -> ConnectorResult<()> {
        if let Some(aliases) = attrs.get(ALIASES) {
            let desired: Vec<String> = aliases.strings()?.into_iter().map(str::to_string).collect();
            let existing = if created { Vec::new() } else { self.current_aliases(key).await? };
            MembershipReconciler::new(&existing, &desired)
                .apply(&AliasEditor::new(self.client(), AliasOwner::User, key))
                .await?;
        }
        if let Some(photo) = attrs.get(PHOTO) {
            match photo.single()? {
                Some(AttributeValue::Binary(bytes)) => {
                    let body = json!({"photoData": URL_SAFE.encode(bytes), "mimeType": "JPEG"});
                    self.client()
                        .call(ApiRequest::put(endpoints::user_photo(key), body), &Discard)
                        .await?;
                }
                Some(other) => {
                    return Err(ConnectorError::invalid_attribute(
                        PHOTO,
                        format!("expected binary, got {}", other.type_name()),
                    ));
                }
                None => debug!("No photo value for {}", email),
            }
        }
        match attrs.boolean(IS_ADMIN)? {
            Some(status) if status || !created => {
                self.client()
                    .call(ApiRequest::post(endpoints::make_admin(key), json!({"status": status})), &Discard)
                    .await?;
            }
            _ => {}
        }
        if let Some(groups) = attrs.get(GROUPS) {
            let desired: Vec<String> = groups.strings()?.into_iter().map(str::to_string).collect();
            let held = if created { Vec::new() } else { self.held_groups(key).await? };
            MembershipReconciler::against(&held, &desired)
                .apply(&UserGroupsEditor::new(self.client(), email))
                .await?;
        }
        Ok(())
    }

    /// Patch the user, or check it exists when there is nothing to patch.
    /// Returns the new uid and the primary email.
    async fn patch(&self, uid: &Uid, attrs: &AttributeSet) -> ConnectorResult<(Uid, String)> {
        let payload = self.mapper.to_provider(attrs, MappingMode::Update)?;
        let object: Value = if has_fields(&payload) {
            self.client()
                .call(ApiRequest::patch(endpoints::user(uid.value()), payload), &Decode::new())
                .await
                .map_err(or_unknown(ResourceType::Account, uid))?
        } else {
            self.fetch(uid.value())
                .await?
                .ok_or_else(|| unknown(ResourceType::Account, uid))?
        };
        let updated = mapper::uid_of(&object, "id")?;
        Ok((updated, mapper::get_str(&object, "primaryEmail").to_string()))
    }

    /// Patch, then write side effects and apply the license policy.
    async fn update_account(&self, uid: &Uid, attrs: &AttributeSet) -> ConnectorResult<(Uid, String)> {
        let (updated, email) = self.patch(uid, attrs).await?;
        side_effects(
            &updated,
            self.apply_side_effects(updated.value(), &email, attrs, false).await,
        )?;
        if attrs.boolean(ENABLE)? == Some(false) {
            self.remove_licenses(&email).await;
        }
        Ok((updated, email))
    }

    /// Delete the configured license assignments of a disabled user. Failures
    /// are logged and do not fail the update.
    async fn remove_licenses(&self, email: &str) {
        let Some(policy) = &self.context.config.licenses else {
            return;
        };
        for sku in &policy.sku_ids {
            if let Err(e) = self.remove_license(&policy.product_id, sku, email).await {
                warn!(
                    "Could not remove license {}/{} from {}: {}",
                    policy.product_id, sku, email, e
                );
            }
        }
    }

    async fn remove_license(&self, product: &str, sku: &str, email: &str) -> ConnectorResult<()> {
        let path = endpoints::license(product, sku, email);
        match fetch_one(self.client(), ApiRequest::get(path.clone())).await? {
            Some(_) => {
                debug!("Removing license {}/{} from {}", product, sku, email);
                self.client().call(ApiRequest::delete(path), &Discard).await
            }
            None => {
                debug!("{} holds no license {}/{}", email, product, sku);
                Ok(())
            }
        }
    }
}

fn alias_list(body: &Value) -> Vec<String> {
    body.get("aliases")
        .and_then(Value::as_array)
        .map(|aliases| {
            aliases
                .iter()
                .filter_map(|a| a.get("alias").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ResourceHandler for AccountHandler {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Account
    }

    fn object_class_info(&self) -> ObjectClassInfo {
        ObjectClassInfo {
            resource_type: ResourceType::Account,
            attributes: self.mapper.attribute_infos(),
        }
    }

    async fn create(&self, attrs: &AttributeSet) -> ConnectorResult<Uid> {
        let payload = self.mapper.to_provider(attrs, MappingMode::Create)?;
        let object: Value = self
            .client()
            .call(ApiRequest::post(endpoints::users(), payload), &Decode::new())
            .await?;
        let uid = mapper::uid_of(&object, "id")?;
        let email = mapper::get_str(&object, "primaryEmail");
        debug!("Inserted account {} as {}", email, uid);
        side_effects(&uid, self.apply_side_effects(uid.value(), email, attrs, true).await)?;
        Ok(uid)
    }

    async fn update(&self, uid: &Uid, attrs: &AttributeSet) -> ConnectorResult<Uid> {
        self.update_account(uid, attrs).await.map(|(updated, _)| updated)
    }

    async fn update_delta(&self, uid: &Uid, deltas: &[AttributeDelta]) -> ConnectorResult<Uid> {
        let (relationships, plain) = partition(deltas, &[GROUPS, ALIASES]);
        let attrs = delta_patch(&self.mapper, uid, &plain, self.fetch(uid.value())).await?;
        let (updated, email) = self.update_account(uid, &attrs).await?;

        let key = updated.value();
        let result: ConnectorResult<()> = async {
            for delta in relationships {
                if delta.is(GROUPS) {
                    let editor = UserGroupsEditor::new(self.client(), email.as_str());
                    apply_relationship_delta(delta, &editor, self.current_groups(key)).await?;
                } else {
                    let editor = AliasEditor::new(self.client(), AliasOwner::User, key);
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
            .call(ApiRequest::delete(endpoints::user(uid.value())), &Discard)
            .await
            .map_err(or_unknown(ResourceType::Account, uid))
    }

    async fn search(
        &self,
        filter: Option<&FilterNode>,
        options: &SearchOptions,
        callback: &mut ResultCallback<'_>,
    ) -> ConnectorResult<SearchResult> {
        let translation = translate(ResourceType::Account, filter, self.mapper.custom_schemas())?;
        let requested = options.requested();

        if let Some(key) = &translation.scope.key {
            debug!("Fetching account {} directly", key);
            if let Some(object) = self.fetch(key).await? {
                callback(self.project(&object, requested).await?);
            }
            return Ok(SearchResult::default());
        }

        let (tenant, tenant_value) = self.context.tenant(&translation.scope);
        let order = sort_order(&options.sort_keys)?;
        let query = translation.query;
        let show_deleted = options.show_deleted;
        let projection = if self.mapper.custom_schemas().is_empty() { "basic" } else { "full" };
        let factory = move || {
            let mut request = ApiRequest::get(endpoints::users())
                .with_query(tenant, tenant_value.clone())
                .with_optional_query("query", query.clone())
                .with_query("projection", projection);
            if let Some((order_by, direction)) = order {
                request = request
                    .with_query("orderBy", order_by)
                    .with_query("sortOrder", direction);
            }
            if show_deleted {
                request = request.with_query("showDeleted", "true");
            }
            request
        };

        let driver = self.context.driver();
        let mut pages = driver.pages(factory, options.page_size, options.cookie(), "users")?;
        while let Some(items) = pages.next_page().await? {
            for item in items {
                if !callback(self.project(&item, requested).await?) {
                    debug!("Account search stopped by caller");
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
