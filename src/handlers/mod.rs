//! Per-resource CRUD orchestration.
//!
//! Each [`ResourceHandler`] turns one inbound operation into the sequence of
//! directory calls it needs: the primary insert, patch, delete or listing, and
//! the follow-up calls for attributes the directory keeps elsewhere (aliases,
//! photos, admin status, group membership). Handlers are registered once in a
//! closed [`HandlerRegistry`] and share one [`HandlerContext`].
//!
//! # Side effects
//!
//! Follow-up calls run after the primary call succeeded. When one fails the
//! primary resource is left in place and the failure is reported as
//! [`ConnectorError::PartiallyApplied`] naming it.

pub mod account;
pub mod group;
pub mod license;
pub mod membership;
pub mod orgunit;

pub use account::AccountHandler;
pub use group::GroupHandler;
pub use license::LicenseHandler;
pub use membership::MembershipHandler;
pub use orgunit::OrgUnitHandler;

use crate::client::DirectoryClient;
use crate::config::ValidatedConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::filter::{FilterNode, QueryScope};
use crate::mapper::ResourceMapper;
use crate::membership::{HeldKey, MembershipEditor, MembershipReconciler};
use crate::pagination::PaginatedSearchDriver;
use crate::resource::{AttributeDelta, AttributeSet, AttributeValue, ConnectorObject, ResourceType, Uid};
use crate::schema::ObjectClassInfo;
use crate::transport::ApiRequest;
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Receives search results one at a time; returning `false` stops the search.
pub type ResultCallback<'a> = dyn FnMut(ConnectorObject) -> bool + Send + 'a;

/// One sort criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub attribute: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn ascending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ascending: true,
        }
    }

    pub fn descending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ascending: false,
        }
    }
}

/// Options of a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Attributes to return. `None` returns every attribute returned by default.
    pub attributes_to_get: Option<Vec<String>>,
    /// Fetch exactly one page of this size.
    pub page_size: Option<u32>,
    /// Cursor returned by the previous page.
    pub paged_results_cookie: Option<String>,
    pub sort_keys: Vec<SortKey>,
    /// Include deleted accounts.
    pub show_deleted: bool,
}

impl SearchOptions {
    pub fn requested(&self) -> Option<&[String]> {
        self.attributes_to_get.as_deref()
    }

    pub fn cookie(&self) -> Option<&str> {
        self.paged_results_cookie.as_deref()
    }
}

/// Outcome of a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    /// Cursor of the next page, when one page was requested and more exist.
    pub paged_results_cookie: Option<String>,
}

/// CRUD operations of one resource type.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn resource_type(&self) -> ResourceType;

    fn object_class_info(&self) -> ObjectClassInfo;

    async fn create(&self, attrs: &AttributeSet) -> ConnectorResult<Uid>;

    /// Replace the attributes present in `attrs`.
    async fn update(&self, uid: &Uid, attrs: &AttributeSet) -> ConnectorResult<Uid>;

    /// Apply value-level deltas.
    async fn update_delta(&self, uid: &Uid, deltas: &[AttributeDelta]) -> ConnectorResult<Uid>;

    async fn delete(&self, uid: &Uid) -> ConnectorResult<()>;

    async fn search(
        &self,
        filter: Option<&FilterNode>,
        options: &SearchOptions,
        callback: &mut ResultCallback<'_>,
    ) -> ConnectorResult<SearchResult>;
}

/// State shared by every handler.
#[derive(Clone)]
pub struct HandlerContext {
    pub client: Arc<DirectoryClient>,
    pub config: Arc<ValidatedConfig>,
}

impl HandlerContext {
    pub fn new(client: Arc<DirectoryClient>, config: Arc<ValidatedConfig>) -> Self {
        Self { client, config }
    }

    pub fn driver(&self) -> PaginatedSearchDriver<'_> {
        PaginatedSearchDriver::new(&self.client, self.config.default_page_size)
    }

    /// Population parameter of a listing: the filter's tenant scope, else the
    /// configured domain, else the configured customer.
    pub fn tenant(&self, scope: &QueryScope) -> (&'static str, String) {
        if let Some(customer) = &scope.customer {
            ("customer", customer.clone())
        } else if let Some(domain) = &scope.domain {
            ("domain", domain.clone())
        } else if let Some(user_key) = &scope.user_key {
            ("userKey", user_key.clone())
        } else if let Some(domain) = &self.config.domain {
            ("domain", domain.clone())
        } else {
            ("customer", self.config.customer_id.clone())
        }
    }

    /// Every `field` of every item across all pages of a listing.
    pub async fn collect_all<F>(&self, request_factory: F, items_key: &str, field: &str) -> ConnectorResult<Vec<String>>
    where
        F: Fn() -> ApiRequest + Send + Sync,
    {
        let mut keys = Vec::new();
        self.driver()
            .drive(request_factory, None, None, items_key, |item| {
                if let Some(key) = item.get(field).and_then(Value::as_str) {
                    keys.push(key.to_string());
                }
                Ok(true)
            })
            .await?;
        Ok(keys)
    }

    /// The id and email of every item across all pages of a listing.
    pub async fn collect_held<F>(&self, request_factory: F, items_key: &str) -> ConnectorResult<Vec<HeldKey>>
    where
        F: Fn() -> ApiRequest + Send + Sync,
    {
        let mut held = Vec::new();
        self.driver()
            .drive(request_factory, None, None, items_key, |item| {
                if let Some(id) = item.get("id").and_then(Value::as_str) {
                    held.push(HeldKey {
                        id: id.to_string(),
                        email: item.get("email").and_then(Value::as_str).map(str::to_string),
                    });
                }
                Ok(true)
            })
            .await?;
        Ok(held)
    }
}

/// Closed mapping of resource type to handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ResourceType, Arc<dyn ResourceHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with a handler for every resource type.
    pub fn standard(context: &HandlerContext) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AccountHandler::new(context.clone())));
        registry.register(Arc::new(GroupHandler::new(context.clone())));
        registry.register(Arc::new(MembershipHandler::new(context.clone())));
        registry.register(Arc::new(OrgUnitHandler::new(context.clone())));
        registry.register(Arc::new(LicenseHandler::new(context.clone())));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn ResourceHandler>) {
        self.handlers.insert(handler.resource_type(), handler);
    }

    pub fn resolve(&self, resource_type: ResourceType) -> ConnectorResult<Arc<dyn ResourceHandler>> {
        self.handlers
            .get(&resource_type)
            .cloned()
            .ok_or_else(|| ConnectorError::unsupported(format!("no handler for {}", resource_type)))
    }
}

/// Report "not found" from a mutation as an unknown resource.
pub(crate) fn or_unknown(resource_type: ResourceType, uid: &Uid) -> impl FnOnce(ConnectorError) -> ConnectorError + '_ {
    move |error| match error {
        ConnectorError::NotFound { .. } => unknown(resource_type, uid),
        other => other,
    }
}

pub(crate) fn unknown(resource_type: ResourceType, uid: &Uid) -> ConnectorError {
    ConnectorError::UnknownResource {
        resource_type: resource_type.to_string(),
        uid: uid.value().to_string(),
    }
}

/// Wrap a follow-up failure so it names the resource that was already written.
pub(crate) fn side_effects(uid: &Uid, result: ConnectorResult<()>) -> ConnectorResult<()> {
    result.map_err(|e| ConnectorError::partially_applied(uid.clone(), e))
}

/// Whether the object carries any field worth sending.
pub(crate) fn has_fields(payload: &Value) -> bool {
    payload.as_object().is_some_and(|o| !o.is_empty())
}

fn delta_strings(name: &str, values: &[AttributeValue]) -> ConnectorResult<Vec<String>> {
    values
        .iter()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                ConnectorError::invalid_attribute(name, format!("expected string values, got {}", v.type_name()))
            })
        })
        .collect()
}

/// Split deltas into those on `relationships` and the rest.
pub(crate) fn partition<'a>(
    deltas: &'a [AttributeDelta],
    relationships: &[&str],
) -> (Vec<&'a AttributeDelta>, Vec<&'a AttributeDelta>) {
    deltas
        .iter()
        .partition(|d| relationships.iter().any(|r| d.is(r)))
}

/// Apply one delta on a set-valued relationship.
///
/// Additions and removals are applied individually. A replacement removes every
/// existing value and then adds every replacement value; `existing` is only
/// awaited for replacements.
pub(crate) async fn apply_relationship_delta<E>(
    delta: &AttributeDelta,
    editor: &dyn MembershipEditor,
    existing: E,
) -> ConnectorResult<()>
where
    E: Future<Output = ConnectorResult<Vec<String>>> + Send,
{
    if let Some(replacement) = &delta.values_to_replace {
        let replacement = delta_strings(&delta.name, replacement)?;
        let existing = existing.await?;
        debug!(
            "Replacing {}: removing {} then adding {}",
            delta.name,
            existing.len(),
            replacement.len()
        );
        MembershipReconciler::new(&existing, &[]).apply(editor).await?;
        return MembershipReconciler::new(&[], &replacement).apply(editor).await;
    }
    let add = delta_strings(&delta.name, &delta.values_to_add)?;
    let remove = delta_strings(&delta.name, &delta.values_to_remove)?;
    MembershipReconciler::new(&[], &add).apply(editor).await?;
    MembershipReconciler::new(&remove, &[]).apply(editor).await
}

/// Turn deltas on plain attributes into an update attribute set.
///
/// Replacements are taken as they are. Additions and removals edit the current
/// values, which are fetched through `current` only when such a delta exists.
pub(crate) async fn delta_patch<C>(
    mapper: &dyn ResourceMapper,
    uid: &Uid,
    deltas: &[&AttributeDelta],
    current: C,
) -> ConnectorResult<AttributeSet>
where
    C: Future<Output = ConnectorResult<Option<Value>>> + Send,
{
    let value_edits: Vec<String> = deltas
        .iter()
        .filter(|d| d.values_to_replace.is_none())
        .map(|d| d.name.clone())
        .collect();
    let current = if value_edits.is_empty() {
        AttributeSet::new()
    } else {
        let object = current.await?.ok_or_else(|| unknown(mapper.resource_type(), uid))?;
        mapper.from_provider(&object, Some(&value_edits))?.attributes
    };

    let mut patch = AttributeSet::new();
    for delta in deltas {
        if let Some(replacement) = &delta.values_to_replace {
            patch.set(delta.name.clone(), replacement.clone());
            continue;
        }
        let mut values: Vec<AttributeValue> = patch
            .values(&delta.name)
            .or_else(|| current.values(&delta.name))
            .map(<[AttributeValue]>::to_vec)
            .unwrap_or_default();
        values.retain(|v| !delta.values_to_remove.contains(v));
        for value in &delta.values_to_add {
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
        patch.set(delta.name.clone(), values);
    }
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::GroupMapper;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MembershipEditor for Recorder {
        async fn add(&self, key: &str) -> ConnectorResult<()> {
            self.calls.lock().unwrap().push(format!("+{}", key));
            Ok(())
        }

        async fn remove(&self, key: &str) -> ConnectorResult<()> {
            self.calls.lock().unwrap().push(format!("-{}", key));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_replace_removes_everything_first() {
        let editor = Recorder::default();
        let delta = AttributeDelta::replace("__MEMBERS__", ["b@example.com", "c@example.com"]);
        apply_relationship_delta(&delta, &editor, async {
            Ok(vec!["a@example.com".to_string(), "b@example.com".to_string()])
        })
        .await
        .unwrap();
        assert_eq!(
            *editor.calls.lock().unwrap(),
            vec!["-a@example.com", "-b@example.com", "+b@example.com", "+c@example.com"]
        );
    }

    #[tokio::test]
    async fn test_add_and_remove_do_not_fetch() {
        let editor = Recorder::default();
        let delta = AttributeDelta {
            name: "aliases".to_string(),
            values_to_add: vec!["x@example.com".into()],
            values_to_remove: vec!["y@example.com".into()],
            values_to_replace: None,
        };
        apply_relationship_delta(&delta, &editor, async {
            Err(ConnectorError::unsupported("existing values fetched"))
        })
            .await
            .unwrap();
        assert_eq!(*editor.calls.lock().unwrap(), vec!["+x@example.com", "-y@example.com"]);
    }

    #[tokio::test]
    async fn test_scalar_replace_needs_no_fetch() {
        let deltas = [AttributeDelta::replace("description", ["New"])];
        let refs: Vec<&AttributeDelta> = deltas.iter().collect();
        let patch = delta_patch(&GroupMapper, &Uid::new("g1"), &refs, async {
            Err(ConnectorError::unsupported("current values fetched"))
        })
        .await
        .unwrap();
        assert_eq!(patch.string("description").unwrap(), Some("New"));
    }

    #[tokio::test]
    async fn test_value_edits_start_from_current() {
        let deltas = [AttributeDelta::add("description", ["Staff"])];
        let refs: Vec<&AttributeDelta> = deltas.iter().collect();
        let patch = delta_patch(&GroupMapper, &Uid::new("g1"), &refs, async {
            Ok(Some(json!({"id": "g1", "email": "staff@example.com"})))
        })
        .await
        .unwrap();
        assert_eq!(patch.string("description").unwrap(), Some("Staff"));

        let missing = delta_patch(&GroupMapper, &Uid::new("g1"), &refs, async { Ok(None) }).await;
        assert!(matches!(missing, Err(ConnectorError::UnknownResource { .. })));
    }
}
