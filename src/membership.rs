//! Minimal, idempotent reconciliation of set-valued relationships.
//!
//! Used for a group's members, a user's groups and the aliases of users and
//! groups. Keys compare without regard to ASCII case; the caller's spelling is
//! what gets sent.

use crate::client::{DirectoryClient, endpoints};
use crate::error::ConnectorResult;
use crate::executor::Discard;
use crate::transport::ApiRequest;
use async_trait::async_trait;
use log::debug;
use serde_json::json;
use std::collections::HashSet;

/// Applies single additions and removals of one relationship.
#[async_trait]
pub trait MembershipEditor: Send + Sync {
    async fn add(&self, key: &str) -> ConnectorResult<()>;
    async fn remove(&self, key: &str) -> ConnectorResult<()>;
}

/// The additions and removals that turn `existing` into `desired`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipReconciler {
    to_add: Vec<String>,
    to_remove: Vec<String>,
}

fn folded(keys: &[String]) -> HashSet<String> {
    keys.iter().map(|k| k.to_ascii_lowercase()).collect()
}

fn difference(left: &[String], right: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    left.iter()
        .filter(|k| {
            let key = k.to_ascii_lowercase();
            !right.contains(&key) && seen.insert(key)
        })
        .cloned()
        .collect()
}

/// One item of a relationship as the directory lists it. Callers may name it
/// by either key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldKey {
    pub id: String,
    pub email: Option<String>,
}

impl HeldKey {
    /// The email when the item has one, else the id.
    pub fn key(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.id)
    }

    fn answers_to(&self, key: &str) -> bool {
        self.id.eq_ignore_ascii_case(key) || self.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(key))
    }
}

impl MembershipReconciler {
    pub fn new(existing: &[String], desired: &[String]) -> Self {
        Self {
            to_add: difference(desired, &folded(existing)),
            to_remove: difference(existing, &folded(desired)),
        }
    }

    /// Reconcile against held items, matching a desired key to an item by its
    /// id or its email. Desired keys naming no held item are added as given.
    pub fn against(held: &[HeldKey], desired: &[String]) -> Self {
        let existing: Vec<String> = held.iter().map(|h| h.key().to_string()).collect();
        let desired: Vec<String> = desired
            .iter()
            .map(|key| match held.iter().find(|h| h.answers_to(key)) {
                Some(h) => h.key().to_string(),
                None => key.clone(),
            })
            .collect();
        Self::new(&existing, &desired)
    }

    pub fn to_add(&self) -> &[String] {
        &self.to_add
    }

    pub fn to_remove(&self) -> &[String] {
        &self.to_remove
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Apply every addition, then every removal.
    pub async fn apply(&self, editor: &dyn MembershipEditor) -> ConnectorResult<()> {
        debug!(
            "Reconciling: {} to add, {} to remove",
            self.to_add.len(),
            self.to_remove.len()
        );
        for key in &self.to_add {
            match editor.add(key).await {
                Err(error) if error.is_already_exists() => {
                    debug!("'{}' already present", key);
                }
                other => other?,
            }
        }
        for key in &self.to_remove {
            match editor.remove(key).await {
                Err(error) if error.is_not_found() => {
                    debug!("'{}' already absent", key);
                }
                other => other?,
            }
        }
        Ok(())
    }
}

/// Edits the member list of one group.
pub struct GroupMembersEditor<'a> {
    client: &'a DirectoryClient,
    group: String,
    role: String,
}

impl<'a> GroupMembersEditor<'a> {
    pub fn new(client: &'a DirectoryClient, group: impl Into<String>) -> Self {
        Self {
            client,
            group: group.into(),
            role: "MEMBER".to_string(),
        }
    }
}

#[async_trait]
impl MembershipEditor for GroupMembersEditor<'_> {
    async fn add(&self, member: &str) -> ConnectorResult<()> {
        let body = json!({"email": member, "role": self.role});
        self.client
            .call(ApiRequest::post(endpoints::members(&self.group), body), &Discard)
            .await
    }

    async fn remove(&self, member: &str) -> ConnectorResult<()> {
        self.client
            .call(ApiRequest::delete(endpoints::member(&self.group, member)), &Discard)
            .await
    }
}

/// Edits the groups one user belongs to.
pub struct UserGroupsEditor<'a> {
    client: &'a DirectoryClient,
    user: String,
}

impl<'a> UserGroupsEditor<'a> {
    pub fn new(client: &'a DirectoryClient, user: impl Into<String>) -> Self {
        Self {
            client,
            user: user.into(),
        }
    }
}

#[async_trait]
impl MembershipEditor for UserGroupsEditor<'_> {
    async fn add(&self, group: &str) -> ConnectorResult<()> {
        let body = json!({"email": self.user, "role": "MEMBER"});
        self.client
            .call(ApiRequest::post(endpoints::members(group), body), &Discard)
            .await
    }

    async fn remove(&self, group: &str) -> ConnectorResult<()> {
        self.client
            .call(ApiRequest::delete(endpoints::member(group, &self.user)), &Discard)
            .await
    }
}

/// Which kind of object owns the aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasOwner {
    User,
    Group,
}

/// Edits the aliases of a user or group.
pub struct AliasEditor<'a> {
    client: &'a DirectoryClient,
    owner: AliasOwner,
    key: String,
}

impl<'a> AliasEditor<'a> {
    pub fn new(client: &'a DirectoryClient, owner: AliasOwner, key: impl Into<String>) -> Self {
        Self {
            client,
            owner,
            key: key.into(),
        }
    }
}

#[async_trait]
impl MembershipEditor for AliasEditor<'_> {
    async fn add(&self, alias: &str) -> ConnectorResult<()> {
        let path = match self.owner {
            AliasOwner::User => endpoints::user_aliases(&self.key),
            AliasOwner::Group => endpoints::group_aliases(&self.key),
        };
        self.client
            .call(ApiRequest::post(path, json!({"alias": alias})), &Discard)
            .await
    }

    async fn remove(&self, alias: &str) -> ConnectorResult<()> {
        let path = match self.owner {
            AliasOwner::User => endpoints::user_alias(&self.key, alias),
            AliasOwner::Group => endpoints::group_alias(&self.key, alias),
        };
        self.client.call(ApiRequest::delete(path), &Discard).await
    }
}
