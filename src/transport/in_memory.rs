//! In-memory directory implementing [`DirectoryTransport`].
//!
//! This module simulates the remote directory API closely enough to drive the
//! connector end to end without a network: users (with aliases, photos and admin
//! promotion), groups and their members, organisational units and product license
//! assignments. It evaluates the same query grammar the filter translator emits,
//! hands out opaque page tokens, computes etags from content, and answers with the
//! directory's structured error bodies.
//!
//! # Features
//!
//! * Thread-safe concurrent access with an async mutex
//! * Page tokens and `maxResults` on every list endpoint that pages remotely
//! * Failure injection (structured errors or transport failures), optionally
//!   restricted to a path prefix
//! * Request log for asserting what the connector sent
//!
//! # Example Usage
//!
//! ```rust
//! use directory_connector::transport::{ApiRequest, ApiResponse, DirectoryTransport, InMemoryDirectory};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let directory = InMemoryDirectory::new("example.com");
//! directory.seed_group(json!({"email": "staff@example.com", "name": "Staff"})).await;
//!
//! directory.inject_response(None, ApiResponse::error(503, "backendError", "Backend Error")).await;
//! let first = directory.send(ApiRequest::get("groups/staff@example.com")).await?;
//! assert_eq!(first.status, 503);
//!
//! let second = directory.send(ApiRequest::get("groups/staff@example.com")).await?;
//! assert!(second.is_success());
//! # Ok(())
//! # }
//! ```

use crate::transport::{ApiRequest, ApiResponse, DirectoryTransport, Method, TransportError};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{SecondsFormat, Utc};
use log::{debug, trace};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 500;

/// A scripted outcome returned instead of routing the next matching request.
#[derive(Debug, Clone)]
struct Injection {
    path_prefix: Option<String>,
    outcome: Result<ApiResponse, TransportError>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    domain: String,
    customer_id: String,
    required_token: Option<String>,
    users: Vec<Value>,
    groups: Vec<Value>,
    // group id -> members
    members: HashMap<String, Vec<Value>>,
    // user id -> web-safe base64 photo data
    photos: HashMap<String, String>,
    org_units: Vec<Value>,
    licenses: Vec<Value>,
    injections: VecDeque<Injection>,
    requests: Vec<ApiRequest>,
}

/// Thread-safe in-memory directory.
#[derive(Clone)]
pub struct InMemoryDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl InMemoryDirectory {
    /// Create an empty directory serving `domain`.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DirectoryState {
                domain: domain.into(),
                customer_id: "C01234567".to_string(),
                ..DirectoryState::default()
            })),
        }
    }

    /// Reject requests whose bearer token differs from `token`.
    pub async fn require_token(&self, token: impl Into<String>) {
        self.state.lock().await.required_token = Some(token.into());
    }

    /// Answer the next request (whose path starts with `path_prefix`, if given)
    /// with `response` instead of routing it.
    pub async fn inject_response(&self, path_prefix: Option<&str>, response: ApiResponse) {
        self.state.lock().await.injections.push_back(Injection {
            path_prefix: path_prefix.map(str::to_string),
            outcome: Ok(response),
        });
    }

    /// Fail the next request (whose path starts with `path_prefix`, if given)
    /// at the transport level.
    pub async fn inject_transport_error(&self, path_prefix: Option<&str>, error: TransportError) {
        self.state.lock().await.injections.push_back(Injection {
            path_prefix: path_prefix.map(str::to_string),
            outcome: Err(error),
        });
    }

    /// Every request received so far, in order.
    pub async fn requests(&self) -> Vec<ApiRequest> {
        self.state.lock().await.requests.clone()
    }

    /// Forget recorded requests.
    pub async fn clear_requests(&self) {
        self.state.lock().await.requests.clear();
    }

    /// Insert a user directly, bypassing required-field checks. Returns the stored user.
    pub async fn seed_user(&self, user: Value) -> Value {
        let mut state = self.state.lock().await;
        let stored = state.new_user(user);
        state.users.push(stored.clone());
        stored
    }

    /// Insert a group directly. Returns the stored group.
    pub async fn seed_group(&self, group: Value) -> Value {
        let mut state = self.state.lock().await;
        let stored = state.new_group(group);
        state.groups.push(stored.clone());
        stored
    }

    /// Look up a user by id, primary email or alias.
    pub async fn user(&self, key: &str) -> Option<Value> {
        let state = self.state.lock().await;
        state.find_user(key).map(|i| state.users[i].clone())
    }

    /// Look up a group by id, email or alias.
    pub async fn group(&self, key: &str) -> Option<Value> {
        let state = self.state.lock().await;
        state.find_group(key).map(|i| state.groups[i].clone())
    }

    /// Emails of the groups `user_key` is a direct member of, sorted.
    pub async fn groups_of(&self, user_key: &str) -> Vec<String> {
        let state = self.state.lock().await;
        let mut groups: Vec<String> = state
            .groups_with_member(user_key)
            .iter()
            .map(|&i| str_field(&state.groups[i], "email").to_string())
            .collect();
        groups.sort();
        groups
    }

    /// Emails of the members of `group_key`, sorted.
    pub async fn member_emails(&self, group_key: &str) -> Vec<String> {
        let state = self.state.lock().await;
        let Some(index) = state.find_group(group_key) else {
            return Vec::new();
        };
        let group_id = str_field(&state.groups[index], "id").to_string();
        let mut emails: Vec<String> = state
            .members
            .get(&group_id)
            .map(|members| {
                members
                    .iter()
                    .map(|m| str_field(m, "email").to_string())
                    .collect()
            })
            .unwrap_or_default();
        emails.sort();
        emails
    }

    /// Stored photo data of a user.
    pub async fn photo(&self, user_key: &str) -> Option<String> {
        let state = self.state.lock().await;
        let index = state.find_user(user_key)?;
        let id = str_field(&state.users[index], "id");
        state.photos.get(id).cloned()
    }

    /// All license assignments.
    pub async fn licenses(&self) -> Vec<Value> {
        self.state.lock().await.licenses.clone()
    }
}

#[async_trait]
impl DirectoryTransport for InMemoryDirectory {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut state = self.state.lock().await;
        trace!("In-memory directory received {}", request);
        state.requests.push(request.clone());

        if let Some(position) = state.injections.iter().position(|inj| {
            inj.path_prefix
                .as_deref()
                .is_none_or(|prefix| request.path.starts_with(prefix))
        }) {
            if let Some(injection) = state.injections.remove(position) {
                debug!("Returning injected outcome for {}", request);
                return injection.outcome;
            }
        }

        if let Some(required) = &state.required_token {
            if request.bearer_token.as_deref() != Some(required.as_str()) {
                return Ok(ApiResponse::error(401, "authError", "Invalid Credentials"));
            }
        }

        Ok(state.route(&request))
    }
}

impl DirectoryState {
    fn route(&mut self, request: &ApiRequest) -> ApiResponse {
        let segments: Vec<&str> = request.path.split('/').filter(|s| !s.is_empty()).collect();
        let body = request.body.clone().unwrap_or(Value::Null);

        match (request.method, segments.as_slice()) {
            (Method::Get, ["users"]) => self.list_users(request),
            (Method::Post, ["users"]) => self.insert_user(body),
            (Method::Get, ["users", key]) => self.get_user(key),
            (Method::Patch | Method::Put, ["users", key]) => self.patch_user(key, body),
            (Method::Delete, ["users", key]) => self.delete_user(key),
            (Method::Get, ["users", key, "aliases"]) => self.list_aliases("users", key),
            (Method::Post, ["users", key, "aliases"]) => self.insert_alias("users", key, body),
            (Method::Delete, ["users", key, "aliases", alias]) => {
                self.delete_alias("users", key, alias)
            }
            (Method::Get, ["users", key, "photos", "thumbnail"]) => self.get_photo(key),
            (Method::Put, ["users", key, "photos", "thumbnail"]) => self.put_photo(key, body),
            (Method::Post, ["users", key, "makeAdmin"]) => self.make_admin(key, body),
            (Method::Get, ["groups"]) => self.list_groups(request),
            (Method::Post, ["groups"]) => self.insert_group(body),
            (Method::Get, ["groups", key]) => self.get_group(key),
            (Method::Patch | Method::Put, ["groups", key]) => self.patch_group(key, body),
            (Method::Delete, ["groups", key]) => self.delete_group(key),
            (Method::Get, ["groups", key, "aliases"]) => self.list_aliases("groups", key),
            (Method::Post, ["groups", key, "aliases"]) => self.insert_alias("groups", key, body),
            (Method::Delete, ["groups", key, "aliases", alias]) => {
                self.delete_alias("groups", key, alias)
            }
            (Method::Get, ["groups", key, "members"]) => self.list_members(key, request),
            (Method::Post, ["groups", key, "members"]) => self.insert_member(key, body),
            (Method::Get, ["groups", key, "members", member]) => self.get_member(key, member),
            (Method::Patch | Method::Put, ["groups", key, "members", member]) => {
                self.patch_member(key, member, body)
            }
            (Method::Delete, ["groups", key, "members", member]) => {
                self.delete_member(key, member)
            }
            (Method::Get, ["customer", _, "orgunits"]) => self.list_org_units(request),
            (Method::Post, ["customer", _, "orgunits"]) => self.insert_org_unit(body),
            (Method::Get, ["customer", _, "orgunits", path @ ..]) => {
                self.get_org_unit(&path.join("/"))
            }
            (Method::Patch | Method::Put, ["customer", _, "orgunits", path @ ..]) => {
                self.patch_org_unit(&path.join("/"), body)
            }
            (Method::Delete, ["customer", _, "orgunits", path @ ..]) => {
                self.delete_org_unit(&path.join("/"))
            }
            (Method::Post, ["product", product, "sku", sku, "user"]) => {
                self.insert_license(product, sku, body)
            }
            (Method::Get, ["product", product, "sku", sku, "user", user]) => {
                self.get_license(product, sku, user)
            }
            (Method::Patch | Method::Put, ["product", product, "sku", sku, "user", user]) => {
                self.patch_license(product, sku, user, body)
            }
            (Method::Delete, ["product", product, "sku", sku, "user", user]) => {
                self.delete_license(product, sku, user)
            }
            (Method::Get, ["product", product, "sku", sku, "users"]) => {
                self.list_licenses(Some(product), Some(sku), request)
            }
            (Method::Get, ["product", product, "users"]) => {
                self.list_licenses(Some(product), None, request)
            }
            _ => ApiResponse::error(404, "notFound", &format!("No route for {}", request)),
        }
    }

    // ----- users -----

    fn new_user(&self, mut user: Value) -> Value {
        let obj = object_mut(&mut user);
        obj.remove("password");
        obj.remove("hashFunction");
        obj.insert("kind".into(), json!("admin#directory#user"));
        obj.insert("id".into(), json!(generate_id()));
        obj.insert("customerId".into(), json!(self.customer_id));
        obj.insert("creationTime".into(), json!(now()));
        obj.insert("lastLoginTime".into(), json!("1970-01-01T00:00:00.000Z"));
        obj.entry("isAdmin").or_insert(json!(false));
        obj.entry("isDelegatedAdmin").or_insert(json!(false));
        obj.entry("suspended").or_insert(json!(false));
        obj.entry("orgUnitPath").or_insert(json!("/"));
        obj.entry("includeInGlobalAddressList").or_insert(json!(true));
        obj.entry("changePasswordAtNextLogin").or_insert(json!(false));
        obj.insert("isMailboxSetup".into(), json!(true));
        obj.insert("agreedToTerms".into(), json!(false));
        refresh_full_name(&mut user);
        with_etag(user)
    }

    fn find_user(&self, key: &str) -> Option<usize> {
        self.users.iter().position(|u| {
            str_field(u, "id") == key
                || str_field(u, "primaryEmail").eq_ignore_ascii_case(key)
                || has_alias(u, key)
        })
    }

    fn email_in_use(&self, email: &str) -> bool {
        self.find_user(email).is_some() || self.find_group(email).is_some()
    }

    fn insert_user(&mut self, body: Value) -> ApiResponse {
        for field in ["primaryEmail", "password"] {
            if str_field(&body, field).is_empty() {
                return invalid(&format!("Invalid Input: {}", field));
            }
        }
        for field in ["givenName", "familyName"] {
            if body
                .get("name")
                .and_then(|n| n.get(field))
                .and_then(Value::as_str)
                .is_none_or(str::is_empty)
            {
                return invalid(&format!("Invalid Given/Family Name: {}", field));
            }
        }
        let email = str_field(&body, "primaryEmail").to_string();
        if self.email_in_use(&email) {
            return duplicate("Entity already exists.");
        }
        let user = self.new_user(body);
        self.users.push(user.clone());
        ApiResponse::ok(user)
    }

    fn get_user(&self, key: &str) -> ApiResponse {
        match self.find_user(key) {
            Some(i) => ApiResponse::ok(self.users[i].clone()),
            None => not_found("Resource Not Found: userKey"),
        }
    }

    fn patch_user(&mut self, key: &str, body: Value) -> ApiResponse {
        let Some(index) = self.find_user(key) else {
            return not_found("Resource Not Found: userKey");
        };
        if let Some(email) = body.get("primaryEmail").and_then(Value::as_str) {
            let current = str_field(&self.users[index], "primaryEmail");
            if !email.eq_ignore_ascii_case(current) && self.email_in_use(email) {
                return duplicate("Entity already exists.");
            }
        }
        let mut user = self.users[index].clone();
        merge_patch(&mut user, body);
        let obj = object_mut(&mut user);
        obj.remove("password");
        obj.remove("hashFunction");
        refresh_full_name(&mut user);
        let user = with_etag(user);
        self.users[index] = user.clone();
        ApiResponse::ok(user)
    }

    fn delete_user(&mut self, key: &str) -> ApiResponse {
        let Some(index) = self.find_user(key) else {
            return not_found("Resource Not Found: userKey");
        };
        let user = self.users.remove(index);
        let id = str_field(&user, "id").to_string();
        let email = str_field(&user, "primaryEmail").to_string();
        for members in self.members.values_mut() {
            members.retain(|m| str_field(m, "id") != id);
        }
        self.photos.remove(&id);
        self.licenses
            .retain(|l| !str_field(l, "userId").eq_ignore_ascii_case(&email));
        ApiResponse::no_content()
    }

    fn list_users(&self, request: &ApiRequest) -> ApiResponse {
        if request.query_param("customer").is_none() && request.query_param("domain").is_none() {
            return invalid("Bad Request: customer or domain required");
        }
        let query = request.query_param("query").unwrap_or_default();
        let mut matched = Vec::new();
        for user in &self.users {
            match matches_query(query, |field| user_query_values(user, field)) {
                Ok(true) => matched.push(user.clone()),
                Ok(false) => {}
                Err(response) => return response,
            }
        }
        if let Some(order_by) = request.query_param("orderBy") {
            let path = match order_by {
                "givenName" => "name.givenName",
                "familyName" => "name.familyName",
                _ => "primaryEmail",
            };
            matched.sort_by_key(|u| path_str(u, path).to_ascii_lowercase());
            if request.query_param("sortOrder") == Some("DESCENDING") {
                matched.reverse();
            }
        }
        page(matched, "users", "admin#directory#users", request)
    }

    fn get_photo(&self, key: &str) -> ApiResponse {
        let Some(index) = self.find_user(key) else {
            return not_found("Resource Not Found: userKey");
        };
        let id = str_field(&self.users[index], "id");
        match self.photos.get(id) {
            Some(data) => ApiResponse::ok(json!({
                "kind": "admin#directory#user#photo",
                "primaryEmail": str_field(&self.users[index], "primaryEmail"),
                "photoData": data,
                "mimeType": "JPEG"
            })),
            None => not_found("Resource Not Found: photo"),
        }
    }

    fn put_photo(&mut self, key: &str, body: Value) -> ApiResponse {
        let Some(index) = self.find_user(key) else {
            return not_found("Resource Not Found: userKey");
        };
        let data = str_field(&body, "photoData").to_string();
        if data.is_empty() {
            return invalid("Invalid Input: photoData");
        }
        let id = str_field(&self.users[index], "id").to_string();
        self.photos.insert(id, data.clone());
        ApiResponse::ok(json!({"kind": "admin#directory#user#photo", "photoData": data}))
    }

    fn make_admin(&mut self, key: &str, body: Value) -> ApiResponse {
        let Some(index) = self.find_user(key) else {
            return not_found("Resource Not Found: userKey");
        };
        let status = body.get("status").and_then(Value::as_bool).unwrap_or(false);
        let mut user = self.users[index].clone();
        object_mut(&mut user).insert("isAdmin".into(), json!(status));
        self.users[index] = with_etag(user);
        ApiResponse::no_content()
    }

    // ----- aliases (users and groups) -----

    fn owner(&mut self, collection: &str, key: &str) -> Option<&mut Value> {
        match collection {
            "users" => {
                let i = self.find_user(key)?;
                self.users.get_mut(i)
            }
            _ => {
                let i = self.find_group(key)?;
                self.groups.get_mut(i)
            }
        }
    }

    fn list_aliases(&mut self, collection: &str, key: &str) -> ApiResponse {
        let Some(owner) = self.owner(collection, key) else {
            return not_found("Resource Not Found: key");
        };
        let aliases: Vec<Value> = owner
            .get("aliases")
            .and_then(Value::as_array)
            .map(|a| a.iter().map(|alias| json!({"alias": alias})).collect())
            .unwrap_or_default();
        ApiResponse::ok(json!({"kind": "admin#directory#aliases", "aliases": aliases}))
    }

    fn insert_alias(&mut self, collection: &str, key: &str, body: Value) -> ApiResponse {
        let alias = str_field(&body, "alias").to_string();
        if alias.is_empty() || !alias.contains('@') {
            return invalid("Invalid Input: alias");
        }
        if self.email_in_use(&alias) {
            return duplicate("Entity already exists.");
        }
        let Some(owner) = self.owner(collection, key) else {
            return not_found("Resource Not Found: key");
        };
        let obj = object_mut(owner);
        let aliases = obj.entry("aliases").or_insert_with(|| json!([]));
        if let Some(list) = aliases.as_array_mut() {
            list.push(json!(alias));
        }
        let primary = obj
            .get("primaryEmail")
            .or_else(|| obj.get("email"))
            .cloned()
            .unwrap_or(Value::Null);
        ApiResponse::ok(json!({"kind": "admin#directory#alias", "alias": alias, "primaryEmail": primary}))
    }

    fn delete_alias(&mut self, collection: &str, key: &str, alias: &str) -> ApiResponse {
        let Some(owner) = self.owner(collection, key) else {
            return not_found("Resource Not Found: key");
        };
        let Some(list) = owner.get_mut("aliases").and_then(Value::as_array_mut) else {
            return not_found("Resource Not Found: alias");
        };
        let before = list.len();
        list.retain(|a| !a.as_str().is_some_and(|s| s.eq_ignore_ascii_case(alias)));
        if list.len() == before {
            return not_found("Resource Not Found: alias");
        }
        ApiResponse::no_content()
    }

    // ----- groups -----

    fn new_group(&self, mut group: Value) -> Value {
        let email = str_field(&group, "email").to_string();
        let obj = object_mut(&mut group);
        obj.insert("kind".into(), json!("admin#directory#group"));
        obj.insert("id".into(), json!(generate_id()));
        obj.entry("name").or_insert(json!(email));
        obj.entry("description").or_insert(json!(""));
        obj.insert("adminCreated".into(), json!(true));
        obj.insert("directMembersCount".into(), json!("0"));
        with_etag(group)
    }

    fn find_group(&self, key: &str) -> Option<usize> {
        self.groups.iter().position(|g| {
            str_field(g, "id") == key
                || str_field(g, "email").eq_ignore_ascii_case(key)
                || has_alias(g, key)
        })
    }

    fn groups_with_member(&self, member_key: &str) -> Vec<usize> {
        let member_id = self
            .find_user(member_key)
            .map(|i| str_field(&self.users[i], "id").to_string())
            .or_else(|| {
                self.find_group(member_key)
                    .map(|i| str_field(&self.groups[i], "id").to_string())
            });
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, g)| {
                self.members
                    .get(str_field(g, "id"))
                    .is_some_and(|members| {
                        members.iter().any(|m| {
                            str_field(m, "email").eq_ignore_ascii_case(member_key)
                                || member_id.as_deref() == Some(str_field(m, "id"))
                        })
                    })
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn insert_group(&mut self, body: Value) -> ApiResponse {
        let email = str_field(&body, "email").to_string();
        if email.is_empty() {
            return invalid("Invalid Input: email");
        }
        if self.email_in_use(&email) {
            return duplicate("Entity already exists.");
        }
        let group = self.new_group(body);
        self.groups.push(group.clone());
        ApiResponse::ok(group)
    }

    fn get_group(&self, key: &str) -> ApiResponse {
        match self.find_group(key) {
            Some(i) => ApiResponse::ok(self.groups[i].clone()),
            None => not_found("Resource Not Found: groupKey"),
        }
    }

    fn patch_group(&mut self, key: &str, body: Value) -> ApiResponse {
        let Some(index) = self.find_group(key) else {
            return not_found("Resource Not Found: groupKey");
        };
        if let Some(email) = body.get("email").and_then(Value::as_str) {
            let current = str_field(&self.groups[index], "email");
            if !email.eq_ignore_ascii_case(current) && self.email_in_use(email) {
                return duplicate("Entity already exists.");
            }
        }
        let mut group = self.groups[index].clone();
        merge_patch(&mut group, body);
        let group = with_etag(group);
        self.groups[index] = group.clone();
        ApiResponse::ok(group)
    }

    fn delete_group(&mut self, key: &str) -> ApiResponse {
        let Some(index) = self.find_group(key) else {
            return not_found("Resource Not Found: groupKey");
        };
        let group = self.groups.remove(index);
        self.members.remove(str_field(&group, "id"));
        ApiResponse::no_content()
    }

    fn list_groups(&self, request: &ApiRequest) -> ApiResponse {
        let scoped: Vec<usize> = if let Some(user_key) = request.query_param("userKey") {
            self.groups_with_member(user_key)
        } else if request.query_param("customer").is_some()
            || request.query_param("domain").is_some()
        {
            (0..self.groups.len()).collect()
        } else {
            return invalid("Bad Request: customer, domain or userKey required");
        };
        let query = request.query_param("query").unwrap_or_default();
        let mut matched = Vec::new();
        for index in scoped {
            let group = &self.groups[index];
            match matches_query(query, |field| self.group_query_values(group, field)) {
                Ok(true) => matched.push(group.clone()),
                Ok(false) => {}
                Err(response) => return response,
            }
        }
        page(matched, "groups", "admin#directory#groups", request)
    }

    fn group_query_values(&self, group: &Value, field: &str) -> Option<Vec<String>> {
        match field {
            "email" => {
                let mut values = vec![str_field(group, "email").to_string()];
                values.extend(aliases_of(group));
                Some(values)
            }
            "name" => Some(vec![str_field(group, "name").to_string()]),
            "description" => Some(vec![str_field(group, "description").to_string()]),
            "memberKey" => Some(
                self.members
                    .get(str_field(group, "id"))
                    .map(|m| m.iter().map(|m| str_field(m, "email").to_string()).collect())
                    .unwrap_or_default(),
            ),
            _ => None,
        }
    }

    // ----- members -----

    fn insert_member(&mut self, group_key: &str, body: Value) -> ApiResponse {
        let Some(index) = self.find_group(group_key) else {
            return not_found("Resource Not Found: groupKey");
        };
        let key = body
            .get("email")
            .or_else(|| body.get("id"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if key.is_empty() {
            return invalid("Invalid Input: memberKey");
        }
        let role = body
            .get("role")
            .and_then(Value::as_str)
            .unwrap_or("MEMBER")
            .to_string();
        if !matches!(role.as_str(), "OWNER" | "MANAGER" | "MEMBER") {
            return invalid("Invalid Input: role");
        }
        let (id, email, member_type) = if let Some(u) = self.find_user(&key) {
            let user = &self.users[u];
            (str_field(user, "id"), str_field(user, "primaryEmail"), "USER")
        } else if let Some(g) = self.find_group(&key) {
            let group = &self.groups[g];
            (str_field(group, "id"), str_field(group, "email"), "GROUP")
        } else {
            return not_found("Resource Not Found: memberKey");
        };
        let member = with_etag(json!({
            "kind": "admin#directory#member",
            "id": id,
            "email": email,
            "role": role,
            "type": member_type,
            "status": "ACTIVE",
        }));
        let group_id = str_field(&self.groups[index], "id").to_string();
        let members = self.members.entry(group_id).or_default();
        if members.iter().any(|m| str_field(m, "id") == str_field(&member, "id")) {
            return duplicate("Member already exists.");
        }
        members.push(member.clone());
        let count = members.len();
        let mut group = self.groups[index].clone();
        object_mut(&mut group).insert("directMembersCount".into(), json!(count.to_string()));
        self.groups[index] = group;
        ApiResponse::ok(member)
    }

    fn member_position(&self, group_key: &str, member_key: &str) -> Result<(String, usize), ApiResponse> {
        let Some(index) = self.find_group(group_key) else {
            return Err(not_found("Resource Not Found: groupKey"));
        };
        let group_id = str_field(&self.groups[index], "id").to_string();
        let member_id = self
            .find_user(member_key)
            .map(|i| str_field(&self.users[i], "id").to_string());
        let position = self.members.get(&group_id).and_then(|members| {
            members.iter().position(|m| {
                str_field(m, "email").eq_ignore_ascii_case(member_key)
                    || str_field(m, "id") == member_key
                    || member_id.as_deref() == Some(str_field(m, "id"))
            })
        });
        match position {
            Some(p) => Ok((group_id, p)),
            None => Err(not_found("Resource Not Found: memberKey")),
        }
    }

    fn get_member(&self, group_key: &str, member_key: &str) -> ApiResponse {
        match self.member_position(group_key, member_key) {
            Ok((group_id, p)) => ApiResponse::ok(self.members[&group_id][p].clone()),
            Err(response) => response,
        }
    }

    fn patch_member(&mut self, group_key: &str, member_key: &str, body: Value) -> ApiResponse {
        let (group_id, p) = match self.member_position(group_key, member_key) {
            Ok(found) => found,
            Err(response) => return response,
        };
        let Some(members) = self.members.get_mut(&group_id) else {
            return not_found("Resource Not Found: memberKey");
        };
        let mut member = members[p].clone();
        if let Some(role) = body.get("role") {
            object_mut(&mut member).insert("role".into(), role.clone());
        }
        let member = with_etag(member);
        members[p] = member.clone();
        ApiResponse::ok(member)
    }

    fn delete_member(&mut self, group_key: &str, member_key: &str) -> ApiResponse {
        let (group_id, p) = match self.member_position(group_key, member_key) {
            Ok(found) => found,
            Err(response) => return response,
        };
        if let Some(members) = self.members.get_mut(&group_id) {
            members.remove(p);
        }
        ApiResponse::no_content()
    }

    fn list_members(&self, group_key: &str, request: &ApiRequest) -> ApiResponse {
        let Some(index) = self.find_group(group_key) else {
            return not_found("Resource Not Found: groupKey");
        };
        let roles: Option<Vec<String>> = request
            .query_param("roles")
            .map(|r| r.split(',').map(|s| s.trim().to_ascii_uppercase()).collect());
        let members: Vec<Value> = self
            .members
            .get(str_field(&self.groups[index], "id"))
            .map(|members| {
                members
                    .iter()
                    .filter(|m| {
                        roles
                            .as_ref()
                            .is_none_or(|r| r.iter().any(|role| role == str_field(m, "role")))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        page(members, "members", "admin#directory#members", request)
    }

    // ----- org units -----

    fn find_org_unit(&self, path: &str) -> Option<usize> {
        let wanted = normalize_path(path);
        self.org_units.iter().position(|o| {
            str_field(o, "orgUnitPath") == wanted || str_field(o, "orgUnitId") == path
        })
    }

    fn insert_org_unit(&mut self, body: Value) -> ApiResponse {
        let name = str_field(&body, "name").to_string();
        if name.is_empty() {
            return invalid("Invalid Input: name");
        }
        let parent = normalize_path(str_field(&body, "parentOrgUnitPath"));
        if parent != "/" && self.find_org_unit(&parent).is_none() {
            return invalid("Invalid Input: parentOrgUnitPath");
        }
        let path = if parent == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", parent, name)
        };
        if self.find_org_unit(&path).is_some() {
            return duplicate("Invalid Ou Id");
        }
        let mut unit = body;
        let obj = object_mut(&mut unit);
        obj.insert("kind".into(), json!("admin#directory#orgUnit"));
        obj.insert("orgUnitId".into(), json!(format!("id:{}", generate_id())));
        obj.insert("orgUnitPath".into(), json!(path));
        obj.insert("parentOrgUnitPath".into(), json!(parent));
        obj.entry("description").or_insert(json!(""));
        obj.entry("blockInheritance").or_insert(json!(false));
        let unit = with_etag(unit);
        self.org_units.push(unit.clone());
        ApiResponse::ok(unit)
    }

    fn get_org_unit(&self, path: &str) -> ApiResponse {
        match self.find_org_unit(path) {
            Some(i) => ApiResponse::ok(self.org_units[i].clone()),
            None => not_found("Org unit not found"),
        }
    }

    fn patch_org_unit(&mut self, path: &str, body: Value) -> ApiResponse {
        let Some(index) = self.find_org_unit(path) else {
            return not_found("Org unit not found");
        };
        let mut unit = self.org_units[index].clone();
        merge_patch(&mut unit, body);
        let parent = normalize_path(str_field(&unit, "parentOrgUnitPath"));
        let name = str_field(&unit, "name").to_string();
        let new_path = if parent == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", parent, name)
        };
        object_mut(&mut unit).insert("orgUnitPath".into(), json!(new_path));
        let unit = with_etag(unit);
        self.org_units[index] = unit.clone();
        ApiResponse::ok(unit)
    }

    fn delete_org_unit(&mut self, path: &str) -> ApiResponse {
        let Some(index) = self.find_org_unit(path) else {
            return not_found("Org unit not found");
        };
        let unit_path = str_field(&self.org_units[index], "orgUnitPath").to_string();
        let has_children = self
            .org_units
            .iter()
            .any(|o| str_field(o, "parentOrgUnitPath") == unit_path);
        if has_children {
            return ApiResponse::error(400, "failedPrecondition", "Org unit has children");
        }
        self.org_units.remove(index);
        ApiResponse::no_content()
    }

    fn list_org_units(&self, request: &ApiRequest) -> ApiResponse {
        let parent = normalize_path(request.query_param("orgUnitPath").unwrap_or("/"));
        let all = request.query_param("type").unwrap_or("children") == "all";
        let units: Vec<Value> = self
            .org_units
            .iter()
            .filter(|o| {
                let unit_parent = str_field(o, "parentOrgUnitPath");
                if all {
                    let path = str_field(o, "orgUnitPath");
                    parent == "/" || path.starts_with(&format!("{}/", parent))
                } else {
                    unit_parent == parent
                }
            })
            .cloned()
            .collect();
        ApiResponse::ok(json!({"kind": "admin#directory#org_units", "organizationUnits": units}))
    }

    // ----- license assignments -----

    fn license_position(&self, product: &str, sku: &str, user: &str) -> Option<usize> {
        self.licenses.iter().position(|l| {
            str_field(l, "productId") == product
                && str_field(l, "skuId") == sku
                && str_field(l, "userId").eq_ignore_ascii_case(user)
        })
    }

    fn license(product: &str, sku: &str, user: &str) -> Value {
        with_etag(json!({
            "kind": "licensing#licenseAssignment",
            "productId": product,
            "skuId": sku,
            "userId": user,
            "productName": format!("Product {}", product),
            "skuName": format!("SKU {}", sku),
            "selfLink": format!("product/{}/sku/{}/user/{}", product, sku, user),
        }))
    }

    fn insert_license(&mut self, product: &str, sku: &str, body: Value) -> ApiResponse {
        let user = str_field(&body, "userId").to_string();
        if user.is_empty() {
            return invalid("Invalid Input: userId");
        }
        if self.license_position(product, sku, &user).is_some() {
            return duplicate("User already has a license for the specified product and SKU");
        }
        let license = Self::license(product, sku, &user);
        self.licenses.push(license.clone());
        ApiResponse::ok(license)
    }

    fn get_license(&self, product: &str, sku: &str, user: &str) -> ApiResponse {
        match self.license_position(product, sku, user) {
            Some(i) => ApiResponse::ok(self.licenses[i].clone()),
            None => not_found("User does not have a license for specified sku and product"),
        }
    }

    fn patch_license(&mut self, product: &str, sku: &str, user: &str, body: Value) -> ApiResponse {
        let Some(index) = self.license_position(product, sku, user) else {
            return not_found("User does not have a license for specified sku and product");
        };
        let new_sku = body
            .get("skuId")
            .and_then(Value::as_str)
            .unwrap_or(sku)
            .to_string();
        if new_sku != sku && self.license_position(product, &new_sku, user).is_some() {
            return duplicate("User already has a license for the specified product and SKU");
        }
        let user_id = str_field(&self.licenses[index], "userId").to_string();
        let license = Self::license(product, &new_sku, &user_id);
        self.licenses[index] = license.clone();
        ApiResponse::ok(license)
    }

    fn delete_license(&mut self, product: &str, sku: &str, user: &str) -> ApiResponse {
        match self.license_position(product, sku, user) {
            Some(i) => {
                self.licenses.remove(i);
                ApiResponse::no_content()
            }
            None => not_found("User does not have a license for specified sku and product"),
        }
    }

    fn list_licenses(&self, product: Option<&str>, sku: Option<&str>, request: &ApiRequest) -> ApiResponse {
        if request.query_param("customerId").is_none() {
            return invalid("Bad Request: customerId required");
        }
        let items: Vec<Value> = self
            .licenses
            .iter()
            .filter(|l| product.is_none_or(|p| str_field(l, "productId") == p))
            .filter(|l| sku.is_none_or(|s| str_field(l, "skuId") == s))
            .cloned()
            .collect();
        page(items, "items", "licensing#licenseAssignmentList", request)
    }
}

// ----- query evaluation -----

/// Split a query into terms, honouring single quotes and backslash escapes.
fn tokenize(query: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = query.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '\'' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    terms.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        terms.push(current);
    }
    terms
}

/// Evaluate a space-joined conjunction of `field=value` / `field:value[*]` terms.
fn matches_query<F>(query: &str, values_for: F) -> Result<bool, ApiResponse>
where
    F: Fn(&str) -> Option<Vec<String>>,
{
    for term in tokenize(query) {
        let Some(split) = term.find([':', '=']) else {
            return Err(invalid("Invalid Input: query"));
        };
        let (field, rest) = term.split_at(split);
        let exact = rest.starts_with('=');
        let wanted = rest[1..].to_ascii_lowercase();
        let Some(candidates) = values_for(field) else {
            return Err(invalid(&format!("Invalid Input: query field {}", field)));
        };
        let hit = candidates.iter().any(|candidate| {
            let candidate = candidate.to_ascii_lowercase();
            if let Some(prefix) = wanted.strip_suffix('*') {
                candidate.starts_with(prefix)
            } else if exact {
                candidate == wanted
            } else {
                candidate.contains(&wanted)
            }
        });
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

fn user_query_values(user: &Value, field: &str) -> Option<Vec<String>> {
    let scalar = |path: &str| Some(vec![path_str(user, path)]);
    let from_list = |list: &str, key: &str| {
        Some(
            user.get(list)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .map(|item| scalar_string(item.get(key).unwrap_or(&Value::Null)))
                        .collect()
                })
                .unwrap_or_default(),
        )
    };
    match field {
        "email" => {
            let mut values = vec![str_field(user, "primaryEmail").to_string()];
            values.extend(aliases_of(user));
            Some(values)
        }
        "name" => scalar("name.fullName"),
        "givenName" => scalar("name.givenName"),
        "familyName" => scalar("name.familyName"),
        "isAdmin" => scalar("isAdmin"),
        "isDelegatedAdmin" => scalar("isDelegatedAdmin"),
        "isSuspended" => scalar("suspended"),
        "orgUnitPath" => scalar("orgUnitPath"),
        "externalId" => from_list("externalIds", "value"),
        "orgName" => from_list("organizations", "name"),
        "orgTitle" => from_list("organizations", "title"),
        "orgDepartment" => from_list("organizations", "department"),
        "phone" => from_list("phones", "value"),
        "addressLocality" => from_list("addresses", "locality"),
        custom if custom.contains('.') => {
            let (schema, field) = custom.split_once('.')?;
            let value = user.get("customSchemas")?.get(schema)?.get(field);
            Some(match value {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| scalar_string(item.get("value").unwrap_or(item)))
                    .collect(),
                Some(v) => vec![scalar_string(v)],
                None => Vec::new(),
            })
        }
        _ => None,
    }
}

// ----- helpers -----

fn page(items: Vec<Value>, items_key: &str, kind: &str, request: &ApiRequest) -> ApiResponse {
    let size = request
        .query_param("maxResults")
        .and_then(|m| m.parse::<usize>().ok())
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = match request.query_param("pageToken") {
        Some(token) => match decode_token(token) {
            Some(offset) => offset,
            None => return invalid("Invalid Input: pageToken"),
        },
        None => 0,
    };
    let end = (offset + size).min(items.len());
    let slice: Vec<Value> = items.get(offset..end).map(<[Value]>::to_vec).unwrap_or_default();
    let mut body = Map::new();
    body.insert("kind".into(), json!(kind));
    body.insert(items_key.into(), Value::Array(slice));
    if end < items.len() {
        body.insert("nextPageToken".into(), json!(encode_token(end)));
    }
    ApiResponse::ok(Value::Object(body))
}

fn encode_token(offset: usize) -> String {
    BASE64.encode(format!("offset:{}", offset))
}

fn decode_token(token: &str) -> Option<usize> {
    let bytes = BASE64.decode(token).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    text.strip_prefix("offset:")?.parse().ok()
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Content-derived etag over everything except the etag itself.
fn with_etag(mut value: Value) -> Value {
    let obj = object_mut(&mut value);
    obj.remove("etag");
    let mut hasher = Sha256::new();
    hasher.update(Value::Object(obj.clone()).to_string().as_bytes());
    let hash = hasher.finalize();
    obj.insert(
        "etag".into(),
        json!(format!("\"{}\"", BASE64.encode(&hash[..8]))),
    );
    value
}

fn object_mut(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced by an object"),
    }
}

/// Shallow merge with one level of object merging (`name`, `customSchemas.*`).
fn merge_patch(target: &mut Value, patch: Value) {
    let Value::Object(patch) = patch else {
        return;
    };
    let obj = object_mut(target);
    for (key, value) in patch {
        match (obj.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (inner_key, inner_value) in incoming {
                    match (existing.get_mut(&inner_key), inner_value) {
                        (Some(Value::Object(deep)), Value::Object(deep_incoming)) => {
                            deep.extend(deep_incoming);
                        }
                        (_, inner_value) => {
                            existing.insert(inner_key, inner_value);
                        }
                    }
                }
            }
            (_, value) => {
                obj.insert(key, value);
            }
        }
    }
}

fn refresh_full_name(user: &mut Value) {
    let given = path_str(user, "name.givenName");
    let family = path_str(user, "name.familyName");
    if let Some(Value::Object(name)) = user.get_mut("name") {
        name.insert(
            "fullName".into(),
            json!(format!("{} {}", given, family).trim().to_string()),
        );
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{}", trimmed)
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn path_str(value: &Value, path: &str) -> String {
    let mut current = value;
    for part in path.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    scalar_string(current)
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn aliases_of(value: &Value) -> Vec<String> {
    value
        .get("aliases")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn has_alias(value: &Value, key: &str) -> bool {
    aliases_of(value).iter().any(|a| a.eq_ignore_ascii_case(key))
}

fn not_found(message: &str) -> ApiResponse {
    ApiResponse::error(404, "notFound", message)
}

fn duplicate(message: &str) -> ApiResponse {
    ApiResponse::error(409, "duplicate", message)
}

fn invalid(message: &str) -> ApiResponse {
    ApiResponse::error(400, "invalid", message)
}
