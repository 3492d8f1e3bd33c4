//! Transport abstraction between the connector and the remote directory.
//!
//! This module keeps request execution policy (retry, classification, paging)
//! apart from how bytes reach the directory. The [`DirectoryTransport`] trait is a
//! plain request/response exchange of JSON bodies; the connector never sees
//! anything HTTP-specific beyond a status code.
//!
//! # Architecture
//!
//! The transport layer is responsible for:
//! - Delivering one [`ApiRequest`] and returning the [`ApiResponse`]
//! - Reporting failures where no response was obtained as [`TransportError`]
//!
//! The transport layer is NOT responsible for:
//! - Retrying, backoff or error classification (see [`crate::executor`])
//! - Credential refresh (see [`crate::credentials`])
//! - Mapping provider payloads (see [`crate::mapper`])
//!
//! # Example Usage
//!
//! ```rust
//! use directory_connector::transport::{ApiRequest, DirectoryTransport, InMemoryDirectory};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let directory = InMemoryDirectory::new("example.com");
//! let request = ApiRequest::post("users", json!({
//!     "primaryEmail": "jane@example.com",
//!     "password": "s3cret!",
//!     "name": {"givenName": "Jane", "familyName": "Doe"}
//! }));
//! let response = directory.send(request).await?;
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod in_memory;

pub use errors::{ApiError, ApiErrorDetail, TransportError};
pub use in_memory::InMemoryDirectory;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// One call against the directory API.
///
/// `path` is relative to the API root (`users/123/aliases`).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Bearer credential, attached by the client right before sending.
    pub bearer_token: Option<String>,
}

impl ApiRequest {
    /// Create a request without body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer_token: None,
        }
    }

    /// GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// POST request with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    /// PUT request with a JSON body.
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    /// PATCH request with a JSON body.
    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, path).with_body(body)
    }

    /// DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append a query parameter when a value is present.
    pub fn with_optional_query(self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.with_query(key, v),
            None => self,
        }
    }

    /// Replace (or add) a query parameter.
    pub fn set_query(&mut self, key: &str, value: impl Into<String>) {
        self.query.retain(|(k, _)| k != key);
        self.query.push((key.to_string(), value.into()));
    }

    /// First value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)?;
        for (i, (k, v)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, k, v)?;
        }
        Ok(())
    }
}

/// Response obtained from the directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl ApiResponse {
    /// 200 with a JSON body.
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body: Some(body),
        }
    }

    /// 204 without body.
    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }

    /// Structured error response.
    pub fn error(status: u16, reason: &str, message: &str) -> Self {
        Self {
            status,
            body: Some(ApiError::new(status, reason, message).to_body()),
        }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request/response exchange with the remote directory.
///
/// Implementations deliver the request as-is; failures where no response could
/// be obtained are reported as [`TransportError`] and are treated as transient.
#[async_trait]
pub trait DirectoryTransport: Send + Sync {
    /// Deliver one request.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_display_includes_query() {
        let request = ApiRequest::get("users")
            .with_query("customer", "my_customer")
            .with_query("maxResults", "2");
        assert_eq!(
            request.to_string(),
            "GET users?customer=my_customer&maxResults=2"
        );
        assert_eq!(request.query_param("maxResults"), Some("2"));
    }

    #[test]
    fn test_set_query_replaces_existing_value() {
        let mut request = ApiRequest::get("groups").with_query("pageToken", "a");
        request.set_query("pageToken", "b");
        assert_eq!(request.query, vec![("pageToken".to_string(), "b".to_string())]);
    }

    #[test]
    fn test_response_success_range() {
        assert!(ApiResponse::ok(json!({})).is_success());
        assert!(ApiResponse::no_content().is_success());
        assert!(!ApiResponse::error(404, "notFound", "Resource Not Found").is_success());
    }
}
