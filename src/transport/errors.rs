//! Transport failures and the directory's structured error body.
//!
//! A [`TransportError`] means no response was obtained at all. An [`ApiError`] is
//! the structured body the directory returns with a non-2xx status:
//!
//! ```json
//! {"error": {"code": 404, "message": "Resource Not Found: userKey",
//!            "errors": [{"domain": "global", "reason": "notFound", "message": "..."}]}}
//! ```
//!
//! The envelope is optional; a bare `{code, message, errors}` body is accepted too.

use crate::transport::ApiResponse;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

/// Failures where no response was obtained.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be established or was reset.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The exchange did not complete in time.
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// The response could not be read.
    #[error("Malformed response: {message}")]
    Malformed { message: String },
}

impl TransportError {
    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }
}

/// One entry of the `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reason: String,
}

/// Structured error body returned by the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct Envelope {
    error: ApiError,
}

impl ApiError {
    /// Create an error with a single detail entry.
    pub fn new(code: u16, reason: &str, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            errors: vec![ApiErrorDetail {
                domain: "global".to_string(),
                message: message.to_string(),
                reason: reason.to_string(),
            }],
        }
    }

    /// Parse the structured error from a response body.
    ///
    /// Returns `None` when the body is missing or not shaped like an error.
    pub fn from_response(response: &ApiResponse) -> Option<Self> {
        let body = response.body.as_ref()?;
        Self::from_value(body)
    }

    fn from_value(body: &Value) -> Option<Self> {
        if body.get("error").is_some() {
            serde_json::from_value::<Envelope>(body.clone())
                .ok()
                .map(|e| e.error)
        } else if body.get("code").is_some() {
            serde_json::from_value::<ApiError>(body.clone()).ok()
        } else {
            None
        }
    }

    /// Primary classification key: the first detail's reason.
    pub fn reason(&self) -> &str {
        self.errors
            .first()
            .map(|e| e.reason.as_str())
            .unwrap_or_default()
    }

    /// Render as an enveloped response body.
    pub fn to_body(&self) -> Value {
        json!({ "error": self })
    }
}
