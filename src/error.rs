//! Error types for connector operations.
//!
//! Every failure a caller can observe is a [`ConnectorError`]. The variants map
//! onto the outcome classes of the remote directory: bad input is rejected before
//! any call is made, typed outcomes (not found, already exists) are never retried,
//! and only transient failures are retried inside the executor.

use crate::resource::Uid;

/// Result alias used throughout the crate.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Main error type for connector operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Input attribute is missing, blank, of the wrong shape, or not translatable.
    /// No remote call has been made.
    #[error("Invalid attribute '{attribute}': {message}")]
    InvalidAttribute { attribute: String, message: String },

    /// Resource type, filter shape or operation is not implemented.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The remote directory reported that the addressed object does not exist.
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// A mutation addressed an object that does not exist.
    #[error("Unknown {resource_type} with uid '{uid}'")]
    UnknownResource { resource_type: String, uid: String },

    /// The remote directory reported a duplicate.
    #[error("Already exists: {message}")]
    AlreadyExists { message: String },

    /// The remote directory throttled the call. The caller owns the backoff.
    #[error("Rate limited ({reason}): {message}")]
    RateLimited { reason: String, message: String },

    /// Network failure or backend error that persisted through every retry.
    #[error("Transient failure after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },

    /// Any other remote failure.
    #[error("Remote call failed with status {status} ({reason}): {message}")]
    Fatal {
        status: u16,
        reason: String,
        message: String,
    },

    /// The primary resource was created or updated but a follow-up step failed.
    /// The resource is not rolled back; `uid` names it so the caller can clean up
    /// or retry the remaining steps.
    #[error("Operation partially applied to '{uid}': {source}")]
    PartiallyApplied {
        uid: Uid,
        #[source]
        source: Box<ConnectorError>,
    },

    /// Configuration could not be validated.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The credential provider could not supply a token.
    #[error("Credential error: {message}")]
    Credentials { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConnectorError {
    /// Create an invalid attribute error.
    pub fn invalid_attribute(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation(message.into())
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wrap a side-effect failure so it references the already-applied resource.
    pub fn partially_applied(uid: Uid, source: ConnectorError) -> Self {
        Self::PartiallyApplied {
            uid,
            source: Box::new(source),
        }
    }

    /// Whether the caller may reasonably retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Transient { .. } | Self::PartiallyApplied { .. }
        )
    }

    /// Whether this error means the addressed object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::UnknownResource { .. })
    }

    /// Whether this error means the object already exists.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConnectorError::invalid_attribute("givenName", "must not be blank");
        assert_eq!(
            error.to_string(),
            "Invalid attribute 'givenName': must not be blank"
        );

        let error = ConnectorError::UnknownResource {
            resource_type: "__ACCOUNT__".to_string(),
            uid: "123".to_string(),
        };
        assert_eq!(error.to_string(), "Unknown __ACCOUNT__ with uid '123'");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(
            ConnectorError::Transient {
                attempts: 6,
                message: "connection reset".to_string()
            }
            .is_retryable()
        );
        assert!(
            ConnectorError::partially_applied(
                Uid::new("42"),
                ConnectorError::invalid_attribute("aliases", "not a string")
            )
            .is_retryable()
        );
        assert!(
            !ConnectorError::NotFound {
                message: "gone".to_string()
            }
            .is_retryable()
        );
        assert!(!ConnectorError::unsupported("Not filter").is_retryable());
    }
}
