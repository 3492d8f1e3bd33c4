//! Bearer credential seam.
//!
//! Acquiring tokens (service account key exchange, OAuth flows) is outside this
//! crate. The connector only asks a [`CredentialProvider`] for the current token
//! and, once per inbound operation, gives it a chance to refresh.

use crate::error::{ConnectorError, ConnectorResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Supplies the bearer token attached to every remote call.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current access token.
    async fn token(&self) -> ConnectorResult<String>;

    /// Refresh the token when it is expired or about to expire.
    async fn refresh_if_expired(&self) -> ConnectorResult<()>;
}

/// A fixed token that never expires.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    token: String,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn token(&self) -> ConnectorResult<String> {
        if self.token.is_empty() {
            return Err(ConnectorError::Credentials {
                message: "no access token configured".to_string(),
            });
        }
        Ok(self.token.clone())
    }

    async fn refresh_if_expired(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

/// A token together with its expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

/// Something that can mint a fresh [`AccessToken`].
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire(&self) -> ConnectorResult<AccessToken>;
}

/// Caches tokens from a [`TokenSource`] and re-acquires them shortly before expiry.
pub struct CachedCredentials {
    source: Arc<dyn TokenSource>,
    cached: RwLock<Option<AccessToken>>,
    grace_period: Duration,
}

impl CachedCredentials {
    /// Cache tokens from `source`, refreshing five minutes before expiry.
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
            grace_period: Duration::minutes(5),
        }
    }

    /// Drop the cached token so the next call re-acquires.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn current(&self) -> Option<String> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|t| !t.is_expired(self.grace_period))
            .map(|t| t.value.clone())
    }
}

#[async_trait]
impl CredentialProvider for CachedCredentials {
    async fn token(&self) -> ConnectorResult<String> {
        if let Some(token) = self.current().await {
            return Ok(token);
        }
        self.refresh_if_expired().await?;
        self.current().await.ok_or_else(|| ConnectorError::Credentials {
            message: "token source returned an already expired token".to_string(),
        })
    }

    async fn refresh_if_expired(&self) -> ConnectorResult<()> {
        if self.current().await.is_some() {
            return Ok(());
        }
        debug!("Refreshing access token");
        let token = self.source.acquire().await?;
        debug!(
            "Acquired new token, expires at {}",
            token.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        *self.cached.write().await = Some(token);
        Ok(())
    }
}
