//! The inbound operation surface.
//!
//! [`DirectoryConnector`] validates its configuration once, builds the shared
//! client and registers one handler per resource type. Every operation gives the
//! credential provider a chance to refresh, resolves the handler and delegates.
//!
//! # Example
//!
//! ```rust
//! use directory_connector::{ConnectorConfig, DirectoryConnector, ResourceType};
//! use directory_connector::credentials::StaticCredentials;
//! use directory_connector::resource::AttributeSet;
//! use directory_connector::transport::InMemoryDirectory;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = DirectoryConnector::new(
//!     &ConnectorConfig::default(),
//!     Arc::new(InMemoryDirectory::new("example.com")),
//!     Arc::new(StaticCredentials::new("token")),
//! )?;
//! let attrs = AttributeSet::new()
//!     .with("__NAME__", "jane@example.com")
//!     .with("__PASSWORD__", "s3cret!")
//!     .with("givenName", "Jane")
//!     .with("familyName", "Doe");
//! let uid = connector.create(ResourceType::Account, &attrs).await?;
//! assert!(!uid.value().is_empty());
//! connector.test().await?;
//! # Ok(())
//! # }
//! ```

use crate::client::{DirectoryClient, endpoints};
use crate::config::{ConnectorConfig, ValidatedConfig};
use crate::credentials::CredentialProvider;
use crate::error::ConnectorResult;
use crate::executor::{Discard, RequestExecutor, Sleeper, TokioSleeper};
use crate::filter::{FilterNode, QueryScope};
use crate::handlers::{HandlerContext, HandlerRegistry, ResultCallback, SearchOptions, SearchResult};
use crate::resource::{AttributeDelta, AttributeSet, ResourceType, Uid};
use crate::schema::ConnectorSchema;
use crate::transport::{ApiRequest, DirectoryTransport};
use log::{debug, info};
use std::sync::Arc;

/// Identity connector over the directory API.
pub struct DirectoryConnector {
    context: HandlerContext,
    handlers: HandlerRegistry,
}

impl DirectoryConnector {
    /// Validate `config` and build the connector.
    pub fn new(
        config: &ConnectorConfig,
        transport: Arc<dyn DirectoryTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ConnectorResult<Self> {
        Self::with_sleeper(config, transport, credentials, Arc::new(TokioSleeper))
    }

    /// Build the connector with a custom backoff [`Sleeper`].
    pub fn with_sleeper(
        config: &ConnectorConfig,
        transport: Arc<dyn DirectoryTransport>,
        credentials: Arc<dyn CredentialProvider>,
        sleeper: Arc<dyn Sleeper>,
    ) -> ConnectorResult<Self> {
        let validated = config.validate()?;
        let executor = RequestExecutor::with_sleeper(transport, validated.retry_policy, sleeper);
        let client = Arc::new(DirectoryClient::new(credentials, executor));
        info!(
            "Directory connector initialised for customer '{}' ({} custom schema attributes)",
            validated.customer_id,
            validated.custom_schemas.fields().len()
        );
        let context = HandlerContext::new(client, Arc::new(validated));
        let handlers = HandlerRegistry::standard(&context);
        Ok(Self { context, handlers })
    }

    pub fn config(&self) -> &ValidatedConfig {
        &self.context.config
    }

    pub async fn create(&self, resource_type: ResourceType, attrs: &AttributeSet) -> ConnectorResult<Uid> {
        info!("Creating {} with {} attributes", resource_type, attrs.len());
        self.context.client.refresh_credentials().await?;
        let uid = self.handlers.resolve(resource_type)?.create(attrs).await?;
        debug!("Created {} {}", resource_type, uid);
        Ok(uid)
    }

    pub async fn update(&self, resource_type: ResourceType, uid: &Uid, attrs: &AttributeSet) -> ConnectorResult<Uid> {
        info!("Updating {} {} ({} attributes)", resource_type, uid, attrs.len());
        self.context.client.refresh_credentials().await?;
        self.handlers.resolve(resource_type)?.update(uid, attrs).await
    }

    pub async fn update_delta(
        &self,
        resource_type: ResourceType,
        uid: &Uid,
        deltas: &[AttributeDelta],
    ) -> ConnectorResult<Uid> {
        info!("Updating {} {} with {} deltas", resource_type, uid, deltas.len());
        self.context.client.refresh_credentials().await?;
        self.handlers.resolve(resource_type)?.update_delta(uid, deltas).await
    }

    pub async fn delete(&self, resource_type: ResourceType, uid: &Uid) -> ConnectorResult<()> {
        info!("Deleting {} {}", resource_type, uid);
        self.context.client.refresh_credentials().await?;
        self.handlers.resolve(resource_type)?.delete(uid).await
    }

    /// Search, handing each result to `callback` until it returns `false`.
    pub async fn search(
        &self,
        resource_type: ResourceType,
        filter: Option<&FilterNode>,
        options: &SearchOptions,
        callback: &mut ResultCallback<'_>,
    ) -> ConnectorResult<SearchResult> {
        info!(
            "Searching {} (filter: {}, page size: {:?})",
            resource_type,
            filter.map_or("none", FilterNode::kind),
            options.page_size
        );
        self.context.client.refresh_credentials().await?;
        self.handlers
            .resolve(resource_type)?
            .search(filter, options, callback)
            .await
    }

    /// Every object class with its attributes.
    pub fn schema(&self) -> ConnectorSchema {
        let object_classes = ResourceType::ALL
            .iter()
            .filter_map(|t| self.handlers.resolve(*t).ok())
            .map(|h| h.object_class_info())
            .collect();
        ConnectorSchema { object_classes }
    }

    /// Check credentials and connectivity by listing one user.
    pub async fn test(&self) -> ConnectorResult<()> {
        info!("Testing connection");
        self.context.client.refresh_credentials().await?;
        let (tenant, value) = self.context.tenant(&QueryScope::default());
        let request = ApiRequest::get(endpoints::users())
            .with_query(tenant, value)
            .with_query("maxResults", "1");
        self.context.client.call(request, &Discard).await?;
        debug!("Connection test succeeded");
        Ok(())
    }
}
