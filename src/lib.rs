//! Identity connector for a directory REST API.
//!
//! Provisions accounts, groups, group memberships, organisational units and
//! license assignments through a uniform create/update/delete/search surface,
//! translating provider-agnostic filters and attribute sets into the directory's
//! query grammar and JSON resources.
//!
//! # Core Components
//!
//! - [`DirectoryConnector`] - Inbound operations and schema
//! - [`executor::RequestExecutor`] - Classified, retried execution of one remote call
//! - [`filter::translate`] - Filter trees to directory queries
//! - [`mapper::ResourceMapper`] - Attribute sets to and from provider JSON
//! - [`pagination::PaginatedSearchDriver`] - Single- and multi-page enumeration
//! - [`membership::MembershipReconciler`] - Minimal set reconciliation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use directory_connector::{ConnectorConfig, DirectoryConnector, ResourceType};
//! use directory_connector::credentials::StaticCredentials;
//! use directory_connector::filter::FilterNode;
//! use directory_connector::handlers::SearchOptions;
//! use directory_connector::transport::InMemoryDirectory;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = DirectoryConnector::new(
//!     &ConnectorConfig::default(),
//!     Arc::new(InMemoryDirectory::new("example.com")),
//!     Arc::new(StaticCredentials::new("token")),
//! )?;
//! let filter = FilterNode::starts_with("familyName", "Do");
//! let mut names = Vec::new();
//! connector
//!     .search(ResourceType::Account, Some(&filter), &SearchOptions::default(), &mut |object| {
//!         names.push(object.name);
//!         true
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connector;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod filter;
pub mod handlers;
pub mod mapper;
pub mod membership;
pub mod pagination;
pub mod resource;
pub mod schema;
pub mod transport;

// Re-export commonly used types for convenience
pub use config::{ConnectorConfig, ValidatedConfig};
pub use connector::DirectoryConnector;
pub use error::{ConnectorError, ConnectorResult};
pub use filter::FilterNode;
pub use handlers::{SearchOptions, SearchResult, SortKey};
pub use resource::{AttributeDelta, AttributeSet, AttributeValue, ConnectorObject, ResourceType, Uid};
pub use schema::{ConnectorSchema, CustomSchemas};
