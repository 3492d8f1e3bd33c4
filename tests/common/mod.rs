//! Shared fixtures for the integration tests.
//!
//! Every test drives a [`DirectoryConnector`] against an [`InMemoryDirectory`]
//! with a [`RecordingSleeper`], so backoff is observable and never waits.

#![allow(dead_code)]

use async_trait::async_trait;
use directory_connector::credentials::StaticCredentials;
use directory_connector::executor::Sleeper;
use directory_connector::resource::names::{NAME, PASSWORD};
use directory_connector::transport::InMemoryDirectory;
use directory_connector::{
    AttributeSet, ConnectorConfig, ConnectorObject, ConnectorResult, DirectoryConnector, FilterNode,
    ResourceType, SearchOptions, SearchResult,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DOMAIN: &str = "example.com";
pub const TOKEN: &str = "test-token";

/// Records requested sleeps instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// A connector wired to a fresh in-memory directory.
pub struct Harness {
    pub connector: DirectoryConnector,
    pub directory: InMemoryDirectory,
    pub sleeper: Arc<RecordingSleeper>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ConnectorConfig::default())
    }

    pub fn with_config(config: ConnectorConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let directory = InMemoryDirectory::new(DOMAIN);
        let sleeper = Arc::new(RecordingSleeper::default());
        let connector = DirectoryConnector::with_sleeper(
            &config,
            Arc::new(directory.clone()),
            Arc::new(StaticCredentials::new(TOKEN)),
            sleeper.clone(),
        )
        .expect("valid test configuration");
        Self {
            connector,
            directory,
            sleeper,
        }
    }

    /// Run a search and collect every result.
    pub async fn search(
        &self,
        resource_type: ResourceType,
        filter: Option<&FilterNode>,
        options: &SearchOptions,
    ) -> ConnectorResult<(Vec<ConnectorObject>, SearchResult)> {
        let mut found = Vec::new();
        let result = self
            .connector
            .search(resource_type, filter, options, &mut |object| {
                found.push(object);
                true
            })
            .await?;
        Ok((found, result))
    }
}

/// Attributes for creating an account.
pub fn account(email: &str, given: &str, family: &str) -> AttributeSet {
    AttributeSet::new()
        .with(NAME, email)
        .with(PASSWORD, "s3cret!")
        .with("givenName", given)
        .with("familyName", family)
}

/// Provider representation of a user, for seeding.
pub fn user_json(email: &str, given: &str, family: &str) -> Value {
    json!({
        "primaryEmail": email,
        "name": {"givenName": given, "familyName": family}
    })
}

pub fn group_json(email: &str) -> Value {
    json!({"email": email, "name": email.split('@').next().unwrap_or(email)})
}
