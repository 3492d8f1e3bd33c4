//! Shared client: transport, credentials and executor bundled together.
//!
//! One [`DirectoryClient`] is built when the connector starts and shared by every
//! handler. It attaches the bearer token and knows the directory's endpoint paths.

use crate::credentials::CredentialProvider;
use crate::error::ConnectorResult;
use crate::executor::{RequestExecutor, ResultHandler};
use crate::transport::ApiRequest;
use std::sync::Arc;

/// Endpoint paths of the remote directory.
pub mod endpoints {
    pub fn users() -> String {
        "users".to_string()
    }

    pub fn user(key: &str) -> String {
        format!("users/{}", key)
    }

    pub fn user_aliases(key: &str) -> String {
        format!("users/{}/aliases", key)
    }

    pub fn user_alias(key: &str, alias: &str) -> String {
        format!("users/{}/aliases/{}", key, alias)
    }

    pub fn user_photo(key: &str) -> String {
        format!("users/{}/photos/thumbnail", key)
    }

    pub fn make_admin(key: &str) -> String {
        format!("users/{}/makeAdmin", key)
    }

    pub fn groups() -> String {
        "groups".to_string()
    }

    pub fn group(key: &str) -> String {
        format!("groups/{}", key)
    }

    pub fn group_aliases(key: &str) -> String {
        format!("groups/{}/aliases", key)
    }

    pub fn group_alias(key: &str, alias: &str) -> String {
        format!("groups/{}/aliases/{}", key, alias)
    }

    pub fn members(group: &str) -> String {
        format!("groups/{}/members", group)
    }

    pub fn member(group: &str, member: &str) -> String {
        format!("groups/{}/members/{}", group, member)
    }

    pub fn org_units(customer: &str) -> String {
        format!("customer/{}/orgunits", customer)
    }

    /// `path` may be given with or without its leading slash.
    pub fn org_unit(customer: &str, path: &str) -> String {
        format!("customer/{}/orgunits/{}", customer, path.trim_start_matches('/'))
    }

    pub fn license_assign(product: &str, sku: &str) -> String {
        format!("product/{}/sku/{}/user", product, sku)
    }

    pub fn license(product: &str, sku: &str, user: &str) -> String {
        format!("product/{}/sku/{}/user/{}", product, sku, user)
    }

    pub fn licenses_for_sku(product: &str, sku: &str) -> String {
        format!("product/{}/sku/{}/users", product, sku)
    }

    pub fn licenses_for_product(product: &str) -> String {
        format!("product/{}/users", product)
    }
}

/// Authenticated access to the remote directory.
#[derive(Clone)]
pub struct DirectoryClient {
    credentials: Arc<dyn CredentialProvider>,
    executor: RequestExecutor,
}

impl DirectoryClient {
    pub fn new(credentials: Arc<dyn CredentialProvider>, executor: RequestExecutor) -> Self {
        Self {
            credentials,
            executor,
        }
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Give the credential provider a chance to refresh before an operation.
    pub async fn refresh_credentials(&self) -> ConnectorResult<()> {
        self.credentials.refresh_if_expired().await
    }

    /// Attach the bearer token and run the request through the executor.
    pub async fn call<R, H>(&self, request: ApiRequest, handler: &H) -> ConnectorResult<R>
    where
        H: ResultHandler<R> + ?Sized,
    {
        let mut request = request;
        request.bearer_token = Some(self.credentials.token().await?);
        self.executor.execute(&request, handler).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;
    use crate::executor::{Discard, RetryPolicy};
    use crate::transport::InMemoryDirectory;

    #[test]
    fn test_org_unit_path_without_leading_slash() {
        assert_eq!(
            endpoints::org_unit("my_customer", "/Eng/Backend"),
            "customer/my_customer/orgunits/Eng/Backend"
        );
    }

    #[tokio::test]
    async fn test_bearer_token_is_attached() {
        let directory = InMemoryDirectory::new("example.com");
        directory.require_token("secret").await;
        let executor = RequestExecutor::new(Arc::new(directory.clone()), RetryPolicy::default());

        let client = DirectoryClient::new(Arc::new(StaticCredentials::new("secret")), executor.clone());
        client
            .call(ApiRequest::get("users").with_query("customer", "my_customer"), &Discard)
            .await
            .unwrap();

        let wrong = DirectoryClient::new(Arc::new(StaticCredentials::new("other")), executor);
        let err = wrong
            .call(ApiRequest::get("users").with_query("customer", "my_customer"), &Discard)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::ConnectorError::Fatal { status: 401, .. }));
    }
}
