//! Connector configuration.
//!
//! [`ConnectorConfig`] is the serialized form, deserialized from camelCase JSON
//! with defaults for everything but the tenant. [`ConnectorConfig::validate`]
//! checks it once at startup and produces the [`ValidatedConfig`] the handlers
//! work from.

use crate::error::{ConnectorError, ConnectorResult};
use crate::executor::RetryPolicy;
use crate::pagination::{DEFAULT_BATCH_SIZE, MAX_PAGE_SIZE};
use crate::schema::CustomSchemas;
use serde::{Deserialize, Serialize};

/// Customer alias meaning "the customer of the authenticated administrator".
pub const MY_CUSTOMER: &str = "my_customer";

fn default_customer_id() -> String {
    MY_CUSTOMER.to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

fn default_max_retries() -> u32 {
    RetryPolicy::default().max_retries
}

fn default_base_delay_ms() -> u64 {
    RetryPolicy::default().base_delay_ms
}

fn default_max_jitter_ms() -> u64 {
    RetryPolicy::default().max_jitter_ms
}

/// Serialized connector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    /// Customer the connector manages.
    #[serde(default = "default_customer_id")]
    pub customer_id: String,
    /// Primary domain. Account and group listings are scoped to it when set.
    #[serde(default)]
    pub domain: Option<String>,
    /// JSON array describing the custom schemas exposed as flat attributes.
    #[serde(default)]
    pub custom_schemas_json: Option<String>,
    /// Delete the configured license assignments when an account is disabled.
    #[serde(default)]
    pub remove_license_on_disable: bool,
    /// Product the configured SKUs belong to.
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub sku_ids: Vec<String>,
    /// Batch size for searches that do not page explicitly.
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            customer_id: default_customer_id(),
            domain: None,
            custom_schemas_json: None,
            remove_license_on_disable: false,
            product_id: None,
            sku_ids: Vec::new(),
            default_page_size: default_page_size(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl ConnectorConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> ConnectorResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ConnectorError::configuration(format!("invalid configuration: {}", e)))
    }

    /// Check the configuration and resolve its derived parts.
    pub fn validate(&self) -> ConnectorResult<ValidatedConfig> {
        if self.customer_id.trim().is_empty() {
            return Err(ConnectorError::configuration("customerId must not be blank"));
        }
        if self.domain.as_deref().is_some_and(|d| d.trim().is_empty()) {
            return Err(ConnectorError::configuration("domain must not be blank when set"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.default_page_size) {
            return Err(ConnectorError::configuration(format!(
                "defaultPageSize must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if self.base_delay_ms == 0 {
            return Err(ConnectorError::configuration("baseDelayMs must be greater than 0"));
        }
        let licenses = if self.remove_license_on_disable {
            let product_id = self
                .product_id
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| {
                    ConnectorError::configuration("removeLicenseOnDisable requires productId")
                })?;
            if self.sku_ids.is_empty() || self.sku_ids.iter().any(|s| s.trim().is_empty()) {
                return Err(ConnectorError::configuration(
                    "removeLicenseOnDisable requires at least one non-blank skuId",
                ));
            }
            Some(LicensePolicy {
                product_id: product_id.to_string(),
                sku_ids: self.sku_ids.clone(),
            })
        } else {
            None
        };
        let custom_schemas = match self.custom_schemas_json.as_deref() {
            Some(json) if !json.trim().is_empty() => CustomSchemas::from_json(json)?,
            _ => CustomSchemas::default(),
        };

        Ok(ValidatedConfig {
            customer_id: self.customer_id.clone(),
            domain: self.domain.clone(),
            default_page_size: self.default_page_size,
            retry_policy: RetryPolicy {
                max_retries: self.max_retries,
                base_delay_ms: self.base_delay_ms,
                max_jitter_ms: self.max_jitter_ms,
            },
            custom_schemas,
            licenses,
        })
    }
}

/// Licenses removed from disabled accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicensePolicy {
    pub product_id: String,
    pub sku_ids: Vec<String>,
}

/// Configuration after validation.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub customer_id: String,
    pub domain: Option<String>,
    pub default_page_size: u32,
    pub retry_policy: RetryPolicy,
    pub custom_schemas: CustomSchemas,
    /// Set when licenses are removed on disable.
    pub licenses: Option<LicensePolicy>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectorConfig::from_json("{}").unwrap();
        assert_eq!(config, ConnectorConfig::default());

        let validated = config.validate().unwrap();
        assert_eq!(validated.customer_id, MY_CUSTOMER);
        assert_eq!(validated.retry_policy, RetryPolicy::default());
        assert!(validated.custom_schemas.is_empty());
        assert!(validated.licenses.is_none());
    }

    #[test]
    fn test_camel_case_fields() {
        let config = ConnectorConfig::from_json(
            r#"{
                "customerId": "C0123",
                "domain": "example.com",
                "removeLicenseOnDisable": true,
                "productId": "Google-Apps",
                "skuIds": ["1010020020"],
                "maxRetries": 2,
                "customSchemasJson": "[{\"name\":\"Employment\",\"type\":\"object\",\"innerSchemas\":[{\"name\":\"costCenter\",\"type\":\"string\"}]}]"
            }"#,
        )
        .unwrap();
        let validated = config.validate().unwrap();
        assert_eq!(validated.retry_policy.max_retries, 2);
        assert_eq!(validated.domain.as_deref(), Some("example.com"));
        assert!(validated.custom_schemas.field("Employment.costCenter").is_some());
        assert_eq!(
            validated.licenses,
            Some(LicensePolicy {
                product_id: "Google-Apps".to_string(),
                sku_ids: vec!["1010020020".to_string()],
            })
        );
    }

    #[test]
    fn test_validation_errors() {
        let blank = ConnectorConfig {
            customer_id: " ".to_string(),
            ..Default::default()
        };
        assert!(matches!(blank.validate(), Err(ConnectorError::Configuration { .. })));

        let oversized = ConnectorConfig {
            default_page_size: 501,
            ..Default::default()
        };
        assert!(oversized.validate().is_err());

        let no_skus = ConnectorConfig {
            remove_license_on_disable: true,
            product_id: Some("Google-Apps".to_string()),
            ..Default::default()
        };
        assert!(no_skus.validate().is_err());

        let bad_schema = ConnectorConfig {
            custom_schemas_json: Some("not json".to_string()),
            ..Default::default()
        };
        assert!(bad_schema.validate().is_err());
    }
}
