//! Full lifecycles through the connector against the in-memory directory.

mod common;

use common::{Harness, account, group_json, user_json};
use directory_connector::resource::names::{ENABLE, GROUPS, MEMBERS};
use directory_connector::transport::{ApiResponse, Method};
use directory_connector::{
    AttributeDelta, AttributeSet, ConnectorConfig, ConnectorError, FilterNode, ResourceType, SearchOptions, Uid,
};
use futures::future::join_all;
use tokio_test::assert_ok;

const PRODUCT: &str = "Google-Apps";
const SKU: &str = "1010020020";
const OTHER_SKU: &str = "1010020028";

async fn seed_groups(harness: &Harness, emails: &[&str]) {
    for email in emails {
        harness.directory.seed_group(group_json(email)).await;
    }
}

fn groups(values: &[&str]) -> AttributeSet {
    AttributeSet::new().with_values(GROUPS, values.iter().copied())
}

#[tokio::test]
async fn test_account_groups_are_reconciled() {
    let harness = Harness::new();
    seed_groups(&harness, &["g1@example.com", "g2@example.com", "g3@example.com"]).await;
    let attrs = account("jane@example.com", "Jane", "Doe").with_values(GROUPS, ["g1@example.com", "g2@example.com"]);
    let uid = harness.connector.create(ResourceType::Account, &attrs).await.unwrap();
    assert_eq!(
        harness.directory.groups_of("jane@example.com").await,
        vec!["g1@example.com", "g2@example.com"]
    );
    harness.directory.clear_requests().await;

    harness
        .connector
        .update(ResourceType::Account, &uid, &groups(&["g2@example.com", "g3@example.com"]))
        .await
        .unwrap();

    assert_eq!(
        harness.directory.groups_of("jane@example.com").await,
        vec!["g2@example.com", "g3@example.com"]
    );
    let edits: Vec<(Method, String)> = harness
        .directory
        .requests()
        .await
        .into_iter()
        .filter(|r| matches!(r.method, Method::Post | Method::Delete))
        .map(|r| (r.method, r.path))
        .collect();
    assert_eq!(
        edits,
        vec![
            (Method::Post, "groups/g3@example.com/members".to_string()),
            (Method::Delete, "groups/g1@example.com/members/jane@example.com".to_string()),
        ]
    );

    let options = SearchOptions {
        attributes_to_get: Some(vec![GROUPS.to_string()]),
        ..SearchOptions::default()
    };
    let filter = FilterNode::equals("__UID__", uid.value());
    let (found, _) = harness.search(ResourceType::Account, Some(&filter), &options).await.unwrap();
    let mut listed = found[0].attributes.get(GROUPS).unwrap().strings().unwrap();
    listed.sort();
    assert_eq!(listed, vec!["g2@example.com", "g3@example.com"]);
}

#[tokio::test]
async fn test_account_groups_given_by_id_are_kept() {
    let harness = Harness::new();
    let mut ids = Vec::new();
    for email in ["g1@example.com", "g2@example.com", "g3@example.com"] {
        let stored = harness.directory.seed_group(group_json(email)).await;
        ids.push(stored["id"].as_str().unwrap().to_string());
    }
    let attrs = account("jane@example.com", "Jane", "Doe").with_values(GROUPS, [ids[0].as_str(), ids[1].as_str()]);
    let uid = harness.connector.create(ResourceType::Account, &attrs).await.unwrap();
    assert_eq!(
        harness.directory.groups_of("jane@example.com").await,
        vec!["g1@example.com", "g2@example.com"]
    );
    harness.directory.clear_requests().await;

    harness
        .connector
        .update(ResourceType::Account, &uid, &groups(&[ids[1].as_str(), ids[2].as_str()]))
        .await
        .unwrap();

    assert_eq!(
        harness.directory.groups_of("jane@example.com").await,
        vec!["g2@example.com", "g3@example.com"]
    );
    let deletes: Vec<String> = harness
        .directory
        .requests()
        .await
        .into_iter()
        .filter(|r| r.method == Method::Delete)
        .map(|r| r.path)
        .collect();
    assert_eq!(deletes, vec!["groups/g1@example.com/members/jane@example.com".to_string()]);
}

#[tokio::test]
async fn test_group_members_given_by_id_are_kept() {
    let harness = Harness::new();
    let mut ids = Vec::new();
    for email in ["jane@example.com", "bob@example.com", "ann@example.com"] {
        let stored = harness.directory.seed_user(user_json(email, "Some", "One")).await;
        ids.push(stored["id"].as_str().unwrap().to_string());
    }
    let attrs = AttributeSet::new()
        .with("__NAME__", "staff@example.com")
        .with_values(MEMBERS, ["jane@example.com", "bob@example.com"]);
    let uid = harness.connector.create(ResourceType::Group, &attrs).await.unwrap();

    let update = AttributeSet::new().with_values(MEMBERS, [ids[1].as_str(), ids[2].as_str()]);
    harness.connector.update(ResourceType::Group, &uid, &update).await.unwrap();

    assert_eq!(
        harness.directory.member_emails("staff@example.com").await,
        vec!["ann@example.com", "bob@example.com"]
    );
}

#[tokio::test]
async fn test_group_deltas() {
    let harness = Harness::new();
    seed_groups(&harness, &["g1@example.com", "g2@example.com", "g3@example.com"]).await;
    let attrs = account("jane@example.com", "Jane", "Doe").with_values(GROUPS, ["g1@example.com"]);
    let uid = harness.connector.create(ResourceType::Account, &attrs).await.unwrap();

    let deltas = [
        AttributeDelta::add(GROUPS, ["g2@example.com", "g3@example.com"]),
        AttributeDelta::remove(GROUPS, ["g1@example.com"]),
        AttributeDelta::replace("givenName", ["Janet"]),
    ];
    harness.connector.update_delta(ResourceType::Account, &uid, &deltas).await.unwrap();

    assert_eq!(
        harness.directory.groups_of("jane@example.com").await,
        vec!["g2@example.com", "g3@example.com"]
    );
    let user = harness.directory.user(uid.value()).await.unwrap();
    assert_eq!(user["name"]["givenName"], "Janet");

    harness
        .connector
        .update_delta(ResourceType::Account, &uid, &[AttributeDelta::replace(GROUPS, ["g1@example.com"])])
        .await
        .unwrap();
    assert_eq!(harness.directory.groups_of("jane@example.com").await, vec!["g1@example.com"]);
}

#[tokio::test]
async fn test_failed_follow_up_is_partially_applied() {
    let harness = Harness::new();
    seed_groups(&harness, &["g1@example.com"]).await;
    let attrs = account("jane@example.com", "Jane", "Doe")
        .with_values(GROUPS, ["g1@example.com", "missing@example.com"]);

    let err = harness.connector.create(ResourceType::Account, &attrs).await.unwrap_err();

    let (uid, source) = match err {
        ConnectorError::PartiallyApplied { uid, source } => (uid, source),
        other => panic!("expected partial application, got {:?}", other),
    };
    assert!(source.is_not_found(), "{:?}", source);
    let user = harness.directory.user("jane@example.com").await.unwrap();
    assert_eq!(user["id"], uid.value());
    assert_eq!(harness.directory.groups_of("jane@example.com").await, vec!["g1@example.com"]);
}

#[tokio::test]
async fn test_group_members_and_aliases() {
    let harness = Harness::new();
    for email in ["jane@example.com", "bob@example.com"] {
        harness.directory.seed_user(user_json(email, "Some", "One")).await;
    }
    let attrs = AttributeSet::new()
        .with("__NAME__", "staff@example.com")
        .with("name", "Staff")
        .with_values(MEMBERS, ["jane@example.com"])
        .with_values("aliases", ["team@example.com"]);
    let uid = harness.connector.create(ResourceType::Group, &attrs).await.unwrap();

    let update = AttributeSet::new()
        .with("description", "Everyone")
        .with_values(MEMBERS, ["bob@example.com"]);
    harness.connector.update(ResourceType::Group, &uid, &update).await.unwrap();

    assert_eq!(harness.directory.member_emails("staff@example.com").await, vec!["bob@example.com"]);
    let group = harness.directory.group("team@example.com").await.unwrap();
    assert_eq!(group["description"], "Everyone");

    let options = SearchOptions {
        attributes_to_get: Some(vec![MEMBERS.to_string(), "aliases".to_string()]),
        ..SearchOptions::default()
    };
    let filter = FilterNode::equals("__NAME__", "staff@example.com");
    let (found, _) = harness.search(ResourceType::Group, Some(&filter), &options).await.unwrap();
    assert_eq!(found[0].attributes.get(MEMBERS).unwrap().strings().unwrap(), vec!["bob@example.com"]);
    assert_eq!(found[0].attributes.get("aliases").unwrap().strings().unwrap(), vec!["team@example.com"]);

    assert_ok!(harness.connector.delete(ResourceType::Group, &uid).await);
    assert!(harness.directory.group("staff@example.com").await.is_none());
}

#[tokio::test]
async fn test_membership_lifecycle() {
    let harness = Harness::new();
    harness.directory.seed_user(user_json("jane@example.com", "Jane", "Doe")).await;
    seed_groups(&harness, &["staff@example.com"]).await;
    let edge = AttributeSet::new()
        .with("group", "staff@example.com")
        .with("member", "jane@example.com");

    let uid = harness.connector.create(ResourceType::Membership, &edge).await.unwrap();
    assert_eq!(uid.value(), "staff@example.com/jane@example.com");

    let err = harness.connector.create(ResourceType::Membership, &edge).await.unwrap_err();
    assert!(err.is_already_exists(), "{:?}", err);

    harness
        .connector
        .update_delta(ResourceType::Membership, &uid, &[AttributeDelta::replace("role", ["owner"])])
        .await
        .unwrap();
    let filter = FilterNode::equals("role", "OWNER");
    let (owners, _) = harness
        .search(ResourceType::Membership, Some(&filter), &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(owners.len(), 1);

    let err = harness
        .connector
        .update_delta(ResourceType::Membership, &uid, &[AttributeDelta::add("role", ["MANAGER"])])
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::UnsupportedOperation(_)), "{:?}", err);

    let immutable = AttributeSet::new().with("member", "bob@example.com");
    let err = harness.connector.update(ResourceType::Membership, &uid, &immutable).await.unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidAttribute { .. }), "{:?}", err);

    harness.connector.delete(ResourceType::Membership, &uid).await.unwrap();
    assert!(harness.directory.member_emails("staff@example.com").await.is_empty());
    let err = harness.connector.delete(ResourceType::Membership, &uid).await.unwrap_err();
    assert!(matches!(err, ConnectorError::UnknownResource { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_org_unit_lifecycle() {
    let harness = Harness::new();
    let eng = AttributeSet::new().with("__NAME__", "Eng").with("parentOrgUnitPath", "/");
    let uid = harness.connector.create(ResourceType::OrgUnit, &eng).await.unwrap();
    assert_eq!(uid.value(), "/Eng");

    let renamed = harness
        .connector
        .update(ResourceType::OrgUnit, &uid, &AttributeSet::new().with("__NAME__", "Engineering"))
        .await
        .unwrap();
    assert_eq!(renamed.value(), "/Engineering");

    let unchanged = harness
        .connector
        .update(ResourceType::OrgUnit, &renamed, &AttributeSet::new())
        .await
        .unwrap();
    assert_eq!(unchanged.value(), "/Engineering");

    harness.connector.delete(ResourceType::OrgUnit, &renamed).await.unwrap();
    let err = harness.connector.delete(ResourceType::OrgUnit, &renamed).await.unwrap_err();
    assert!(matches!(err, ConnectorError::UnknownResource { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_license_reassignment() {
    let harness = Harness::new();
    let attrs = AttributeSet::new()
        .with("productId", PRODUCT)
        .with("skuId", SKU)
        .with("userId", "jane@example.com");
    let uid = harness.connector.create(ResourceType::LicenseAssignment, &attrs).await.unwrap();

    let moved = harness
        .connector
        .update(ResourceType::LicenseAssignment, &uid, &AttributeSet::new().with("skuId", OTHER_SKU))
        .await
        .unwrap();

    assert_eq!(moved.value(), format!("{}/{}/jane@example.com", PRODUCT, OTHER_SKU));
    let licenses = harness.directory.licenses().await;
    assert_eq!(licenses.len(), 1);
    assert_eq!(licenses[0]["skuId"], OTHER_SKU);

    harness.connector.delete(ResourceType::LicenseAssignment, &moved).await.unwrap();
    assert!(harness.directory.licenses().await.is_empty());
}

fn license_policy() -> ConnectorConfig {
    ConnectorConfig {
        remove_license_on_disable: true,
        product_id: Some(PRODUCT.to_string()),
        sku_ids: vec![SKU.to_string(), OTHER_SKU.to_string()],
        ..ConnectorConfig::default()
    }
}

#[tokio::test]
async fn test_disabling_removes_configured_licenses() {
    let harness = Harness::with_config(license_policy());
    let uid = harness
        .connector
        .create(ResourceType::Account, &account("jane@example.com", "Jane", "Doe"))
        .await
        .unwrap();
    let license = AttributeSet::new()
        .with("productId", PRODUCT)
        .with("skuId", SKU)
        .with("userId", "jane@example.com");
    harness.connector.create(ResourceType::LicenseAssignment, &license).await.unwrap();

    harness
        .connector
        .update(ResourceType::Account, &uid, &AttributeSet::new().with(ENABLE, false))
        .await
        .unwrap();

    assert!(harness.directory.licenses().await.is_empty());
    let user = harness.directory.user(uid.value()).await.unwrap();
    assert_eq!(user["suspended"], true);
}

#[tokio::test]
async fn test_license_removal_failure_does_not_fail_the_update() {
    let harness = Harness::with_config(license_policy());
    let uid = harness
        .connector
        .create(ResourceType::Account, &account("jane@example.com", "Jane", "Doe"))
        .await
        .unwrap();
    harness
        .directory
        .inject_response(Some("product"), ApiResponse::error(400, "invalid", "Invalid Input"))
        .await;

    let result = harness
        .connector
        .update(ResourceType::Account, &uid, &AttributeSet::new().with(ENABLE, false))
        .await;

    assert_ok!(result);
}

#[tokio::test]
async fn test_deleting_unknown_resources() {
    let harness = Harness::new();
    let cases = [
        (ResourceType::Account, "missing@example.com"),
        (ResourceType::Group, "missing@example.com"),
        (ResourceType::Membership, "missing@example.com/jane@example.com"),
        (ResourceType::OrgUnit, "/Missing"),
        (ResourceType::LicenseAssignment, "Google-Apps/1010020020/jane@example.com"),
    ];
    for (resource_type, uid) in cases {
        let err = harness
            .connector
            .delete(resource_type, &Uid::new(uid))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ConnectorError::UnknownResource { .. }),
            "{}: {:?}",
            resource_type,
            err
        );
    }
}

#[tokio::test]
async fn test_concurrent_operations_share_one_connector() {
    let harness = Harness::new();
    let emails: Vec<String> = (0..8).map(|i| format!("user{}@example.com", i)).collect();

    let attrs: Vec<AttributeSet> = emails.iter().map(|e| account(e, "User", "Concurrent")).collect();

    let results = join_all(
        attrs
            .iter()
            .map(|a| harness.connector.create(ResourceType::Account, a)),
    )
    .await;

    assert!(results.iter().all(Result::is_ok));
    let (found, _) = harness
        .search(ResourceType::Account, None, &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(found.len(), emails.len());
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let config = ConnectorConfig {
        remove_license_on_disable: true,
        ..ConnectorConfig::default()
    };
    let result = directory_connector::DirectoryConnector::new(
        &config,
        std::sync::Arc::new(directory_connector::transport::InMemoryDirectory::new(common::DOMAIN)),
        std::sync::Arc::new(directory_connector::credentials::StaticCredentials::new(common::TOKEN)),
    );
    assert!(matches!(result, Err(ConnectorError::Configuration { .. })));
}
