//! Paged and unpaged enumeration of listings.

mod common;

use common::{Harness, group_json, user_json};
use directory_connector::transport::Method;
use directory_connector::{ConnectorConfig, ConnectorError, FilterNode, ResourceType, SearchOptions};

async fn seed_users(harness: &Harness, count: usize) {
    for i in 0..count {
        harness
            .directory
            .seed_user(user_json(&format!("user{}@example.com", i), "User", &format!("N{}", i)))
            .await;
    }
}

#[tokio::test]
async fn test_explicit_pages_hand_back_cursors() {
    let harness = Harness::new();
    seed_users(&harness, 5).await;

    let mut cookies = Vec::new();
    let mut names = Vec::new();
    let mut cookie: Option<String> = None;
    for _ in 0..3 {
        let options = SearchOptions {
            page_size: Some(2),
            paged_results_cookie: cookie.clone(),
            ..SearchOptions::default()
        };
        let (found, result) = harness.search(ResourceType::Account, None, &options).await.unwrap();
        names.extend(found.into_iter().map(|o| o.name));
        cookies.push(result.paged_results_cookie.clone());
        cookie = result.paged_results_cookie;
    }

    assert!(cookies[0].as_deref().is_some_and(|c| !c.trim().is_empty()));
    assert!(cookies[1].as_deref().is_some_and(|c| !c.trim().is_empty()));
    assert_eq!(cookies[2], None);
    assert_eq!(names.len(), 5);

    let fetches = harness
        .directory
        .requests()
        .await
        .into_iter()
        .filter(|r| r.method == Method::Get && r.path == "users")
        .count();
    assert_eq!(fetches, 3);
}

#[tokio::test]
async fn test_unpaged_search_walks_every_page() {
    let config = ConnectorConfig {
        default_page_size: 2,
        ..ConnectorConfig::default()
    };
    let harness = Harness::with_config(config);
    seed_users(&harness, 5).await;

    let (found, result) = harness
        .search(ResourceType::Account, None, &SearchOptions::default())
        .await
        .unwrap();

    assert_eq!(found.len(), 5);
    assert_eq!(result.paged_results_cookie, None);
    let requests = harness.directory.requests().await;
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.query_param("maxResults") == Some("2")));
}

#[tokio::test]
async fn test_callback_stop_ends_enumeration() {
    let config = ConnectorConfig {
        default_page_size: 2,
        ..ConnectorConfig::default()
    };
    let harness = Harness::with_config(config);
    seed_users(&harness, 5).await;

    let mut seen = 0;
    harness
        .connector
        .search(ResourceType::Account, None, &SearchOptions::default(), &mut |_| {
            seen += 1;
            seen < 3
        })
        .await
        .unwrap();

    assert_eq!(seen, 3);
    assert_eq!(harness.directory.requests().await.len(), 2);
}

#[tokio::test]
async fn test_page_size_out_of_range_fails_before_any_call() {
    let harness = Harness::new();
    let options = SearchOptions {
        page_size: Some(501),
        ..SearchOptions::default()
    };

    let err = harness.search(ResourceType::Group, None, &options).await.unwrap_err();

    assert!(matches!(err, ConnectorError::InvalidAttribute { .. }), "{:?}", err);
    assert!(harness.directory.requests().await.is_empty());
}

#[tokio::test]
async fn test_blank_cookie_starts_from_the_first_page() {
    let harness = Harness::new();
    for name in ["a", "b", "c"] {
        harness.directory.seed_group(group_json(&format!("{}@example.com", name))).await;
    }
    let options = SearchOptions {
        page_size: Some(2),
        paged_results_cookie: Some("  ".to_string()),
        ..SearchOptions::default()
    };

    let (found, result) = harness.search(ResourceType::Group, None, &options).await.unwrap();

    assert_eq!(found.len(), 2);
    assert!(result.paged_results_cookie.is_some());
    let requests = harness.directory.requests().await;
    assert_eq!(requests[0].query_param("pageToken"), None);
}

#[tokio::test]
async fn test_paged_group_members() {
    let harness = Harness::new();
    harness.directory.seed_group(group_json("staff@example.com")).await;
    for i in 0..3 {
        let email = format!("user{}@example.com", i);
        harness.directory.seed_user(user_json(&email, "User", "Member")).await;
        let attrs = directory_connector::AttributeSet::new()
            .with("group", "staff@example.com")
            .with("member", email.as_str());
        harness.connector.create(ResourceType::Membership, &attrs).await.unwrap();
    }
    let filter = FilterNode::equals("group", "staff@example.com");
    let options = SearchOptions {
        page_size: Some(2),
        ..SearchOptions::default()
    };

    let (first, result) = harness
        .search(ResourceType::Membership, Some(&filter), &options)
        .await
        .unwrap();
    assert_eq!(first.len(), 2);

    let next = SearchOptions {
        paged_results_cookie: result.paged_results_cookie,
        ..options
    };
    let (second, result) = harness
        .search(ResourceType::Membership, Some(&filter), &next)
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(result.paged_results_cookie, None);
    assert_eq!(second[0].uid.value(), "staff@example.com/user2@example.com");
}
