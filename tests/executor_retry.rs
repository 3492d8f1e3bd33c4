//! Retry, backoff and classification as seen through the connector.

mod common;

use common::{Harness, user_json};
use directory_connector::transport::{ApiResponse, TransportError};
use directory_connector::{ConnectorConfig, ConnectorError, ResourceType, Uid};

fn backend_error() -> ApiResponse {
    ApiResponse::error(503, "backendError", "Backend Error")
}

#[tokio::test]
async fn test_five_transient_failures_then_success() {
    let harness = Harness::new();
    for _ in 0..5 {
        harness.directory.inject_response(Some("users"), backend_error()).await;
    }

    harness.connector.test().await.unwrap();

    let delays = harness.sleeper.delays();
    assert_eq!(delays.len(), 5);
    for (i, delay) in delays.iter().enumerate() {
        let base = 1000 * 2u128.pow(i as u32);
        let millis = delay.as_millis();
        assert!(millis >= base && millis < base + 1000, "delay {} was {}ms", i, millis);
    }
    assert_eq!(harness.directory.requests().await.len(), 6);
}

#[tokio::test]
async fn test_retries_exhausted_reports_transient() {
    let config = ConnectorConfig {
        max_retries: 2,
        ..ConnectorConfig::default()
    };
    let harness = Harness::with_config(config);
    for _ in 0..3 {
        harness
            .directory
            .inject_transport_error(None, TransportError::connection("connection reset"))
            .await;
    }

    let err = harness.connector.test().await.unwrap_err();

    assert!(matches!(err, ConnectorError::Transient { attempts: 3, .. }), "{:?}", err);
    assert!(err.is_retryable());
    assert_eq!(harness.sleeper.delays().len(), 2);
}

#[tokio::test]
async fn test_not_found_is_answered_by_one_call() {
    let harness = Harness::new();

    let err = harness
        .connector
        .delete(ResourceType::Account, &Uid::new("nobody@example.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectorError::UnknownResource { .. }), "{:?}", err);
    assert_eq!(harness.directory.requests().await.len(), 1);
    assert!(harness.sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_rate_limit_is_surfaced_without_retry() {
    let harness = Harness::new();
    harness
        .directory
        .inject_response(None, ApiResponse::error(403, "userRateLimitExceeded", "Quota exceeded"))
        .await;

    let err = harness.connector.test().await.unwrap_err();

    match err {
        ConnectorError::RateLimited { reason, .. } => assert_eq!(reason, "userRateLimitExceeded"),
        other => panic!("expected rate limit, got {:?}", other),
    }
    assert!(harness.sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_forbidden_without_rate_reason_is_fatal() {
    let harness = Harness::new();
    harness
        .directory
        .inject_response(None, ApiResponse::error(403, "forbidden", "Not Authorized to access this resource/api"))
        .await;

    let err = harness.connector.test().await.unwrap_err();

    assert!(matches!(err, ConnectorError::Fatal { status: 403, .. }), "{:?}", err);
    assert_eq!(harness.directory.requests().await.len(), 1);
}

#[tokio::test]
async fn test_bearer_token_is_attached() {
    let harness = Harness::new();
    harness.directory.require_token(common::TOKEN).await;
    harness
        .directory
        .seed_user(user_json("jane@example.com", "Jane", "Doe"))
        .await;

    harness.connector.test().await.unwrap();

    let requests = harness.directory.requests().await;
    assert!(requests.iter().all(|r| r.bearer_token.as_deref() == Some(common::TOKEN)));
}
