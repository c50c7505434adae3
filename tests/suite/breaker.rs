//! One breaker gates both identifier reads and completions.

use std::sync::Arc;
use std::time::Duration;

use caselog_vision::{CircuitBreaker, DisableReason, VisionClient, VisionConfig, VisionError};
use wiremock::MockServer;

use crate::common::{forbidden, mount_reply, mount_response, rate_limited, vision_client, vision_config};

#[tokio::test]
async fn rate_limit_on_extraction_silences_completions() {
    let server = MockServer::start().await;
    mount_response(&server, rate_limited(), 1).await;
    let (client, clock) = vision_client(&server);

    let err = client.extract_identifier(b"jpeg").await.unwrap_err();
    assert_eq!(err, VisionError::RateLimited { cooldown_secs: 45 });

    assert!(client.suggest_completions("Laparoscopic").await.is_empty());
    assert_eq!(
        client.extract_identifier(b"jpeg").await,
        Err(VisionError::Cooldown { remaining_secs: 45 })
    );

    clock.advance(Duration::from_secs(44));
    assert_eq!(client.cooldown_remaining(), 1);
}

#[tokio::test]
async fn cooldown_expiry_allows_requests_again() {
    let server = MockServer::start().await;
    let (client, clock) = vision_client(&server);
    client.shared_breaker().trip_cooldown(Duration::from_secs(45));

    assert!(client.suggest_completions("Appendec").await.is_empty());

    clock.advance(Duration::from_secs(45));
    mount_reply(
        &server,
        "1. Laparoscopic Appendectomy\n2. Open Appendectomy",
        1,
    )
    .await;
    assert_eq!(
        client.suggest_completions("Appendec").await,
        ["Laparoscopic Appendectomy", "Open Appendectomy"]
    );
}

#[tokio::test]
async fn permission_failure_on_completions_disables_extraction() {
    let server = MockServer::start().await;
    mount_response(&server, forbidden(), 1).await;
    let (client, _clock) = vision_client(&server);

    assert!(client.suggest_completions("Cholecyst").await.is_empty());
    assert_eq!(
        client.shared_breaker().disabled_reason(),
        Some(DisableReason::PermissionDenied { status: 403 })
    );
    assert_eq!(
        client.extract_identifier(b"jpeg").await,
        Err(VisionError::PermissionDenied { status: 403 })
    );
}

#[tokio::test]
async fn clients_sharing_a_breaker_share_its_state() {
    let server = MockServer::start().await;
    mount_response(&server, rate_limited(), 1).await;
    let breaker = Arc::new(CircuitBreaker::new());
    let first = VisionClient::new(vision_config(&server), breaker.clone()).unwrap();
    let second = VisionClient::new(vision_config(&server), breaker).unwrap();

    assert!(matches!(
        first.extract_identifier(b"jpeg").await,
        Err(VisionError::RateLimited { .. })
    ));
    assert!(matches!(
        second.extract_identifier(b"jpeg").await,
        Err(VisionError::Cooldown { .. })
    ));
}

#[tokio::test]
async fn missing_key_never_reaches_network() {
    let server = MockServer::start().await;
    mount_response(&server, forbidden(), 0).await;
    let config = VisionConfig {
        api_key: None,
        ..vision_config(&server)
    };
    let client = VisionClient::new(config, Arc::new(CircuitBreaker::new())).unwrap();

    assert_eq!(
        client.extract_identifier(b"jpeg").await,
        Err(VisionError::MissingCredential)
    );
    assert!(client.suggest_completions("Mastectomy").await.is_empty());
    assert!(client.shared_breaker().is_disabled());
}
