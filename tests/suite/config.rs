//! Config file to working client.

use std::sync::Arc;

use caselog_config::CaselogConfig;
use caselog_vision::{CircuitBreaker, DisableReason, VisionClient};
use wiremock::MockServer;

use crate::common::mount_reply;

#[tokio::test]
async fn config_file_points_client_at_service() {
    let server = MockServer::start().await;
    mount_reply(&server, "ID# 7781-22", 1).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!(
            "[api_keys]\ngoogle = \"test-key\"\n\n[vision]\nbase_url = \"{}\"\nmax_retries = 0\n",
            server.uri()
        ),
    )
    .unwrap();

    let config = CaselogConfig::load_from(&path).unwrap();
    let client = VisionClient::new(config.vision_config(), Arc::new(CircuitBreaker::new())).unwrap();
    assert_eq!(
        client.extract_identifier(b"jpeg").await,
        Ok(Some("7781-22".to_string()))
    );
}

#[tokio::test]
async fn disabled_vision_is_honoured_by_callers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[vision]\nenabled = false\n").unwrap();

    let config = CaselogConfig::load_from(&path).unwrap();
    assert!(!config.vision_enabled());

    let breaker = Arc::new(CircuitBreaker::new());
    breaker.disable(DisableReason::Configured);
    let client = VisionClient::new(config.vision_config(), breaker).unwrap();
    assert!(client.suggest_completions("Craniotomy").await.is_empty());
    assert!(client.extract_identifier(b"jpeg").await.is_err());
}
