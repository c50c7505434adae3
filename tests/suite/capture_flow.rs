//! Capture sessions against a mocked vision service.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use caselog_capture::{
    CaptureError, CaptureSession, DecodingBackendSelector, NoFeedback, ScanStatus, ScannerConfig,
    SessionEvent, SessionHandle, SoftwareProbe,
};
use caselog_types::{CaptureState, IdentifierSource};
use caselog_vision::VisionClient;
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::MockServer;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{
    TestCamera, forbidden, gemini_reply, mount_reply, mount_response, qr_frame, rate_limited,
    vision_client,
};

fn manual_session(
    camera: Arc<TestCamera>,
    client: Arc<VisionClient>,
) -> (SessionHandle, UnboundedReceiver<SessionEvent>) {
    CaptureSession::new(
        camera,
        DecodingBackendSelector::new(),
        client,
        Arc::new(NoFeedback),
        ScannerConfig::default(),
    )
    .start(|_| {})
}

async fn wait_for_scanning(events: &mut UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        if event == SessionEvent::State(CaptureState::Scanning) {
            return;
        }
    }
    panic!("session ended before scanning");
}

/// Next status that is not plain progress.
async fn next_problem(events: &mut UnboundedReceiver<SessionEvent>) -> ScanStatus {
    while let Some(event) = events.recv().await {
        if let SessionEvent::Status(status) = event
            && status.is_error()
        {
            return status;
        }
    }
    panic!("session ended without a status");
}

#[tokio::test]
async fn manual_capture_reads_identifier_from_remote() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("image/jpeg"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("MRN: 00123456\n")))
        .expect(1)
        .mount(&server)
        .await;
    let (client, _clock) = vision_client(&server);
    let camera = Arc::new(TestCamera::default());

    let acquired = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&acquired);
    let (handle, mut events) = CaptureSession::new(
        camera.clone(),
        DecodingBackendSelector::new(),
        client,
        Arc::new(NoFeedback),
        ScannerConfig::default(),
    )
    .start(move |id| sink.lock().unwrap().push(id));

    wait_for_scanning(&mut events).await;
    handle.capture();
    let id = handle.wait().await.unwrap();

    assert_eq!(id.raw_value(), "00123456");
    assert_eq!(id.source(), IdentifierSource::RemoteVision);
    assert_eq!(acquired.lock().unwrap().len(), 1);
    assert_eq!(camera.live_streams(), 0);
}

#[tokio::test]
async fn sentinel_reply_keeps_scanning() {
    let server = MockServer::start().await;
    mount_reply(&server, "null", 1).await;
    let (client, _clock) = vision_client(&server);
    let camera = Arc::new(TestCamera::default());

    let (handle, mut events) = manual_session(camera.clone(), client);
    wait_for_scanning(&mut events).await;
    handle.capture();

    assert_eq!(next_problem(&mut events).await, ScanStatus::NoIdFound);
    assert_eq!(handle.state(), CaptureState::Scanning);
    assert_eq!(camera.live_streams(), 1);

    handle.cancel();
    assert_eq!(camera.live_streams(), 0);
}

#[tokio::test]
async fn rate_limit_cools_down_without_further_requests() {
    let server = MockServer::start().await;
    mount_response(&server, rate_limited(), 1).await;
    let (client, clock) = vision_client(&server);

    let (handle, mut events) = manual_session(Arc::new(TestCamera::default()), client.clone());
    wait_for_scanning(&mut events).await;

    handle.capture();
    assert_eq!(
        next_problem(&mut events).await,
        ScanStatus::CoolingDown { secs: 45 }
    );
    assert_eq!(client.cooldown_remaining(), 45);

    clock.advance(Duration::from_secs(5));
    handle.capture();
    assert_eq!(
        next_problem(&mut events).await,
        ScanStatus::CoolingDown { secs: 40 }
    );
    assert_eq!(handle.state(), CaptureState::Scanning);
    // Mock expectation (1 call) is verified when the server drops.
}

#[tokio::test]
async fn permission_failure_disables_remote_reading() {
    let server = MockServer::start().await;
    mount_response(&server, forbidden(), 1).await;
    let (client, _clock) = vision_client(&server);

    let (handle, mut events) = manual_session(Arc::new(TestCamera::default()), client.clone());
    wait_for_scanning(&mut events).await;

    handle.capture();
    assert_eq!(next_problem(&mut events).await, ScanStatus::AiUnavailable);
    handle.capture();
    assert_eq!(next_problem(&mut events).await, ScanStatus::AiUnavailable);
    assert!(client.shared_breaker().is_disabled());
}

#[tokio::test]
async fn disabled_remote_without_decoder_fails_at_start() {
    let server = MockServer::start().await;
    mount_response(&server, forbidden(), 0).await;
    let (client, _clock) = vision_client(&server);
    client
        .shared_breaker()
        .disable(caselog_vision::DisableReason::Configured);
    let camera = Arc::new(TestCamera::default());

    let (handle, _events) = manual_session(camera.clone(), client);
    assert_eq!(
        handle.wait().await,
        Err(CaptureError::NoDecodingBackendAvailable)
    );
    assert_eq!(camera.live_streams(), 0);
}

#[tokio::test]
async fn software_decoder_reads_barcode_without_remote() {
    let server = MockServer::start().await;
    mount_response(&server, rate_limited(), 0).await;
    let (client, _clock) = vision_client(&server);
    let camera = Arc::new(TestCamera::showing(qr_frame("PID-004417")));

    let (handle, mut events) = CaptureSession::new(
        camera.clone(),
        DecodingBackendSelector::new().with_software(Arc::new(SoftwareProbe::new())),
        client,
        Arc::new(NoFeedback),
        ScannerConfig::default(),
    )
    .start(|_| {});

    let mut statuses = Vec::new();
    let id = loop {
        match events.recv().await.expect("session ended early") {
            SessionEvent::Status(status) => statuses.push(status),
            SessionEvent::Acquired(id) => break id,
            _ => {}
        }
    };
    assert_eq!(id.raw_value(), "PID-004417");
    assert_eq!(id.source(), IdentifierSource::SoftwareDecoder);
    assert!(statuses.contains(&ScanStatus::ScanningForBarcodes));
    assert_eq!(statuses.last(), Some(&ScanStatus::BarcodeDetected));
    assert!(handle.wait().await.is_ok());
    assert_eq!(camera.live_streams(), 0);
}
