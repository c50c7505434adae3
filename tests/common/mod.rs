//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use caselog_capture::device::CameraFut;
use caselog_capture::{CameraDevice, CameraStream, StreamRequest, VideoFrame};
use caselog_types::ApiKey;
use caselog_vision::{CircuitBreaker, ManualClock, RetryConfig, VisionClient, VisionConfig};
use rxing::{BarcodeFormat as RxingFormat, MultiFormatWriter, Writer};
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const GENERATE_PATH: &str = "/models/gemini-3-flash-preview:generateContent";

/// Gemini `generateContent` reply carrying `text`.
pub fn gemini_reply(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{ "text": text }]
            },
            "finishReason": "STOP"
        }]
    })
}

pub fn rate_limited() -> ResponseTemplate {
    ResponseTemplate::new(429).set_body_json(json!({
        "error": {
            "code": 429,
            "message": "Resource has been exhausted (e.g. check quota).",
            "status": "RESOURCE_EXHAUSTED"
        }
    }))
}

pub fn forbidden() -> ResponseTemplate {
    ResponseTemplate::new(403).set_body_json(json!({
        "error": {
            "code": 403,
            "message": "Method doesn't allow unregistered callers.",
            "status": "PERMISSION_DENIED"
        }
    }))
}

/// Mount a text reply for every generate call, asserting the call count.
pub async fn mount_reply(server: &MockServer, text: &str, calls: u64) {
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply(text)))
        .expect(calls)
        .mount(server)
        .await;
}

pub async fn mount_response(server: &MockServer, response: ResponseTemplate, calls: u64) {
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(response)
        .expect(calls)
        .mount(server)
        .await;
}

pub fn vision_config(server: &MockServer) -> VisionConfig {
    VisionConfig {
        api_key: ApiKey::new("test-key"),
        base_url: server.uri(),
        extract_retry: RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        ..VisionConfig::default()
    }
}

/// Client against `server` whose breaker runs on a manual clock.
pub fn vision_client(server: &MockServer) -> (Arc<VisionClient>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let breaker = Arc::new(CircuitBreaker::with_clock(clock.clone()));
    let client = VisionClient::new(vision_config(server), breaker).unwrap();
    (Arc::new(client), clock)
}

/// Black-on-white QR symbol carrying `contents`.
pub fn qr_frame(contents: &str) -> VideoFrame {
    let matrix = MultiFormatWriter::default()
        .encode(contents, &RxingFormat::QR_CODE, 240, 240)
        .unwrap();
    let (width, height) = (matrix.width(), matrix.height());
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            let value = if matrix.get(x, y) { 0 } else { 255 };
            rgb.extend_from_slice(&[value, value, value]);
        }
    }
    VideoFrame::from_rgb(width, height, rgb).unwrap()
}

pub fn grey_frame() -> VideoFrame {
    VideoFrame::from_rgb(16, 16, vec![200; 16 * 16 * 3]).unwrap()
}

/// Camera serving a fixed frame and counting live streams.
#[derive(Default)]
pub struct TestCamera {
    live: Arc<AtomicUsize>,
    frame: Option<VideoFrame>,
}

impl TestCamera {
    /// Serve `frame` instead of plain grey.
    pub fn showing(frame: VideoFrame) -> Self {
        Self {
            frame: Some(frame),
            ..Self::default()
        }
    }

    pub fn live_streams(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl CameraDevice for TestCamera {
    fn open<'a>(&'a self, _request: &'a StreamRequest) -> CameraFut<'a> {
        Box::pin(async move {
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(TestStream {
                live: Arc::clone(&self.live),
                frame: self.frame.clone().unwrap_or_else(grey_frame),
                stopped: false,
            }) as Box<dyn CameraStream>)
        })
    }
}

struct TestStream {
    live: Arc<AtomicUsize>,
    frame: VideoFrame,
    stopped: bool,
}

impl CameraStream for TestStream {
    fn current_frame(&mut self) -> Option<VideoFrame> {
        Some(self.frame.clone())
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for TestStream {
    fn drop(&mut self) {
        self.stop();
    }
}
