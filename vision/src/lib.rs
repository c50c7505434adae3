//! Resilient client for the remote vision service.
//!
//! # Architecture
//!
//! - [`VisionClient`] - Identifier extraction from still frames and procedure-name completions
//! - [`CircuitBreaker`] - Process-wide guard shared by every remote call
//! - [`retry`] - Exponential backoff gated by the breaker
//! - [`gemini`] - Gemini `generateContent` wire format
//! - [`parse`] - Reply normalisation
//!
//! Consumers depend on the [`RemoteVision`] trait so capture and suggestion
//! logic can run against fakes.
//!
//! # Failure Policy
//!
//! | Condition | Effect |
//! |-----------|--------|
//! | No API key | Breaker disabled permanently, `MissingCredential` |
//! | 401/403, invalid key | Breaker disabled permanently, `PermissionDenied` |
//! | 429 / `RESOURCE_EXHAUSTED` | Shared 45s cooldown, `RateLimited` |
//! | Breaker open | Fail fast with `Cooldown`/`Disabled`, no network I/O |
//! | 408, 409, 5xx, connection | Retried (extraction only) with 2s/4s backoff |
//!
//! Completions never surface an error: every failure degrades to an empty list.

pub mod breaker;
mod error;
pub mod gemini;
pub mod parse;
pub mod retry;

pub use breaker::{BreakerSnapshot, CircuitBreaker, Clock, ManualClock, SystemClock};
pub use caselog_types;
pub use error::{DisableReason, VisionError};
pub use retry::RetryConfig;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use caselog_types::ApiKey;

use crate::retry::run_with_retry;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_COOLDOWN_SECS: u64 = 45;
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Shortest query the completion endpoint is consulted for.
pub const MIN_COMPLETION_QUERY_CHARS: usize = 3;

pub type VisionFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Remote capabilities consumed by capture sessions and the suggestion aggregator.
pub trait RemoteVision: Send + Sync {
    /// Read an identifier off a JPEG still frame. `Ok(None)` means nothing readable.
    fn extract_identifier<'a>(
        &'a self,
        jpeg: &'a [u8],
    ) -> VisionFut<'a, Result<Option<String>, VisionError>>;

    /// Best-effort completions; empty on any failure.
    fn suggest_completions<'a>(&'a self, query: &'a str) -> VisionFut<'a, Vec<String>>;

    /// The breaker every call is gated on.
    fn breaker(&self) -> &CircuitBreaker;

    fn cooldown_remaining(&self) -> u64 {
        self.breaker().cooldown_remaining()
    }
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: Option<ApiKey>,
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
    pub cooldown: Duration,
    /// Retry policy for identifier extraction. Completions never retry.
    pub extract_retry: RetryConfig,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: gemini::GEMINI_API_BASE_URL.to_string(),
            model: gemini::DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
            extract_retry: RetryConfig::default(),
        }
    }
}

fn base_client_builder(base_url: &str) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        // Plain HTTP is only ever a local mock or proxy.
        .https_only(base_url.starts_with("https://"))
}

pub fn http_client_with_timeout(
    base_url: &str,
    timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    base_client_builder(base_url).timeout(timeout).build()
}

pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    let Ok(body) = response.bytes().await else {
        return String::new();
    };
    if body.len() > MAX_ERROR_BODY_BYTES {
        let text = String::from_utf8_lossy(&body[..MAX_ERROR_BODY_BYTES]);
        return format!("{text}...(truncated)");
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Client for identifier extraction and completions.
#[derive(Debug, Clone)]
pub struct VisionClient {
    http: reqwest::Client,
    config: VisionConfig,
    breaker: Arc<CircuitBreaker>,
}

impl VisionClient {
    pub fn new(config: VisionConfig, breaker: Arc<CircuitBreaker>) -> Result<Self, reqwest::Error> {
        let http = http_client_with_timeout(&config.base_url, config.request_timeout)?;
        Ok(Self {
            http,
            config,
            breaker,
        })
    }

    #[must_use]
    pub fn shared_breaker(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.breaker)
    }

    fn url(&self) -> String {
        gemini::generate_url(&self.config.base_url, &self.config.model)
    }

    /// Credential gate. A missing key disables the breaker on first use.
    fn api_key(&self) -> Result<&str, VisionError> {
        match &self.config.api_key {
            Some(key) => Ok(key.expose()),
            None => {
                self.breaker.disable(DisableReason::MissingCredential);
                Err(VisionError::MissingCredential)
            }
        }
    }

    /// Read a patient/specimen identifier off a JPEG still frame.
    pub async fn extract_identifier(&self, jpeg: &[u8]) -> Result<Option<String>, VisionError> {
        self.breaker.check()?;
        let api_key = self.api_key()?;
        let url = self.url();
        let body = gemini::build_image_request(jpeg);

        let reply = run_with_retry(
            &self.config.extract_retry,
            &self.breaker,
            self.config.cooldown,
            |_| gemini::generate(&self.http, &url, api_key, &body),
        )
        .await?;

        let identifier = reply.as_deref().and_then(parse::parse_identifier);
        tracing::debug!(found = identifier.is_some(), "Identifier extraction finished");
        Ok(identifier)
    }

    /// Up to five completions for `query`. Never fails; degrades to empty.
    pub async fn suggest_completions(&self, query: &str) -> Vec<String> {
        let query = query.trim();
        if query.chars().count() < MIN_COMPLETION_QUERY_CHARS {
            return Vec::new();
        }
        if self.breaker.check().is_err() {
            return Vec::new();
        }
        let Ok(api_key) = self.api_key() else {
            return Vec::new();
        };
        let url = self.url();
        let body = gemini::build_completion_request(query);

        let result = run_with_retry(
            &RetryConfig::none(),
            &self.breaker,
            self.config.cooldown,
            |_| gemini::generate(&self.http, &url, api_key, &body),
        )
        .await;

        match result {
            Ok(reply) => reply.as_deref().map(parse::parse_completions).unwrap_or_default(),
            Err(error) => {
                tracing::debug!(%error, "Completion request failed; returning no suggestions");
                Vec::new()
            }
        }
    }

    #[must_use]
    pub fn cooldown_remaining(&self) -> u64 {
        self.breaker.cooldown_remaining()
    }
}

impl RemoteVision for VisionClient {
    fn extract_identifier<'a>(
        &'a self,
        jpeg: &'a [u8],
    ) -> VisionFut<'a, Result<Option<String>, VisionError>> {
        Box::pin(VisionClient::extract_identifier(self, jpeg))
    }

    fn suggest_completions<'a>(&'a self, query: &'a str) -> VisionFut<'a, Vec<String>> {
        Box::pin(VisionClient::suggest_completions(self, query))
    }

    fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}
