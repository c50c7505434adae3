//! Gemini `generateContent` wire format.
//!
//! Note: Gemini API uses camelCase for `generationConfig`, `inlineData`,
//! `mimeType` and `thinkingConfig`, lowercase for `contents` and `parts`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::{Value, json};

use crate::read_capped_error_body;
use crate::retry::{AttemptFailure, FailureKind, parse_retry_after};

/// Canonical Gemini API base URL.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

const SCANNER_INSTRUCTION: &str = "Act as a specialized medical scanner. Decode linear barcodes \
(Code 128, Code 39) or extract the patient MRN from the image.

PRIORITY:
1. Decode any linear barcode into its alphanumeric string representation.
2. Find high-contrast patient ID strings (usually 6-12 digits).

OUTPUT RULES:
- Return ONLY the decoded value.
- No labels, no prefixes (no 'MRN:', no 'ID:').
- If nothing is found with confidence, return 'null'.";

const IMAGE_TEMPERATURE: f64 = 0.0;
const COMPLETION_TEMPERATURE: f64 = 0.1;

fn text_part(text: &str) -> Value {
    json!({ "text": text })
}

fn completion_prompt(query: &str) -> String {
    format!(
        "List exactly 5 distinct professional surgical procedures starting with or containing: \"{query}\".\n\
         Format each as its standard medical name (e.g. \"Laparoscopic Cholecystectomy\").\n\
         Plain text only. No numbers, no bullets, one per line."
    )
}

pub(crate) fn generate_url(base_url: &str, model: &str) -> String {
    format!("{}/models/{model}:generateContent", base_url.trim_end_matches('/'))
}

/// Request body for reading an identifier off one JPEG still frame.
pub(crate) fn build_image_request(jpeg: &[u8]) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                text_part(SCANNER_INSTRUCTION),
                {
                    "inlineData": {
                        "mimeType": "image/jpeg",
                        "data": STANDARD.encode(jpeg)
                    }
                }
            ]
        }],
        "generationConfig": {
            "temperature": IMAGE_TEMPERATURE,
            "thinkingConfig": { "thinkingBudget": 0 }
        }
    })
}

/// Request body for procedure-name completions.
pub(crate) fn build_completion_request(query: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [text_part(&completion_prompt(query))]
        }],
        "generationConfig": {
            "temperature": COMPLETION_TEMPERATURE
        }
    })
}

/// Concatenated text of the first candidate, if any.
pub(crate) fn reply_text(response: &Value) -> Option<String> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)?;
    let text: String = parts
        .iter()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

fn mentions(body: &str, needle: &str) -> bool {
    body.contains(needle)
}

/// Map a non-success HTTP response to an attempt failure.
pub(crate) fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> AttemptFailure {
    let code = status.as_u16();
    let message = format!("HTTP {code}: {}", body.trim());

    if matches!(code, 401 | 403)
        || (code == 400
            && (mentions(body, "API_KEY_INVALID") || mentions(body, "PERMISSION_DENIED")))
    {
        return AttemptFailure::new(FailureKind::PermissionDenied { status: code }, message);
    }

    if code == 429 || mentions(body, "RESOURCE_EXHAUSTED") {
        return AttemptFailure::new(FailureKind::RateLimited, message);
    }

    let kind = if matches!(code, 408 | 409 | 500..=599) {
        FailureKind::Retryable
    } else {
        FailureKind::Fatal
    };
    AttemptFailure::new(kind, message).with_retry_after(parse_retry_after(headers))
}

pub(crate) fn classify_transport(error: &reqwest::Error) -> AttemptFailure {
    let kind = if error.is_connect() || error.is_timeout() || error.is_request() {
        FailureKind::Retryable
    } else {
        FailureKind::Fatal
    };
    AttemptFailure::new(kind, format!("request error: {error}"))
}

/// Send one `generateContent` request and return the reply text.
///
/// `Ok(None)` means the service answered but produced no text.
pub(crate) async fn generate(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &Value,
) -> Result<Option<String>, AttemptFailure> {
    let response = client
        .post(url)
        .header("x-goog-api-key", api_key)
        .header("content-type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| classify_transport(&e))?;

    let status = response.status();
    if !status.is_success() {
        let headers = response.headers().clone();
        let error_text = read_capped_error_body(response).await;
        return Err(classify_status(status, &headers, &error_text));
    }

    let data: Value = response.json().await.map_err(|e| {
        AttemptFailure::new(FailureKind::Fatal, format!("invalid response body: {e}"))
    })?;

    if let Some(reason) = data.pointer("/promptFeedback/blockReason").and_then(Value::as_str) {
        tracing::debug!(reason, "Gemini blocked the prompt");
        return Ok(None);
    }

    Ok(reply_text(&data))
}
