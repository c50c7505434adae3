//! Core domain types for caselog.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod record;
mod suggestion;

pub use record::{Gender, ProcedureRecord, Role, SyncStatus};
pub use suggestion::{MAX_SUGGESTIONS, Suggestion, SuggestionOrigin, SuggestionSet};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Identifier Types
// ============================================================================

/// Which acquisition path produced an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierSource {
    /// OS-provided barcode detector.
    NativeDetector,
    /// Embedded software decoder library.
    SoftwareDecoder,
    /// Remote AI vision service reading a still frame.
    RemoteVision,
}

impl IdentifierSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NativeDetector => "native_detector",
            Self::SoftwareDecoder => "software_decoder",
            Self::RemoteVision => "remote_vision",
        }
    }

    /// Whether the value came from decoding a symbol on-device.
    ///
    /// Remote reads are best-effort text extraction; on-device decodes carry
    /// the symbology's own checksum.
    #[must_use]
    pub const fn is_local(self) -> bool {
        !matches!(self, Self::RemoteVision)
    }
}

impl fmt::Display for IdentifierSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("identifier must not be empty")]
pub struct EmptyIdentifierError;

/// A patient or specimen identifier produced by one capture session.
///
/// Invariant: `raw_value` is non-empty after trimming. Values are immutable once
/// produced; the session that produced one is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedIdentifier {
    raw_value: String,
    source: IdentifierSource,
}

impl DecodedIdentifier {
    pub fn new(
        raw_value: impl Into<String>,
        source: IdentifierSource,
    ) -> Result<Self, EmptyIdentifierError> {
        let raw_value = raw_value.into();
        let trimmed = raw_value.trim();
        if trimmed.is_empty() {
            return Err(EmptyIdentifierError);
        }
        let raw_value = if trimmed.len() == raw_value.len() {
            raw_value
        } else {
            trimmed.to_string()
        };
        Ok(Self { raw_value, source })
    }

    #[must_use]
    pub fn raw_value(&self) -> &str {
        &self.raw_value
    }

    #[must_use]
    pub fn source(&self) -> IdentifierSource {
        self.source
    }

    #[must_use]
    pub fn into_raw_value(self) -> String {
        self.raw_value
    }
}

impl fmt::Display for DecodedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_value)
    }
}

/// Barcode symbologies requested from on-device decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarcodeFormat {
    Code128,
    Code39,
    Code93,
    Codabar,
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    DataMatrix,
    Itf,
    QrCode,
}

impl BarcodeFormat {
    /// Every format hospital wristbands and specimen labels are printed in.
    pub const ALL: &'static [BarcodeFormat] = &[
        BarcodeFormat::Code128,
        BarcodeFormat::Code39,
        BarcodeFormat::Code93,
        BarcodeFormat::Codabar,
        BarcodeFormat::Ean13,
        BarcodeFormat::Ean8,
        BarcodeFormat::UpcA,
        BarcodeFormat::UpcE,
        BarcodeFormat::DataMatrix,
        BarcodeFormat::Itf,
        BarcodeFormat::QrCode,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code128 => "code_128",
            Self::Code39 => "code_39",
            Self::Code93 => "code_93",
            Self::Codabar => "codabar",
            Self::Ean13 => "ean_13",
            Self::Ean8 => "ean_8",
            Self::UpcA => "upc_a",
            Self::UpcE => "upc_e",
            Self::DataMatrix => "data_matrix",
            Self::Itf => "itf",
            Self::QrCode => "qr_code",
        }
    }

    #[must_use]
    pub const fn is_linear(self) -> bool {
        !matches!(self, Self::DataMatrix | Self::QrCode)
    }
}

// ============================================================================
// Capture Lifecycle
// ============================================================================

/// Lifecycle state of a capture session.
///
/// ```text
/// Initializing -> Scanning -> (Analyzing -> Scanning | Detected | Failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Initializing,
    Scanning,
    Analyzing,
    Detected,
    Failed,
    Cancelled,
}

impl CaptureState {
    /// Terminal states always imply the camera has been released.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Detected | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub const fn can_transition_to(self, next: CaptureState) -> bool {
        use CaptureState::{Analyzing, Cancelled, Detected, Failed, Initializing, Scanning};
        match (self, next) {
            (Initializing, Scanning | Failed | Cancelled)
            | (Scanning, Analyzing | Detected | Failed | Cancelled)
            | (Analyzing, Scanning | Detected | Failed | Cancelled) => true,
            _ => false,
        }
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// API key for the remote vision service.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for blank keys so an empty env var counts as missing.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

// Manual Debug impl to prevent leaking API keys in logs.
impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}
