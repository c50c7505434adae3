//! Human-readable progress messages for the scanner overlay.

use std::fmt;

use caselog_vision::VisionError;

use crate::error::CaptureError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    Starting,
    ScanningForBarcodes,
    ManualOnly,
    Analyzing,
    BarcodeDetected,
    IdVerified,
    NoIdFound,
    CoolingDown { secs: u64 },
    AiUnavailable,
    ScanFailed,
    CameraNotReady,
    CameraDenied,
    CameraBusy,
    CameraError,
    NoBackend,
}

impl ScanStatus {
    /// Status shown after a remote read fails, so the user can tell whether
    /// trying again right now is worthwhile.
    #[must_use]
    pub fn for_remote_error(err: &VisionError) -> Self {
        match err {
            VisionError::RateLimited { cooldown_secs: secs }
            | VisionError::Cooldown {
                remaining_secs: secs,
            } => Self::CoolingDown { secs: *secs },
            VisionError::MissingCredential
            | VisionError::PermissionDenied { .. }
            | VisionError::Disabled => Self::AiUnavailable,
            VisionError::Transient { .. } => Self::ScanFailed,
        }
    }

    #[must_use]
    pub fn for_capture_error(err: &CaptureError) -> Self {
        match err {
            CaptureError::CameraAccessDenied => Self::CameraDenied,
            CaptureError::CameraBusy => Self::CameraBusy,
            CaptureError::Camera(_) => Self::CameraError,
            CaptureError::NoDecodingBackendAvailable => Self::NoBackend,
            CaptureError::Remote(e) => Self::for_remote_error(e),
            CaptureError::SessionClosed => Self::ScanFailed,
        }
    }

    /// Whether the message reports a problem rather than progress.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        !matches!(
            self,
            Self::Starting
                | Self::ScanningForBarcodes
                | Self::ManualOnly
                | Self::Analyzing
                | Self::BarcodeDetected
                | Self::IdVerified
        )
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("Starting camera..."),
            Self::ScanningForBarcodes => f.write_str("Scanning for barcodes..."),
            Self::ManualOnly => f.write_str("Camera active. Tap capture to read the ID."),
            Self::Analyzing => f.write_str("AI analyzing..."),
            Self::BarcodeDetected => f.write_str("Barcode detected!"),
            Self::IdVerified => f.write_str("ID verified!"),
            Self::NoIdFound => f.write_str("No ID found. Try closer."),
            Self::CoolingDown { secs } => {
                write!(f, "AI cooling down, {secs} seconds remaining.")
            }
            Self::AiUnavailable => f.write_str("AI reading unavailable. Scan the barcode instead."),
            Self::ScanFailed => f.write_str("Scan failed. Try again."),
            Self::CameraNotReady => f.write_str("Camera not ready yet."),
            Self::CameraDenied => f.write_str("Camera access denied."),
            Self::CameraBusy => f.write_str("Camera is in use by another scanner."),
            Self::CameraError => f.write_str("Camera unavailable."),
            Self::NoBackend => {
                f.write_str("No barcode reader available and AI reading is disabled.")
            }
        }
    }
}
