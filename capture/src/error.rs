use caselog_vision::VisionError;
use thiserror::Error;

use crate::device::CameraError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("camera access denied")]
    CameraAccessDenied,
    #[error("camera is held by another session")]
    CameraBusy,
    #[error("camera unavailable: {0}")]
    Camera(String),
    #[error("no on-device decoder and remote reading is disabled")]
    NoDecodingBackendAvailable,
    #[error("remote reading failed: {0}")]
    Remote(#[from] VisionError),
    #[error("scan session ended before a result was acquired")]
    SessionClosed,
}

impl From<CameraError> for CaptureError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::AccessDenied => Self::CameraAccessDenied,
            CameraError::Busy => Self::CameraBusy,
            other => Self::Camera(other.to_string()),
        }
    }
}
