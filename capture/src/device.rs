//! Camera surface consumed by capture sessions.
//!
//! Platform glue implements [`CameraDevice`]; sessions only ever see the
//! trait objects defined here.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::frame::VideoFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Facing {
    #[default]
    Rear,
    Front,
}

/// Hints for opening a stream. Devices treat these as preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub continuous_focus: bool,
}

impl Default for StreamRequest {
    // High resolution keeps small barcode modules and printed digits legible.
    fn default() -> Self {
        Self {
            facing: Facing::Rear,
            ideal_width: 1920,
            ideal_height: 1080,
            continuous_focus: true,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera access denied")]
    AccessDenied,
    #[error("camera is in use by another session")]
    Busy,
    #[error("no camera available")]
    NotFound,
    #[error("torch not supported by this camera")]
    TorchUnsupported,
    #[error("camera error: {0}")]
    Device(String),
}

pub type CameraFut<'a> =
    Pin<Box<dyn Future<Output = Result<Box<dyn CameraStream>, CameraError>> + Send + 'a>>;

pub trait CameraDevice: Send + Sync {
    fn open<'a>(&'a self, request: &'a StreamRequest) -> CameraFut<'a>;
}

/// A live camera stream. Exactly one exists per session.
pub trait CameraStream: Send {
    /// Latest preview frame, or `None` until the stream has data.
    fn current_frame(&mut self) -> Option<VideoFrame>;

    /// Full-quality still for remote reading. Defaults to the preview frame.
    fn capture_still(&mut self) -> Option<VideoFrame> {
        self.current_frame()
    }

    fn torch_supported(&self) -> bool {
        false
    }

    fn set_torch(&mut self, _on: bool) -> Result<(), CameraError> {
        Err(CameraError::TorchUnsupported)
    }

    /// Stop every track and detach the stream. Must be idempotent.
    fn stop(&mut self);
}

/// Wraps a device so at most one stream is open at a time.
pub struct ExclusiveCamera {
    inner: Arc<dyn CameraDevice>,
    permit: Arc<Semaphore>,
}

impl ExclusiveCamera {
    #[must_use]
    pub fn new(inner: Arc<dyn CameraDevice>) -> Self {
        Self {
            inner,
            permit: Arc::new(Semaphore::new(1)),
        }
    }

    /// Whether a stream is currently held.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.permit.available_permits() == 0
    }
}

impl CameraDevice for ExclusiveCamera {
    fn open<'a>(&'a self, request: &'a StreamRequest) -> CameraFut<'a> {
        Box::pin(async move {
            let lease = Arc::clone(&self.permit)
                .try_acquire_owned()
                .map_err(|_| CameraError::Busy)?;
            let stream = self.inner.open(request).await?;
            Ok(Box::new(LeasedStream {
                stream,
                _lease: lease,
            }) as Box<dyn CameraStream>)
        })
    }
}

/// Stream that returns its lease when dropped.
struct LeasedStream {
    stream: Box<dyn CameraStream>,
    _lease: OwnedSemaphorePermit,
}

impl CameraStream for LeasedStream {
    fn current_frame(&mut self) -> Option<VideoFrame> {
        self.stream.current_frame()
    }

    fn capture_still(&mut self) -> Option<VideoFrame> {
        self.stream.capture_still()
    }

    fn torch_supported(&self) -> bool {
        self.stream.torch_supported()
    }

    fn set_torch(&mut self, on: bool) -> Result<(), CameraError> {
        self.stream.set_torch(on)
    }

    fn stop(&mut self) {
        self.stream.stop();
    }
}

impl Drop for LeasedStream {
    fn drop(&mut self) {
        // Tracks stop before the lease is released so a new session never
        // overlaps with this one.
        self.stream.stop();
    }
}
