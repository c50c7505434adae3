//! Camera capture sessions.
//!
//! A [`CaptureSession`] acquires the camera, polls frames through the best
//! available on-device decoder, and falls back to remote vision when the user
//! asks for it or nothing can decode locally. Exactly one
//! [`DecodedIdentifier`](caselog_types::DecodedIdentifier) leaves a session.
//!
//! # Backends
//!
//! [`DecodingBackendSelector`] prefers a native detector, then a software
//! decoder, then runs the session in manual-capture mode. A backend that fails
//! to initialize is skipped, never fatal. [`SoftwareProbe`] provides the
//! embedded multi-format decoder.

pub mod backend;
pub mod device;
mod error;
pub mod feedback;
pub mod frame;
mod session;
pub mod software;
mod status;

pub use backend::{
    BackendInitError, BackendKind, BackendProbe, DecodingBackend, DecodingBackendSelector,
    DetectError, NativeBackend, NativeDetector, SoftwareBackend, SymbolDecoder,
    UnavailableBackend,
};
pub use device::{CameraDevice, CameraError, CameraStream, ExclusiveCamera, Facing, StreamRequest};
pub use error::CaptureError;
pub use feedback::{FeedbackConfig, FeedbackSink, HapticPattern, NoFeedback, Tone};
pub use frame::{FrameError, VideoFrame};
pub use session::{CaptureSession, ScannerConfig, SessionEvent, SessionHandle};
pub use software::{RxingDecoder, SoftwareProbe};
pub use status::ScanStatus;
