//! On-device decoding backends and the selector that picks one per session.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use caselog_types::{BarcodeFormat, IdentifierSource};
use image::GrayImage;
use thiserror::Error;

use crate::frame::VideoFrame;

/// Formats requested from every backend.
pub const REQUESTED_FORMATS: &[BarcodeFormat] = BarcodeFormat::ALL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Native,
    Software,
    Unavailable,
}

impl BackendKind {
    /// Source attached to identifiers this backend produces.
    #[must_use]
    pub const fn source(self) -> Option<IdentifierSource> {
        match self {
            Self::Native => Some(IdentifierSource::NativeDetector),
            Self::Software => Some(IdentifierSource::SoftwareDecoder),
            Self::Unavailable => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Software => "software",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendInitError {
    #[error("{0} decoder not present on this device")]
    NotPresent(BackendKind),
    #[error("{kind} decoder failed to initialize: {message}")]
    Failed { kind: BackendKind, message: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("detection failed: {0}")]
pub struct DetectError(pub String);

pub type DetectFut<'a> = Pin<Box<dyn Future<Output = Result<Option<String>, DetectError>> + Send + 'a>>;

/// Uniform decode surface used by the capture loop.
///
/// `Ok(None)` is the normal "nothing in this frame" answer.
pub trait DecodingBackend: Send {
    fn kind(&self) -> BackendKind;

    fn detect<'a>(&'a mut self, frame: &'a VideoFrame) -> DetectFut<'a>;

    fn supported_formats(&self) -> &[BarcodeFormat];

    /// Drop any internal decoder state. Called on teardown.
    fn reset(&mut self) {}
}

/// OS or hardware barcode detector.
pub trait NativeDetector: Send {
    fn detect<'a>(&'a mut self, frame: &'a VideoFrame) -> DetectFut<'a>;
}

/// Embeddable multi-format decoder working on greyscale frames.
pub trait SymbolDecoder: Send {
    fn decode(&mut self, image: &GrayImage) -> Result<Option<String>, DetectError>;

    fn reset(&mut self) {}
}

pub struct NativeBackend {
    detector: Box<dyn NativeDetector>,
    formats: Vec<BarcodeFormat>,
}

impl NativeBackend {
    #[must_use]
    pub fn new(detector: Box<dyn NativeDetector>, formats: Vec<BarcodeFormat>) -> Self {
        Self { detector, formats }
    }
}

impl DecodingBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn detect<'a>(&'a mut self, frame: &'a VideoFrame) -> DetectFut<'a> {
        self.detector.detect(frame)
    }

    fn supported_formats(&self) -> &[BarcodeFormat] {
        &self.formats
    }
}

pub struct SoftwareBackend {
    decoder: Box<dyn SymbolDecoder>,
    formats: Vec<BarcodeFormat>,
}

impl SoftwareBackend {
    #[must_use]
    pub fn new(decoder: Box<dyn SymbolDecoder>, formats: Vec<BarcodeFormat>) -> Self {
        Self { decoder, formats }
    }
}

impl DecodingBackend for SoftwareBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn detect<'a>(&'a mut self, frame: &'a VideoFrame) -> DetectFut<'a> {
        let luma = frame.to_luma();
        let result = self.decoder.decode(&luma);
        Box::pin(async move { result })
    }

    fn supported_formats(&self) -> &[BarcodeFormat] {
        &self.formats
    }

    fn reset(&mut self) {
        self.decoder.reset();
    }
}

/// Placeholder when nothing can decode locally. Sessions run manual-only.
#[derive(Debug, Default)]
pub struct UnavailableBackend;

impl DecodingBackend for UnavailableBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Unavailable
    }

    fn detect<'a>(&'a mut self, _frame: &'a VideoFrame) -> DetectFut<'a> {
        Box::pin(async { Ok(None) })
    }

    fn supported_formats(&self) -> &[BarcodeFormat] {
        &[]
    }
}

/// Probes one capability and builds its backend.
pub trait BackendProbe: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn initialize(
        &self,
        formats: &[BarcodeFormat],
    ) -> Result<Box<dyn DecodingBackend>, BackendInitError>;
}

/// Picks the best available backend: native, then software, then none.
#[derive(Clone, Default)]
pub struct DecodingBackendSelector {
    native: Option<Arc<dyn BackendProbe>>,
    software: Option<Arc<dyn BackendProbe>>,
}

impl DecodingBackendSelector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_native(mut self, probe: Arc<dyn BackendProbe>) -> Self {
        self.native = Some(probe);
        self
    }

    #[must_use]
    pub fn with_software(mut self, probe: Arc<dyn BackendProbe>) -> Self {
        self.software = Some(probe);
        self
    }

    /// Never fails. Initialization errors demote to the next candidate.
    #[must_use]
    pub fn select(&self) -> Box<dyn DecodingBackend> {
        for probe in [&self.native, &self.software].into_iter().flatten() {
            match probe.initialize(REQUESTED_FORMATS) {
                Ok(backend) => {
                    let supported = backend.supported_formats();
                    if supported.len() < REQUESTED_FORMATS.len() {
                        tracing::debug!(
                            kind = %backend.kind(),
                            supported = supported.len(),
                            "Backend supports a subset of requested formats"
                        );
                    }
                    tracing::debug!(kind = %backend.kind(), "Selected decoding backend");
                    return backend;
                }
                Err(e) => {
                    tracing::warn!(kind = %probe.kind(), error = %e, "Decoding backend unavailable, demoting");
                }
            }
        }
        tracing::info!("No on-device decoder available, manual capture only");
        Box::new(UnavailableBackend)
    }
}

impl fmt::Debug for DecodingBackendSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodingBackendSelector")
            .field("native", &self.native.as_ref().map(|p| p.kind()))
            .field("software", &self.software.as_ref().map(|p| p.kind()))
            .finish()
    }
}
