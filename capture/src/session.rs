//! Capture session lifecycle.
//!
//! A session runs as a single task that owns the decode loop. The camera
//! stream sits in a slot shared with the [`SessionHandle`], so teardown from
//! the caller side stops the tracks on the caller's thread before returning.
//!
//! ```text
//! Initializing -> Scanning -> (Analyzing -> Scanning | Detected | Failed)
//!                      \-> Cancelled (any non-terminal state)
//! ```

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use caselog_types::{CaptureState, DecodedIdentifier, IdentifierSource};
use caselog_vision::{RemoteVision, VisionError, VisionFut};
use futures_util::future::OptionFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::backend::{BackendKind, DecodingBackend, DecodingBackendSelector, DetectError};
use crate::device::{CameraDevice, CameraStream, StreamRequest};
use crate::error::CaptureError;
use crate::feedback::{FeedbackConfig, FeedbackSink};
use crate::frame::{DEFAULT_JPEG_QUALITY, VideoFrame};
use crate::status::ScanStatus;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Delay between automatic decode attempts.
    pub tick_interval: Duration,
    pub feedback: FeedbackConfig,
    /// JPEG quality for stills sent to remote reading.
    pub jpeg_quality: u8,
    pub stream: StreamRequest,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            feedback: FeedbackConfig::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            stream: StreamRequest::default(),
        }
    }
}

/// Progress reported to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    State(CaptureState),
    Status(ScanStatus),
    TorchAvailable(bool),
    TorchChanged(bool),
    Acquired(DecodedIdentifier),
    Failed(CaptureError),
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Capture,
    ToggleTorch,
}

type AnalysisFut = VisionFut<'static, Result<Option<String>, VisionError>>;

/// A pending decode. Hands the backend back with the result.
type DetectTask = Pin<Box<dyn Future<Output = (BackendGuard, Result<Option<String>, DetectError>)> + Send>>;

/// State shared between the session task and its handle.
struct Shared {
    stream: Mutex<Option<Box<dyn CameraStream>>>,
    state: Mutex<CaptureState>,
    accepted: AtomicBool,
    closed: AtomicBool,
    events: mpsc::UnboundedSender<SessionEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Shared {
    fn emit(&self, event: SessionEvent) {
        // Receiver may be gone; the session keeps running regardless.
        let _ = self.events.send(event);
    }

    fn status(&self, status: ScanStatus) {
        tracing::debug!(%status, "Scan status");
        self.emit(SessionEvent::Status(status));
    }

    fn state(&self) -> CaptureState {
        *lock(&self.state)
    }

    fn set_state(&self, next: CaptureState) -> bool {
        let mut state = lock(&self.state);
        if !state.can_transition_to(next) {
            return false;
        }
        tracing::debug!(from = ?*state, to = ?next, "Capture state transition");
        *state = next;
        drop(state);
        self.emit(SessionEvent::State(next));
        true
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Store the opened stream unless the session was closed meanwhile.
    fn install(&self, mut stream: Box<dyn CameraStream>) -> Result<(), CaptureError> {
        let mut slot = lock(&self.stream);
        if self.is_closed() {
            stream.stop();
            return Err(CaptureError::SessionClosed);
        }
        *slot = Some(stream);
        Ok(())
    }

    fn with_stream<R>(&self, f: impl FnOnce(&mut dyn CameraStream) -> R) -> Option<R> {
        lock(&self.stream).as_mut().map(|stream| f(stream.as_mut()))
    }

    fn release_stream(&self) {
        let stream = lock(&self.stream).take();
        if let Some(mut stream) = stream {
            stream.stop();
            tracing::debug!("Camera stream released");
        }
    }

    fn holds_stream(&self) -> bool {
        lock(&self.stream).is_some()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.release_stream();
        if self.set_state(CaptureState::Cancelled) {
            tracing::info!("Capture session cancelled");
        }
    }
}

/// Resets decoder state however the session exits, including task abort.
struct BackendGuard(Box<dyn DecodingBackend>);

impl Deref for BackendGuard {
    type Target = dyn DecodingBackend;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for BackendGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for BackendGuard {
    fn drop(&mut self) {
        self.0.reset();
    }
}

/// One scan attempt, from camera acquisition to a single identifier.
pub struct CaptureSession {
    camera: Arc<dyn CameraDevice>,
    selector: DecodingBackendSelector,
    remote: Arc<dyn RemoteVision>,
    feedback: Arc<dyn FeedbackSink>,
    config: ScannerConfig,
}

impl CaptureSession {
    #[must_use]
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        selector: DecodingBackendSelector,
        remote: Arc<dyn RemoteVision>,
        feedback: Arc<dyn FeedbackSink>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            camera,
            selector,
            remote,
            feedback,
            config,
        }
    }

    /// Spawn the session on the current tokio runtime.
    ///
    /// `on_acquired` runs at most once, after the camera has been released.
    pub fn start<F>(self, on_acquired: F) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>)
    where
        F: FnOnce(DecodedIdentifier) + Send + 'static,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            stream: Mutex::new(None),
            state: Mutex::new(CaptureState::Initializing),
            accepted: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            events: events_tx,
        });

        let runner = Runner {
            session: self,
            shared: Arc::clone(&shared),
            commands: commands_rx,
            torch_on: false,
        };
        let task = tokio::spawn(runner.run(on_acquired));

        let handle = SessionHandle {
            commands: commands_tx,
            shared,
            task: Some(task),
        };
        (handle, events_rx)
    }
}

struct Runner {
    session: CaptureSession,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    torch_on: bool,
}

impl Runner {
    async fn run<F>(mut self, on_acquired: F) -> Result<DecodedIdentifier, CaptureError>
    where
        F: FnOnce(DecodedIdentifier) + Send + 'static,
    {
        let outcome = match self.initialize().await {
            Ok(backend) => self.scan(backend).await,
            Err(e) => Err(e),
        };
        let result = match outcome {
            Ok(id) => self.accept(id, on_acquired),
            Err(e) => Err(e),
        };
        self.shared.release_stream();
        result
    }

    fn fail(&self, err: CaptureError) -> CaptureError {
        tracing::warn!(error = %err, "Capture session failed");
        if self.shared.set_state(CaptureState::Failed) {
            self.shared.status(ScanStatus::for_capture_error(&err));
            self.shared.emit(SessionEvent::Failed(err.clone()));
        }
        err
    }

    async fn initialize(&mut self) -> Result<BackendGuard, CaptureError> {
        self.shared.status(ScanStatus::Starting);
        let stream = self
            .session
            .camera
            .open(&self.session.config.stream)
            .await
            .map_err(|e| self.fail(e.into()))?;

        let torch = stream.torch_supported();
        self.shared.install(stream)?;
        self.shared.emit(SessionEvent::TorchAvailable(torch));

        let backend = BackendGuard(self.session.selector.select());
        if backend.kind() == BackendKind::Unavailable && self.session.remote.breaker().is_disabled()
        {
            return Err(self.fail(CaptureError::NoDecodingBackendAvailable));
        }

        self.shared.set_state(CaptureState::Scanning);
        self.shared.status(match backend.kind() {
            BackendKind::Unavailable => ScanStatus::ManualOnly,
            _ => ScanStatus::ScanningForBarcodes,
        });
        Ok(backend)
    }

    async fn scan(&mut self, backend: BackendGuard) -> Result<DecodedIdentifier, CaptureError> {
        let polling = backend.kind() != BackendKind::Unavailable;
        let source = backend.kind().source();
        let mut ticker = tokio::time::interval(self.session.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut analysis: Option<AnalysisFut> = None;
        // The backend lives here between ticks and inside `detecting` while a
        // decode is pending.
        let mut idle = Some(backend);
        let mut detecting: Option<DetectTask> = None;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Capture) => self.start_analysis(&mut analysis),
                    Some(Command::ToggleTorch) => self.toggle_torch(),
                    None => return Err(CaptureError::SessionClosed),
                },
                Some(result) = OptionFuture::from(analysis.as_mut()) => {
                    analysis = None;
                    if let Some(id) = self.finish_analysis(result) {
                        return Ok(id);
                    }
                }
                Some((backend, result)) = OptionFuture::from(detecting.as_mut()) => {
                    detecting = None;
                    idle = Some(backend);
                    match result {
                        Ok(Some(value)) => {
                            if let Some(source) = source
                                && let Ok(id) = DecodedIdentifier::new(value, source)
                            {
                                return Ok(id);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => tracing::debug!(error = %e, "Decode tick failed"),
                    }
                }
                _ = ticker.tick(), if polling && detecting.is_none() => {
                    let Some(backend) = idle.take() else {
                        continue;
                    };
                    let Some(frame) = self.shared.with_stream(|s| s.current_frame()).flatten() else {
                        idle = Some(backend);
                        continue;
                    };
                    detecting = Some(Box::pin(detect_once(backend, frame)));
                }
            }
        }
    }

    /// Manual capture: one still frame to remote reading.
    fn start_analysis(&self, analysis: &mut Option<AnalysisFut>) {
        if analysis.is_some() {
            tracing::debug!("Capture ignored, analysis already in flight");
            return;
        }
        // Answer from the breaker locally; no request is built.
        if let Err(e) = self.session.remote.breaker().check() {
            self.shared.status(ScanStatus::for_remote_error(&e));
            return;
        }
        let Some(frame) = self.shared.with_stream(|s| s.capture_still()).flatten() else {
            self.shared.status(ScanStatus::CameraNotReady);
            return;
        };
        let jpeg = match encode_still(&frame, self.session.config.jpeg_quality) {
            Some(jpeg) => jpeg,
            None => {
                self.shared.status(ScanStatus::ScanFailed);
                return;
            }
        };

        self.shared.set_state(CaptureState::Analyzing);
        self.shared.status(ScanStatus::Analyzing);
        let remote = Arc::clone(&self.session.remote);
        *analysis = Some(Box::pin(async move { remote.extract_identifier(&jpeg).await }));
    }

    fn finish_analysis(
        &self,
        result: Result<Option<String>, VisionError>,
    ) -> Option<DecodedIdentifier> {
        match result {
            Ok(Some(value)) => {
                if let Ok(id) = DecodedIdentifier::new(value, IdentifierSource::RemoteVision) {
                    return Some(id);
                }
                self.shared.set_state(CaptureState::Scanning);
                self.shared.status(ScanStatus::NoIdFound);
            }
            Ok(None) => {
                self.shared.set_state(CaptureState::Scanning);
                self.shared.status(ScanStatus::NoIdFound);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Remote identifier read failed");
                self.shared.set_state(CaptureState::Scanning);
                self.shared.status(ScanStatus::for_remote_error(&e));
            }
        }
        None
    }

    fn toggle_torch(&mut self) {
        let next = !self.torch_on;
        let outcome = self.shared.with_stream(|s| {
            if s.torch_supported() {
                s.set_torch(next).map(|()| true)
            } else {
                Ok(false)
            }
        });
        match outcome {
            Some(Ok(true)) => {
                self.torch_on = next;
                self.shared.emit(SessionEvent::TorchChanged(next));
            }
            Some(Ok(false)) | None => {}
            Some(Err(e)) => tracing::debug!(error = %e, "Torch toggle failed"),
        }
    }

    /// First accepted result wins; later ones are dropped here.
    fn accept<F>(&self, id: DecodedIdentifier, on_acquired: F) -> Result<DecodedIdentifier, CaptureError>
    where
        F: FnOnce(DecodedIdentifier),
    {
        if self.shared.is_closed() || self.shared.accepted.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::SessionClosed);
        }
        self.session.config.feedback.confirm(self.session.feedback.as_ref());
        self.shared.set_state(CaptureState::Detected);
        self.shared.status(if id.source().is_local() {
            ScanStatus::BarcodeDetected
        } else {
            ScanStatus::IdVerified
        });
        self.shared.release_stream();
        tracing::info!(source = %id.source(), "Identifier acquired");

        on_acquired(id.clone());
        self.shared.emit(SessionEvent::Acquired(id.clone()));
        Ok(id)
    }
}

async fn detect_once(
    mut backend: BackendGuard,
    frame: VideoFrame,
) -> (BackendGuard, Result<Option<String>, DetectError>) {
    let result = backend.detect(&frame).await;
    (backend, result)
}

fn encode_still(frame: &VideoFrame, quality: u8) -> Option<Vec<u8>> {
    match frame.to_jpeg(quality) {
        Ok(jpeg) => Some(jpeg),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode still frame");
            None
        }
    }
}

/// Caller-side control of a running session.
///
/// Dropping the handle cancels the session.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    task: Option<JoinHandle<Result<DecodedIdentifier, CaptureError>>>,
}

impl SessionHandle {
    /// Request a remote read of the current frame. Ignored while one is in flight.
    pub fn capture(&self) -> bool {
        self.commands.send(Command::Capture).is_ok()
    }

    pub fn toggle_torch(&self) -> bool {
        self.commands.send(Command::ToggleTorch).is_ok()
    }

    /// Stop the session. The camera is released before this returns.
    pub fn cancel(&self) {
        self.shared.close();
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    #[must_use]
    pub fn state(&self) -> CaptureState {
        self.shared.state()
    }

    #[must_use]
    pub fn holds_camera(&self) -> bool {
        self.shared.holds_stream()
    }

    /// Wait for the session to finish.
    pub async fn wait(mut self) -> Result<DecodedIdentifier, CaptureError> {
        let Some(task) = self.task.take() else {
            return Err(CaptureError::SessionClosed);
        };
        match task.await {
            Ok(result) => result,
            Err(e) => {
                if e.is_panic() {
                    tracing::error!(error = %e, "Capture session task panicked");
                }
                self.shared.release_stream();
                Err(CaptureError::SessionClosed)
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.shared.close();
            task.abort();
        }
    }
}
