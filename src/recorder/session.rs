//! Recording session lifecycle.
//!
//! NoPermission → Previewing → Recording ⇄ Paused → Reviewing → (discard)
//! Previewing | (accept) NoPermission
//!
//! The session is driven from a single task. User actions arrive as method
//! calls; capture grants and encoder notifications arrive as
//! [`SessionEvent`]s pulled with [`RecordingSession::next_event`]. Calls made
//! from the wrong state are ignored and return the unchanged state.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::artifact::{ChunkBuffer, FinishedArtifact, LocatorRegistry};
use super::clock::ElapsedCounter;
use super::state::{PreviewSource, SessionState, SessionStatus, SessionStatusHandle};
use crate::capture::{
    CaptureError, CaptureProvider, DeviceHandle, Encoder, EncoderEvent, MediaConstraints,
};
use crate::upload::{UploadError, UploadHandler, Video};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("nothing was recorded")]
    EmptyRecording,
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl SessionError {
    /// Message for the candidate, as opposed to the log line.
    pub fn user_message(&self) -> String {
        match self {
            Self::Capture(e) => e.user_message(),
            Self::EmptyRecording => "Nothing was recorded. Please try again.".to_string(),
            Self::Upload(e) => format!("Your video could not be saved: {e}"),
        }
    }
}

/// User-facing actions, as forwarded by the control API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    RequestPermission,
    Start,
    Pause,
    Resume,
    Stop,
    Discard,
    Accept,
}

impl SessionCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestPermission => "permission",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::Discard => "discard",
            Self::Accept => "accept",
        }
    }
}

#[derive(Debug)]
pub enum SessionEvent {
    /// An acquisition started by `request_permission` finished.
    PermissionResolved(Result<DeviceHandle, CaptureError>),
    Encoder(EncoderEvent),
    /// The encoder dropped its end of the channel without `Stopped`.
    EncoderClosed,
}

type Grant = Result<DeviceHandle, CaptureError>;

pub struct RecordingSession {
    provider: Arc<dyn CaptureProvider>,
    uploader: Arc<dyn UploadHandler>,
    locators: LocatorRegistry,
    mime_type: String,

    state: SessionState,
    device: Option<DeviceHandle>,
    acquiring: bool,
    closed: bool,
    grants_tx: mpsc::UnboundedSender<Grant>,
    grants_rx: mpsc::UnboundedReceiver<Grant>,

    encoder: Option<Box<dyn Encoder>>,
    encoder_events: Option<mpsc::UnboundedReceiver<EncoderEvent>>,
    chunks: ChunkBuffer,
    artifact: Option<FinishedArtifact>,
    counter: ElapsedCounter,

    preview: PreviewSource,
    last_error: Option<String>,
    last_upload: Option<Video>,
    status: watch::Sender<SessionStatus>,
}

impl RecordingSession {
    pub fn new(
        provider: Arc<dyn CaptureProvider>,
        uploader: Arc<dyn UploadHandler>,
        mime_type: impl Into<String>,
    ) -> Self {
        let (grants_tx, grants_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(SessionStatus::default());
        Self {
            provider,
            uploader,
            locators: LocatorRegistry::default(),
            mime_type: mime_type.into(),
            state: SessionState::NoPermission,
            device: None,
            acquiring: false,
            closed: false,
            grants_tx,
            grants_rx,
            encoder: None,
            encoder_events: None,
            chunks: ChunkBuffer::new(),
            artifact: None,
            counter: ElapsedCounter::new(),
            preview: PreviewSource::Blank,
            last_error: None,
            last_upload: None,
            status,
        }
    }

    /// Share an existing locator table, e.g. one the HTTP server resolves from.
    pub fn with_locators(mut self, locators: LocatorRegistry) -> Self {
        self.locators = locators;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    pub fn is_acquiring(&self) -> bool {
        self.acquiring
    }

    pub fn artifact(&self) -> Option<&FinishedArtifact> {
        self.artifact.as_ref()
    }

    pub fn preview(&self) -> &PreviewSource {
        &self.preview
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.counter.seconds()
    }

    pub fn is_counting(&self) -> bool {
        self.counter.is_ticking()
    }

    pub fn locators(&self) -> &LocatorRegistry {
        &self.locators
    }

    pub fn status_handle(&self) -> SessionStatusHandle {
        SessionStatusHandle::new(self.status.subscribe(), self.counter.subscribe())
    }

    /// Ask the provider for camera + microphone.
    ///
    /// Returns false when no request was issued: the device is already held,
    /// a request is in flight, or the session was torn down. The outcome
    /// arrives later as [`SessionEvent::PermissionResolved`].
    pub fn request_permission(&mut self) -> bool {
        if self.closed || self.acquiring || self.state != SessionState::NoPermission {
            debug!(
                "Ignoring permission request (state: {}, in flight: {})",
                self.state.as_str(),
                self.acquiring
            );
            return false;
        }

        info!("Requesting camera and microphone access");
        self.acquiring = true;
        self.last_error = None;
        let provider = Arc::clone(&self.provider);
        let grants = self.grants_tx.clone();
        tokio::spawn(async move {
            let grant = provider
                .acquire(MediaConstraints::AUDIO_VIDEO)
                .await
                .map(DeviceHandle::new);
            // A torn-down session no longer listens; the handle is dropped
            // here and its tracks stopped.
            if grants.send(grant).is_err() {
                debug!("Capture grant arrived after the session ended");
            }
        });
        self.publish();
        true
    }

    /// Request permission and wait for the answer.
    pub async fn acquire(&mut self) -> Result<SessionState, SessionError> {
        self.request_permission();
        while self.acquiring {
            match self.next_event().await {
                SessionEvent::PermissionResolved(grant) => {
                    self.on_permission_resolved(grant)?;
                }
                event => self.handle_event(event),
            }
        }
        Ok(self.state)
    }

    /// Wait for the next grant or encoder notification.
    pub async fn next_event(&mut self) -> SessionEvent {
        match self.encoder_events.as_mut() {
            Some(events) => tokio::select! {
                Some(grant) = self.grants_rx.recv() => SessionEvent::PermissionResolved(grant),
                event = events.recv() => match event {
                    Some(event) => SessionEvent::Encoder(event),
                    None => SessionEvent::EncoderClosed,
                },
            },
            None => match self.grants_rx.recv().await {
                Some(grant) => SessionEvent::PermissionResolved(grant),
                // Closed only by teardown.
                None => std::future::pending().await,
            },
        }
    }

    /// Apply an event. Failures are logged and recorded in the status.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::PermissionResolved(grant) => {
                let _ = self.on_permission_resolved(grant);
            }
            SessionEvent::Encoder(event) => self.on_encoder_event(event),
            SessionEvent::EncoderClosed => {
                self.encoder_events = None;
                if self.state.is_capturing() {
                    let _ = self.finish_attempt(Some(CaptureError::Encoder(
                        "encoder closed unexpectedly".to_string(),
                    )));
                }
            }
        }
    }

    /// Run a user command against the session.
    pub async fn apply(&mut self, command: SessionCommand) -> Result<SessionState, SessionError> {
        match command {
            SessionCommand::RequestPermission => {
                self.request_permission();
                Ok(self.state)
            }
            SessionCommand::Start => self.start(),
            SessionCommand::Pause => Ok(self.pause()),
            SessionCommand::Resume => Ok(self.resume()),
            SessionCommand::Stop => self.stop().await,
            SessionCommand::Discard => Ok(self.discard()),
            SessionCommand::Accept => self.accept().await,
        }
    }

    /// Begin a fresh recording attempt over the held device.
    pub fn start(&mut self) -> Result<SessionState, SessionError> {
        if self.state != SessionState::Previewing {
            debug!("Ignoring start while {}", self.state.as_str());
            return Ok(self.state);
        }
        let Some(device) = self.device.as_ref() else {
            debug!("Ignoring start without a capture device");
            return Ok(self.state);
        };

        let (sink, events) = mpsc::unbounded_channel();
        let encoder = device
            .create_encoder(&self.mime_type, sink)
            .and_then(|mut encoder| encoder.start().map(|_| encoder));
        let encoder = match encoder {
            Ok(encoder) => encoder,
            Err(e) => {
                error!("Failed to start encoder: {}", e);
                self.return_to_preview();
                return Err(self.report(e.into()));
            }
        };

        self.chunks = ChunkBuffer::new();
        self.encoder = Some(encoder);
        self.encoder_events = Some(events);
        self.counter.start();
        self.state = SessionState::Recording;
        self.last_error = None;
        info!("Recording started ({})", self.mime_type);
        self.publish();
        Ok(self.state)
    }

    pub fn pause(&mut self) -> SessionState {
        if self.state != SessionState::Recording {
            debug!("Ignoring pause while {}", self.state.as_str());
            return self.state;
        }
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.pause();
        }
        self.enter_paused();
        self.state
    }

    pub fn resume(&mut self) -> SessionState {
        if self.state != SessionState::Paused {
            debug!("Ignoring resume while {}", self.state.as_str());
            return self.state;
        }
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.resume();
        }
        self.enter_recording();
        self.state
    }

    /// Finalize the attempt and bind the artifact for review.
    ///
    /// The capture device stays reserved so "record again" can return to the
    /// live preview without a new permission prompt.
    pub async fn stop(&mut self) -> Result<SessionState, SessionError> {
        if !self.state.is_capturing() {
            debug!("Ignoring stop while {}", self.state.as_str());
            return Ok(self.state);
        }

        if let Some(encoder) = self.encoder.as_mut() {
            encoder.stop();
        }
        let failure = self.drain_encoder().await;
        self.finish_attempt(failure)
    }

    /// "Record again": drop the artifact and go back to the live preview.
    pub fn discard(&mut self) -> SessionState {
        if self.state != SessionState::Reviewing {
            debug!("Ignoring discard while {}", self.state.as_str());
            return self.state;
        }

        self.drop_artifact();
        self.counter.reset();
        self.return_to_preview();
        match self.state {
            SessionState::Previewing => info!("Recording discarded, back to live preview"),
            _ => info!("Recording discarded, capture device must be requested again"),
        }
        self.publish();
        self.state
    }

    /// Hand the artifact to the upload handler, then release the device.
    ///
    /// On a failed hand-off nothing is released: the session stays in
    /// `Reviewing` with the artifact intact so the candidate can retry.
    pub async fn accept(&mut self) -> Result<SessionState, SessionError> {
        if self.state != SessionState::Reviewing {
            debug!("Ignoring accept while {}", self.state.as_str());
            return Ok(self.state);
        }
        let Some(artifact) = self.artifact.as_ref() else {
            return Ok(self.state);
        };

        info!(
            "Handing off recording {} ({} bytes)",
            artifact.locator,
            artifact.size()
        );
        match self.uploader.upload(artifact).await {
            Ok(video) => {
                info!("Recording accepted as video {}", video.id);
                self.drop_artifact();
                self.counter.reset();
                if let Some(device) = self.device.take() {
                    device.release();
                }
                self.preview = PreviewSource::Blank;
                self.state = SessionState::NoPermission;
                self.last_error = None;
                self.last_upload = Some(video);
                self.publish();
                Ok(self.state)
            }
            Err(e) => {
                error!("Upload failed, keeping recording for retry: {}", e);
                Err(self.report(e.into()))
            }
        }
    }

    /// Release every resource the session holds. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(mut encoder) = self.encoder.take() {
            encoder.stop();
        }
        self.encoder_events = None;
        self.counter.reset();
        self.drop_artifact();
        if let Some(device) = self.device.take() {
            device.release();
        }
        // Grants still in flight now fail to send and drop their handle.
        self.grants_rx.close();
        while let Ok(grant) = self.grants_rx.try_recv() {
            drop(grant);
        }

        self.acquiring = false;
        self.state = SessionState::NoPermission;
        self.preview = PreviewSource::Blank;
        self.publish();
        info!("Recording session torn down");
    }

    fn on_permission_resolved(&mut self, grant: Grant) -> Result<(), SessionError> {
        self.acquiring = false;
        match grant {
            Ok(device) => {
                if self.closed || self.device.is_some() || self.state != SessionState::NoPermission {
                    debug!("Releasing capture grant nobody is waiting for");
                    device.release();
                    return Ok(());
                }

                info!("Camera access granted (stream {})", device.stream_id());
                self.preview = PreviewSource::Live(device.stream_id().to_string());
                self.device = Some(device);
                self.state = SessionState::Previewing;
                self.last_error = None;
                self.publish();
                Ok(())
            }
            Err(e) => {
                if self.closed {
                    return Ok(());
                }
                warn!("Camera access failed: {}", e);
                Err(self.report(e.into()))
            }
        }
    }

    fn on_encoder_event(&mut self, event: EncoderEvent) {
        match event {
            EncoderEvent::Data(chunk) => {
                if self.state.is_capturing() {
                    self.chunks.push(chunk);
                } else {
                    debug!("Dropping {} byte chunk outside a recording", chunk.len());
                }
            }
            EncoderEvent::Paused => {
                if self.state == SessionState::Recording {
                    debug!("Encoder paused itself");
                    self.enter_paused();
                }
            }
            EncoderEvent::Resumed => {
                if self.state == SessionState::Paused {
                    debug!("Encoder resumed itself");
                    self.enter_recording();
                }
            }
            EncoderEvent::Stopped => {
                if self.state.is_capturing() {
                    warn!("Encoder stopped on its own, finishing recording");
                    let _ = self.finish_attempt(None);
                }
            }
            EncoderEvent::Error(reason) => {
                if self.state.is_capturing() {
                    error!("Encoder failed mid-recording: {}", reason);
                    let _ = self.finish_attempt(Some(CaptureError::Encoder(reason)));
                }
            }
        }
    }

    /// Collect every chunk up to the encoder's final `Stopped`.
    async fn drain_encoder(&mut self) -> Option<CaptureError> {
        let Some(mut events) = self.encoder_events.take() else {
            return Some(CaptureError::Encoder("encoder channel already closed".to_string()));
        };

        while let Some(event) = events.recv().await {
            match event {
                EncoderEvent::Data(chunk) => {
                    self.chunks.push(chunk);
                }
                EncoderEvent::Stopped => return None,
                EncoderEvent::Error(reason) => return Some(CaptureError::Encoder(reason)),
                EncoderEvent::Paused | EncoderEvent::Resumed => {}
            }
        }
        Some(CaptureError::Encoder(
            "encoder closed before finishing".to_string(),
        ))
    }

    /// Turn the buffered chunks into the finished artifact.
    ///
    /// With a failure and some data, the partial recording is still offered
    /// for review and the failure reported. With no data there is nothing to
    /// review and the session falls back to the live preview. Either way a
    /// device whose tracks ended is given back.
    fn finish_attempt(&mut self, failure: Option<CaptureError>) -> Result<SessionState, SessionError> {
        self.encoder = None;
        self.encoder_events = None;
        let duration = self.counter.stop();
        let chunks = std::mem::take(&mut self.chunks);

        if chunks.is_empty() {
            self.counter.reset();
            self.return_to_preview();
            let err = failure.map(SessionError::from).unwrap_or(SessionError::EmptyRecording);
            warn!("Recording produced no data: {}", err);
            return Err(self.report(err));
        }

        self.release_lost_device();
        self.drop_artifact();
        let artifact =
            FinishedArtifact::assemble(chunks, &self.mime_type, duration, &self.locators);
        info!(
            "Recording stopped: {} chunks, {} bytes, {}s",
            artifact.chunk_count,
            artifact.size(),
            duration
        );
        self.preview = PreviewSource::Playback(artifact.locator.clone());
        self.artifact = Some(artifact);
        self.state = SessionState::Reviewing;

        match failure {
            Some(e) => Err(self.report(e.into())),
            None => {
                self.last_error = None;
                self.publish();
                Ok(self.state)
            }
        }
    }

    /// Show the live preview again. A device whose tracks have ended is given
    /// back instead, so the next permission request can acquire a fresh one.
    fn return_to_preview(&mut self) {
        self.release_lost_device();
        match self.device.as_ref() {
            Some(device) => {
                self.preview = PreviewSource::Live(device.stream_id().to_string());
                self.state = SessionState::Previewing;
            }
            None => {
                self.preview = PreviewSource::Blank;
                self.state = SessionState::NoPermission;
            }
        }
    }

    fn release_lost_device(&mut self) {
        if self.device.as_ref().is_some_and(|device| !device.is_live()) {
            if let Some(device) = self.device.take() {
                warn!("Capture device {} lost its tracks", device.stream_id());
                device.release();
            }
        }
    }

    fn enter_paused(&mut self) {
        self.counter.pause();
        self.state = SessionState::Paused;
        info!("Recording paused at {}s", self.counter.seconds());
        self.publish();
    }

    fn enter_recording(&mut self) {
        self.counter.resume();
        self.state = SessionState::Recording;
        info!("Recording resumed");
        self.publish();
    }

    fn drop_artifact(&mut self) {
        if let Some(artifact) = self.artifact.take() {
            self.locators.revoke(&artifact.locator);
        }
    }

    fn report(&mut self, err: SessionError) -> SessionError {
        self.last_error = Some(err.user_message());
        self.publish();
        err
    }

    fn publish(&self) {
        self.status.send_replace(SessionStatus {
            state: self.state,
            acquiring: self.acquiring,
            preview: self.preview.clone(),
            elapsed_seconds: 0,
            artifact: self.artifact.as_ref().map(FinishedArtifact::summary),
            last_error: self.last_error.clone(),
            last_upload: self.last_upload.clone(),
        });
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
