use super::*;
use crate::capture::{
    CaptureError, CaptureProvider, Encoder, EncoderEvent, EncoderSink, MediaConstraints,
    MediaStream, TrackKind, TrackState,
};
use crate::upload::{UploadError, UploadHandler, Video};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Camera whose encoder only emits what the test tells it to.
#[derive(Default)]
struct FakeCamera {
    deny: bool,
    gate: Option<Arc<Notify>>,
    requests: AtomicUsize,
    tracks: Mutex<Vec<Arc<AtomicBool>>>,
    sink: SinkSlot,
}

/// Where the current encoder's sink is published so the test can drive it.
type SinkSlot = Arc<Mutex<Option<EncoderSink>>>;

impl FakeCamera {
    fn denying() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn send(&self, event: EncoderEvent) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            let _ = sink.send(event);
        }
    }

    fn emit(&self, chunk: &'static [u8]) {
        self.send(EncoderEvent::Data(Bytes::from_static(chunk)));
    }

    /// Hardware loss: every track handed out so far ends.
    fn unplug(&self) {
        for live in self.tracks.lock().unwrap().iter() {
            live.store(false, Ordering::SeqCst);
        }
    }

    fn live_tracks(&self) -> usize {
        self.tracks
            .lock()
            .unwrap()
            .iter()
            .filter(|live| live.load(Ordering::SeqCst))
            .count()
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureProvider for FakeCamera {
    async fn acquire(
        &self,
        _constraints: MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.deny {
            return Err(CaptureError::PermissionDenied);
        }

        let tracks = vec![Arc::new(AtomicBool::new(true)), Arc::new(AtomicBool::new(true))];
        self.tracks.lock().unwrap().extend(tracks.iter().cloned());
        let id = format!("fake-stream-{}", self.requests());
        Ok(Box::new(FakeStream {
            id,
            tracks,
            sink: Arc::clone(&self.sink),
        }))
    }
}

struct FakeStream {
    id: String,
    tracks: Vec<Arc<AtomicBool>>,
    sink: SinkSlot,
}

impl MediaStream for FakeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<(TrackKind, TrackState)> {
        self.tracks
            .iter()
            .zip([TrackKind::Video, TrackKind::Audio])
            .map(|(live, kind)| {
                let state = if live.load(Ordering::SeqCst) {
                    TrackState::Live
                } else {
                    TrackState::Ended
                };
                (kind, state)
            })
            .collect()
    }

    fn stop_tracks(&mut self) {
        for live in &self.tracks {
            live.store(false, Ordering::SeqCst);
        }
    }

    fn create_encoder(
        &self,
        _mime_type: &str,
        sink: EncoderSink,
    ) -> Result<Box<dyn Encoder>, CaptureError> {
        *self.sink.lock().unwrap() = Some(sink.clone());
        Ok(Box::new(FakeEncoder { sink }))
    }
}

struct FakeEncoder {
    sink: EncoderSink,
}

impl Encoder for FakeEncoder {
    fn start(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    fn pause(&mut self) {
        let _ = self.sink.send(EncoderEvent::Paused);
    }

    fn resume(&mut self) {
        let _ = self.sink.send(EncoderEvent::Resumed);
    }

    fn stop(&mut self) {
        let _ = self.sink.send(EncoderEvent::Stopped);
    }
}

#[derive(Default)]
struct RecordingUploader {
    fail: AtomicBool,
    received: Mutex<Vec<(Vec<u8>, String)>>,
}

#[async_trait]
impl UploadHandler for RecordingUploader {
    async fn upload(&self, artifact: &FinishedArtifact) -> Result<Video, UploadError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(UploadError::Rejected {
                status: 503,
                body: "backend unavailable".to_string(),
            });
        }
        self.received
            .lock()
            .unwrap()
            .push((artifact.payload.to_vec(), artifact.locator.to_string()));
        Ok(Video {
            id: "video-1".to_string(),
            candidate_id: "cand-1".to_string(),
            url: "https://cdn.example.com/video-1.webm".to_string(),
            title: "Introduction".to_string(),
            duration: artifact.duration_seconds,
            created_at: Utc::now(),
        })
    }
}

fn session_with(camera: &Arc<FakeCamera>, uploader: &Arc<RecordingUploader>) -> RecordingSession {
    RecordingSession::new(camera.clone(), uploader.clone(), "video/webm")
}

async fn pump(session: &mut RecordingSession) {
    let event = session.next_event().await;
    session.handle_event(event);
}

async fn previewing_session(
    camera: &Arc<FakeCamera>,
    uploader: &Arc<RecordingUploader>,
) -> RecordingSession {
    let mut session = session_with(camera, uploader);
    assert_eq!(session.acquire().await.unwrap(), SessionState::Previewing);
    session
}

#[tokio::test]
async fn test_initial_state() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let session = session_with(&camera, &uploader);

    assert_eq!(session.state(), SessionState::NoPermission);
    assert_eq!(session.preview(), &PreviewSource::Blank);
    assert!(!session.has_device());
    assert!(session.artifact().is_none());
}

#[tokio::test]
async fn test_controls_without_device_are_noops() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = session_with(&camera, &uploader);

    assert_eq!(session.start().unwrap(), SessionState::NoPermission);
    assert_eq!(session.pause(), SessionState::NoPermission);
    assert_eq!(session.resume(), SessionState::NoPermission);
    assert_eq!(session.stop().await.unwrap(), SessionState::NoPermission);
    assert_eq!(session.discard(), SessionState::NoPermission);
    assert_eq!(session.accept().await.unwrap(), SessionState::NoPermission);

    assert!(session.artifact().is_none());
    assert!(!session.is_counting());
    assert_eq!(camera.requests(), 0);
}

#[tokio::test]
async fn test_permission_granted_binds_live_preview() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let session = previewing_session(&camera, &uploader).await;

    assert!(session.has_device());
    assert_eq!(
        session.preview(),
        &PreviewSource::Live("fake-stream-1".to_string())
    );
    assert_eq!(camera.live_tracks(), 2);
    assert_eq!(session.status_handle().get().state, SessionState::Previewing);
}

#[tokio::test]
async fn test_denied_permission_stays_without_permission() {
    let camera = Arc::new(FakeCamera::denying());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = session_with(&camera, &uploader);

    let err = session.acquire().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Capture(CaptureError::PermissionDenied)
    ));
    assert_eq!(session.state(), SessionState::NoPermission);
    assert_eq!(
        session.last_error(),
        Some(crate::capture::CAMERA_ACCESS_MESSAGE)
    );

    // The UI may still fire start; nothing happens.
    assert_eq!(session.start().unwrap(), SessionState::NoPermission);
    assert!(session.artifact().is_none());

    // No automatic retry.
    assert_eq!(camera.requests(), 1);
    assert!(!session.is_acquiring());
}

#[tokio::test]
async fn test_duplicate_permission_requests_share_one_acquisition() {
    let gate = Arc::new(Notify::new());
    let camera = Arc::new(FakeCamera::gated(gate.clone()));
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = session_with(&camera, &uploader);

    assert!(session.request_permission());
    assert!(!session.request_permission());
    assert!(session.is_acquiring());
    assert!(session.status_handle().get().acquiring);
    assert_eq!(session.state(), SessionState::NoPermission);

    gate.notify_one();
    assert_eq!(session.acquire().await.unwrap(), SessionState::Previewing);
    assert_eq!(camera.requests(), 1);
    assert!(!session.request_permission());
}

#[tokio::test]
async fn test_grant_after_teardown_is_released() {
    let gate = Arc::new(Notify::new());
    let camera = Arc::new(FakeCamera::gated(gate.clone()));
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = session_with(&camera, &uploader);

    assert!(session.request_permission());
    session.teardown();
    gate.notify_one();

    // Nothing pumps the session after teardown; the grant must not linger.
    for _ in 0..100 {
        if camera.tracks.lock().unwrap().len() == 2 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(camera.tracks.lock().unwrap().len(), 2);
    assert_eq!(camera.live_tracks(), 0);
    assert_eq!(session.state(), SessionState::NoPermission);
    assert!(!session.has_device());
    assert!(!session.request_permission());
}

#[tokio::test]
async fn test_grant_after_session_dropped_is_released() {
    let gate = Arc::new(Notify::new());
    let camera = Arc::new(FakeCamera::gated(gate.clone()));
    let uploader = Arc::new(RecordingUploader::default());

    {
        let mut session = session_with(&camera, &uploader);
        assert!(session.request_permission());
    }
    gate.notify_one();

    for _ in 0..100 {
        if camera.tracks.lock().unwrap().len() == 2 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(camera.tracks.lock().unwrap().len(), 2);
    assert_eq!(camera.live_tracks(), 0);
}

#[tokio::test]
async fn test_artifact_length_is_sum_of_chunks_across_pauses() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    assert_eq!(session.start().unwrap(), SessionState::Recording);
    camera.emit(b"aaaa");
    camera.emit(b"bbb");
    assert_eq!(session.pause(), SessionState::Paused);
    assert_eq!(session.resume(), SessionState::Recording);
    camera.emit(b"cc");
    assert_eq!(session.pause(), SessionState::Paused);
    assert_eq!(session.resume(), SessionState::Recording);
    camera.emit(b"");
    camera.emit(b"d");

    assert_eq!(session.stop().await.unwrap(), SessionState::Reviewing);
    let artifact = session.artifact().unwrap();
    assert_eq!(artifact.size(), 4 + 3 + 2 + 1);
    assert_eq!(&artifact.payload[..], b"aaaabbbccd");
    assert_eq!(artifact.chunk_count, 4);
}

#[tokio::test]
async fn test_chunks_pumped_before_stop_are_kept() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    session.start().unwrap();
    camera.emit(b"first");
    pump(&mut session).await;
    camera.emit(b"second");

    session.stop().await.unwrap();
    assert_eq!(&session.artifact().unwrap().payload[..], b"firstsecond");
}

#[tokio::test]
async fn test_stop_from_paused() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    session.start().unwrap();
    camera.emit(b"xyz");
    session.pause();
    assert_eq!(session.stop().await.unwrap(), SessionState::Reviewing);
    assert_eq!(session.artifact().unwrap().size(), 3);
}

#[tokio::test]
async fn test_stop_keeps_device_and_binds_playback() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    session.start().unwrap();
    camera.emit(b"frame");
    session.stop().await.unwrap();

    assert!(session.has_device());
    assert_eq!(camera.live_tracks(), 2);
    assert!(!session.is_counting());

    let locator = session.artifact().unwrap().locator.clone();
    assert_eq!(session.preview(), &PreviewSource::Playback(locator.clone()));
    let resolved = session.locators().resolve(locator.id()).unwrap();
    assert_eq!(&resolved.payload[..], b"frame");
    assert_eq!(resolved.mime_type, "video/webm");

    let status = session.status_handle().get();
    assert_eq!(status.state, SessionState::Reviewing);
    assert_eq!(status.artifact.unwrap().size_bytes, 5);
}

#[tokio::test]
async fn test_discard_returns_to_live_preview() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    session.start().unwrap();
    camera.emit(b"take-one");
    session.stop().await.unwrap();
    let locator = session.artifact().unwrap().locator.clone();

    assert_eq!(session.discard(), SessionState::Previewing);
    assert_eq!(
        session.preview(),
        &PreviewSource::Live("fake-stream-1".to_string())
    );
    assert!(session.artifact().is_none());
    assert!(session.locators().resolve(locator.id()).is_none());
    assert_eq!(camera.live_tracks(), 2);
    assert_eq!(camera.requests(), 1);
}

#[tokio::test]
async fn test_one_locator_per_attempt() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;
    let registry = session.locators().clone();

    session.start().unwrap();
    camera.emit(b"one");
    session.stop().await.unwrap();
    let first = session.artifact().unwrap().locator.clone();
    assert_eq!(registry.active_count(), 1);

    session.discard();
    assert_eq!(registry.active_count(), 0);

    session.start().unwrap();
    camera.emit(b"two");
    session.stop().await.unwrap();
    let second = session.artifact().unwrap().locator.clone();
    assert_ne!(first, second);
    assert_eq!(registry.active_count(), 1);
    assert!(registry.resolve(first.id()).is_none());
    assert_eq!(&registry.resolve(second.id()).unwrap().payload[..], b"two");

    session.accept().await.unwrap();
    assert_eq!(registry.active_count(), 0);
}

#[tokio::test]
async fn test_accept_hands_off_and_releases_device() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    session.start().unwrap();
    camera.emit(b"intro-");
    camera.emit(b"video");
    session.stop().await.unwrap();
    let locator = session.artifact().unwrap().locator.clone();

    assert_eq!(session.accept().await.unwrap(), SessionState::NoPermission);

    let received = uploader.received.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, b"intro-video");
    assert_eq!(received[0].1, locator.to_string());

    assert!(!session.has_device());
    assert_eq!(camera.live_tracks(), 0);
    assert!(session.artifact().is_none());
    assert!(session.locators().resolve(locator.id()).is_none());
    assert_eq!(session.preview(), &PreviewSource::Blank);

    let status = session.status_handle().get();
    assert_eq!(status.last_upload.unwrap().id, "video-1");
}

#[tokio::test]
async fn test_failed_upload_keeps_recording_for_retry() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    uploader.fail.store(true, Ordering::SeqCst);
    let mut session = previewing_session(&camera, &uploader).await;

    session.start().unwrap();
    camera.emit(b"keep-me");
    session.stop().await.unwrap();
    let locator = session.artifact().unwrap().locator.clone();

    let err = session.accept().await.unwrap_err();
    assert!(matches!(err, SessionError::Upload(_)));
    assert_eq!(session.state(), SessionState::Reviewing);
    assert!(session.has_device());
    assert_eq!(camera.live_tracks(), 2);
    assert!(session.locators().resolve(locator.id()).is_some());
    assert!(session.last_error().unwrap().contains("could not be saved"));

    uploader.fail.store(false, Ordering::SeqCst);
    assert_eq!(session.accept().await.unwrap(), SessionState::NoPermission);
    assert_eq!(uploader.received.lock().unwrap()[0].0, b"keep-me");
    assert_eq!(camera.live_tracks(), 0);
}

#[tokio::test]
async fn test_accept_and_discard_outside_review_are_ignored() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    assert_eq!(session.accept().await.unwrap(), SessionState::Previewing);
    assert_eq!(session.discard(), SessionState::Previewing);

    session.start().unwrap();
    assert_eq!(session.accept().await.unwrap(), SessionState::Recording);
    assert_eq!(session.discard(), SessionState::Recording);
    assert_eq!(session.start().unwrap(), SessionState::Recording);
    assert_eq!(session.resume(), SessionState::Recording);

    assert!(uploader.received.lock().unwrap().is_empty());
    assert_eq!(camera.live_tracks(), 2);
}

#[tokio::test]
async fn test_empty_recording_is_reported() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    session.start().unwrap();
    let err = session.stop().await.unwrap_err();
    assert!(matches!(err, SessionError::EmptyRecording));
    assert_eq!(session.state(), SessionState::Previewing);
    assert!(session.artifact().is_none());
    assert_eq!(session.locators().active_count(), 0);
    assert!(session.last_error().is_some());

    // The next attempt works as usual.
    session.start().unwrap();
    camera.emit(b"ok");
    assert_eq!(session.stop().await.unwrap(), SessionState::Reviewing);
    assert!(session.last_error().is_none());
}

#[tokio::test]
async fn test_encoder_failure_keeps_partial_recording() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    session.start().unwrap();
    camera.emit(b"partial");
    pump(&mut session).await;
    camera.send(EncoderEvent::Error("camera unplugged".to_string()));
    pump(&mut session).await;

    assert_eq!(session.state(), SessionState::Reviewing);
    assert_eq!(&session.artifact().unwrap().payload[..], b"partial");
    assert!(session.last_error().unwrap().contains("camera unplugged"));
    assert!(!session.is_counting());
}

#[tokio::test]
async fn test_encoder_failure_without_data_returns_to_preview() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    session.start().unwrap();
    camera.send(EncoderEvent::Error("no signal".to_string()));
    pump(&mut session).await;

    assert_eq!(session.state(), SessionState::Previewing);
    assert!(session.artifact().is_none());
    assert!(session.last_error().unwrap().contains("no signal"));
    assert!(session.has_device());
}

#[tokio::test]
async fn test_start_on_lost_device_allows_new_permission_request() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    camera.unplug();
    let err = session.start().unwrap_err();
    assert!(matches!(
        err,
        SessionError::Capture(CaptureError::DeviceUnavailable(_))
    ));
    assert_eq!(session.state(), SessionState::NoPermission);
    assert_eq!(session.preview(), &PreviewSource::Blank);
    assert!(!session.has_device());
    assert_eq!(
        session.last_error(),
        Some(crate::capture::CAMERA_ACCESS_MESSAGE)
    );

    assert!(session.request_permission());
    pump(&mut session).await;
    assert_eq!(session.state(), SessionState::Previewing);
    assert_eq!(
        session.preview(),
        &PreviewSource::Live("fake-stream-2".to_string())
    );
    assert_eq!(camera.requests(), 2);
}

#[tokio::test]
async fn test_track_loss_mid_recording_releases_device() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    session.start().unwrap();
    camera.emit(b"before-loss");
    pump(&mut session).await;
    camera.unplug();
    camera.send(EncoderEvent::Error("capture track ended".to_string()));
    pump(&mut session).await;

    // The partial take is still reviewable, but the dead device is gone.
    assert_eq!(session.state(), SessionState::Reviewing);
    assert_eq!(&session.artifact().unwrap().payload[..], b"before-loss");
    assert!(!session.has_device());

    assert_eq!(session.discard(), SessionState::NoPermission);
    assert_eq!(session.preview(), &PreviewSource::Blank);
    assert_eq!(session.locators().active_count(), 0);
    assert!(session.request_permission());
    pump(&mut session).await;
    assert_eq!(session.state(), SessionState::Previewing);
}

#[tokio::test]
async fn test_track_loss_without_data_needs_new_permission() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    session.start().unwrap();
    camera.unplug();
    camera.send(EncoderEvent::Error("capture track ended".to_string()));
    pump(&mut session).await;

    assert_eq!(session.state(), SessionState::NoPermission);
    assert!(!session.has_device());
    assert!(session.last_error().unwrap().contains("capture track ended"));
    assert!(session.request_permission());
}

#[tokio::test]
async fn test_encoder_pause_notifications_are_mirrored() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    session.start().unwrap();
    camera.send(EncoderEvent::Paused);
    pump(&mut session).await;
    assert_eq!(session.state(), SessionState::Paused);

    camera.send(EncoderEvent::Resumed);
    pump(&mut session).await;
    assert_eq!(session.state(), SessionState::Recording);

    // The encoder echoes our own pause; the echo is harmless.
    session.pause();
    pump(&mut session).await;
    assert_eq!(session.state(), SessionState::Paused);
}

#[tokio::test(start_paused = true)]
async fn test_elapsed_counter_excludes_paused_interval() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;
    let status = session.status_handle();

    session.start().unwrap();
    camera.emit(b"0-3s");
    tokio::time::sleep(Duration::from_secs(3)).await;
    session.pause();
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.resume();
    camera.emit(b"4-7s");
    tokio::time::sleep(Duration::from_secs(3)).await;
    session.stop().await.unwrap();

    assert_eq!(status.get().elapsed_display(), "00:06");
    let artifact = session.artifact().unwrap();
    assert_eq!(artifact.duration_seconds, 6);
    assert_eq!(&artifact.payload[..], b"0-3s4-7s");

    // Frozen after stop.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(status.get().elapsed_display(), "00:06");
}

#[tokio::test(start_paused = true)]
async fn test_elapsed_display_clears_after_review() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;
    let status = session.status_handle();

    session.start().unwrap();
    camera.emit(b"first");
    tokio::time::sleep(Duration::from_secs(2)).await;
    session.stop().await.unwrap();
    assert_eq!(status.get().elapsed_display(), "00:02");

    session.discard();
    assert_eq!(status.get().state, SessionState::Previewing);
    assert_eq!(status.get().elapsed_display(), "00:00");

    session.start().unwrap();
    camera.emit(b"second");
    tokio::time::sleep(Duration::from_secs(3)).await;
    session.stop().await.unwrap();
    assert_eq!(status.get().elapsed_display(), "00:03");

    session.accept().await.unwrap();
    assert_eq!(status.get().state, SessionState::NoPermission);
    assert_eq!(status.get().elapsed_display(), "00:00");
}

#[tokio::test]
async fn test_teardown_releases_everything() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    session.start().unwrap();
    camera.emit(b"abandoned");
    assert!(session.is_counting());

    session.teardown();
    assert_eq!(session.state(), SessionState::NoPermission);
    assert!(!session.has_device());
    assert!(!session.is_counting());
    assert_eq!(camera.live_tracks(), 0);

    session.teardown();
    assert_eq!(session.start().unwrap(), SessionState::NoPermission);
}

#[tokio::test]
async fn test_drop_releases_device_and_locator() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let registry = LocatorRegistry::default();

    {
        let mut session = previewing_session(&camera, &uploader).await;
        session = session.with_locators(registry.clone());
        session.start().unwrap();
        camera.emit(b"review-me");
        session.stop().await.unwrap();
        assert_eq!(registry.active_count(), 1);
    }

    assert_eq!(camera.live_tracks(), 0);
    assert_eq!(registry.active_count(), 0);
}

#[tokio::test]
async fn test_apply_routes_commands() {
    let camera = Arc::new(FakeCamera::default());
    let uploader = Arc::new(RecordingUploader::default());
    let mut session = previewing_session(&camera, &uploader).await;

    assert_eq!(
        session.apply(SessionCommand::Start).await.unwrap(),
        SessionState::Recording
    );
    camera.emit(b"via-commands");
    assert_eq!(
        session.apply(SessionCommand::Pause).await.unwrap(),
        SessionState::Paused
    );
    assert_eq!(
        session.apply(SessionCommand::Stop).await.unwrap(),
        SessionState::Reviewing
    );
    assert_eq!(
        session.apply(SessionCommand::Accept).await.unwrap(),
        SessionState::NoPermission
    );
    assert_eq!(SessionCommand::RequestPermission.as_str(), "permission");
}
