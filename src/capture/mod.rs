//! Capture device abstraction for camera + microphone input.
//!
//! A [`CaptureProvider`] grants a live [`MediaStream`] once the user consents.
//! The stream hands out [`Encoder`]s which report encoded chunks and
//! lifecycle notifications over a channel instead of mutating shared state.

pub mod device;
pub mod synthetic;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

pub use device::DeviceHandle;
pub use synthetic::{SyntheticConfig, SyntheticProvider};

/// Message shown to the user when the camera cannot be opened.
pub const CAMERA_ACCESS_MESSAGE: &str =
    "Unable to access your camera. Please check permissions and try again.";

/// Which media kinds a capture request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    /// The only request the recorder ever makes: camera and microphone together.
    pub const AUDIO_VIDEO: Self = Self {
        audio: true,
        video: true,
    };
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("permission to use the camera and microphone was denied")]
    PermissionDenied,
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("encoder failure: {0}")]
    Encoder(String),
}

impl CaptureError {
    /// Text suitable for a blocking message with a retry affordance.
    pub fn user_message(&self) -> String {
        match self {
            Self::PermissionDenied | Self::DeviceUnavailable(_) => {
                CAMERA_ACCESS_MESSAGE.to_string()
            }
            Self::Encoder(reason) => format!("Recording stopped unexpectedly: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    Live,
    Ended,
}

/// Notifications emitted by an encoder while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// A flushed fragment of encoded media.
    Data(Bytes),
    Paused,
    Resumed,
    /// Final notification; every `Data` for the attempt precedes it.
    Stopped,
    /// Hardware or pipeline loss mid-recording.
    Error(String),
}

/// Channel an encoder reports into. Dropping the receiving end silences it.
pub type EncoderSink = mpsc::UnboundedSender<EncoderEvent>;

/// Grants access to capture hardware after user consent.
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Waits for the platform consent prompt; there is no timeout.
    async fn acquire(
        &self,
        constraints: MediaConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError>;
}

/// A live audio/video stream backed by hardware tracks.
pub trait MediaStream: Send {
    fn id(&self) -> &str;

    fn tracks(&self) -> Vec<(TrackKind, TrackState)>;

    /// Stop every underlying hardware track. Must be idempotent.
    fn stop_tracks(&mut self);

    /// Build an encoder over this stream producing `mime_type` chunks.
    fn create_encoder(
        &self,
        mime_type: &str,
        sink: EncoderSink,
    ) -> Result<Box<dyn Encoder>, CaptureError>;
}

/// Encoder obtained from a [`MediaStream`].
///
/// Control calls are fire-and-forget; the outcome arrives as [`EncoderEvent`]s.
pub trait Encoder: Send {
    fn start(&mut self) -> Result<(), CaptureError>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
}
