//! Scoped ownership of a granted capture stream.

use std::fmt;
use tracing::{debug, info};

use super::{CaptureError, Encoder, EncoderSink, MediaStream, TrackKind, TrackState};

/// Exclusive handle on the camera and microphone.
///
/// Releasing the handle stops every hardware track. A handle that is dropped
/// without an explicit [`release`](Self::release) stops its tracks as well, so
/// a grant that arrives after its session is gone never leaves the camera on.
pub struct DeviceHandle {
    stream: Box<dyn MediaStream>,
    released: bool,
}

impl DeviceHandle {
    pub fn new(stream: Box<dyn MediaStream>) -> Self {
        Self {
            stream,
            released: false,
        }
    }

    pub fn stream_id(&self) -> &str {
        self.stream.id()
    }

    pub fn tracks(&self) -> Vec<(TrackKind, TrackState)> {
        self.stream.tracks()
    }

    pub fn is_live(&self) -> bool {
        self.tracks()
            .iter()
            .any(|(_, state)| *state == TrackState::Live)
    }

    pub fn create_encoder(
        &self,
        mime_type: &str,
        sink: EncoderSink,
    ) -> Result<Box<dyn Encoder>, CaptureError> {
        if !self.is_live() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "stream {} has no live tracks",
                self.stream_id()
            )));
        }
        self.stream.create_encoder(mime_type, sink)
    }

    /// Stop all hardware tracks and give up the device.
    pub fn release(mut self) {
        self.stop_tracks();
    }

    fn stop_tracks(&mut self) {
        if self.released {
            return;
        }
        self.stream.stop_tracks();
        self.released = true;
        info!("Capture device released (stream {})", self.stream.id());
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("stream", &self.stream.id())
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if !self.released {
            debug!("Dropping unreleased DeviceHandle, stopping tracks");
            self.stop_tracks();
        }
    }
}
