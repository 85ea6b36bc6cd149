//! Session state and the shared status handle read by the API.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::artifact::{ArtifactSummary, Locator};
use super::clock::format_elapsed;
use crate::upload::Video;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoPermission,
    Previewing,
    Recording,
    Paused,
    Reviewing,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoPermission => "no_permission",
            Self::Previewing => "previewing",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Reviewing => "reviewing",
        }
    }

    /// Whether an encoder is running for the current attempt.
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }
}

/// What the preview surface is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum PreviewSource {
    /// Permission prompt, nothing to show.
    Blank,
    /// The live capture stream, by stream id.
    Live(String),
    /// Playback of the finished artifact.
    Playback(Locator),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub acquiring: bool,
    pub preview: PreviewSource,
    pub elapsed_seconds: u64,
    pub artifact: Option<ArtifactSummary>,
    pub last_error: Option<String>,
    pub last_upload: Option<Video>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::NoPermission,
            acquiring: false,
            preview: PreviewSource::Blank,
            elapsed_seconds: 0,
            artifact: None,
            last_error: None,
            last_upload: None,
        }
    }
}

impl SessionStatus {
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed_seconds)
    }
}

/// Cloneable read side of a session's status.
#[derive(Clone)]
pub struct SessionStatusHandle {
    status: watch::Receiver<SessionStatus>,
    elapsed: watch::Receiver<u64>,
}

impl SessionStatusHandle {
    pub(crate) fn new(status: watch::Receiver<SessionStatus>, elapsed: watch::Receiver<u64>) -> Self {
        Self { status, elapsed }
    }

    pub fn get(&self) -> SessionStatus {
        let mut status = self.status.borrow().clone();
        status.elapsed_seconds = *self.elapsed.borrow();
        status
    }

    /// Wait until the session publishes a new status.
    pub async fn changed(&mut self) -> bool {
        self.status.changed().await.is_ok()
    }
}
