//! Hand-off of accepted recordings.
//!
//! The session's responsibility ends once an [`UploadHandler`] confirms the
//! hand-off; until then the artifact and its locator stay alive.

pub mod http;
pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recorder::FinishedArtifact;

pub use http::HttpUploader;
pub use local::LocalDirUploader;

/// A stored candidate video, as the videos API describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub candidate_id: String,
    pub url: String,
    pub title: String,
    pub duration: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upload rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid upload response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
    #[error("failed to store recording: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives the finished artifact when the candidate accepts it.
#[async_trait]
pub trait UploadHandler: Send + Sync {
    async fn upload(&self, artifact: &FinishedArtifact) -> Result<Video, UploadError>;
}
