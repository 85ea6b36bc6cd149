//! Writes accepted recordings into a local directory.

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use tracing::info;

use super::{UploadError, UploadHandler, Video};
use crate::recorder::{extension_for, FinishedArtifact};

pub struct LocalDirUploader {
    dir: PathBuf,
    candidate_id: String,
    title: String,
}

impl LocalDirUploader {
    pub fn new(dir: impl Into<PathBuf>, candidate_id: &str, title: &str) -> Self {
        Self {
            dir: dir.into(),
            candidate_id: candidate_id.to_string(),
            title: title.to_string(),
        }
    }

    fn target_path(&self, extension: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let path = self.dir.join(format!("intro-{timestamp}.{extension}"));

        // Handle collision by appending counter
        if path.exists() {
            for i in 1..100 {
                let alt_path = self.dir.join(format!("intro-{timestamp}-{i}.{extension}"));
                if !alt_path.exists() {
                    return alt_path;
                }
            }
        }

        path
    }
}

#[async_trait]
impl UploadHandler for LocalDirUploader {
    async fn upload(&self, artifact: &FinishedArtifact) -> Result<Video, UploadError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.target_path(extension_for(&artifact.mime_type));
        tokio::fs::write(&path, &artifact.payload).await?;
        info!("Recording saved to {:?} ({} bytes)", path, artifact.size());

        Ok(Video {
            id: uuid::Uuid::new_v4().to_string(),
            candidate_id: self.candidate_id.clone(),
            url: path.to_string_lossy().into_owned(),
            title: self.title.clone(),
            duration: artifact.duration_seconds,
            created_at: Utc::now(),
        })
    }
}
