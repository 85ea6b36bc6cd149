//! Multipart upload to the REST backend's videos endpoint.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::info;

use super::{UploadError, UploadHandler, Video};
use crate::config::UploadConfig;
use crate::recorder::{extension_for, FinishedArtifact};

pub struct HttpUploader {
    client: reqwest::Client,
    base_url: String,
    candidate_id: String,
    title: String,
}

impl HttpUploader {
    pub fn new(base_url: &str, candidate_id: &str, title: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            candidate_id: candidate_id.to_string(),
            title: title.to_string(),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(&config.endpoint, &config.candidate_id, &config.title)
    }

    pub fn videos_url(&self) -> String {
        format!("{}/videos", self.base_url)
    }

    fn form(&self, artifact: &FinishedArtifact) -> Result<Form, UploadError> {
        let filename = format!("intro.{}", extension_for(&artifact.mime_type));
        let part = Part::bytes(artifact.payload.to_vec())
            .file_name(filename)
            .mime_str(&artifact.mime_type)?;

        Ok(Form::new()
            .part("file", part)
            .text("candidateId", self.candidate_id.clone())
            .text("title", self.title.clone())
            .text("duration", artifact.duration_seconds.to_string())
            .text("mimeType", artifact.mime_type.clone()))
    }
}

#[async_trait]
impl UploadHandler for HttpUploader {
    async fn upload(&self, artifact: &FinishedArtifact) -> Result<Video, UploadError> {
        let url = self.videos_url();
        info!(
            "Uploading {} byte recording ({}s) to {}",
            artifact.size(),
            artifact.duration_seconds,
            url
        );

        let response = self
            .client
            .post(&url)
            .multipart(self.form(artifact)?)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let video: Video = serde_json::from_str(&body)?;
        info!("Video {} stored at {}", video.id, video.url);
        Ok(video)
    }
}
