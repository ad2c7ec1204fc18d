use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::TranscribeConfig;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("transcription API key is empty")]
    MissingKey,

    #[error("failed to read audio file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transcription request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transcription API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Client for an OpenAI-compatible `/audio/transcriptions` endpoint.
#[derive(Clone)]
pub struct TranscriptionClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl TranscriptionClient {
    pub fn new(cfg: TranscribeConfig) -> Result<Self, TranscribeError> {
        if cfg.api_key.trim().is_empty() {
            return Err(TranscribeError::MissingKey);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            api_key: cfg.api_key,
            model: cfg.model,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Uploads the file and returns the transcript text.
    pub async fn transcribe_file(&self, path: &Path) -> Result<String, TranscribeError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| TranscribeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".into());
        debug!(file = %file_name, size = bytes.len(), model = %self.model, "uploading audio");

        let form = Form::new()
            .text("model", self.model.clone())
            .part("file", Part::bytes(bytes).file_name(file_name));

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscribeError::Status { status, body });
        }

        let result: TranscriptionResponse = response.json().await?;
        info!(chars = result.text.len(), "transcription received");
        Ok(result.text)
    }
}
