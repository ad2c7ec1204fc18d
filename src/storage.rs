use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use uuid::Uuid;

use crate::config::AudioStorageConfig;

/// Presigned audio links stay valid for 30 minutes.
pub const PRESIGN_TTL_SECS: u64 = 30 * 60;

/// Object storage for recorded exam audio.
#[async_trait]
pub trait AudioStore: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String>;
}

/// MinIO-backed [`AudioStore`]; path-style addressing against a fixed endpoint.
#[derive(Clone)]
pub struct S3AudioStore {
    client: Client,
    bucket: String,
}

impl S3AudioStore {
    pub async fn new(cfg: &AudioStorageConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(!cfg.bucket.is_empty(), "MINIO_BUCKET is empty");
        let creds = Credentials::new(&cfg.access_key, &cfg.secret_key, None, None, "minio");
        let sdk = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(creds)
            .load()
            .await;

        let s3 = S3ConfigBuilder::from(&sdk)
            .endpoint_url(cfg.endpoint.trim_end_matches('/'))
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(s3),
            bucket: cfg.bucket.clone(),
        })
    }
}

#[async_trait]
impl AudioStore for S3AudioStore {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("upload {} to bucket {}", key, self.bucket))?;
        tracing::debug!(key, size, "audio stored");
        Ok(())
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        let expiry = PresigningConfig::expires_in(Duration::from_secs(seconds))?;
        let signed = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(expiry)
            .await
            .with_context(|| format!("sign link for {}", key))?;
        Ok(signed.uri().to_string())
    }
}

/// Object key for a new recording: `audio/<user_id>/<uuid>.<ext>`.
pub fn audio_key(user_id: &str, content_type: &str) -> String {
    let ext = ext_from_mime(content_type).unwrap_or("bin");
    format!("audio/{}/{}.{}", user_id, Uuid::new_v4(), ext)
}

/// Uploads a recording and returns the key to store in `audioFile`.
pub async fn upload_audio(
    store: &dyn AudioStore,
    user_id: &str,
    body: Bytes,
    content_type: &str,
) -> anyhow::Result<String> {
    anyhow::ensure!(!body.is_empty(), "empty audio payload");
    let key = audio_key(user_id, content_type);
    store
        .put_object(&key, body, content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(key)
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    // strip codec parameters such as `audio/webm;codecs=opus`
    match ct.split(';').next().unwrap_or(ct).trim() {
        "audio/webm" => Some("webm"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        "audio/ogg" => Some("ogg"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        _ => None,
    }
}
