use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    pub server_selection_timeout_ms: u64,
    pub max_pool_size: u32,
}

impl MongoConfig {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            server_selection_timeout_ms: 10_000,
            max_pool_size: 50,
        }
    }

    pub fn server_selection_timeout(&self) -> Duration {
        Duration::from_millis(self.server_selection_timeout_ms)
    }
}

/// S3/MinIO settings for recorded exam audio.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioStorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub mongo: MongoConfig,
    pub host: String,
    pub port: u16,
    pub audio: Option<AudioStorageConfig>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mongo = MongoConfig {
            uri: std::env::var("MONGODB_URI").context("MONGODB_URI is not set")?,
            database: std::env::var("DATABASE_NAME").context("DATABASE_NAME is not set")?,
            server_selection_timeout_ms: parse_or("MONGODB_SERVER_SELECTION_TIMEOUT_MS", 10_000),
            max_pool_size: parse_or("MONGODB_MAX_POOL_SIZE", 50),
        };

        Ok(Self {
            mongo,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_or("APP_PORT", 8080),
            audio: audio_from_env(),
        })
    }
}

/// Audio storage is enabled only when endpoint, bucket and both keys are present.
fn audio_from_env() -> Option<AudioStorageConfig> {
    let endpoint = std::env::var("MINIO_ENDPOINT").ok()?;
    let bucket = std::env::var("MINIO_BUCKET").ok()?;
    let access_key = std::env::var("MINIO_ACCESS_KEY").ok()?;
    let secret_key = std::env::var("MINIO_SECRET_KEY").ok()?;
    Some(AudioStorageConfig {
        endpoint,
        bucket,
        access_key,
        secret_key,
        region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".into()),
    })
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct TranscribeConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl TranscribeConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            api_key: std::env::var("OPENAI_KEY").context("OPENAI_KEY is not set")?,
            model: std::env::var("OPENAI_TRANSCRIBE_MODEL").unwrap_or_else(|_| "whisper-1".into()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
        })
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn parse_or_falls_back_on_garbage() {
        std::env::set_var("SEESAY_TEST_BAD_NUMBER", "not-a-number");
        assert_eq!(parse_or("SEESAY_TEST_BAD_NUMBER", 42u32), 42);
        std::env::set_var("SEESAY_TEST_GOOD_NUMBER", "7");
        assert_eq!(parse_or("SEESAY_TEST_GOOD_NUMBER", 42u32), 7);
    }

    #[test]
    fn mongo_defaults_match_driver_settings() {
        let cfg = MongoConfig::new("mongodb://localhost:27017", "seesay");
        assert_eq!(cfg.server_selection_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.max_pool_size, 50);
    }
}
