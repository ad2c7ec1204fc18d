use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::storage::{AudioStore, S3AudioStore};
use crate::users::store::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub store: UserStore,
    pub audio: Option<Arc<dyn AudioStore>>,
}

impl AppState {
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let store = UserStore::connect(&config.mongo).await?;

        let audio = match &config.audio {
            Some(cfg) => {
                info!(bucket = %cfg.bucket, "audio storage enabled");
                Some(Arc::new(S3AudioStore::new(cfg).await?) as Arc<dyn AudioStore>)
            }
            None => {
                warn!("MINIO_* not set; exam audio will not be stored");
                None
            }
        };

        Ok(Self::from_parts(store, audio))
    }

    pub fn from_parts(store: UserStore, audio: Option<Arc<dyn AudioStore>>) -> Self {
        Self { store, audio }
    }

    #[cfg(test)]
    pub async fn fake() -> (Self, Arc<crate::users::memory::InMemoryUsers>, Arc<FakeAudio>) {
        use crate::users::memory::InMemoryUsers;

        let users = Arc::new(InMemoryUsers::new());
        let store = UserStore::with_collection(users.clone())
            .await
            .expect("in-memory store");
        let audio = Arc::new(FakeAudio::default());

        let state = Self::from_parts(store, Some(audio.clone() as Arc<dyn AudioStore>));
        (state, users, audio)
    }
}

/// Records uploads in memory; presigned URLs point at a fake host.
#[cfg(test)]
#[derive(Default)]
pub struct FakeAudio {
    pub objects: std::sync::Mutex<Vec<(String, bytes::Bytes, String)>>,
}

#[cfg(test)]
#[async_trait::async_trait]
impl AudioStore for FakeAudio {
    async fn put_object(&self, k: &str, b: bytes::Bytes, ct: &str) -> anyhow::Result<()> {
        self.objects
            .lock()
            .unwrap()
            .push((k.to_string(), b, ct.to_string()));
        Ok(())
    }
    async fn presign_get(&self, k: &str, _s: u64) -> anyhow::Result<String> {
        Ok(format!("https://fake.local/{}", k))
    }
}
