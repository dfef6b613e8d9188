//! Memcached-backed session and admission flags
//!
//! The `memcache` client is blocking, so every call runs on the blocking
//! pool. The connection is only opened on first use: a disconnect event never
//! reads a flag and must not fail because the cache is down.

use super::{KeyValueStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

pub struct MemcacheStore {
    url: String,
    client: OnceCell<Arc<memcache::Client>>,
}

impl MemcacheStore {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<Arc<memcache::Client>, StoreError> {
        self.client
            .get_or_try_init(|| async {
                let url = self.url.clone();
                debug!("Connecting to {}", url);
                let client = tokio::task::spawn_blocking(move || memcache::connect(url.as_str()))
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                Ok::<_, StoreError>(Arc::new(client))
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemcacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let client = self.client().await?;
        let key = key.to_string();

        // Raw bytes: a value that is not UTF-8 is still a stored value
        let raw = tokio::task::spawn_blocking(move || client.get::<Vec<u8>>(&key))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(decode_value(raw))
    }
}

fn decode_value(raw: Option<Vec<u8>>) -> Option<String> {
    raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
