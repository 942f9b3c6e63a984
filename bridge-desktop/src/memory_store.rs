//! In-memory secure store for tests and ephemeral sessions.

use async_trait::async_trait;
use bridge_traits::{error::Result, storage::SecureStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// `SecureStore` backed by a process-local map.
///
/// Nothing survives a restart. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemorySecureStore {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.data.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.lock().await.is_empty()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        self.data
            .lock()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        self.data.lock().await.remove(key);
        Ok(())
    }
}
