//! Durable credential storage
//!
//! The credential is kept as one JSON record under a single key (by default
//! `BoxAuthentication`):
//!
//! ```json
//! { "access_token": "...", "refresh_token": "..." }
//! ```
//!
//! The record is overwritten wholesale on every update. A cleared credential
//! is written as `null` fields rather than deleted, so readers written
//! against the same key see "signed out" instead of "never signed in".
//!
//! ## Security
//!
//! - Token values are never logged or put in error messages
//! - A record that fails to parse is deleted and reported as
//!   [`AuthError::TokenCorrupted`]
//! - A record holding only one token (written by something other than this
//!   crate) is read back as empty

use crate::error::{AuthError, Result};
use crate::types::Credential;
use bridge_traits::storage::SecureStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reads and writes the credential record in a [`SecureStore`].
#[derive(Clone)]
pub struct TokenStore {
    secure_store: Arc<dyn SecureStore>,
    key: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCredential {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenStore {
    /// # Arguments
    ///
    /// * `secure_store` - Platform secure storage implementation
    /// * `key` - Key the credential record lives under
    pub fn new(secure_store: Arc<dyn SecureStore>, key: impl Into<String>) -> Self {
        Self {
            secure_store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Overwrite the stored record with `credential`.
    pub async fn store(&self, credential: &Credential) -> Result<()> {
        let stored = StoredCredential {
            access_token: credential.access_token().map(str::to_string),
            refresh_token: credential.refresh_token().map(str::to_string),
        };

        let json = serde_json::to_vec(&stored).map_err(|e| {
            AuthError::InvalidCredential(format!("failed to serialize credential: {}", e))
        })?;

        self.secure_store
            .set_secret(&self.key, &json)
            .await
            .map_err(|e| {
                warn!(key = %self.key, error = %e, "Failed to write credential");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(
            key = %self.key,
            complete = credential.is_complete(),
            "Credential stored"
        );
        Ok(())
    }

    /// Read the stored record.
    ///
    /// # Returns
    ///
    /// - `Ok(credential)`; empty when the key is missing, `null`, or holds a
    ///   lone token
    /// - `Err(TokenCorrupted)` when the record is not valid JSON (the key is
    ///   deleted first)
    /// - `Err(SecureStorageUnavailable)` when the store fails
    pub async fn load(&self) -> Result<Credential> {
        let data = self.secure_store.get_secret(&self.key).await.map_err(|e| {
            warn!(key = %self.key, error = %e, "Failed to read credential");
            AuthError::SecureStorageUnavailable(e.to_string())
        })?;

        let Some(data) = data else {
            debug!(key = %self.key, "No credential stored");
            return Ok(Credential::empty());
        };

        let stored: Option<StoredCredential> = match serde_json::from_slice(&data) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Stored credential is corrupted, deleting it");

                if let Err(delete_err) = self.secure_store.delete_secret(&self.key).await {
                    warn!(
                        key = %self.key,
                        error = %delete_err,
                        "Failed to delete corrupted credential"
                    );
                }

                return Err(AuthError::TokenCorrupted(e.to_string()));
            }
        };

        let stored = stored.unwrap_or_default();
        match Credential::from_parts(stored.access_token, stored.refresh_token) {
            Ok(credential) => {
                debug!(
                    key = %self.key,
                    complete = credential.is_complete(),
                    "Credential loaded"
                );
                Ok(credential)
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Stored credential is incomplete, treating as empty");
                Ok(Credential::empty())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory `SecureStore` shared by the core-auth tests.
    #[derive(Clone, Default)]
    pub(crate) struct MockSecureStore {
        pub(crate) data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockSecureStore {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) async fn raw(&self, key: &str) -> Option<String> {
            self.data
                .lock()
                .await
                .get(key)
                .map(|bytes| String::from_utf8_lossy(bytes).to_string())
        }

        pub(crate) async fn put_raw(&self, key: &str, value: &str) {
            self.data
                .lock()
                .await
                .insert(key.to_string(), value.as_bytes().to_vec());
        }
    }

    #[async_trait]
    impl SecureStore for MockSecureStore {
        async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
            self.data
                .lock()
                .await
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(self.data.lock().await.get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
            self.data.lock().await.remove(key);
            Ok(())
        }
    }

    struct UnavailableStore;

    #[async_trait]
    impl SecureStore for UnavailableStore {
        async fn set_secret(&self, _key: &str, _value: &[u8]) -> BridgeResult<()> {
            Err(BridgeError::NotAvailable("keychain locked".to_string()))
        }

        async fn get_secret(&self, _key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Err(BridgeError::NotAvailable("keychain locked".to_string()))
        }

        async fn delete_secret(&self, _key: &str) -> BridgeResult<()> {
            Err(BridgeError::NotAvailable("keychain locked".to_string()))
        }
    }

    const KEY: &str = "BoxAuthentication";

    fn store_with(mock: &MockSecureStore) -> TokenStore {
        TokenStore::new(Arc::new(mock.clone()), KEY)
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let mock = MockSecureStore::new();
        let store = store_with(&mock);

        let credential = Credential::new("AT1", "RT1").unwrap();
        store.store(&credential).await.unwrap();

        assert_eq!(store.load().await.unwrap(), credential);
    }

    #[tokio::test]
    async fn test_record_layout() {
        let mock = MockSecureStore::new();
        let store = store_with(&mock);

        store
            .store(&Credential::new("AT1", "RT1").unwrap())
            .await
            .unwrap();
        let raw: serde_json::Value = serde_json::from_str(&mock.raw(KEY).await.unwrap()).unwrap();
        assert_eq!(raw["access_token"], "AT1");
        assert_eq!(raw["refresh_token"], "RT1");

        store.store(&Credential::empty()).await.unwrap();
        let raw: serde_json::Value = serde_json::from_str(&mock.raw(KEY).await.unwrap()).unwrap();
        assert!(raw["access_token"].is_null());
        assert!(raw["refresh_token"].is_null());
    }

    #[tokio::test]
    async fn test_load_missing_key_is_empty() {
        let store = store_with(&MockSecureStore::new());
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_null_record_is_empty() {
        let mock = MockSecureStore::new();
        mock.put_raw(KEY, "null").await;
        assert!(store_with(&mock).load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_lone_token_is_empty() {
        let mock = MockSecureStore::new();
        mock.put_raw(KEY, r#"{"access_token":"AT1","refresh_token":null}"#)
            .await;
        assert!(store_with(&mock).load().await.unwrap().is_empty());

        mock.put_raw(KEY, r#"{"access_token":"","refresh_token":"RT1"}"#)
            .await;
        assert!(store_with(&mock).load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupted_deletes_record() {
        let mock = MockSecureStore::new();
        mock.put_raw(KEY, "{not json").await;
        let store = store_with(&mock);

        let result = store.load().await;
        assert!(matches!(result, Err(AuthError::TokenCorrupted(_))));
        assert!(mock.raw(KEY).await.is_none());

        // A second read sees a clean slate
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store_surfaces_error() {
        let store = TokenStore::new(Arc::new(UnavailableStore), KEY);
        assert!(matches!(
            store.load().await,
            Err(AuthError::SecureStorageUnavailable(_))
        ));
        assert!(matches!(
            store.store(&Credential::empty()).await,
            Err(AuthError::SecureStorageUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_key() {
        let mock = MockSecureStore::new();
        let store = TokenStore::new(Arc::new(mock.clone()), "OtherKey");
        store
            .store(&Credential::new("AT1", "RT1").unwrap())
            .await
            .unwrap();

        assert_eq!(store.key(), "OtherKey");
        assert!(mock.raw("OtherKey").await.is_some());
        assert!(mock.raw(KEY).await.is_none());
    }
}
