//! In-memory credential mirror backed by [`TokenStore`].
//!
//! `TokenState` is the only writer of the credential. Every mutation goes to
//! durable storage first and updates the mirror only once the write
//! succeeded.

use crate::error::{AuthError, Result};
use crate::token_store::TokenStore;
use crate::types::Credential;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub struct TokenState {
    store: TokenStore,
    mirror: RwLock<Credential>,
}

impl TokenState {
    pub fn new(store: TokenStore) -> Self {
        Self {
            store,
            mirror: RwLock::new(Credential::empty()),
        }
    }

    /// Re-read the durable record into the mirror.
    ///
    /// A corrupted record has already been deleted by the store and hydrates
    /// as empty. Storage failures propagate.
    pub async fn hydrate(&self) -> Result<Credential> {
        let credential = match self.store.load().await {
            Ok(credential) => credential,
            Err(AuthError::TokenCorrupted(reason)) => {
                warn!(reason = %reason, "Discarded corrupted credential during hydration");
                Credential::empty()
            }
            Err(e) => return Err(e),
        };

        *self.mirror.write().await = credential.clone();
        Ok(credential)
    }

    /// True iff both tokens are present in the store right now.
    ///
    /// Re-hydrates on every call so changes made by another handle to the
    /// same key are picked up. No network I/O.
    pub async fn is_authorized(&self) -> Result<bool> {
        let authorized = self.hydrate().await?.is_complete();
        debug!(authorized, "Checked stored credential");
        Ok(authorized)
    }

    /// Persist `credential`, then mirror it.
    pub async fn save(&self, credential: Credential) -> Result<()> {
        self.store.store(&credential).await?;
        *self.mirror.write().await = credential;
        Ok(())
    }

    /// Overwrite the record with an empty credential and empty the mirror.
    pub async fn clear(&self) -> Result<()> {
        self.store.store(&Credential::empty()).await?;
        *self.mirror.write().await = Credential::empty();
        Ok(())
    }

    /// The last credential seen, without touching storage.
    pub async fn snapshot(&self) -> Credential {
        self.mirror.read().await.clone()
    }

    pub fn storage_key(&self) -> &str {
        self.store.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_store::tests::MockSecureStore;
    use std::sync::Arc;

    const KEY: &str = "BoxAuthentication";

    fn state_with(mock: &MockSecureStore) -> TokenState {
        TokenState::new(TokenStore::new(Arc::new(mock.clone()), KEY))
    }

    #[tokio::test]
    async fn test_starts_unauthorized() {
        let state = state_with(&MockSecureStore::new());
        assert!(!state.is_authorized().await.unwrap());
        assert!(state.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_authorized() {
        let mock = MockSecureStore::new();
        let state = state_with(&mock);

        state
            .save(Credential::new("AT1", "RT1").unwrap())
            .await
            .unwrap();

        assert!(state.is_authorized().await.unwrap());
        assert_eq!(state.snapshot().await.access_token(), Some("AT1"));
    }

    #[tokio::test]
    async fn test_clear_empties_store_and_mirror() {
        let mock = MockSecureStore::new();
        let state = state_with(&mock);
        state
            .save(Credential::new("AT1", "RT1").unwrap())
            .await
            .unwrap();

        state.clear().await.unwrap();

        assert!(!state.is_authorized().await.unwrap());
        assert!(state.snapshot().await.is_empty());
        let raw: serde_json::Value = serde_json::from_str(&mock.raw(KEY).await.unwrap()).unwrap();
        assert!(raw["access_token"].is_null());
        assert!(raw["refresh_token"].is_null());
    }

    #[tokio::test]
    async fn test_is_authorized_sees_external_writes() {
        let mock = MockSecureStore::new();
        let state = state_with(&mock);
        assert!(!state.is_authorized().await.unwrap());

        mock.put_raw(KEY, r#"{"access_token":"AT9","refresh_token":"RT9"}"#)
            .await;
        assert!(state.is_authorized().await.unwrap());
        assert_eq!(state.snapshot().await.refresh_token(), Some("RT9"));

        mock.put_raw(KEY, r#"{"access_token":"AT9","refresh_token":""}"#)
            .await;
        assert!(!state.is_authorized().await.unwrap());
    }

    #[tokio::test]
    async fn test_corrupted_record_hydrates_empty() {
        let mock = MockSecureStore::new();
        mock.put_raw(KEY, "][").await;
        let state = state_with(&mock);

        assert!(!state.is_authorized().await.unwrap());
        assert!(mock.raw(KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_save_clear_sequences_keep_pairs_whole() {
        let mock = MockSecureStore::new();
        let state = state_with(&mock);

        for round in 0..4 {
            if round % 2 == 0 {
                let credential =
                    Credential::new(format!("AT{round}"), format!("RT{round}")).unwrap();
                state.save(credential).await.unwrap();
            } else {
                state.clear().await.unwrap();
            }

            let raw: serde_json::Value =
                serde_json::from_str(&mock.raw(KEY).await.unwrap()).unwrap();
            assert_eq!(
                raw["access_token"].is_null(),
                raw["refresh_token"].is_null()
            );
        }
    }
}
