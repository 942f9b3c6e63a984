//! # Authentication Manager
//!
//! Orchestrates the Box authorization-code flow, token refresh and
//! revocation on top of [`TokenState`], [`ConsentBroker`] and
//! [`OAuthFlowManager`], emitting auth events to the application's event bus.
//!
//! ## Concurrency
//!
//! - At most one authorization attempt is in flight. Callers arriving while
//!   one is pending await the same shared outcome; only one popup is opened
//!   and only one code exchange is sent.
//! - Refreshes are serialized. [`AuthManager::refresh_rejected`] skips the
//!   network when another caller already replaced the rejected token.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{AuthManager, ConsentBroker, OAuthFlowManager, TokenState, TokenStore};
//! use core_runtime::config::BoxSettings;
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//! # use bridge_traits::{ConsentWindow, HttpClient, SecureStore};
//!
//! # async fn example() -> core_auth::Result<()> {
//! # let http_client: Arc<dyn HttpClient> = todo!();
//! # let secure_store: Arc<dyn SecureStore> = todo!();
//! # let window: Arc<dyn ConsentWindow> = todo!();
//! let settings = BoxSettings::new("client-id", "client-secret", "https://app.example.com");
//! let token_state = Arc::new(TokenState::new(TokenStore::new(
//!     secure_store,
//!     settings.storage_key.clone(),
//! )));
//!
//! let manager = AuthManager::new(
//!     OAuthFlowManager::new(settings, http_client),
//!     token_state,
//!     ConsentBroker::new(),
//!     window,
//!     EventBus::new(100),
//! );
//!
//! manager.ensure_authorized().await?;
//! # Ok(())
//! # }
//! ```

use crate::consent::{AuthorizationReturned, ConsentBroker, ConsentListener, ConsentRequestId};
use crate::error::{AuthError, Result};
use crate::oauth::OAuthFlowManager;
use crate::token_state::TokenState;
use crate::types::AuthState;
use async_trait::async_trait;
use bridge_traits::window::{ConsentWindow, WindowRequest};
use core_runtime::config::StateValidation;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

type SharedOutcome = Shared<BoxFuture<'static, Result<()>>>;

/// The authorization attempt every concurrent caller awaits.
struct PendingExchange {
    generation: u64,
    request_id: ConsentRequestId,
    outcome: SharedOutcome,
}

/// Source of access tokens for data-access code.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Make sure a complete credential is stored, prompting if necessary.
    async fn ensure_authorized(&self) -> Result<()>;

    /// The stored access token.
    async fn access_token(&self) -> Result<String>;

    /// Refresh after `rejected_token` was answered with 401.
    async fn refresh_rejected(&self, rejected_token: &str) -> Result<()>;
}

struct Inner {
    flow: OAuthFlowManager,
    token_state: Arc<TokenState>,
    broker: ConsentBroker,
    window: Arc<dyn ConsentWindow>,
    event_bus: EventBus,
    state: RwLock<AuthState>,
    pending: Mutex<Option<PendingExchange>>,
    generation: AtomicU64,
    refresh_lock: Mutex<()>,
}

/// Box authorization orchestrator. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AuthManager {
    inner: Arc<Inner>,
}

impl AuthManager {
    /// # Arguments
    ///
    /// * `flow` - Builds consent URLs and performs token requests
    /// * `token_state` - Sole writer of the stored credential
    /// * `broker` - Routes authorization-returned signals to attempts
    /// * `window` - Host popup facility
    /// * `event_bus` - Event bus for emitting authentication events
    pub fn new(
        flow: OAuthFlowManager,
        token_state: Arc<TokenState>,
        broker: ConsentBroker,
        window: Arc<dyn ConsentWindow>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                flow,
                token_state,
                broker,
                window,
                event_bus,
                state: RwLock::new(AuthState::Unauthorized),
                pending: Mutex::new(None),
                generation: AtomicU64::new(0),
                refresh_lock: Mutex::new(()),
            }),
        }
    }

    pub async fn state(&self) -> AuthState {
        *self.inner.state.read().await
    }

    pub fn broker(&self) -> &ConsentBroker {
        &self.inner.broker
    }

    pub fn token_state(&self) -> &Arc<TokenState> {
        &self.inner.token_state
    }

    /// True iff both tokens are in the store. No network I/O.
    pub async fn is_authorized(&self) -> Result<bool> {
        self.inner.token_state.is_authorized().await
    }

    /// Resolve once a complete credential is stored.
    ///
    /// Opens the consent popup when the store is empty. A call made while an
    /// attempt is pending joins it instead of starting another. The attempt
    /// keeps running if every caller is dropped.
    ///
    /// # Errors
    ///
    /// - `ConsentDenied` - the user denied or closed the popup, the popup
    ///   could not be opened, the attempt was cancelled or timed out
    /// - `StateMismatch` - state validation is enforced and the returned
    ///   state differs
    /// - `ExchangeFailed` - the backend rejected the code
    #[instrument(skip(self))]
    pub async fn ensure_authorized(&self) -> Result<()> {
        let outcome = {
            let mut slot = self.inner.pending.lock().await;

            if let Some(pending) = slot.as_ref() {
                debug!(request_id = %pending.request_id, "Joining pending authorization");
                pending.outcome.clone()
            } else {
                if self.inner.token_state.is_authorized().await? {
                    self.inner.set_state(AuthState::Authorized).await;
                    return Ok(());
                }

                let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let (request_id, listener) = self.inner.broker.register();
                let inner = Arc::clone(&self.inner);

                // The attempt runs on its own task so a code delivered after
                // every caller went away is still exchanged.
                let task = tokio::spawn(async move {
                    let result = inner.run_attempt(listener).await;
                    inner.release_pending(generation).await;
                    result
                });
                let outcome = async move {
                    task.await.unwrap_or_else(|e| {
                        error!(error = %e, "Authorization task did not complete");
                        Err(AuthError::consent_denied(format!(
                            "authorization task aborted: {}",
                            e
                        )))
                    })
                }
                .boxed()
                .shared();

                info!(request_id = %request_id, "Starting authorization attempt");
                *slot = Some(PendingExchange {
                    generation,
                    request_id,
                    outcome: outcome.clone(),
                });
                outcome
            }
        };

        outcome.await
    }

    /// Abandon the pending authorization attempt.
    ///
    /// Every caller waiting on it fails with `ConsentDenied`. Returns `false`
    /// when there is nothing to cancel or the consent page already answered.
    pub async fn cancel_authorization(&self) -> bool {
        let mut slot = self.inner.pending.lock().await;

        let cancelled = slot
            .as_ref()
            .map(|pending| self.inner.broker.cancel(&pending.request_id))
            .unwrap_or(false);

        if cancelled {
            if let Some(pending) = slot.take() {
                info!(request_id = %pending.request_id, "Authorization attempt cancelled");
            }
        }
        cancelled
    }

    /// The stored access token.
    pub async fn access_token(&self) -> Result<String> {
        self.inner
            .token_state
            .hydrate()
            .await?
            .access_token()
            .map(str::to_string)
            .ok_or(AuthError::NotAuthorized)
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// # Errors
    ///
    /// - `NotAuthorized` - no refresh token is stored; nothing is sent and
    ///   the store is left alone
    /// - `RefreshFailed` - the backend refused or the response was unusable;
    ///   the stored credential has been cleared
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        self.inner.refresh(None).await
    }

    /// Refresh after a 401 on `rejected_token`.
    ///
    /// If the stored access token is no longer `rejected_token` another
    /// caller already refreshed, and this returns without a request.
    #[instrument(skip(self, rejected_token))]
    pub async fn refresh_rejected(&self, rejected_token: &str) -> Result<()> {
        self.inner.refresh(Some(rejected_token)).await
    }

    /// Ask Box to revoke the stored access token in the background.
    ///
    /// Returns the task handle, or `None` when no complete credential is
    /// stored. The request outcome is only logged. Storage is untouched.
    #[instrument(skip(self))]
    pub async fn revoke(&self) -> Option<JoinHandle<()>> {
        let credential = match self.inner.token_state.hydrate().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "Could not read credential for revocation");
                return None;
            }
        };

        if !credential.is_complete() {
            debug!("No complete credential to revoke");
            return None;
        }
        let token = credential.access_token()?.to_string();

        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            match inner.flow.revoke_token(&token).await {
                Ok(()) => info!("Access token revoked"),
                Err(e) => warn!(error = %e, "Token revocation failed"),
            }
        }))
    }

    /// Revoke, then clear the stored credential.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<Option<JoinHandle<()>>> {
        let handle = self.revoke().await;
        self.inner.token_state.clear().await?;
        self.inner.set_state(AuthState::Unauthorized).await;
        self.inner.emit(AuthEvent::SignedOut);
        info!("Signed out");
        Ok(handle)
    }
}

impl Inner {
    async fn set_state(&self, state: AuthState) {
        let mut current = self.state.write().await;
        let previous = *current;
        if previous != state {
            debug!(from = %previous, to = %state, "Auth state changed");
            *current = state;
        }
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }

    async fn release_pending(&self, generation: u64) {
        let mut slot = self.pending.lock().await;
        if slot.as_ref().map(|p| p.generation) == Some(generation) {
            *slot = None;
        }
    }

    async fn run_attempt(&self, listener: ConsentListener) -> Result<()> {
        let result = self.attempt(listener).await;

        if let Err(e) = &result {
            error!(error = %e, "Authorization attempt failed");
            self.set_state(AuthState::Unauthorized).await;
            self.emit(AuthEvent::AuthError {
                message: e.to_string(),
                requires_consent: e.requires_consent(),
            });
        }
        result
    }

    async fn attempt(&self, listener: ConsentListener) -> Result<()> {
        let settings = self.flow.settings();
        let request = self.flow.authorization_request_for(listener.id().clone());
        let url = self.flow.authorize_url(&request)?;

        self.set_state(AuthState::AwaitingUserConsent).await;
        self.emit(AuthEvent::ConsentRequested {
            request_id: request.request_id.to_string(),
        });

        let window_request = WindowRequest {
            url,
            name: settings.popup_name.clone(),
            features: settings.popup_features.clone(),
            correlation_id: request.request_id.to_string(),
        };

        if let Err(e) = self.window.open(&window_request).await {
            warn!(error = %e, "Consent window could not be opened");
            return Err(AuthError::consent_denied(format!(
                "consent window unavailable: {}",
                e
            )));
        }

        let signal = match settings.consent_timeout {
            Some(limit) => timeout(limit, listener.wait()).await.map_err(|_| {
                warn!(timeout_secs = limit.as_secs(), "Timed out waiting for consent");
                AuthError::consent_denied("timed out waiting for consent")
            })??,
            None => listener.wait().await?,
        };

        let (code, returned_state) = match signal {
            AuthorizationReturned::Code { code, state } => (code, state),
            AuthorizationReturned::Denied { reason } => {
                info!(reason = %reason, "User did not grant consent");
                return Err(AuthError::consent_denied(reason));
            }
        };

        if code.is_empty() {
            return Err(AuthError::consent_denied("empty authorization code"));
        }

        if settings.state_validation == StateValidation::Enforce
            && returned_state.as_deref() != Some(request.state.as_str())
        {
            warn!(request_id = %request.request_id, "Returned state does not match");
            return Err(AuthError::StateMismatch);
        }

        self.set_state(AuthState::ExchangingCode).await;
        let credential = self.flow.exchange_code(&code).await?;
        self.token_state.save(credential).await?;

        self.set_state(AuthState::Authorized).await;
        self.emit(AuthEvent::SignedIn);
        info!(request_id = %request.request_id, "Authorization completed");
        Ok(())
    }

    async fn refresh(&self, rejected_token: Option<&str>) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        let credential = self.token_state.hydrate().await?;

        if let Some(rejected) = rejected_token {
            if credential.is_complete() && credential.access_token() != Some(rejected) {
                debug!("Credential was refreshed by another caller");
                return Ok(());
            }
        }

        let Some(refresh_token) = credential.refresh_token() else {
            warn!("Refresh requested without a stored refresh token");
            return Err(AuthError::NotAuthorized);
        };

        self.emit(AuthEvent::TokenRefreshing);

        match self.flow.refresh(refresh_token).await {
            Ok(renewed) => {
                self.token_state.save(renewed).await?;
                self.set_state(AuthState::Authorized).await;
                self.emit(AuthEvent::TokenRefreshed);
                Ok(())
            }
            Err(e) => {
                if let Err(clear_err) = self.token_state.clear().await {
                    error!(error = %clear_err, "Failed to clear credential after refresh failure");
                }
                self.set_state(AuthState::Unauthorized).await;
                self.emit(AuthEvent::CredentialsCleared {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

#[async_trait]
impl TokenProvider for AuthManager {
    async fn ensure_authorized(&self) -> Result<()> {
        AuthManager::ensure_authorized(self).await
    }

    async fn access_token(&self) -> Result<String> {
        AuthManager::access_token(self).await
    }

    async fn refresh_rejected(&self, rejected_token: &str) -> Result<()> {
        AuthManager::refresh_rejected(self, rejected_token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::tests::{settings, ScriptedHttpClient};
    use crate::token_store::tests::MockSecureStore;
    use crate::token_store::TokenStore;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use core_runtime::config::{BoxSettings, StateToken};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::Notify;

    const KEY: &str = "BoxAuthentication";

    /// Records every open request; optionally answers straight away.
    #[derive(Default)]
    struct RecordingWindow {
        opened: std::sync::Mutex<Vec<WindowRequest>>,
        notify: Notify,
        auto_reply: std::sync::Mutex<Option<(ConsentBroker, AuthorizationReturned)>>,
        fail: bool,
    }

    impl RecordingWindow {
        fn answering(broker: &ConsentBroker, signal: AuthorizationReturned) -> Self {
            Self {
                auto_reply: std::sync::Mutex::new(Some((broker.clone(), signal))),
                ..Default::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn requests(&self) -> Vec<WindowRequest> {
            self.opened.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConsentWindow for RecordingWindow {
        async fn open(&self, request: &WindowRequest) -> BridgeResult<()> {
            if self.fail {
                return Err(BridgeError::WindowUnavailable("popup blocked".to_string()));
            }
            self.opened.lock().unwrap().push(request.clone());
            if let Some((broker, signal)) = self.auto_reply.lock().unwrap().clone() {
                broker.deliver(&ConsentRequestId::from(request.correlation_id.as_str()), signal);
            }
            self.notify.notify_one();
            Ok(())
        }
    }

    struct Harness {
        manager: AuthManager,
        http: Arc<ScriptedHttpClient>,
        store: MockSecureStore,
        window: Arc<RecordingWindow>,
        bus: EventBus,
    }

    fn harness_with(
        settings: BoxSettings,
        broker: ConsentBroker,
        window: RecordingWindow,
    ) -> Harness {
        let http = Arc::new(ScriptedHttpClient::new());
        let store = MockSecureStore::new();
        let window = Arc::new(window);
        let bus = EventBus::new(32);
        let token_state = Arc::new(TokenState::new(TokenStore::new(
            Arc::new(store.clone()),
            KEY,
        )));

        let manager = AuthManager::new(
            OAuthFlowManager::new(settings, http.clone()),
            token_state,
            broker,
            window.clone(),
            bus.clone(),
        );

        Harness {
            manager,
            http,
            store,
            window,
            bus,
        }
    }

    fn answering_harness(signal: AuthorizationReturned) -> Harness {
        let broker = ConsentBroker::new();
        let window = RecordingWindow::answering(&broker, signal);
        harness_with(settings(), broker, window)
    }

    async fn seed(store: &MockSecureStore, access: &str, refresh: &str) {
        store
            .put_raw(
                KEY,
                &json!({"access_token": access, "refresh_token": refresh}).to_string(),
            )
            .await;
    }

    async fn stored(store: &MockSecureStore) -> serde_json::Value {
        serde_json::from_str(&store.raw(KEY).await.unwrap()).unwrap()
    }

    fn grant(access: &str, refresh: &str) -> serde_json::Value {
        json!({"data": {"access_token": access, "refresh_token": refresh, "expires_in": 3600}})
    }

    #[tokio::test]
    async fn test_already_authorized_skips_popup() {
        let h = answering_harness(AuthorizationReturned::code("abc123"));
        seed(&h.store, "AT1", "RT1").await;

        h.manager.ensure_authorized().await.unwrap();

        assert!(h.window.requests().is_empty());
        assert_eq!(h.http.request_count().await, 0);
        assert_eq!(h.manager.state().await, AuthState::Authorized);
    }

    #[tokio::test]
    async fn test_consent_then_exchange() {
        let h = answering_harness(AuthorizationReturned::code("abc123"));
        h.http.push_json(200, grant("AT1", "RT1")).await;
        let mut events = h.bus.subscribe();

        h.manager.ensure_authorized().await.unwrap();

        let requests = h.window.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].name, "Box Authentication");
        assert_eq!(requests[0].features, "height=500,width=500");
        assert!(requests[0].url.contains("response_type=code"));
        assert!(requests[0].url.contains("state=onTarget"));

        let sent = h.http.requests.lock().await;
        let body: serde_json::Value = sent[0].json_body().unwrap();
        assert_eq!(body["code"], "abc123");
        drop(sent);

        let record = stored(&h.store).await;
        assert_eq!(record["access_token"], "AT1");
        assert_eq!(record["refresh_token"], "RT1");
        assert_eq!(h.manager.state().await, AuthState::Authorized);
        assert_eq!(h.manager.broker().pending_count(), 0);

        let mut saw_signed_in = false;
        while let Ok(event) = events.try_recv() {
            if event == CoreEvent::Auth(AuthEvent::SignedIn) {
                saw_signed_in = true;
            }
        }
        assert!(saw_signed_in);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_attempt() {
        let broker = ConsentBroker::new();
        let h = harness_with(settings(), broker.clone(), RecordingWindow::default());
        h.http.push_json(200, grant("AT1", "RT1")).await;

        let deliver = async {
            h.window.notify.notified().await;
            let id = h.window.requests()[0].correlation_id.clone();
            assert!(broker.deliver(
                &ConsentRequestId::from(id.as_str()),
                AuthorizationReturned::code("abc123"),
            ));
        };

        let (first, second, ()) = tokio::join!(
            h.manager.ensure_authorized(),
            h.manager.ensure_authorized(),
            deliver
        );

        assert!(first.is_ok());
        assert_eq!(first, second);
        assert_eq!(h.window.requests().len(), 1);
        assert_eq!(h.http.request_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failure() {
        let broker = ConsentBroker::new();
        let h = harness_with(settings(), broker.clone(), RecordingWindow::default());
        h.http
            .push_json(400, json!({"error": "invalid_grant"}))
            .await;

        let deliver = async {
            h.window.notify.notified().await;
            let id = h.window.requests()[0].correlation_id.clone();
            broker.deliver(
                &ConsentRequestId::from(id.as_str()),
                AuthorizationReturned::code("abc123"),
            );
        };

        let (first, second, ()) = tokio::join!(
            h.manager.ensure_authorized(),
            h.manager.ensure_authorized(),
            deliver
        );

        assert!(matches!(first, Err(AuthError::ExchangeFailed(_))));
        assert_eq!(first, second);
        assert_eq!(h.http.request_count().await, 1);
        assert_eq!(h.manager.state().await, AuthState::Unauthorized);
    }

    #[tokio::test]
    async fn test_denied_consent() {
        let h = answering_harness(AuthorizationReturned::denied("access_denied"));

        let result = h.manager.ensure_authorized().await;

        assert!(matches!(result, Err(AuthError::ConsentDenied { .. })));
        assert_eq!(h.http.request_count().await, 0);
        assert_eq!(h.manager.state().await, AuthState::Unauthorized);
    }

    #[tokio::test]
    async fn test_window_failure_is_consent_denied() {
        let h = harness_with(settings(), ConsentBroker::new(), RecordingWindow::failing());

        let result = h.manager.ensure_authorized().await;

        assert!(matches!(result, Err(AuthError::ConsentDenied { .. })));
        assert_eq!(h.manager.broker().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_attempt_allows_a_new_one() {
        let broker = ConsentBroker::new();
        let h = harness_with(
            settings(),
            broker.clone(),
            RecordingWindow::answering(&broker, AuthorizationReturned::code("abc123")),
        );
        h.http.push_json(500, json!({"error": "boom"})).await;
        h.http.push_json(200, grant("AT1", "RT1")).await;

        assert!(h.manager.ensure_authorized().await.is_err());
        h.manager.ensure_authorized().await.unwrap();

        assert_eq!(h.window.requests().len(), 2);
        assert!(h.manager.is_authorized().await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_authorization() {
        let h = harness_with(settings(), ConsentBroker::new(), RecordingWindow::default());

        let cancel = async {
            h.window.notify.notified().await;
            assert!(h.manager.cancel_authorization().await);
        };

        let (result, ()) = tokio::join!(h.manager.ensure_authorized(), cancel);

        assert!(matches!(result, Err(AuthError::ConsentDenied { .. })));
        assert!(!h.manager.cancel_authorization().await);
        assert_eq!(h.http.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_consent_timeout() {
        let settings = settings().with_consent_timeout(Duration::from_millis(20));
        let h = harness_with(settings, ConsentBroker::new(), RecordingWindow::default());

        let result = h.manager.ensure_authorized().await;

        match result {
            Err(AuthError::ConsentDenied { reason }) => assert!(reason.contains("timed out")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(h.manager.broker().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_enforced_state_mismatch() {
        let broker = ConsentBroker::new();
        let settings = settings()
            .with_state(StateToken::PerAttempt)
            .with_state_validation(StateValidation::Enforce);
        let window = RecordingWindow::answering(
            &broker,
            AuthorizationReturned::code_with_state("abc123", "forged"),
        );
        let h = harness_with(settings, broker, window);

        let result = h.manager.ensure_authorized().await;

        assert_eq!(result, Err(AuthError::StateMismatch));
        assert_eq!(h.http.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_enforced_state_match() {
        let broker = ConsentBroker::new();
        let settings = settings().with_state_validation(StateValidation::Enforce);
        let window = RecordingWindow::answering(
            &broker,
            AuthorizationReturned::code_with_state("abc123", "onTarget"),
        );
        let h = harness_with(settings, broker, window);
        h.http.push_json(200, grant("AT1", "RT1")).await;

        h.manager.ensure_authorized().await.unwrap();
        assert_eq!(h.http.request_count().await, 1);
    }

    #[tokio::test]
    async fn test_refresh_success() {
        let h = answering_harness(AuthorizationReturned::code("unused"));
        seed(&h.store, "AT1", "RT1").await;
        h.http.push_json(200, grant("AT2", "RT2")).await;

        h.manager.refresh().await.unwrap();

        let sent = h.http.requests.lock().await;
        let body: serde_json::Value = sent[0].json_body().unwrap();
        assert_eq!(body["refresh_token"], "RT1");
        drop(sent);

        let record = stored(&h.store).await;
        assert_eq!(record["access_token"], "AT2");
        assert_eq!(record["refresh_token"], "RT2");
    }

    #[tokio::test]
    async fn test_refresh_without_token_makes_no_request() {
        let h = answering_harness(AuthorizationReturned::code("unused"));

        assert_eq!(h.manager.refresh().await, Err(AuthError::NotAuthorized));
        assert_eq!(h.http.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_clears_store() {
        let h = answering_harness(AuthorizationReturned::code("unused"));
        seed(&h.store, "AT1", "RT1").await;
        h.http
            .push_json(400, json!({"error": "invalid_grant"}))
            .await;
        let mut events = h.bus.subscribe();

        let result = h.manager.refresh().await;

        assert!(matches!(result, Err(AuthError::RefreshFailed(_))));
        let record = stored(&h.store).await;
        assert!(record["access_token"].is_null());
        assert!(record["refresh_token"].is_null());
        assert!(!h.manager.is_authorized().await.unwrap());

        let cleared = std::iter::from_fn(|| events.try_recv().ok()).any(|event| {
            matches!(
                event,
                CoreEvent::Auth(AuthEvent::CredentialsCleared { .. })
            )
        });
        assert!(cleared);
    }

    async fn assert_incomplete_refresh_clears(grant: serde_json::Value) {
        let h = answering_harness(AuthorizationReturned::code("unused"));
        seed(&h.store, "AT1", "RT1").await;
        h.http.push_json(200, grant).await;
        let mut events = h.bus.subscribe();

        let result = h.manager.refresh().await;

        assert!(matches!(result, Err(AuthError::RefreshFailed(_))));
        let record = stored(&h.store).await;
        assert!(record["access_token"].is_null());
        assert!(record["refresh_token"].is_null());
        assert_eq!(h.manager.state().await, AuthState::Unauthorized);

        let cleared = std::iter::from_fn(|| events.try_recv().ok()).any(|event| {
            matches!(
                event,
                CoreEvent::Auth(AuthEvent::CredentialsCleared { .. })
            )
        });
        assert!(cleared);
    }

    #[tokio::test]
    async fn test_refresh_without_new_refresh_token_clears_store() {
        assert_incomplete_refresh_clears(json!({"data": {"access_token": "AT2"}})).await;
    }

    #[tokio::test]
    async fn test_refresh_with_empty_refresh_token_clears_store() {
        assert_incomplete_refresh_clears(
            json!({"data": {"access_token": "AT2", "refresh_token": ""}}),
        )
        .await;
    }

    #[tokio::test]
    async fn test_attempt_completes_after_caller_is_dropped() {
        let broker = ConsentBroker::new();
        let h = harness_with(settings(), broker.clone(), RecordingWindow::default());
        h.http.push_json(200, grant("AT1", "RT1")).await;

        tokio::select! {
            _ = h.manager.ensure_authorized() => panic!("attempt finished before consent"),
            _ = h.window.notify.notified() => {}
        }

        let id = h.window.requests()[0].correlation_id.clone();
        assert!(broker.deliver(
            &ConsentRequestId::from(id.as_str()),
            AuthorizationReturned::code("abc123"),
        ));

        tokio::time::timeout(Duration::from_secs(1), async {
            while h.manager.state().await != AuthState::Authorized {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(h.http.request_count().await, 1);
        let record = stored(&h.store).await;
        assert_eq!(record["access_token"], "AT1");
        assert_eq!(record["refresh_token"], "RT1");

        h.manager.ensure_authorized().await.unwrap();
        assert_eq!(h.window.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_rejected_skips_when_already_rotated() {
        let h = answering_harness(AuthorizationReturned::code("unused"));
        seed(&h.store, "AT2", "RT2").await;

        h.manager.refresh_rejected("AT1").await.unwrap();
        assert_eq!(h.http.request_count().await, 0);

        h.http.push_json(200, grant("AT3", "RT3")).await;
        h.manager.refresh_rejected("AT2").await.unwrap();
        assert_eq!(h.http.request_count().await, 1);
        assert_eq!(h.manager.access_token().await.unwrap(), "AT3");
    }

    #[tokio::test]
    async fn test_access_token_requires_credential() {
        let h = answering_harness(AuthorizationReturned::code("unused"));
        assert_eq!(
            h.manager.access_token().await,
            Err(AuthError::NotAuthorized)
        );
    }

    #[tokio::test]
    async fn test_revoke_posts_in_background() {
        let h = answering_harness(AuthorizationReturned::code("unused"));
        seed(&h.store, "AT1", "RT1").await;
        h.http.push_json(200, json!({})).await;

        let handle = h.manager.revoke().await.expect("revocation task");
        handle.await.unwrap();

        let sent = h.http.requests.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "https://api.box.com/oauth2/revoke");
        drop(sent);

        // Storage is left alone
        assert_eq!(stored(&h.store).await["access_token"], "AT1");
    }

    #[tokio::test]
    async fn test_revoke_failure_is_swallowed() {
        let h = answering_harness(AuthorizationReturned::code("unused"));
        seed(&h.store, "AT1", "RT1").await;
        h.http.push_error("offline").await;

        let handle = h.manager.revoke().await.expect("revocation task");
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_without_credential_does_nothing() {
        let h = answering_harness(AuthorizationReturned::code("unused"));
        assert!(h.manager.revoke().await.is_none());
        assert_eq!(h.http.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_sign_out() {
        let h = answering_harness(AuthorizationReturned::code("unused"));
        seed(&h.store, "AT1", "RT1").await;
        h.http.push_json(200, json!({})).await;

        let handle = h.manager.sign_out().await.unwrap();
        if let Some(handle) = handle {
            handle.await.unwrap();
        }

        assert!(!h.manager.is_authorized().await.unwrap());
        assert_eq!(h.manager.state().await, AuthState::Unauthorized);
        assert_eq!(h.http.request_count().await, 1);
    }

    #[tokio::test]
    async fn test_token_provider_delegates() {
        let h = answering_harness(AuthorizationReturned::code("unused"));
        seed(&h.store, "AT1", "RT1").await;

        let provider: Arc<dyn TokenProvider> = Arc::new(h.manager.clone());
        provider.ensure_authorized().await.unwrap();
        assert_eq!(provider.access_token().await.unwrap(), "AT1");
    }
}
