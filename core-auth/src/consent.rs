//! Consent popup handshake
//!
//! Opening the consent page and learning its outcome are decoupled: the core
//! asks the host to open a window, and some time later the host reports the
//! authorization-returned signal. [`ConsentBroker`] correlates the two by a
//! request id.
//!
//! Each attempt registers a one-shot listener. The listener is removed the
//! moment it fires, is cancelled, or is dropped, so a late or duplicated
//! delivery for the same id is ignored.

use crate::error::{AuthError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

/// Correlation id of one authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsentRequestId(String);

impl ConsentRequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConsentRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConsentRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsentRequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConsentRequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What the consent page reported back.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthorizationReturned {
    /// The user granted access.
    Code {
        code: String,
        state: Option<String>,
    },
    /// The user denied access or closed the window.
    Denied { reason: String },
}

impl AuthorizationReturned {
    pub fn code(code: impl Into<String>) -> Self {
        AuthorizationReturned::Code {
            code: code.into(),
            state: None,
        }
    }

    pub fn code_with_state(code: impl Into<String>, state: impl Into<String>) -> Self {
        AuthorizationReturned::Code {
            code: code.into(),
            state: Some(state.into()),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        AuthorizationReturned::Denied {
            reason: reason.into(),
        }
    }

    /// Interpret the URL the consent page redirected to.
    ///
    /// `?code=...&state=...` becomes [`Code`](Self::Code);
    /// `?error=...&error_description=...` becomes [`Denied`](Self::Denied).
    /// A URL with neither is treated as a denial.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidConfig`] if `redirect_url` does not parse.
    pub fn from_redirect_url(redirect_url: &str) -> Result<Self> {
        let url = Url::parse(redirect_url)
            .map_err(|e| AuthError::InvalidConfig(format!("invalid redirect URL: {}", e)))?;

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            let reason = match description {
                Some(description) => format!("{}: {}", error, description),
                None => error,
            };
            return Ok(Self::denied(reason));
        }

        match code.filter(|c| !c.is_empty()) {
            Some(code) => Ok(AuthorizationReturned::Code { code, state }),
            None => Ok(Self::denied("redirect carried no authorization code")),
        }
    }
}

impl fmt::Debug for AuthorizationReturned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationReturned::Code { state, .. } => f
                .debug_struct("Code")
                .field("code", &"[REDACTED]")
                .field("state", state)
                .finish(),
            AuthorizationReturned::Denied { reason } => {
                f.debug_struct("Denied").field("reason", reason).finish()
            }
        }
    }
}

type ListenerMap = HashMap<ConsentRequestId, oneshot::Sender<AuthorizationReturned>>;

/// Routes authorization-returned signals to the attempt waiting for them.
#[derive(Clone, Default)]
pub struct ConsentBroker {
    listeners: Arc<Mutex<ListenerMap>>,
}

impl ConsentBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ListenerMap> {
        // A panic while holding this lock cannot leave the map half-updated.
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a listener under a fresh request id.
    pub fn register(&self) -> (ConsentRequestId, ConsentListener) {
        let id = ConsentRequestId::new();
        let (sender, receiver) = oneshot::channel();
        self.lock().insert(id.clone(), sender);
        debug!(request_id = %id, "Registered consent listener");

        let listener = ConsentListener {
            id: id.clone(),
            receiver,
            listeners: Arc::clone(&self.listeners),
        };
        (id, listener)
    }

    /// Hand `signal` to the listener registered under `id`.
    ///
    /// Returns `false` when no listener is waiting: unknown id, already
    /// delivered, cancelled, or the attempt gave up.
    pub fn deliver(&self, id: &ConsentRequestId, signal: AuthorizationReturned) -> bool {
        let Some(sender) = self.lock().remove(id) else {
            warn!(request_id = %id, "Ignoring authorization signal for unknown request");
            return false;
        };

        let delivered = sender.send(signal).is_ok();
        debug!(request_id = %id, delivered, "Delivered authorization signal");
        delivered
    }

    /// Drop the listener for `id`; its waiter fails with `ConsentDenied`.
    pub fn cancel(&self, id: &ConsentRequestId) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            debug!(request_id = %id, "Cancelled consent listener");
        }
        removed
    }

    /// Drop every pending listener.
    pub fn cancel_all(&self) -> usize {
        let mut listeners = self.lock();
        let count = listeners.len();
        listeners.clear();
        count
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_pending(&self, id: &ConsentRequestId) -> bool {
        self.lock().contains_key(id)
    }
}

/// The waiting half of a registered listener.
///
/// Dropping it unregisters the id.
pub struct ConsentListener {
    id: ConsentRequestId,
    receiver: oneshot::Receiver<AuthorizationReturned>,
    listeners: Arc<Mutex<ListenerMap>>,
}

impl ConsentListener {
    pub fn id(&self) -> &ConsentRequestId {
        &self.id
    }

    /// Wait for the consent page to report back.
    ///
    /// # Errors
    ///
    /// [`AuthError::ConsentDenied`] when the listener was cancelled.
    pub async fn wait(mut self) -> Result<AuthorizationReturned> {
        (&mut self.receiver)
            .await
            .map_err(|_| AuthError::consent_denied("authorization cancelled"))
    }
}

impl Drop for ConsentListener {
    fn drop(&mut self) {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_code() {
        let broker = ConsentBroker::new();
        let (id, listener) = broker.register();
        assert_eq!(broker.pending_count(), 1);

        assert!(broker.deliver(&id, AuthorizationReturned::code("abc123")));
        assert_eq!(broker.pending_count(), 0);

        let signal = listener.wait().await.unwrap();
        assert_eq!(signal, AuthorizationReturned::code("abc123"));
    }

    #[tokio::test]
    async fn test_second_delivery_is_ignored() {
        let broker = ConsentBroker::new();
        let (id, listener) = broker.register();

        assert!(broker.deliver(&id, AuthorizationReturned::code("first")));
        assert!(!broker.deliver(&id, AuthorizationReturned::code("second")));

        assert_eq!(
            listener.wait().await.unwrap(),
            AuthorizationReturned::code("first")
        );
    }

    #[tokio::test]
    async fn test_unknown_id_is_ignored() {
        let broker = ConsentBroker::new();
        let (_id, _listener) = broker.register();

        let stranger = ConsentRequestId::from("not-registered");
        assert!(!broker.deliver(&stranger, AuthorizationReturned::code("abc")));
        assert_eq!(broker.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_rejects_waiter() {
        let broker = ConsentBroker::new();
        let (id, listener) = broker.register();

        assert!(broker.cancel(&id));
        assert!(!broker.cancel(&id));

        let result = listener.wait().await;
        assert!(matches!(result, Err(AuthError::ConsentDenied { .. })));
    }

    #[tokio::test]
    async fn test_dropped_listener_unregisters() {
        let broker = ConsentBroker::new();
        let (id, listener) = broker.register();
        drop(listener);

        assert!(!broker.is_pending(&id));
        assert!(!broker.deliver(&id, AuthorizationReturned::code("late")));
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let broker = ConsentBroker::new();
        let (_a, first) = broker.register();
        let (_b, second) = broker.register();

        assert_eq!(broker.cancel_all(), 2);
        assert!(first.wait().await.is_err());
        assert!(second.wait().await.is_err());
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(ConsentRequestId::new(), ConsentRequestId::new());
    }

    #[test]
    fn test_from_redirect_url_code() {
        let signal =
            AuthorizationReturned::from_redirect_url("http://localhost:8080/?code=abc123&state=onTarget")
                .unwrap();
        assert_eq!(
            signal,
            AuthorizationReturned::code_with_state("abc123", "onTarget")
        );
    }

    #[test]
    fn test_from_redirect_url_error() {
        let signal = AuthorizationReturned::from_redirect_url(
            "http://localhost:8080/?error=access_denied&error_description=The+user+denied+access",
        )
        .unwrap();
        assert_eq!(
            signal,
            AuthorizationReturned::denied("access_denied: The user denied access")
        );
    }

    #[test]
    fn test_from_redirect_url_without_code() {
        let signal = AuthorizationReturned::from_redirect_url("http://localhost:8080/").unwrap();
        assert!(matches!(signal, AuthorizationReturned::Denied { .. }));

        assert!(AuthorizationReturned::from_redirect_url("not a url").is_err());
    }

    #[test]
    fn test_debug_redacts_code() {
        let debug = format!("{:?}", AuthorizationReturned::code("super-secret-code"));
        assert!(!debug.contains("super-secret-code"));
    }
}
