use thiserror::Error;

/// Errors from the authorization, refresh and credential-storage flows.
///
/// `Clone` so one authorization outcome can be handed to every caller that
/// was waiting on it. Messages never contain token values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Not authorized")]
    NotAuthorized,

    #[error("User consent was not granted: {reason}")]
    ConsentDenied { reason: String },

    #[error("Authorization code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Returned state does not match the authorization request")]
    StateMismatch,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Stored credential is corrupted: {0}")]
    TokenCorrupted(String),

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AuthError {
    /// Whether the UI should send the user back through consent.
    pub fn requires_consent(&self) -> bool {
        matches!(
            self,
            AuthError::NotAuthorized
                | AuthError::RefreshFailed(_)
                | AuthError::ConsentDenied { .. }
                | AuthError::ExchangeFailed(_)
                | AuthError::StateMismatch
                | AuthError::TokenCorrupted(_)
        )
    }

    pub(crate) fn consent_denied(reason: impl Into<String>) -> Self {
        AuthError::ConsentDenied {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
