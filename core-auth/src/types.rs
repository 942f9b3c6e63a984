use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The Box credential pair.
///
/// Both tokens are present or both are absent; the constructors reject
/// anything else, so a half-written credential can never be saved. Empty
/// strings count as absent.
///
/// # Security
///
/// The `Debug` implementation redacts both tokens.
///
/// # Examples
///
/// ```
/// use core_auth::Credential;
///
/// let credential = Credential::new("AT1", "RT1").unwrap();
/// assert!(credential.is_complete());
///
/// assert!(Credential::from_parts(Some("AT1".into()), None).is_err());
/// assert!(Credential::from_parts(Some(String::new()), None).unwrap().is_empty());
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

impl Credential {
    /// A credential with neither token.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A complete credential. Fails if either token is empty.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Result<Self> {
        let credential = Self::from_parts(Some(access_token.into()), Some(refresh_token.into()))?;
        if credential.is_empty() {
            return Err(AuthError::InvalidCredential(
                "both tokens are empty".to_string(),
            ));
        }
        Ok(credential)
    }

    /// Build from optional parts, normalizing empty strings to absent.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredential`] when exactly one token is present.
    pub fn from_parts(access_token: Option<String>, refresh_token: Option<String>) -> Result<Self> {
        let access_token = access_token.filter(|t| !t.is_empty());
        let refresh_token = refresh_token.filter(|t| !t.is_empty());

        match (&access_token, &refresh_token) {
            (Some(_), None) => Err(AuthError::InvalidCredential(
                "access token without refresh token".to_string(),
            )),
            (None, Some(_)) => Err(AuthError::InvalidCredential(
                "refresh token without access token".to_string(),
            )),
            _ => Ok(Self {
                access_token,
                refresh_token,
            }),
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// True iff both tokens are present.
    pub fn is_complete(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |token: &Option<String>| token.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Credential")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

/// Where the authorization flow currently stands.
///
/// # State Transitions
///
/// ```text
/// Unauthorized -> AwaitingUserConsent -> ExchangingCode -> Authorized
///      ^                  |                    |              |
///      +------------------+--------------------+--------------+
///                     (failure, refresh failure, sign-out)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AuthState {
    /// No usable credential; initial and failure state
    #[default]
    Unauthorized,
    /// The consent popup is open
    AwaitingUserConsent,
    /// The authorization code is being exchanged
    ExchangingCode,
    /// A complete credential is stored
    Authorized,
}

impl AuthState {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthState::Authorized)
    }

    /// True while an authorization attempt is underway.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            AuthState::AwaitingUserConsent | AuthState::ExchangingCode
        )
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::Unauthorized => write!(f, "Unauthorized"),
            AuthState::AwaitingUserConsent => write!(f, "Awaiting User Consent..."),
            AuthState::ExchangingCode => write!(f, "Exchanging Code..."),
            AuthState::Authorized => write!(f, "Authorized"),
        }
    }
}
