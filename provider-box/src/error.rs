//! Error types for the Box provider

use core_auth::AuthError;
use thiserror::Error;

/// Box data-access errors
#[derive(Error, Debug)]
pub enum BoxError {
    /// Authorization, refresh or credential storage failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The backend answered with a failure status, or could not be reached
    /// (`status` is `None` for transport failures)
    #[error("Box request failed{}: {message}", status_suffix(.status))]
    UpstreamRequestFailed { status: Option<u16>, message: String },

    /// Failed to parse a backend response or a caller-supplied URL
    #[error("Failed to parse Box response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    Bridge(#[from] bridge_traits::error::BridgeError),
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|s| format!(" (status {})", s))
        .unwrap_or_default()
}

impl BoxError {
    pub(crate) fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        BoxError::UpstreamRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// HTTP status carried by an upstream failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            BoxError::UpstreamRequestFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the UI should send the user back through consent.
    pub fn requires_consent(&self) -> bool {
        match self {
            BoxError::Auth(e) => e.requires_consent(),
            _ => false,
        }
    }
}

/// Result type for Box operations
pub type Result<T> = std::result::Result<T, BoxError>;
