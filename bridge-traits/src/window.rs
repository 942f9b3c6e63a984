//! Consent Window Abstraction
//!
//! The authorization flow needs a separate window in which the user signs in
//! to the provider and grants access. How that window is opened is up to the
//! host: a webview popup, the system browser, or a test double that just
//! records the request.
//!
//! Opening a window is fire-and-forget. The host reports the outcome later by
//! delivering an authorization-returned signal to the core's consent broker,
//! tagged with [`WindowRequest::correlation_id`].

use async_trait::async_trait;

use crate::error::Result;

/// A request to show the provider consent page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest {
    /// Fully-formed authorize URL.
    pub url: String,
    /// Window name (e.g. `Box Authentication`).
    pub name: String,
    /// Window features string (e.g. `height=500,width=500`).
    pub features: String,
    /// Id the host must echo back when the consent page returns.
    pub correlation_id: String,
}

/// Popup facility provided by the host.
#[async_trait]
pub trait ConsentWindow: Send + Sync {
    /// Open the consent page.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::WindowUnavailable`](crate::BridgeError::WindowUnavailable)
    /// when the window could not be shown (blocked popup, no browser).
    async fn open(&self, request: &WindowRequest) -> Result<()>;
}
