//! # Core Configuration Module
//!
//! Holds everything the Box integration needs before it can run: the OAuth
//! client registration and backend location ([`BoxSettings`]), plus the three
//! host bridges (HTTP transport, secure store, consent window).
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - Backend and provider requests
//! - `SecureStore` - Credential persistence
//! - `ConsentWindow` - Shows the Box consent page
//!
//! When the `desktop-shims` feature is enabled, desktop defaults are injected
//! for any bridge that was not provided (`ReqwestHttpClient`,
//! `KeyringSecureStore`, `SystemBrowserWindow`). Without it a missing bridge
//! fails the build with [`Error::CapabilityMissing`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{BoxSettings, CoreConfig};
//!
//! let config = CoreConfig::builder()
//!     .settings(BoxSettings::from_env()?)
//!     .http_client(http)
//!     .secure_store(store)
//!     .consent_window(window)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{ConsentWindow, HttpClient, SecureStore};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Box authorize endpoint the consent popup navigates to.
pub const DEFAULT_AUTHORIZE_URL: &str = "https://app.box.com/api/oauth2/authorize";
/// Box token revocation endpoint.
pub const DEFAULT_REVOKE_URL: &str = "https://api.box.com/oauth2/revoke";
/// Redirect registered for local development.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080";
pub const DEFAULT_API_VERSION: &str = "v1";
/// Key the credential JSON is stored under.
pub const DEFAULT_STORAGE_KEY: &str = "BoxAuthentication";
/// State value sent when no per-attempt token is requested.
pub const DEFAULT_STATE: &str = "onTarget";
pub const DEFAULT_POPUP_NAME: &str = "Box Authentication";
pub const DEFAULT_POPUP_FEATURES: &str = "height=500,width=500";

pub const ENV_CLIENT_ID: &str = "BOX_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "BOX_CLIENT_SECRET";
pub const ENV_BACKEND_DOMAIN: &str = "BOX_BACKEND_DOMAIN";
pub const ENV_API_VERSION: &str = "BOX_API_VERSION";
pub const ENV_REDIRECT_URI: &str = "BOX_REDIRECT_URI";

/// How the `state` parameter of the authorize URL is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateToken {
    /// The same value on every attempt.
    Fixed(String),
    /// 16 random bytes, base64url, generated per attempt.
    PerAttempt,
}

impl Default for StateToken {
    fn default() -> Self {
        StateToken::Fixed(DEFAULT_STATE.to_string())
    }
}

/// Whether the `state` echoed back by the consent page is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateValidation {
    #[default]
    Disabled,
    /// A missing or different state rejects the attempt before exchange.
    Enforce,
}

/// OAuth client registration and backend location for the Box integration.
#[derive(Clone, PartialEq, Eq)]
pub struct BoxSettings {
    pub client_id: String,
    pub client_secret: String,
    /// Application backend base URL, e.g. `https://app.example.com`.
    pub backend_domain: String,
    pub api_version: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub revoke_url: String,
    pub state: StateToken,
    pub state_validation: StateValidation,
    pub storage_key: String,
    pub popup_name: String,
    pub popup_features: String,
    /// How long to wait for the consent page. `None` waits indefinitely.
    pub consent_timeout: Option<Duration>,
}

impl BoxSettings {
    /// Settings with every optional field at its default.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        backend_domain: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            backend_domain: backend_domain.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            revoke_url: DEFAULT_REVOKE_URL.to_string(),
            state: StateToken::default(),
            state_validation: StateValidation::default(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            popup_name: DEFAULT_POPUP_NAME.to_string(),
            popup_features: DEFAULT_POPUP_FEATURES.to_string(),
            consent_timeout: None,
        }
    }

    /// Read settings from `BOX_*` environment variables.
    ///
    /// `BOX_CLIENT_ID`, `BOX_CLIENT_SECRET` and `BOX_BACKEND_DOMAIN` are
    /// required. `BOX_API_VERSION` defaults to `v1`, `BOX_REDIRECT_URI` to
    /// `http://localhost:8080`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{} is not set", key)))
        };

        let mut settings = Self::new(
            required(ENV_CLIENT_ID)?,
            required(ENV_CLIENT_SECRET)?,
            required(ENV_BACKEND_DOMAIN)?,
        );

        if let Some(version) = lookup(ENV_API_VERSION).filter(|v| !v.trim().is_empty()) {
            settings.api_version = version;
        }
        if let Some(redirect) = lookup(ENV_REDIRECT_URI).filter(|v| !v.trim().is_empty()) {
            settings.redirect_uri = redirect;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn with_revoke_url(mut self, url: impl Into<String>) -> Self {
        self.revoke_url = url.into();
        self
    }

    pub fn with_state(mut self, state: StateToken) -> Self {
        self.state = state;
        self
    }

    pub fn with_state_validation(mut self, validation: StateValidation) -> Self {
        self.state_validation = validation;
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_popup(mut self, name: impl Into<String>, features: impl Into<String>) -> Self {
        self.popup_name = name.into();
        self.popup_features = features.into();
        self
    }

    pub fn with_consent_timeout(mut self, timeout: Duration) -> Self {
        self.consent_timeout = Some(timeout);
        self
    }

    /// `{domain}/api/{apiVersion}`
    pub fn api_base(&self) -> String {
        format!(
            "{}/api/{}",
            self.backend_domain.trim_end_matches('/'),
            self.api_version.trim_matches('/')
        )
    }

    /// Backend endpoint that exchanges an authorization code.
    pub fn exchange_endpoint(&self) -> String {
        format!("{}/external/file/box/authorize", self.api_base())
    }

    /// Backend endpoint that exchanges a refresh token.
    pub fn refresh_endpoint(&self) -> String {
        format!("{}/external/file/box/refresh", self.api_base())
    }

    /// Backend proxy for folder listings.
    pub fn list_endpoint(&self) -> String {
        format!("{}/external/file/box", self.api_base())
    }

    /// Backend proxy that downloads a file server-side.
    pub fn download_endpoint(&self) -> String {
        format!("{}/upload/external", self.api_base())
    }

    /// Checks every field the flows depend on.
    pub fn validate(&self) -> Result<()> {
        let not_empty = |name: &str, value: &str| {
            if value.trim().is_empty() {
                Err(Error::Config(format!("Box {} cannot be empty", name)))
            } else {
                Ok(())
            }
        };

        not_empty("client id", &self.client_id)?;
        not_empty("client secret", &self.client_secret)?;
        not_empty("backend domain", &self.backend_domain)?;
        not_empty("API version", &self.api_version)?;
        not_empty("redirect URI", &self.redirect_uri)?;
        not_empty("storage key", &self.storage_key)?;

        for (name, value) in [
            ("backend domain", &self.backend_domain),
            ("authorize URL", &self.authorize_url),
            ("revoke URL", &self.revoke_url),
        ] {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "Box {} must be an http(s) URL, got '{}'",
                    name, value
                )));
            }
        }

        if let StateToken::Fixed(state) = &self.state {
            not_empty("state", state)?;
        }

        if self.consent_timeout == Some(Duration::ZERO) {
            return Err(Error::Config(
                "Consent timeout must be greater than zero; omit it to wait indefinitely"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for BoxSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("backend_domain", &self.backend_domain)
            .field("api_version", &self.api_version)
            .field("redirect_uri", &self.redirect_uri)
            .field("authorize_url", &self.authorize_url)
            .field("revoke_url", &self.revoke_url)
            .field("state", &self.state)
            .field("state_validation", &self.state_validation)
            .field("storage_key", &self.storage_key)
            .field("consent_timeout", &self.consent_timeout)
            .finish()
    }
}

/// Validated configuration with every bridge resolved.
#[derive(Clone)]
pub struct CoreConfig {
    pub settings: BoxSettings,
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    pub consent_window: Arc<dyn ConsentWindow>,
    /// Capacity of the event bus channel
    pub event_buffer_size: usize,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("settings", &self.settings)
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field("consent_window", &"ConsentWindow { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for backend and provider requests. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Other hosts: inject a native HTTP adapter."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn secure_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required for credential persistence. \
                 Desktop: enable the 'desktop-shims' feature to use the default KeyringSecureStore. \
                 Tests: inject MemorySecureStore."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn consent_window_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "ConsentWindow".to_string(),
        message: "ConsentWindow implementation is required to show the Box consent page. \
                 Desktop: enable the 'desktop-shims' feature to use the system browser. \
                 Embedded hosts: inject a popup/webview adapter."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::KeyringSecureStore;

    Ok(Arc::new(KeyringSecureStore::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(secure_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_consent_window() -> Result<Arc<dyn ConsentWindow>> {
    use bridge_desktop::SystemBrowserWindow;

    Ok(Arc::new(SystemBrowserWindow::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_consent_window() -> Result<Arc<dyn ConsentWindow>> {
    Err(consent_window_missing_error())
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    settings: Option<BoxSettings>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    consent_window: Option<Arc<dyn ConsentWindow>>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the Box client registration and backend location (required).
    pub fn settings(mut self, settings: BoxSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the reqwest-based desktop default is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the secure store the credential is persisted in.
    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Sets the facility that shows the consent page.
    pub fn consent_window(mut self, window: Arc<dyn ConsentWindow>) -> Self {
        self.consent_window = Some(window);
        self
    }

    /// Default: 100 events.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when settings are missing or invalid
    /// - [`Error::CapabilityMissing`] when a bridge is absent and no desktop
    ///   default is available
    pub fn build(self) -> Result<CoreConfig> {
        let settings = self.settings.ok_or_else(|| {
            Error::Config(
                "Box settings are required. Use .settings() or BoxSettings::from_env()."
                    .to_string(),
            )
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let consent_window = match self.consent_window {
            Some(window) => window,
            None => provide_default_consent_window()?,
        };

        let config = CoreConfig {
            settings,
            http_client,
            secure_store,
            consent_window,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}
