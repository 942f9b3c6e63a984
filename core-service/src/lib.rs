//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, secure
//! storage, consent window) into the Box integration. Desktop apps typically
//! enable the `desktop-shims` feature (which depends on `bridge-desktop`) and
//! call [`bootstrap_desktop`]; other hosts build a
//! [`CoreConfig`](core_runtime::config::CoreConfig) with their own adapters
//! and pass it to [`BoxService::new`].
//!
//! The host owns the consent popup. When it returns, the host hands the
//! result back with [`BoxService::deliver_authorization`] (or
//! [`BoxService::deliver_redirect`]) using the correlation id it was given
//! in the `WindowRequest`.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use core_auth::{
    AuthManager, AuthState, AuthorizationReturned, ConsentBroker, ConsentRequestId,
    OAuthFlowManager, TokenState, TokenStore,
};
use core_runtime::config::{BoxSettings, CoreConfig};
use core_runtime::events::{EventBus, EventStream};
use provider_box::{BoxConnector, FolderItems};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{MemorySecureStore, ReqwestHttpClient, SystemBrowserWindow};

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct BoxService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    settings: BoxSettings,
    event_bus: EventBus,
    auth: AuthManager,
    connector: BoxConnector,
}

impl BoxService {
    /// Wire every component from a validated configuration.
    ///
    /// # Errors
    ///
    /// [`CoreError::Config`] when the settings are invalid.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let CoreConfig {
            settings,
            http_client,
            secure_store,
            consent_window,
            event_buffer_size,
        } = config;

        let event_bus = EventBus::new(event_buffer_size);
        let token_state = Arc::new(TokenState::new(TokenStore::new(
            secure_store,
            settings.storage_key.clone(),
        )));

        let auth = AuthManager::new(
            OAuthFlowManager::new(settings.clone(), Arc::clone(&http_client)),
            token_state,
            ConsentBroker::new(),
            consent_window,
            event_bus.clone(),
        );

        let connector = BoxConnector::new(http_client, Arc::new(auth.clone()), settings.clone())
            .with_event_bus(event_bus.clone());

        info!(
            backend = %settings.backend_domain,
            api_version = %settings.api_version,
            "Box service initialized"
        );

        Ok(Self {
            inner: Arc::new(ServiceInner {
                settings,
                event_bus,
                auth,
                connector,
            }),
        })
    }

    pub fn settings(&self) -> &BoxSettings {
        &self.inner.settings
    }

    /// The underlying auth manager.
    pub fn auth(&self) -> &AuthManager {
        &self.inner.auth
    }

    pub async fn state(&self) -> AuthState {
        self.inner.auth.state().await
    }

    /// True iff a complete credential is stored. No network I/O.
    pub async fn is_authorized(&self) -> Result<bool> {
        Ok(self.inner.auth.is_authorized().await?)
    }

    /// Prompt for consent unless a complete credential is stored.
    pub async fn ensure_authorized(&self) -> Result<()> {
        Ok(self.inner.auth.ensure_authorized().await?)
    }

    /// List one page of `folder_id`.
    #[instrument(skip(self))]
    pub async fn load(&self, folder_id: &str, offset: u64, limit: u64) -> Result<FolderItems> {
        Ok(self.inner.connector.load(folder_id, offset, limit).await?)
    }

    /// Have the backend download `url` server-side as `file_name`.
    pub async fn request_download(&self, url: &str, file_name: &str) -> Result<serde_json::Value> {
        Ok(self.inner.connector.request_download(url, file_name).await?)
    }

    pub async fn refresh(&self) -> Result<()> {
        Ok(self.inner.auth.refresh().await?)
    }

    /// Revoke the stored access token in the background.
    pub async fn revoke(&self) -> Option<JoinHandle<()>> {
        self.inner.auth.revoke().await
    }

    pub async fn sign_out(&self) -> Result<Option<JoinHandle<()>>> {
        Ok(self.inner.auth.sign_out().await?)
    }

    pub async fn cancel_authorization(&self) -> bool {
        self.inner.auth.cancel_authorization().await
    }

    /// Report what the consent page returned for `request_id`.
    ///
    /// Returns `false` when no attempt is waiting on that id.
    pub fn deliver_authorization(&self, request_id: &str, signal: AuthorizationReturned) -> bool {
        self.inner
            .auth
            .broker()
            .deliver(&ConsentRequestId::from(request_id), signal)
    }

    /// Same as [`deliver_authorization`](Self::deliver_authorization), from
    /// the URL the consent page redirected to.
    pub fn deliver_redirect(&self, request_id: &str, redirect_url: &str) -> Result<bool> {
        let signal = AuthorizationReturned::from_redirect_url(redirect_url)?;
        Ok(self.deliver_authorization(request_id, signal))
    }

    /// Subscribe to auth and file events.
    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.inner.event_bus.subscribe())
    }
}

/// Build a service with the desktop adapters: reqwest, the OS keychain and
/// the system browser.
///
/// ```no_run
/// # #[cfg(feature = "desktop-shims")]
/// # async fn example() -> core_service::Result<()> {
/// use core_runtime::config::BoxSettings;
/// use core_service::bootstrap_desktop;
///
/// let service = bootstrap_desktop(BoxSettings::from_env()?)?;
/// let page = service.load("0", 0, 100).await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(settings: BoxSettings) -> Result<BoxService> {
    let config = CoreConfig::builder().settings(settings).build()?;
    BoxService::new(config)
}

/// [`bootstrap_desktop`] with settings read from `BOX_*` variables.
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_from_env() -> Result<BoxService> {
    bootstrap_desktop(BoxSettings::from_env()?)
}
