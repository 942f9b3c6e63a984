//! Consent window backed by the system browser.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    window::{ConsentWindow, WindowRequest},
};
use tracing::{info, warn};

/// Opens the consent page in the user's default browser.
///
/// A browser tab has no notion of window name or size, so `name` and
/// `features` are only logged. The host is expected to catch the redirect
/// (local listener, custom scheme handler) and deliver the returned code to
/// the consent broker using the request's correlation id.
#[derive(Debug, Default, Clone)]
pub struct SystemBrowserWindow;

impl SystemBrowserWindow {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConsentWindow for SystemBrowserWindow {
    async fn open(&self, request: &WindowRequest) -> Result<()> {
        let url = request.url.clone();
        // open::that blocks until the launcher process returns
        let launched = tokio::task::spawn_blocking(move || open::that(url))
            .await
            .map_err(|e| BridgeError::WindowUnavailable(format!("Launcher task failed: {}", e)))?;

        match launched {
            Ok(()) => {
                info!(
                    window = %request.name,
                    features = %request.features,
                    correlation_id = %request.correlation_id,
                    "Opened consent page in system browser"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to open system browser");
                Err(BridgeError::WindowUnavailable(format!(
                    "Failed to open system browser: {}",
                    e
                )))
            }
        }
    }
}
