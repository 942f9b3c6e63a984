//! Box data access through the application backend
//!
//! Listing and download requests go to backend proxies that forward them to
//! Box with the access token passed as the `access_token` query parameter.

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_auth::TokenProvider;
use core_runtime::config::BoxSettings;
use core_runtime::events::{CoreEvent, EventBus, FileEvent};
use core_runtime::logging::strip_query;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{BoxError, Result};
use crate::types::{DownloadRequest, FolderItems, ListingResponse};

/// Number of times a listing is retried after a 401 and a refresh
const UNAUTHORIZED_RETRY_BUDGET: u32 = 1;

/// Box connector
///
/// # Features
///
/// - Folder listing with consent on first use
/// - One refresh and one retry when the backend answers 401
/// - Server-side download requests
///
/// # Example
///
/// ```ignore
/// use provider_box::BoxConnector;
///
/// let connector = BoxConnector::new(http_client, auth_manager, settings);
/// let page = connector.load("0", 0, 100).await?;
/// ```
pub struct BoxConnector {
    http_client: Arc<dyn HttpClient>,
    auth: Arc<dyn TokenProvider>,
    settings: BoxSettings,
    event_bus: Option<EventBus>,
}

impl BoxConnector {
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `auth` - Source of access tokens (usually the `AuthManager`)
    /// * `settings` - Backend location and API version
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        auth: Arc<dyn TokenProvider>,
        settings: BoxSettings,
    ) -> Self {
        Self {
            http_client,
            auth,
            settings,
            event_bus: None,
        }
    }

    /// Emit file events on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    fn emit(&self, event: FileEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Files(event));
        }
    }

    fn list_url(&self, folder_id: &str, offset: u64, limit: u64, access_token: &str) -> String {
        format!(
            "{}?limit={}&offset={}&folderId={}&access_token={}",
            self.settings.list_endpoint(),
            limit,
            offset,
            urlencoding::encode(folder_id),
            urlencoding::encode(access_token)
        )
    }

    /// List one page of a folder.
    ///
    /// Prompts for consent first if nothing is stored. A 401 triggers one
    /// refresh and one retry with the new token.
    ///
    /// # Errors
    ///
    /// - `Auth` - consent, refresh or storage failed; after a failed refresh
    ///   the credential has already been cleared
    /// - `UpstreamRequestFailed` - any other failure status, a transport
    ///   failure, or a second 401
    /// - `ParseError` - the listing could not be decoded
    #[instrument(skip(self))]
    pub async fn load(&self, folder_id: &str, offset: u64, limit: u64) -> Result<FolderItems> {
        self.auth.ensure_authorized().await?;

        let mut retries_left = UNAUTHORIZED_RETRY_BUDGET;

        loop {
            let access_token = self.auth.access_token().await?;
            let url = self.list_url(folder_id, offset, limit, &access_token);

            let request = HttpRequest::new(HttpMethod::Get, url)
                .header("Accept", "application/json");
            let response = self.send(request).await?;

            if response.is_unauthorized() {
                if retries_left > 0 {
                    retries_left -= 1;
                    info!("Listing rejected with 401, refreshing credential");
                    self.auth.refresh_rejected(&access_token).await?;
                    continue;
                }

                warn!("Listing rejected with 401 after refresh");
                return Err(failure(&response));
            }

            if !response.is_success() {
                warn!(status = response.status, "Listing request failed");
                return Err(failure(&response));
            }

            let listing: ListingResponse = response
                .json()
                .map_err(|e| BoxError::ParseError(e.to_string()))?;

            debug!(items = listing.data.len(), "Folder listing loaded");
            self.emit(FileEvent::FolderLoaded {
                folder_id: folder_id.to_string(),
                item_count: listing.data.len(),
            });
            return Ok(listing.data);
        }
    }

    /// Ask the backend to fetch `url` server-side and store it as
    /// `file_name`.
    ///
    /// The current access token is appended to `url`. Single-shot; nothing
    /// is retried or refreshed.
    ///
    /// # Returns
    ///
    /// The backend's JSON response (`null` for an empty body).
    #[instrument(skip(self, url))]
    pub async fn request_download(&self, url: &str, file_name: &str) -> Result<serde_json::Value> {
        let access_token = self.auth.access_token().await?;

        let mut download_url = Url::parse(url)
            .map_err(|e| BoxError::ParseError(format!("invalid download URL: {}", e)))?;
        download_url
            .query_pairs_mut()
            .append_pair("access_token", &access_token);

        let body = DownloadRequest {
            uuid: Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            url: download_url.to_string(),
        };

        let request =
            HttpRequest::new(HttpMethod::Post, self.settings.download_endpoint()).json(&body)?;
        let response = self.send(request).await?;

        if !response.is_success() {
            warn!(status = response.status, "Download request failed");
            return Err(failure(&response));
        }

        let value = if response.body.is_empty() {
            serde_json::Value::Null
        } else {
            response
                .json()
                .map_err(|e| BoxError::ParseError(e.to_string()))?
        };

        info!(request_id = %body.uuid, "Download requested");
        self.emit(FileEvent::DownloadRequested {
            request_id: body.uuid,
            file_name: body.file_name,
        });
        Ok(value)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let target = strip_query(&request.url).to_string();
        self.http_client.execute(request).await.map_err(|e| {
            warn!(url = %target, error = %e, "Backend request did not complete");
            BoxError::upstream(None, e.to_string())
        })
    }
}

fn failure(response: &HttpResponse) -> BoxError {
    let message = response
        .text()
        .ok()
        .filter(|body| !body.is_empty())
        .unwrap_or_else(|| format!("backend returned {}", response.status));
    BoxError::upstream(Some(response.status), message)
}
