//! Box OAuth 2.0 requests
//!
//! The flow manager builds the consent URL and talks to the token endpoints.
//! Code exchange and refresh go through the application backend, which holds
//! the provider session; the Box token endpoint is never called from here.
//! Only revocation is sent straight to Box.
//!
//! # Security
//!
//! - The client secret never appears in the authorize URL
//! - Codes and tokens are never logged or put in error messages
//! - Nothing here retries; each call is exactly one request
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::OAuthFlowManager;
//! use core_runtime::config::BoxSettings;
//! use std::sync::Arc;
//!
//! # fn example() -> core_auth::Result<()> {
//! # use bridge_traits::http::HttpClient;
//! # let http_client: Arc<dyn HttpClient> = todo!();
//! let settings = BoxSettings::new("client-id", "client-secret", "https://app.example.com");
//! let flow = OAuthFlowManager::new(settings, http_client);
//!
//! let request = flow.authorization_request();
//! println!("Visit: {}", flow.authorize_url(&request)?);
//! # Ok(())
//! # }
//! ```

use crate::consent::ConsentRequestId;
use crate::error::{AuthError, Result};
use crate::types::Credential;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_runtime::config::{BoxSettings, StateToken};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// One authorization attempt's parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub state: String,
    pub request_id: ConsentRequestId,
}

/// Generate a random state value: 16 bytes, base64url without padding.
pub fn random_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Token-endpoint payload.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub restricted_to: Option<serde_json::Value>,
}

impl TokenGrant {
    /// Convert into a complete credential.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredential`] unless both tokens are non-empty.
    pub fn into_credential(self) -> Result<Credential> {
        let refresh_token = self.refresh_token.ok_or_else(|| {
            AuthError::InvalidCredential("response carried no refresh token".to_string())
        })?;
        Credential::new(self.access_token, refresh_token)
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// The backend answers either with the grant itself or wrapped in `data`.
#[derive(Deserialize)]
#[serde(untagged)]
enum GrantEnvelope {
    Wrapped { data: TokenGrant },
    Bare(TokenGrant),
}

impl GrantEnvelope {
    fn into_grant(self) -> TokenGrant {
        match self {
            GrantEnvelope::Wrapped { data } => data,
            GrantEnvelope::Bare(grant) => grant,
        }
    }
}

#[derive(Serialize)]
struct ExchangeBody<'a> {
    grant_type: &'static str,
    code: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Serialize)]
struct RevokeForm<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    token: &'a str,
}

/// Builds consent URLs and performs exchange, refresh and revoke requests.
pub struct OAuthFlowManager {
    settings: BoxSettings,
    http_client: Arc<dyn HttpClient>,
}

impl OAuthFlowManager {
    pub fn new(settings: BoxSettings, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            settings,
            http_client,
        }
    }

    pub fn settings(&self) -> &BoxSettings {
        &self.settings
    }

    /// Parameters for a new attempt, with a fresh request id.
    pub fn authorization_request(&self) -> AuthorizationRequest {
        self.authorization_request_for(ConsentRequestId::new())
    }

    /// Parameters for the attempt correlated by `request_id`.
    pub fn authorization_request_for(&self, request_id: ConsentRequestId) -> AuthorizationRequest {
        let state = match &self.settings.state {
            StateToken::Fixed(value) => value.clone(),
            StateToken::PerAttempt => random_state(),
        };

        AuthorizationRequest {
            client_id: self.settings.client_id.clone(),
            redirect_uri: self.settings.redirect_uri.clone(),
            state,
            request_id,
        }
    }

    /// The consent page URL for `request`.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidConfig`] if the configured authorize URL is not a
    /// valid URL.
    pub fn authorize_url(&self, request: &AuthorizationRequest) -> Result<String> {
        let mut url = Url::parse(&self.settings.authorize_url)
            .map_err(|e| AuthError::InvalidConfig(format!("invalid authorize URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &request.client_id)
            .append_pair("redirect_uri", &request.redirect_uri)
            .append_pair("state", &request.state);

        debug!(request_id = %request.request_id, "Built authorize URL");
        Ok(url.to_string())
    }

    /// Exchange an authorization code through the backend.
    ///
    /// # Errors
    ///
    /// [`AuthError::ExchangeFailed`] on transport failure, non-2xx status,
    /// undecodable body, or a response without both tokens.
    #[instrument(skip(self, code))]
    pub async fn exchange_code(&self, code: &str) -> Result<Credential> {
        let body = ExchangeBody {
            grant_type: "authorization_code",
            code,
            client_id: &self.settings.client_id,
            client_secret: &self.settings.client_secret,
        };

        let request = HttpRequest::new(HttpMethod::Post, self.settings.exchange_endpoint())
            .json(&body)
            .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::ExchangeFailed(e.to_string()))?;

        let credential = grant_from_response(response)
            .and_then(|grant| grant.into_credential().map_err(|e| e.to_string()))
            .map_err(|message| {
                warn!(error = %message, "Authorization code exchange failed");
                AuthError::ExchangeFailed(message)
            })?;

        info!("Exchanged authorization code for credential");
        Ok(credential)
    }

    /// Trade `refresh_token` for a new pair through the backend.
    ///
    /// # Errors
    ///
    /// [`AuthError::RefreshFailed`] on transport failure, non-2xx status,
    /// undecodable body, or a response without both tokens.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Credential> {
        let body = RefreshBody {
            grant_type: "refresh_token",
            refresh_token,
            client_id: &self.settings.client_id,
            client_secret: &self.settings.client_secret,
        };

        let request = HttpRequest::new(HttpMethod::Post, self.settings.refresh_endpoint())
            .json(&body)
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        let credential = grant_from_response(response)
            .and_then(|grant| grant.into_credential().map_err(|e| e.to_string()))
            .map_err(|message| {
                warn!(error = %message, "Token refresh failed");
                AuthError::RefreshFailed(message)
            })?;

        info!("Refreshed credential");
        Ok(credential)
    }

    /// Ask Box to revoke `token`.
    ///
    /// Sent form-encoded straight to the provider revoke endpoint.
    #[instrument(skip(self, token))]
    pub async fn revoke_token(&self, token: &str) -> Result<()> {
        let form = RevokeForm {
            client_id: &self.settings.client_id,
            client_secret: &self.settings.client_secret,
            token,
        };

        let encoded = serde_urlencoded::to_string(&form)
            .map_err(|e| AuthError::InvalidConfig(format!("failed to encode revoke form: {}", e)))?;

        let request = HttpRequest::new(HttpMethod::Post, self.settings.revoke_url.clone())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Bytes::from(encoded));

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::InvalidCredential(format!("revoke request failed: {}", e)))?;

        if !response.is_success() {
            return Err(AuthError::InvalidCredential(format!(
                "revoke endpoint returned {}",
                response.status
            )));
        }

        debug!("Token revoked");
        Ok(())
    }
}

/// Decode a token-endpoint response; errors are returned as display text.
fn grant_from_response(response: HttpResponse) -> std::result::Result<TokenGrant, String> {
    if !response.is_success() {
        let detail = response
            .text()
            .unwrap_or_else(|_| "unreadable error body".to_string());
        return Err(format!("backend returned {}: {}", response.status, detail));
    }

    response
        .json::<GrantEnvelope>()
        .map(GrantEnvelope::into_grant)
        .map_err(|e| format!("failed to decode token response: {}", e))
}
