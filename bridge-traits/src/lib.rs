//! # Host Bridge Traits
//!
//! Contracts between the Box integration core and the host that embeds it.
//!
//! ## Overview
//!
//! The core owns the authorization protocol: consent, code exchange, refresh,
//! the single retry after a rejected credential, and revocation. Everything it
//! needs from the outside world is expressed as a trait in this crate so each
//! host (desktop app, test harness) can supply its own adapter.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Backend and provider HTTP calls
//! - [`SecureStore`](storage::SecureStore) - Durable credential storage
//! - [`ConsentWindow`](window::ConsentWindow) - Shows the provider consent page
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails with a descriptive `CapabilityMissing` error at
//! configuration time when a required bridge has not been provided, instead
//! of failing on first use.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Adapters convert
//! platform errors into it and never put credential values in messages.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single adapter can be shared
//! across concurrent call chains.
//!
//! ## Examples
//!
//! ```ignore
//! use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyHttpClient {
//!     client: reqwest::Client,
//! }
//!
//! #[async_trait]
//! impl HttpClient for MyHttpClient {
//!     async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod http;
pub mod logging;
pub mod storage;
pub mod window;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use logging::{LogEntry, LogLevel, LoggerSink};
pub use storage::SecureStore;
pub use window::{ConsentWindow, WindowRequest};
