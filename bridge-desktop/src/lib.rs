//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! - `HttpClient` using `reqwest`
//! - `SecureStore` using the `keyring` crate, or an in-memory map
//! - `ConsentWindow` using the system browser via `open`
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{KeyringSecureStore, ReqwestHttpClient, SystemBrowserWindow};
//!
//! let http_client = ReqwestHttpClient::new()?;
//! let secure_store = KeyringSecureStore::new();
//! let window = SystemBrowserWindow::new();
//! ```

mod http;
mod memory_store;
mod window;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use http::ReqwestHttpClient;
pub use memory_store::MemorySecureStore;
pub use window::SystemBrowserWindow;

#[cfg(feature = "secure-store")]
pub use secure_store::{KeyringSecureStore, DEFAULT_SERVICE_NAME};
