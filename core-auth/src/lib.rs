//! # Authentication Module
//!
//! Box OAuth 2.0 authorization-code flow with popup consent.
//!
//! ## Overview
//!
//! - [`TokenStore`] / [`TokenState`]: the persisted credential pair and its
//!   in-memory mirror
//! - [`ConsentBroker`]: correlates the consent popup with the signal the
//!   host delivers when it returns
//! - [`OAuthFlowManager`]: authorize URL, code exchange, refresh, revoke
//! - [`AuthManager`]: single-flight authorization, serialized refresh,
//!   background revocation, auth event emission

pub mod consent;
pub mod error;
pub mod manager;
pub mod oauth;
pub mod token_state;
pub mod token_store;
pub mod types;

pub use consent::{AuthorizationReturned, ConsentBroker, ConsentListener, ConsentRequestId};
pub use error::{AuthError, Result};
pub use manager::{AuthManager, TokenProvider};
pub use oauth::{AuthorizationRequest, OAuthFlowManager, TokenGrant};
pub use token_state::TokenState;
pub use token_store::TokenStore;
pub use types::{AuthState, Credential};
