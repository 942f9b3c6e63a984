//! # Box Provider
//!
//! Folder listing and server-side downloads for Box, proxied through the
//! application backend.
//!
//! ## Overview
//!
//! This module provides:
//! - Folder listing that prompts for consent on first use
//! - A single refresh-and-retry when the backend rejects the access token
//! - Download requests handed to the backend upload proxy

pub mod connector;
pub mod error;
pub mod types;

pub use connector::BoxConnector;
pub use error::{BoxError, Result};
pub use types::{BoxCollection, BoxItem, BoxItemType, FolderItems};
