//! # Core Runtime Module
//!
//! Ambient infrastructure shared by the Box integration crates:
//! - [`config`]: `BoxSettings` and the bridge-checked `CoreConfig` builder
//! - [`logging`]: `tracing-subscriber` setup and host log forwarding
//! - [`events`]: broadcast bus for auth and file events
//! - [`error`]: configuration and capability errors

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
