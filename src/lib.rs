//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (currently only `core-service`). Host applications can
//! depend on `boxlink-workspace` and enable `desktop-shims` to get the
//! reqwest, keychain and system-browser adapters wired in.

#[cfg(feature = "desktop-shims")]
pub use core_service::{bootstrap_desktop, bootstrap_from_env, BoxService, CoreError};
