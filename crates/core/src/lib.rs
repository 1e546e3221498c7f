//! Core library for the Nocalhost workbench
//!
//! This crate contains the dev-space tree and its reconciler, the dev-mode
//! orchestrator, the clients for the `kubectl` and `nhctl` CLIs, the local
//! binding registry, settings, logging, and error handling.

pub mod binding;
pub mod command;
pub mod config;
pub mod devmode;
pub mod errors;
pub mod install;
pub mod kubectl;
pub mod logging;
pub mod logs;
pub mod matcher;
pub mod model;
pub mod nhctl;
pub mod notify;
pub mod observability;
pub mod poll;
pub mod reconciler;
pub mod refresh;
pub mod resource;
pub mod session;
pub mod tree;
pub mod workbench;

// Re-export IndexMap for use by dependent crates (preserves insertion order for ordered maps)
pub use indexmap::IndexMap;

pub use errors::{NocalhostError, Result};
pub use session::SessionContext;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
