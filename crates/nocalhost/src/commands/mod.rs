//! Command implementations
//!
//! This module contains implementations for all CLI subcommands.

pub mod bindings;
pub mod dev;
pub mod install;
pub mod logs;
pub mod shared;
pub mod tree;
pub mod watch;
