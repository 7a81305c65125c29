//! Core of the Telegram bulk checker.
//!
//! Framework-agnostic: the directory service lives behind the
//! [`directory::DirectoryClient`] port, implemented in adapter crates.

pub mod classify;
pub mod clock;
pub mod config;
pub mod csv;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod identifier;
pub mod logging;
pub mod pipeline;
pub mod retry;
pub mod throttle;

pub use errors::{Error, Result};
