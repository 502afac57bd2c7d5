//! permadex: a permalink index kept current by incremental updates and
//! resumable, chunked full rebuilds.
//!
//! The index maps content ids to their public locators in both directions.
//! Rebuilds fill a shadow table one chunk per step and replace the active
//! table atomically once the last chunk is in.

pub mod builder;
pub mod commands;
pub mod config;
pub mod content;
pub mod error;
pub mod progress;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
