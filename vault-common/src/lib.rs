//! # VaultEstim Common Library
//!
//! Shared code for the VaultEstim services:
//! - Error type
//! - Configuration loading and root folder resolution
//! - Event types (VaultEvent enum) and the EventBus
//! - SQLite initialization

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
