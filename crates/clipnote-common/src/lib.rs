//! clipnote common - Shared types and utilities
//!
//! This crate provides the record model, error taxonomy, configuration
//! and text helpers used across all clipnote components.

pub mod config;
pub mod error;
pub mod text;
pub mod types;

pub use config::{CacheConfig, Config, KindConfig, LoggingConfig, StorageConfig};
pub use error::{Error, Result};
pub use types::*;
