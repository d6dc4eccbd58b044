//! Core types, configuration, and utilities for the duskbar status bar.
//!
//! This crate provides:
//! - Configuration parsing from TOML
//! - Logging setup
//! - The shared error type

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, ConfigLoadResult, DEFAULT_CONFIG_TOML};
pub use error::{Error, Result};
