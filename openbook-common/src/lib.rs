//! # OpenBook Common Library
//!
//! Shared code for the OpenBook services:
//! - Error and result types
//! - Configuration loading (TOML file + environment overrides)
//! - Database pool initialization and catalog schema

pub mod config;
pub mod db;
pub mod error;

pub use config::{ServiceConfig, SyncSettings};
pub use error::{Error, Result};
