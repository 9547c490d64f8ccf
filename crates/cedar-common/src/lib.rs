//! Cedar common types, errors, and configuration.
//!
//! This crate provides shared definitions used across all Cedar components.

pub mod address;
pub mod config;
pub mod error;

pub use address::Address;
pub use config::{IndexConfig, StorageConfig};
pub use error::{CedarError, Result};
