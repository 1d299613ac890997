//! bloomkv Common - Shared types and configuration
//!
//! This crate provides the configuration model, bucket naming rules and
//! error definitions shared by the store and the binaries.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
