//! # truenas-core
//!
//! Core types and utilities shared by the TrueNAS SCALE API facade and provider.
//!
//! ## Modules
//!
//! - [`error`] - Shared error type and the closed error-code taxonomy
//! - [`api_error`] - Classified server errors and the raw error-string parser
//! - [`version`] - Server version parsing and comparison
//! - [`types`] - API method families and version-qualified method resolution
//! - [`ids`] - Strongly-typed numeric identifiers for server objects
//! - [`config`] - Provider connection configuration
//! - [`client`] - HTTP client tuning, retry and polling policies

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api_error;
pub mod client;
pub mod config;
pub mod error;
pub mod ids;
pub mod types;
pub mod version;

// Re-export commonly used types
pub use api_error::ApiError;
pub use error::{Error, ErrorCode, Result};
pub use version::Version;
