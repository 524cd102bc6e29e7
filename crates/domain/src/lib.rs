//! # SearchTap Domain
//!
//! Domain types for the Search Console access layer.
//!
//! This crate contains:
//! - Client configuration with the published API limits as defaults
//! - Call request and response types
//! - Domain error types and Result definitions
//! - API constants (endpoints, scopes, limits)
//!
//! ## Architecture
//! - No dependencies on other SearchTap crates
//! - No I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
