//! # SearchTap Infrastructure
//!
//! I/O side of the Search Console access layer.
//!
//! This crate contains:
//! - Service-account authentication and the shared session
//! - The endpoint registry and the single-shot HTTP transport
//! - Error classification and the two-tier retry around each call
//! - The rate-limited [`ApiClient`] facade
//! - Configuration loading and logging setup
//!
//! ## Architecture
//! - Resilience primitives (retry executor, sliding-window limiter, clock)
//!   come from `searchtap-common`
//! - Configuration and call types come from `searchtap-domain`

#![recursion_limit = "256"]

pub mod api;
pub mod auth;
pub mod config;
pub mod http;
pub mod observability;

pub use api::{ApiClient, ApiClientBuilder, ApiError, ErrorKind, ReportingApi, RetryPhase};
pub use auth::CredentialManager;
pub use http::{HttpClient, RawResponse, TransportError};
pub use observability::{init_tracing, LogFormat};
