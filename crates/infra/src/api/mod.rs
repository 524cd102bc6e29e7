//! Search Console API access
//!
//! - [`resolver`] maps `resource.method` names onto HTTP endpoints
//! - [`classifier`] turns responses and transport failures into [`ErrorKind`]s
//! - [`retry`] nests the quota and transient retry tiers
//! - [`client`] ties them together behind the rate limiter and session

pub mod classifier;
pub mod client;
pub mod errors;
pub mod resolver;
pub mod retry;

pub use client::{ApiClient, ApiClientBuilder, ReportingApi};
pub use errors::{ApiError, ErrorKind, RemoteFailure, RetryPhase};
pub use resolver::{Invocation, ResourceResolver};
pub use retry::{QuotaPolicy, RetryOrchestrator, TransientPolicy};
