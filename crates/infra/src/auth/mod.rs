//! Service-account authentication
//!
//! Turns the configured key document into a delegated, scope-restricted
//! credential and keeps a bearer token for it alive.

pub mod credentials;
pub mod session;

pub use credentials::{AssertionClaims, DelegatedCredential, ServiceAccountKey};
pub use session::{AccessToken, CredentialManager, Session, TokenExchanger};
