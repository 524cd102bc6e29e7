//! Error types for configuration and caller input

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain-level error for SearchTap
///
/// Raised before any network activity: bad configuration, unknown names, or
/// malformed call parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TapError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for domain operations
pub type Result<T> = std::result::Result<T, TapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(TapError::Config("email missing".into())).unwrap();
        assert_eq!(json, serde_json::json!({"type": "Config", "message": "email missing"}));
    }
}
