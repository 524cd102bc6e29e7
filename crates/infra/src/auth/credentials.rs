//! Service-account keys and the signed assertions exchanged for tokens.

use std::fmt;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use searchtap_domain::constants::{ASSERTION_LIFETIME_SECS, DEFAULT_TOKEN_URI, SERVICE_ACCOUNT_TYPE};
use serde::{Deserialize, Serialize};

use crate::api::errors::ApiError;

/// Service-account key document as issued by the identity provider
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub client_email: String,
    private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("key_type", &self.key_type)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Parse and sanity-check a key document
    pub fn from_json(json: &str) -> Result<Self, ApiError> {
        let key: Self = serde_json::from_str(json)
            .map_err(|e| ApiError::Credential(format!("credentials are not a valid key document: {e}")))?;

        if key.key_type != SERVICE_ACCOUNT_TYPE {
            return Err(ApiError::Credential(format!(
                "expected a '{SERVICE_ACCOUNT_TYPE}' key, got '{}'",
                key.key_type
            )));
        }
        if key.client_email.trim().is_empty() {
            return Err(ApiError::Credential("key has no client_email".into()));
        }
        if key.private_key.trim().is_empty() {
            return Err(ApiError::Credential("key has no private_key".into()));
        }
        Ok(key)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub scope: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}

/// Service account acting on behalf of `subject`, restricted to `scopes`
#[derive(Clone)]
pub struct DelegatedCredential {
    key: ServiceAccountKey,
    subject: String,
    scopes: Vec<String>,
    signing_key: EncodingKey,
}

impl fmt::Debug for DelegatedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedCredential")
            .field("client_email", &self.key.client_email)
            .field("subject", &self.subject)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl DelegatedCredential {
    pub fn new(
        key: ServiceAccountKey,
        subject: impl Into<String>,
        scopes: Vec<String>,
    ) -> Result<Self, ApiError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| ApiError::Credential(format!("private key is not a valid RSA PEM: {e}")))?;
        Ok(Self { key, subject: subject.into(), scopes, signing_key })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    pub fn token_uri(&self) -> &str {
        &self.key.token_uri
    }

    /// Signed RS256 JWT asserting the delegation, valid from `issued_at`
    pub fn assertion(&self, issued_at: u64) -> Result<String, ApiError> {
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            sub: self.subject.clone(),
            scope: self.scopes.join(" "),
            aud: self.key.token_uri.clone(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid.clone_from(&self.key.private_key_id);

        jsonwebtoken::encode(&header, &claims, &self.signing_key)
            .map_err(|e| ApiError::Credential(format!("failed to sign assertion: {e}")))
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}
