//! Remote API constants
//!
//! Endpoints, scopes and published limits of the Search Console API.

// Endpoints
pub const DEFAULT_BASE_URL: &str = "https://searchconsole.googleapis.com";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const API_PATH_PREFIX: &str = "/webmasters/v3";

// Credentials
pub const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/webmasters.readonly";
pub const SERVICE_ACCOUNT_TYPE: &str = "service_account";
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
pub const ASSERTION_LIFETIME_SECS: u64 = 3600;
/// Refresh the access token when it has less than this left
pub const TOKEN_REFRESH_THRESHOLD_SECS: u64 = 300;

// Rate limit (https://developers.google.com/webmaster-tools/limits)
pub const RATE_LIMIT_MAX_CALLS: u32 = 1200;
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

// Quota policy
pub const QUOTA_MAX_ATTEMPTS: u32 = 2;
pub const QUOTA_WAIT_SECS: u64 = 900;

// Transient policy
pub const TRANSIENT_MAX_ATTEMPTS: u32 = 7;
pub const TRANSIENT_INITIAL_DELAY_MS: u64 = 1000;
pub const TRANSIENT_BACKOFF_FACTOR: f64 = 3.0;
pub const TRANSIENT_MAX_DELAY_SECS: u64 = 900;

// HTTP
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_USER_AGENT: &str = concat!("searchtap/", env!("CARGO_PKG_VERSION"));
