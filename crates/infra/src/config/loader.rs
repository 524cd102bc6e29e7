//! Configuration loader
//!
//! Loads the client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `SEARCHTAP_CREDENTIALS_JSON`: Service-account key document
//! - `SEARCHTAP_CREDENTIALS_FILE`: Path to the key document (used when
//!   `SEARCHTAP_CREDENTIALS_JSON` is not set)
//! - `SEARCHTAP_EMAIL`: Account the service account impersonates
//! - `SEARCHTAP_USER_AGENT`: Optional user agent override
//! - `SEARCHTAP_BASE_URL`: Optional API root override
//! - `SEARCHTAP_REQUEST_TIMEOUT_SECS`: Optional per-request timeout
//! - `SEARCHTAP_RETRY_JITTER`: Randomise transient backoff (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./searchtap.json` or `./searchtap.toml` (current working directory)
//! 2. `./config.json` or `./config.toml` (current working directory)
//! 3. `../searchtap.json` or `../searchtap.toml` (parent directory)
//! 4. Relative to executable location

use std::path::{Path, PathBuf};

use searchtap_domain::{ClientConfig, Result, TapError};

pub const ENV_CREDENTIALS_JSON: &str = "SEARCHTAP_CREDENTIALS_JSON";
pub const ENV_CREDENTIALS_FILE: &str = "SEARCHTAP_CREDENTIALS_FILE";
pub const ENV_EMAIL: &str = "SEARCHTAP_EMAIL";
pub const ENV_USER_AGENT: &str = "SEARCHTAP_USER_AGENT";
pub const ENV_BASE_URL: &str = "SEARCHTAP_BASE_URL";
pub const ENV_REQUEST_TIMEOUT: &str = "SEARCHTAP_REQUEST_TIMEOUT_SECS";
pub const ENV_RETRY_JITTER: &str = "SEARCHTAP_RETRY_JITTER";

const CONFIG_FILE_NAMES: [&str; 4] =
    ["searchtap.json", "searchtap.toml", "config.json", "config.toml"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `TapError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - Required fields are missing or fail validation
pub fn load() -> Result<ClientConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `TapError::Config` if required variables are missing, the
/// credentials file cannot be read, or a value is invalid.
pub fn load_from_env() -> Result<ClientConfig> {
    let credentials_json = match std::env::var(ENV_CREDENTIALS_JSON) {
        Ok(json) if !json.trim().is_empty() => json,
        _ => {
            let path = env_var(ENV_CREDENTIALS_FILE).map_err(|_| {
                TapError::Config(format!(
                    "Missing required environment variable: {ENV_CREDENTIALS_JSON} or {ENV_CREDENTIALS_FILE}"
                ))
            })?;
            std::fs::read_to_string(&path).map_err(|e| {
                TapError::Config(format!("Failed to read credentials file '{path}': {e}"))
            })?
        }
    };
    let email = env_var(ENV_EMAIL)?;

    let mut config = ClientConfig::new(credentials_json, email);
    if let Ok(agent) = std::env::var(ENV_USER_AGENT) {
        config = config.with_user_agent(agent);
    }
    if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
        config = config.with_base_url(base_url);
    }
    if let Ok(timeout) = std::env::var(ENV_REQUEST_TIMEOUT) {
        config.request_timeout_secs = timeout
            .parse::<u64>()
            .map_err(|e| TapError::Config(format!("Invalid request timeout: {e}")))?;
    }
    config.transient_retry.jitter = env_bool(ENV_RETRY_JITTER, config.transient_retry.jitter);

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `TapError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid or validation fails
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(TapError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            TapError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TapError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration, format chosen by the file extension
fn parse_config(contents: &str, path: &Path) -> Result<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TapError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| TapError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(TapError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file in the working directory, its parent, or
/// next to the executable
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| cwd.join(name)));
        candidates.extend(CONFIG_FILE_NAMES[..2].iter().map(|name| cwd.join("..").join(name)));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(CONFIG_FILE_NAMES.iter().map(|name| exe_dir.join(name)));
        }
    }

    candidates.into_iter().find(|path| path.is_file())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| TapError::Config(format!("Missing required environment variable: {key}")))
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const KEY_JSON: &str = r#"{"type":"service_account","client_email":"tap@p.iam.gserviceaccount.com","private_key":"k"}"#;

    fn clear_env() {
        for key in [
            ENV_CREDENTIALS_JSON,
            ENV_CREDENTIALS_FILE,
            ENV_EMAIL,
            ENV_USER_AGENT,
            ENV_BASE_URL,
            ENV_REQUEST_TIMEOUT,
            ENV_RETRY_JITTER,
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("SEARCHTAP_TEST_BOOL_ON", "On");
        std::env::set_var("SEARCHTAP_TEST_BOOL_OFF", "0");
        std::env::remove_var("SEARCHTAP_TEST_BOOL_MISSING");

        assert!(env_bool("SEARCHTAP_TEST_BOOL_ON", false));
        assert!(!env_bool("SEARCHTAP_TEST_BOOL_OFF", true));
        assert!(env_bool("SEARCHTAP_TEST_BOOL_MISSING", true));

        std::env::remove_var("SEARCHTAP_TEST_BOOL_ON");
        std::env::remove_var("SEARCHTAP_TEST_BOOL_OFF");
    }

    #[test]
    fn test_load_from_env_inline_credentials() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var(ENV_CREDENTIALS_JSON, KEY_JSON);
        std::env::set_var(ENV_EMAIL, "admin@example.com");
        std::env::set_var(ENV_BASE_URL, "http://127.0.0.1:9000");
        std::env::set_var(ENV_REQUEST_TIMEOUT, "15");
        std::env::set_var(ENV_RETRY_JITTER, "false");

        let config = load_from_env().unwrap();
        assert_eq!(config.credentials_json, KEY_JSON);
        assert_eq!(config.email, "admin@example.com");
        assert_eq!(config.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.request_timeout_secs, 15);
        assert!(!config.transient_retry.jitter);
        assert_eq!(config.rate_limit.max_calls, 1200);

        clear_env();
    }

    #[test]
    fn test_load_from_env_credentials_file() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let mut key_file = NamedTempFile::new().unwrap();
        key_file.write_all(KEY_JSON.as_bytes()).unwrap();
        std::env::set_var(ENV_CREDENTIALS_FILE, key_file.path());
        std::env::set_var(ENV_EMAIL, "admin@example.com");

        let config = load_from_env().unwrap();
        assert_eq!(config.credentials_json, KEY_JSON);

        clear_env();
    }

    #[test]
    fn test_load_from_env_missing_var() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var(ENV_EMAIL, "admin@example.com");
        let err = load_from_env().unwrap_err();
        assert!(matches!(&err, TapError::Config(m) if m.contains(ENV_CREDENTIALS_FILE)));

        std::env::remove_var(ENV_EMAIL);
        std::env::set_var(ENV_CREDENTIALS_JSON, KEY_JSON);
        let err = load_from_env().unwrap_err();
        assert!(matches!(&err, TapError::Config(m) if m.contains(ENV_EMAIL)));

        clear_env();
    }

    #[test]
    fn test_load_from_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var(ENV_CREDENTIALS_JSON, KEY_JSON);
        std::env::set_var(ENV_EMAIL, "admin@example.com");
        std::env::set_var(ENV_REQUEST_TIMEOUT, "soon");

        assert!(matches!(load_from_env(), Err(TapError::Config(_))));

        clear_env();
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/searchtap.json")));
        assert!(matches!(result, Err(TapError::Config(_))));
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_content = r#"
credentials_json = '{"type":"service_account"}'
email = "admin@example.com"

[quota_retry]
wait_secs = 60
"#;
        let config = parse_config(toml_content, Path::new("searchtap.toml")).unwrap();
        assert_eq!(config.quota_retry.wait_secs, 60);
        assert_eq!(config.quota_retry.max_attempts, 2);
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("email: a@b.c", Path::new("searchtap.yaml"));
        assert!(matches!(result, Err(TapError::Config(m)) if m.contains("yaml")));
    }
}
