//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files.

use std::io::Write;

use searchtap_domain::TapError;
use searchtap_infra::config;
use tempfile::Builder;

const KEY_JSON: &str =
    r#"{"type":"service_account","client_email":"tap@p.iam.gserviceaccount.com","private_key":"k"}"#;

fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().expect("Failed to create temp file");
    file.write_all(contents.as_bytes()).expect("Failed to write to temp file");
    file
}

#[test]
fn test_load_config_from_json_file() {
    let json_content = serde_json::json!({
        "credentials_json": KEY_JSON,
        "email": "admin@example.com",
        "base_url": "http://127.0.0.1:8080",
        "rate_limit": {"max_calls": 600},
        "transient_retry": {"max_attempts": 5, "jitter": false}
    })
    .to_string();
    let file = write_config(".json", &json_content);

    let config = config::load_from_file(Some(file.path().to_path_buf())).unwrap();

    assert_eq!(config.credentials_json, KEY_JSON);
    assert_eq!(config.email, "admin@example.com");
    assert_eq!(config.base_url, "http://127.0.0.1:8080");
    assert_eq!(config.rate_limit.max_calls, 600);
    assert_eq!(config.rate_limit.window_secs, 60);
    assert_eq!(config.transient_retry.max_attempts, 5);
    assert_eq!(config.transient_retry.initial_delay_ms, 1000);
    assert!(!config.transient_retry.jitter);
    assert_eq!(config.quota_retry.wait_secs, 900);
}

#[test]
fn test_load_config_from_toml_file() {
    let toml_content = format!(
        r#"
credentials_json = '{KEY_JSON}'
email = "reports@example.com"
user_agent = "nightly-sync/2.1"
request_timeout_secs = 30

[quota_retry]
max_attempts = 3
wait_secs = 600
"#
    );
    let file = write_config(".toml", &toml_content);

    let config = config::load_from_file(Some(file.path().to_path_buf())).unwrap();

    assert_eq!(config.email, "reports@example.com");
    assert_eq!(config.user_agent, "nightly-sync/2.1");
    assert_eq!(config.request_timeout_secs, 30);
    assert_eq!(config.quota_retry.max_attempts, 3);
    assert_eq!(config.quota_retry.wait_secs, 600);
    assert_eq!(config.base_url, "https://searchconsole.googleapis.com");
}

#[test]
fn test_load_config_rejects_invalid_values() {
    let json_content = serde_json::json!({
        "credentials_json": KEY_JSON,
        "email": "admin@example.com",
        "rate_limit": {"max_calls": 0}
    })
    .to_string();
    let file = write_config(".json", &json_content);

    let result = config::load_from_file(Some(file.path().to_path_buf()));
    assert!(matches!(result, Err(TapError::Config(_))));
}

#[test]
fn test_load_config_missing_required_field() {
    let file = write_config(".json", r#"{"email": "admin@example.com"}"#);

    let result = config::load_from_file(Some(file.path().to_path_buf()));
    assert!(matches!(result, Err(TapError::Config(m)) if m.contains("credentials_json")));
}

#[test]
fn test_load_config_invalid_toml() {
    let file = write_config(".toml", "email = ");

    let result = config::load_from_file(Some(file.path().to_path_buf()));
    assert!(matches!(result, Err(TapError::Config(m)) if m.contains("TOML")));
}
