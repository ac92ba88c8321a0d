//! Unit tests for config.rs module

use lead_feed::config::AppConfig;
use lead_feed::models::DEFAULT_COOKIE_PREFIX;
use lead_feed::payload::DEFAULT_IGNORED_FIELD_PATTERNS;

#[test]
fn test_default_config_values() {
    let config = AppConfig::default();

    assert_eq!(config.database.url, "sqlite:data/lead_feed.db");
    assert_eq!(config.database.max_connections, 10);
    assert_eq!(config.database.connection_timeout_secs, 30);
}

#[test]
fn test_default_logging_config() {
    let config = AppConfig::default();

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.file_path, None);
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_default_api_config() {
    let config = AppConfig::default();

    assert!(config.api.username.is_empty());
    assert!(config.api.key.is_empty());
    assert!(config.api.lead_url.ends_with("/live/leads/bvi-form/new"));
    assert!(config.api.verify_url.ends_with("/live/leads/bvi-form/verify"));
}

#[test]
fn test_default_feed_config() {
    let config = AppConfig::default();

    assert_eq!(config.feed.cookie_prefix, DEFAULT_COOKIE_PREFIX);
    assert_eq!(
        config.feed.ignored_field_patterns,
        DEFAULT_IGNORED_FIELD_PATTERNS.to_vec()
    );
}

#[test]
fn test_config_validation_success() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation_zero_max_connections() {
    let mut config = AppConfig::default();
    config.database.max_connections = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_zero_connection_timeout() {
    let mut config = AppConfig::default();
    config.database.connection_timeout_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_non_sqlite_database() {
    let mut config = AppConfig::default();
    config.database.url = "postgres://localhost/leads".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_invalid_log_level() {
    let mut config = AppConfig::default();
    config.logging.level = "verbose".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_invalid_log_format() {
    let mut config = AppConfig::default();
    config.logging.format = "xml".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_bad_endpoint() {
    let mut config = AppConfig::default();
    config.api.lead_url = "ftp://example.com/new".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.api.verify_url = "not a url".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_api_key_with_spaces() {
    let mut config = AppConfig::default();
    config.api.key = "has a space".to_string();
    assert!(config.validate().is_err());

    config.api.key = "abc123".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation_maintainer_email() {
    let mut config = AppConfig::default();
    config.notify.maintainer_email = "nobody".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_empty_cookie_prefix() {
    let mut config = AppConfig::default();
    config.feed.cookie_prefix = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validation_bad_pattern() {
    let mut config = AppConfig::default();
    config.feed.ignored_field_patterns.push("(unclosed".to_string());
    assert!(config.validate().is_err());
}

#[test]
fn test_config_serializes_to_yaml() {
    let config = AppConfig::default();
    let yaml = serde_yaml::to_string(&config).unwrap();
    let back: AppConfig = serde_yaml::from_str(&yaml).unwrap();

    assert_eq!(back.api.lead_url, config.api.lead_url);
    assert_eq!(back.feed.cookie_prefix, config.feed.cookie_prefix);
}

#[test]
fn test_config_validation_username() {
    let mut config = AppConfig::default();
    config.api.username = "acme".to_string();
    assert!(config.validate().is_ok());

    config.api.username = "   ".to_string();
    assert!(config.validate().is_err());

    config.api.username = "a".repeat(101);
    assert!(config.validate().is_err());
}
