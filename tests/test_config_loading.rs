//! Configuration file loading and credential resolution

use firewatch::config::{ConfigError, MonitorConfig};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn test_load_valid_config_file() {
    let file = write_config(
        r#"
        [mqtt]
        host = "broker.example.com"
        port = 8883
        client_id = "firewatch-hall-3"

        [alerting]
        queue_capacity = 16
    "#,
    );

    let config = MonitorConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.mqtt.host, "broker.example.com");
    assert_eq!(config.mqtt.port, 8883);
    assert_eq!(config.alerting.queue_capacity, 16);
}

#[test]
fn test_load_missing_file_is_io_error() {
    let result = MonitorConfig::load_from_file("/nonexistent/firewatch.toml");
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_load_invalid_config_is_rejected() {
    let file = write_config(
        r#"
        [mqtt]
        host = "broker.example.com"
        client_id = ""
    "#,
    );

    assert!(matches!(
        MonitorConfig::load_from_file(file.path()),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_resolved_parameters_feed_the_connection() {
    let file = write_config(
        r#"
        [mqtt]
        host = "broker.example.com"
        client_id = "firewatch-hall-3"
    "#,
    );

    let config = MonitorConfig::load_from_file(file.path()).unwrap();
    let params = config.resolve_connection_parameters().unwrap();

    assert_eq!(params.host, "broker.example.com");
    assert_eq!(params.port, 1883);
    assert_eq!(params.client_id, "firewatch-hall-3");
    assert_eq!(params.username, None);
}

#[test]
fn test_credentials_resolve_from_environment() {
    let file = write_config(
        r#"
        [mqtt]
        host = "broker.example.com"
        client_id = "firewatch-hall-3"
        username_env = "FIREWATCH_IT_USER"
        password_env = "FIREWATCH_IT_PASS"
    "#,
    );
    std::env::set_var("FIREWATCH_IT_USER", "watcher");
    std::env::set_var("FIREWATCH_IT_PASS", "s3cret");

    let config = MonitorConfig::load_from_file(file.path()).unwrap();
    let params = config.resolve_connection_parameters().unwrap();

    assert_eq!(params.username.as_deref(), Some("watcher"));
    assert_eq!(params.password.as_deref(), Some("s3cret"));

    std::env::remove_var("FIREWATCH_IT_USER");
    std::env::remove_var("FIREWATCH_IT_PASS");
}
