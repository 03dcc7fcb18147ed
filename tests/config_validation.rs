//! Integration tests for configuration validation

#![allow(clippy::expect_used)]

use funxmpp::config::{ClientConfig, Config, LoggingConfig, TransportConfig};
use std::time::Duration;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = Config::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_defaults_match_protocol_constants() {
    let config = Config::default();
    assert_eq!(config.transport.host, "c.whatsapp.net");
    assert_eq!(config.transport.ports, vec![443, 5222]);
    assert_eq!(config.transport.connect_tries, 3);
    assert_eq!(config.client.server, "s.whatsapp.net");
    assert_eq!(config.client.version, "Android-2.8.5732");
    assert_eq!(config.client.poll_interval, Duration::from_millis(100));
}

#[test]
fn test_empty_host() {
    let mut config = Config::default();
    config.transport.host = String::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Host cannot be empty")));
}

#[test]
fn test_port_rotation_requires_ports() {
    let transport = TransportConfig {
        ports: Vec::new(),
        ..TransportConfig::default()
    };
    assert!(transport.validate().iter().any(|e| e.contains("port")));

    let transport = TransportConfig {
        ports: vec![443, 0],
        ..TransportConfig::default()
    };
    assert!(transport.validate().iter().any(|e| e.contains("Port 0")));
}

#[test]
fn test_connect_budget() {
    let transport = TransportConfig {
        connect_tries: 0,
        connect_timeout: Duration::from_millis(10),
        ..TransportConfig::default()
    };
    let errors = transport.validate();
    assert!(errors.iter().any(|e| e.contains("Connect tries")));
    assert!(errors.iter().any(|e| e.contains("Connect timeout too short")));
}

#[test]
fn test_poll_interval_bounds() {
    let client = ClientConfig {
        poll_interval: Duration::ZERO,
        ..ClientConfig::default()
    };
    assert!(client.validate().iter().any(|e| e.contains("Poll interval")));

    let client = ClientConfig {
        poll_interval: Duration::from_secs(2),
        request_timeout: Duration::from_secs(1),
        ..ClientConfig::default()
    };
    assert!(client.validate().iter().any(|e| e.contains("Request timeout")));
}

#[test]
fn test_logging_needs_an_output() {
    let logging = LoggingConfig {
        log_to_console: false,
        log_to_file: false,
        ..LoggingConfig::default()
    };
    assert!(logging
        .validate()
        .iter()
        .any(|e| e.contains("At least one logging output")));
}

#[test]
fn test_validate_strict_joins_errors() {
    let config = Config::default_with_overrides(|c| {
        c.transport.host.clear();
        c.client.server.clear();
    });
    let err = config.validate_strict().expect_err("invalid config");
    let message = err.to_string();
    assert!(message.contains("Host cannot be empty"));
    assert!(message.contains("Server domain cannot be empty"));
}

#[test]
fn test_toml_round_trip_uses_millis() {
    let config = Config::default_with_overrides(|c| {
        c.client.poll_interval = Duration::from_millis(25);
        c.logging.log_level = Level::DEBUG;
    });
    let text = toml::to_string_pretty(&config).expect("serializes");
    assert!(text.contains("poll_interval = 25"));
    assert!(text.contains("log_level = \"debug\""));

    let parsed = Config::from_toml(&text).expect("parses");
    assert_eq!(parsed.client.poll_interval, Duration::from_millis(25));
    assert_eq!(parsed.logging.log_level, Level::DEBUG);
}

#[test]
fn test_partial_toml_falls_back_to_defaults() {
    let parsed = Config::from_toml(
        r#"
        [transport]
        host = "127.0.0.1"
        ports = [5222]
        connect_tries = 1
        connect_timeout = 500
        "#,
    )
    .expect("parses");
    assert_eq!(parsed.transport.ports, vec![5222]);
    assert_eq!(parsed.transport.read_buffer_size, 4096);
    assert_eq!(parsed.client.server, "s.whatsapp.net");
}

#[test]
fn test_invalid_toml_is_config_error() {
    let err = Config::from_toml("[transport]\nports = \"many\"").expect_err("rejected");
    assert!(err.to_string().contains("Failed to parse TOML"));
}

#[test]
fn test_save_and_load_file() {
    let path = std::env::temp_dir().join(format!("funxmpp-config-{}.toml", std::process::id()));
    let config = Config::default_with_overrides(|c| c.transport.connect_tries = 7);
    config.save_to_file(&path).expect("writes");

    let loaded = Config::from_file(&path).expect("reads");
    assert_eq!(loaded.transport.connect_tries, 7);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_from_env_overrides() {
    std::env::set_var("FUNXMPP_PORTS", "5222, 443");
    std::env::set_var("FUNXMPP_POLL_INTERVAL_MS", "40");
    let config = Config::from_env().expect("valid env");
    std::env::remove_var("FUNXMPP_PORTS");
    std::env::remove_var("FUNXMPP_POLL_INTERVAL_MS");

    assert_eq!(config.transport.ports, vec![5222, 443]);
    assert_eq!(config.client.poll_interval, Duration::from_millis(40));
}

#[test]
fn test_example_config_parses() {
    let example = Config::example_config();
    assert!(Config::from_toml(&example).is_ok());
}
