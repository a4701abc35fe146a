// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Configuration Integration Tests
//!
//! Loading complete configuration files into the routing parameters the
//! gateway runs with.

use std::fs;

use floorlink_config::{ConfigError, ConfigFormat, ConfigLoader, GatewayConfig, LogFormat, LogLevel};
use floorlink_tests::prelude::*;

fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
    move |name| {
        vars.iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }
}

const PLC_SECRET: &[(&str, &str)] = &[("PLC_PASSWORD", "s3cret")];

fn assert_station(config: &GatewayConfig) {
    assert_eq!(config.gateway.id, "line1-station4");
    assert_eq!(config.gateway.poll_interval_ms, 250);
    assert_eq!(config.opcua.endpoint, "opc.tcp://192.168.10.20:4840");
    assert_eq!(config.opcua.username.as_deref(), Some("gateway"));
    assert_eq!(config.mqtt.host, "tb.factory.local");
    assert_eq!(config.mqtt.username.as_deref(), Some("A1_TEST_TOKEN"));
    assert_eq!(config.rfid.port, "/dev/ttyUSB1");
    assert_eq!(config.rfid.baud_rate, 115_200);
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.logging.format, LogFormat::Json);
}

// =============================================================================
// Formats
// =============================================================================

#[test]
fn test_yaml_and_toml_agree() {
    let loader = ConfigLoader::new();
    let yaml = loader
        .load_with(YAML_CONFIG, ConfigFormat::Yaml, lookup(PLC_SECRET))
        .unwrap();
    let toml = loader
        .load_with(TOML_CONFIG, ConfigFormat::Toml, lookup(PLC_SECRET))
        .unwrap();

    assert_station(&yaml);
    assert_eq!(yaml, toml);
    assert_eq!(yaml.opcua.password.as_ref().map(|p| p.expose()), Some("s3cret"));
}

#[test]
fn test_router_config_from_file() {
    let config = ConfigLoader::new()
        .load_with(YAML_CONFIG, ConfigFormat::Yaml, lookup(PLC_SECRET))
        .unwrap();
    let router = config.router_config();

    assert_eq!(router.node_prefix, TEST_PREFIX);
    assert_eq!(router.auth_service, "line1");
    assert_eq!(router.command_filter, router_config().command_filter);
    assert_eq!(router.telemetry_topic, TELEMETRY_TOPIC);
}

#[test]
fn test_password_not_logged() {
    let config = ConfigLoader::new()
        .load_with(YAML_CONFIG, ConfigFormat::Yaml, lookup(PLC_SECRET))
        .unwrap();
    assert!(!format!("{config:?}").contains("s3cret"));
}

// =============================================================================
// Files
// =============================================================================

#[test]
fn test_load_from_file() {
    let dir = temp_test_dir("config");
    let path = dir.path().join("gateway.yaml");
    fs::write(&path, YAML_CONFIG).unwrap();

    // Placeholders stay verbatim when expansion is off.
    let config = ConfigLoader::new().with_env_vars(false).load(&path).unwrap();
    assert_station(&config);
    assert_eq!(
        config.opcua.password.as_ref().map(|p| p.expose()),
        Some("${PLC_PASSWORD}")
    );
}

#[test]
fn test_load_format_from_extension() {
    let dir = temp_test_dir("config");
    let path = dir.path().join("gateway.toml");
    fs::write(&path, TOML_CONFIG).unwrap();

    let config = ConfigLoader::new().with_env_vars(false).load(&path).unwrap();
    assert_station(&config);
}

#[test]
fn test_load_missing_file() {
    let dir = temp_test_dir("config");
    let err = ConfigLoader::new()
        .load(dir.path().join("absent.yaml"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound { .. }));
}

#[test]
fn test_load_reports_parse_path() {
    let dir = temp_test_dir("config");
    let path = dir.path().join("broken.yaml");
    fs::write(&path, "gateway: [unterminated").unwrap();

    let err = ConfigLoader::new().with_env_vars(false).load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { path: ref p, .. } if *p == path));
}

// =============================================================================
// Overrides and validation
// =============================================================================

#[test]
fn test_env_override_applied() {
    let config = ConfigLoader::new()
        .load_with(
            YAML_CONFIG,
            ConfigFormat::Yaml,
            lookup(&[
                ("PLC_PASSWORD", "s3cret"),
                ("FLOORLINK_GATEWAY_NODE_PREFIX", "ns=3;s=Line2.Station1"),
                ("FLOORLINK_MQTT_PORT", "8883"),
            ]),
        )
        .unwrap();

    assert_eq!(config.router_config().node_prefix, "ns=3;s=Line2.Station1");
    assert_eq!(config.mqtt.port, 8883);
    assert_eq!(config.mqtt.host, "tb.factory.local");
}

#[test]
fn test_invalid_prefix_rejected() {
    let err = ConfigLoader::new()
        .load_with(
            YAML_CONFIG,
            ConfigFormat::Yaml,
            lookup(&[("FLOORLINK_GATEWAY_NODE_PREFIX", "Line1.Station4")]),
        )
        .unwrap_err();
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "gateway.node_prefix"));
}

#[test]
fn test_password_without_username_rejected() {
    let content = YAML_CONFIG.replace("  username: gateway\n", "");
    let err = ConfigLoader::new()
        .load_with(&content, ConfigFormat::Yaml, lookup(PLC_SECRET))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "opcua.password"));
}

#[test]
fn test_unknown_field_rejected() {
    let content = format!("{YAML_CONFIG}\nextras:\n  enabled: true\n");
    let err = ConfigLoader::new()
        .load_with(&content, ConfigFormat::Yaml, lookup(PLC_SECRET))
        .unwrap_err();
    assert!(!matches!(err, ConfigError::Validation { .. }));
}
