// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema for the floorlink gateway.
//!
//! # Schema Structure
//!
//! ```text
//! GatewayConfig
//! ├── gateway: GatewaySection   - identity, node prefix, poll cadence
//! ├── opcua: OpcUaSection       - automation server endpoint and security
//! ├── mqtt: MqttSection         - broker endpoint and topics
//! ├── auth: AuthSection         - authorization service
//! ├── rfid: RfidSection         - serial card reader
//! └── logging: LoggingConfig
//! ```
//!
//! Every section and field has a default matching the plant deployment, so an
//! empty file is a valid configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use floorlink_core::{Qos, RouterConfig};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Constants
// =============================================================================

/// Default node prefix of the machine's global variable list.
pub const DEFAULT_NODE_PREFIX: &str = "ns=2;s=|var|CPS-PCS341MB-DS1.Application.GVL.OPC_Machine_A0001";

/// Default card reader poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default monitoring interval in milliseconds.
pub const DEFAULT_MONITORING_INTERVAL_MS: u64 = 100;

/// Default MQTT port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default MQTT keep-alive in seconds.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 25;

/// Default authorization request timeout in milliseconds.
pub const DEFAULT_AUTH_TIMEOUT_MS: u64 = 10_000;

/// Maximum poll interval in milliseconds (1 hour).
pub const MAX_POLL_INTERVAL_MS: u64 = 3_600_000;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Gateway identity and engine settings.
    #[serde(default)]
    pub gateway: GatewaySection,

    /// Automation server connection.
    #[serde(default)]
    pub opcua: OpcUaSection,

    /// Broker connection.
    #[serde(default)]
    pub mqtt: MqttSection,

    /// Authorization service.
    #[serde(default)]
    pub auth: AuthSection,

    /// Card reader.
    #[serde(default)]
    pub rfid: RfidSection,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    /// Validates every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.gateway.validate()?;
        self.opcua.validate()?;
        self.mqtt.validate()?;
        self.auth.validate()?;
        self.rfid.validate()?;
        Ok(())
    }

    /// Builds the routing parameters of the core engine.
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            node_prefix: self.gateway.node_prefix.clone(),
            command_filter: self.mqtt.command_filter.clone(),
            telemetry_topic: self.mqtt.telemetry_topic.clone(),
            qos: self.mqtt.qos,
            auth_service: self.auth.service.clone(),
        }
    }
}

// =============================================================================
// Gateway Section
// =============================================================================

/// Gateway identity and engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    /// Gateway identifier, used in logs.
    #[serde(default = "default_gateway_id")]
    pub id: String,

    /// Node prefix joined to every tag path.
    #[serde(default = "default_node_prefix")]
    pub node_prefix: String,

    /// Delay between card reader cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Capacity of the inbound event queue.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Capacity of the notice broadcast channel.
    #[serde(default = "default_notice_capacity")]
    pub notice_capacity: usize,
}

fn default_gateway_id() -> String {
    "floorlink-01".to_string()
}

fn default_node_prefix() -> String {
    DEFAULT_NODE_PREFIX.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_event_capacity() -> usize {
    1024
}

fn default_notice_capacity() -> usize {
    256
}

impl GatewaySection {
    /// Validates the gateway section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.id.is_empty() {
            return Err(ConfigError::validation("gateway.id", "cannot be empty"));
        }
        if self.id.len() > 64 {
            return Err(ConfigError::validation("gateway.id", "cannot exceed 64 characters"));
        }
        if !self.node_prefix.starts_with("ns=") || !self.node_prefix.contains(';') {
            return Err(ConfigError::validation(
                "gateway.node_prefix",
                "must be a node id such as 'ns=2;s=...'",
            ));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            return Err(ConfigError::validation(
                "gateway.poll_interval_ms",
                format!("must be between 1 and {MAX_POLL_INTERVAL_MS}"),
            ));
        }
        if self.event_capacity == 0 || self.notice_capacity == 0 {
            return Err(ConfigError::validation(
                "gateway.event_capacity",
                "queue capacities must be positive",
            ));
        }
        Ok(())
    }

    /// Returns the card reader poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            id: default_gateway_id(),
            node_prefix: default_node_prefix(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            event_capacity: default_event_capacity(),
            notice_capacity: default_notice_capacity(),
        }
    }
}

// =============================================================================
// OPC UA Section
// =============================================================================

/// Automation server connection.
///
/// `security_mode` and `security_policy` are kept as strings here and parsed
/// by the driver, which owns those types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpcUaSection {
    /// Endpoint URL (`opc.tcp://host:port[/path]`).
    #[serde(default = "default_opcua_endpoint")]
    pub endpoint: String,

    /// Client application name.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Message security mode: `None`, `Sign` or `SignAndEncrypt`.
    #[serde(default = "default_security")]
    pub security_mode: String,

    /// Security policy: `None`, `Basic256Sha256`, ...
    #[serde(default = "default_security")]
    pub security_policy: String,

    /// Username for user-name authentication. Anonymous when absent.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for user-name authentication.
    #[serde(default)]
    pub password: Option<SecretValue>,

    /// Certificate store directory.
    #[serde(default = "default_pki_dir")]
    pub pki_dir: PathBuf,

    /// Trust server certificates without prior import.
    #[serde(default = "default_true")]
    pub trust_server_certs: bool,

    /// Requested session timeout.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_ms: u64,

    /// Publishing and sampling interval of monitored tags.
    #[serde(default = "default_monitoring_interval")]
    pub monitoring_interval_ms: u64,
}

fn default_opcua_endpoint() -> String {
    "opc.tcp://localhost:4840".to_string()
}

fn default_application_name() -> String {
    "floorlink".to_string()
}

fn default_security() -> String {
    "None".to_string()
}

fn default_pki_dir() -> PathBuf {
    PathBuf::from("./pki")
}

fn default_true() -> bool {
    true
}

fn default_session_timeout() -> u64 {
    60_000
}

fn default_monitoring_interval() -> u64 {
    DEFAULT_MONITORING_INTERVAL_MS
}

impl OpcUaSection {
    /// Validates the OPC UA section.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.endpoint.starts_with("opc.tcp://") {
            return Err(ConfigError::validation(
                "opcua.endpoint",
                "must start with 'opc.tcp://'",
            ));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(ConfigError::validation(
                "opcua.password",
                "requires opcua.username",
            ));
        }
        if self.session_timeout_ms == 0 {
            return Err(ConfigError::validation("opcua.session_timeout_ms", "must be positive"));
        }
        if self.monitoring_interval_ms == 0 {
            return Err(ConfigError::validation(
                "opcua.monitoring_interval_ms",
                "must be positive",
            ));
        }
        Ok(())
    }

    /// Returns the session timeout.
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    /// Returns the monitoring interval.
    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_millis(self.monitoring_interval_ms)
    }
}

impl Default for OpcUaSection {
    fn default() -> Self {
        Self {
            endpoint: default_opcua_endpoint(),
            application_name: default_application_name(),
            security_mode: default_security(),
            security_policy: default_security(),
            username: None,
            password: None,
            pki_dir: default_pki_dir(),
            trust_server_certs: true,
            session_timeout_ms: default_session_timeout(),
            monitoring_interval_ms: DEFAULT_MONITORING_INTERVAL_MS,
        }
    }
}

// =============================================================================
// MQTT Section
// =============================================================================

/// Broker connection and topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MqttSection {
    /// Broker host.
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    /// Broker port.
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Username (the device access token on ThingsBoard).
    #[serde(default)]
    pub username: Option<String>,

    /// Password.
    #[serde(default)]
    pub password: Option<SecretValue>,

    /// Keep-alive in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Start with a clean session.
    #[serde(default = "default_true")]
    pub clean_session: bool,

    /// Topic filter carrying dispatch commands.
    #[serde(default = "default_command_filter")]
    pub command_filter: String,

    /// Topic receiving telemetry.
    #[serde(default = "default_telemetry_topic")]
    pub telemetry_topic: String,

    /// QoS for telemetry and the command subscription.
    #[serde(default)]
    pub qos: Qos,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_client_id() -> String {
    "floorlink".to_string()
}

fn default_keep_alive() -> u64 {
    DEFAULT_KEEP_ALIVE_SECS
}

fn default_command_filter() -> String {
    "v1/devices/me/rpc/request/+".to_string()
}

fn default_telemetry_topic() -> String {
    "v1/devices/me/telemetry".to_string()
}

impl MqttSection {
    /// Validates the MQTT section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.is_empty() {
            return Err(ConfigError::validation("mqtt.host", "cannot be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::validation("mqtt.port", "must be positive"));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::validation("mqtt.client_id", "cannot be empty"));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(ConfigError::validation("mqtt.password", "requires mqtt.username"));
        }
        if self.keep_alive_secs < 5 {
            return Err(ConfigError::validation(
                "mqtt.keep_alive_secs",
                "must be at least 5 seconds",
            ));
        }
        if self.command_filter.is_empty() {
            return Err(ConfigError::validation("mqtt.command_filter", "cannot be empty"));
        }
        if self.telemetry_topic.is_empty() || self.telemetry_topic.contains(['+', '#']) {
            return Err(ConfigError::validation(
                "mqtt.telemetry_topic",
                "must be a topic name without wildcards",
            ));
        }
        Ok(())
    }

    /// Returns the keep-alive interval.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: DEFAULT_MQTT_PORT,
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            clean_session: true,
            command_filter: default_command_filter(),
            telemetry_topic: default_telemetry_topic(),
            qos: Qos::AtMostOnce,
        }
    }
}

// =============================================================================
// Auth Section
// =============================================================================

/// Authorization service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    /// Endpoint receiving login requests.
    #[serde(default = "default_auth_url")]
    pub url: String,

    /// Service name sent with every request.
    #[serde(default = "default_auth_service")]
    pub service: String,

    /// Request timeout.
    #[serde(default = "default_auth_timeout")]
    pub timeout_ms: u64,
}

fn default_auth_url() -> String {
    "http://sat-mes/server/auth/authenticate".to_string()
}

fn default_auth_service() -> String {
    "factory".to_string()
}

fn default_auth_timeout() -> u64 {
    DEFAULT_AUTH_TIMEOUT_MS
}

impl AuthSection {
    /// Validates the auth section.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::validation("auth.url", "must be an http(s) URL"));
        }
        if self.service.is_empty() {
            return Err(ConfigError::validation("auth.service", "cannot be empty"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::validation("auth.timeout_ms", "must be positive"));
        }
        Ok(())
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            url: default_auth_url(),
            service: default_auth_service(),
            timeout_ms: DEFAULT_AUTH_TIMEOUT_MS,
        }
    }
}

// =============================================================================
// RFID Section
// =============================================================================

/// Serial card reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RfidSection {
    /// Serial device path.
    #[serde(default = "default_rfid_port")]
    pub port: String,

    /// Baud rate.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Reply timeout per reader command.
    #[serde(default = "default_rfid_timeout")]
    pub timeout_ms: u64,

    /// First block read from each card.
    #[serde(default = "default_start_block")]
    pub start_block: u8,

    /// Number of blocks read.
    #[serde(default = "default_block_count")]
    pub block_count: u8,

    /// Buzzer duration on each valid read, 0 to disable.
    #[serde(default = "default_beep_ms")]
    pub beep_ms: u16,
}

fn default_rfid_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_rfid_timeout() -> u64 {
    200
}

fn default_start_block() -> u8 {
    12
}

fn default_block_count() -> u8 {
    1
}

fn default_beep_ms() -> u16 {
    10
}

impl RfidSection {
    /// Validates the RFID section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.port.is_empty() {
            return Err(ConfigError::validation("rfid.port", "cannot be empty"));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::validation("rfid.baud_rate", "must be positive"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::validation("rfid.timeout_ms", "must be positive"));
        }
        if self.block_count == 0 {
            return Err(ConfigError::validation("rfid.block_count", "must be positive"));
        }
        Ok(())
    }

    /// Returns the reply timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RfidSection {
    fn default() -> Self {
        Self {
            port: default_rfid_port(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_rfid_timeout(),
            start_block: default_start_block(),
            block_count: default_block_count(),
            beep_ms: default_beep_ms(),
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration. Command-line flags take precedence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include span targets in logs.
    #[serde(default = "default_true")]
    pub with_target: bool,

    /// Include file/line in logs.
    #[serde(default)]
    pub with_file: bool,

    /// Include thread IDs in logs.
    #[serde(default)]
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            with_target: true,
            with_file: false,
            with_thread_ids: false,
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::validation(
                "logging.level",
                format!("unknown level '{other}'"),
            )),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON lines.
    Json,
    /// Compact single-line text.
    Compact,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(ConfigError::validation(
                "logging.format",
                format!("unknown format '{other}'"),
            )),
        }
    }
}

// =============================================================================
// Secret Value
// =============================================================================

/// A credential that never appears in logs or debug output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretValue(String);

impl SecretValue {
    /// Creates a new secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the plain value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue(***)")
    }
}

impl std::fmt::Display for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.keep_alive(), Duration::from_secs(25));
        assert_eq!(config.rfid.port, "/dev/ttyUSB0");
        assert_eq!(config.rfid.baud_rate, 115_200);
        assert_eq!(config.gateway.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.opcua.monitoring_interval(), Duration::from_millis(100));
        assert_eq!(config.auth.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_router_config_matches_core_defaults() {
        assert_eq!(GatewayConfig::default().router_config(), RouterConfig::default());
    }

    #[test]
    fn test_router_config_follows_sections() {
        let mut config = GatewayConfig::default();
        config.gateway.node_prefix = "ns=3;s=Line2".into();
        config.mqtt.qos = Qos::AtLeastOnce;
        config.auth.service = "assembly".into();

        let router = config.router_config();
        assert_eq!(router.node_prefix, "ns=3;s=Line2");
        assert_eq!(router.qos, Qos::AtLeastOnce);
        assert_eq!(router.auth_service, "assembly");
    }

    #[test]
    fn test_validation_failures() {
        let mut config = GatewayConfig::default();
        config.opcua.endpoint = "http://plc:4840".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "opcua.endpoint"
        ));

        let mut config = GatewayConfig::default();
        config.mqtt.telemetry_topic = "v1/devices/+/telemetry".into();
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.mqtt.password = Some(SecretValue::new("tenant"));
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.gateway.node_prefix = "Machine".into();
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.rfid.block_count = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.auth.url = "sat-mes/server/auth".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret = SecretValue::new("tenant");
        assert_eq!(secret.to_string(), "***");
        assert_eq!(format!("{secret:?}"), "SecretValue(***)");
        assert_eq!(secret.expose(), "tenant");
    }

    #[test]
    fn test_log_parsing() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("verbose".parse::<LogLevel>().is_err());
    }
}
