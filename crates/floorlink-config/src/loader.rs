// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and pick the format from its extension
//! 2. Expand `${VAR}` / `${VAR:default}` placeholders in the raw text
//! 3. Deserialize into [`GatewayConfig`]
//! 4. Apply `FLOORLINK_<SECTION>_<KEY>` environment overrides
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! FLOORLINK_MQTT_HOST=broker.plant.local
//! FLOORLINK_MQTT_PORT=8883
//! FLOORLINK_OPCUA_ENDPOINT=opc.tcp://10.0.0.5:4840
//! FLOORLINK_LOG_LEVEL=debug
//! ```

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{GatewayConfig, LogFormat, LogLevel, SecretValue};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "FLOORLINK";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader.
///
/// # Examples
///
/// ```no_run
/// use floorlink_config::loader::ConfigLoader;
///
/// let config = ConfigLoader::new().load("floorlink.yaml").unwrap();
/// println!("broker: {}:{}", config.mqtt.host, config.mqtt.port);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve environment variables.
    resolve_env_vars: bool,
}

impl ConfigLoader {
    /// Creates a loader with the `FLOORLINK` prefix and environment resolution on.
    pub fn new() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
        }
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables placeholders and overrides.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The format follows the extension: `.yaml`/`.yml`, `.toml` or `.json`.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<GatewayConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let format = ConfigFormat::from_path(path)?;

        let config = self.load_from_str(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })?;

        debug!(
            gateway = %config.gateway.id,
            opcua = %config.opcua.endpoint,
            broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
            reader = %config.rfid.port,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<GatewayConfig> {
        self.load_with(content, format, |name| env::var(name).ok())
    }

    /// Loads configuration resolving variables through `lookup`.
    pub fn load_with<F>(&self, content: &str, format: ConfigFormat, lookup: F) -> ConfigResult<GatewayConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if self.resolve_env_vars {
            parse_str(&resolve_placeholders(content, &lookup), format)?
        } else {
            parse_str(content, format)?
        };

        if self.resolve_env_vars {
            apply_env_overrides(&mut config, &self.env_prefix, &lookup)?;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

fn parse_str(content: &str, format: ConfigFormat) -> ConfigResult<GatewayConfig> {
    // An empty YAML document is `null`, not an empty mapping.
    if format == ConfigFormat::Yaml && content.trim().is_empty() {
        return Ok(GatewayConfig::default());
    }
    match format {
        ConfigFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
    }
}

// =============================================================================
// Placeholders
// =============================================================================

/// Expands `${VAR}` and `${VAR:default}` placeholders.
///
/// An unset variable without a default keeps its placeholder text; an
/// unterminated `${` is copied through unchanged.
pub fn resolve_placeholders<F>(content: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            return result;
        };

        let body = &after[..end];
        let (name, default) = match body.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (body, None),
        };
        match (lookup(name), default) {
            (Some(value), _) => result.push_str(&value),
            (None, Some(default)) => result.push_str(default),
            (None, None) => {
                warn!(variable = name, "Environment variable not found");
                result.push_str(&rest[start..start + 2 + end + 1]);
            }
        }
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    result
}

// =============================================================================
// Overrides
// =============================================================================

fn parse_env<T: FromStr>(name: &str, value: &str, expected: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid_env_var(name, format!("expected {expected}")))
}

/// Applies `<PREFIX>_<SECTION>_<KEY>` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, prefix: &str, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| {
        let name = format!("{prefix}_{key}");
        lookup(&name).map(|value| (name, value))
    };

    // Gateway
    if let Some((_, value)) = var("GATEWAY_ID") {
        config.gateway.id = value;
    }
    if let Some((_, value)) = var("GATEWAY_NODE_PREFIX") {
        config.gateway.node_prefix = value;
    }
    if let Some((name, value)) = var("GATEWAY_POLL_INTERVAL_MS") {
        config.gateway.poll_interval_ms = parse_env(&name, &value, "milliseconds")?;
    }

    // OPC UA
    if let Some((_, value)) = var("OPCUA_ENDPOINT") {
        config.opcua.endpoint = value;
    }
    if let Some((_, value)) = var("OPCUA_USERNAME") {
        config.opcua.username = Some(value);
    }
    if let Some((_, value)) = var("OPCUA_PASSWORD") {
        config.opcua.password = Some(SecretValue::new(value));
    }

    // MQTT
    if let Some((_, value)) = var("MQTT_HOST") {
        config.mqtt.host = value;
    }
    if let Some((name, value)) = var("MQTT_PORT") {
        config.mqtt.port = parse_env(&name, &value, "valid port number")?;
    }
    if let Some((_, value)) = var("MQTT_CLIENT_ID") {
        config.mqtt.client_id = value;
    }
    if let Some((_, value)) = var("MQTT_USERNAME") {
        config.mqtt.username = Some(value);
    }
    if let Some((_, value)) = var("MQTT_PASSWORD") {
        config.mqtt.password = Some(SecretValue::new(value));
    }

    // Auth
    if let Some((_, value)) = var("AUTH_URL") {
        config.auth.url = value;
    }
    if let Some((_, value)) = var("AUTH_SERVICE") {
        config.auth.service = value;
    }
    if let Some((name, value)) = var("AUTH_TIMEOUT_MS") {
        config.auth.timeout_ms = parse_env(&name, &value, "milliseconds")?;
    }

    // RFID
    if let Some((_, value)) = var("RFID_PORT") {
        config.rfid.port = value;
    }
    if let Some((name, value)) = var("RFID_BAUD_RATE") {
        config.rfid.baud_rate = parse_env(&name, &value, "baud rate")?;
    }

    // Logging
    if let Some((name, value)) = var("LOG_LEVEL") {
        config.logging.level = LogLevel::from_str(&value)
            .map_err(|_| ConfigError::invalid_env_var(name, "expected trace, debug, info, warn or error"))?;
    }
    if let Some((name, value)) = var("LOG_FORMAT") {
        config.logging.format = LogFormat::from_str(&value)
            .map_err(|_| ConfigError::invalid_env_var(name, "expected text, json or compact"))?;
    }

    Ok(())
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<GatewayConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<GatewayConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================
