// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # floorlink-config
//!
//! Configuration management for the floorlink gateway.
//!
//! ## Features
//!
//! - **Schema**: one section per endpoint, every field defaulted
//! - **Multi-Format Support**: YAML, TOML and JSON files
//! - **Placeholders**: `${VAR}` and `${VAR:default}` in file content
//! - **Environment Overrides**: `FLOORLINK_<SECTION>_<KEY>`
//!
//! ## Quick Start
//!
//! ```no_run
//! use floorlink_config::loader::load_config;
//!
//! let config = load_config("floorlink.yaml").unwrap();
//! let router = config.router_config();
//! println!("telemetry topic: {}", router.telemetry_topic);
//! ```
//!
//! ## Example File
//!
//! ```yaml
//! gateway:
//!   node_prefix: "ns=2;s=|var|CPS-PCS341MB-DS1.Application.GVL.OPC_Machine_A0001"
//! opcua:
//!   endpoint: "opc.tcp://${PLC_HOST:192.168.0.10}:4840"
//! mqtt:
//!   host: thingsboard.local
//!   username: "${TB_TOKEN}"
//! auth:
//!   url: http://sat-mes/server/auth/authenticate
//! rfid:
//!   port: /dev/ttyUSB0
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{
    AuthSection, GatewayConfig, GatewaySection, LogFormat, LogLevel, LoggingConfig, MqttSection,
    OpcUaSection, RfidSection, SecretValue,
};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "floorlink.yaml";

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name() {
        assert_eq!(NAME, "floorlink-config");
        assert!(!VERSION.is_empty());
    }
}
