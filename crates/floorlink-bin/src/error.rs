// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors of the `floorlink` executable and how they map to exit codes.
//!
//! | Code | Meaning |
//! |------|---------|
//! | 1 | configuration file or derived driver settings are invalid |
//! | 2 | the gateway could not be assembled (logging, transports) |
//! | 3 | the gateway failed while running |
//! | 4 | I/O failure outside configuration loading |

use std::fmt;

use floorlink_config::ConfigError;
use thiserror::Error;

/// Result type alias for binary operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors that end the process.
#[derive(Debug, Error)]
pub enum BinError {
    /// Loading the configuration failed.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    /// A configuration section converted into an invalid driver setting.
    #[error("invalid {section} settings: {message}")]
    Settings {
        /// Configuration section, e.g. `opcua.security_mode`.
        section: &'static str,
        /// Driver error.
        message: String,
    },

    /// The gateway could not be assembled.
    #[error("startup failed: {0}")]
    Startup(String),

    /// The gateway stopped abnormally.
    #[error("gateway: {0}")]
    Runtime(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Error with context.
    #[error("{context}: {source}")]
    WithContext {
        /// What was being done.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// A driver rejected the settings derived from `section`.
    pub fn settings(section: &'static str, error: impl fmt::Display) -> Self {
        Self::Settings {
            section,
            message: error.to_string(),
        }
    }

    /// Creates a startup error.
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }

    /// Creates a runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Adds context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The configuration entry the operator should look at, if known.
    pub fn setting(&self) -> Option<&str> {
        match self {
            Self::Config(e) => e.setting(),
            Self::Settings { section, .. } => Some(section),
            Self::WithContext { source, .. } => source.setting(),
            _ => None,
        }
    }

    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Settings { .. } => 1,
            Self::Startup(_) => 2,
            Self::Runtime(_) => 3,
            Self::Io(_) => 4,
            Self::WithContext { source, .. } => source.exit_code(),
        }
    }
}

impl From<std::io::Error> for BinError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<anyhow::Error> for BinError {
    fn from(err: anyhow::Error) -> Self {
        Self::Startup(format!("{err:#}"))
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Prints an error, its cause chain and the setting to fix to stderr.
pub fn report_error(error: &BinError) {
    eprintln!("Error: {error}");

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {cause}");
        source = cause.source();
    }
    if let Some(setting) = error.setting() {
        eprintln!("  Check setting: {setting}");
    }
}

/// Reports an error and exits with its code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_setting_and_code() {
        let err = BinError::from(ConfigError::validation("mqtt.port", "must be positive"))
            .with_context("loading floorlink.yaml");
        assert_eq!(
            err.to_string(),
            "loading floorlink.yaml: configuration: invalid setting 'mqtt.port': must be positive"
        );
        assert_eq!(err.setting(), Some("mqtt.port"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::settings("rfid", "baud rate 0").exit_code(), 1);
        assert_eq!(BinError::startup("x").exit_code(), 2);
        assert_eq!(BinError::runtime("x").exit_code(), 3);
        assert_eq!(BinError::from(std::io::Error::other("x")).exit_code(), 4);
    }

    #[test]
    fn test_settings_names_section() {
        let err = BinError::settings("opcua.security_policy", "unknown policy 'rot13'");
        assert_eq!(err.setting(), Some("opcua.security_policy"));
        assert_eq!(
            err.to_string(),
            "invalid opcua.security_policy settings: unknown policy 'rot13'"
        );
    }

    #[test]
    fn test_anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("port busy").context("opening card reader");
        let bin: BinError = err.into();
        assert_eq!(bin.to_string(), "startup failed: opening card reader: port busy");
        assert_eq!(bin.setting(), None);
    }
}
