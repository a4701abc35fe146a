// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors raised while loading gateway settings.

use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but its content does not match the schema.
    #[error("cannot parse '{path}': {message}")]
    Parse {
        /// Configuration file.
        path: PathBuf,
        /// Deserializer message.
        message: String,
    },

    /// A setting is out of range or inconsistent with another one.
    #[error("invalid setting '{field}': {message}")]
    Validation {
        /// Dotted setting name, e.g. `gateway.node_prefix`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The file could not be read.
    #[error("cannot read '{path}': {source}")]
    Io {
        /// Configuration file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// No file at the given path.
    #[error("configuration file '{path}' does not exist")]
    FileNotFound {
        /// Requested path.
        path: PathBuf,
    },

    /// A `FLOORLINK_*` override holds a value of the wrong shape.
    #[error("environment override {name}: {message}")]
    InvalidEnvVar {
        /// Variable name.
        name: String,
        /// Expected shape.
        message: String,
    },

    /// The file extension names no supported format.
    #[error("unsupported configuration format '{format}' (use yaml, toml or json)")]
    UnsupportedFormat {
        /// Extension found.
        format: String,
    },

    /// In-memory content could not be deserialized.
    #[error("malformed configuration: {message}")]
    Serialization {
        /// Deserializer message.
        message: String,
    },
}

impl ConfigError {
    /// Parse failure of a file.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Invalid setting.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Read failure.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Missing file.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Bad override value.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Unknown extension.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Malformed in-memory content.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// The setting or variable at fault, when the error names one.
    pub fn setting(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            Self::InvalidEnvVar { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns `true` when the file itself could not be reached.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::FileNotFound { .. })
    }

    /// Short label for structured logs.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Parse { .. } | Self::Serialization { .. } => "parse",
            Self::Validation { .. } => "validation",
            Self::Io { .. } | Self::FileNotFound { .. } => "io",
            Self::InvalidEnvVar { .. } => "env",
            Self::UnsupportedFormat { .. } => "format",
        }
    }
}

/// Result of configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
