// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Card reader errors.

use thiserror::Error;

use floorlink_core::error::DeviceError;

/// Result alias for reader operations.
pub type RfidResult<T> = Result<T, RfidError>;

/// Card reader errors.
#[derive(Debug, Error)]
pub enum RfidError {
    /// The serial device does not exist.
    #[error("Serial port '{port}' not found")]
    PortNotFound {
        /// Device path.
        port: String,
    },

    /// Access to the serial device was denied.
    #[error("Access denied to serial port '{port}'")]
    AccessDenied {
        /// Device path.
        port: String,
    },

    /// The port could not be opened or configured.
    #[error("Failed to open serial port '{port}': {message}")]
    OpenFailed {
        /// Device path.
        port: String,
        /// Failure description.
        message: String,
    },

    /// The reader did not answer the version query.
    #[error("Reader on '{port}' did not identify itself: {message}")]
    NotIdentified {
        /// Device path.
        port: String,
        /// Failure description.
        message: String,
    },

    /// No complete reply arrived in time.
    #[error("Reader reply timed out")]
    Timeout,

    /// A reply could not be understood.
    #[error("Malformed reader reply: {0}")]
    Protocol(String),

    /// The reader answered a command with an error code.
    #[error("Reader rejected '{command}': {code}")]
    Rejected {
        /// Command verb.
        command: &'static str,
        /// Reader error code.
        code: String,
    },

    /// The port is not open.
    #[error("Reader is not open")]
    NotOpen,

    /// Serial I/O failure.
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RfidError {
    /// Returns `true` for errors raised while opening the device.
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            Self::PortNotFound { .. } | Self::AccessDenied { .. } | Self::OpenFailed { .. } | Self::NotIdentified { .. }
        )
    }

    /// Converts into the core device error.
    pub fn into_device_error(self, port: &str) -> DeviceError {
        if self.is_open_error() {
            DeviceError::unavailable(port, self.to_string())
        } else {
            DeviceError::Io(self.to_string())
        }
    }
}
