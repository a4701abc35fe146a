// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! MQTT session errors.

use thiserror::Error;

use floorlink_core::error::{ConnectionError, SessionError};
use floorlink_core::types::SessionKind;

/// Result alias for broker operations.
pub type MqttResult<T> = Result<T, MqttError>;

/// Broker session errors.
#[derive(Debug, Error)]
pub enum MqttError {
    /// Invalid client settings.
    #[error("Invalid MQTT configuration: {0}")]
    InvalidConfig(String),

    /// The client request queue rejected a request.
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// No session is open.
    #[error("Not connected to MQTT broker")]
    NotConnected,
}

impl MqttError {
    /// Converts into the core connection error.
    pub fn into_connection_error(self, endpoint: &str) -> ConnectionError {
        ConnectionError::new(SessionKind::Broker, endpoint, self.to_string())
    }

    /// Converts into the core session error.
    pub fn into_session_error(self, operation: &'static str) -> SessionError {
        SessionError::new(SessionKind::Broker, operation, self.to_string())
    }
}
