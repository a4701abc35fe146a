// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors of the OPC UA driver.
//!
//! ```text
//! OpcUaError
//! ├── Connection    - client build, endpoint selection, session loss
//! ├── Operation     - rejected read or write requests
//! ├── Subscription  - the station subscription and its monitored items
//! └── Configuration - node ids and settings
//! ```
//!
//! The gateway never sees these directly: the driver folds them into
//! [`ConnectionError`](floorlink_core::ConnectionError) on connect and
//! [`SessionError`](floorlink_core::SessionError) for everything else.

#![allow(missing_docs)]

use thiserror::Error;

use floorlink_core::error::{ConnectionError as CoreConnectionError, SessionError};
use floorlink_core::types::SessionKind;

/// Result alias for OPC UA operations.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

// =============================================================================
// OpcUaError
// =============================================================================

/// Any failure talking to the automation server.
#[derive(Debug, Error)]
pub enum OpcUaError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl OpcUaError {
    /// Wraps a connection error.
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Wraps a configuration error.
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    /// The request needs a session and there is none.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    /// Reports a failed connect against `endpoint`.
    pub fn into_connection_error(self, endpoint: &str) -> CoreConnectionError {
        CoreConnectionError::new(SessionKind::Automation, endpoint, self.to_string())
    }

    /// Reports a failed session operation.
    pub fn into_session_error(self, operation: &'static str) -> SessionError {
        SessionError::new(SessionKind::Automation, operation, self.to_string())
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Establishing or keeping the session.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The client could not be created from the settings.
    #[error("cannot build OPC UA client: {reason}")]
    ClientBuild { reason: String },

    /// `GetEndpoints` against the server failed.
    #[error("cannot discover endpoints of '{endpoint}': {reason}")]
    EndpointNotFound { endpoint: String, reason: String },

    /// The server offers no endpoint with the configured security.
    #[error("server offers no endpoint with security {security}")]
    NoSuitableEndpoint { security: String },

    /// The server refused the session.
    #[error("'{endpoint}' refused the session")]
    Refused { endpoint: String },

    /// The session ended underneath us.
    #[error("session closed{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed { reason: Option<String> },

    #[error("no session to the automation server")]
    NotConnected,
}

impl ConnectionError {
    pub fn endpoint_not_found(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EndpointNotFound {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    pub fn refused(endpoint: impl Into<String>) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
        }
    }
}

// =============================================================================
// Operation
// =============================================================================

/// A whole read or write request failed at the service level. Per-node
/// status codes are not errors here; the driver logs and skips them.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("read of {target} failed: {reason}")]
    ReadFailed { target: String, reason: String },

    #[error("write of {target} failed: {reason}")]
    WriteFailed { target: String, reason: String },
}

impl OperationError {
    pub fn read_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ReadFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn write_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// The station subscription or one of its monitored items.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("cannot create subscription: {reason}")]
    CreationFailed { reason: String },

    #[error("monitoring {target} failed: {reason}")]
    MonitoredItemFailed { target: String, reason: String },

    /// The id belongs to a session that no longer exists.
    #[error("unknown subscription {id}")]
    NotFound { id: u32 },
}

impl SubscriptionError {
    pub fn creation_failed(reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            reason: reason.into(),
        }
    }

    pub fn monitored_item_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MonitoredItemFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Settings the driver cannot use.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Not of the form `ns=<n>;s=<name>` or `ns=<n>;i=<n>`.
    #[error("'{node_id}' is not a node id: {reason}")]
    InvalidNodeId { node_id: String, reason: String },

    #[error("'{url}' is not an opc.tcp endpoint: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigurationError {
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_endpoint() {
        let err = OpcUaError::from(ConnectionError::refused("opc.tcp://plc:4840"));
        assert_eq!(err.to_string(), "'opc.tcp://plc:4840' refused the session");

        let err = OpcUaError::from(ConnectionError::Closed { reason: None });
        assert_eq!(err.to_string(), "session closed");
        let err = OpcUaError::from(ConnectionError::Closed {
            reason: Some("BadTimeout".into()),
        });
        assert_eq!(err.to_string(), "session closed: BadTimeout");
    }

    #[test]
    fn test_into_core_errors() {
        let core = OpcUaError::not_connected().into_connection_error("opc.tcp://plc:4840");
        assert_eq!(core.session, SessionKind::Automation);
        assert_eq!(core.endpoint, "opc.tcp://plc:4840");

        let core = OpcUaError::from(SubscriptionError::creation_failed("quota"))
            .into_session_error("create_subscription");
        assert_eq!(core.operation, "create_subscription");
        assert!(core.message.contains("quota"));
    }
}
