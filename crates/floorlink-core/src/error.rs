// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Unified error hierarchy for floorlink.
//!
//! Every remote-operation failure is caught at the router boundary and turned
//! into a log entry plus a readiness flag that does not advance. None of these
//! errors is process-fatal, and none is retried.
//!
//! # Error Hierarchy
//!
//! ```text
//! GatewayError (root)
//! ├── ConnectionError   - a session could not be established
//! ├── SessionError      - an operation on an established session failed
//! ├── TagError          - tag bound, read or written incorrectly
//! │   └── BindError     - tag referenced while disconnected / unknown address
//! ├── WriteRejected     - the server answered a write with a bad status
//! ├── AuthServiceError  - the authorization service failed or answered garbage
//! ├── DeviceError       - the card reader could not be used
//! └── DecodeError       - an inbound broker payload was malformed
//! ```
//!
//! # Examples
//!
//! ```
//! use floorlink_core::error::{GatewayError, TagError};
//! use floorlink_core::tag::TagKey;
//!
//! let error: GatewayError = TagError::StaleHandle { tag: TagKey::AuthApprove }.into();
//! assert!(error.is_stale());
//! assert!(!error.is_retryable());
//! ```

use thiserror::Error;

use crate::tag::TagKey;
use crate::types::{NodeAddress, SessionKind, TagDirection, ValueType};

// =============================================================================
// GatewayError - Root Error Type
// =============================================================================

/// The root error type for floorlink.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Session establishment failed.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Operation on an established session failed.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Tag operation failed.
    #[error("Tag error: {0}")]
    Tag(#[from] TagError),

    /// Remote write rejected.
    #[error("Write rejected: {0}")]
    WriteRejected(#[from] WriteRejected),

    /// Authorization service failure.
    #[error("Auth service error: {0}")]
    Auth(#[from] AuthServiceError),

    /// Card reader failure.
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Inbound payload decode failure.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl GatewayError {
    /// Returns `true` if the error may succeed on a later attempt.
    ///
    /// The gateway itself never retries; this only feeds log context.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Connection(_) | GatewayError::Session(_) => true,
            GatewayError::Auth(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Returns `true` if the error comes from a handle of a closed session.
    pub fn is_stale(&self) -> bool {
        matches!(self, GatewayError::Tag(e) if e.is_stale())
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::Connection(_) => "connection",
            GatewayError::Session(_) => "session",
            GatewayError::Tag(_) => "tag",
            GatewayError::WriteRejected(_) => "write_rejected",
            GatewayError::Auth(_) => "auth",
            GatewayError::Device(_) => "device",
            GatewayError::Decode(_) => "decode",
        }
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// A session could not be established.
///
/// Reported once per start attempt and never retried automatically.
#[derive(Debug, Clone, Error)]
#[error("{session} session to '{endpoint}' failed: {message}")]
pub struct ConnectionError {
    /// Which session failed.
    pub session: SessionKind,
    /// Endpoint that was contacted.
    pub endpoint: String,
    /// Failure description.
    pub message: String,
}

impl ConnectionError {
    /// Creates a new connection error.
    pub fn new(session: SessionKind, endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session,
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}

/// An operation on an established session failed.
///
/// Covers monitoring changes, subscriptions and publishes. Logged, never retried.
#[derive(Debug, Clone, Error)]
#[error("{session} {operation} failed: {message}")]
pub struct SessionError {
    /// Session the operation ran on.
    pub session: SessionKind,
    /// Operation name.
    pub operation: &'static str,
    /// Failure description.
    pub message: String,
}

impl SessionError {
    /// Creates a new session error.
    pub fn new(session: SessionKind, operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            session,
            operation,
            message: message.into(),
        }
    }
}

// =============================================================================
// TagError
// =============================================================================

/// Failure to bind a tag at session start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// No automation session is open.
    #[error("cannot bind '{tag}': automation session not connected")]
    NotConnected {
        /// The tag being bound.
        tag: TagKey,
    },

    /// The server does not expose the address.
    #[error("cannot bind '{tag}': address '{address}' unknown to server")]
    UnknownAddress {
        /// The tag being bound.
        tag: TagKey,
        /// The address that was probed.
        address: NodeAddress,
    },
}

/// Tag registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    /// Binding failed.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// The handle belongs to a session that has since disconnected.
    #[error("stale handle for '{tag}'")]
    StaleHandle {
        /// The tag of the stale handle.
        tag: TagKey,
    },

    /// The tag is not bound in the current session.
    #[error("tag '{tag}' is not bound")]
    NotBound {
        /// The unbound tag.
        tag: TagKey,
    },

    /// The operation does not match the tag direction.
    #[error("cannot {operation} '{tag}': tag is {direction}")]
    DirectionMismatch {
        /// The tag.
        tag: TagKey,
        /// Declared direction.
        direction: TagDirection,
        /// Attempted operation ("read" or "write").
        operation: &'static str,
    },

    /// The value does not fit the declared type.
    #[error("type mismatch on '{tag}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// The tag.
        tag: TagKey,
        /// Declared type.
        expected: ValueType,
        /// Offered type.
        actual: ValueType,
    },

    /// An update arrived for an address that no bound tag owns.
    #[error("no tag bound at '{address}'")]
    UnknownAddress {
        /// The address of the update.
        address: NodeAddress,
    },
}

impl TagError {
    /// Returns `true` for errors caused by a closed or missing session.
    ///
    /// These are defined no-ops, not faults.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            TagError::StaleHandle { .. } | TagError::Bind(BindError::NotConnected { .. })
        )
    }
}

// =============================================================================
// WriteRejected
// =============================================================================

/// The automation server did not accept a write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("write to '{address}' failed: {message}")]
pub struct WriteRejected {
    /// Written address.
    pub address: NodeAddress,
    /// Server status code, if the server answered.
    pub status: Option<u32>,
    /// Failure description.
    pub message: String,
}

impl WriteRejected {
    /// A write answered with a bad status code.
    pub fn status(address: NodeAddress, status: u32) -> Self {
        Self {
            address,
            status: Some(status),
            message: format!("bad status 0x{status:08X}"),
        }
    }

    /// A write that never reached the server.
    pub fn transport(address: NodeAddress, message: impl Into<String>) -> Self {
        Self {
            address,
            status: None,
            message: message.into(),
        }
    }
}

// =============================================================================
// AuthServiceError
// =============================================================================

/// Authorization service failures. All of them take the reject path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthServiceError {
    /// The service could not be reached or timed out.
    #[error("authorization service unreachable: {0}")]
    Unreachable(String),

    /// The service answered with a non-success HTTP status.
    #[error("authorization service returned HTTP {0}")]
    Status(u16),

    /// The response body could not be decoded.
    #[error("malformed authorization response: {0}")]
    Malformed(String),
}

impl AuthServiceError {
    /// Returns `true` if the failure is likely transient.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthServiceError::Unreachable(_) => true,
            AuthServiceError::Status(code) => *code >= 500,
            AuthServiceError::Malformed(_) => false,
        }
    }
}

// =============================================================================
// DeviceError
// =============================================================================

/// Card reader failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The reader could not be opened. Terminal for the session.
    #[error("device '{port}' unavailable: {message}")]
    Unavailable {
        /// Device path.
        port: String,
        /// Failure description.
        message: String,
    },

    /// A read cycle failed.
    #[error("device I/O error: {0}")]
    Io(String),
}

impl DeviceError {
    /// Creates an unavailable error.
    pub fn unavailable(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            port: port.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// DecodeError
// =============================================================================

/// A broker payload could not be normalized into internal types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// A required field is missing.
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    /// A field has an unusable JSON type.
    #[error("field '{field}' must be {expected}")]
    WrongType {
        /// Field name.
        field: &'static str,
        /// Expected shape.
        expected: &'static str,
    },

    /// A numeric field could not be parsed or is out of range.
    #[error("field '{field}' has invalid number '{value}'")]
    InvalidNumber {
        /// Field name.
        field: &'static str,
        /// The raw value.
        value: String,
    },
}

/// Result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_detection() {
        let stale: GatewayError = TagError::StaleHandle { tag: TagKey::JobApprove }.into();
        assert!(stale.is_stale());

        let not_connected: GatewayError =
            TagError::from(BindError::NotConnected { tag: TagKey::Username }).into();
        assert!(not_connected.is_stale());

        let mismatch: GatewayError = TagError::DirectionMismatch {
            tag: TagKey::Username,
            direction: TagDirection::ReadOnly,
            operation: "write",
        }
        .into();
        assert!(!mismatch.is_stale());
        assert_eq!(mismatch.error_type(), "tag");
    }

    #[test]
    fn test_error_messages() {
        let err = TagError::DirectionMismatch {
            tag: TagKey::Username,
            direction: TagDirection::ReadOnly,
            operation: "write",
        };
        assert_eq!(err.to_string(), "cannot write 'username': tag is read-only");

        let err = WriteRejected::status(NodeAddress::new("ns=2;s=x"), 0x8034_0000);
        assert!(err.to_string().contains("0x80340000"));
    }

    #[test]
    fn test_auth_transient() {
        assert!(AuthServiceError::Unreachable("timeout".into()).is_transient());
        assert!(AuthServiceError::Status(503).is_transient());
        assert!(!AuthServiceError::Status(401).is_transient());
        assert!(!AuthServiceError::Malformed("eof".into()).is_transient());
    }
}
