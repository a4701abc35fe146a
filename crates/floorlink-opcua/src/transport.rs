// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport abstraction.
//!
//! [`OpcUaDriver`](crate::driver::OpcUaDriver) speaks to the server only
//! through [`OpcUaTransport`]. The `opcua` crate backs it in production
//! (feature `real-transport`); [`MockTransport`](crate::mock::MockTransport)
//! backs it in tests.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::OpcUaResult;
use crate::types::NodeId;

// =============================================================================
// Status Codes
// =============================================================================

/// Status codes the driver interprets.
pub mod status {
    /// Good.
    pub const GOOD: u32 = 0x0000_0000;
    /// The node id does not refer to a node in the address space.
    pub const BAD_NODE_ID_UNKNOWN: u32 = 0x8034_0000;
    /// The syntax of the node id is not valid.
    pub const BAD_NODE_ID_INVALID: u32 = 0x8033_0000;
    /// The access level does not allow reading.
    pub const BAD_NOT_READABLE: u32 = 0x803A_0000;
    /// The access level does not allow writing.
    pub const BAD_NOT_WRITABLE: u32 = 0x803B_0000;
    /// The value supplied has the wrong data type.
    pub const BAD_TYPE_MISMATCH: u32 = 0x8074_0000;

    /// Returns `true` for good status codes.
    #[inline]
    pub const fn is_good(code: u32) -> bool {
        code & 0xC000_0000 == 0
    }

    /// Returns `true` for bad status codes.
    #[inline]
    pub const fn is_bad(code: u32) -> bool {
        code & 0x8000_0000 != 0
    }

    /// Returns `true` when the status says the node does not exist.
    #[inline]
    pub const fn is_missing_node(code: u32) -> bool {
        code == BAD_NODE_ID_UNKNOWN || code == BAD_NODE_ID_INVALID
    }
}

// =============================================================================
// TransportState
// =============================================================================

/// Connection state of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Establishing a session.
    Connecting,
    /// Session active.
    Connected,
    /// Session lost.
    Failed,
}

impl TransportState {
    /// Returns `true` if the transport is connected.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// =============================================================================
// OpcUaValue
// =============================================================================

/// Variant values as the transport sees them.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OpcUaValue {
    /// Boolean.
    Boolean(bool),
    /// 16-bit signed integer.
    Int16(i16),
    /// 16-bit unsigned integer.
    UInt16(u16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 32-bit unsigned integer.
    UInt32(u32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit double.
    Double(f64),
    /// String.
    String(String),
    /// Empty variant.
    #[default]
    Null,
}

impl OpcUaValue {
    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view of numeric values. Doubles convert only when integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Boolean(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::UInt16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::UInt32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::Double(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }
}

impl fmt::Display for OpcUaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::Null => write!(f, "null"),
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Outcome of reading one node.
#[derive(Debug, Clone)]
pub struct ReadResult {
    /// The node read.
    pub node_id: NodeId,
    /// Value, `Null` on failure.
    pub value: OpcUaValue,
    /// Status code.
    pub status_code: u32,
}

impl ReadResult {
    /// A good read.
    pub fn success(node_id: NodeId, value: OpcUaValue) -> Self {
        Self {
            node_id,
            value,
            status_code: status::GOOD,
        }
    }

    /// A failed read.
    pub fn failure(node_id: NodeId, status_code: u32) -> Self {
        Self {
            node_id,
            value: OpcUaValue::Null,
            status_code,
        }
    }

    /// Returns `true` if the status is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        status::is_good(self.status_code)
    }
}

/// Outcome of writing one node.
#[derive(Debug, Clone)]
pub struct WriteResult {
    /// The node written.
    pub node_id: NodeId,
    /// Status code.
    pub status_code: u32,
}

impl WriteResult {
    /// Returns `true` if the status is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        status::is_good(self.status_code)
    }
}

/// Outcome of creating one monitored item.
#[derive(Debug, Clone)]
pub struct MonitoredItemResult {
    /// The monitored node.
    pub node_id: NodeId,
    /// Server-assigned item id.
    pub item_id: u32,
    /// Status code.
    pub status_code: u32,
}

// =============================================================================
// TransportEvent
// =============================================================================

/// Asynchronous notifications from an open session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A monitored node reported a new value.
    DataChange {
        /// The node.
        node_id: NodeId,
        /// New value.
        value: OpcUaValue,
    },
    /// The session dropped.
    ConnectionLost,
}

// =============================================================================
// OpcUaTransport
// =============================================================================

/// Low-level OPC UA operations.
///
/// Methods take `&self`; implementations synchronize internally so the
/// driver can issue writes while a monitoring change is in flight.
#[async_trait]
pub trait OpcUaTransport: Send + Sync {
    /// Endpoint URL.
    fn endpoint(&self) -> &str;

    /// Current connection state.
    fn state(&self) -> TransportState;

    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Opens a session. Data changes and connection loss of this session are
    /// sent to `events` until [`disconnect`](Self::disconnect).
    async fn connect(&self, events: mpsc::UnboundedSender<TransportEvent>) -> OpcUaResult<()>;

    /// Closes the session. A no-op without one.
    async fn disconnect(&self);

    // =========================================================================
    // Data Access
    // =========================================================================

    /// Reads the value attribute of each node.
    async fn read_values(&self, nodes: &[NodeId]) -> OpcUaResult<Vec<ReadResult>>;

    /// Writes values in one request.
    async fn write_values(&self, writes: &[(NodeId, OpcUaValue)]) -> OpcUaResult<Vec<WriteResult>>;

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Creates a subscription and returns its id.
    async fn create_subscription(&self, publishing_interval: Duration) -> OpcUaResult<u32>;

    /// Adds monitored items in reporting mode.
    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        nodes: &[NodeId],
        sampling_interval: Duration,
    ) -> OpcUaResult<Vec<MonitoredItemResult>>;

    /// Removes monitored items.
    async fn delete_monitored_items(&self, subscription_id: u32, item_ids: &[u32]) -> OpcUaResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert!(status::is_good(status::GOOD));
        assert!(status::is_bad(status::BAD_NOT_WRITABLE));
        assert!(!status::is_good(0x4000_0000));
        assert!(status::is_missing_node(status::BAD_NODE_ID_UNKNOWN));
        assert!(!status::is_missing_node(status::BAD_NOT_READABLE));
    }

    #[test]
    fn test_value_as_i64() {
        assert_eq!(OpcUaValue::UInt16(7).as_i64(), Some(7));
        assert_eq!(OpcUaValue::Double(3.0).as_i64(), Some(3));
        assert_eq!(OpcUaValue::Double(3.5).as_i64(), None);
        assert_eq!(OpcUaValue::String("3".into()).as_i64(), None);
    }
}
