// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core data types for floorlink.
//!
//! This module provides the protocol-agnostic value and identity types shared
//! by the reconciliation engine and every driver crate.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Identifiers
// =============================================================================

/// The remote address of an automation-server variable.
///
/// The gateway treats addresses as opaque strings. The OPC UA driver parses
/// them into node ids (`ns=2;s=...`).
///
/// # Examples
///
/// ```
/// use floorlink_core::types::NodeAddress;
///
/// let address = NodeAddress::new("ns=2;s=Machine.job_request");
/// assert_eq!(address.as_str(), "ns=2;s=Machine.job_request");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Creates a new address.
    #[inline]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Joins a node prefix and a tag path with a `.` separator.
    pub fn join(prefix: &str, path: &str) -> Self {
        let prefix = prefix.trim_end_matches('.');
        if prefix.is_empty() {
            Self(path.to_string())
        } else {
            Self(format!("{prefix}.{path}"))
        }
    }

    /// Returns the address as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the address and returns the inner string.
    #[inline]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for NodeAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A session generation.
///
/// Every session start allocates a fresh generation. Completions tagged with
/// an older generation belong to a session that no longer exists and are
/// discarded by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// Creates a generation from a raw counter value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw counter value.
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the generation that follows this one.
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Identifier of a single issued tag write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriteId(pub u64);

impl fmt::Display for WriteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

// =============================================================================
// Sessions
// =============================================================================

/// The three external sessions the gateway keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// The OPC UA automation server.
    Automation,
    /// The MQTT telemetry broker.
    Broker,
    /// The serial RFID reader.
    Device,
}

impl SessionKind {
    /// All session kinds in start order.
    pub const ALL: [SessionKind; 3] = [Self::Automation, Self::Broker, Self::Device];

    /// Returns the session name for logging.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Automation => "automation",
            Self::Broker => "broker",
            Self::Device => "device",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Connection state of an external session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Connected and usable.
    Connected,
    /// Connection attempt failed. Terminal until the next start.
    Failed,
}

impl ConnectionState {
    /// Returns `true` if the session is usable.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Broker delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Qos {
    /// Fire and forget.
    #[default]
    AtMostOnce,
    /// Acknowledged delivery.
    AtLeastOnce,
    /// Assured delivery.
    ExactlyOnce,
}

// =============================================================================
// Tag Values
// =============================================================================

/// Access direction of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagDirection {
    /// The gateway only reads (monitors) the tag.
    ReadOnly,
    /// The gateway only writes the tag.
    WriteOnly,
    /// The gateway reads and writes the tag.
    ReadWrite,
}

impl TagDirection {
    /// Returns `true` if reads are permitted.
    #[inline]
    pub const fn can_read(&self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    /// Returns `true` if writes are permitted.
    #[inline]
    pub const fn can_write(&self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

impl fmt::Display for TagDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::WriteOnly => write!(f, "write-only"),
            Self::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// Declared value type of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// UTF-8 string.
    String,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int16 => write!(f, "int16"),
            Self::UInt16 => write!(f, "uint16"),
            Self::Int32 => write!(f, "int32"),
            Self::String => write!(f, "string"),
        }
    }
}

/// A typed tag value.
///
/// # Examples
///
/// ```
/// use floorlink_core::types::{TagValue, ValueType};
///
/// let value = TagValue::Int32(8);
/// assert_eq!(value.coerce(ValueType::Int16), Some(TagValue::Int16(8)));
/// assert_eq!(TagValue::Int32(-1).coerce(ValueType::UInt16), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TagValue {
    /// Signed 16-bit integer.
    Int16(i16),
    /// Unsigned 16-bit integer.
    UInt16(u16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// UTF-8 string.
    String(String),
}

impl TagValue {
    /// Returns the type of this value.
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Int16(_) => ValueType::Int16,
            Self::UInt16(_) => ValueType::UInt16,
            Self::Int32(_) => ValueType::Int32,
            Self::String(_) => ValueType::String,
        }
    }

    /// Returns the value as an `i64` if numeric.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int16(v) => Some(i64::from(*v)),
            Self::UInt16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::String(_) => None,
        }
    }

    /// Returns the value as a string slice if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts the value into `target` without loss.
    ///
    /// Numbers convert between integer widths only when in range. Strings and
    /// numbers never convert into each other.
    pub fn coerce(&self, target: ValueType) -> Option<TagValue> {
        if self.value_type() == target {
            return Some(self.clone());
        }
        let n = self.as_i64()?;
        match target {
            ValueType::Int16 => i16::try_from(n).ok().map(Self::Int16),
            ValueType::UInt16 => u16::try_from(n).ok().map(Self::UInt16),
            ValueType::Int32 => i32::try_from(n).ok().map(Self::Int32),
            ValueType::String => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int16(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "\"{v}\""),
        }
    }
}

impl From<i16> for TagValue {
    fn from(v: i16) -> Self {
        Self::Int16(v)
    }
}

impl From<u16> for TagValue {
    fn from(v: u16) -> Self {
        Self::UInt16(v)
    }
}

impl From<i32> for TagValue {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_address_join() {
        assert_eq!(NodeAddress::join("ns=2;s=A", "job_request").as_str(), "ns=2;s=A.job_request");
        assert_eq!(NodeAddress::join("ns=2;s=A.", "vision.RESULT").as_str(), "ns=2;s=A.vision.RESULT");
        assert_eq!(NodeAddress::join("", "username").as_str(), "username");
    }

    #[test]
    fn test_generation_next() {
        let generation = Generation::new(7);
        assert_eq!(generation.next().value(), 8);
        assert!(generation.next() > generation);
    }

    #[test]
    fn test_direction() {
        assert!(TagDirection::ReadOnly.can_read());
        assert!(!TagDirection::ReadOnly.can_write());
        assert!(TagDirection::WriteOnly.can_write());
        assert!(TagDirection::ReadWrite.can_read() && TagDirection::ReadWrite.can_write());
    }

    #[test]
    fn test_value_coercion() {
        assert_eq!(TagValue::UInt16(1).coerce(ValueType::Int16), Some(TagValue::Int16(1)));
        assert_eq!(TagValue::Int32(70_000).coerce(ValueType::Int16), None);
        assert_eq!(TagValue::Int16(-3).coerce(ValueType::UInt16), None);
        assert_eq!(TagValue::from("x").coerce(ValueType::Int32), None);
        assert_eq!(TagValue::Int16(5).coerce(ValueType::String), None);
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(TagValue::Int16(8).as_i64(), Some(8));
        assert_eq!(TagValue::from("Bob").as_str(), Some("Bob"));
        assert_eq!(TagValue::from("Bob").as_i64(), None);
        assert_eq!(TagValue::UInt16(3).to_string(), "3");
    }
}
