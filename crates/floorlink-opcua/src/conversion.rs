// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Conversion between OPC UA variants and gateway tag values.
//!
//! The gateway only declares 16/32-bit integers and strings. Inbound values
//! of other numeric types are narrowed to `Int32` when they fit; the router
//! then coerces to the declared tag type.

use floorlink_core::types::TagValue;

use crate::transport::OpcUaValue;

/// Converts an inbound variant. Returns `None` for nulls and for values no
/// tag type can hold.
pub fn to_tag_value(value: &OpcUaValue) -> Option<TagValue> {
    match value {
        OpcUaValue::Int16(v) => Some(TagValue::Int16(*v)),
        OpcUaValue::UInt16(v) => Some(TagValue::UInt16(*v)),
        OpcUaValue::Int32(v) => Some(TagValue::Int32(*v)),
        OpcUaValue::String(v) => Some(TagValue::String(v.clone())),
        OpcUaValue::Boolean(v) => Some(TagValue::UInt16(u16::from(*v))),
        OpcUaValue::Null => None,
        other => other
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(TagValue::Int32),
    }
}

/// Converts an outbound tag value.
pub fn to_variant(value: &TagValue) -> OpcUaValue {
    match value {
        TagValue::Int16(v) => OpcUaValue::Int16(*v),
        TagValue::UInt16(v) => OpcUaValue::UInt16(*v),
        TagValue::Int32(v) => OpcUaValue::Int32(*v),
        TagValue::String(v) => OpcUaValue::String(v.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_narrowing() {
        assert_eq!(to_tag_value(&OpcUaValue::UInt32(42)), Some(TagValue::Int32(42)));
        assert_eq!(to_tag_value(&OpcUaValue::Int64(i64::MAX)), None);
        assert_eq!(to_tag_value(&OpcUaValue::Boolean(true)), Some(TagValue::UInt16(1)));
        assert_eq!(to_tag_value(&OpcUaValue::Double(2.5)), None);
        assert_eq!(to_tag_value(&OpcUaValue::Null), None);
    }

    #[test]
    fn test_outbound_keeps_width() {
        assert_eq!(to_variant(&TagValue::Int16(8)), OpcUaValue::Int16(8));
        assert_eq!(to_variant(&TagValue::UInt16(1)), OpcUaValue::UInt16(1));
        assert_eq!(to_variant(&"Kim".into()), OpcUaValue::String("Kim".into()));
    }
}
