// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Payloads and settings shared by the scenarios.

use serde_json::{json, Value};

use floorlink_core::{AuthReply, CardScan, RouterConfig};

/// Node prefix the mock automation server exposes the catalog under.
pub const TEST_PREFIX: &str = "ns=2;s=Line1.Station4";

/// Topic the broker delivers dispatch commands on.
pub const COMMAND_TOPIC: &str = "v1/devices/me/rpc/request/17";

/// Telemetry topic.
pub const TELEMETRY_TOPIC: &str = "v1/devices/me/telemetry";

/// Card serial used by [`card_scan`].
pub const CARD_ID: &str = "E004A1B2C3D4";

/// Routing parameters matching the mocks.
pub fn router_config() -> RouterConfig {
    RouterConfig {
        node_prefix: TEST_PREFIX.to_string(),
        ..RouterConfig::default()
    }
}

// =============================================================================
// Dispatch payloads
// =============================================================================

/// A dispatch command the way the MES sends it, numbers as numbers.
pub fn dispatch_payload() -> Vec<u8> {
    dispatch_json().to_string().into_bytes()
}

/// The dispatch command as JSON.
pub fn dispatch_json() -> Value {
    json!({
        "method": "dispatchJob",
        "params": {
            "JobID": 12345,
            "JobName": "Window-Frame",
            "MaterialCode": "AL-6063",
            "RecipeName": "R-7",
            "PlanQty": 30,
            "PlanStartTime": "2025-03-01 08:00",
            "PlanEndTime": "2025-03-01 12:00",
            "ConveyorSpeed": 40,
            "Model": "WF-120",
            "Length": 1200,
            "Color": "White"
        }
    })
}

/// A flat dispatch with numbers as strings and alias field names.
pub fn flat_dispatch_payload() -> Vec<u8> {
    json!({
        "JobID": "J-77",
        "ProcessName": "Paint",
        "Quantity": "12",
        "Speed": "25"
    })
    .to_string()
    .into_bytes()
}

/// A dispatch missing its job id.
pub fn dispatch_without_id() -> Vec<u8> {
    br#"{"method":"dispatchJob","params":{"JobName":"Window-Frame"}}"#.to_vec()
}

/// Not JSON at all.
pub fn garbage_payload() -> Vec<u8> {
    b"dispatch 12345 now".to_vec()
}

// =============================================================================
// Authorization
// =============================================================================

/// An approving reply.
pub fn approved_reply() -> AuthReply {
    AuthReply {
        result: 1,
        display_name: "Kim Operator".to_string(),
        access_level: 3,
    }
}

/// A reply the service sends for wrong credentials.
pub fn denied_reply() -> AuthReply {
    AuthReply {
        result: 0,
        display_name: String::new(),
        access_level: 0,
    }
}

// =============================================================================
// Cards
// =============================================================================

/// A successful card read.
pub fn card_scan() -> CardScan {
    CardScan::valid(CARD_ID, "LOT-0042")
}

// =============================================================================
// Configuration files
// =============================================================================

/// A complete YAML configuration.
pub const YAML_CONFIG: &str = r#"
gateway:
  id: line1-station4
  node_prefix: "ns=2;s=Line1.Station4"
  poll_interval_ms: 250

opcua:
  endpoint: "opc.tcp://192.168.10.20:4840"
  security_mode: SignAndEncrypt
  security_policy: Basic256Sha256
  username: gateway
  password: "${PLC_PASSWORD}"

mqtt:
  host: tb.factory.local
  port: 1883
  username: A1_TEST_TOKEN

auth:
  url: "https://sat-mes/server/auth/authenticate"
  service: line1

rfid:
  port: /dev/ttyUSB1
  baud_rate: 115200

logging:
  level: debug
  format: json
"#;

/// The same settings as TOML.
pub const TOML_CONFIG: &str = r#"
[gateway]
id = "line1-station4"
node_prefix = "ns=2;s=Line1.Station4"
poll_interval_ms = 250

[opcua]
endpoint = "opc.tcp://192.168.10.20:4840"
security_mode = "SignAndEncrypt"
security_policy = "Basic256Sha256"
username = "gateway"
password = "${PLC_PASSWORD}"

[mqtt]
host = "tb.factory.local"
port = 1883
username = "A1_TEST_TOKEN"

[auth]
url = "https://sat-mes/server/auth/authenticate"
service = "line1"

[rfid]
port = "/dev/ttyUSB1"
baud_rate = 115200

[logging]
level = "debug"
format = "json"
"#;
