// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Telemetry payloads published to the broker.
//!
//! Every event gets its own small JSON object on the telemetry topic.

use serde_json::{json, Value};

use crate::auth::AuthOutcome;
use crate::tag::TagKey;

/// A telemetry event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Telemetry {
    /// A login handshake finished.
    Login(AuthOutcome),
    /// The HMI user logged out.
    Logout,
    /// The machine is ready for the next job.
    JobRequest {
        /// Scanned card at the station.
        card: String,
    },
    /// The machine finished a job.
    JobCompleted {
        /// Completed job.
        job_id: String,
    },
    /// Machine busy tag changed.
    JobBusy(i64),
    /// A part counter changed.
    Counter {
        /// Counter tag.
        key: TagKey,
        /// New value.
        value: i64,
    },
    /// A non-zero vision result for the running job.
    VisionResult {
        /// Result code.
        value: i64,
        /// Running job.
        job_id: String,
    },
    /// Object present tag changed.
    ObjectPresent(i64),
    /// Machine step changed.
    MachineStep(i64),
    /// Power status changed.
    PowerStatus(i64),
    /// Vision status changed.
    VisionStatus(i64),
    /// A card was scanned.
    CardScanned {
        /// Card serial.
        card: String,
        /// Raw block data.
        data: String,
    },
}

impl Telemetry {
    /// Returns the JSON body.
    pub fn to_value(&self) -> Value {
        match self {
            Telemetry::Login(outcome) => json!({
                "Login": i32::from(outcome.is_approved()),
                "UserName": outcome.display_name,
                "AccessLevel": outcome.access_level,
            }),
            Telemetry::Logout => json!({ "Logout": 1 }),
            Telemetry::JobRequest { card } => json!({ "JobRequest": 1, "TagID": card }),
            Telemetry::JobCompleted { job_id } => json!({ "JobCompleted": 1, "JobID": job_id }),
            Telemetry::JobBusy(v) => json!({ "JobBusy": v }),
            Telemetry::Counter { key, value } => {
                let mut body = serde_json::Map::new();
                body.insert(counter_name(*key).to_string(), json!(value));
                Value::Object(body)
            }
            Telemetry::VisionResult { value, job_id } => {
                json!({ "VisionResult": value, "JobID": job_id })
            }
            Telemetry::ObjectPresent(v) => json!({ "ObjectPresent": v }),
            Telemetry::MachineStep(v) => json!({ "MachineStep": v }),
            Telemetry::PowerStatus(v) => json!({ "PowerStatus": v }),
            Telemetry::VisionStatus(v) => json!({ "VisionStatus": v }),
            Telemetry::CardScanned { card, data } => json!({ "TagID": card, "BlockData": data }),
        }
    }

    /// Returns the serialized payload.
    pub fn payload(&self) -> String {
        self.to_value().to_string()
    }
}

fn counter_name(key: TagKey) -> &'static str {
    match key {
        TagKey::GoodParts => "GoodParts",
        TagKey::RejectSizeParts => "RejectSizeParts",
        TagKey::RejectColorParts => "RejectColorParts",
        TagKey::TotalParts => "TotalParts",
        other => other.name(),
    }
}
