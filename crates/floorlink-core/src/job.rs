// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Job dispatch payloads.
//!
//! Dispatch commands arrive as broker RPC requests. Deployments disagree on the
//! shape: some send `JobID`/`PlanQty`/`ConveyorSpeed` as numbers, others as
//! numeric strings, and some put the fields at the root instead of under
//! `params`. Everything is normalized here into a [`PendingJob`] with strict
//! types, or rejected with a [`DecodeError`].
//!
//! ```json
//! {"method":"dispatchJob","params":{"JobID":12345,"JobName":"Win","PlanQty":"30"}}
//! ```

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::tag::TagKey;
use crate::types::TagValue;

/// Job id reported once the machine completes the pending job.
pub const CLEARED_JOB_ID: &str = "NA";

/// A dispatched job, immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingJob {
    /// Job identifier.
    pub job_id: String,
    /// Job (process) name.
    pub job_name: String,
    /// Material code.
    pub material_code: String,
    /// Recipe name.
    pub recipe_name: String,
    /// Planned quantity.
    pub planned_qty: i32,
    /// Planned start time, as sent.
    pub planned_start: String,
    /// Planned end time, as sent.
    pub planned_end: String,
    /// Conveyor speed.
    pub conveyor_speed: i16,
    /// Product model.
    pub model: String,
    /// Product length.
    pub length: i32,
    /// Product color.
    pub color: String,
}

impl PendingJob {
    /// Decodes a dispatch command payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let root: Value =
            serde_json::from_slice(payload).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        let root = root.as_object().ok_or(DecodeError::WrongType {
            field: "payload",
            expected: "an object",
        })?;
        let fields = match root.get("params") {
            Some(Value::Object(params)) => params,
            Some(Value::Null) | None => root,
            Some(_) => {
                return Err(DecodeError::WrongType {
                    field: "params",
                    expected: "an object",
                })
            }
        };

        Ok(Self {
            job_id: text(fields, "JobID", &[])?.ok_or(DecodeError::MissingField("JobID"))?,
            job_name: text(fields, "JobName", &["ProcessName"])?
                .ok_or(DecodeError::MissingField("JobName"))?,
            material_code: text(fields, "MaterialCode", &[])?.unwrap_or_default(),
            recipe_name: text(fields, "RecipeName", &[])?.unwrap_or_default(),
            planned_qty: integer(fields, "PlanQty", &["Quantity"])?.unwrap_or_default(),
            planned_start: text(fields, "PlanStartTime", &["StartTime"])?.unwrap_or_default(),
            planned_end: text(fields, "PlanEndTime", &["EndTime"])?.unwrap_or_default(),
            conveyor_speed: integer(fields, "ConveyorSpeed", &["Speed"])?.unwrap_or_default(),
            model: text(fields, "Model", &[])?.unwrap_or_default(),
            length: integer(fields, "Length", &[])?.unwrap_or_default(),
            color: text(fields, "Color", &[])?.unwrap_or_default(),
        })
    }

    /// The tag writes that transfer this job, in write order.
    pub fn field_writes(&self) -> Vec<(TagKey, TagValue)> {
        vec![
            (TagKey::JobId, self.job_id.as_str().into()),
            (TagKey::JobProcessName, self.job_name.as_str().into()),
            (TagKey::JobMaterialCode, self.material_code.as_str().into()),
            (TagKey::JobRecipeName, self.recipe_name.as_str().into()),
            (TagKey::JobPlanQty, TagValue::Int32(self.planned_qty)),
            (TagKey::JobPlanStartTime, self.planned_start.as_str().into()),
            (TagKey::JobPlanEndTime, self.planned_end.as_str().into()),
            (TagKey::JobModel, self.model.as_str().into()),
            (TagKey::JobLength, TagValue::Int32(self.length)),
            (TagKey::JobColor, self.color.as_str().into()),
            (TagKey::ConveyorSpeed, TagValue::Int16(self.conveyor_speed)),
        ]
    }
}

fn lookup<'a>(fields: &'a Map<String, Value>, field: &str, aliases: &[&str]) -> Option<&'a Value> {
    std::iter::once(field)
        .chain(aliases.iter().copied())
        .find_map(|name| fields.get(name))
        .filter(|v| !v.is_null())
}

fn text(
    fields: &Map<String, Value>,
    field: &'static str,
    aliases: &[&str],
) -> Result<Option<String>, DecodeError> {
    match lookup(fields, field, aliases) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(DecodeError::WrongType {
            field,
            expected: "a string or number",
        }),
    }
}

fn integer<T: TryFrom<i64>>(
    fields: &Map<String, Value>,
    field: &'static str,
    aliases: &[&str],
) -> Result<Option<T>, DecodeError> {
    let invalid = |value: String| DecodeError::InvalidNumber { field, value };
    let raw = match lookup(fields, field, aliases) {
        None => return Ok(None),
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| invalid(n.to_string()))?,
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid(s.clone()))?,
        Some(_) => {
            return Err(DecodeError::WrongType {
                field,
                expected: "an integer or numeric string",
            })
        }
    };
    T::try_from(raw).map(Some).map_err(|_| invalid(raw.to_string()))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_and_string_schemas_agree() {
        let numeric = br#"{"method":"job","params":{"JobID":12345,"JobName":"Win","PlanQty":30,"ConveyorSpeed":40,"Length":120}}"#;
        let stringly = br#"{"method":"job","params":{"JobID":"12345","JobName":"Win","PlanQty":"30","ConveyorSpeed":"40","Length":" 120 "}}"#;

        let a = PendingJob::decode(numeric).unwrap();
        let b = PendingJob::decode(stringly).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.field_writes(), b.field_writes());
        assert_eq!(a.job_id, "12345");
        assert_eq!(a.planned_qty, 30);
    }

    #[test]
    fn test_flat_schema_with_aliases() {
        let job = PendingJob::decode(br#"{"JobID":"J-7","ProcessName":"Paint","Quantity":2}"#).unwrap();
        assert_eq!(job.job_id, "J-7");
        assert_eq!(job.job_name, "Paint");
        assert_eq!(job.planned_qty, 2);
        assert_eq!(job.conveyor_speed, 0);
        assert_eq!(job.color, "");
    }

    #[test]
    fn test_required_fields() {
        assert_eq!(
            PendingJob::decode(br#"{"params":{"JobName":"Win"}}"#),
            Err(DecodeError::MissingField("JobID"))
        );
        assert_eq!(
            PendingJob::decode(br#"{"params":{"JobID":1}}"#),
            Err(DecodeError::MissingField("JobName"))
        );
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(PendingJob::decode(b"not json"), Err(DecodeError::InvalidJson(_))));
        assert!(matches!(
            PendingJob::decode(br#"{"params":{"JobID":1,"JobName":"x","PlanQty":"thirty"}}"#),
            Err(DecodeError::InvalidNumber { field: "PlanQty", .. })
        ));
        assert!(matches!(
            PendingJob::decode(br#"{"params":{"JobID":1,"JobName":"x","ConveyorSpeed":70000}}"#),
            Err(DecodeError::InvalidNumber { field: "ConveyorSpeed", .. })
        ));
        assert!(matches!(
            PendingJob::decode(br#"{"params":{"JobID":[1],"JobName":"x"}}"#),
            Err(DecodeError::WrongType { field: "JobID", .. })
        ));
        assert!(matches!(
            PendingJob::decode(br#"{"params":"JobID=1"}"#),
            Err(DecodeError::WrongType { field: "params", .. })
        ));
    }

    #[test]
    fn test_field_writes_cover_job_tags() {
        let job = PendingJob::decode(br#"{"params":{"JobID":1,"JobName":"x"}}"#).unwrap();
        let writes = job.field_writes();
        assert_eq!(writes.len(), 11);
        assert!(writes.iter().all(|(key, value)| value.coerce(key.value_type()).is_some()));
    }
}
