// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Vision result acknowledgment.
//!
//! A non-zero result seen while a job is busy is published once and marks
//! `resultPublished`. When the machine also reports `resultRead`, both result
//! tags are written back to 0 and `resultPublished` is cleared, so the same
//! result is not published again on intermediate updates. A result that
//! could not be published is never acknowledged.

use tracing::{debug, info, warn};

use super::Context;
use crate::event::Notice;
use crate::job::CLEARED_JOB_ID;
use crate::readiness::{Flag, FlagEdge};
use crate::tag::TagKey;
use crate::telemetry::Telemetry;
use crate::types::TagValue;

/// The vision result acknowledgment handshake.
#[derive(Debug, Default)]
pub struct VisionAck {
    last_result: Option<i64>,
}

impl VisionAck {
    /// Creates an idle handshake.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last non-zero result observed.
    pub fn last_result(&self) -> Option<i64> {
        self.last_result
    }

    /// Forgets the last result.
    pub fn reset(&mut self) {
        self.last_result = None;
    }

    /// `vision.RESULT` changed.
    pub fn on_result(&mut self, ctx: &mut Context, value: Option<i64>) {
        let Some(value) = value.filter(|v| *v != 0) else {
            return;
        };
        self.last_result = Some(value);
        if !ctx.readiness.get(Flag::JobBusy) {
            debug!(value, "Vision result outside a job, not published");
            return;
        }
        let job_id = ctx
            .job
            .as_ref()
            .map(|j| j.job_id.clone())
            .unwrap_or_else(|| CLEARED_JOB_ID.to_string());
        let published = ctx.publish(Telemetry::VisionResult {
            value,
            job_id: job_id.clone(),
        });
        if !published {
            // Left unacknowledged so the machine keeps the result.
            warn!(value, job_id = %job_id, "Vision result not published, broker offline");
            return;
        }
        info!(value, job_id = %job_id, "Vision result published");
        ctx.notify(Notice::VisionResultPublished { value, job_id });
        ctx.set_flag(Flag::ResultPublished, true);
    }

    /// A subscribed flag changed.
    pub fn on_edge(&mut self, ctx: &mut Context, edge: FlagEdge) {
        if !edge.is_rising() || !ctx.readiness.all(&[Flag::ResultRead, Flag::ResultPublished]) {
            return;
        }
        let issued = ctx.write(&[
            (TagKey::VisionResultRead, TagValue::UInt16(0)),
            (TagKey::VisionResult, TagValue::UInt16(0)),
        ]);
        if issued.len() < 2 {
            warn!(issued = issued.len(), "Vision result reset not issued");
            return;
        }
        debug!("Vision result acknowledged, resetting result tags");
        ctx.set_flag(Flag::ResultPublished, false);
    }

    /// A result reset write was acked.
    pub fn on_write_ack(&mut self, key: TagKey, ok: bool) {
        if !ok {
            warn!(tag = %key, "Vision result reset failed");
        }
    }
}
