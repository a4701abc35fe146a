// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Job dispatch handshake and the job-request gate.
//!
//! Dispatch: a broker command is decoded into a [`PendingJob`], its fields and
//! the approve code are written to the machine as one batch, and `jobBusy` is
//! raised. A malformed command writes the reject code instead.
//!
//! Gate: on any rising edge of its inputs, publish a job request when
//! `jobRequestPending`, `visionReady`, `powerReady` and `materialReady` are all
//! set. Firing consumes `materialReady` only.

use tracing::{debug, info, warn};

use super::Context;
use crate::event::Notice;
use crate::job::{PendingJob, CLEARED_JOB_ID};
use crate::readiness::{Flag, FlagEdge};
use crate::tag::TagKey;
use crate::telemetry::Telemetry;
use crate::types::{TagValue, WriteId};

/// Job dispatch result code: approved.
pub const JOB_APPROVED: i16 = 8;

/// Job dispatch result code: rejected.
pub const JOB_REJECTED: i16 = 7;

/// The job dispatch handshake.
#[derive(Debug, Default)]
pub struct DispatchHandshake {
    approve_write: Option<WriteId>,
    requests_sent: u64,
}

impl DispatchHandshake {
    /// Creates an idle handshake.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of job requests published so far.
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    /// Forgets the outstanding approve write.
    pub fn reset(&mut self) {
        self.approve_write = None;
    }

    /// A dispatch command arrived.
    pub fn on_command(&mut self, ctx: &mut Context, payload: &[u8]) {
        let job = match PendingJob::decode(payload) {
            Ok(job) => job,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed job dispatch");
                let issued = ctx.write(&[(TagKey::JobApprove, TagValue::Int16(JOB_REJECTED))]);
                self.approve_write = issued.first().map(|w| w.id);
                ctx.notify(Notice::JobRejected {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let mut values = job.field_writes();
        values.push((TagKey::JobApprove, TagValue::Int16(JOB_APPROVED)));
        let issued = ctx.write(&values);
        if issued.is_empty() {
            warn!(job_id = %job.job_id, "Automation session not available, job not dispatched");
            return;
        }
        if issued.len() < values.len() {
            warn!(
                job_id = %job.job_id,
                issued = issued.len(),
                expected = values.len(),
                "Job partially written"
            );
        }
        self.approve_write = issued
            .iter()
            .find(|w| w.key == TagKey::JobApprove)
            .map(|w| w.id);

        if let Some(previous) = &ctx.job {
            debug!(previous = %previous.job_id, next = %job.job_id, "Pending job superseded");
        }
        info!(job_id = %job.job_id, job_name = %job.job_name, "Job dispatched to machine");
        ctx.job = Some(job.clone());
        ctx.set_flag(Flag::JobBusy, true);
        ctx.notify(Notice::JobDispatched(job));
    }

    /// A job write was acked.
    pub fn on_write_ack(&mut self, key: TagKey, id: WriteId, ok: bool) {
        if self.approve_write == Some(id) {
            self.approve_write = None;
            if ok {
                info!("Job approve code accepted by machine");
            } else {
                warn!("Job approve code write failed");
            }
        } else if !ok {
            warn!(tag = %key, "Job field write failed");
        }
    }

    /// A subscribed flag changed.
    pub fn on_edge(&mut self, ctx: &mut Context, edge: FlagEdge) {
        if !edge.is_rising() {
            return;
        }
        if edge.flag == Flag::JobCompleted {
            self.complete(ctx);
        } else if ctx.readiness.all(&Flag::JOB_GATE) {
            self.fire(ctx);
        } else {
            debug!(edge = %edge, "Job request gate not satisfied");
        }
    }

    fn fire(&mut self, ctx: &mut Context) {
        let card = ctx.card.clone().unwrap_or_default();
        info!(card = %card, "Station ready, sending job request");
        self.requests_sent += 1;
        ctx.publish(Telemetry::JobRequest { card: card.clone() });
        ctx.set_flag(Flag::MaterialReady, false);
        ctx.notify(Notice::JobRequestSent { card });
    }

    fn complete(&mut self, ctx: &mut Context) {
        let job_id = ctx
            .job
            .take()
            .map(|j| j.job_id)
            .unwrap_or_else(|| CLEARED_JOB_ID.to_string());
        info!(job_id = %job_id, "Machine completed job");
        ctx.set_flag(Flag::JobBusy, false);
        ctx.publish(Telemetry::JobCompleted {
            job_id: job_id.clone(),
        });
        ctx.notify(Notice::JobCompleted { job_id });
    }
}
