// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Handshake orchestrators.
//!
//! Four independent condition/action state machines. None of them owns state
//! shared with the others: readiness flags, tags, the pending job and the
//! scanned card all live in [`Context`], which the router lends to one
//! orchestrator at a time.
//!
//! Orchestrators never call each other. Setting a flag queues its edge in the
//! context; the router drains the queue afterwards and hands each edge to the
//! subscribers listed in [`Flag::subscribers`](crate::readiness::Flag::subscribers).
//!
//! | Orchestrator | Consumes | Produces |
//! |--------------|----------|----------|
//! | [`LoginHandshake`] | login flags, auth responses, auth write acks | auth writes, auth requests |
//! | [`DispatchHandshake`] | dispatch commands, job gate flags, completion | job writes, job requests |
//! | [`VisionAck`] | vision result, `resultRead`, `resultPublished` | result resets |
//! | [`GatewayReady`] | connection flags | ready notices |

mod dispatch;
mod login;
mod ready;
mod vision;

pub use dispatch::{DispatchHandshake, JOB_APPROVED, JOB_REJECTED};
pub use login::{LoginHandshake, LoginState};
pub use ready::GatewayReady;
pub use vision::VisionAck;

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::event::{Command, Notice};
use crate::job::PendingJob;
use crate::readiness::{Flag, FlagEdge, ReadinessTracker};
use crate::tag::{TagKey, TagRegistry, TagWrite};
use crate::telemetry::Telemetry;
use crate::types::{Qos, TagValue};

// =============================================================================
// RouterConfig
// =============================================================================

/// Static routing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Node prefix joined to every tag path.
    pub node_prefix: String,
    /// Topic filter carrying dispatch commands.
    pub command_filter: String,
    /// Topic receiving telemetry.
    pub telemetry_topic: String,
    /// QoS for telemetry and the command subscription.
    pub qos: Qos,
    /// Service name sent with every authorization request.
    pub auth_service: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            node_prefix: "ns=2;s=|var|CPS-PCS341MB-DS1.Application.GVL.OPC_Machine_A0001".to_string(),
            command_filter: "v1/devices/me/rpc/request/+".to_string(),
            telemetry_topic: "v1/devices/me/telemetry".to_string(),
            qos: Qos::AtMostOnce,
            auth_service: "factory".to_string(),
        }
    }
}

// =============================================================================
// Context
// =============================================================================

/// State shared by the orchestrators, owned by the router.
#[derive(Debug)]
pub struct Context {
    /// Readiness flags.
    pub readiness: ReadinessTracker,
    /// Tag handles of the automation session.
    pub tags: TagRegistry,
    /// Routing parameters.
    pub config: RouterConfig,
    /// Job currently on the machine.
    pub job: Option<PendingJob>,
    /// Last valid card at the station.
    pub card: Option<String>,
    edges: VecDeque<FlagEdge>,
    commands: Vec<Command>,
}

impl Context {
    /// Creates a context with every flag false and no session.
    pub fn new(config: RouterConfig) -> Self {
        Self {
            readiness: ReadinessTracker::default(),
            tags: TagRegistry::new(),
            config,
            job: None,
            card: None,
            edges: VecDeque::new(),
            commands: Vec::new(),
        }
    }

    /// Sets a flag, queueing the edge if it changed.
    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        if let Some(edge) = self.readiness.set(flag, value) {
            self.edges.push_back(edge);
        }
    }

    /// Clears the listed flags, queueing one edge per change.
    pub fn reset_flags(&mut self, flags: &[Flag]) {
        let edges = self.readiness.reset(flags);
        self.edges.extend(edges);
    }

    /// Queues edges produced outside [`Context::set_flag`].
    pub fn queue_edges(&mut self, edges: impl IntoIterator<Item = FlagEdge>) {
        self.edges.extend(edges);
    }

    /// Pops the oldest unhandled edge.
    pub fn next_edge(&mut self) -> Option<FlagEdge> {
        self.edges.pop_front()
    }

    /// Issues writes as one batch.
    ///
    /// Returns the writes actually issued. Writes through a stale or unbound
    /// handle are skipped: no-ops logged at debug level.
    pub fn write(&mut self, values: &[(TagKey, TagValue)]) -> Vec<TagWrite> {
        let Some(generation) = self.tags.generation() else {
            debug!(count = values.len(), "Automation session closed, writes skipped");
            return Vec::new();
        };

        let mut issued = Vec::with_capacity(values.len());
        for (key, value) in values {
            let Some(handle) = self.tags.handle(*key) else {
                debug!(tag = %key, "Tag not bound, write skipped");
                continue;
            };
            match self.tags.write(handle, value.clone()) {
                Ok(write) => issued.push(write),
                Err(e) if e.is_stale() => debug!(tag = %key, error = %e, "Stale write skipped"),
                Err(e) => warn!(tag = %key, error = %e, "Write refused"),
            }
        }

        if !issued.is_empty() {
            self.commands.push(Command::WriteTags {
                generation,
                writes: issued.clone(),
            });
        }
        issued
    }

    /// Enables or disables monitoring of `keys`.
    pub fn set_monitoring(&mut self, keys: &[TagKey], enabled: bool) {
        let Some(generation) = self.tags.generation() else {
            return;
        };
        let addresses: Vec<_> = keys
            .iter()
            .filter_map(|k| self.tags.address(*k).cloned())
            .collect();
        if !addresses.is_empty() {
            self.commands.push(Command::SetMonitoring {
                generation,
                addresses,
                enabled,
            });
        }
    }

    /// Publishes telemetry if the broker is connected. Returns `false` when
    /// the telemetry was dropped.
    pub fn publish(&mut self, telemetry: Telemetry) -> bool {
        if !self.readiness.get(Flag::MqttConnected) {
            debug!(?telemetry, "Broker offline, telemetry dropped");
            return false;
        }
        self.commands.push(Command::Publish {
            topic: self.config.telemetry_topic.clone(),
            payload: telemetry.payload(),
            qos: self.config.qos,
        });
        true
    }

    /// Notifies observers.
    pub fn notify(&mut self, notice: Notice) {
        self.commands.push(Command::Notify(notice));
    }

    /// Queues an arbitrary command.
    pub fn command(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Takes every queued command.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}
