// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The readiness tracker.
//!
//! A plain set of named booleans. Every change produces a [`FlagEdge`] that is
//! returned to the caller (the router dispatches it to the orchestrators in
//! [`Flag::subscribers`]) and broadcast to observers. Edges are never
//! coalesced: two changes produce two edges, in order.
//!
//! ```text
//!   tag update ──┐
//!   write ack ───┼──► set(flag) ──► FlagEdge ──► router ──► orchestrators
//!   session ─────┘                     │
//!                                      └──► broadcast ──► observers
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

// =============================================================================
// Flag
// =============================================================================

/// The event source allowed to drive a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSource {
    /// The automation server session.
    Automation,
    /// The broker session.
    Broker,
    /// The card reader.
    Device,
}

/// An orchestrator that consumes flag edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subscriber {
    /// HMI login handshake.
    Login,
    /// Job dispatch handshake and job-request gate.
    Dispatch,
    /// Vision result acknowledgment.
    Vision,
    /// Gateway-ready aggregation.
    GatewayReady,
}

/// A named readiness flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Flag {
    /// Automation session connected.
    OpcuaConnected,
    /// Broker session connected.
    MqttConnected,
    /// Card reader open.
    RfidConnected,
    /// Machine power ready.
    PowerReady,
    /// Vision system ready.
    VisionReady,
    /// Machine requests a job.
    JobRequestPending,
    /// A card has been scanned and not yet consumed.
    MaterialReady,
    /// A usable username was observed.
    HmiUsernameReady,
    /// A usable password was observed.
    HmiPasswordReady,
    /// The server raised the login request.
    LoginRequested,
    /// Auth code write acked.
    AuthCodeWritten,
    /// Auth name write acked.
    AuthNameWritten,
    /// Auth level write acked.
    AuthLevelWritten,
    /// Machine consumed the vision result.
    ResultRead,
    /// The vision result was published to the broker.
    ResultPublished,
    /// A job was dispatched and not yet completed.
    JobBusy,
    /// Machine reported job completion.
    JobCompleted,
}

impl Flag {
    /// Number of flags.
    pub const COUNT: usize = 17;

    /// Every flag, in declaration order.
    pub const ALL: [Flag; Self::COUNT] = [
        Flag::OpcuaConnected,
        Flag::MqttConnected,
        Flag::RfidConnected,
        Flag::PowerReady,
        Flag::VisionReady,
        Flag::JobRequestPending,
        Flag::MaterialReady,
        Flag::HmiUsernameReady,
        Flag::HmiPasswordReady,
        Flag::LoginRequested,
        Flag::AuthCodeWritten,
        Flag::AuthNameWritten,
        Flag::AuthLevelWritten,
        Flag::ResultRead,
        Flag::ResultPublished,
        Flag::JobBusy,
        Flag::JobCompleted,
    ];

    /// The three auth-result write acks.
    pub const AUTH_WRITTEN: [Flag; 3] = [
        Flag::AuthCodeWritten,
        Flag::AuthNameWritten,
        Flag::AuthLevelWritten,
    ];

    /// The inputs of the job-request gate.
    pub const JOB_GATE: [Flag; 4] = [
        Flag::JobRequestPending,
        Flag::VisionReady,
        Flag::PowerReady,
        Flag::MaterialReady,
    ];

    /// The inputs of gateway-ready aggregation.
    pub const CONNECTIONS: [Flag; 3] = [
        Flag::OpcuaConnected,
        Flag::MqttConnected,
        Flag::RfidConnected,
    ];

    /// Returns the flag name.
    pub const fn name(&self) -> &'static str {
        match self {
            Flag::OpcuaConnected => "opcuaConnected",
            Flag::MqttConnected => "mqttConnected",
            Flag::RfidConnected => "rfidConnected",
            Flag::PowerReady => "powerReady",
            Flag::VisionReady => "visionReady",
            Flag::JobRequestPending => "jobRequestPending",
            Flag::MaterialReady => "materialReady",
            Flag::HmiUsernameReady => "hmiUsernameReady",
            Flag::HmiPasswordReady => "hmiPasswordReady",
            Flag::LoginRequested => "loginRequested",
            Flag::AuthCodeWritten => "authCodeWritten",
            Flag::AuthNameWritten => "authNameWritten",
            Flag::AuthLevelWritten => "authLevelWritten",
            Flag::ResultRead => "resultRead",
            Flag::ResultPublished => "resultPublished",
            Flag::JobBusy => "jobBusy",
            Flag::JobCompleted => "jobCompleted",
        }
    }

    /// Returns the session whose boundary resets this flag.
    pub const fn source(&self) -> FlagSource {
        match self {
            Flag::MqttConnected => FlagSource::Broker,
            Flag::RfidConnected | Flag::MaterialReady => FlagSource::Device,
            _ => FlagSource::Automation,
        }
    }

    /// Returns the orchestrators that consume this flag's edges.
    pub const fn subscribers(&self) -> &'static [Subscriber] {
        match self {
            Flag::OpcuaConnected | Flag::MqttConnected | Flag::RfidConnected => {
                &[Subscriber::GatewayReady]
            }
            Flag::PowerReady
            | Flag::VisionReady
            | Flag::JobRequestPending
            | Flag::MaterialReady
            | Flag::JobCompleted => &[Subscriber::Dispatch],
            Flag::HmiUsernameReady
            | Flag::HmiPasswordReady
            | Flag::LoginRequested
            | Flag::AuthCodeWritten
            | Flag::AuthNameWritten
            | Flag::AuthLevelWritten => &[Subscriber::Login],
            Flag::ResultRead | Flag::ResultPublished => &[Subscriber::Vision],
            Flag::JobBusy => &[],
        }
    }

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// FlagEdge
// =============================================================================

/// A single flag transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagEdge {
    /// The flag that changed.
    pub flag: Flag,
    /// The new value.
    pub value: bool,
    /// Monotonic transition counter.
    pub sequence: u64,
}

impl FlagEdge {
    /// Returns `true` for a false-to-true transition.
    #[inline]
    pub fn is_rising(&self) -> bool {
        self.value
    }
}

impl fmt::Display for FlagEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = if self.value { "0->1" } else { "1->0" };
        write!(f, "{} {} (#{})", self.flag, arrow, self.sequence)
    }
}

// =============================================================================
// ReadinessTracker
// =============================================================================

/// Holder of every readiness flag.
#[derive(Debug)]
pub struct ReadinessTracker {
    state: [bool; Flag::COUNT],
    sequence: u64,
    edges: broadcast::Sender<FlagEdge>,
}

impl Default for ReadinessTracker {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ReadinessTracker {
    /// Creates a tracker with every flag false.
    ///
    /// `capacity` bounds the observer broadcast buffer.
    pub fn new(capacity: usize) -> Self {
        let (edges, _) = broadcast::channel(capacity.max(1));
        Self {
            state: [false; Flag::COUNT],
            sequence: 0,
            edges,
        }
    }

    /// Returns the current value of `flag`.
    #[inline]
    pub fn get(&self, flag: Flag) -> bool {
        self.state[flag.index()]
    }

    /// Returns `true` if every flag in `flags` is set.
    pub fn all(&self, flags: &[Flag]) -> bool {
        flags.iter().all(|f| self.get(*f))
    }

    /// Sets `flag`, returning the edge if the value changed.
    pub fn set(&mut self, flag: Flag, value: bool) -> Option<FlagEdge> {
        let slot = &mut self.state[flag.index()];
        if *slot == value {
            return None;
        }
        *slot = value;
        self.sequence += 1;
        let edge = FlagEdge {
            flag,
            value,
            sequence: self.sequence,
        };
        trace!(flag = flag.name(), value, sequence = edge.sequence, "Flag edge");
        // No observers is fine.
        let _ = self.edges.send(edge);
        Some(edge)
    }

    /// Clears every flag driven by `source`, one edge per changed flag.
    pub fn reset_source(&mut self, source: FlagSource) -> Vec<FlagEdge> {
        Flag::ALL
            .iter()
            .filter(|f| f.source() == source)
            .filter_map(|f| self.set(*f, false))
            .collect()
    }

    /// Clears the listed flags, one edge per changed flag.
    pub fn reset(&mut self, flags: &[Flag]) -> Vec<FlagEdge> {
        flags.iter().filter_map(|f| self.set(*f, false)).collect()
    }

    /// Subscribes to every future edge.
    pub fn subscribe(&self) -> broadcast::Receiver<FlagEdge> {
        self.edges.subscribe()
    }

    /// Returns a name-to-value snapshot of every flag.
    pub fn snapshot(&self) -> BTreeMap<&'static str, bool> {
        Flag::ALL.iter().map(|f| (f.name(), self.get(*f))).collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_is_in_declaration_order() {
        for (i, flag) in Flag::ALL.iter().enumerate() {
            assert_eq!(flag.index(), i);
        }
    }

    #[test]
    fn test_set_emits_only_on_change() {
        let mut tracker = ReadinessTracker::default();
        assert!(tracker.set(Flag::PowerReady, false).is_none());

        let edge = tracker.set(Flag::PowerReady, true).unwrap();
        assert!(edge.is_rising());
        assert_eq!(edge.sequence, 1);
        assert!(tracker.set(Flag::PowerReady, true).is_none());

        let edge = tracker.set(Flag::PowerReady, false).unwrap();
        assert!(!edge.is_rising());
        assert_eq!(edge.sequence, 2);
    }

    #[test]
    fn test_edges_are_broadcast_individually() {
        let mut tracker = ReadinessTracker::default();
        let mut rx = tracker.subscribe();

        tracker.set(Flag::MaterialReady, true);
        tracker.set(Flag::MaterialReady, false);
        tracker.set(Flag::MaterialReady, true);

        let values: Vec<bool> = (0..3).map(|_| rx.try_recv().unwrap().value).collect();
        assert_eq!(values, vec![true, false, true]);
    }

    #[test]
    fn test_reset_source() {
        let mut tracker = ReadinessTracker::default();
        tracker.set(Flag::OpcuaConnected, true);
        tracker.set(Flag::PowerReady, true);
        tracker.set(Flag::MqttConnected, true);
        tracker.set(Flag::MaterialReady, true);

        let edges = tracker.reset_source(FlagSource::Automation);
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| !e.value));
        assert!(tracker.get(Flag::MqttConnected));
        assert!(tracker.get(Flag::MaterialReady));

        let edges = tracker.reset_source(FlagSource::Device);
        assert_eq!(edges.iter().map(|e| e.flag).collect::<Vec<_>>(), vec![Flag::MaterialReady]);
    }

    #[test]
    fn test_subscription_table() {
        assert_eq!(Flag::MqttConnected.subscribers(), &[Subscriber::GatewayReady]);
        assert_eq!(Flag::MaterialReady.subscribers(), &[Subscriber::Dispatch]);
        assert_eq!(Flag::AuthLevelWritten.subscribers(), &[Subscriber::Login]);
        assert_eq!(Flag::ResultPublished.subscribers(), &[Subscriber::Vision]);
        assert!(Flag::JobBusy.subscribers().is_empty());
    }

    #[test]
    fn test_snapshot_names() {
        let mut tracker = ReadinessTracker::default();
        tracker.set(Flag::JobRequestPending, true);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), Flag::COUNT);
        assert_eq!(snapshot["jobRequestPending"], true);
        assert_eq!(snapshot["visionReady"], false);
    }
}
