// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Events into the router, commands out of it, and notices for observers.
//!
//! ```text
//!  drivers / poller / auth ──► GatewayEvent ──► EventRouter ──► Command ──► Gateway
//!                                                                  │
//!                                                 Notice ◄─────────┘
//! ```
//!
//! Every event from a session carries the [`Generation`] it was issued
//! under. The router drops events whose generation is no longer current.

use std::collections::HashSet;

use serde::Serialize;

use crate::auth::{AuthOutcome, AuthReply, AuthRequest};
use crate::error::{AuthServiceError, ConnectionError, DeviceError, SessionError, WriteRejected};
use crate::job::PendingJob;
use crate::scan::CardScan;
use crate::tag::TagWrite;
use crate::types::{ConnectionState, Generation, NodeAddress, Qos, SessionKind, TagValue, WriteId};

// =============================================================================
// Inbound
// =============================================================================

/// Operator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Start every session that is not active.
    Start,
    /// Stop every active session.
    Stop,
}

/// Automation-server session events.
#[derive(Debug, Clone)]
pub enum AutomationEvent {
    /// Session established; `available` holds the probed addresses the server knows.
    Connected {
        /// Session generation.
        generation: Generation,
        /// Addresses that exist on the server.
        available: HashSet<NodeAddress>,
    },
    /// Session could not be established.
    ConnectFailed {
        /// Session generation.
        generation: Generation,
        /// The failure.
        error: ConnectionError,
    },
    /// Session dropped.
    Disconnected {
        /// Session generation.
        generation: Generation,
    },
    /// A monitored tag changed.
    TagUpdated {
        /// Session generation.
        generation: Generation,
        /// Tag address.
        address: NodeAddress,
        /// New value.
        value: TagValue,
    },
    /// A write finished.
    WriteCompleted {
        /// Session generation.
        generation: Generation,
        /// The write.
        id: WriteId,
        /// Outcome.
        result: Result<(), WriteRejected>,
    },
    /// Enabling or disabling monitoring failed.
    MonitoringFailed {
        /// Session generation.
        generation: Generation,
        /// The failure.
        error: SessionError,
    },
}

/// Broker session events.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// Broker acknowledged the connection.
    Connected {
        /// Session generation.
        generation: Generation,
    },
    /// Connection could not be started.
    ConnectFailed {
        /// Session generation.
        generation: Generation,
        /// The failure.
        error: ConnectionError,
    },
    /// Connection lost or closed.
    Disconnected {
        /// Session generation.
        generation: Generation,
    },
    /// A message arrived on a subscribed topic.
    Message {
        /// Session generation.
        generation: Generation,
        /// Topic name.
        topic: String,
        /// Raw payload.
        payload: Vec<u8>,
    },
}

/// Device poller events.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The reader was opened.
    Opened {
        /// Session generation.
        generation: Generation,
        /// Device path.
        port: String,
    },
    /// The reader could not be opened. Terminal for the session.
    OpenFailed {
        /// Session generation.
        generation: Generation,
        /// The failure.
        error: DeviceError,
    },
    /// A card was read.
    Scan {
        /// Session generation.
        generation: Generation,
        /// Scan result.
        scan: CardScan,
    },
    /// A read cycle failed.
    ReadFailed {
        /// Session generation.
        generation: Generation,
        /// The failure.
        error: DeviceError,
    },
}

/// Any event the router consumes.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Operator command.
    Control(Control),
    /// Automation-server event.
    Automation(AutomationEvent),
    /// Broker event.
    Broker(BrokerEvent),
    /// Device event.
    Device(DeviceEvent),
    /// Authorization response.
    AuthCompleted {
        /// Request the response belongs to.
        request_id: u64,
        /// Service response.
        response: Result<AuthReply, AuthServiceError>,
    },
}

impl From<Control> for GatewayEvent {
    fn from(c: Control) -> Self {
        Self::Control(c)
    }
}

impl From<AutomationEvent> for GatewayEvent {
    fn from(e: AutomationEvent) -> Self {
        Self::Automation(e)
    }
}

impl From<BrokerEvent> for GatewayEvent {
    fn from(e: BrokerEvent) -> Self {
        Self::Broker(e)
    }
}

impl From<DeviceEvent> for GatewayEvent {
    fn from(e: DeviceEvent) -> Self {
        Self::Device(e)
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// Work the router asks the runtime to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Open the automation session and probe `probe`.
    ConnectAutomation {
        /// New session generation.
        generation: Generation,
        /// Addresses to probe for binding.
        probe: Vec<NodeAddress>,
    },
    /// Close the automation session.
    DisconnectAutomation {
        /// Retired generation.
        generation: Generation,
    },
    /// Add or remove monitored items.
    SetMonitoring {
        /// Session generation.
        generation: Generation,
        /// Affected addresses.
        addresses: Vec<NodeAddress>,
        /// `true` to monitor.
        enabled: bool,
    },
    /// Write tags as one batch. Each write is acked individually.
    WriteTags {
        /// Session generation.
        generation: Generation,
        /// The writes, in issue order.
        writes: Vec<TagWrite>,
    },
    /// Open the broker session.
    ConnectBroker {
        /// New session generation.
        generation: Generation,
    },
    /// Close the broker session.
    DisconnectBroker {
        /// Retired generation.
        generation: Generation,
    },
    /// Subscribe to a topic filter.
    Subscribe {
        /// Session generation.
        generation: Generation,
        /// Topic filter.
        filter: String,
        /// Requested QoS.
        qos: Qos,
    },
    /// Publish telemetry. Best effort.
    Publish {
        /// Topic.
        topic: String,
        /// JSON payload.
        payload: String,
        /// QoS.
        qos: Qos,
    },
    /// Ask the authorization service.
    RequestAuth {
        /// Correlates the response.
        request_id: u64,
        /// Credentials.
        request: AuthRequest,
    },
    /// Start the device poller.
    StartDevice {
        /// New session generation.
        generation: Generation,
    },
    /// Stop the device poller and wait for it to quiesce.
    StopDevice {
        /// Retired generation.
        generation: Generation,
    },
    /// Tell observers.
    Notify(Notice),
}

/// Observer notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// A session changed state.
    SessionState {
        /// Session.
        session: SessionKind,
        /// New state.
        state: ConnectionState,
    },
    /// A session failed to start.
    SessionFailed {
        /// Session.
        session: SessionKind,
        /// Failure description.
        message: String,
    },
    /// Gateway-ready aggregate changed.
    GatewayReady {
        /// New value.
        ready: bool,
    },
    /// The server asked for a login.
    LoginRequested,
    /// The authorization service answered.
    AuthResult(AuthOutcome),
    /// A login handshake returned to idle.
    LoginCompleted {
        /// Whether the user was approved.
        approved: bool,
    },
    /// A job was written to the machine.
    JobDispatched(PendingJob),
    /// A dispatch command was malformed.
    JobRejected {
        /// Decode failure.
        reason: String,
    },
    /// The machine completed a job.
    JobCompleted {
        /// Completed job.
        job_id: String,
    },
    /// The job-request gate fired.
    JobRequestSent {
        /// Card at the station.
        card: String,
    },
    /// A card was scanned.
    CardScanned {
        /// Card serial.
        card: String,
        /// Raw block data.
        data: String,
    },
    /// A vision result was published.
    VisionResultPublished {
        /// Result code.
        value: i64,
        /// Running job.
        job_id: String,
    },
}
