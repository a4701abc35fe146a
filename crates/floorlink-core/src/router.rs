// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The event router.
//!
//! The router is the single owner of the readiness tracker, the tag registry
//! and the four orchestrators. [`EventRouter::handle`] consumes one event,
//! updates state, drains every flag edge the event caused (in order, to the
//! subscribed orchestrators), and returns the commands to execute.
//!
//! The router never blocks and never performs I/O, so every handshake can be
//! driven by hand in tests.
//!
//! # Example
//!
//! ```
//! use floorlink_core::event::{Command, Control, GatewayEvent};
//! use floorlink_core::router::EventRouter;
//! use floorlink_core::RouterConfig;
//!
//! let mut router = EventRouter::new(RouterConfig::default());
//! let commands = router.handle(GatewayEvent::Control(Control::Start));
//! assert!(commands.iter().any(|c| matches!(c, Command::ConnectAutomation { .. })));
//! ```

use tracing::{debug, error, info, trace, warn};

use crate::error::{GatewayError, WriteRejected};
use crate::event::{
    AutomationEvent, BrokerEvent, Command, Control, DeviceEvent, GatewayEvent, Notice,
};
use crate::handshake::{
    Context, DispatchHandshake, GatewayReady, LoginHandshake, LoginState, RouterConfig, VisionAck,
};
use crate::job::PendingJob;
use crate::readiness::{Flag, FlagEdge, FlagSource, ReadinessTracker, Subscriber};
use crate::scan::CardScan;
use crate::tag::{TagKey, TagRegistry, CATALOG};
use crate::telemetry::Telemetry;
use crate::types::{ConnectionState, Generation, NodeAddress, SessionKind, TagValue, WriteId};

// =============================================================================
// Sessions
// =============================================================================

#[derive(Debug, Default, Clone, Copy)]
struct SessionSlot {
    generation: Option<Generation>,
    state: ConnectionState,
}

#[derive(Debug, Default)]
struct Sessions {
    automation: SessionSlot,
    broker: SessionSlot,
    device: SessionSlot,
}

impl Sessions {
    fn get(&self, kind: SessionKind) -> &SessionSlot {
        match kind {
            SessionKind::Automation => &self.automation,
            SessionKind::Broker => &self.broker,
            SessionKind::Device => &self.device,
        }
    }

    fn get_mut(&mut self, kind: SessionKind) -> &mut SessionSlot {
        match kind {
            SessionKind::Automation => &mut self.automation,
            SessionKind::Broker => &mut self.broker,
            SessionKind::Device => &mut self.device,
        }
    }
}

// =============================================================================
// EventRouter
// =============================================================================

/// Dispatches inbound events to the orchestrators.
#[derive(Debug)]
pub struct EventRouter {
    ctx: Context,
    login: LoginHandshake,
    dispatch: DispatchHandshake,
    vision: VisionAck,
    ready: GatewayReady,
    sessions: Sessions,
    last_generation: Generation,
}

impl EventRouter {
    /// Creates a router with every session stopped.
    pub fn new(config: RouterConfig) -> Self {
        Self {
            ctx: Context::new(config),
            login: LoginHandshake::new(),
            dispatch: DispatchHandshake::new(),
            vision: VisionAck::new(),
            ready: GatewayReady::new(),
            sessions: Sessions::default(),
            last_generation: Generation::default(),
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Readiness flags.
    pub fn readiness(&self) -> &ReadinessTracker {
        &self.ctx.readiness
    }

    /// Tag registry.
    pub fn tags(&self) -> &TagRegistry {
        &self.ctx.tags
    }

    /// Routing parameters.
    pub fn config(&self) -> &RouterConfig {
        &self.ctx.config
    }

    /// State of the login handshake.
    pub fn login_state(&self) -> &LoginState {
        self.login.state()
    }

    /// Job currently on the machine.
    pub fn pending_job(&self) -> Option<&PendingJob> {
        self.ctx.job.as_ref()
    }

    /// Last scanned card.
    pub fn card(&self) -> Option<&str> {
        self.ctx.card.as_deref()
    }

    /// Gateway-ready aggregate.
    pub fn is_gateway_ready(&self) -> bool {
        self.ready.is_ready()
    }

    /// Current state of a session.
    pub fn session_state(&self, kind: SessionKind) -> ConnectionState {
        self.sessions.get(kind).state
    }

    /// Current generation of a session, if active.
    pub fn session_generation(&self, kind: SessionKind) -> Option<Generation> {
        self.sessions.get(kind).generation
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    /// Handles one event and returns the commands it produced.
    pub fn handle(&mut self, event: GatewayEvent) -> Vec<Command> {
        match event {
            GatewayEvent::Control(control) => self.on_control(control),
            GatewayEvent::Automation(event) => self.on_automation(event),
            GatewayEvent::Broker(event) => self.on_broker(event),
            GatewayEvent::Device(event) => self.on_device(event),
            GatewayEvent::AuthCompleted {
                request_id,
                response,
            } => self.login.on_auth_response(&mut self.ctx, request_id, response),
        }
        self.drain_edges();
        self.ctx.take_commands()
    }

    fn drain_edges(&mut self) {
        while let Some(edge) = self.ctx.next_edge() {
            trace!(edge = %edge, "Dispatching flag edge");
            for subscriber in edge.flag.subscribers() {
                self.deliver(*subscriber, edge);
            }
        }
    }

    fn deliver(&mut self, subscriber: Subscriber, edge: FlagEdge) {
        match subscriber {
            Subscriber::Login => self.login.on_edge(&mut self.ctx, edge),
            Subscriber::Dispatch => self.dispatch.on_edge(&mut self.ctx, edge),
            Subscriber::Vision => self.vision.on_edge(&mut self.ctx, edge),
            Subscriber::GatewayReady => self.ready.on_edge(&mut self.ctx, edge),
        }
    }

    fn is_current(&self, kind: SessionKind, generation: Generation) -> bool {
        let current = self.sessions.get(kind).generation == Some(generation);
        if !current {
            debug!(session = %kind, %generation, "Event from retired session discarded");
        }
        current
    }

    fn set_state(&mut self, kind: SessionKind, state: ConnectionState) {
        let slot = self.sessions.get_mut(kind);
        if slot.state != state {
            slot.state = state;
            self.ctx.notify(Notice::SessionState {
                session: kind,
                state,
            });
        }
    }

    // -------------------------------------------------------------------------
    // Control
    // -------------------------------------------------------------------------

    fn on_control(&mut self, control: Control) {
        match control {
            Control::Start => {
                for kind in SessionKind::ALL {
                    if self.sessions.get(kind).generation.is_none() {
                        self.start_session(kind);
                    }
                }
            }
            Control::Stop => {
                for kind in SessionKind::ALL {
                    self.stop_session(kind);
                }
            }
        }
    }

    fn start_session(&mut self, kind: SessionKind) {
        self.last_generation = self.last_generation.next();
        let generation = self.last_generation;
        self.sessions.get_mut(kind).generation = Some(generation);
        self.set_state(kind, ConnectionState::Connecting);
        info!(session = %kind, %generation, "Starting session");

        let command = match kind {
            SessionKind::Automation => Command::ConnectAutomation {
                generation,
                probe: CATALOG
                    .iter()
                    .map(|spec| spec.address(&self.ctx.config.node_prefix))
                    .collect(),
            },
            SessionKind::Broker => Command::ConnectBroker { generation },
            SessionKind::Device => Command::StartDevice { generation },
        };
        self.ctx.command(command);
    }

    /// Stops a session. Safe when the session is idle.
    fn stop_session(&mut self, kind: SessionKind) {
        if let Some(generation) = self.sessions.get(kind).generation {
            info!(session = %kind, %generation, "Stopping session");
            self.ctx.command(match kind {
                SessionKind::Automation => Command::DisconnectAutomation { generation },
                SessionKind::Broker => Command::DisconnectBroker { generation },
                SessionKind::Device => Command::StopDevice { generation },
            });
        }
        self.end_session(kind, ConnectionState::Disconnected);
    }

    /// Retires the session generation and resets everything derived from it.
    fn end_session(&mut self, kind: SessionKind, state: ConnectionState) {
        self.sessions.get_mut(kind).generation = None;
        let source = match kind {
            SessionKind::Automation => {
                let invalidated = self.ctx.tags.close_session();
                if invalidated > 0 {
                    debug!(invalidated, "Tag handles invalidated");
                }
                self.login.reset();
                self.dispatch.reset();
                self.vision.reset();
                self.ctx.job = None;
                FlagSource::Automation
            }
            SessionKind::Broker => FlagSource::Broker,
            SessionKind::Device => {
                self.ctx.card = None;
                FlagSource::Device
            }
        };
        let edges = self.ctx.readiness.reset_source(source);
        self.ctx.queue_edges(edges);
        self.set_state(kind, state);
    }

    fn fail_session(&mut self, kind: SessionKind, error: GatewayError) {
        error!(session = %kind, error = %error, "Session failed");
        self.ctx.notify(Notice::SessionFailed {
            session: kind,
            message: error.to_string(),
        });
        self.end_session(kind, ConnectionState::Failed);
    }

    // -------------------------------------------------------------------------
    // Automation server
    // -------------------------------------------------------------------------

    fn on_automation(&mut self, event: AutomationEvent) {
        match event {
            AutomationEvent::Connected {
                generation,
                available,
            } => {
                if !self.is_current(SessionKind::Automation, generation) {
                    return;
                }
                self.ctx.tags.open_session(generation);
                let prefix = self.ctx.config.node_prefix.clone();
                for error in self.ctx.tags.bind_catalog(&prefix, &available) {
                    warn!(error = %error, "Tag not bound");
                }
                info!(
                    %generation,
                    bound = self.ctx.tags.bound_count(),
                    "Automation session connected"
                );
                self.set_state(SessionKind::Automation, ConnectionState::Connected);
                self.ctx.set_flag(Flag::OpcuaConnected, true);
                let monitored: Vec<TagKey> = TagKey::always_monitored().collect();
                self.ctx.set_monitoring(&monitored, true);
            }
            AutomationEvent::ConnectFailed { generation, error } => {
                if self.is_current(SessionKind::Automation, generation) {
                    self.fail_session(SessionKind::Automation, error.into());
                }
            }
            AutomationEvent::Disconnected { generation } => {
                if self.is_current(SessionKind::Automation, generation) {
                    warn!(%generation, "Automation session lost");
                    self.end_session(SessionKind::Automation, ConnectionState::Disconnected);
                }
            }
            AutomationEvent::TagUpdated {
                generation,
                address,
                value,
            } => {
                if self.is_current(SessionKind::Automation, generation) {
                    self.on_tag_update(&address, value);
                }
            }
            AutomationEvent::WriteCompleted {
                generation,
                id,
                result,
            } => self.on_write_completed(generation, id, result),
            AutomationEvent::MonitoringFailed { generation, error } => {
                if self.is_current(SessionKind::Automation, generation) {
                    warn!(error = %error, "Monitoring change failed");
                }
            }
        }
    }

    fn on_tag_update(&mut self, address: &NodeAddress, value: TagValue) {
        let (key, value) = match self.ctx.tags.observe(address, value) {
            Ok(observed) => observed,
            Err(e) => {
                warn!(%address, error = %e, "Tag update rejected");
                return;
            }
        };
        trace!(tag = %key, %value, "Tag updated");
        let number = value.as_i64();
        let ctx = &mut self.ctx;

        match key {
            TagKey::AuthRequest => self.login.on_request_tag(ctx, number),
            TagKey::Username => self.login.on_username(ctx, value.as_str()),
            TagKey::Password => self.login.on_password(ctx, value.as_str()),
            TagKey::JobRequest => ctx.set_flag(Flag::JobRequestPending, number == Some(1)),
            TagKey::PowerStatus => {
                ctx.set_flag(Flag::PowerReady, number == Some(1));
                ctx.publish(Telemetry::PowerStatus(number.unwrap_or_default()));
            }
            TagKey::VisionStatus => {
                ctx.set_flag(Flag::VisionReady, number == Some(1));
                ctx.publish(Telemetry::VisionStatus(number.unwrap_or_default()));
            }
            TagKey::VisionResult => self.vision.on_result(ctx, number),
            TagKey::VisionResultRead => ctx.set_flag(Flag::ResultRead, number == Some(1)),
            TagKey::GoodParts
            | TagKey::RejectSizeParts
            | TagKey::RejectColorParts
            | TagKey::TotalParts => {
                ctx.publish(Telemetry::Counter {
                    key,
                    value: number.unwrap_or_default(),
                });
            }
            TagKey::JobBusy => {
                ctx.publish(Telemetry::JobBusy(number.unwrap_or_default()));
            }
            TagKey::JobCompleted => ctx.set_flag(Flag::JobCompleted, number == Some(1)),
            TagKey::MachineStep => {
                ctx.publish(Telemetry::MachineStep(number.unwrap_or_default()));
            }
            TagKey::ObjectPresent => {
                ctx.publish(Telemetry::ObjectPresent(number.unwrap_or_default()));
            }
            TagKey::UserLogout => {
                if number == Some(1) {
                    info!("HMI user logged out");
                    ctx.publish(Telemetry::Logout);
                }
            }
            other => trace!(tag = %other, "No routing for tag"),
        }
    }

    fn on_write_completed(
        &mut self,
        generation: Generation,
        id: WriteId,
        result: Result<(), WriteRejected>,
    ) {
        let Some(pending) = self.ctx.tags.complete_write(id, generation) else {
            debug!(write_id = %id, %generation, "Write ack for retired session discarded");
            return;
        };
        let ok = match result {
            Ok(()) => {
                trace!(tag = %pending.key, value = %pending.value, "Write acked");
                true
            }
            Err(rejected) => {
                warn!(
                    tag = %pending.key,
                    error = %GatewayError::from(rejected),
                    "Write rejected"
                );
                false
            }
        };

        match pending.key {
            TagKey::AuthApprove | TagKey::AuthName | TagKey::AuthAccessLevel | TagKey::AuthRequest => {
                self.login.on_write_ack(&mut self.ctx, id, ok)
            }
            TagKey::VisionResult | TagKey::VisionResultRead => {
                self.vision.on_write_ack(pending.key, ok)
            }
            TagKey::MaterialReady => {
                if !ok {
                    warn!("Material ready write failed");
                }
            }
            key => self.dispatch.on_write_ack(key, id, ok),
        }
    }

    // -------------------------------------------------------------------------
    // Broker
    // -------------------------------------------------------------------------

    fn on_broker(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected { generation } => {
                if !self.is_current(SessionKind::Broker, generation) {
                    return;
                }
                info!(%generation, "Broker session connected");
                self.set_state(SessionKind::Broker, ConnectionState::Connected);
                self.ctx.set_flag(Flag::MqttConnected, true);
                self.ctx.command(Command::Subscribe {
                    generation,
                    filter: self.ctx.config.command_filter.clone(),
                    qos: self.ctx.config.qos,
                });
            }
            BrokerEvent::ConnectFailed { generation, error } => {
                if self.is_current(SessionKind::Broker, generation) {
                    self.fail_session(SessionKind::Broker, error.into());
                }
            }
            BrokerEvent::Disconnected { generation } => {
                if self.is_current(SessionKind::Broker, generation) {
                    warn!(%generation, "Broker session lost");
                    self.end_session(SessionKind::Broker, ConnectionState::Disconnected);
                }
            }
            BrokerEvent::Message {
                generation,
                topic,
                payload,
            } => {
                if !self.is_current(SessionKind::Broker, generation) {
                    return;
                }
                if topic_matches(&self.ctx.config.command_filter, &topic) {
                    info!(%topic, bytes = payload.len(), "Dispatch command received");
                    self.dispatch.on_command(&mut self.ctx, &payload);
                } else {
                    debug!(%topic, "Broker message on unrouted topic");
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Device
    // -------------------------------------------------------------------------

    fn on_device(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Opened { generation, port } => {
                if !self.is_current(SessionKind::Device, generation) {
                    return;
                }
                info!(%port, "Card reader opened");
                self.set_state(SessionKind::Device, ConnectionState::Connected);
                self.ctx.set_flag(Flag::RfidConnected, true);
            }
            DeviceEvent::OpenFailed { generation, error } => {
                if self.is_current(SessionKind::Device, generation) {
                    self.fail_session(SessionKind::Device, error.into());
                }
            }
            DeviceEvent::Scan { generation, scan } => {
                if self.is_current(SessionKind::Device, generation) {
                    self.on_scan(scan);
                }
            }
            DeviceEvent::ReadFailed { generation, error } => {
                if self.is_current(SessionKind::Device, generation) {
                    warn!(error = %error, "Card read failed");
                }
            }
        }
    }

    fn on_scan(&mut self, scan: CardScan) {
        if !scan.valid {
            debug!(reason = %scan.data, "Invalid card read");
            return;
        }
        info!(card = %scan.card_id, data = %scan.data, "Card scanned");
        self.ctx.card = Some(scan.card_id.clone());
        self.ctx.publish(Telemetry::CardScanned {
            card: scan.card_id.clone(),
            data: scan.data.clone(),
        });
        self.ctx.notify(Notice::CardScanned {
            card: scan.card_id,
            data: scan.data,
        });
        self.ctx.set_flag(Flag::MaterialReady, true);
        self.ctx.write(&[(TagKey::MaterialReady, TagValue::UInt16(1))]);
    }
}

/// Matches an MQTT topic against a filter with `+` and `#` wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
