// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The gateway runtime.
//!
//! Owns the [`EventRouter`] and executes the commands it returns against the
//! drivers.
//!
//! ```text
//!  ┌──────────────┐  events   ┌─────────────┐  commands  ┌──────────────────┐
//!  │ EventSink(s) │ ────────► │ EventRouter │ ─────────► │ executors        │
//!  └──────────────┘           └─────────────┘            │  automation task │
//!         ▲                                              │  broker task     │
//!         │                  driver results              │  auth (per req)  │
//!         └───────────────────────────────────────────── │  device poller   │
//!                                                        └──────────────────┘
//! ```
//!
//! Automation and broker operations run on one task each so they reach the
//! endpoint in issue order. Authorization requests run concurrently; stale
//! responses are discarded by the login handshake.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::driver::{AuthClient, AutomationDriver, BrokerDriver, CardReader, EventSink};
use crate::error::{DeviceError, WriteRejected};
use crate::event::{AutomationEvent, BrokerEvent, Command, Control, DeviceEvent, GatewayEvent, Notice};
use crate::handshake::RouterConfig;
use crate::poller::{DevicePoller, DEFAULT_POLL_INTERVAL};
use crate::readiness::FlagEdge;
use crate::router::EventRouter;
use crate::tag::TagWrite;
use crate::types::{Generation, NodeAddress, Qos};

// =============================================================================
// Options
// =============================================================================

/// Runtime tuning.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Delay between card reader cycles.
    pub poll_interval: Duration,
    /// Capacity of the inbound event queue.
    pub event_capacity: usize,
    /// Capacity of the notice broadcast channel.
    pub notice_capacity: usize,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_capacity: 1024,
            notice_capacity: 256,
        }
    }
}

/// The endpoints the gateway connects.
pub struct GatewayDrivers {
    /// Automation server.
    pub automation: Arc<dyn AutomationDriver>,
    /// MQTT broker.
    pub broker: Arc<dyn BrokerDriver>,
    /// Authorization service.
    pub auth: Arc<dyn AuthClient>,
    /// Card reader.
    pub reader: Box<dyn CardReader>,
}

// =============================================================================
// Executor operations
// =============================================================================

enum AutomationOp {
    Connect {
        generation: Generation,
        probe: Vec<NodeAddress>,
    },
    Disconnect,
    Monitor {
        generation: Generation,
        addresses: Vec<NodeAddress>,
        enabled: bool,
    },
    Write {
        generation: Generation,
        writes: Vec<TagWrite>,
    },
}

enum BrokerOp {
    Connect { generation: Generation },
    Disconnect,
    Subscribe { filter: String, qos: Qos },
    Publish { topic: String, payload: String, qos: Qos },
}

// =============================================================================
// GatewayHandle
// =============================================================================

/// Cloneable control surface of a running gateway.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    sink: EventSink,
    notices: broadcast::Sender<Notice>,
}

impl GatewayHandle {
    /// Starts every inactive session.
    pub async fn start(&self) -> bool {
        self.sink.send(Control::Start).await
    }

    /// Stops every session.
    pub async fn stop(&self) -> bool {
        self.sink.send(Control::Stop).await
    }

    /// Subscribes to observer notices.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// The gateway event queue.
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// The running gateway.
pub struct Gateway {
    router: EventRouter,
    sink: EventSink,
    events: mpsc::Receiver<GatewayEvent>,
    notices: broadcast::Sender<Notice>,
    auth: Arc<dyn AuthClient>,
    automation_tx: mpsc::UnboundedSender<AutomationOp>,
    broker_tx: mpsc::UnboundedSender<BrokerOp>,
    workers: Vec<JoinHandle<()>>,
    reader: Option<Box<dyn CardReader>>,
    poller: Option<DevicePoller>,
    poll_interval: Duration,
}

impl Gateway {
    /// Creates a gateway with every session stopped.
    ///
    /// Spawns the executor tasks, so this must be called inside a tokio runtime.
    pub fn new(config: RouterConfig, drivers: GatewayDrivers, options: GatewayOptions) -> Self {
        let (sink, events) = EventSink::channel(options.event_capacity);
        let (notices, _) = broadcast::channel(options.notice_capacity);

        let (automation_tx, automation_rx) = mpsc::unbounded_channel();
        let (broker_tx, broker_rx) = mpsc::unbounded_channel();
        let workers = vec![
            tokio::spawn(automation_worker(drivers.automation, automation_rx, sink.clone())),
            tokio::spawn(broker_worker(drivers.broker, broker_rx, sink.clone())),
        ];

        Self {
            router: EventRouter::new(config),
            sink,
            events,
            notices,
            auth: drivers.auth,
            automation_tx,
            broker_tx,
            workers,
            reader: Some(drivers.reader),
            poller: None,
            poll_interval: options.poll_interval,
        }
    }

    /// Returns a control handle.
    pub fn handle(&self) -> GatewayHandle {
        GatewayHandle {
            sink: self.sink.clone(),
            notices: self.notices.clone(),
        }
    }

    /// Subscribes to readiness flag edges.
    pub fn subscribe_edges(&self) -> broadcast::Receiver<FlagEdge> {
        self.router.readiness().subscribe()
    }

    /// The router, for inspection.
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Processes events until `shutdown` resolves, then stops every session
    /// and waits for the executors to finish.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Gateway running");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping sessions");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => break,
                },
            }
        }

        self.dispatch(Control::Stop.into()).await;
        let Self {
            mut events,
            automation_tx,
            broker_tx,
            workers,
            ..
        } = self;
        // Late driver events must not block the executors from finishing.
        events.close();
        drop(automation_tx);
        drop(broker_tx);
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Executor task failed");
            }
        }
        info!("Gateway stopped");
    }

    /// Routes one event and executes the resulting commands, including any
    /// events the execution itself produces.
    pub async fn dispatch(&mut self, event: GatewayEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            for command in self.router.handle(event) {
                self.execute(command, &mut queue).await;
            }
        }
    }

    async fn execute(&mut self, command: Command, queue: &mut VecDeque<GatewayEvent>) {
        match command {
            Command::ConnectAutomation { generation, probe } => {
                self.automation(AutomationOp::Connect { generation, probe })
            }
            Command::DisconnectAutomation { .. } => self.automation(AutomationOp::Disconnect),
            Command::SetMonitoring {
                generation,
                addresses,
                enabled,
            } => self.automation(AutomationOp::Monitor {
                generation,
                addresses,
                enabled,
            }),
            Command::WriteTags { generation, writes } => {
                self.automation(AutomationOp::Write { generation, writes })
            }
            Command::ConnectBroker { generation } => self.broker(BrokerOp::Connect { generation }),
            Command::DisconnectBroker { .. } => self.broker(BrokerOp::Disconnect),
            Command::Subscribe { filter, qos, .. } => self.broker(BrokerOp::Subscribe { filter, qos }),
            Command::Publish { topic, payload, qos } => {
                self.broker(BrokerOp::Publish { topic, payload, qos })
            }
            Command::RequestAuth {
                request_id,
                request,
            } => {
                let auth = Arc::clone(&self.auth);
                let sink = self.sink.clone();
                tokio::spawn(async move {
                    let response = auth.authorize(&request).await;
                    sink.send(GatewayEvent::AuthCompleted {
                        request_id,
                        response,
                    })
                    .await;
                });
            }
            Command::StartDevice { generation } => self.start_device(generation, queue).await,
            Command::StopDevice { generation } => self.stop_device(generation).await,
            Command::Notify(notice) => {
                debug!(?notice, "Notice");
                // No receivers is fine.
                let _ = self.notices.send(notice);
            }
        }
    }

    fn automation(&self, op: AutomationOp) {
        if self.automation_tx.send(op).is_err() {
            warn!("Automation executor gone, operation dropped");
        }
    }

    fn broker(&self, op: BrokerOp) {
        if self.broker_tx.send(op).is_err() {
            warn!("Broker executor gone, operation dropped");
        }
    }

    async fn start_device(&mut self, generation: Generation, queue: &mut VecDeque<GatewayEvent>) {
        if let Some(poller) = self.poller.take() {
            if poller.is_finished() {
                self.reader = poller.stop();
            } else {
                warn!(previous = %poller.generation(), "Card poller still running");
                self.reader = reap(poller).await;
            }
        }

        let Some(reader) = self.reader.take() else {
            queue.push_back(
                DeviceEvent::OpenFailed {
                    generation,
                    error: DeviceError::Io("card reader unavailable".to_string()),
                }
                .into(),
            );
            return;
        };
        match DevicePoller::start(reader, self.poll_interval, generation, self.sink.clone()) {
            Ok(poller) => self.poller = Some(poller),
            Err(error) => queue.push_back(DeviceEvent::OpenFailed { generation, error }.into()),
        }
    }

    async fn stop_device(&mut self, generation: Generation) {
        let Some(poller) = self.poller.take() else {
            return;
        };
        if poller.generation() != generation {
            debug!(%generation, running = %poller.generation(), "Stopping poller of another generation");
        }
        self.reader = reap(poller).await;
    }
}

/// Stops a poller off the async workers and reclaims its reader.
async fn reap(poller: DevicePoller) -> Option<Box<dyn CardReader>> {
    match tokio::task::spawn_blocking(move || poller.stop()).await {
        Ok(reader) => reader,
        Err(e) => {
            warn!(error = %e, "Card poller join failed");
            None
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("router", &self.router)
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Executors
// =============================================================================

async fn automation_worker(
    driver: Arc<dyn AutomationDriver>,
    mut ops: mpsc::UnboundedReceiver<AutomationOp>,
    sink: EventSink,
) {
    while let Some(op) = ops.recv().await {
        match op {
            AutomationOp::Connect { generation, probe } => {
                info!(endpoint = driver.endpoint(), %generation, "Connecting to automation server");
                let connected = match driver.connect(generation, sink.clone()).await {
                    Ok(()) => driver.probe(&probe).await,
                    Err(e) => Err(e),
                };
                let event = match connected {
                    Ok(available) => AutomationEvent::Connected {
                        generation,
                        available,
                    },
                    Err(error) => {
                        driver.disconnect().await;
                        AutomationEvent::ConnectFailed { generation, error }
                    }
                };
                sink.send(event).await;
            }
            AutomationOp::Disconnect => driver.disconnect().await,
            AutomationOp::Monitor {
                generation,
                addresses,
                enabled,
            } => {
                if let Err(error) = driver.set_monitoring(&addresses, enabled).await {
                    sink.send(AutomationEvent::MonitoringFailed { generation, error })
                        .await;
                }
            }
            AutomationOp::Write { generation, writes } => {
                let values: Vec<_> = writes
                    .iter()
                    .map(|w| (w.address.clone(), w.value.clone()))
                    .collect();
                let mut results = driver.write(&values).await.into_iter();
                for write in writes {
                    let result = results.next().unwrap_or_else(|| {
                        Err(WriteRejected::transport(write.address.clone(), "no result returned"))
                    });
                    sink.send(AutomationEvent::WriteCompleted {
                        generation,
                        id: write.id,
                        result,
                    })
                    .await;
                }
            }
        }
    }
    debug!("Automation executor finished");
}

async fn broker_worker(
    driver: Arc<dyn BrokerDriver>,
    mut ops: mpsc::UnboundedReceiver<BrokerOp>,
    sink: EventSink,
) {
    while let Some(op) = ops.recv().await {
        match op {
            BrokerOp::Connect { generation } => {
                info!(endpoint = driver.endpoint(), %generation, "Connecting to broker");
                if let Err(error) = driver.connect(generation, sink.clone()).await {
                    sink.send(BrokerEvent::ConnectFailed { generation, error }).await;
                }
            }
            BrokerOp::Disconnect => driver.disconnect().await,
            BrokerOp::Subscribe { filter, qos } => {
                match driver.subscribe(&filter, qos).await {
                    Ok(()) => info!(%filter, "Subscribed to commands"),
                    Err(e) => warn!(%filter, error = %e, "Subscribe failed"),
                }
            }
            BrokerOp::Publish { topic, payload, qos } => {
                if let Err(e) = driver.publish(&topic, payload.into_bytes(), qos).await {
                    debug!(%topic, error = %e, "Publish failed, telemetry dropped");
                }
            }
        }
    }
    debug!("Broker executor finished");
}
