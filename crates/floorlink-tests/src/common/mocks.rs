// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Endpoints
//!
//! In-memory implementations of the four gateway ports.
//!
//! Every mock records what the gateway asked of it and lets a test inject
//! the endpoint's side of the conversation: tag changes, broker messages,
//! card scans and authorization replies.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use floorlink_core::driver::{AuthClient, AutomationDriver, BrokerDriver, CardReader, EventSink};
use floorlink_core::error::{
    AuthServiceError, ConnectionError, DeviceError, SessionError, WriteRejected,
};
use floorlink_core::event::{AutomationEvent, BrokerEvent};
use floorlink_core::{AuthReply, AuthRequest, CardScan, Generation, NodeAddress, Qos, SessionKind, TagKey, TagValue};

/// A live session: the generation it was opened under and its event sink.
type Session = Option<(Generation, EventSink)>;

// =============================================================================
// MockAutomation
// =============================================================================

/// An automation server holding every catalog tag under one prefix.
#[derive(Debug)]
pub struct MockAutomation {
    endpoint: String,
    prefix: String,
    session: Mutex<Session>,
    missing: Mutex<HashSet<NodeAddress>>,
    rejections: Mutex<HashMap<NodeAddress, u32>>,
    writes: Mutex<Vec<(NodeAddress, TagValue)>>,
    monitoring: Mutex<Vec<(Vec<NodeAddress>, bool)>>,
    generations: Mutex<Vec<Generation>>,
    fail_connect: AtomicBool,
    connect_count: AtomicU64,
    disconnect_count: AtomicU64,
}

impl MockAutomation {
    /// Creates a server exposing the whole catalog under `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            endpoint: "opc.tcp://mock-plc:4840".to_string(),
            prefix: prefix.into(),
            session: Mutex::new(None),
            missing: Mutex::new(HashSet::new()),
            rejections: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            monitoring: Mutex::new(Vec::new()),
            generations: Mutex::new(Vec::new()),
            fail_connect: AtomicBool::new(false),
            connect_count: AtomicU64::new(0),
            disconnect_count: AtomicU64::new(0),
        }
    }

    /// The address of a catalog tag on this server.
    pub fn address(&self, key: TagKey) -> NodeAddress {
        key.spec().address(&self.prefix)
    }

    /// Removes a tag from the address space so it fails to bind.
    pub fn remove_tag(&self, key: TagKey) {
        let address = self.address(key);
        self.missing.lock().insert(address);
    }

    /// Answers writes to `key` with a bad status.
    pub fn reject_writes(&self, key: TagKey, status: u32) {
        let address = self.address(key);
        self.rejections.lock().insert(address, status);
    }

    /// Makes connects fail.
    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Reports a value change of `key` on the open session.
    ///
    /// Returns `false` if no session is open or the gateway is gone.
    pub async fn push_tag(&self, key: TagKey, value: TagValue) -> bool {
        let Some((generation, sink)) = self.session.lock().clone() else {
            return false;
        };
        sink.send(AutomationEvent::TagUpdated {
            generation,
            address: self.address(key),
            value,
        })
        .await
    }

    /// Simulates the server going away.
    pub async fn drop_connection(&self) -> bool {
        let Some((generation, sink)) = self.session.lock().take() else {
            return false;
        };
        sink.send(AutomationEvent::Disconnected { generation }).await
    }

    /// Generation of the open session.
    pub fn current_generation(&self) -> Option<Generation> {
        self.session.lock().as_ref().map(|(g, _)| *g)
    }

    /// Every generation a connect was attempted under.
    pub fn generations(&self) -> Vec<Generation> {
        self.generations.lock().clone()
    }

    /// Every accepted write, in order.
    pub fn writes(&self) -> Vec<(NodeAddress, TagValue)> {
        self.writes.lock().clone()
    }

    /// Values written to one tag, in order.
    pub fn writes_to(&self, key: TagKey) -> Vec<TagValue> {
        let address = self.address(key);
        self.writes
            .lock()
            .iter()
            .filter(|(a, _)| *a == address)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Returns `true` if the last monitoring change covering `key` enabled it.
    pub fn is_monitored(&self, key: TagKey) -> bool {
        let address = self.address(key);
        self.monitoring
            .lock()
            .iter()
            .rev()
            .find(|(addresses, _)| addresses.contains(&address))
            .map_or(false, |(_, enabled)| *enabled)
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> u64 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Number of disconnects.
    pub fn disconnect_count(&self) -> u64 {
        self.disconnect_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AutomationDriver for MockAutomation {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connect(&self, generation: Generation, sink: EventSink) -> Result<(), ConnectionError> {
        self.generations.lock().push(generation);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ConnectionError::new(
                SessionKind::Automation,
                &self.endpoint,
                "connection refused",
            ));
        }
        *self.session.lock() = Some((generation, sink));
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn probe(&self, addresses: &[NodeAddress]) -> Result<HashSet<NodeAddress>, ConnectionError> {
        let missing = self.missing.lock();
        Ok(addresses
            .iter()
            .filter(|a| !missing.contains(*a))
            .cloned()
            .collect())
    }

    async fn disconnect(&self) {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.session.lock().take();
    }

    async fn set_monitoring(&self, addresses: &[NodeAddress], enabled: bool) -> Result<(), SessionError> {
        if self.session.lock().is_none() {
            return Err(SessionError::new(
                SessionKind::Automation,
                "set_monitoring",
                "not connected",
            ));
        }
        self.monitoring.lock().push((addresses.to_vec(), enabled));
        Ok(())
    }

    async fn write(&self, values: &[(NodeAddress, TagValue)]) -> Vec<Result<(), WriteRejected>> {
        let connected = self.session.lock().is_some();
        let rejections = self.rejections.lock();
        let mut writes = self.writes.lock();
        values
            .iter()
            .map(|(address, value)| {
                if !connected {
                    return Err(WriteRejected::transport(address.clone(), "not connected"));
                }
                if let Some(status) = rejections.get(address) {
                    return Err(WriteRejected::status(address.clone(), *status));
                }
                writes.push((address.clone(), value.clone()));
                Ok(())
            })
            .collect()
    }
}

// =============================================================================
// MockBroker
// =============================================================================

/// A broker that accepts every connection and records publishes.
#[derive(Debug)]
pub struct MockBroker {
    endpoint: String,
    session: Mutex<Session>,
    subscriptions: Mutex<Vec<(String, Qos)>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    fail_connect: AtomicBool,
    connect_count: AtomicU64,
    disconnect_count: AtomicU64,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBroker {
    /// Creates a broker.
    pub fn new() -> Self {
        Self {
            endpoint: "mock-broker:1883".to_string(),
            session: Mutex::new(None),
            subscriptions: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            fail_connect: AtomicBool::new(false),
            connect_count: AtomicU64::new(0),
            disconnect_count: AtomicU64::new(0),
        }
    }

    /// Makes connects fail.
    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Delivers an inbound message on the open session.
    pub async fn deliver(&self, topic: &str, payload: impl Into<Vec<u8>>) -> bool {
        let Some((generation, sink)) = self.session.lock().clone() else {
            return false;
        };
        sink.send(BrokerEvent::Message {
            generation,
            topic: topic.to_string(),
            payload: payload.into(),
        })
        .await
    }

    /// Simulates the broker closing the connection.
    pub async fn drop_connection(&self) -> bool {
        let Some((generation, sink)) = self.session.lock().take() else {
            return false;
        };
        sink.send(BrokerEvent::Disconnected { generation }).await
    }

    /// Subscribed topic filters.
    pub fn subscriptions(&self) -> Vec<(String, Qos)> {
        self.subscriptions.lock().clone()
    }

    /// Every published message as `(topic, payload)`.
    pub fn published(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .iter()
            .map(|(t, p)| (t.clone(), String::from_utf8_lossy(p).into_owned()))
            .collect()
    }

    /// Every published payload decoded as JSON.
    pub fn telemetry(&self) -> Vec<serde_json::Value> {
        self.published
            .lock()
            .iter()
            .filter_map(|(_, p)| serde_json::from_slice(p).ok())
            .collect()
    }

    /// Returns `true` if a published payload equals `expected`.
    pub fn has_published(&self, expected: &serde_json::Value) -> bool {
        self.telemetry().iter().any(|v| v == expected)
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> u64 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Number of disconnects.
    pub fn disconnect_count(&self) -> u64 {
        self.disconnect_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerDriver for MockBroker {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connect(&self, generation: Generation, sink: EventSink) -> Result<(), ConnectionError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ConnectionError::new(
                SessionKind::Broker,
                &self.endpoint,
                "connection refused",
            ));
        }
        *self.session.lock() = Some((generation, sink.clone()));
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        sink.send(BrokerEvent::Connected { generation }).await;
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: Qos) -> Result<(), SessionError> {
        self.subscriptions.lock().push((filter.to_string(), qos));
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, _qos: Qos) -> Result<(), SessionError> {
        if self.session.lock().is_none() {
            return Err(SessionError::new(SessionKind::Broker, "publish", "not connected"));
        }
        self.published.lock().push((topic.to_string(), payload));
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.session.lock().take();
    }
}

// =============================================================================
// MockAuth
// =============================================================================

/// An authorization service with a scripted answer.
#[derive(Debug)]
pub struct MockAuth {
    response: Mutex<Result<AuthReply, AuthServiceError>>,
    delay: Mutex<Duration>,
    requests: Mutex<Vec<AuthRequest>>,
}

impl MockAuth {
    /// Answers every request with `reply`.
    pub fn replying(reply: AuthReply) -> Self {
        Self::with_response(Ok(reply))
    }

    /// Fails every request with `error`.
    pub fn failing(error: AuthServiceError) -> Self {
        Self::with_response(Err(error))
    }

    fn with_response(response: Result<AuthReply, AuthServiceError>) -> Self {
        Self {
            response: Mutex::new(response),
            delay: Mutex::new(Duration::ZERO),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Changes the answer for later requests.
    pub fn set_response(&self, response: Result<AuthReply, AuthServiceError>) {
        *self.response.lock() = response;
    }

    /// Delays every answer.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<AuthRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AuthClient for MockAuth {
    async fn authorize(&self, request: &AuthRequest) -> Result<AuthReply, AuthServiceError> {
        self.requests.lock().push(request.clone());
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.response.lock().clone()
    }
}

// =============================================================================
// MockReader
// =============================================================================

#[derive(Debug, Default)]
struct ReaderState {
    scans: Mutex<VecDeque<Result<CardScan, DeviceError>>>,
    fail_open: AtomicBool,
    open: AtomicBool,
    open_count: AtomicU64,
    close_count: AtomicU64,
}

/// A card reader fed from a queue.
///
/// The reader itself moves into the gateway; the test keeps the paired
/// [`ReaderControl`].
#[derive(Debug)]
pub struct MockReader {
    port: String,
    state: Arc<ReaderState>,
}

impl MockReader {
    /// Creates a reader and its control.
    pub fn new(port: impl Into<String>) -> (Self, ReaderControl) {
        let state = Arc::new(ReaderState::default());
        let control = ReaderControl {
            state: Arc::clone(&state),
        };
        (
            Self {
                port: port.into(),
                state,
            },
            control,
        )
    }
}

impl CardReader for MockReader {
    fn port(&self) -> &str {
        &self.port
    }

    fn open(&mut self) -> Result<(), DeviceError> {
        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(DeviceError::unavailable(&self.port, "no such device"));
        }
        self.state.open.store(true, Ordering::SeqCst);
        self.state.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<CardScan>, DeviceError> {
        self.state.scans.lock().pop_front().transpose()
    }

    fn close(&mut self) {
        if self.state.open.swap(false, Ordering::SeqCst) {
            self.state.close_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Test side of a [`MockReader`].
#[derive(Debug, Clone)]
pub struct ReaderControl {
    state: Arc<ReaderState>,
}

impl ReaderControl {
    /// Queues a card for the next read cycle.
    pub fn present(&self, scan: CardScan) {
        self.state.scans.lock().push_back(Ok(scan));
    }

    /// Queues a failed read cycle.
    pub fn fail_next_read(&self, error: DeviceError) {
        self.state.scans.lock().push_back(Err(error));
    }

    /// Makes opens fail.
    pub fn fail_open(&self, fail: bool) {
        self.state.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Returns `true` while the port is open.
    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }

    /// Number of queued reads not yet consumed.
    pub fn pending(&self) -> usize {
        self.state.scans.lock().len()
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> u64 {
        self.state.open_count.load(Ordering::SeqCst)
    }

    /// Number of closes.
    pub fn close_count(&self) -> u64 {
        self.state.close_count.load(Ordering::SeqCst)
    }
}
