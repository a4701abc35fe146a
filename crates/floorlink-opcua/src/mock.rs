// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory transport for tests.
//!
//! [`MockTransport`] keeps an address space of nodes, records every write,
//! and lets a test push data changes for monitored nodes or drop the session.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::error::{ConnectionError, OpcUaError, OpcUaResult, SubscriptionError};
use crate::transport::{
    status, MonitoredItemResult, OpcUaTransport, OpcUaValue, ReadResult, TransportEvent, TransportState,
    WriteResult,
};
use crate::types::NodeId;

/// A scriptable [`OpcUaTransport`].
#[derive(Debug)]
pub struct MockTransport {
    endpoint: String,
    state: RwLock<TransportState>,
    nodes: RwLock<HashMap<NodeId, OpcUaValue>>,
    rejections: RwLock<HashMap<NodeId, u32>>,
    writes: Mutex<Vec<(NodeId, OpcUaValue)>>,
    monitored: RwLock<HashMap<u32, NodeId>>,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    next_item: AtomicU32,
    fail_connect: AtomicBool,
    fail_subscription: AtomicBool,
    connects: AtomicU32,
}

impl MockTransport {
    /// Creates an empty address space behind `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: RwLock::new(TransportState::Disconnected),
            nodes: RwLock::new(HashMap::new()),
            rejections: RwLock::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            monitored: RwLock::new(HashMap::new()),
            events: Mutex::new(None),
            next_item: AtomicU32::new(1),
            fail_connect: AtomicBool::new(false),
            fail_subscription: AtomicBool::new(false),
            connects: AtomicU32::new(0),
        }
    }

    /// Adds a node with an initial value.
    pub fn add_node(&self, node_id: NodeId, value: OpcUaValue) {
        self.nodes.write().insert(node_id, value);
    }

    /// Answers writes to `node_id` with `status_code`.
    pub fn reject_writes(&self, node_id: NodeId, status_code: u32) {
        self.rejections.write().insert(node_id, status_code);
    }

    /// Makes the next connects fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Makes subscription creation fail.
    pub fn set_fail_subscription(&self, fail: bool) {
        self.fail_subscription.store(fail, Ordering::SeqCst);
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Current value of a node.
    pub fn value(&self, node_id: &NodeId) -> Option<OpcUaValue> {
        self.nodes.read().get(node_id).cloned()
    }

    /// Every accepted write, in order.
    pub fn writes(&self) -> Vec<(NodeId, OpcUaValue)> {
        self.writes.lock().clone()
    }

    /// Returns `true` if a monitored item exists for `node_id`.
    pub fn is_monitored(&self, node_id: &NodeId) -> bool {
        self.monitored.read().values().any(|n| n == node_id)
    }

    /// Changes a node and notifies the session if the node is monitored.
    ///
    /// Returns `true` if a notification was sent.
    pub fn push_change(&self, node_id: &NodeId, value: OpcUaValue) -> bool {
        self.nodes.write().insert(node_id.clone(), value.clone());
        if !self.is_monitored(node_id) {
            return false;
        }
        self.events.lock().as_ref().map_or(false, |tx| {
            tx.send(TransportEvent::DataChange {
                node_id: node_id.clone(),
                value,
            })
            .is_ok()
        })
    }

    /// Simulates the server going away.
    pub fn drop_connection(&self) {
        *self.state.write() = TransportState::Failed;
        self.monitored.write().clear();
        if let Some(tx) = self.events.lock().take() {
            let _ = tx.send(TransportEvent::ConnectionLost);
        }
    }

    fn ensure_connected(&self) -> OpcUaResult<()> {
        if self.state.read().is_connected() {
            Ok(())
        } else {
            Err(OpcUaError::not_connected())
        }
    }
}

#[async_trait]
impl OpcUaTransport for MockTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn state(&self) -> TransportState {
        *self.state.read()
    }

    async fn connect(&self, events: mpsc::UnboundedSender<TransportEvent>) -> OpcUaResult<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            *self.state.write() = TransportState::Failed;
            return Err(ConnectionError::refused(&self.endpoint).into());
        }
        *self.events.lock() = Some(events);
        *self.state.write() = TransportState::Connected;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.events.lock().take();
        self.monitored.write().clear();
        *self.state.write() = TransportState::Disconnected;
    }

    async fn read_values(&self, nodes: &[NodeId]) -> OpcUaResult<Vec<ReadResult>> {
        self.ensure_connected()?;
        let table = self.nodes.read();
        Ok(nodes
            .iter()
            .map(|id| match table.get(id) {
                Some(value) => ReadResult::success(id.clone(), value.clone()),
                None => ReadResult::failure(id.clone(), status::BAD_NODE_ID_UNKNOWN),
            })
            .collect())
    }

    async fn write_values(&self, writes: &[(NodeId, OpcUaValue)]) -> OpcUaResult<Vec<WriteResult>> {
        self.ensure_connected()?;
        let rejections = self.rejections.read();
        let mut table = self.nodes.write();
        let mut history = self.writes.lock();
        Ok(writes
            .iter()
            .map(|(id, value)| {
                let status_code = if let Some(code) = rejections.get(id) {
                    *code
                } else if let Some(slot) = table.get_mut(id) {
                    *slot = value.clone();
                    history.push((id.clone(), value.clone()));
                    status::GOOD
                } else {
                    status::BAD_NODE_ID_UNKNOWN
                };
                WriteResult {
                    node_id: id.clone(),
                    status_code,
                }
            })
            .collect())
    }

    async fn create_subscription(&self, _publishing_interval: Duration) -> OpcUaResult<u32> {
        self.ensure_connected()?;
        if self.fail_subscription.load(Ordering::SeqCst) {
            return Err(SubscriptionError::creation_failed("too many subscriptions").into());
        }
        Ok(1)
    }

    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        nodes: &[NodeId],
        _sampling_interval: Duration,
    ) -> OpcUaResult<Vec<MonitoredItemResult>> {
        self.ensure_connected()?;
        if subscription_id != 1 {
            return Err(SubscriptionError::NotFound { id: subscription_id }.into());
        }
        let table = self.nodes.read();
        let mut monitored = self.monitored.write();
        Ok(nodes
            .iter()
            .map(|id| {
                if !table.contains_key(id) {
                    return MonitoredItemResult {
                        node_id: id.clone(),
                        item_id: 0,
                        status_code: status::BAD_NODE_ID_UNKNOWN,
                    };
                }
                let item_id = self.next_item.fetch_add(1, Ordering::SeqCst);
                monitored.insert(item_id, id.clone());
                MonitoredItemResult {
                    node_id: id.clone(),
                    item_id,
                    status_code: status::GOOD,
                }
            })
            .collect())
    }

    async fn delete_monitored_items(&self, subscription_id: u32, item_ids: &[u32]) -> OpcUaResult<()> {
        self.ensure_connected()?;
        if subscription_id != 1 {
            return Err(SubscriptionError::NotFound { id: subscription_id }.into());
        }
        let ids: HashSet<&u32> = item_ids.iter().collect();
        self.monitored.write().retain(|id, _| !ids.contains(id));
        Ok(())
    }
}
