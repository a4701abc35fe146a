// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Automation-server driver.
//!
//! [`OpcUaDriver`] implements the core
//! [`AutomationDriver`](floorlink_core::AutomationDriver) port over any
//! [`OpcUaTransport`].
//!
//! ```text
//! ┌──────────────────────┐   TagUpdated / Disconnected   ┌────────────┐
//! │     OpcUaDriver      │ ────────────────────────────▶ │ EventSink  │
//! │ (AutomationDriver)   │                               └────────────┘
//! └──────────┬───────────┘
//!            │ read / write / monitored items
//!            ▼
//! ┌──────────────────────┐
//! │ OpcUaTransport (T)   │
//! └──────────────────────┘
//! ```
//!
//! One session holds one subscription. Monitored items are added and removed
//! on it as the router enables and disables monitoring. Data changes are
//! reported under the address the item was monitored with, whatever spelling
//! of the node id that address uses.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use floorlink_core::driver::{AutomationDriver, EventSink};
use floorlink_core::error::{ConnectionError, SessionError, WriteRejected};
use floorlink_core::event::AutomationEvent;
use floorlink_core::types::{Generation, NodeAddress, SessionKind, TagValue};

use crate::conversion::{to_tag_value, to_variant};
use crate::error::OpcUaError;
use crate::transport::{status, OpcUaTransport, TransportEvent};
use crate::types::{NodeId, OpcUaConfig};

// =============================================================================
// Session
// =============================================================================

/// Monitored node ids and the addresses the router knows them by.
type AddressBook = Arc<Mutex<HashMap<NodeId, NodeAddress>>>;

struct Session {
    generation: Generation,
    subscription_id: u32,
    items: HashMap<NodeId, u32>,
    addresses: AddressBook,
    forwarder: JoinHandle<()>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

// =============================================================================
// OpcUaDriver
// =============================================================================

/// OPC UA automation driver.
///
/// # Example
///
/// ```rust,ignore
/// use floorlink_opcua::{MockTransport, OpcUaConfig, OpcUaDriver};
///
/// let config = OpcUaConfig::builder("opc.tcp://plc:4840").build()?;
/// let transport = Arc::new(MockTransport::new(&config.endpoint));
/// let driver = OpcUaDriver::new(config, transport);
/// ```
pub struct OpcUaDriver<T: OpcUaTransport> {
    config: OpcUaConfig,
    transport: Arc<T>,
    session: Mutex<Option<Session>>,
}

impl<T: OpcUaTransport + 'static> OpcUaDriver<T> {
    /// Creates a driver over `transport`.
    pub fn new(config: OpcUaConfig, transport: Arc<T>) -> Self {
        Self {
            config,
            transport,
            session: Mutex::new(None),
        }
    }

    /// Returns the client settings.
    pub fn config(&self) -> &OpcUaConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Returns the generation of the open session.
    pub fn session_generation(&self) -> Option<Generation> {
        self.session.lock().as_ref().map(|s| s.generation)
    }

    /// Number of monitored items on the open session.
    pub fn monitored_count(&self) -> usize {
        self.session.lock().as_ref().map_or(0, |s| s.items.len())
    }

    fn subscription_id(&self, operation: &'static str) -> Result<u32, SessionError> {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.subscription_id)
            .ok_or_else(|| OpcUaError::not_connected().into_session_error(operation))
    }

    async fn enable(&self, nodes: Vec<NodeId>) -> Result<(), SessionError> {
        let subscription_id = self.subscription_id("create_monitored_items")?;
        let pending: Vec<NodeId> = {
            let guard = self.session.lock();
            let items = guard.as_ref().map(|s| &s.items);
            nodes
                .into_iter()
                .filter(|n| !items.map_or(false, |i| i.contains_key(n)))
                .collect()
        };
        if pending.is_empty() {
            return Ok(());
        }

        let results = self
            .transport
            .create_monitored_items(subscription_id, &pending, self.config.sampling_interval)
            .await
            .map_err(|e| e.into_session_error("create_monitored_items"))?;

        let mut failed = Vec::new();
        let mut guard = self.session.lock();
        for result in results {
            if status::is_good(result.status_code) {
                match guard.as_mut() {
                    Some(session) => {
                        session.items.insert(result.node_id, result.item_id);
                    }
                    None => return Err(OpcUaError::not_connected().into_session_error("create_monitored_items")),
                }
            } else {
                failed.push(format!("{} (0x{:08X})", result.node_id, result.status_code));
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(SessionError::new(
                SessionKind::Automation,
                "create_monitored_items",
                format!("rejected: {}", failed.join(", ")),
            ))
        }
    }

    async fn disable(&self, nodes: Vec<NodeId>) -> Result<(), SessionError> {
        let subscription_id = self.subscription_id("delete_monitored_items")?;
        let item_ids: Vec<u32> = {
            let mut guard = self.session.lock();
            match guard.as_mut() {
                Some(session) => nodes.iter().filter_map(|n| session.items.remove(n)).collect(),
                None => Vec::new(),
            }
        };
        if item_ids.is_empty() {
            return Ok(());
        }
        self.transport
            .delete_monitored_items(subscription_id, &item_ids)
            .await
            .map_err(|e| e.into_session_error("delete_monitored_items"))
    }
}

#[cfg(feature = "real-transport")]
impl OpcUaDriver<crate::real_transport::RealTransport> {
    /// Creates a driver backed by the `opcua` client stack.
    pub fn connect_real(config: OpcUaConfig) -> Self {
        let transport = Arc::new(crate::real_transport::RealTransport::new(config.clone()));
        Self::new(config, transport)
    }
}

impl<T: OpcUaTransport> std::fmt::Debug for OpcUaDriver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpcUaDriver")
            .field("endpoint", &self.config.endpoint)
            .field("state", &self.transport.state())
            .finish()
    }
}

/// Parses addresses, dropping the ones that are not node ids.
fn parse_all(addresses: &[NodeAddress]) -> Vec<(NodeAddress, NodeId)> {
    addresses
        .iter()
        .filter_map(|address| match NodeId::from_address(address) {
            Ok(id) => Some((address.clone(), id)),
            Err(e) => {
                warn!(tag = %address, error = %e, "Address is not a node id");
                None
            }
        })
        .collect()
}

async fn forward_events(
    mut rx: mpsc::UnboundedReceiver<TransportEvent>,
    generation: Generation,
    addresses: AddressBook,
    sink: EventSink,
) {
    while let Some(event) = rx.recv().await {
        let sent = match event {
            TransportEvent::DataChange { node_id, value } => match to_tag_value(&value) {
                Some(value) => {
                    trace!(node = %node_id, %value, "Data change");
                    let address = addresses
                        .lock()
                        .get(&node_id)
                        .cloned()
                        .unwrap_or_else(|| node_id.to_address());
                    sink.send(AutomationEvent::TagUpdated {
                        generation,
                        address,
                        value,
                    })
                    .await
                }
                None => {
                    debug!(node = %node_id, %value, "Unsupported value type, change dropped");
                    true
                }
            },
            TransportEvent::ConnectionLost => {
                warn!(%generation, "Automation session lost");
                sink.send(AutomationEvent::Disconnected { generation }).await;
                break;
            }
        };
        if !sent {
            break;
        }
    }
}

#[async_trait]
impl<T: OpcUaTransport + 'static> AutomationDriver for OpcUaDriver<T> {
    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn connect(&self, generation: Generation, sink: EventSink) -> Result<(), ConnectionError> {
        if let Some(previous) = self.session.lock().take() {
            debug!(generation = %previous.generation, "Replacing automation session");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.transport
            .connect(tx)
            .await
            .map_err(|e| e.into_connection_error(&self.config.endpoint))?;

        let subscription_id = match self.transport.create_subscription(self.config.publishing_interval).await {
            Ok(id) => id,
            Err(e) => {
                self.transport.disconnect().await;
                return Err(e.into_connection_error(&self.config.endpoint));
            }
        };

        let addresses = AddressBook::default();
        let forwarder = tokio::spawn(forward_events(rx, generation, Arc::clone(&addresses), sink));
        *self.session.lock() = Some(Session {
            generation,
            subscription_id,
            items: HashMap::new(),
            addresses,
            forwarder,
        });
        info!(endpoint = %self.config.endpoint, %generation, subscription_id, "Automation session open");
        Ok(())
    }

    async fn probe(&self, addresses: &[NodeAddress]) -> Result<HashSet<NodeAddress>, ConnectionError> {
        let parsed = parse_all(addresses);
        let ids: Vec<NodeId> = parsed.iter().map(|(_, id)| id.clone()).collect();
        let results = self
            .transport
            .read_values(&ids)
            .await
            .map_err(|e| e.into_connection_error(&self.config.endpoint))?;

        // Write-only nodes answer BadNotReadable and still exist.
        let available = parsed
            .into_iter()
            .zip(results)
            .filter_map(|((address, _), result)| {
                if status::is_missing_node(result.status_code) {
                    None
                } else {
                    Some(address)
                }
            })
            .collect::<HashSet<_>>();
        debug!(requested = addresses.len(), available = available.len(), "Probed address space");
        Ok(available)
    }

    async fn disconnect(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            info!(generation = %session.generation, "Closing automation session");
            drop(session);
            self.transport.disconnect().await;
        }
    }

    async fn set_monitoring(&self, addresses: &[NodeAddress], enabled: bool) -> Result<(), SessionError> {
        let parsed = parse_all(addresses);
        if enabled {
            if let Some(session) = self.session.lock().as_ref() {
                let mut book = session.addresses.lock();
                for (address, id) in &parsed {
                    book.insert(id.clone(), address.clone());
                }
            }
        }
        let nodes = parsed.into_iter().map(|(_, id)| id).collect();
        if enabled {
            self.enable(nodes).await
        } else {
            self.disable(nodes).await
        }
    }

    async fn write(&self, values: &[(NodeAddress, TagValue)]) -> Vec<Result<(), WriteRejected>> {
        let mut outcomes: Vec<Option<Result<(), WriteRejected>>> = vec![None; values.len()];
        let mut batch = Vec::with_capacity(values.len());
        let mut slots = Vec::with_capacity(values.len());
        for (index, (address, value)) in values.iter().enumerate() {
            match NodeId::from_address(address) {
                Ok(id) => {
                    batch.push((id, to_variant(value)));
                    slots.push(index);
                }
                Err(e) => outcomes[index] = Some(Err(WriteRejected::transport(address.clone(), e.to_string()))),
            }
        }

        if !batch.is_empty() {
            match self.transport.write_values(&batch).await {
                Ok(results) => {
                    let mut results = results.into_iter();
                    for index in &slots {
                        let address = values[*index].0.clone();
                        outcomes[*index] = Some(match results.next() {
                            Some(r) if r.is_good() => Ok(()),
                            Some(r) => Err(WriteRejected::status(address, r.status_code)),
                            None => Err(WriteRejected::transport(address, "no result returned")),
                        });
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    for index in &slots {
                        outcomes[*index] = Some(Err(WriteRejected::transport(values[*index].0.clone(), message.clone())));
                    }
                }
            }
        }

        outcomes
            .into_iter()
            .zip(values)
            .map(|(outcome, (address, _))| {
                outcome.unwrap_or_else(|| Err(WriteRejected::transport(address.clone(), "not sent")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::transport::OpcUaValue;
    use floorlink_core::event::GatewayEvent;
    use std::time::Duration;

    const ENDPOINT: &str = "opc.tcp://mock:4840";

    fn setup() -> (OpcUaDriver<MockTransport>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new(ENDPOINT));
        transport.add_node(NodeId::string(2, "M.power_status"), OpcUaValue::Int16(0));
        transport.add_node(NodeId::string(2, "M.job_approve"), OpcUaValue::Int16(0));
        let config = OpcUaConfig::builder(ENDPOINT).build().unwrap();
        (OpcUaDriver::new(config, Arc::clone(&transport)), transport)
    }

    fn addr(path: &str) -> NodeAddress {
        NodeAddress::new(format!("ns=2;s={path}"))
    }

    #[tokio::test]
    async fn test_probe_reports_existing_nodes() {
        let (driver, _) = setup();
        let (sink, _rx) = EventSink::channel(8);
        driver.connect(Generation::new(1), sink).await.unwrap();

        let available = driver
            .probe(&[addr("M.power_status"), addr("M.missing"), NodeAddress::new("garbage")])
            .await
            .unwrap();
        assert_eq!(available, HashSet::from([addr("M.power_status")]));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let (driver, transport) = setup();
        transport.set_fail_connect(true);
        let (sink, _rx) = EventSink::channel(8);
        let err = driver.connect(Generation::new(1), sink).await.unwrap_err();
        assert_eq!(err.session, SessionKind::Automation);
        assert_eq!(err.endpoint, ENDPOINT);
        assert!(driver.session_generation().is_none());
    }

    #[tokio::test]
    async fn test_subscription_failure_closes_session() {
        let (driver, transport) = setup();
        transport.set_fail_subscription(true);
        let (sink, _rx) = EventSink::channel(8);
        assert!(driver.connect(Generation::new(1), sink).await.is_err());
        assert!(!transport.state().is_connected());
    }

    #[tokio::test]
    async fn test_monitoring_forwards_changes_with_generation() {
        let (driver, transport) = setup();
        let (sink, mut rx) = EventSink::channel(8);
        let generation = Generation::new(4);
        driver.connect(generation, sink).await.unwrap();

        driver.set_monitoring(&[addr("M.power_status")], true).await.unwrap();
        // Enabling twice does not duplicate the item.
        driver.set_monitoring(&[addr("M.power_status")], true).await.unwrap();
        assert_eq!(driver.monitored_count(), 1);

        assert!(transport.push_change(&NodeId::string(2, "M.power_status"), OpcUaValue::Int16(1)));
        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(GatewayEvent::Automation(AutomationEvent::TagUpdated {
                generation: g,
                address,
                value,
            }))) => {
                assert_eq!(g, generation);
                assert_eq!(address, addr("M.power_status"));
                assert_eq!(value, TagValue::Int16(1));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        driver.set_monitoring(&[addr("M.power_status")], false).await.unwrap();
        assert_eq!(driver.monitored_count(), 0);
        assert!(!transport.push_change(&NodeId::string(2, "M.power_status"), OpcUaValue::Int16(0)));
    }

    #[tokio::test]
    async fn test_changes_keep_monitored_spelling() {
        let (driver, transport) = setup();
        transport.add_node(NodeId::string(0, "M.counter"), OpcUaValue::Int16(0));
        transport.add_node(NodeId::string(0, "M.total"), OpcUaValue::Int16(0));
        let (sink, mut rx) = EventSink::channel(8);
        driver.connect(Generation::new(1), sink).await.unwrap();

        let explicit = NodeAddress::new("ns=0;s=M.counter");
        let implicit = NodeAddress::new("s=M.total");
        driver
            .set_monitoring(&[explicit.clone(), implicit.clone()], true)
            .await
            .unwrap();

        for (node, expected) in [("M.counter", &explicit), ("M.total", &implicit)] {
            assert!(transport.push_change(&NodeId::string(0, node), OpcUaValue::Int16(3)));
            match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
                Ok(Some(GatewayEvent::Automation(AutomationEvent::TagUpdated { address, .. }))) => {
                    assert_eq!(&address, expected);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_monitoring_unknown_node_fails() {
        let (driver, _) = setup();
        let (sink, _rx) = EventSink::channel(8);
        driver.connect(Generation::new(1), sink).await.unwrap();
        let err = driver.set_monitoring(&[addr("M.missing")], true).await.unwrap_err();
        assert_eq!(err.operation, "create_monitored_items");
    }

    #[tokio::test]
    async fn test_monitoring_without_session() {
        let (driver, _) = setup();
        assert!(driver.set_monitoring(&[addr("M.power_status")], true).await.is_err());
    }

    #[tokio::test]
    async fn test_connection_lost_reported() {
        let (driver, transport) = setup();
        let (sink, mut rx) = EventSink::channel(8);
        driver.connect(Generation::new(2), sink).await.unwrap();
        transport.drop_connection();
        assert!(matches!(
            tokio::time::timeout(Duration::from_secs(1), rx.recv()).await,
            Ok(Some(GatewayEvent::Automation(AutomationEvent::Disconnected { generation })))
                if generation == Generation::new(2)
        ));
    }

    #[tokio::test]
    async fn test_write_results_in_order() {
        let (driver, transport) = setup();
        transport.reject_writes(NodeId::string(2, "M.power_status"), status::BAD_NOT_WRITABLE);
        let (sink, _rx) = EventSink::channel(8);
        driver.connect(Generation::new(1), sink).await.unwrap();

        let results = driver
            .write(&[
                (addr("M.job_approve"), TagValue::Int16(8)),
                (NodeAddress::new("bogus"), TagValue::Int16(1)),
                (addr("M.power_status"), TagValue::Int16(1)),
            ])
            .await;
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap_err().status, None);
        assert_eq!(results[2].as_ref().unwrap_err().status, Some(status::BAD_NOT_WRITABLE));
        assert_eq!(
            transport.value(&NodeId::string(2, "M.job_approve")),
            Some(OpcUaValue::Int16(8))
        );
    }

    #[tokio::test]
    async fn test_write_without_session_rejects_all() {
        let (driver, _) = setup();
        let results = driver.write(&[(addr("M.job_approve"), TagValue::Int16(7))]).await;
        assert!(results[0].as_ref().unwrap_err().status.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (driver, transport) = setup();
        let (sink, _rx) = EventSink::channel(8);
        driver.connect(Generation::new(1), sink).await.unwrap();
        driver.disconnect().await;
        driver.disconnect().await;
        assert!(!transport.state().is_connected());
        assert!(driver.session_generation().is_none());
    }
}
