// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Transport backed by the `opcua` crate.
//!
//! The `opcua` 0.12 client API is blocking, so every call runs on the tokio
//! blocking pool. The session's own message loop runs on the thread started
//! by `Session::run_async`; data change and connection status callbacks feed
//! the transport event channel from there.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use opcua::client::prelude::*;
use opcua::sync::RwLock as OpcUaRwLock;

use crate::error::{ConnectionError, OpcUaError, OpcUaResult, OperationError, SubscriptionError};
use crate::transport::{
    MonitoredItemResult, OpcUaTransport, OpcUaValue, ReadResult, TransportEvent, TransportState, WriteResult,
};
use crate::types::{NodeId, NodeIdentifier, OpcUaConfig, SecurityMode, SecurityPolicy as PolicySetting, UserToken};

type SharedSession = Arc<OpcUaRwLock<Session>>;

struct ActiveSession {
    session: SharedSession,
    stop: Option<oneshot::Sender<SessionCommand>>,
}

// =============================================================================
// RealTransport
// =============================================================================

/// OPC UA transport over the `opcua` client stack.
pub struct RealTransport {
    config: OpcUaConfig,
    state: Arc<RwLock<TransportState>>,
    active: RwLock<Option<ActiveSession>>,
    data_changes: RwLock<Option<mpsc::UnboundedSender<TransportEvent>>>,
}

impl RealTransport {
    /// Creates a transport for `config`.
    pub fn new(config: OpcUaConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(TransportState::Disconnected)),
            active: RwLock::new(None),
            data_changes: RwLock::new(None),
        }
    }

    fn session(&self) -> OpcUaResult<SharedSession> {
        self.active
            .read()
            .as_ref()
            .map(|a| Arc::clone(&a.session))
            .ok_or_else(OpcUaError::not_connected)
    }

    fn security_policy(&self) -> SecurityPolicy {
        match self.config.security_policy {
            PolicySetting::None => SecurityPolicy::None,
            PolicySetting::Basic256Sha256 => SecurityPolicy::Basic256Sha256,
            PolicySetting::Aes128Sha256RsaOaep => SecurityPolicy::Aes128Sha256RsaOaep,
            PolicySetting::Aes256Sha256RsaPss => SecurityPolicy::Aes256Sha256RsaPss,
        }
    }

    fn message_security_mode(&self) -> MessageSecurityMode {
        match self.config.security_mode {
            SecurityMode::None => MessageSecurityMode::None,
            SecurityMode::Sign => MessageSecurityMode::Sign,
            SecurityMode::SignAndEncrypt => MessageSecurityMode::SignAndEncrypt,
        }
    }

    fn identity_token(&self) -> IdentityToken {
        match &self.config.user_token {
            UserToken::Anonymous => IdentityToken::Anonymous,
            UserToken::UserName { username, password } => IdentityToken::UserName(username.clone(), password.clone()),
        }
    }

    /// Blocking session establishment.
    fn open(config: &OpcUaConfig, policy: SecurityPolicy, mode: MessageSecurityMode, identity: IdentityToken) -> OpcUaResult<SharedSession> {
        let mut client = ClientBuilder::new()
            .application_name(config.application_name.as_str())
            .application_uri(config.application_uri.as_str())
            .session_retry_limit(config.max_retries as i32)
            .session_timeout(config.session_timeout.as_millis() as u32)
            .pki_dir(config.pki_dir.as_str())
            .trust_server_certs(config.trust_server_certs)
            .client()
            .ok_or_else(|| {
                OpcUaError::connection(ConnectionError::ClientBuild {
                    reason: "invalid client configuration".to_string(),
                })
            })?;

        let endpoints = client
            .get_server_endpoints_from_url(config.endpoint.as_str())
            .map_err(|e| ConnectionError::endpoint_not_found(&config.endpoint, e.to_string()))?;

        let endpoint = endpoints
            .iter()
            .find(|e| e.security_policy_uri.as_ref() == policy.to_uri() && e.security_mode == mode)
            .cloned()
            .ok_or_else(|| ConnectionError::NoSuitableEndpoint {
                security: format!("{policy:?}/{mode:?}"),
            })?;
        debug!(security_policy = %endpoint.security_policy_uri, "Found matching endpoint");

        client
            .connect_to_endpoint(endpoint, identity)
            .map_err(|_| ConnectionError::refused(&config.endpoint).into())
    }
}

// =============================================================================
// Conversions
// =============================================================================

fn to_opcua_node_id(node_id: &NodeId) -> opcua::types::NodeId {
    let ns = node_id.namespace_index;
    match &node_id.identifier {
        NodeIdentifier::Numeric(v) => opcua::types::NodeId::new(ns, *v),
        NodeIdentifier::String(v) => opcua::types::NodeId::new(ns, v.clone()),
        NodeIdentifier::Guid(v) => opcua::types::NodeId::new(ns, opcua::types::Guid::from(*v)),
        NodeIdentifier::Opaque(v) => opcua::types::NodeId::new(ns, opcua::types::ByteString::from(v.as_slice())),
    }
}

fn from_opcua_node_id(node_id: &opcua::types::NodeId) -> NodeId {
    let ns = node_id.namespace;
    let identifier = match &node_id.identifier {
        opcua::types::Identifier::Numeric(v) => NodeIdentifier::Numeric(*v),
        opcua::types::Identifier::String(v) => NodeIdentifier::String(v.as_ref().to_string()),
        opcua::types::Identifier::Guid(v) => NodeIdentifier::Guid(uuid::Uuid::from_bytes(*v.as_bytes())),
        opcua::types::Identifier::ByteString(v) => NodeIdentifier::Opaque(v.value.clone().unwrap_or_default()),
    };
    NodeId {
        namespace_index: ns,
        identifier,
    }
}

fn from_variant(variant: &Variant) -> OpcUaValue {
    match variant {
        Variant::Boolean(v) => OpcUaValue::Boolean(*v),
        Variant::SByte(v) => OpcUaValue::Int16(i16::from(*v)),
        Variant::Byte(v) => OpcUaValue::UInt16(u16::from(*v)),
        Variant::Int16(v) => OpcUaValue::Int16(*v),
        Variant::UInt16(v) => OpcUaValue::UInt16(*v),
        Variant::Int32(v) => OpcUaValue::Int32(*v),
        Variant::UInt32(v) => OpcUaValue::UInt32(*v),
        Variant::Int64(v) => OpcUaValue::Int64(*v),
        Variant::Float(v) => OpcUaValue::Double(f64::from(*v)),
        Variant::Double(v) => OpcUaValue::Double(*v),
        Variant::String(v) => OpcUaValue::String(v.as_ref().to_string()),
        _ => OpcUaValue::Null,
    }
}

fn to_variant(value: &OpcUaValue) -> Variant {
    match value {
        OpcUaValue::Boolean(v) => Variant::Boolean(*v),
        OpcUaValue::Int16(v) => Variant::Int16(*v),
        OpcUaValue::UInt16(v) => Variant::UInt16(*v),
        OpcUaValue::Int32(v) => Variant::Int32(*v),
        OpcUaValue::UInt32(v) => Variant::UInt32(*v),
        OpcUaValue::Int64(v) => Variant::Int64(*v),
        OpcUaValue::Double(v) => Variant::Double(*v),
        OpcUaValue::String(v) => Variant::String(UAString::from(v.as_str())),
        OpcUaValue::Null => Variant::Empty,
    }
}

fn value_id(node_id: &NodeId) -> ReadValueId {
    ReadValueId {
        node_id: to_opcua_node_id(node_id),
        attribute_id: AttributeId::Value as u32,
        index_range: UAString::null(),
        data_encoding: QualifiedName::null(),
    }
}

async fn blocking<T, F>(f: F) -> OpcUaResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> OpcUaResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        OpcUaError::connection(ConnectionError::Closed {
            reason: Some(format!("client task failed: {e}")),
        })
    })?
}

// =============================================================================
// OpcUaTransport
// =============================================================================

#[async_trait]
impl OpcUaTransport for RealTransport {
    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn state(&self) -> TransportState {
        *self.state.read()
    }

    async fn connect(&self, events: mpsc::UnboundedSender<TransportEvent>) -> OpcUaResult<()> {
        *self.state.write() = TransportState::Connecting;
        info!(endpoint = %self.config.endpoint, "Connecting to OPC UA server");

        let config = self.config.clone();
        let (policy, mode, identity) = (self.security_policy(), self.message_security_mode(), self.identity_token());
        let session = match blocking(move || Self::open(&config, policy, mode, identity)).await {
            Ok(session) => session,
            Err(e) => {
                *self.state.write() = TransportState::Failed;
                return Err(e);
            }
        };

        let state = Arc::clone(&self.state);
        let lost = events.clone();
        {
            let mut s = session.write();
            s.set_connection_status_callback(ConnectionStatusCallback::new(move |connected| {
                if !connected {
                    *state.write() = TransportState::Failed;
                    let _ = lost.send(TransportEvent::ConnectionLost);
                }
            }));
        }
        // Data changes are delivered through the subscription callback.
        *self.active.write() = Some(ActiveSession {
            session: Arc::clone(&session),
            stop: Some(Session::run_async(session)),
        });
        *self.data_changes.write() = Some(events);
        *self.state.write() = TransportState::Connected;
        info!(endpoint = %self.config.endpoint, "Connected to OPC UA server");
        Ok(())
    }

    async fn disconnect(&self) {
        let active = self.active.write().take();
        self.data_changes.write().take();
        if let Some(mut active) = active {
            if let Some(stop) = active.stop.take() {
                let _ = stop.send(SessionCommand::Stop);
            }
            let session = active.session;
            let _ = blocking(move || {
                session.read().disconnect();
                Ok(())
            })
            .await;
            info!(endpoint = %self.config.endpoint, "Disconnected from OPC UA server");
        }
        *self.state.write() = TransportState::Disconnected;
    }

    async fn read_values(&self, nodes: &[NodeId]) -> OpcUaResult<Vec<ReadResult>> {
        if nodes.is_empty() {
            return Ok(Vec::new());
        }
        let session = self.session()?;
        let ids: Vec<ReadValueId> = nodes.iter().map(value_id).collect();
        trace!(count = nodes.len(), "Reading node values");

        let values = blocking(move || {
            session
                .read()
                .read(&ids, TimestampsToReturn::Both, 0.0)
                .map_err(|e| OperationError::read_failed("batch", e.to_string()).into())
        })
        .await?;

        Ok(nodes
            .iter()
            .zip(values)
            .map(|(node_id, data_value)| {
                let status_code = data_value.status.map(|s| s.bits()).unwrap_or(0);
                match data_value.value {
                    Some(ref variant) if status_code & 0x8000_0000 == 0 => ReadResult {
                        node_id: node_id.clone(),
                        value: from_variant(variant),
                        status_code,
                    },
                    _ => ReadResult::failure(node_id.clone(), status_code),
                }
            })
            .collect())
    }

    async fn write_values(&self, writes: &[(NodeId, OpcUaValue)]) -> OpcUaResult<Vec<WriteResult>> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }
        let session = self.session()?;
        let request: Vec<WriteValue> = writes
            .iter()
            .map(|(node_id, value)| WriteValue {
                node_id: to_opcua_node_id(node_id),
                attribute_id: AttributeId::Value as u32,
                index_range: UAString::null(),
                value: DataValue::new_now(to_variant(value)),
            })
            .collect();
        trace!(count = writes.len(), "Writing node values");

        let codes = blocking(move || {
            session
                .read()
                .write(&request)
                .map_err(|e| OperationError::write_failed("batch", e.to_string()).into())
        })
        .await?;

        Ok(writes
            .iter()
            .zip(codes)
            .map(|((node_id, _), code)| WriteResult {
                node_id: node_id.clone(),
                status_code: code.bits(),
            })
            .collect())
    }

    async fn create_subscription(&self, publishing_interval: Duration) -> OpcUaResult<u32> {
        let session = self.session()?;
        let events = self
            .data_changes
            .read()
            .clone()
            .ok_or_else(OpcUaError::not_connected)?;
        let (lifetime, keepalive) = (self.config.lifetime_count, self.config.keepalive_count);

        let id = blocking(move || {
            let callback = DataChangeCallback::new(move |items| {
                for item in items {
                    let Some(variant) = item.last_value().value.as_ref() else {
                        continue;
                    };
                    let _ = events.send(TransportEvent::DataChange {
                        node_id: from_opcua_node_id(&item.item_to_monitor().node_id),
                        value: from_variant(variant),
                    });
                }
            });
            session
                .read()
                .create_subscription(
                    publishing_interval.as_millis() as f64,
                    lifetime,
                    keepalive,
                    0,
                    0,
                    true,
                    callback,
                )
                .map_err(|e| SubscriptionError::creation_failed(e.to_string()).into())
        })
        .await?;
        debug!(subscription_id = id, "Created subscription");
        Ok(id)
    }

    async fn create_monitored_items(
        &self,
        subscription_id: u32,
        nodes: &[NodeId],
        sampling_interval: Duration,
    ) -> OpcUaResult<Vec<MonitoredItemResult>> {
        let session = self.session()?;
        let requests: Vec<MonitoredItemCreateRequest> = nodes
            .iter()
            .map(|node_id| MonitoredItemCreateRequest {
                item_to_monitor: value_id(node_id),
                monitoring_mode: MonitoringMode::Reporting,
                requested_parameters: MonitoringParameters {
                    sampling_interval: sampling_interval.as_millis() as f64,
                    filter: ExtensionObject::null(),
                    queue_size: 10,
                    discard_oldest: true,
                    client_handle: 0,
                },
            })
            .collect();

        let results = blocking(move || {
            session
                .read()
                .create_monitored_items(subscription_id, TimestampsToReturn::Both, &requests)
                .map_err(|e| SubscriptionError::monitored_item_failed("batch", e.to_string()).into())
        })
        .await?;

        Ok(nodes
            .iter()
            .zip(results)
            .map(|(node_id, result)| {
                if !result.status_code.is_good() {
                    warn!(node = %node_id, status = %result.status_code, "Monitored item rejected");
                }
                MonitoredItemResult {
                    node_id: node_id.clone(),
                    item_id: result.monitored_item_id,
                    status_code: result.status_code.bits(),
                }
            })
            .collect())
    }

    async fn delete_monitored_items(&self, subscription_id: u32, item_ids: &[u32]) -> OpcUaResult<()> {
        let session = self.session()?;
        let ids = item_ids.to_vec();
        blocking(move || {
            session
                .read()
                .delete_monitored_items(subscription_id, &ids)
                .map(|_| ())
                .map_err(|e| SubscriptionError::monitored_item_failed("batch", e.to_string()).into())
        })
        .await
    }
}
