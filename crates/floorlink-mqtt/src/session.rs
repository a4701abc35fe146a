// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Broker session on `rumqttc`.
//!
//! Each connect spawns one event-loop task that owns the `rumqttc` event
//! loop. The task reports:
//!
//! - `Connected` on the first accepted CONNACK,
//! - `ConnectFailed` if the loop errors or the broker refuses before that,
//! - `Disconnected` if the loop errors afterwards,
//!
//! and ends. The session is not re-established automatically; the operator
//! starts it again.
//!
//! Closing a session queues DISCONNECT and gives the task [`DRAIN_TIMEOUT`]
//! to flush it before the task is aborted.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use floorlink_core::driver::{BrokerDriver, EventSink};
use floorlink_core::error::{ConnectionError, SessionError};
use floorlink_core::event::BrokerEvent;
use floorlink_core::types::{Generation, Qos, SessionKind};

use crate::config::MqttConfig;
use crate::error::MqttError;

/// Maps the gateway QoS onto the `rumqttc` one.
pub fn to_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
        Qos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// How long a closing session may take to send DISCONNECT.
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

struct Active {
    generation: Generation,
    client: AsyncClient,
    task: JoinHandle<()>,
}

impl Active {
    /// Queues DISCONNECT and waits for the event loop to send it and end.
    /// A task still running after [`DRAIN_TIMEOUT`] is aborted on drop.
    async fn close(mut self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "Broker disconnect request not queued");
            return;
        }
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut self.task).await.is_err() {
            debug!(generation = %self.generation, "Broker session did not drain, aborting");
        }
    }
}

impl Drop for Active {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// MqttBroker
// =============================================================================

/// Broker session implementing [`BrokerDriver`].
pub struct MqttBroker {
    config: MqttConfig,
    endpoint: String,
    active: Mutex<Option<Active>>,
}

impl MqttBroker {
    /// Creates an idle session.
    pub fn new(config: MqttConfig) -> Self {
        let endpoint = config.endpoint();
        Self {
            config,
            endpoint,
            active: Mutex::new(None),
        }
    }

    /// Returns the settings.
    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    /// Generation of the open session, if any.
    pub fn session_generation(&self) -> Option<Generation> {
        self.active.lock().as_ref().map(|a| a.generation)
    }

    fn client(&self, operation: &'static str) -> Result<AsyncClient, SessionError> {
        self.active
            .lock()
            .as_ref()
            .map(|a| a.client.clone())
            .ok_or_else(|| MqttError::NotConnected.into_session_error(operation))
    }
}

impl std::fmt::Debug for MqttBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBroker")
            .field("endpoint", &self.endpoint)
            .field("generation", &self.session_generation())
            .finish()
    }
}

async fn run_event_loop(mut eventloop: EventLoop, generation: Generation, endpoint: String, sink: EventSink) {
    let mut connected = false;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    let error = ConnectionError::new(
                        SessionKind::Broker,
                        endpoint.as_str(),
                        format!("connection refused: {:?}", ack.code),
                    );
                    let event = if connected {
                        BrokerEvent::Disconnected { generation }
                    } else {
                        BrokerEvent::ConnectFailed { generation, error }
                    };
                    sink.send(event).await;
                    return;
                }
                if !connected {
                    connected = true;
                    info!(%endpoint, %generation, "Broker accepted connection");
                    if !sink.send(BrokerEvent::Connected { generation }).await {
                        return;
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                trace!(topic = %publish.topic, bytes = publish.payload.len(), "Inbound publish");
                let event = BrokerEvent::Message {
                    generation,
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                if !sink.send(event).await {
                    return;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!(%endpoint, %generation, "Disconnect sent");
                return;
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!(%endpoint, "Broker closed the session");
                sink.send(BrokerEvent::Disconnected { generation }).await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                if connected {
                    warn!(%endpoint, error = %e, "Broker connection lost");
                    sink.send(BrokerEvent::Disconnected { generation }).await;
                } else {
                    let error = ConnectionError::new(SessionKind::Broker, endpoint.as_str(), e.to_string());
                    sink.send(BrokerEvent::ConnectFailed { generation, error }).await;
                }
                return;
            }
        }
    }
}

#[async_trait]
impl BrokerDriver for MqttBroker {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connect(&self, generation: Generation, sink: EventSink) -> Result<(), ConnectionError> {
        let options = self
            .config
            .to_options()
            .map_err(|e| e.into_connection_error(&self.endpoint))?;

        let (client, eventloop) = AsyncClient::new(options, self.config.request_capacity);
        let task = tokio::spawn(run_event_loop(eventloop, generation, self.endpoint.clone(), sink));

        let previous = self.active.lock().replace(Active {
            generation,
            client,
            task,
        });
        if let Some(previous) = previous {
            debug!(generation = %previous.generation, "Replacing broker session");
            previous.close().await;
        }
        debug!(endpoint = %self.endpoint, %generation, "Broker connect started");
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: Qos) -> Result<(), SessionError> {
        let client = self.client("subscribe")?;
        client
            .subscribe(filter, to_qos(qos))
            .await
            .map_err(|e| MqttError::from(e).into_session_error("subscribe"))
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: Qos) -> Result<(), SessionError> {
        let client = self.client("publish")?;
        // Never wait on a full request queue.
        client
            .try_publish(topic, to_qos(qos), false, payload)
            .map_err(|e| MqttError::from(e).into_session_error("publish"))
    }

    async fn disconnect(&self) {
        let active = self.active.lock().take();
        if let Some(active) = active {
            let generation = active.generation;
            active.close().await;
            info!(endpoint = %self.endpoint, %generation, "Broker session closed");
        }
    }
}
