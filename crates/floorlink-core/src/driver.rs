// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Ports to the outside world.
//!
//! The gateway talks to its three endpoints and the authorization service
//! only through these traits. Protocol crates implement them; tests replace
//! them with in-memory mocks.
//!
//! # Reporting
//!
//! Drivers never call back into the router. Anything that happens after a
//! call returns (value changes, connection loss, late write acks) is pushed
//! into the [`EventSink`] handed over at connect time, tagged with the
//! generation of that connect.
//!
//! ```rust,ignore
//! async fn example(driver: &dyn AutomationDriver, sink: EventSink) -> Result<(), ConnectionError> {
//!     driver.connect(Generation::new(1), sink).await?;
//!     let available = driver.probe(&addresses).await?;
//!     driver.set_monitoring(&addresses, true).await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::auth::{AuthReply, AuthRequest};
use crate::error::{AuthServiceError, ConnectionError, DeviceError, SessionError, WriteRejected};
use crate::event::GatewayEvent;
use crate::scan::CardScan;
use crate::types::{Generation, NodeAddress, Qos, TagValue};

// =============================================================================
// AutomationDriver
// =============================================================================

/// Session with the automation server.
///
/// Value changes of monitored nodes are reported as
/// [`AutomationEvent::TagUpdated`](crate::event::AutomationEvent::TagUpdated),
/// and connection loss as
/// [`AutomationEvent::Disconnected`](crate::event::AutomationEvent::Disconnected).
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Endpoint URL, for logging.
    fn endpoint(&self) -> &str;

    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Opens a session. Events of this session are sent to `sink` tagged with
    /// `generation`.
    async fn connect(&self, generation: Generation, sink: EventSink) -> Result<(), ConnectionError>;

    /// Returns the subset of `addresses` that exist on the server.
    async fn probe(&self, addresses: &[NodeAddress]) -> Result<HashSet<NodeAddress>, ConnectionError>;

    /// Closes the session. Calling this without a session is a no-op.
    async fn disconnect(&self);

    // =========================================================================
    // Data Operations
    // =========================================================================

    /// Enables or disables change monitoring of `addresses`.
    async fn set_monitoring(&self, addresses: &[NodeAddress], enabled: bool) -> Result<(), SessionError>;

    /// Writes values in one request, returning one result per value in order.
    async fn write(&self, values: &[(NodeAddress, TagValue)]) -> Vec<Result<(), WriteRejected>>;
}

// =============================================================================
// BrokerDriver
// =============================================================================

/// Session with the MQTT broker.
///
/// The session reports `Connected` once the broker accepts it, every inbound
/// publish as a `Message`, and `Disconnected` on loss.
#[async_trait]
pub trait BrokerDriver: Send + Sync {
    /// Broker address, for logging.
    fn endpoint(&self) -> &str;

    /// Starts connecting. Success is reported through `sink`.
    async fn connect(&self, generation: Generation, sink: EventSink) -> Result<(), ConnectionError>;

    /// Subscribes to a topic filter.
    async fn subscribe(&self, filter: &str, qos: Qos) -> Result<(), SessionError>;

    /// Publishes a message.
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: Qos) -> Result<(), SessionError>;

    /// Closes the session.
    async fn disconnect(&self);
}

// =============================================================================
// AuthClient
// =============================================================================

/// The external authorization service.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Submits credentials and returns the decoded reply.
    async fn authorize(&self, request: &AuthRequest) -> Result<AuthReply, AuthServiceError>;
}

// =============================================================================
// CardReader
// =============================================================================

/// A blocking card reader, driven by the [`DevicePoller`](crate::poller::DevicePoller)
/// on a dedicated thread.
pub trait CardReader: Send {
    /// Port name, for logging.
    fn port(&self) -> &str;

    /// Opens the port and configures the reader.
    fn open(&mut self) -> Result<(), DeviceError>;

    /// Performs one read cycle. `Ok(None)` means no card is present.
    fn poll(&mut self) -> Result<Option<CardScan>, DeviceError>;

    /// Closes the port. Calling this on a closed reader is a no-op.
    fn close(&mut self);
}

impl std::fmt::Debug for dyn CardReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardReader").field("port", &self.port()).finish()
    }
}

// =============================================================================
// EventSink
// =============================================================================

/// Sending half of the gateway event queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<GatewayEvent>,
}

impl EventSink {
    /// Wraps a queue sender.
    pub fn new(tx: mpsc::Sender<GatewayEvent>) -> Self {
        Self { tx }
    }

    /// Creates a sink and its receiving half.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<GatewayEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queues an event. Returns `false` once the gateway is gone.
    pub async fn send(&self, event: impl Into<GatewayEvent>) -> bool {
        let sent = self.tx.send(event.into()).await.is_ok();
        if !sent {
            trace!("Event queue closed");
        }
        sent
    }

    /// Queues an event without waiting, handing it back if the queue is full.
    pub fn offer(&self, event: impl Into<GatewayEvent>) -> Result<(), OfferError> {
        self.tx.try_send(event.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(event) => OfferError::Full(event),
            mpsc::error::TrySendError::Closed(_) => OfferError::Closed,
        })
    }

    /// Returns `true` once the gateway dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Why [`EventSink::offer`] did not queue an event.
#[derive(Debug)]
pub enum OfferError {
    /// The queue is full; the event is returned for another attempt.
    Full(GatewayEvent),
    /// The gateway is gone.
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Control;

    #[tokio::test]
    async fn test_sink_send_and_close() {
        let (sink, mut rx) = EventSink::channel(4);
        assert!(sink.send(Control::Start).await);
        assert!(matches!(rx.recv().await, Some(GatewayEvent::Control(Control::Start))));

        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.send(Control::Stop).await);
    }

    #[test]
    fn test_offer_returns_event_when_full() {
        let (sink, rx) = EventSink::channel(1);
        assert!(sink.offer(Control::Start).is_ok());
        assert!(matches!(
            sink.offer(Control::Stop),
            Err(OfferError::Full(GatewayEvent::Control(Control::Stop)))
        ));
        drop(rx);
        assert!(matches!(sink.offer(Control::Stop), Err(OfferError::Closed)));
    }
}
