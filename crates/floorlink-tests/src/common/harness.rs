// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Gateway Harness
//!
//! Runs a real [`Gateway`] on the test runtime, wired to the mocks, and
//! exposes the mocks plus the observer notices for assertions.
//!
//! ```rust,ignore
//! let mut gw = GatewayHarness::ready().await;
//! gw.automation.push_tag(TagKey::AuthRequest, TagValue::Int16(1)).await;
//! gw.expect_notice("login requested", |n| matches!(n, Notice::LoginRequested)).await;
//! gw.shutdown().await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use floorlink_core::{
    EventSink, Gateway, GatewayDrivers, GatewayHandle, GatewayOptions, Notice, RouterConfig,
};

use super::fixtures::{approved_reply, router_config};
use super::init_test_logging;
use super::mocks::{MockAuth, MockAutomation, MockBroker, MockReader, ReaderControl};

/// How long a scenario waits for an expected outcome.
pub const NOTICE_TIMEOUT: Duration = Duration::from_secs(5);

/// Card reader cycle used by the harness.
const TEST_POLL_INTERVAL: Duration = Duration::from_millis(10);

// =============================================================================
// Builder
// =============================================================================

/// Configures a [`GatewayHarness`].
#[derive(Debug)]
pub struct HarnessBuilder {
    config: RouterConfig,
    automation: MockAutomation,
    broker: MockBroker,
    auth: MockAuth,
    reader: (MockReader, ReaderControl),
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        let config = router_config();
        Self {
            automation: MockAutomation::new(config.node_prefix.clone()),
            broker: MockBroker::new(),
            auth: MockAuth::replying(approved_reply()),
            reader: MockReader::new("/dev/ttyMOCK0"),
            config,
        }
    }
}

impl HarnessBuilder {
    /// Replaces the automation server.
    pub fn automation(mut self, automation: MockAutomation) -> Self {
        self.automation = automation;
        self
    }

    /// Replaces the broker.
    pub fn broker(mut self, broker: MockBroker) -> Self {
        self.broker = broker;
        self
    }

    /// Replaces the authorization service.
    pub fn auth(mut self, auth: MockAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Overrides routing parameters.
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Gives access to the reader before the gateway starts.
    pub fn reader(self, setup: impl FnOnce(&ReaderControl)) -> Self {
        setup(&self.reader.1);
        self
    }

    /// Creates the gateway and spawns its event loop without starting sessions.
    pub fn spawn(self) -> GatewayHarness {
        init_test_logging();

        let automation = Arc::new(self.automation);
        let broker = Arc::new(self.broker);
        let auth = Arc::new(self.auth);
        let (reader, control) = self.reader;

        let drivers = GatewayDrivers {
            automation: automation.clone(),
            broker: broker.clone(),
            auth: auth.clone(),
            reader: Box::new(reader),
        };
        let options = GatewayOptions {
            poll_interval: TEST_POLL_INTERVAL,
            ..GatewayOptions::default()
        };
        let gateway = Gateway::new(self.config, drivers, options);
        let handle = gateway.handle();
        let notices = handle.subscribe();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(gateway.run(async move {
            let _ = stop_rx.await;
        }));

        GatewayHarness {
            automation,
            broker,
            auth,
            reader: control,
            handle,
            notices,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }
}

// =============================================================================
// GatewayHarness
// =============================================================================

/// A running gateway and its mock endpoints.
pub struct GatewayHarness {
    /// Automation server.
    pub automation: Arc<MockAutomation>,
    /// Broker.
    pub broker: Arc<MockBroker>,
    /// Authorization service.
    pub auth: Arc<MockAuth>,
    /// Card reader.
    pub reader: ReaderControl,
    /// Gateway control handle.
    pub handle: GatewayHandle,
    notices: broadcast::Receiver<Notice>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl GatewayHarness {
    /// Starts configuring a harness.
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// A default harness with every session started.
    pub async fn started() -> Self {
        let harness = Self::builder().spawn();
        assert!(harness.handle.start().await, "gateway queue closed");
        harness
    }

    /// A default harness with all three sessions connected.
    pub async fn ready() -> Self {
        let mut harness = Self::started().await;
        harness.expect_ready(true).await;
        harness
    }

    /// Raw access to the gateway event queue.
    pub fn sink(&self) -> EventSink {
        self.handle.sink()
    }

    /// Waits for a notice accepted by `matches`, skipping the others.
    ///
    /// Panics after [`NOTICE_TIMEOUT`].
    pub async fn expect_notice<F>(&mut self, what: &str, mut matches: F) -> Notice
    where
        F: FnMut(&Notice) -> bool,
    {
        let deadline = Instant::now() + NOTICE_TIMEOUT;
        loop {
            match tokio::time::timeout_at(deadline, self.notices.recv()).await {
                Ok(Ok(notice)) if matches(&notice) => return notice,
                Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    panic!("gateway stopped while waiting for {what}")
                }
                Err(_) => panic!("timed out waiting for {what}"),
            }
        }
    }

    /// Waits for the gateway-ready aggregate to become `ready`.
    pub async fn expect_ready(&mut self, ready: bool) {
        self.expect_notice("gateway ready change", |n| {
            matches!(n, Notice::GatewayReady { ready: r } if *r == ready)
        })
        .await;
    }

    /// Drops every notice received so far.
    pub fn clear_notices(&mut self) {
        while self.notices.try_recv().is_ok() {}
    }

    /// Stops the gateway and waits for its event loop to finish.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            tokio::time::timeout(NOTICE_TIMEOUT, task)
                .await
                .expect("gateway did not stop in time")
                .expect("gateway task panicked");
        }
    }
}

impl Drop for GatewayHarness {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Polls `condition` until it holds. Panics after [`NOTICE_TIMEOUT`].
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + NOTICE_TIMEOUT;
    while !condition() {
        if Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
