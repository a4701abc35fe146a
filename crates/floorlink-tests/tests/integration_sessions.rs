// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Session Integration Tests
//!
//! Session lifecycle of the three endpoints:
//!
//! - `test_ready_*`: gateway-ready aggregation
//! - `test_failure_*`: connect and open failures
//! - `test_restart_*`: stop, start and retired generations
//! - `test_shutdown_*`: orderly shutdown

use floorlink_core::event::{AutomationEvent, DeviceEvent};
use floorlink_tests::prelude::*;

fn is_state(notice: &Notice, kind: SessionKind, state: ConnectionState) -> bool {
    matches!(notice, Notice::SessionState { session, state: s } if *session == kind && *s == state)
}

// =============================================================================
// Gateway ready
// =============================================================================

#[tokio::test]
async fn test_ready_after_all_sessions_connect() {
    let mut gw = GatewayHarness::started().await;
    for kind in SessionKind::ALL {
        gw.expect_notice("session connecting", |n| is_state(n, kind, ConnectionState::Connecting))
            .await;
    }
    gw.expect_ready(true).await;

    assert_eq!(gw.automation.connect_count(), 1);
    assert_eq!(gw.broker.connect_count(), 1);
    assert!(gw.reader.is_open());
    assert_eq!(
        gw.automation.generations(),
        vec![Generation::new(1)],
        "automation starts first"
    );

    gw.shutdown().await;
}

#[tokio::test]
async fn test_ready_drops_when_broker_lost() {
    let mut gw = GatewayHarness::ready().await;

    assert!(gw.broker.drop_connection().await);
    gw.expect_notice("broker disconnected", |n| {
        is_state(n, SessionKind::Broker, ConnectionState::Disconnected)
    })
    .await;
    gw.expect_ready(false).await;

    // Lost sessions are not restarted automatically; start picks them up.
    gw.handle.start().await;
    gw.expect_ready(true).await;
    assert_eq!(gw.broker.connect_count(), 2);
    assert_eq!(gw.automation.connect_count(), 1);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_ready_drops_when_automation_lost() {
    let mut gw = GatewayHarness::ready().await;

    // Telemetry stops with the broker, but login state goes with the automation session.
    gw.automation.push_tag(TagKey::AuthRequest, TagValue::Int16(1)).await;
    gw.expect_notice("login requested", |n| matches!(n, Notice::LoginRequested))
        .await;

    assert!(gw.automation.drop_connection().await);
    gw.expect_ready(false).await;
    gw.handle.start().await;
    gw.expect_ready(true).await;

    // A fresh session starts with an idle login.
    gw.automation.push_tag(TagKey::AuthRequest, TagValue::Int16(1)).await;
    gw.expect_notice("login requested again", |n| matches!(n, Notice::LoginRequested))
        .await;

    gw.shutdown().await;
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_failure_automation_connect() {
    let automation = MockAutomation::new(TEST_PREFIX);
    automation.fail_connect(true);
    let mut gw = GatewayHarness::builder().automation(automation).spawn();
    gw.handle.start().await;

    let notice = gw
        .expect_notice("session failed", |n| matches!(n, Notice::SessionFailed { .. }))
        .await;
    assert!(matches!(
        notice,
        Notice::SessionFailed { session: SessionKind::Automation, ref message } if message.contains("refused")
    ));
    gw.expect_notice("automation failed state", |n| {
        is_state(n, SessionKind::Automation, ConnectionState::Failed)
    })
    .await;
    assert_eq!(gw.automation.disconnect_count(), 1, "failed connects are cleaned up");

    // A retry is an explicit start.
    gw.automation.fail_connect(false);
    gw.handle.start().await;
    gw.expect_ready(true).await;

    gw.shutdown().await;
}

#[tokio::test]
async fn test_failure_reader_open() {
    let mut gw = GatewayHarness::builder().reader(|r| r.fail_open(true)).spawn();
    gw.handle.start().await;

    let notice = gw
        .expect_notice("session failed", |n| matches!(n, Notice::SessionFailed { .. }))
        .await;
    assert!(matches!(notice, Notice::SessionFailed { session: SessionKind::Device, .. }));
    gw.expect_notice("device failed state", |n| {
        is_state(n, SessionKind::Device, ConnectionState::Failed)
    })
    .await;

    gw.reader.fail_open(false);
    gw.handle.start().await;
    gw.expect_ready(true).await;
    assert_eq!(gw.reader.open_count(), 1);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_failure_broker_connect() {
    let broker = MockBroker::new();
    broker.fail_connect(true);
    let mut gw = GatewayHarness::builder().broker(broker).spawn();
    gw.handle.start().await;

    let notice = gw
        .expect_notice("session failed", |n| matches!(n, Notice::SessionFailed { .. }))
        .await;
    assert!(matches!(notice, Notice::SessionFailed { session: SessionKind::Broker, .. }));

    // Without the broker, scans still drive the machine but nothing is published.
    gw.reader.present(card_scan());
    gw.expect_notice("card scanned", |n| matches!(n, Notice::CardScanned { .. }))
        .await;
    eventually("material ready written", || {
        !gw.automation.writes_to(TagKey::MaterialReady).is_empty()
    })
    .await;
    assert!(gw.broker.published().is_empty());

    gw.shutdown().await;
}

#[tokio::test]
async fn test_failure_missing_tag_is_skipped() {
    let automation = MockAutomation::new(TEST_PREFIX);
    automation.remove_tag(TagKey::JobColor);
    let mut gw = GatewayHarness::builder().automation(automation).spawn();
    gw.handle.start().await;
    gw.expect_ready(true).await;

    gw.broker.deliver(COMMAND_TOPIC, dispatch_payload()).await;
    gw.expect_notice("job dispatched", |n| matches!(n, Notice::JobDispatched(_)))
        .await;
    eventually("approve written", || !gw.automation.writes_to(TagKey::JobApprove).is_empty()).await;
    assert!(gw.automation.writes_to(TagKey::JobColor).is_empty());
    assert_eq!(gw.automation.writes().len(), 11);

    gw.shutdown().await;
}

// =============================================================================
// Restart
// =============================================================================

#[tokio::test]
async fn test_restart_issues_new_generations() {
    let mut gw = GatewayHarness::ready().await;

    gw.handle.stop().await;
    for kind in SessionKind::ALL {
        gw.expect_notice("session stopped", |n| is_state(n, kind, ConnectionState::Disconnected))
            .await;
    }
    gw.expect_ready(false).await;
    eventually("reader closed", || !gw.reader.is_open()).await;

    gw.handle.start().await;
    gw.expect_ready(true).await;
    assert_eq!(
        gw.automation.generations(),
        vec![Generation::new(1), Generation::new(4)]
    );
    assert_eq!(gw.reader.open_count(), 2);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_restart_discards_retired_events() {
    let mut gw = GatewayHarness::ready().await;
    let old = gw.automation.current_generation().expect("automation session open");

    gw.handle.stop().await;
    gw.handle.start().await;
    gw.expect_ready(true).await;
    gw.clear_notices();

    let sink = gw.sink();
    sink.send(AutomationEvent::TagUpdated {
        generation: old,
        address: gw.automation.address(TagKey::JobCompleted),
        value: TagValue::UInt16(1),
    })
    .await;
    sink.send(DeviceEvent::Scan {
        generation: Generation::new(3),
        scan: card_scan(),
    })
    .await;
    gw.automation.push_tag(TagKey::AuthRequest, TagValue::Int16(1)).await;

    // The retired events came first; the current one is the first to surface.
    let notice = gw
        .expect_notice("first routed notice", |n| {
            matches!(
                n,
                Notice::JobCompleted { .. } | Notice::CardScanned { .. } | Notice::LoginRequested
            )
        })
        .await;
    assert_eq!(notice, Notice::LoginRequested);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_restart_clears_pending_job() {
    let mut gw = GatewayHarness::ready().await;
    gw.broker.deliver(COMMAND_TOPIC, dispatch_payload()).await;
    gw.expect_notice("job dispatched", |n| matches!(n, Notice::JobDispatched(_)))
        .await;

    gw.handle.stop().await;
    gw.handle.start().await;
    gw.expect_ready(true).await;

    gw.automation.push_tag(TagKey::JobCompleted, TagValue::UInt16(1)).await;
    let notice = gw
        .expect_notice("job completed", |n| matches!(n, Notice::JobCompleted { .. }))
        .await;
    assert_eq!(notice, Notice::JobCompleted { job_id: "NA".into() });

    gw.shutdown().await;
}

#[tokio::test]
async fn test_restart_start_is_idempotent() {
    let mut gw = GatewayHarness::ready().await;
    gw.handle.start().await;
    gw.handle.start().await;

    // A marker event proves both starts were routed.
    gw.automation.push_tag(TagKey::AuthRequest, TagValue::Int16(1)).await;
    gw.expect_notice("login requested", |n| matches!(n, Notice::LoginRequested))
        .await;
    assert_eq!(gw.automation.generations().len(), 1);
    assert_eq!(gw.broker.connect_count(), 1);

    gw.shutdown().await;
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_shutdown_closes_every_endpoint() {
    let gw = GatewayHarness::ready().await;
    let automation = gw.automation.clone();
    let broker = gw.broker.clone();
    let reader = gw.reader.clone();

    gw.shutdown().await;

    assert_eq!(automation.disconnect_count(), 1);
    assert_eq!(broker.disconnect_count(), 1);
    assert!(!reader.is_open());
    assert_eq!(reader.close_count(), 1);
}

#[tokio::test]
async fn test_shutdown_before_start() {
    let gw = GatewayHarness::builder().spawn();
    let automation = gw.automation.clone();
    gw.shutdown().await;
    assert_eq!(automation.connect_count(), 0);
    assert_eq!(automation.disconnect_count(), 0);
}
