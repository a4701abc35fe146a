// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Job Integration Tests
//!
//! Job lifecycle through the full runtime:
//!
//! - `test_dispatch_*`: broker command to machine tags
//! - `test_completion_*`: machine completion back to the broker
//! - `test_vision_*`: vision result publication and acknowledgment
//! - `test_gate_*`: card scan and the job-request gate

use std::time::Duration;

use serde_json::json;

use floorlink_core::error::DeviceError;
use floorlink_core::handshake::{JOB_APPROVED, JOB_REJECTED};
use floorlink_tests::prelude::*;

async fn dispatch(gw: &mut GatewayHarness) {
    assert!(gw.broker.deliver(COMMAND_TOPIC, dispatch_payload()).await);
    gw.expect_notice("job dispatched", |n| matches!(n, Notice::JobDispatched(_)))
        .await;
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn test_dispatch_writes_job_and_approve() {
    let mut gw = GatewayHarness::ready().await;
    dispatch(&mut gw).await;

    eventually("approve written", || {
        gw.automation.writes_to(TagKey::JobApprove) == vec![TagValue::Int16(JOB_APPROVED)]
    })
    .await;
    let a = &gw.automation;
    assert_eq!(a.writes_to(TagKey::JobId), vec![TagValue::String("12345".into())]);
    assert_eq!(a.writes_to(TagKey::JobProcessName), vec![TagValue::String("Window-Frame".into())]);
    assert_eq!(a.writes_to(TagKey::JobMaterialCode), vec![TagValue::String("AL-6063".into())]);
    assert_eq!(a.writes_to(TagKey::JobPlanQty), vec![TagValue::Int32(30)]);
    assert_eq!(a.writes_to(TagKey::JobLength), vec![TagValue::Int32(1200)]);
    assert_eq!(a.writes_to(TagKey::ConveyorSpeed), vec![TagValue::Int16(40)]);

    // The approve code is the last write of the batch.
    let approve = a.address(TagKey::JobApprove);
    assert_eq!(a.writes().last().map(|(addr, _)| addr), Some(&approve));
    assert_eq!(a.writes().len(), 12);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_dispatch_flat_payload_with_aliases() {
    let mut gw = GatewayHarness::ready().await;
    gw.broker.deliver(COMMAND_TOPIC, flat_dispatch_payload()).await;

    let notice = gw
        .expect_notice("job dispatched", |n| matches!(n, Notice::JobDispatched(_)))
        .await;
    let Notice::JobDispatched(job) = notice else { unreachable!() };
    assert_eq!(job.job_id, "J-77");
    assert_eq!(job.job_name, "Paint");
    assert_eq!(job.planned_qty, 12);
    assert_eq!(job.conveyor_speed, 25);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_dispatch_malformed_rejects() {
    let mut gw = GatewayHarness::ready().await;

    gw.broker.deliver(COMMAND_TOPIC, garbage_payload()).await;
    gw.expect_notice("job rejected", |n| matches!(n, Notice::JobRejected { .. }))
        .await;
    gw.broker.deliver(COMMAND_TOPIC, dispatch_without_id()).await;
    let notice = gw
        .expect_notice("job rejected", |n| matches!(n, Notice::JobRejected { .. }))
        .await;
    assert!(matches!(notice, Notice::JobRejected { ref reason } if reason.contains("JobID")));

    eventually("reject codes written", || gw.automation.writes_to(TagKey::JobApprove).len() == 2).await;
    assert_eq!(
        gw.automation.writes_to(TagKey::JobApprove),
        vec![TagValue::Int16(JOB_REJECTED), TagValue::Int16(JOB_REJECTED)]
    );
    assert!(gw.automation.writes_to(TagKey::JobId).is_empty());

    gw.shutdown().await;
}

#[tokio::test]
async fn test_dispatch_ignores_other_topics() {
    let mut gw = GatewayHarness::ready().await;

    gw.broker
        .deliver("v1/devices/me/attributes", dispatch_payload())
        .await;
    // A routed message afterwards proves the first one was handled and dropped.
    gw.broker.deliver(COMMAND_TOPIC, garbage_payload()).await;
    gw.expect_notice("job rejected", |n| matches!(n, Notice::JobRejected { .. }))
        .await;
    assert!(gw.automation.writes_to(TagKey::JobId).is_empty());

    gw.shutdown().await;
}

#[tokio::test]
async fn test_dispatch_subscribes_command_filter() {
    let gw = GatewayHarness::ready().await;
    eventually("subscribed", || !gw.broker.subscriptions().is_empty()).await;
    let subscriptions = gw.broker.subscriptions();
    assert_eq!(subscriptions[0].0, "v1/devices/me/rpc/request/+");
    gw.shutdown().await;
}

// =============================================================================
// Completion
// =============================================================================

#[tokio::test]
async fn test_completion_reports_job_id() {
    let mut gw = GatewayHarness::ready().await;
    dispatch(&mut gw).await;

    gw.automation.push_tag(TagKey::JobCompleted, TagValue::UInt16(1)).await;
    let notice = gw
        .expect_notice("job completed", |n| matches!(n, Notice::JobCompleted { .. }))
        .await;
    assert_eq!(notice, Notice::JobCompleted { job_id: "12345".into() });
    eventually("completion telemetry", || {
        gw.broker.has_published(&json!({"JobCompleted": 1, "JobID": "12345"}))
    })
    .await;

    // Completing again without a pending job reports the cleared id.
    gw.automation.push_tag(TagKey::JobCompleted, TagValue::UInt16(0)).await;
    gw.automation.push_tag(TagKey::JobCompleted, TagValue::UInt16(1)).await;
    let notice = gw
        .expect_notice("job completed", |n| matches!(n, Notice::JobCompleted { .. }))
        .await;
    assert_eq!(notice, Notice::JobCompleted { job_id: "NA".into() });

    gw.shutdown().await;
}

#[tokio::test]
async fn test_completion_level_does_not_repeat() {
    let mut gw = GatewayHarness::ready().await;
    dispatch(&mut gw).await;

    gw.automation.push_tag(TagKey::JobCompleted, TagValue::UInt16(1)).await;
    gw.automation.push_tag(TagKey::JobCompleted, TagValue::UInt16(1)).await;
    gw.expect_notice("job completed", |n| matches!(n, Notice::JobCompleted { .. }))
        .await;

    // Telemetry is published in order, so the marker follows any completion.
    gw.automation.push_tag(TagKey::PowerStatus, TagValue::UInt16(1)).await;
    eventually("marker telemetry", || gw.broker.has_published(&json!({"PowerStatus": 1}))).await;
    let completions = gw
        .broker
        .telemetry()
        .into_iter()
        .filter(|v| v.get("JobCompleted").is_some())
        .count();
    assert_eq!(completions, 1);

    gw.shutdown().await;
}

// =============================================================================
// Vision
// =============================================================================

#[tokio::test]
async fn test_vision_result_published_and_acknowledged() {
    let mut gw = GatewayHarness::ready().await;
    dispatch(&mut gw).await;

    gw.automation.push_tag(TagKey::VisionResult, TagValue::UInt16(2)).await;
    let notice = gw
        .expect_notice("vision result", |n| matches!(n, Notice::VisionResultPublished { .. }))
        .await;
    assert_eq!(
        notice,
        Notice::VisionResultPublished { value: 2, job_id: "12345".into() }
    );
    eventually("vision telemetry", || {
        gw.broker.has_published(&json!({"VisionResult": 2, "JobID": "12345"}))
    })
    .await;

    gw.automation.push_tag(TagKey::VisionResultRead, TagValue::UInt16(1)).await;
    eventually("result tags reset", || {
        gw.automation.writes_to(TagKey::VisionResult) == vec![TagValue::UInt16(0)]
            && gw.automation.writes_to(TagKey::VisionResultRead) == vec![TagValue::UInt16(0)]
    })
    .await;

    gw.shutdown().await;
}

#[tokio::test]
async fn test_vision_result_outside_job_not_published() {
    let mut gw = GatewayHarness::ready().await;

    gw.automation.push_tag(TagKey::VisionResult, TagValue::UInt16(2)).await;
    gw.automation.push_tag(TagKey::VisionResultRead, TagValue::UInt16(1)).await;
    // Anything routed afterwards proves the result was already handled.
    dispatch(&mut gw).await;

    assert!(!gw.broker.telemetry().iter().any(|v| v.get("VisionResult").is_some()));
    assert!(gw.automation.writes_to(TagKey::VisionResult).is_empty());

    gw.shutdown().await;
}

#[tokio::test]
async fn test_vision_zero_result_ignored() {
    let mut gw = GatewayHarness::ready().await;
    dispatch(&mut gw).await;

    gw.automation.push_tag(TagKey::VisionResult, TagValue::UInt16(0)).await;
    gw.automation.push_tag(TagKey::VisionResult, TagValue::UInt16(1)).await;
    let notice = gw
        .expect_notice("vision result", |n| matches!(n, Notice::VisionResultPublished { .. }))
        .await;
    assert!(matches!(notice, Notice::VisionResultPublished { value: 1, .. }));

    gw.shutdown().await;
}

// =============================================================================
// Job-request gate
// =============================================================================

async fn station_ready(gw: &GatewayHarness) {
    gw.automation.push_tag(TagKey::PowerStatus, TagValue::UInt16(1)).await;
    gw.automation.push_tag(TagKey::VisionStatus, TagValue::UInt16(1)).await;
    gw.automation.push_tag(TagKey::JobRequest, TagValue::Int16(1)).await;
}

#[tokio::test]
async fn test_gate_fires_on_card_scan() {
    let mut gw = GatewayHarness::ready().await;
    station_ready(&gw).await;

    gw.reader.present(card_scan());
    let notice = gw
        .expect_notice("card scanned", |n| matches!(n, Notice::CardScanned { .. }))
        .await;
    assert_eq!(
        notice,
        Notice::CardScanned { card: CARD_ID.into(), data: "LOT-0042".into() }
    );
    let notice = gw
        .expect_notice("job request", |n| matches!(n, Notice::JobRequestSent { .. }))
        .await;
    assert_eq!(notice, Notice::JobRequestSent { card: CARD_ID.into() });

    eventually("job request telemetry", || {
        gw.broker.has_published(&json!({"JobRequest": 1, "TagID": CARD_ID}))
    })
    .await;
    assert!(gw.broker.has_published(&json!({"TagID": CARD_ID, "BlockData": "LOT-0042"})));
    eventually("material ready written", || {
        gw.automation.writes_to(TagKey::MaterialReady) == vec![TagValue::UInt16(1)]
    })
    .await;

    gw.shutdown().await;
}

#[tokio::test]
async fn test_gate_fires_when_last_input_rises() {
    let mut gw = GatewayHarness::ready().await;

    gw.reader.present(card_scan());
    gw.expect_notice("card scanned", |n| matches!(n, Notice::CardScanned { .. }))
        .await;
    station_ready(&gw).await;

    gw.expect_notice("job request", |n| matches!(n, Notice::JobRequestSent { .. }))
        .await;

    gw.shutdown().await;
}

#[tokio::test]
async fn test_gate_consumes_material_ready() {
    let mut gw = GatewayHarness::ready().await;
    station_ready(&gw).await;
    gw.reader.present(card_scan());
    gw.expect_notice("job request", |n| matches!(n, Notice::JobRequestSent { .. }))
        .await;

    // Other inputs toggling without a new card do not fire again.
    gw.automation.push_tag(TagKey::PowerStatus, TagValue::UInt16(0)).await;
    gw.automation.push_tag(TagKey::PowerStatus, TagValue::UInt16(1)).await;
    gw.reader.present(CardScan::valid("E004FFFF0001", "LOT-0043"));
    let notice = gw
        .expect_notice("job request", |n| matches!(n, Notice::JobRequestSent { .. }))
        .await;
    assert_eq!(notice, Notice::JobRequestSent { card: "E004FFFF0001".into() });

    eventually("second job request telemetry", || {
        gw.broker.has_published(&json!({"JobRequest": 1, "TagID": "E004FFFF0001"}))
    })
    .await;
    let requests = gw
        .broker
        .telemetry()
        .into_iter()
        .filter(|v| v.get("JobRequest").is_some())
        .count();
    assert_eq!(requests, 2);

    gw.shutdown().await;
}

#[tokio::test]
async fn test_gate_waits_for_power() {
    let mut gw = GatewayHarness::ready().await;
    gw.automation.push_tag(TagKey::VisionStatus, TagValue::UInt16(1)).await;
    gw.automation.push_tag(TagKey::JobRequest, TagValue::Int16(1)).await;

    gw.reader.present(card_scan());
    gw.expect_notice("card scanned", |n| matches!(n, Notice::CardScanned { .. }))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!gw.broker.telemetry().iter().any(|v| v.get("JobRequest").is_some()));

    gw.automation.push_tag(TagKey::PowerStatus, TagValue::UInt16(1)).await;
    gw.expect_notice("job request", |n| matches!(n, Notice::JobRequestSent { .. }))
        .await;

    gw.shutdown().await;
}

#[tokio::test]
async fn test_invalid_scan_is_ignored() {
    let mut gw = GatewayHarness::ready().await;
    station_ready(&gw).await;

    gw.reader.present(CardScan::invalid("select failed"));
    gw.reader.fail_next_read(DeviceError::Io("timeout".into()));
    gw.reader.present(card_scan());

    // The first notice is the valid card; nothing before it fired.
    let notice = gw
        .expect_notice("card or request", |n| {
            matches!(n, Notice::CardScanned { .. } | Notice::JobRequestSent { .. })
        })
        .await;
    assert!(matches!(notice, Notice::CardScanned { ref card, .. } if card == CARD_ID));

    gw.shutdown().await;
}
