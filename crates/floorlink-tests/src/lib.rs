// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # floorlink Integration Tests
//!
//! End-to-end scenarios for the floorlink gateway. The full [`Gateway`]
//! runtime is driven against in-memory endpoints, so every handshake runs
//! through the real event queue, executors and card poller thread.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities
//!   - `mocks`: In-memory automation server, broker, auth service and reader
//!   - `fixtures`: Dispatch payloads, auth replies and router settings
//!   - `harness`: A running gateway wired to the mocks
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p floorlink-tests
//!
//! # Run one suite
//! cargo test -p floorlink-tests --test integration_login
//! cargo test -p floorlink-tests --test integration_dispatch
//! cargo test -p floorlink-tests --test integration_sessions
//! cargo test -p floorlink-tests --test integration_opcua
//! cargo test -p floorlink-tests --test integration_config
//!
//! # With gateway logs
//! RUST_LOG=floorlink_core=debug cargo test -p floorlink-tests -- --nocapture
//! ```
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use floorlink_tests::prelude::*;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let mut gw = GatewayHarness::ready().await;
//!     gw.automation.push_tag(TagKey::PowerStatus, TagValue::UInt16(1)).await;
//!     gw.shutdown().await;
//! }
//! ```
//!
//! [`Gateway`]: floorlink_core::Gateway

pub mod common;

/// Everything a scenario needs.
pub mod prelude {
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::{eventually, GatewayHarness, NOTICE_TIMEOUT};
    pub use crate::common::{init_test_logging, temp_test_dir};
    pub use crate::common::mocks::{
        MockAuth, MockAutomation, MockBroker, MockReader, ReaderControl,
    };

    pub use floorlink_core::{
        CardScan, Command, ConnectionState, Control, Generation, Notice, RouterConfig, SessionKind,
        TagKey, TagValue,
    };
}
