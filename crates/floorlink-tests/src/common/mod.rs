// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Shared helpers for the integration suites.
//!
//! - `fixtures`: payloads, replies and the router settings every suite uses
//! - `mocks`: in-memory automation server, broker, reader and auth service
//! - `harness`: a running gateway wired to the mocks

pub mod fixtures;
pub mod harness;
pub mod mocks;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static LOGGING: Once = Once::new();

/// Routes gateway logs into the test output. `RUST_LOG` overrides the
/// default of debug for the core crate.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,floorlink_core=debug,floorlink_opcua=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Scratch directory for configuration files, removed on drop.
pub fn temp_test_dir(label: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(&format!("floorlink-{label}-"))
        .tempdir()
        .expect("scratch directory")
}
