// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # floorlink-core
//!
//! Reconciliation engine of the floorlink factory-floor gateway.
//!
//! The gateway keeps an OPC UA automation server, an MQTT broker and a serial
//! RFID reader in agreement. This crate holds everything that does not speak
//! a wire protocol:
//!
//! - **Tag**: the tag catalog and the generation-scoped registry of handles
//! - **Readiness**: boolean flags with edge notifications
//! - **Handshake**: the login, dispatch, vision and gateway-ready orchestrators
//! - **Router**: the single-threaded event router driving the orchestrators
//! - **Driver**: ports implemented by the protocol crates
//! - **Poller**: the blocking card reader loop
//! - **Gateway**: the async runtime executing router commands
//!
//! ## Example
//!
//! ```rust,ignore
//! use floorlink_core::{Gateway, GatewayDrivers, GatewayOptions, RouterConfig};
//!
//! let gateway = Gateway::new(RouterConfig::default(), drivers, GatewayOptions::default());
//! let handle = gateway.handle();
//! tokio::spawn(async move { handle.start().await });
//! gateway.run(shutdown_signal).await;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod error;
pub mod types;

// =============================================================================
// Domain Modules
// =============================================================================

pub mod auth;
pub mod job;
pub mod scan;
pub mod tag;
pub mod telemetry;

// =============================================================================
// Engine Modules
// =============================================================================

pub mod event;
pub mod handshake;
pub mod readiness;
pub mod router;

// =============================================================================
// Runtime Modules
// =============================================================================

pub mod driver;
pub mod gateway;
pub mod poller;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::*;
pub use types::*;

pub use auth::{AuthOutcome, AuthReply, AuthRequest, AUTH_APPROVED, AUTH_REJECTED};
pub use job::PendingJob;
pub use scan::CardScan;
pub use tag::{TagHandle, TagKey, TagRegistry, TagWrite, CATALOG};
pub use telemetry::Telemetry;

pub use event::{AutomationEvent, BrokerEvent, Command, Control, DeviceEvent, GatewayEvent, Notice};
pub use handshake::{LoginState, RouterConfig};
pub use readiness::{Flag, FlagEdge, FlagSource, ReadinessTracker};
pub use router::EventRouter;

pub use driver::{AuthClient, AutomationDriver, BrokerDriver, CardReader, EventSink, OfferError};
pub use gateway::{Gateway, GatewayDrivers, GatewayHandle, GatewayOptions};
pub use poller::DevicePoller;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
