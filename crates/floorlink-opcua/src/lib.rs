// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # floorlink-opcua
//!
//! OPC UA driver for the floorlink gateway's automation session.
//!
//! ## Features
//!
//! - Node id parsing and formatting (`ns=2;s=...`, `i=`, `g=`, `b=`)
//! - Address-space probing for tag binding
//! - One subscription per session with monitored items added and removed on demand
//! - Batched writes with one status per value
//!
//! The `opcua` client stack is linked only with the `real-transport` feature.
//! Without it the crate still provides the driver over [`MockTransport`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use floorlink_opcua::{OpcUaConfig, OpcUaDriver};
//!
//! let config = OpcUaConfig::builder("opc.tcp://192.168.0.10:4840").build()?;
//! let driver = OpcUaDriver::connect_real(config);
//! ```
//!
//! ## Error Handling
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Discovery, session establishment, loss
//! ├── Operation     - Batch read/write failures
//! ├── Subscription  - Subscription and monitored item failures
//! └── Configuration - Invalid node ids and settings
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod conversion;
pub mod driver;
pub mod error;
pub mod mock;
#[cfg(feature = "real-transport")]
pub mod real_transport;
pub mod transport;
pub mod types;

pub use driver::OpcUaDriver;
pub use error::{OpcUaError, OpcUaResult};
pub use mock::MockTransport;
#[cfg(feature = "real-transport")]
pub use real_transport::RealTransport;
pub use transport::{OpcUaTransport, OpcUaValue, TransportEvent, TransportState};
pub use types::{NodeId, NodeIdentifier, OpcUaConfig, SecurityMode, SecurityPolicy, UserToken};

/// Returns `true` when the crate was built with the `opcua` client stack.
pub const fn has_real_transport() -> bool {
    cfg!(feature = "real-transport")
}
