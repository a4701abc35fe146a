// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # floorlink-bin
//!
//! CLI binary for the floorlink gateway.
//!
//! ## Architecture
//!
//! ```text
//!                     main.rs
//!                        │
//!                     cli.rs
//!                        │
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!     commands        runtime       logging
//!          │             │
//!          │         shutdown
//!          │
//!   floorlink-* crates
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the gateway (default command)
//! floorlink
//!
//! # Start with a custom config and JSON logs
//! floorlink -c /etc/floorlink/floorlink.yaml --log-format json
//!
//! # Validate configuration
//! floorlink validate
//!
//! # Print the tag catalog with resolved addresses
//! floorlink tags
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::{init_logging, LogSettings};
pub use runtime::GatewayRuntime;
pub use shutdown::{ShutdownCoordinator, ShutdownReason};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
