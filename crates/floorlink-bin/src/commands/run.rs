// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use floorlink_config::GatewayConfig;

use crate::error::BinResult;
use crate::runtime::GatewayRuntime;

/// Starts the gateway and runs until SIGINT or SIGTERM.
pub async fn run(config: GatewayConfig) -> BinResult<()> {
    GatewayRuntime::new(config).run().await
}
