// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! floorlink - factory-floor gateway joining an OPC UA automation server,
//! an MQTT broker and a serial RFID reader.

use floorlink_bin::error::report_error_and_exit;
use floorlink_bin::{commands, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    if let Err(error) = commands::execute(cli).await {
        report_error_and_exit(error);
    }
}
