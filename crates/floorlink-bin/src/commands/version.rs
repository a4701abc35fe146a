// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `floorlink version`

use floorlink_core::CATALOG;

use crate::error::BinResult;

/// Prints crate versions, the protocol stack and the size of the tag catalog.
pub fn version() -> BinResult<()> {
    let monitored = CATALOG.iter().filter(|spec| spec.direction.can_read()).count();
    let opcua = if floorlink_opcua::has_real_transport() {
        "opcua client"
    } else {
        "not built (enable real-transport)"
    };

    println!(
        "floorlink {} ({}/{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    println!("  gateway core  {}", floorlink_core::VERSION);
    println!("  config        {}", floorlink_config::VERSION);
    println!();
    println!("Endpoints:");
    println!("  automation    OPC UA, {opcua}");
    println!("  broker        MQTT 3.1.1, rumqttc");
    println!("  reader        serial RFID, tokio-serial");
    println!("  auth          HTTP JSON, reqwest");
    println!();
    println!("Tag catalog: {} tags, {monitored} readable", CATALOG.len());

    Ok(())
}
