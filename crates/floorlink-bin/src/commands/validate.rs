// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use std::path::Path;

use floorlink_config::{GatewayConfig, SecretValue};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};
use crate::runtime::{auth_client, DriverSettings};

/// Loads the configuration, derives every driver setting and reports.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = &cli.config;
    let config = super::load(cli)?;
    let settings = DriverSettings::from_config(&config)?;
    auth_client(&config.auth)?;

    let warnings = collect_warnings(&config);
    let redacted = redact(&config);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Gateway ID:  {}", config.gateway.id);
            println!("  Node prefix: {}", config.gateway.node_prefix);
            println!("  OPC UA:      {} ({})", settings.opcua.endpoint, settings.opcua.security_mode);
            println!("  MQTT:        {}", settings.mqtt.endpoint());
            println!("  Commands:    {}", config.mqtt.command_filter);
            println!("  Telemetry:   {}", config.mqtt.telemetry_topic);
            println!("  Auth:        {} (service '{}')", config.auth.url, config.auth.service);
            println!("  RFID:        {} @ {}", settings.reader.port, settings.reader.baud_rate);

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                println!("{}", to_json(&redacted)?);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "gateway_id": config.gateway.id,
                    "opcua_endpoint": settings.opcua.endpoint,
                    "mqtt_endpoint": settings.mqtt.endpoint(),
                    "auth_url": config.auth.url,
                    "rfid_port": settings.reader.port,
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&redacted) } else { None },
            });
            println!("{}", to_json(&output)?);
        }
    }

    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> BinResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| BinError::runtime(format!("serialization failed: {e}")))
}

/// Non-fatal findings worth reporting before deployment.
pub(crate) fn collect_warnings(config: &GatewayConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.mqtt.username.is_none() {
        warnings.push("mqtt.username is not set; ThingsBoard expects the device access token".to_string());
    }
    if config.opcua.security_mode != "None" && !Path::new(&config.opcua.pki_dir).exists() {
        warnings.push(format!(
            "opcua.pki_dir does not exist: {}",
            config.opcua.pki_dir.display()
        ));
    }
    if !Path::new(&config.rfid.port).exists() {
        warnings.push(format!("rfid.port does not exist: {}", config.rfid.port));
    }
    if config.auth.url.starts_with("http://") {
        warnings.push("auth.url is plain HTTP; credentials are sent unencrypted".to_string());
    }

    warnings
}

fn redact(config: &GatewayConfig) -> GatewayConfig {
    let mut redacted = config.clone();
    let hide = |secret: &mut Option<SecretValue>| {
        if secret.is_some() {
            *secret = Some(SecretValue::new("***"));
        }
    };
    hide(&mut redacted.opcua.password);
    hide(&mut redacted.mqtt.password);
    redacted
}
