// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `tags` command.

use floorlink_config::GatewayConfig;
use floorlink_core::tag::{Monitoring, CATALOG};

use crate::cli::{Cli, OutputFormat, TagsArgs};
use crate::error::{BinError, BinResult};

/// Prints the tag catalog resolved against the configured node prefix.
///
/// Falls back to the default prefix when the configuration file is absent.
pub fn tags(cli: &Cli, args: TagsArgs) -> BinResult<()> {
    let config = if cli.config.exists() {
        super::load(cli)?
    } else {
        eprintln!(
            "note: {} not found, using the default node prefix",
            cli.config.display()
        );
        GatewayConfig::default()
    };
    let prefix = &config.gateway.node_prefix;

    match args.format {
        OutputFormat::Text => {
            println!("Node prefix: {prefix}");
            println!();
            println!("{:<28} {:<8} {:<10} {:<12} ADDRESS", "TAG", "TYPE", "DIRECTION", "MONITORING");
            for spec in CATALOG {
                println!(
                    "{:<28} {:<8} {:<10} {:<12} {}",
                    spec.path,
                    spec.value_type.to_string(),
                    spec.direction.to_string(),
                    monitoring_label(spec.monitoring),
                    spec.address(prefix)
                );
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> = CATALOG
                .iter()
                .map(|spec| {
                    serde_json::json!({
                        "key": spec.key,
                        "name": spec.path,
                        "address": spec.address(prefix).as_str(),
                        "type": spec.value_type,
                        "direction": spec.direction,
                        "monitoring": spec.monitoring,
                    })
                })
                .collect();
            let output = serde_json::to_string_pretty(&entries)
                .map_err(|e| BinError::runtime(format!("serialization failed: {e}")))?;
            println!("{output}");
        }
    }
    Ok(())
}

fn monitoring_label(monitoring: Monitoring) -> &'static str {
    match monitoring {
        Monitoring::Always => "always",
        Monitoring::DuringLogin => "login",
        Monitoring::Never => "never",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_without_config_file() {
        let cli = <Cli as clap::Parser>::parse_from(["floorlink", "-c", "/nonexistent/floorlink.yaml", "tags"]);
        assert!(tags(&cli, TagsArgs::default()).is_ok());
    }

    #[test]
    fn test_tags_json() {
        let cli = <Cli as clap::Parser>::parse_from(["floorlink", "-c", "/nonexistent/floorlink.yaml"]);
        let args = TagsArgs {
            format: OutputFormat::Json,
        };
        assert!(tags(&cli, args).is_ok());
    }
}
