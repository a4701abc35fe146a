// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Start the gateway (default)
//! - `validate`: Validate the configuration file
//! - `tags`: Print the tag catalog with resolved addresses
//! - `version`: Show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use floorlink_config::LoggingConfig;

use crate::logging::LogSettings;

// =============================================================================
// Main CLI Structure
// =============================================================================

/// floorlink - factory-floor gateway
///
/// Keeps an OPC UA automation server, an MQTT broker and a serial RFID
/// reader in agreement: HMI logins, job dispatch, vision results and
/// material readiness.
#[derive(Parser, Debug)]
#[command(
    name = "floorlink",
    version = floorlink_core::VERSION,
    about = "Factory-floor gateway between OPC UA, MQTT and RFID",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = floorlink_config::DEFAULT_CONFIG_FILE,
        env = "FLOORLINK_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the gateway
    ///
    /// This is the default command when no subcommand is specified. All three
    /// sessions are started; SIGINT or SIGTERM stops them and exits.
    Run,

    /// Validate the configuration file
    ///
    /// Parses and validates the configuration and every driver setting
    /// without connecting to anything.
    Validate(ValidateArgs),

    /// Print the tag catalog
    ///
    /// Lists every tag with its resolved node address, type, direction and
    /// monitoring policy.
    Tags(TagsArgs),

    /// Show detailed version information
    Version,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Show the parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the `tags` command.
#[derive(Args, Debug, Clone, Default)]
pub struct TagsArgs {
    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<floorlink_config::LogFormat> for LogFormat {
    fn from(format: floorlink_config::LogFormat) -> Self {
        match format {
            floorlink_config::LogFormat::Text => LogFormat::Text,
            floorlink_config::LogFormat::Json => LogFormat::Json,
            floorlink_config::LogFormat::Compact => LogFormat::Compact,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parses CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the effective command, defaulting to `Run`.
    pub fn effective_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }

    /// Returns the effective log level.
    ///
    /// `-q` wins over `-v`, both win over `--log-level`, which wins over the
    /// file's `logging.level`.
    pub fn effective_log_level(&self, file: Option<&LoggingConfig>) -> String {
        if self.quiet {
            "warn".to_string()
        } else if self.verbose >= 2 {
            "trace".to_string()
        } else if self.verbose == 1 {
            "debug".to_string()
        } else if let Some(level) = &self.log_level {
            level.clone()
        } else {
            file.map(|l| l.level.as_str()).unwrap_or("info").to_string()
        }
    }

    /// Resolves the logging settings against the config file's section.
    pub fn log_settings(&self, file: Option<&LoggingConfig>) -> LogSettings {
        let defaults = LoggingConfig::default();
        let section = file.unwrap_or(&defaults);
        LogSettings {
            level: self.effective_log_level(file),
            format: self.log_format.unwrap_or_else(|| section.format.into()),
            with_target: section.with_target,
            with_file: section.with_file,
            with_thread_ids: section.with_thread_ids,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use floorlink_config::LogLevel;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["floorlink"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run));
        assert_eq!(cli.config, PathBuf::from("floorlink.yaml"));
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["floorlink", "validate", "--show-config", "-f", "json"]);
        match cli.command {
            Some(Commands::Validate(args)) => {
                assert!(args.show_config);
                assert_eq!(args.format, OutputFormat::Json);
            }
            other => panic!("Expected Validate command, got {other:?}"),
        }
    }

    #[test]
    fn test_tags_command() {
        let cli = Cli::parse_from(["floorlink", "tags"]);
        assert!(matches!(cli.command, Some(Commands::Tags(_))));
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::parse_from(["floorlink", "run", "-c", "/etc/floorlink/line2.toml", "--log-format", "json"]);
        assert_eq!(cli.config, PathBuf::from("/etc/floorlink/line2.toml"));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn test_level_precedence() {
        let file = LoggingConfig {
            level: LogLevel::Error,
            ..LoggingConfig::default()
        };

        let cli = Cli::parse_from(["floorlink"]);
        assert_eq!(cli.effective_log_level(None), "info");
        assert_eq!(cli.effective_log_level(Some(&file)), "error");

        let cli = Cli::parse_from(["floorlink", "-l", "debug"]);
        assert_eq!(cli.effective_log_level(Some(&file)), "debug");

        let cli = Cli::parse_from(["floorlink", "-vv", "-l", "info"]);
        assert_eq!(cli.effective_log_level(None), "trace");

        let cli = Cli::parse_from(["floorlink", "-q", "-v"]);
        assert_eq!(cli.effective_log_level(None), "warn");
    }

    #[test]
    fn test_log_settings_from_file() {
        let file = LoggingConfig {
            format: floorlink_config::LogFormat::Compact,
            with_file: true,
            ..LoggingConfig::default()
        };
        let settings = Cli::parse_from(["floorlink"]).log_settings(Some(&file));
        assert_eq!(settings.format, LogFormat::Compact);
        assert!(settings.with_file);

        let settings = Cli::parse_from(["floorlink", "--log-format", "json"]).log_settings(Some(&file));
        assert_eq!(settings.format, LogFormat::Json);
    }
}
