// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.

mod run;
mod tags;
mod validate;
mod version;

pub use run::run;
pub use tags::tags;
pub use validate::validate;
pub use version::version;

use floorlink_config::{ConfigLoader, GatewayConfig};

use crate::cli::{Cli, Commands};
use crate::error::{BinError, BinResult};
use crate::logging::init_logging;

/// Executes the command selected on the command line.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run => {
            let config = load(&cli)?;
            init_logging(&cli.log_settings(Some(&config.logging)))?;
            run::run(config).await
        }
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Tags(args) => tags::tags(&cli, args),
        Commands::Version => version::version(),
    }
}

/// Loads the configuration file named on the command line.
pub(crate) fn load(cli: &Cli) -> BinResult<GatewayConfig> {
    ConfigLoader::new()
        .load(&cli.config)
        .map_err(|e| BinError::from(e).with_context(format!("loading {}", cli.config.display())))
}
