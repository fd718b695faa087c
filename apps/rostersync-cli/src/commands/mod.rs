//! Command implementations

pub mod add;
pub mod check;
pub mod deactivate;
pub mod migrate;
pub mod process;
pub mod status;
pub mod username;

use rostersync_engine::client::FleetClient;

use crate::config::Config;
use crate::error::{CliError, CliResult};

/// Load the environment configuration and build a directory client.
pub(crate) fn load_context() -> CliResult<(Config, FleetClient)> {
    let config = Config::from_env().map_err(|e| CliError::Config(e.to_string()))?;
    let client = FleetClient::new(config.fleet_client_config())?;
    Ok((config, client))
}
