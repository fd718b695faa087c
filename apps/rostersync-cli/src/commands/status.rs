//! Status command - configuration summary and directory connectivity

use clap::Args;
use serde::Serialize;
use rostersync_engine::client::HealthCheck;
use rostersync_engine::mappings::TagMappings;
use rostersync_engine::store::UsernameStore;

use crate::commands::load_context;
use crate::error::CliResult;
use crate::output::print_key_value;

/// Arguments for the status command
#[derive(Args)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output for status
#[derive(Serialize)]
struct StatusOutput {
    base_url: String,
    hires_dir: String,
    terms_dir: String,
    data_dir: String,
    registered_usernames: usize,
    position_mappings: usize,
    location_mappings: usize,
    excluded_positions: usize,
    directory: HealthCheck,
}

/// Execute the status command
pub async fn execute(args: StatusArgs) -> CliResult<()> {
    let (config, client) = load_context()?;

    let registry = UsernameStore::new(config.username_store_path()).load()?;
    let mappings = TagMappings::load_from_dir(&config.data_dir)?;
    let health = client.health_check().await;

    if args.json {
        let output = StatusOutput {
            base_url: config.base_url.clone(),
            hires_dir: config.hires_dir.display().to_string(),
            terms_dir: config.terms_dir.display().to_string(),
            data_dir: config.data_dir.display().to_string(),
            registered_usernames: registry.len(),
            position_mappings: mappings.position_count(),
            location_mappings: mappings.location_count(),
            excluded_positions: mappings.excluded_count(),
            directory: health,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("Configuration:");
    print_key_value("Directory API", &config.base_url);
    print_key_value("Hires directory", &config.hires_dir.display().to_string());
    print_key_value(
        "Terminations directory",
        &config.terms_dir.display().to_string(),
    );
    print_key_value("Data directory", &config.data_dir.display().to_string());
    println!();

    println!("Local data:");
    print_key_value("Registered usernames", &registry.len().to_string());
    print_key_value("Position mappings", &mappings.position_count().to_string());
    print_key_value("Location mappings", &mappings.location_count().to_string());
    print_key_value(
        "Excluded positions",
        &mappings.excluded_count().to_string(),
    );
    println!();

    println!("Directory:");
    let use_color = std::env::var("NO_COLOR").is_err();
    if health.healthy {
        if use_color {
            println!("  Status: \x1b[32mreachable\x1b[0m");
        } else {
            println!("  Status: reachable");
        }
    } else {
        if use_color {
            println!("  Status: \x1b[31munreachable\x1b[0m");
        } else {
            println!("  Status: unreachable");
        }
        if let Some(error) = &health.error {
            print_key_value("Error", error);
        }
    }
    println!();
    Ok(())
}
