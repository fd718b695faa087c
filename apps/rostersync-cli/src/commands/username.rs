//! Username command - inspect and sync the local username registry

use clap::{Args, Subcommand};
use rostersync_engine::store::UsernameStore;
use rostersync_engine::sync::{registry_status, sync_from_directory};
use rostersync_engine::username::UsernameRegistry;

use crate::commands::load_context;
use crate::config::Config;
use crate::error::{CliError, CliResult};
use crate::output::{print_key_value, print_success};

/// Arguments for the username command
#[derive(Args)]
pub struct UsernameArgs {
    #[command(subcommand)]
    pub command: UsernameCommand,
}

#[derive(Subcommand)]
pub enum UsernameCommand {
    /// Compare the local registry against directory usernames
    Status(UsernameStatusArgs),

    /// Pull directory usernames into the local registry
    Sync(UsernameSyncArgs),

    /// Preview the username a name would receive
    Check(UsernameCheckArgs),
}

#[derive(Args)]
pub struct UsernameStatusArgs {
    /// Output the comparison as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct UsernameSyncArgs {
    /// Output the sync report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct UsernameCheckArgs {
    /// First name as payroll spells it
    #[arg(long)]
    pub first: String,

    /// Last name as payroll spells it
    #[arg(long)]
    pub last: String,
}

/// Execute the username command
pub async fn execute(args: UsernameArgs) -> CliResult<()> {
    match args.command {
        UsernameCommand::Status(args) => status(args).await,
        UsernameCommand::Sync(args) => sync(args).await,
        UsernameCommand::Check(args) => check(args),
    }
}

async fn status(args: UsernameStatusArgs) -> CliResult<()> {
    let (config, client) = load_context()?;
    let registry = load_registry(&config)?;
    let status = registry_status(&client, &registry).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    print_key_value("Registered locally", &status.local_total.to_string());
    print_key_value("In the directory", &status.remote_total.to_string());
    if status.in_sync() {
        print_success("registry and directory agree");
    } else {
        if !status.local_only.is_empty() {
            println!("  Local only: {}", status.local_only.join(", "));
        }
        if !status.remote_only.is_empty() {
            println!("  Directory only: {}", status.remote_only.join(", "));
            println!("  Run 'rostersync username sync' to import them.");
        }
    }
    println!();
    Ok(())
}

async fn sync(args: UsernameSyncArgs) -> CliResult<()> {
    let (config, client) = load_context()?;
    let store = UsernameStore::new(config.username_store_path());
    let mut registry = store.load()?;

    let report = sync_from_directory(&client, &mut registry).await?;
    store.save(&registry)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_success(&format!(
            "{} imported, {} already known, {} driver(s) without a username",
            report.imported, report.already_known, report.without_username
        ));
    }
    Ok(())
}

fn check(args: UsernameCheckArgs) -> CliResult<()> {
    let config = Config::from_env().map_err(|e| CliError::Config(e.to_string()))?;
    let registry = load_registry(&config)?;
    let username = registry.check(&args.first, &args.last)?;
    println!("{} {} would receive: {username}", args.first, args.last);
    Ok(())
}

fn load_registry(config: &Config) -> CliResult<UsernameRegistry> {
    Ok(UsernameStore::new(config.username_store_path()).load()?)
}
