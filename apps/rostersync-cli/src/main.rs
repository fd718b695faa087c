//! rostersync CLI - payroll roster to fleet driver registry reconciliation
//!
//! This CLI enables operators to:
//! - Apply hire and termination reports against the driver directory
//! - Preview every change with --dry-run before executing it
//! - Resolve a single name to a driver record
//! - Backfill stable external identifiers onto legacy drivers
//! - Inspect and sync the local username registry

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod error;
mod output;
mod reports;

use error::CliResult;

/// rostersync CLI - payroll to fleet reconciliation
#[derive(Parser)]
#[command(name = "rostersync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Raise log verbosity to debug
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a new-hire report against the directory
    Add(commands::add::AddArgs),

    /// Reconcile a termination report against the directory
    Deactivate(commands::deactivate::DeactivateArgs),

    /// Run terminations, sync usernames, then hires in one cycle
    Process(commands::process::ProcessArgs),

    /// Resolve one name against the directory without changing anything
    Check(commands::check::CheckArgs),

    /// Retrofit external identifiers onto existing drivers
    Migrate(commands::migrate::MigrateArgs),

    /// Inspect and sync the local username registry
    Username(commands::username::UsernameArgs),

    /// Show configuration and directory connectivity
    Status(commands::status::StatusArgs),
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "debug,rostersync_engine=debug"
    } else {
        "info,rostersync_engine=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Add(args) => commands::add::execute(args).await,
        Commands::Deactivate(args) => commands::deactivate::execute(args).await,
        Commands::Process(args) => commands::process::execute(args).await,
        Commands::Check(args) => commands::check::execute(args).await,
        Commands::Migrate(args) => commands::migrate::execute(args).await,
        Commands::Username(args) => commands::username::execute(args).await,
        Commands::Status(args) => commands::status::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn add_flags_parse() {
        let cli = Cli::parse_from([
            "rostersync",
            "add",
            "--dry-run",
            "--update",
            "--sync-usernames",
        ]);
        let Commands::Add(args) = cli.command else {
            panic!("expected add");
        };
        assert!(args.dry_run);
        assert!(args.update);
        assert!(args.sync_usernames);
        assert!(args.file.is_none());
    }

    #[test]
    fn check_requires_a_name() {
        let result = Cli::try_parse_from(["rostersync", "check", "--first", "John"]);
        assert!(result.is_err());

        let cli = Cli::parse_from([
            "rostersync",
            "check",
            "--first",
            "John",
            "--last",
            "Smith",
            "--hire-date",
            "01-15-2024",
        ]);
        let Commands::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.hire_date.as_deref(), Some("01-15-2024"));
        assert!(!args.no_fallback);
    }

    #[test]
    fn migrate_subcommands_parse() {
        let cli = Cli::parse_from(["rostersync", "migrate", "backfill", "--execute"]);
        let Commands::Migrate(args) = cli.command else {
            panic!("expected migrate");
        };
        assert!(matches!(
            args.command,
            commands::migrate::MigrateCommand::Backfill(backfill) if backfill.execute
        ));
    }

    #[test]
    fn verbose_is_global() {
        let cli = Cli::parse_from(["rostersync", "status", "--verbose"]);
        assert!(cli.verbose);
    }
}
