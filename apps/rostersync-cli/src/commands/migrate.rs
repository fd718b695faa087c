//! Migrate command - retrofit external identifiers onto existing drivers

use std::fs;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use rostersync_engine::migrate::{
    assign_external_id, verify_coverage, AssignResult, BackfillEngine, HireDateSource,
};
use rostersync_engine::report::{parse_date, read_report, ReportKind};

use crate::commands::add::run_mode;
use crate::commands::load_context;
use crate::error::{CliError, CliResult};
use crate::output::{print_key_value, print_success, print_warning};

/// Arguments for the migrate command
#[derive(Args)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub command: MigrateCommand,
}

#[derive(Subcommand)]
pub enum MigrateCommand {
    /// Attach identifiers to every driver missing one
    Backfill(BackfillArgs),

    /// Report identifier coverage without changing anything
    Verify(VerifyArgs),

    /// Attach an identifier to one name-resolved driver
    Assign(AssignArgs),
}

#[derive(Args)]
pub struct BackfillArgs {
    /// Perform the mutations; default is a dry run
    #[arg(long)]
    pub execute: bool,

    /// Hire report CSV to source hire dates from
    #[arg(long)]
    pub hire_report: Option<PathBuf>,

    /// Manual `name,hire_date` CSV for drivers no report covers
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Output the backfill report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Output the coverage report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct AssignArgs {
    /// First name as payroll spells it
    #[arg(long)]
    pub first: String,

    /// Last name as payroll spells it
    #[arg(long)]
    pub last: String,

    /// Hire date (MM-DD-YYYY) the identifier is derived from
    #[arg(long)]
    pub hire_date: String,

    /// Perform the mutation; default is a dry run
    #[arg(long)]
    pub execute: bool,
}

/// Execute the migrate command
pub async fn execute(args: MigrateArgs) -> CliResult<()> {
    match args.command {
        MigrateCommand::Backfill(args) => backfill(args).await,
        MigrateCommand::Verify(args) => verify(args).await,
        MigrateCommand::Assign(args) => assign(args).await,
    }
}

async fn backfill(args: BackfillArgs) -> CliResult<()> {
    let (_, client) = load_context()?;
    let mode = run_mode(!args.execute);

    let mut hire_dates = HireDateSource::new();
    if let Some(path) = &args.hire_report {
        let parsed = read_report(path, ReportKind::Hires)?;
        hire_dates.add_records(&parsed.records);
    }
    if let Some(path) = &args.csv {
        let data = fs::read(path)?;
        let added = hire_dates.add_manual_csv(&data)?;
        print_success(&format!("{added} manual hire date(s) loaded"));
    }

    let report = BackfillEngine::new(&client, mode)
        .backfill(&hire_dates)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        if mode.is_dry_run() {
            println!("Identifier backfill (dry run, nothing was changed)");
        } else {
            println!("Identifier backfill");
        }
        print_key_value("Drivers scanned", &report.scanned.to_string());
        print_key_value("Already present", &report.already_present.to_string());
        print_key_value("Backfilled", &report.backfilled.to_string());
        print_key_value("No hire date", &report.skipped_no_hire_date.to_string());
        print_key_value("Failed", &report.failed.to_string());
        println!();
    }

    if report.has_failures() {
        Err(CliError::BatchFailed {
            failed: report.failed,
        })
    } else {
        Ok(())
    }
}

async fn verify(args: VerifyArgs) -> CliResult<()> {
    let (_, client) = load_context()?;
    let report = verify_coverage(&client).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    print_key_value("Drivers", &report.total.to_string());
    print_key_value("With identifier", &report.with_external_id.to_string());
    print_key_value("Coverage", &format!("{:.1}%", report.coverage_percent()));
    if !report.missing.is_empty() {
        println!();
        println!("Still missing an identifier:");
        for driver in &report.missing {
            println!("  {} - {} ({})", driver.driver_id, driver.name, driver.status);
        }
    }
    println!();
    Ok(())
}

async fn assign(args: AssignArgs) -> CliResult<()> {
    let (_, client) = load_context()?;
    let mode = run_mode(!args.execute);
    let hire_date = parse_date(&args.hire_date)
        .ok_or_else(|| CliError::Validation(format!("unparseable hire date '{}'", args.hire_date)))?;

    let result = assign_external_id(&client, &args.first, &args.last, hire_date, mode).await?;
    match result {
        AssignResult::Assigned {
            driver_id,
            external_id,
        } => print_success(&format!("driver {driver_id} now carries {external_id}")),
        AssignResult::WouldAssign {
            driver_id,
            external_id,
        } => print_success(&format!(
            "[dry-run] driver {driver_id} would receive {external_id}"
        )),
        AssignResult::AlreadyPresent {
            driver_id,
            existing,
        } => print_warning(&format!(
            "driver {driver_id} already carries {existing}; refusing to overwrite"
        )),
        AssignResult::NotFound => {
            return Err(CliError::Validation(format!(
                "no driver named {} {}",
                args.first, args.last
            )))
        }
        AssignResult::Ambiguous { count } => {
            return Err(CliError::Validation(format!(
                "{count} drivers share the name {} {}; resolve manually",
                args.first, args.last
            )))
        }
    }
    Ok(())
}
