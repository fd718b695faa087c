//! Process command - one full cycle: terminations, then hires
//!
//! Terminations run first so that a same-day replacement hire sees the
//! freed driver slot, and the registry sync between the two phases pulls
//! in any username the directory learned since the last run.

use clap::Args;
use serde::Serialize;
use rostersync_engine::mappings::TagMappings;
use rostersync_engine::reconcile::{
    DriverDefaults, ReconcileOptions, Reconciler, RunSummary,
};
use rostersync_engine::report::{read_report, ReportKind};
use rostersync_engine::store::UsernameStore;
use rostersync_engine::sync::sync_from_directory;

use crate::commands::add::{default_password, report_issues, run_mode};
use crate::commands::load_context;
use crate::error::{CliError, CliResult};
use crate::output::{print_run_summary, print_success};
use crate::reports::latest_report;

/// Arguments for the process command
#[derive(Args)]
pub struct ProcessArgs {
    /// Decide everything but change nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Patch and reactivate drivers that already exist
    #[arg(long)]
    pub update: bool,

    /// Output both run summaries as JSON
    #[arg(long)]
    pub json: bool,
}

/// Combined JSON output for a full cycle
#[derive(Serialize)]
struct ProcessOutput {
    terminations: RunSummary,
    hires: RunSummary,
}

/// Execute the process command
pub async fn execute(args: ProcessArgs) -> CliResult<()> {
    let (config, client) = load_context()?;
    let mode = run_mode(args.dry_run);
    let password = default_password(&config, mode)?;

    let terminations_path = latest_report(&config.terms_dir)?;
    let hires_path = latest_report(&config.hires_dir)?;
    let terminations = read_report(&terminations_path, ReportKind::Terminations)?;
    let hires = read_report(&hires_path, ReportKind::Hires)?;
    report_issues(&terminations);
    report_issues(&hires);

    let termination_options = ReconcileOptions {
        mode,
        update_existing: false,
        allow_name_fallback: true,
    };
    let termination_summary = Reconciler::new(&client, termination_options)
        .run_terminations(&terminations.records)
        .await;

    let mappings = TagMappings::load_from_dir(&config.data_dir)?;
    let store = UsernameStore::new(config.username_store_path());
    let mut registry = store.load()?;
    let sync = sync_from_directory(&client, &mut registry).await?;
    if !args.json {
        print_success(&format!(
            "username registry synced: {} imported, {} already known",
            sync.imported, sync.already_known
        ));
    }

    let hire_options = ReconcileOptions {
        mode,
        update_existing: args.update,
        allow_name_fallback: true,
    };
    let defaults = DriverDefaults::new(password);
    let hire_summary = Reconciler::new(&client, hire_options)
        .run_additions(&hires.records, &mut registry, &mappings, &defaults)
        .await;

    if !mode.is_dry_run() {
        store.save(&registry)?;
    }

    let failed = termination_summary.failed + hire_summary.failed;
    if args.json {
        let output = ProcessOutput {
            terminations: termination_summary,
            hires: hire_summary,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_run_summary("Termination run", &termination_summary, mode.is_dry_run());
        print_run_summary("Hire run", &hire_summary, mode.is_dry_run());
    }

    if failed > 0 {
        Err(CliError::BatchFailed { failed })
    } else {
        Ok(())
    }
}
