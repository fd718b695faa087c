//! Add command - reconcile a new-hire report against the directory

use std::path::PathBuf;

use clap::Args;
use rostersync_engine::mappings::TagMappings;
use rostersync_engine::reconcile::{
    DriverDefaults, ReconcileOptions, Reconciler, RunMode, RunSummary,
};
use rostersync_engine::report::{read_report, ReportKind, ReportParseResult};
use rostersync_engine::store::UsernameStore;
use rostersync_engine::sync::sync_from_directory;

use crate::commands::load_context;
use crate::config::Config;
use crate::error::{CliError, CliResult};
use crate::output::{print_run_summary, print_success, print_warning};
use crate::reports::latest_report;

/// Arguments for the add command
#[derive(Args)]
pub struct AddArgs {
    /// Hire report CSV; defaults to the newest file in the hires directory
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Decide everything but change nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Patch and reactivate drivers that already exist
    #[arg(long)]
    pub update: bool,

    /// Pull directory usernames into the registry before allocating
    #[arg(long)]
    pub sync_usernames: bool,

    /// Output the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the add command
pub async fn execute(args: AddArgs) -> CliResult<()> {
    let (config, client) = load_context()?;
    let mode = run_mode(args.dry_run);

    let password = default_password(&config, mode)?;
    let report_path = match args.file {
        Some(path) => path,
        None => latest_report(&config.hires_dir)?,
    };
    let parsed = read_report(&report_path, ReportKind::Hires)?;
    report_issues(&parsed);

    let mappings = TagMappings::load_from_dir(&config.data_dir)?;
    let store = UsernameStore::new(config.username_store_path());
    let mut registry = store.load()?;
    if args.sync_usernames {
        let sync = sync_from_directory(&client, &mut registry).await?;
        print_success(&format!(
            "username registry synced: {} imported, {} already known",
            sync.imported, sync.already_known
        ));
    }

    let options = ReconcileOptions {
        mode,
        update_existing: args.update,
        allow_name_fallback: true,
    };
    let defaults = DriverDefaults::new(password);
    let summary = Reconciler::new(&client, options)
        .run_additions(&parsed.records, &mut registry, &mappings, &defaults)
        .await;

    if !mode.is_dry_run() {
        store.save(&registry)?;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_run_summary("Hire run", &summary, mode.is_dry_run());
    }
    finish(summary)
}

pub(crate) fn run_mode(dry_run: bool) -> RunMode {
    if dry_run {
        RunMode::DryRun
    } else {
        RunMode::Execute
    }
}

/// The default password is only needed when creates will actually run;
/// dry-run previews work without one.
pub(crate) fn default_password(config: &Config, mode: RunMode) -> CliResult<String> {
    match (&config.default_password, mode) {
        (Some(password), _) => Ok(password.clone()),
        (None, RunMode::DryRun) => Ok(String::new()),
        (None, RunMode::Execute) => Err(CliError::Config(
            "ROSTERSYNC_DEFAULT_PASSWORD is required to create drivers".to_string(),
        )),
    }
}

pub(crate) fn report_issues(parsed: &ReportParseResult) {
    for issue in &parsed.issues {
        print_warning(&format!("line {}: {}", issue.line_number, issue.message));
    }
    if parsed.skipped_inactive > 0 {
        print_warning(&format!(
            "{} non-active row(s) skipped",
            parsed.skipped_inactive
        ));
    }
}

pub(crate) fn finish(summary: RunSummary) -> CliResult<()> {
    if summary.has_failures() {
        Err(CliError::BatchFailed {
            failed: summary.failed,
        })
    } else {
        Ok(())
    }
}
