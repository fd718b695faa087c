//! Deactivate command - reconcile a termination report against the directory

use std::path::PathBuf;

use clap::Args;
use rostersync_engine::reconcile::{ReconcileOptions, Reconciler};
use rostersync_engine::report::{read_report, ReportKind};

use crate::commands::add::{finish, report_issues, run_mode};
use crate::commands::load_context;
use crate::error::CliResult;
use crate::output::print_run_summary;
use crate::reports::latest_report;

/// Arguments for the deactivate command
#[derive(Args)]
pub struct DeactivateArgs {
    /// Termination report CSV; defaults to the newest file in the
    /// terminations directory
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Decide everything but change nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Disable name matching for rows with no hire date
    #[arg(long)]
    pub no_fallback: bool,

    /// Output the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the deactivate command
pub async fn execute(args: DeactivateArgs) -> CliResult<()> {
    let (config, client) = load_context()?;
    let mode = run_mode(args.dry_run);

    let report_path = match args.file {
        Some(path) => path,
        None => latest_report(&config.terms_dir)?,
    };
    let parsed = read_report(&report_path, ReportKind::Terminations)?;
    report_issues(&parsed);

    let options = ReconcileOptions {
        mode,
        update_existing: false,
        allow_name_fallback: !args.no_fallback,
    };
    let summary = Reconciler::new(&client, options)
        .run_terminations(&parsed.records)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_run_summary("Termination run", &summary, mode.is_dry_run());
    }
    finish(summary)
}
