//! Check command - resolve one name against the directory, read-only

use clap::Args;
use rostersync_engine::report::parse_date;
use rostersync_engine::resolve::{MatchResult, Resolver};

use crate::commands::load_context;
use crate::error::{CliError, CliResult};
use crate::output::print_key_value;

/// Arguments for the check command
#[derive(Args)]
pub struct CheckArgs {
    /// First name as payroll spells it
    #[arg(long)]
    pub first: String,

    /// Last name as payroll spells it
    #[arg(long)]
    pub last: String,

    /// Hire date (MM-DD-YYYY); with one, resolution uses the stable
    /// identifier, without one the name fallback
    #[arg(long)]
    pub hire_date: Option<String>,

    /// Disable the name fallback
    #[arg(long)]
    pub no_fallback: bool,

    /// Output the match result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the check command
pub async fn execute(args: CheckArgs) -> CliResult<()> {
    let (_, client) = load_context()?;

    let hire_date = match args.hire_date.as_deref() {
        None => None,
        Some(raw) => Some(parse_date(raw).ok_or_else(|| {
            CliError::Validation(format!("unparseable hire date '{raw}'"))
        })?),
    };

    let result = Resolver::new(&client)
        .with_fallback(!args.no_fallback)
        .resolve(&args.first, &args.last, hire_date)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!("{} {}: {}", args.first, args.last, result.label());
    match &result {
        MatchResult::Found(driver) | MatchResult::FoundByNameFallback(driver) => {
            print_key_value("Driver id", &driver.id);
            print_key_value("Name", &driver.name);
            if let Some(username) = &driver.username {
                print_key_value("Username", username);
            }
            print_key_value("Status", &driver.driver_activation_status.to_string());
            for (key, value) in &driver.external_ids {
                print_key_value(&format!("External id [{key}]"), value);
            }
        }
        MatchResult::AmbiguousNameFallback(candidates) => {
            for candidate in candidates {
                print_key_value(&candidate.id, &candidate.name);
            }
            println!("  Resolve manually; the engine never picks among candidates.");
        }
        MatchResult::NotFoundById | MatchResult::NotFound => {}
    }
    println!();
    Ok(())
}
