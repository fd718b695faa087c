//! Terminal output helpers for consistent CLI formatting

use rostersync_engine::reconcile::{RecordAction, RunSummary};

/// Check if color output is enabled
fn use_color() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Print a success message (green checkmark)
pub fn print_success(message: &str) {
    if use_color() {
        println!("\x1b[32m✓\x1b[0m {message}");
    } else {
        println!("OK: {message}");
    }
}

/// Print a warning message (yellow)
pub fn print_warning(message: &str) {
    if use_color() {
        eprintln!("\x1b[33mWarning:\x1b[0m {message}");
    } else {
        eprintln!("Warning: {message}");
    }
}

/// Print a key-value pair with consistent formatting
pub fn print_key_value(key: &str, value: &str) {
    if use_color() {
        println!("  \x1b[1m{key}:\x1b[0m {value}");
    } else {
        println!("  {key}: {value}");
    }
}

/// Print a batch run summary: counters, then the outcomes that need a
/// human (failures, ambiguities, drivers not found).
pub fn print_run_summary(title: &str, summary: &RunSummary, dry_run: bool) {
    println!();
    if dry_run {
        println!("{title} (dry run, nothing was changed)");
    } else {
        println!("{title}");
    }
    print_key_value("Records", &summary.total.to_string());
    for (label, count) in [
        ("Created", summary.created),
        ("Updated", summary.updated),
        ("Reactivated", summary.reactivated),
        ("Deactivated", summary.deactivated),
        ("Already inactive", summary.already_inactive),
        ("Skipped", summary.skipped),
        ("Not found", summary.not_found),
        ("Manual review", summary.manual_review),
        ("Failed", summary.failed),
    ] {
        if count > 0 {
            print_key_value(label, &count.to_string());
        }
    }
    if summary.fallback_matches > 0 {
        print_key_value("Matched by name fallback", &summary.fallback_matches.to_string());
    }

    let mut attention = summary.attention_outcomes().peekable();
    if attention.peek().is_some() {
        println!();
        println!("Needs attention:");
        for outcome in attention {
            let marker = match outcome.action {
                RecordAction::Failed => "FAILED",
                RecordAction::ManualReview => "MANUAL",
                _ => "MISSING",
            };
            match &outcome.detail {
                Some(detail) => println!("  [{marker}] {} - {detail}", outcome.name),
                None => println!("  [{marker}] {}", outcome.name),
            }
        }
    }
    println!();
}
