//! CLI error types and exit codes

use rostersync_engine::SyncError;
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General error (including batches with failed records)
/// - 2: Authentication failed
/// - 3: Network error
/// - 4: Validation or configuration error
/// - 5: Server error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Directory error: {0}")]
    Server(String),

    #[error("No report found: {0}")]
    NoReport(String),

    #[error("{failed} record(s) failed; review the run output above")]
    BatchFailed { failed: usize },

    #[error("I/O error: {0}")]
    Io(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Auth(_) => 2,
            CliError::Network(_) => 3,
            CliError::Validation(_) | CliError::Config(_) | CliError::NoReport(_) => 4,
            CliError::Server(_) => 5,
            CliError::BatchFailed { .. } | CliError::Io(_) => 1,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {self}");
        } else {
            eprintln!("Error: {self}");
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {suggestion}");
            } else {
                eprintln!("\nSuggestion: {suggestion}");
            }
        }
    }

    /// Get a suggested action for this error
    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Auth(_) => Some("Check that FLEET_API_TOKEN is current."),
            CliError::Network(_) => Some("Check your network connection and try again."),
            CliError::Config(_) => {
                Some("Set the missing variable in the environment or a .env file.")
            }
            CliError::NoReport(_) => {
                Some("Drop a report CSV into the configured directory or pass --file.")
            }
            _ => None,
        }
    }
}

impl From<SyncError> for CliError {
    fn from(e: SyncError) -> Self {
        match &e {
            SyncError::Auth(_) => CliError::Auth(e.to_string()),
            SyncError::Network { .. } | SyncError::Timeout(_) | SyncError::RateLimited { .. } => {
                CliError::Network(e.to_string())
            }
            SyncError::InvalidInput(_) | SyncError::InvalidConfig(_) => {
                CliError::Validation(e.to_string())
            }
            SyncError::Api { status, .. } if *status >= 500 => CliError::Server(e.to_string()),
            SyncError::Api { .. }
            | SyncError::NotFound(_)
            | SyncError::RegistryExhausted { .. } => CliError::Validation(e.to_string()),
            SyncError::MaxRetriesExceeded { .. } => CliError::Network(e.to_string()),
            SyncError::Io(_) | SyncError::Csv(_) => CliError::Io(e.to_string()),
            SyncError::Parse(_) => CliError::Server(e.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Io(format!("JSON error: {e}"))
    }
}
