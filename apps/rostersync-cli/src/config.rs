//! Environment-driven configuration.
//!
//! Loaded once at command start, after `dotenvy::dotenv()`. Required
//! variables fail fast with a clear message; everything else has a
//! sensible default.

use std::env;
use std::fmt;
use std::path::PathBuf;

use rostersync_engine::client::FleetClientConfig;
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HIRES_DIR: &str = "reports/hires";
const DEFAULT_TERMS_DIR: &str = "reports/terminations";
const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {detail}")]
    InvalidValue { var: &'static str, detail: String },
}

#[derive(Clone)]
pub struct Config {
    pub api_token: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub hires_dir: PathBuf,
    pub terms_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Required the moment an execute-mode hire run would create drivers.
    pub default_password: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_token", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("hires_dir", &self.hires_dir)
            .field("terms_dir", &self.terms_dir)
            .field("data_dir", &self.data_dir)
            .field(
                "default_password",
                &self.default_password.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |var: &'static str| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingVar(var))
        };

        let timeout_secs = match lookup("FLEET_API_TIMEOUT_SECS") {
            None => DEFAULT_TIMEOUT_SECS,
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    var: "FLEET_API_TIMEOUT_SECS",
                    detail: e.to_string(),
                })?,
        };

        let dir = |var: &str, default: &str| {
            PathBuf::from(
                lookup(var)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
                    .unwrap_or_else(|| default.to_string()),
            )
        };

        Ok(Config {
            api_token: required("FLEET_API_TOKEN")?,
            base_url: required("FLEET_API_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            timeout_secs,
            hires_dir: dir("ROSTERSYNC_HIRES_DIR", DEFAULT_HIRES_DIR),
            terms_dir: dir("ROSTERSYNC_TERMS_DIR", DEFAULT_TERMS_DIR),
            data_dir: dir("ROSTERSYNC_DATA_DIR", DEFAULT_DATA_DIR),
            default_password: lookup("ROSTERSYNC_DEFAULT_PASSWORD")
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        })
    }

    pub fn fleet_client_config(&self) -> FleetClientConfig {
        FleetClientConfig {
            base_url: self.base_url.clone(),
            api_token: self.api_token.clone(),
            timeout_secs: self.timeout_secs,
        }
    }

    pub fn username_store_path(&self) -> PathBuf {
        self.data_dir.join("usernames.csv")
    }
}
