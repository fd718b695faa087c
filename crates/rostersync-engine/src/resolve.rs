//! Identity resolution: one payroll identity against the directory.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::directory::DriverDirectory;
use crate::error::SyncResult;
use crate::external_id::ExternalId;
use crate::model::RemoteDriver;

/// Outcome of one resolution attempt. Consumed immediately by the caller,
/// never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "matched", rename_all = "snake_case")]
pub enum MatchResult {
    /// Stable-identifier lookup hit.
    Found(RemoteDriver),
    /// An identifier was derivable but the directory does not know it.
    /// Name fallback is deliberately not attempted here: stable
    /// identifiers take precedence over name heuristics.
    NotFoundById,
    /// No identifier was derivable and exactly one driver matched by name.
    FoundByNameFallback(RemoteDriver),
    /// No identifier was derivable and several drivers matched by name.
    /// Left for a human; the engine never picks one.
    AmbiguousNameFallback(Vec<RemoteDriver>),
    /// Nothing matched.
    NotFound,
}

impl MatchResult {
    /// The matched driver, when the match is unambiguous.
    pub fn driver(&self) -> Option<&RemoteDriver> {
        match self {
            MatchResult::Found(driver) | MatchResult::FoundByNameFallback(driver) => Some(driver),
            _ => None,
        }
    }

    pub fn via_fallback(&self) -> bool {
        matches!(self, MatchResult::FoundByNameFallback(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            MatchResult::Found(_) => "matched by external id",
            MatchResult::NotFoundById => "identifier unknown to the directory",
            MatchResult::FoundByNameFallback(_) => "matched by name fallback",
            MatchResult::AmbiguousNameFallback(_) => "ambiguous name match",
            MatchResult::NotFound => "no match",
        }
    }
}

/// Resolution engine. Identifier lookup always runs first; the name
/// fallback only exists for records that cannot derive an identifier.
pub struct Resolver<'a, D: DriverDirectory> {
    directory: &'a D,
    fallback_enabled: bool,
}

impl<'a, D: DriverDirectory> Resolver<'a, D> {
    pub fn new(directory: &'a D) -> Self {
        Resolver {
            directory,
            fallback_enabled: true,
        }
    }

    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Resolve one payroll identity.
    ///
    /// With a hire date the stable identifier is derived and looked up;
    /// the answer is final whether or not it hits. Without one the name
    /// fallback runs, if enabled.
    pub async fn resolve(
        &self,
        first_name: &str,
        last_name: &str,
        hire_date: Option<NaiveDate>,
    ) -> SyncResult<MatchResult> {
        if let Some(date) = hire_date {
            let id = ExternalId::encode(first_name, last_name, date)?;
            return match self.directory.find_by_external_id(&id).await? {
                Some(driver) => {
                    debug!(external_id = %id, driver_id = %driver.id, "resolved by external id");
                    Ok(MatchResult::Found(driver))
                }
                None => Ok(MatchResult::NotFoundById),
            };
        }

        if !self.fallback_enabled {
            debug!(
                first_name,
                last_name, "no hire date and fallback disabled, skipping name search"
            );
            return Ok(MatchResult::NotFound);
        }

        let mut candidates = self.directory.find_by_name(first_name, last_name).await?;
        match candidates.len() {
            0 => Ok(MatchResult::NotFound),
            1 => {
                let driver = candidates.remove(0);
                info!(
                    driver_id = %driver.id,
                    name = %driver.name,
                    "matched by name fallback"
                );
                Ok(MatchResult::FoundByNameFallback(driver))
            }
            count => {
                info!(count, first_name, last_name, "ambiguous name match");
                Ok(MatchResult::AmbiguousNameFallback(candidates))
            }
        }
    }
}
