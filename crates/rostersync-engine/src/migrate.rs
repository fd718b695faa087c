//! External-identifier backfill and coverage verification.
//!
//! A directory populated before stable identifiers existed has drivers
//! addressable only by name. The backfill walks every driver, derives an
//! identifier from whatever hire date it can recover, and attaches it.
//! Hire dates come from payroll reports, a manual CSV, or the
//! `Hire Date: MM-DD-YYYY` convention in driver notes.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::directory::{DriverDirectory, DriverRef};
use crate::error::{SyncError, SyncResult};
use crate::external_id::{ExternalId, DATE_FORMAT, EXTERNAL_ID_KEY};
use crate::model::{ActivationStatus, PayrollRecord, RemoteDriver};
use crate::reconcile::RunMode;
use crate::retry::RetryPolicy;

static HIRE_DATE_IN_NOTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Hire Date:\s*(\d{2}-\d{2}-\d{4})").expect("hire-date pattern is valid")
});

/// Pull a `Hire Date: MM-DD-YYYY` marker out of driver notes.
pub fn extract_hire_date_from_notes(notes: &str) -> Option<NaiveDate> {
    let captures = HIRE_DATE_IN_NOTES.captures(notes)?;
    NaiveDate::parse_from_str(captures.get(1)?.as_str(), DATE_FORMAT).ok()
}

/// Name-keyed hire dates assembled from reports and manual CSVs.
#[derive(Debug, Clone, Default)]
pub struct HireDateSource {
    dates: HashMap<String, NaiveDate>,
}

impl HireDateSource {
    pub fn new() -> Self {
        HireDateSource::default()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Record a hire date. The first date seen for a name wins; a
    /// conflicting later one is logged and dropped.
    pub fn insert(&mut self, first_name: &str, last_name: &str, hire_date: NaiveDate) {
        let key = name_key(first_name, last_name);
        if key.is_empty() {
            return;
        }
        match self.dates.get(&key) {
            Some(existing) if *existing != hire_date => {
                warn!(
                    first_name,
                    last_name,
                    kept = %existing.format(DATE_FORMAT),
                    dropped = %hire_date.format(DATE_FORMAT),
                    "conflicting hire dates for name, keeping the first"
                );
            }
            Some(_) => {}
            None => {
                self.dates.insert(key, hire_date);
            }
        }
    }

    /// Absorb every report record that carries a hire date.
    pub fn add_records(&mut self, records: &[PayrollRecord]) {
        for record in records {
            if let Some(hire_date) = record.hire_date {
                self.insert(&record.first_name, &record.last_name, hire_date);
            }
        }
    }

    /// Absorb a manual `name,hire_date` CSV. Returns how many rows were
    /// usable.
    pub fn add_manual_csv(&mut self, data: &[u8]) -> SyncResult<usize> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data);
        let headers = reader.headers().map_err(SyncError::from)?.clone();
        let name_idx = headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case("name"))
            .unwrap_or(0);
        let date_idx = headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case("hire_date"))
            .unwrap_or(1);

        let mut added = 0;
        for result in reader.records() {
            let record = result?;
            let name = record.get(name_idx).map(str::trim).unwrap_or("");
            let raw_date = record.get(date_idx).map(str::trim).unwrap_or("");
            let Some((first_name, last_name)) = split_display_name(name) else {
                continue;
            };
            let Some(hire_date) = crate::report::parse_date(raw_date) else {
                warn!(name, raw_date, "manual row has no parseable hire date");
                continue;
            };
            self.insert(&first_name, &last_name, hire_date);
            added += 1;
        }
        Ok(added)
    }

    /// Hire date for a directory display name, trying both name orders.
    pub fn lookup(&self, display_name: &str) -> Option<NaiveDate> {
        let (first_name, last_name) = split_display_name(display_name)?;
        self.dates
            .get(&name_key(&first_name, &last_name))
            .or_else(|| self.dates.get(&name_key(&last_name, &first_name)))
            .copied()
    }
}

fn name_key(first_name: &str, last_name: &str) -> String {
    let first = crate::external_id::sanitize_name(first_name).to_lowercase();
    let last = crate::external_id::sanitize_name(last_name).to_lowercase();
    if first.is_empty() || last.is_empty() {
        return String::new();
    }
    format!("{first}:{last}")
}

/// Split a directory display name into (first, last). `Last, First` and
/// `First Last` are both understood; multi-word last names stay together.
fn split_display_name(name: &str) -> Option<(String, String)> {
    if let Some((last, first)) = name.split_once(',') {
        let first = first.trim();
        let last = last.trim();
        if first.is_empty() || last.is_empty() {
            return None;
        }
        return Some((first.to_string(), last.to_string()));
    }
    let mut parts = name.split_whitespace();
    let first = parts.next()?;
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() {
        return None;
    }
    Some((first.to_string(), rest.join(" ")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillAction {
    Backfilled,
    SkippedNoHireDate,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillOutcome {
    pub driver_id: String,
    pub name: String,
    pub action: BackfillAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// What one backfill pass did. Drivers that already carried an identifier
/// are only counted; everything else gets an outcome row.
#[derive(Debug, Default, Serialize)]
pub struct BackfillReport {
    pub scanned: usize,
    pub already_present: usize,
    pub backfilled: usize,
    pub skipped_no_hire_date: usize,
    pub failed: usize,
    pub outcomes: Vec<BackfillOutcome>,
}

impl BackfillReport {
    fn record(&mut self, outcome: BackfillOutcome) {
        match outcome.action {
            BackfillAction::Backfilled => self.backfilled += 1,
            BackfillAction::SkippedNoHireDate => self.skipped_no_hire_date += 1,
            BackfillAction::Failed => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Walks the directory and attaches identifiers.
pub struct BackfillEngine<'a, D: DriverDirectory> {
    directory: &'a D,
    retry: RetryPolicy,
    mode: RunMode,
}

impl<'a, D: DriverDirectory> BackfillEngine<'a, D> {
    pub fn new(directory: &'a D, mode: RunMode) -> Self {
        BackfillEngine {
            directory,
            retry: RetryPolicy::default(),
            mode,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// One pass over every driver. A driver that fails is recorded and
    /// the scan keeps going; only the initial listing can abort the run.
    pub async fn backfill(&self, hire_dates: &HireDateSource) -> SyncResult<BackfillReport> {
        let drivers = self.directory.list_all().await?;
        info!(
            drivers = drivers.len(),
            known_hire_dates = hire_dates.len(),
            dry_run = self.mode.is_dry_run(),
            "starting identifier backfill"
        );

        let mut report = BackfillReport::default();
        for driver in drivers {
            report.scanned += 1;
            if driver.has_external_id(EXTERNAL_ID_KEY) {
                report.already_present += 1;
                continue;
            }
            let outcome = self.backfill_driver(&driver, hire_dates).await;
            report.record(outcome);
        }

        info!(
            scanned = report.scanned,
            already_present = report.already_present,
            backfilled = report.backfilled,
            skipped = report.skipped_no_hire_date,
            failed = report.failed,
            "identifier backfill complete"
        );
        Ok(report)
    }

    async fn backfill_driver(
        &self,
        driver: &RemoteDriver,
        hire_dates: &HireDateSource,
    ) -> BackfillOutcome {
        let hire_date = hire_dates.lookup(&driver.name).or_else(|| {
            driver
                .notes
                .as_deref()
                .and_then(extract_hire_date_from_notes)
        });
        let Some(hire_date) = hire_date else {
            debug!(driver_id = %driver.id, name = %driver.name, "no hire date recoverable");
            return BackfillOutcome {
                driver_id: driver.id.clone(),
                name: driver.name.clone(),
                action: BackfillAction::SkippedNoHireDate,
                detail: None,
            };
        };

        let Some((first_name, last_name)) = split_display_name(&driver.name) else {
            return BackfillOutcome {
                driver_id: driver.id.clone(),
                name: driver.name.clone(),
                action: BackfillAction::Failed,
                detail: Some("display name cannot be split into first and last".to_string()),
            };
        };
        let external_id = match ExternalId::encode(&first_name, &last_name, hire_date) {
            Ok(id) => id,
            Err(e) => {
                return BackfillOutcome {
                    driver_id: driver.id.clone(),
                    name: driver.name.clone(),
                    action: BackfillAction::Failed,
                    detail: Some(e.to_string()),
                };
            }
        };

        if self.mode.is_dry_run() {
            info!(driver_id = %driver.id, external_id = %external_id, "[dry-run] would add external id");
            return BackfillOutcome {
                driver_id: driver.id.clone(),
                name: driver.name.clone(),
                action: BackfillAction::Backfilled,
                detail: Some(format!("would add {external_id}")),
            };
        }

        let directory = self.directory;
        let reference = DriverRef::id(&driver.id);
        match self
            .retry
            .execute("add_external_id", || {
                let reference = reference.clone();
                let external_id = external_id.clone();
                async move { directory.add_external_id(&reference, &external_id).await }
            })
            .await
        {
            Ok(_) => {
                info!(driver_id = %driver.id, external_id = %external_id, "added external id");
                BackfillOutcome {
                    driver_id: driver.id.clone(),
                    name: driver.name.clone(),
                    action: BackfillAction::Backfilled,
                    detail: Some(external_id.qualified()),
                }
            }
            Err(e) => BackfillOutcome {
                driver_id: driver.id.clone(),
                name: driver.name.clone(),
                action: BackfillAction::Failed,
                detail: Some(e.to_string()),
            },
        }
    }
}

/// A driver still missing the stable identifier.
#[derive(Debug, Clone, Serialize)]
pub struct MissingDriver {
    pub driver_id: String,
    pub name: String,
    pub status: ActivationStatus,
}

/// Identifier coverage across the directory.
#[derive(Debug, Default, Serialize)]
pub struct CoverageReport {
    pub total: usize,
    pub with_external_id: usize,
    pub missing: Vec<MissingDriver>,
}

impl CoverageReport {
    pub fn coverage_percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.with_external_id as f64 * 100.0 / self.total as f64
        }
    }
}

/// Read-only coverage report over the whole directory.
pub async fn verify_coverage<D: DriverDirectory>(directory: &D) -> SyncResult<CoverageReport> {
    let drivers = directory.list_all().await?;
    Ok(coverage_from_drivers(&drivers))
}

fn coverage_from_drivers(drivers: &[RemoteDriver]) -> CoverageReport {
    let mut report = CoverageReport {
        total: drivers.len(),
        ..CoverageReport::default()
    };
    for driver in drivers {
        if driver.has_external_id(EXTERNAL_ID_KEY) {
            report.with_external_id += 1;
        } else {
            report.missing.push(MissingDriver {
                driver_id: driver.id.clone(),
                name: driver.name.clone(),
                status: driver.driver_activation_status,
            });
        }
    }
    report
}

/// Result of attaching an identifier to a single name-resolved driver.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssignResult {
    Assigned { driver_id: String, external_id: String },
    WouldAssign { driver_id: String, external_id: String },
    AlreadyPresent { driver_id: String, existing: String },
    NotFound,
    Ambiguous { count: usize },
}

/// Resolve one name and attach the identifier derived from `hire_date`.
/// Refuses to touch a driver that already carries one.
pub async fn assign_external_id<D: DriverDirectory>(
    directory: &D,
    first_name: &str,
    last_name: &str,
    hire_date: NaiveDate,
    mode: RunMode,
) -> SyncResult<AssignResult> {
    let mut candidates = directory.find_by_name(first_name, last_name).await?;
    match candidates.len() {
        0 => Ok(AssignResult::NotFound),
        1 => {
            let driver = candidates.remove(0);
            if let Some(existing) = driver.external_id(EXTERNAL_ID_KEY) {
                let existing = existing.to_string();
                return Ok(AssignResult::AlreadyPresent {
                    driver_id: driver.id,
                    existing,
                });
            }
            let external_id = ExternalId::encode(first_name, last_name, hire_date)?;
            if mode.is_dry_run() {
                return Ok(AssignResult::WouldAssign {
                    driver_id: driver.id,
                    external_id: external_id.qualified(),
                });
            }
            directory
                .add_external_id(&DriverRef::id(&driver.id), &external_id)
                .await?;
            info!(driver_id = %driver.id, external_id = %external_id, "assigned external id");
            Ok(AssignResult::Assigned {
                driver_id: driver.id,
                external_id: external_id.qualified(),
            })
        }
        count => Ok(AssignResult::Ambiguous { count }),
    }
}
