//! Batch reconciliation of payroll records against the remote directory.
//!
//! One record in, one [`RecordOutcome`] out. A record that fails is
//! reported and the batch keeps going; nothing a single record does can
//! abort the run.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use chrono::NaiveDate;

use crate::directory::{DriverDirectory, DriverRef};
use crate::error::{SyncError, SyncResult};
use crate::external_id::{ExternalId, DATE_FORMAT};
use crate::mappings::TagMappings;
use crate::migrate::extract_hire_date_from_notes;
use crate::model::{DriverCreatePayload, DriverPatch, PayrollRecord, RemoteDriver};
use crate::resolve::{MatchResult, Resolver};
use crate::retry::RetryPolicy;
use crate::username::UsernameRegistry;

/// Whether mutations are performed or only decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    DryRun,
    Execute,
}

impl RunMode {
    pub fn is_dry_run(self) -> bool {
        matches!(self, RunMode::DryRun)
    }
}

/// Reconciler knobs.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub mode: RunMode,
    /// Patch, and reactivate, drivers that already exist.
    pub update_existing: bool,
    /// Allow name-based matching for records with no derivable identifier.
    pub allow_name_fallback: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        ReconcileOptions {
            mode: RunMode::DryRun,
            update_existing: false,
            allow_name_fallback: true,
        }
    }
}

/// Fixed values applied to every created driver.
#[derive(Debug, Clone)]
pub struct DriverDefaults {
    pub password: String,
    pub locale: String,
    pub eld_exempt: bool,
    pub eld_exempt_reason: Option<String>,
}

impl DriverDefaults {
    /// Company defaults: short-haul ELD exemption, US locale.
    pub fn new(password: impl Into<String>) -> Self {
        DriverDefaults {
            password: password.into(),
            locale: "us".to_string(),
            eld_exempt: true,
            eld_exempt_reason: Some("Short Haul".to_string()),
        }
    }
}

/// What happened to one payroll record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordAction {
    Created,
    Updated,
    Reactivated,
    Deactivated,
    AlreadyInactive,
    Skipped,
    NotFound,
    ManualReview,
    Failed,
}

impl RecordAction {
    pub fn label(self) -> &'static str {
        match self {
            RecordAction::Created => "created",
            RecordAction::Updated => "updated",
            RecordAction::Reactivated => "reactivated",
            RecordAction::Deactivated => "deactivated",
            RecordAction::AlreadyInactive => "already inactive",
            RecordAction::Skipped => "skipped",
            RecordAction::NotFound => "not found",
            RecordAction::ManualReview => "manual review",
            RecordAction::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub name: String,
    pub action: RecordAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub used_fallback: bool,
}

impl RecordOutcome {
    fn new(name: String, action: RecordAction) -> Self {
        RecordOutcome {
            name,
            action,
            detail: None,
            used_fallback: false,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn via_fallback(mut self, used_fallback: bool) -> Self {
        self.used_fallback = used_fallback;
        self
    }
}

/// Counts plus the per-record outcomes for one batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub reactivated: usize,
    pub deactivated: usize,
    pub already_inactive: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub manual_review: usize,
    pub failed: usize,
    pub fallback_matches: usize,
    pub outcomes: Vec<RecordOutcome>,
}

impl RunSummary {
    fn record(&mut self, outcome: RecordOutcome) {
        self.total += 1;
        if outcome.used_fallback {
            self.fallback_matches += 1;
        }
        match outcome.action {
            RecordAction::Created => self.created += 1,
            RecordAction::Updated => self.updated += 1,
            RecordAction::Reactivated => self.reactivated += 1,
            RecordAction::Deactivated => self.deactivated += 1,
            RecordAction::AlreadyInactive => self.already_inactive += 1,
            RecordAction::Skipped => self.skipped += 1,
            RecordAction::NotFound => self.not_found += 1,
            RecordAction::ManualReview => self.manual_review += 1,
            RecordAction::Failed => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Outcomes an operator has to look at: failures, ambiguities, and
    /// drivers that could not be found.
    pub fn attention_outcomes(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.outcomes.iter().filter(|outcome| {
            matches!(
                outcome.action,
                RecordAction::Failed | RecordAction::ManualReview | RecordAction::NotFound
            )
        })
    }
}

/// Sequential reconciler over a [`DriverDirectory`].
pub struct Reconciler<'a, D: DriverDirectory> {
    directory: &'a D,
    retry: RetryPolicy,
    options: ReconcileOptions,
}

impl<'a, D: DriverDirectory> Reconciler<'a, D> {
    pub fn new(directory: &'a D, options: ReconcileOptions) -> Self {
        Reconciler {
            directory,
            retry: RetryPolicy::default(),
            options,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Apply new-hire records. Creates allocate usernames from `registry`;
    /// the caller persists the registry after the run.
    pub async fn run_additions(
        &self,
        records: &[PayrollRecord],
        registry: &mut UsernameRegistry,
        mappings: &TagMappings,
        defaults: &DriverDefaults,
    ) -> RunSummary {
        info!(
            records = records.len(),
            dry_run = self.options.mode.is_dry_run(),
            update_existing = self.options.update_existing,
            "starting hire run"
        );
        let mut summary = RunSummary::default();
        for record in records {
            let outcome = self.add_one(record, registry, mappings, defaults).await;
            summary.record(outcome);
        }
        info!(
            created = summary.created,
            updated = summary.updated,
            reactivated = summary.reactivated,
            skipped = summary.skipped,
            failed = summary.failed,
            "hire run complete"
        );
        summary
    }

    /// Apply termination records.
    pub async fn run_terminations(&self, records: &[PayrollRecord]) -> RunSummary {
        info!(
            records = records.len(),
            dry_run = self.options.mode.is_dry_run(),
            "starting termination run"
        );
        let mut summary = RunSummary::default();
        for record in records {
            let outcome = self.deactivate_one(record).await;
            summary.record(outcome);
        }
        info!(
            deactivated = summary.deactivated,
            already_inactive = summary.already_inactive,
            not_found = summary.not_found,
            manual_review = summary.manual_review,
            failed = summary.failed,
            "termination run complete"
        );
        summary
    }

    async fn add_one(
        &self,
        record: &PayrollRecord,
        registry: &mut UsernameRegistry,
        mappings: &TagMappings,
        defaults: &DriverDefaults,
    ) -> RecordOutcome {
        let name = record.full_name();
        if let Some(position) = &record.position {
            if mappings.is_excluded_position(position) {
                debug!(name = %name, position = %position, "position excluded from provisioning");
                return RecordOutcome::new(name, RecordAction::Skipped)
                    .with_detail(format!("excluded position: {position}"));
            }
        }
        match self.try_add(record, registry, mappings, defaults).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(name = %name, error = %e, code = e.error_code(), "hire record failed");
                RecordOutcome::new(name, RecordAction::Failed).with_detail(e.to_string())
            }
        }
    }

    async fn try_add(
        &self,
        record: &PayrollRecord,
        registry: &mut UsernameRegistry,
        mappings: &TagMappings,
        defaults: &DriverDefaults,
    ) -> SyncResult<RecordOutcome> {
        let name = record.full_name();
        let hire_date = record.hire_date.ok_or_else(|| {
            SyncError::invalid_input(format!("{name}: hire row is missing a hire date"))
        })?;

        let resolver =
            Resolver::new(self.directory).with_fallback(self.options.allow_name_fallback);
        let matched = resolver
            .resolve(&record.first_name, &record.last_name, Some(hire_date))
            .await?;
        let used_fallback = matched.via_fallback();

        match matched {
            MatchResult::NotFoundById | MatchResult::NotFound => {
                self.create_driver(record, hire_date, registry, mappings, defaults)
                    .await
            }
            MatchResult::Found(driver) | MatchResult::FoundByNameFallback(driver) => {
                if !self.options.update_existing {
                    debug!(name = %name, driver_id = %driver.id, "driver exists, updates disabled");
                    return Ok(RecordOutcome::new(name, RecordAction::Skipped)
                        .with_detail("already exists")
                        .via_fallback(used_fallback));
                }
                if driver.is_active() {
                    self.update_driver(record, hire_date, &driver, mappings, used_fallback)
                        .await
                } else {
                    self.reactivate_driver(record, hire_date, &driver, used_fallback)
                        .await
                }
            }
            MatchResult::AmbiguousNameFallback(candidates) => {
                warn!(name = %name, count = candidates.len(), "ambiguous match, leaving for manual review");
                Ok(RecordOutcome::new(name, RecordAction::ManualReview)
                    .with_detail(format!("{} drivers share this name", candidates.len())))
            }
        }
    }

    async fn create_driver(
        &self,
        record: &PayrollRecord,
        hire_date: NaiveDate,
        registry: &mut UsernameRegistry,
        mappings: &TagMappings,
        defaults: &DriverDefaults,
    ) -> SyncResult<RecordOutcome> {
        let name = record.full_name();
        let external_id = ExternalId::encode(&record.first_name, &record.last_name, hire_date)?;
        let username = registry.allocate(&record.first_name, &record.last_name)?;
        let payload = build_create_payload(
            record,
            &external_id,
            &username,
            hire_date,
            mappings,
            defaults,
        );

        if self.options.mode.is_dry_run() {
            info!(
                name = %name,
                username = %username,
                external_id = %external_id,
                "[dry-run] would create driver"
            );
            return Ok(RecordOutcome::new(name, RecordAction::Created)
                .with_detail(format!("would create with username {username}")));
        }

        let directory = self.directory;
        let created = match self
            .retry
            .execute("create_driver", || {
                let payload = payload.clone();
                async move { directory.create(&payload).await }
            })
            .await
        {
            Ok(driver) => driver,
            Err(e) => {
                // The username was never used remotely; release it so the
                // next run can hand it out again.
                registry.forget(&username);
                return Err(e);
            }
        };
        info!(driver_id = %created.id, username = %username, "created driver");
        Ok(RecordOutcome::new(name, RecordAction::Created)
            .with_detail(format!("username {username}")))
    }

    async fn update_driver(
        &self,
        record: &PayrollRecord,
        hire_date: NaiveDate,
        driver: &RemoteDriver,
        mappings: &TagMappings,
        used_fallback: bool,
    ) -> SyncResult<RecordOutcome> {
        let name = record.full_name();
        let patch = build_update_patch(record, hire_date, mappings);

        if self.options.mode.is_dry_run() {
            info!(name = %name, driver_id = %driver.id, "[dry-run] would update driver");
            return Ok(RecordOutcome::new(name, RecordAction::Updated)
                .with_detail("would update")
                .via_fallback(used_fallback));
        }

        let directory = self.directory;
        let reference = DriverRef::from(driver);
        self.retry
            .execute("update_driver", || {
                let reference = reference.clone();
                let patch = patch.clone();
                async move { directory.update(&reference, &patch).await }
            })
            .await?;
        info!(driver_id = %driver.id, "updated driver");
        Ok(RecordOutcome::new(name, RecordAction::Updated).via_fallback(used_fallback))
    }

    async fn reactivate_driver(
        &self,
        record: &PayrollRecord,
        hire_date: NaiveDate,
        driver: &RemoteDriver,
        used_fallback: bool,
    ) -> SyncResult<RecordOutcome> {
        let name = record.full_name();
        let patch = DriverPatch {
            driver_activation_status: Some(crate::model::ActivationStatus::Active),
            notes: Some(format!("Reactivated: {}", hire_date.format(DATE_FORMAT))),
            ..DriverPatch::default()
        };

        if self.options.mode.is_dry_run() {
            info!(name = %name, driver_id = %driver.id, "[dry-run] would reactivate driver");
            return Ok(RecordOutcome::new(name, RecordAction::Reactivated)
                .with_detail("would reactivate")
                .via_fallback(used_fallback));
        }

        let directory = self.directory;
        let reference = DriverRef::from(driver);
        self.retry
            .execute("reactivate_driver", || {
                let reference = reference.clone();
                let patch = patch.clone();
                async move { directory.update(&reference, &patch).await }
            })
            .await?;
        info!(driver_id = %driver.id, "reactivated driver");
        Ok(RecordOutcome::new(name, RecordAction::Reactivated).via_fallback(used_fallback))
    }

    async fn deactivate_one(&self, record: &PayrollRecord) -> RecordOutcome {
        let name = record.full_name();
        match self.try_deactivate(record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(name = %name, error = %e, code = e.error_code(), "termination record failed");
                RecordOutcome::new(name, RecordAction::Failed).with_detail(e.to_string())
            }
        }
    }

    async fn try_deactivate(&self, record: &PayrollRecord) -> SyncResult<RecordOutcome> {
        let name = record.full_name();
        let termination_date = record.termination_date.ok_or_else(|| {
            SyncError::invalid_input(format!(
                "{name}: termination row is missing a termination date"
            ))
        })?;

        let resolver =
            Resolver::new(self.directory).with_fallback(self.options.allow_name_fallback);
        let matched = resolver
            .resolve(&record.first_name, &record.last_name, record.hire_date)
            .await?;
        let used_fallback = matched.via_fallback();

        match matched {
            MatchResult::Found(driver) | MatchResult::FoundByNameFallback(driver) => {
                if !driver.is_active() {
                    debug!(driver_id = %driver.id, "driver already deactivated");
                    return Ok(RecordOutcome::new(name, RecordAction::AlreadyInactive)
                        .via_fallback(used_fallback));
                }
                self.deactivate_driver(record, termination_date, &driver, used_fallback)
                    .await
            }
            MatchResult::NotFoundById => {
                warn!(name = %name, "no driver carries this identifier");
                Ok(RecordOutcome::new(name, RecordAction::NotFound)
                    .with_detail("identifier unknown to the directory"))
            }
            MatchResult::NotFound => {
                warn!(name = %name, "driver not found");
                let detail = if self.options.allow_name_fallback {
                    "no hire date and no name match"
                } else {
                    "no hire date and name fallback disabled"
                };
                Ok(RecordOutcome::new(name, RecordAction::NotFound).with_detail(detail))
            }
            MatchResult::AmbiguousNameFallback(candidates) => {
                warn!(name = %name, count = candidates.len(), "ambiguous match, leaving for manual review");
                Ok(RecordOutcome::new(name, RecordAction::ManualReview)
                    .with_detail(format!("{} drivers share this name", candidates.len())))
            }
        }
    }

    async fn deactivate_driver(
        &self,
        record: &PayrollRecord,
        termination_date: NaiveDate,
        driver: &RemoteDriver,
        used_fallback: bool,
    ) -> SyncResult<RecordOutcome> {
        let name = record.full_name();
        // Notes are overwritten on purpose: the termination date is the
        // one thing dispatch needs to see on a deactivated driver.
        let reason = format!("Terminated: {}", termination_date.format(DATE_FORMAT));

        if self.options.mode.is_dry_run() {
            info!(name = %name, driver_id = %driver.id, "[dry-run] would deactivate driver");
            return Ok(RecordOutcome::new(name, RecordAction::Deactivated)
                .with_detail("would deactivate")
                .via_fallback(used_fallback));
        }

        let directory = self.directory;
        let reference = DriverRef::from(driver);
        self.retry
            .execute("deactivate_driver", || {
                let reference = reference.clone();
                let reason = reason.clone();
                async move { directory.deactivate(&reference, &reason).await }
            })
            .await?;
        info!(driver_id = %driver.id, "deactivated driver");

        let mut outcome =
            RecordOutcome::new(name, RecordAction::Deactivated).via_fallback(used_fallback);
        if used_fallback && self.upgrade_external_id(record, driver).await {
            outcome = outcome.with_detail("added external id for future runs");
        }
        Ok(outcome)
    }

    /// Attach a stable identifier to a fallback-matched driver so later
    /// runs resolve it directly. Best-effort: a failure here logs and
    /// never fails the record, the deactivation already happened.
    async fn upgrade_external_id(&self, record: &PayrollRecord, driver: &RemoteDriver) -> bool {
        let hire_date = record.hire_date.or_else(|| {
            driver
                .notes
                .as_deref()
                .and_then(extract_hire_date_from_notes)
        });
        let Some(hire_date) = hire_date else {
            debug!(driver_id = %driver.id, "no hire date recoverable, skipping identifier upgrade");
            return false;
        };
        let external_id =
            match ExternalId::encode(&record.first_name, &record.last_name, hire_date) {
                Ok(id) => id,
                Err(e) => {
                    warn!(driver_id = %driver.id, error = %e, "cannot derive identifier for upgrade");
                    return false;
                }
            };

        let directory = self.directory;
        let reference = DriverRef::from(driver);
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
                info!(driver_id = %driver.id, external_id = %external_id, "added external id after fallback match");
                true
            }
            Err(e) => {
                warn!(driver_id = %driver.id, error = %e, "could not add external id");
                false
            }
        }
    }
}

fn build_create_payload(
    record: &PayrollRecord,
    external_id: &ExternalId,
    username: &str,
    hire_date: NaiveDate,
    mappings: &TagMappings,
    defaults: &DriverDefaults,
) -> DriverCreatePayload {
    let mut tag_ids = Vec::new();
    if let Some(location) = record.location.as_deref() {
        match mappings.location(location) {
            Some(mapping) => tag_ids.push(mapping.tag_id.clone()),
            None => warn!(location, "no tag mapping for location"),
        }
    }
    if let Some(position) = record.position.as_deref() {
        match mappings.position_tag(position) {
            Some(tag_id) => tag_ids.push(tag_id.to_string()),
            None => warn!(position, "no tag mapping for position"),
        }
    }

    let mut external_ids = HashMap::new();
    external_ids.insert(
        external_id.key().to_string(),
        external_id.value().to_string(),
    );

    DriverCreatePayload {
        external_ids,
        name: record.full_name(),
        username: username.to_string(),
        password: defaults.password.clone(),
        notes: Some(format!("Hire Date: {}", hire_date.format(DATE_FORMAT))),
        license_state: record.license_state.clone(),
        eld_exempt: defaults.eld_exempt,
        eld_exempt_reason: defaults.eld_exempt_reason.clone(),
        locale: defaults.locale.clone(),
        timezone: Some(mappings.timezone_for(record.location.as_deref())),
        tag_ids,
    }
}

fn build_update_patch(
    record: &PayrollRecord,
    hire_date: NaiveDate,
    mappings: &TagMappings,
) -> DriverPatch {
    let mut tag_ids = Vec::new();
    if let Some(location) = record.location.as_deref() {
        if let Some(mapping) = mappings.location(location) {
            tag_ids.push(mapping.tag_id.clone());
        }
    }
    if let Some(position) = record.position.as_deref() {
        if let Some(tag_id) = mappings.position_tag(position) {
            tag_ids.push(tag_id.to_string());
        }
    }

    DriverPatch {
        notes: Some(format!("Updated: {}", hire_date.format(DATE_FORMAT))),
        tag_ids: if tag_ids.is_empty() {
            None
        } else {
            Some(tag_ids)
        },
        timezone: Some(mappings.timezone_for(record.location.as_deref())),
        license_state: record.license_state.clone(),
        ..DriverPatch::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappings::LocationMapping;

    fn record() -> PayrollRecord {
        PayrollRecord {
            first_name: "John".to_string(),
            last_name: "Smith".to_string(),
            hire_date: NaiveDate::from_ymd_opt(2024, 1, 15),
            termination_date: None,
            position: Some("Driver".to_string()),
            location: Some("Phoenix Yard".to_string()),
            license_state: Some("AZ".to_string()),
        }
    }

    fn mappings() -> TagMappings {
        let mut mappings = TagMappings::new();
        mappings.add_position("Driver", "101");
        mappings.add_location(
            "Phoenix Yard",
            LocationMapping {
                tag_id: "202".to_string(),
                timezone: Some("America/Phoenix".to_string()),
            },
        );
        mappings
    }

    #[test]
    fn create_payload_carries_identity_and_defaults() {
        let record = record();
        let hire_date = record.hire_date.expect("hire date set");
        let external_id = ExternalId::encode("John", "Smith", hire_date).expect("encodes");
        let defaults = DriverDefaults::new("hunter2");

        let payload = build_create_payload(
            &record,
            &external_id,
            "jsmith",
            hire_date,
            &mappings(),
            &defaults,
        );

        assert_eq!(payload.name, "John Smith");
        assert_eq!(payload.username, "jsmith");
        assert_eq!(payload.password, "hunter2");
        assert_eq!(
            payload.external_ids.get("paycomname").map(String::as_str),
            Some("John-Smith_01-15-2024")
        );
        assert_eq!(payload.notes.as_deref(), Some("Hire Date: 01-15-2024"));
        assert_eq!(payload.timezone.as_deref(), Some("America/Phoenix"));
        assert_eq!(payload.tag_ids, vec!["202".to_string(), "101".to_string()]);
        assert!(payload.eld_exempt);
        assert_eq!(payload.eld_exempt_reason.as_deref(), Some("Short Haul"));
        assert_eq!(payload.locale, "us");
    }

    #[test]
    fn update_patch_skips_unmapped_tags() {
        let mut record = record();
        record.position = Some("Unknown Position".to_string());
        record.location = None;
        let hire_date = record.hire_date.expect("hire date set");

        let patch = build_update_patch(&record, hire_date, &mappings());
        assert_eq!(patch.notes.as_deref(), Some("Updated: 01-15-2024"));
        assert_eq!(patch.tag_ids, None);
        assert_eq!(patch.timezone.as_deref(), Some(crate::mappings::DEFAULT_TIMEZONE));
        assert!(patch.driver_activation_status.is_none());
    }

    #[test]
    fn summary_tallies_by_action() {
        let mut summary = RunSummary::default();
        summary.record(RecordOutcome::new("A B".to_string(), RecordAction::Created));
        summary.record(
            RecordOutcome::new("C D".to_string(), RecordAction::Deactivated).via_fallback(true),
        );
        summary.record(
            RecordOutcome::new("E F".to_string(), RecordAction::Failed).with_detail("boom"),
        );

        assert_eq!(summary.total, 3);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.deactivated, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.fallback_matches, 1);
        assert!(summary.has_failures());
        assert_eq!(summary.attention_outcomes().count(), 1);
    }
}
