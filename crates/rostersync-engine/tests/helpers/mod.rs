//! In-memory driver directory for integration testing.
//!
//! Behaves like the real directory (id and name lookup, create, patch,
//! deactivate) over a mutex-guarded map, counts every call so tests can
//! assert which operations ran, and can be scripted to fail the next
//! mutation with a chosen error.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use rostersync_engine::directory::{DriverDirectory, DriverRef};
use rostersync_engine::error::{SyncError, SyncResult};
use rostersync_engine::external_id::{ExternalId, EXTERNAL_ID_KEY};
use rostersync_engine::model::{
    ActivationStatus, DriverCreatePayload, DriverPatch, PayrollRecord, RemoteDriver, Tag,
};

#[derive(Default)]
pub struct InMemoryDirectory {
    drivers: Mutex<BTreeMap<String, RemoteDriver>>,
    next_id: AtomicU32,
    pub id_lookups: AtomicU32,
    pub name_lookups: AtomicU32,
    pub create_calls: AtomicU32,
    pub update_calls: AtomicU32,
    pub deactivate_calls: AtomicU32,
    pub add_external_id_calls: AtomicU32,
    pub list_calls: AtomicU32,
    create_failures: Mutex<VecDeque<SyncError>>,
    deactivate_failures: Mutex<VecDeque<SyncError>>,
    add_external_id_failures: Mutex<VecDeque<SyncError>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        InMemoryDirectory::default()
    }

    /// Insert a driver directly, bypassing the counters.
    pub fn seed(&self, driver: RemoteDriver) {
        self.drivers
            .lock()
            .unwrap()
            .insert(driver.id.clone(), driver);
    }

    /// Snapshot of one stored driver.
    pub fn driver(&self, id: &str) -> Option<RemoteDriver> {
        self.drivers.lock().unwrap().get(id).cloned()
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.lock().unwrap().len()
    }

    /// The single driver whose display name matches, panicking unless
    /// exactly one does.
    pub fn driver_named(&self, name: &str) -> RemoteDriver {
        let drivers = self.drivers.lock().unwrap();
        let mut matches = drivers.values().filter(|driver| driver.name == name);
        let found = matches.next().expect("no driver with that name").clone();
        assert!(matches.next().is_none(), "several drivers with that name");
        found
    }

    /// Script the next `create` call to fail with `error`.
    pub fn fail_next_create(&self, error: SyncError) {
        self.create_failures.lock().unwrap().push_back(error);
    }

    /// Script the next `deactivate` call to fail with `error`.
    pub fn fail_next_deactivate(&self, error: SyncError) {
        self.deactivate_failures.lock().unwrap().push_back(error);
    }

    /// Script the next `add_external_id` call to fail with `error`.
    pub fn fail_next_add_external_id(&self, error: SyncError) {
        self.add_external_id_failures.lock().unwrap().push_back(error);
    }

    pub fn mutation_count(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.deactivate_calls.load(Ordering::SeqCst)
            + self.add_external_id_calls.load(Ordering::SeqCst)
    }

    fn resolve_ref(
        drivers: &BTreeMap<String, RemoteDriver>,
        driver_ref: &DriverRef,
    ) -> SyncResult<String> {
        let id = match driver_ref {
            DriverRef::Id(id) => drivers.get(id).map(|driver| driver.id.clone()),
            DriverRef::External(external_id) => drivers
                .values()
                .find(|driver| {
                    driver.external_id(EXTERNAL_ID_KEY) == Some(external_id.value())
                })
                .map(|driver| driver.id.clone()),
        };
        id.ok_or_else(|| SyncError::NotFound(driver_ref.to_string()))
    }

    fn take_failure(queue: &Mutex<VecDeque<SyncError>>) -> Option<SyncError> {
        queue.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl DriverDirectory for InMemoryDirectory {
    async fn find_by_external_id(&self, id: &ExternalId) -> SyncResult<Option<RemoteDriver>> {
        self.id_lookups.fetch_add(1, Ordering::SeqCst);
        let drivers = self.drivers.lock().unwrap();
        Ok(drivers
            .values()
            .find(|driver| driver.external_id(EXTERNAL_ID_KEY) == Some(id.value()))
            .cloned())
    }

    async fn find_by_name(
        &self,
        first_name: &str,
        last_name: &str,
    ) -> SyncResult<Vec<RemoteDriver>> {
        self.name_lookups.fetch_add(1, Ordering::SeqCst);
        let drivers = self.drivers.lock().unwrap();
        Ok(drivers
            .values()
            .filter(|driver| driver.matches_name(first_name, last_name))
            .cloned()
            .collect())
    }

    async fn create(&self, payload: &DriverCreatePayload) -> SyncResult<RemoteDriver> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = Self::take_failure(&self.create_failures) {
            return Err(error);
        }
        let id = format!("rd{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let driver = RemoteDriver {
            id: id.clone(),
            name: payload.name.clone(),
            username: Some(payload.username.clone()),
            external_ids: payload.external_ids.clone(),
            driver_activation_status: ActivationStatus::Active,
            notes: payload.notes.clone(),
            tags: payload
                .tag_ids
                .iter()
                .map(|tag_id| Tag {
                    id: tag_id.clone(),
                    name: None,
                })
                .collect(),
        };
        self.drivers.lock().unwrap().insert(id, driver.clone());
        Ok(driver)
    }

    async fn update(&self, driver: &DriverRef, patch: &DriverPatch) -> SyncResult<RemoteDriver> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut drivers = self.drivers.lock().unwrap();
        let id = Self::resolve_ref(&drivers, driver)?;
        let stored = drivers.get_mut(&id).expect("resolved id exists");
        apply_patch(stored, patch);
        Ok(stored.clone())
    }

    async fn deactivate(&self, driver: &DriverRef, reason: &str) -> SyncResult<RemoteDriver> {
        self.deactivate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = Self::take_failure(&self.deactivate_failures) {
            return Err(error);
        }
        let mut drivers = self.drivers.lock().unwrap();
        let id = Self::resolve_ref(&drivers, driver)?;
        let stored = drivers.get_mut(&id).expect("resolved id exists");
        stored.driver_activation_status = ActivationStatus::Deactivated;
        stored.notes = Some(reason.to_string());
        Ok(stored.clone())
    }

    async fn add_external_id(
        &self,
        driver: &DriverRef,
        id: &ExternalId,
    ) -> SyncResult<RemoteDriver> {
        self.add_external_id_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = Self::take_failure(&self.add_external_id_failures) {
            return Err(error);
        }
        let mut drivers = self.drivers.lock().unwrap();
        let driver_id = Self::resolve_ref(&drivers, driver)?;
        let stored = drivers.get_mut(&driver_id).expect("resolved id exists");
        stored
            .external_ids
            .insert(id.key().to_string(), id.value().to_string());
        Ok(stored.clone())
    }

    async fn list_all(&self) -> SyncResult<Vec<RemoteDriver>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.drivers.lock().unwrap().values().cloned().collect())
    }
}

fn apply_patch(driver: &mut RemoteDriver, patch: &DriverPatch) {
    if let Some(status) = patch.driver_activation_status {
        driver.driver_activation_status = status;
    }
    if let Some(notes) = &patch.notes {
        driver.notes = Some(notes.clone());
    }
    if let Some(external_ids) = &patch.external_ids {
        driver.external_ids = external_ids.clone();
    }
    if let Some(tag_ids) = &patch.tag_ids {
        driver.tags = tag_ids
            .iter()
            .map(|tag_id| Tag {
                id: tag_id.clone(),
                name: None,
            })
            .collect();
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

pub fn active_driver(id: &str, name: &str) -> RemoteDriver {
    RemoteDriver {
        id: id.to_string(),
        name: name.to_string(),
        username: None,
        external_ids: HashMap::new(),
        driver_activation_status: ActivationStatus::Active,
        notes: None,
        tags: Vec::new(),
    }
}

pub fn driver_with_external_id(id: &str, name: &str, value: &str) -> RemoteDriver {
    let mut driver = active_driver(id, name);
    driver
        .external_ids
        .insert(EXTERNAL_ID_KEY.to_string(), value.to_string());
    driver
}

pub fn hire_record(first_name: &str, last_name: &str, hire_date: NaiveDate) -> PayrollRecord {
    PayrollRecord {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        hire_date: Some(hire_date),
        termination_date: None,
        position: None,
        location: None,
        license_state: None,
    }
}

pub fn termination_record(
    first_name: &str,
    last_name: &str,
    termination_date: NaiveDate,
    hire_date: Option<NaiveDate>,
) -> PayrollRecord {
    PayrollRecord {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        hire_date,
        termination_date: Some(termination_date),
        position: None,
        location: None,
        license_state: None,
    }
}

pub fn transient_error() -> SyncError {
    SyncError::network("connection reset")
}

pub fn permanent_error() -> SyncError {
    SyncError::Api {
        status: 400,
        detail: "validation failed".to_string(),
    }
}
