//! Username registry synchronization against the directory.
//!
//! Drivers created by hand in the fleet console carry usernames the local
//! registry has never seen. Syncing pulls those in before a hire run so
//! the allocator cannot hand out a username the directory already knows.

use serde::Serialize;
use tracing::{debug, info};

use crate::directory::DriverDirectory;
use crate::error::SyncResult;
use crate::username::{UsernameEntry, UsernameRegistry};

/// What one registry sync pass did.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UsernameSyncReport {
    pub drivers_scanned: usize,
    /// Drivers with no username set in the directory.
    pub without_username: usize,
    pub imported: usize,
    pub already_known: usize,
}

/// Pull every directory username into the registry. Entries already
/// present are left untouched; new ones record the driver's display name
/// and id as their origin.
pub async fn sync_from_directory<D: DriverDirectory>(
    directory: &D,
    registry: &mut UsernameRegistry,
) -> SyncResult<UsernameSyncReport> {
    let drivers = directory.list_all().await?;
    let mut report = UsernameSyncReport {
        drivers_scanned: drivers.len(),
        ..UsernameSyncReport::default()
    };

    for driver in &drivers {
        let Some(username) = driver.username.as_deref().map(str::trim) else {
            report.without_username += 1;
            continue;
        };
        if username.is_empty() {
            report.without_username += 1;
            continue;
        }
        let entry = UsernameEntry {
            owner_name: driver.name.clone(),
            source_remote_id: Some(driver.id.clone()),
        };
        if registry.observe(username, entry) {
            debug!(username, driver_id = %driver.id, "imported username from directory");
            report.imported += 1;
        } else {
            report.already_known += 1;
        }
    }

    info!(
        scanned = report.drivers_scanned,
        imported = report.imported,
        already_known = report.already_known,
        without_username = report.without_username,
        "username registry synced"
    );
    Ok(report)
}

/// Side-by-side view of the local registry and the directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStatus {
    pub local_total: usize,
    pub remote_total: usize,
    /// Registered locally but not attached to any driver. Usually a
    /// create that failed after allocation, or a deactivated-then-purged
    /// driver.
    pub local_only: Vec<String>,
    /// In the directory but never synced into the registry.
    pub remote_only: Vec<String>,
}

impl RegistryStatus {
    pub fn in_sync(&self) -> bool {
        self.local_only.is_empty() && self.remote_only.is_empty()
    }
}

/// Compare the registry against directory usernames without mutating
/// either side.
pub async fn registry_status<D: DriverDirectory>(
    directory: &D,
    registry: &UsernameRegistry,
) -> SyncResult<RegistryStatus> {
    let drivers = directory.list_all().await?;
    let remote: std::collections::BTreeSet<String> = drivers
        .iter()
        .filter_map(|driver| driver.username.as_deref())
        .map(|username| username.trim().to_lowercase())
        .filter(|username| !username.is_empty())
        .collect();

    let mut status = RegistryStatus {
        local_total: registry.len(),
        remote_total: remote.len(),
        ..RegistryStatus::default()
    };
    for (username, _) in registry.iter() {
        if !remote.contains(username.as_str()) {
            status.local_only.push(username.clone());
        }
    }
    for username in &remote {
        if !registry.contains(username) {
            status.remote_only.push(username.clone());
        }
    }
    Ok(status)
}
