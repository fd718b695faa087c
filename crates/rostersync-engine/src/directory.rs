//! Remote driver directory capability trait.

use std::fmt;

use async_trait::async_trait;

use crate::error::SyncResult;
use crate::external_id::ExternalId;
use crate::model::{DriverCreatePayload, DriverPatch, RemoteDriver};

/// How a driver is addressed: by the opaque id the directory assigned, or
/// by a stable external identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverRef {
    Id(String),
    External(ExternalId),
}

impl DriverRef {
    pub fn id(id: impl Into<String>) -> Self {
        DriverRef::Id(id.into())
    }

    /// URL path segment form. External identifiers are percent-encoded;
    /// opaque ids pass through as-is.
    pub fn path_segment(&self) -> String {
        match self {
            DriverRef::Id(id) => id.clone(),
            DriverRef::External(external_id) => external_id.transport(),
        }
    }
}

impl From<&RemoteDriver> for DriverRef {
    fn from(driver: &RemoteDriver) -> Self {
        DriverRef::Id(driver.id.clone())
    }
}

impl fmt::Display for DriverRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverRef::Id(id) => f.write_str(id),
            DriverRef::External(external_id) => write!(f, "{external_id}"),
        }
    }
}

/// Operations the engine needs from the remote driver directory.
///
/// Implementations parse transport shapes into [`RemoteDriver`] at this
/// boundary and classify failures through
/// [`SyncError`](crate::error::SyncError), so callers can tell transient
/// from permanent without knowing anything about HTTP.
#[async_trait]
pub trait DriverDirectory: Send + Sync {
    /// Look up a driver by stable external identifier. `Ok(None)` means the
    /// identifier is unknown to the directory, which is an answer, not an
    /// error.
    async fn find_by_external_id(&self, id: &ExternalId) -> SyncResult<Option<RemoteDriver>>;

    /// Every driver whose display name matches the given first and last
    /// name, in either `First Last` or `Last, First` spelling. Includes
    /// deactivated drivers; callers branch on status themselves.
    async fn find_by_name(
        &self,
        first_name: &str,
        last_name: &str,
    ) -> SyncResult<Vec<RemoteDriver>>;

    /// Create a driver and return it as the directory stored it.
    async fn create(&self, payload: &DriverCreatePayload) -> SyncResult<RemoteDriver>;

    /// Patch mutable fields on an existing driver.
    async fn update(&self, driver: &DriverRef, patch: &DriverPatch) -> SyncResult<RemoteDriver>;

    /// Deactivate a driver, recording `reason` in its notes.
    async fn deactivate(&self, driver: &DriverRef, reason: &str) -> SyncResult<RemoteDriver>;

    /// Attach a stable external identifier to an existing driver without
    /// disturbing identifiers already present.
    async fn add_external_id(&self, driver: &DriverRef, id: &ExternalId)
        -> SyncResult<RemoteDriver>;

    /// Every driver the directory knows, active and deactivated.
    async fn list_all(&self) -> SyncResult<Vec<RemoteDriver>>;
}
