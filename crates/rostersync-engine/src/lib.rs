//! Payroll-roster to fleet-driver-registry reconciliation engine.
//!
//! The engine resolves payroll identities against a remote driver
//! directory through a stable composite identifier, reconciles hire and
//! termination batches idempotently with dry-run and retry semantics,
//! allocates collision-free usernames, and backfills identifiers onto
//! records that predate the identifier scheme.

pub mod client;
pub mod directory;
pub mod error;
pub mod external_id;
pub mod mappings;
pub mod migrate;
pub mod model;
pub mod reconcile;
pub mod report;
pub mod resolve;
pub mod retry;
pub mod store;
pub mod sync;
pub mod username;

pub use error::{SyncError, SyncResult};
