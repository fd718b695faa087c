//! Username generation and the collision-tracking registry.
//!
//! The rule is first initial plus sanitized last name, lowercase. When that
//! is taken the smallest free integer suffix starting at 2 wins, so a
//! second J. Smith becomes `jsmith2`. Generation is deterministic for a
//! given registry snapshot.

use std::collections::BTreeMap;

use crate::error::{SyncError, SyncResult};
use crate::external_id::sanitize_name;

/// Suffix ceiling. Hitting it means the source data is corrupt, not that
/// the company genuinely employs a thousand J. Smiths.
pub const SUFFIX_CEILING: u32 = 1000;

/// Ownership details for one registered username.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UsernameEntry {
    /// Display name of the person the username belongs to.
    pub owner_name: String,
    /// Directory driver id, when the entry was imported from the directory.
    pub source_remote_id: Option<String>,
}

/// In-memory username registry.
///
/// Loaded from the store at batch start, extended by the allocator, and
/// persisted at batch end. Existing entries are never silently replaced.
#[derive(Debug, Clone, Default)]
pub struct UsernameRegistry {
    entries: BTreeMap<String, UsernameEntry>,
}

impl UsernameRegistry {
    pub fn new() -> Self {
        UsernameRegistry::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, username: &str) -> bool {
        self.entries.contains_key(&normalize(username))
    }

    /// Iterate entries in username order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &UsernameEntry)> {
        self.entries.iter()
    }

    /// Record a username observed elsewhere, typically pulled from the
    /// directory. Returns false when the username was already known; the
    /// existing entry is kept.
    pub fn observe(&mut self, username: &str, entry: UsernameEntry) -> bool {
        let key = normalize(username);
        if key.is_empty() {
            return false;
        }
        match self.entries.entry(key) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Correction path: drop a registration, e.g. after the create it was
    /// allocated for failed permanently.
    pub fn forget(&mut self, username: &str) -> bool {
        self.entries.remove(&normalize(username)).is_some()
    }

    /// The base candidate for a name: first initial plus sanitized last
    /// name, lowercase.
    pub fn base_username(first_name: &str, last_name: &str) -> SyncResult<String> {
        let first = sanitize_name(first_name).to_lowercase();
        let last = sanitize_name(last_name).to_lowercase();
        let initial = first.chars().next().ok_or_else(|| {
            SyncError::invalid_input(format!("first name '{first_name}' has no usable characters"))
        })?;
        if last.is_empty() {
            return Err(SyncError::invalid_input(format!(
                "last name '{last_name}' has no usable characters"
            )));
        }
        Ok(format!("{initial}{last}"))
    }

    /// Preview the username the name would receive. Read-only: nothing is
    /// registered.
    pub fn check(&self, first_name: &str, last_name: &str) -> SyncResult<String> {
        self.candidate(first_name, last_name)
    }

    /// Allocate a unique username for the name and register it in one step,
    /// so no caller can observe the registry between the two.
    pub fn allocate(&mut self, first_name: &str, last_name: &str) -> SyncResult<String> {
        let username = self.candidate(first_name, last_name)?;
        self.entries.insert(
            username.clone(),
            UsernameEntry {
                owner_name: format!("{first_name} {last_name}"),
                source_remote_id: None,
            },
        );
        Ok(username)
    }

    fn candidate(&self, first_name: &str, last_name: &str) -> SyncResult<String> {
        let base = Self::base_username(first_name, last_name)?;
        if !self.entries.contains_key(&base) {
            return Ok(base);
        }
        for suffix in 2..=SUFFIX_CEILING {
            let candidate = format!("{base}{suffix}");
            if !self.entries.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(SyncError::RegistryExhausted {
            base,
            ceiling: SUFFIX_CEILING,
        })
    }
}

fn normalize(username: &str) -> String {
    username.trim().to_lowercase()
}
