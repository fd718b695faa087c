//! CSV persistence for the username registry.
//!
//! One row per username: `username,owner_name,source_remote_id`. Files
//! written by older versions carry only the `username` column and load
//! fine; the missing fields come back empty.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::username::{UsernameEntry, UsernameRegistry};

pub struct UsernameStore {
    path: PathBuf,
}

impl UsernameStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        UsernameStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry. A missing file is an empty registry, not an
    /// error; the first save creates it.
    pub fn load(&self) -> SyncResult<UsernameRegistry> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no registry file yet, starting empty");
            return Ok(UsernameRegistry::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        let username_idx = column_index(&headers, "username").unwrap_or(0);
        let owner_idx = column_index(&headers, "owner_name");
        let source_idx = column_index(&headers, "source_remote_id");

        let mut registry = UsernameRegistry::new();
        for result in reader.records() {
            let record = result?;
            let username = record.get(username_idx).map(str::trim).unwrap_or("");
            if username.is_empty() {
                continue;
            }
            let owner_name = owner_idx
                .and_then(|idx| record.get(idx))
                .map(str::trim)
                .unwrap_or("")
                .to_string();
            let source_remote_id = source_idx
                .and_then(|idx| record.get(idx))
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(String::from);
            let entry = UsernameEntry {
                owner_name,
                source_remote_id,
            };
            if !registry.observe(username, entry) {
                warn!(username, path = %self.path.display(), "duplicate registry row ignored");
            }
        }
        debug!(path = %self.path.display(), entries = registry.len(), "registry loaded");
        Ok(registry)
    }

    /// Write the registry back, sorted by username.
    pub fn save(&self, registry: &UsernameRegistry) -> SyncResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(["username", "owner_name", "source_remote_id"])?;
        for (username, entry) in registry.iter() {
            writer.write_record([
                username.as_str(),
                entry.owner_name.as_str(),
                entry.source_remote_id.as_deref().unwrap_or(""),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = UsernameStore::new(dir.path().join("usernames.csv"));

        let mut registry = UsernameRegistry::new();
        registry.observe(
            "jsmith",
            UsernameEntry {
                owner_name: "John Smith".to_string(),
                source_remote_id: Some("d1".to_string()),
            },
        );
        registry.observe(
            "adoe",
            UsernameEntry {
                owner_name: "Alice Doe".to_string(),
                source_remote_id: None,
            },
        );
        store.save(&registry).expect("saves");

        let loaded = store.load().expect("loads");
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains("jsmith"));
        let (_, entry) = loaded
            .iter()
            .find(|(username, _)| username.as_str() == "jsmith")
            .expect("jsmith present");
        assert_eq!(entry.owner_name, "John Smith");
        assert_eq!(entry.source_remote_id.as_deref(), Some("d1"));
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = UsernameStore::new(dir.path().join("does-not-exist.csv"));
        let registry = store.load().expect("loads");
        assert!(registry.is_empty());
    }

    #[test]
    fn legacy_single_column_files_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("usernames.csv");
        fs::write(&path, "username\njsmith\nadoe\n").expect("writes");

        let registry = UsernameStore::new(&path).load().expect("loads");
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("jsmith"));
        let (_, entry) = registry.iter().next().expect("entry");
        assert_eq!(entry.owner_name, "");
        assert_eq!(entry.source_remote_id, None);
    }

    #[test]
    fn duplicate_rows_keep_the_first_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("usernames.csv");
        fs::write(
            &path,
            "username,owner_name,source_remote_id\njsmith,John Smith,d1\nJSMITH,Imposter,d2\n",
        )
        .expect("writes");

        let registry = UsernameStore::new(&path).load().expect("loads");
        assert_eq!(registry.len(), 1);
        let (_, entry) = registry.iter().next().expect("entry");
        assert_eq!(entry.owner_name, "John Smith");
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = UsernameStore::new(dir.path().join("data").join("usernames.csv"));
        store.save(&UsernameRegistry::new()).expect("saves");
        assert!(store.path().exists());
    }
}
