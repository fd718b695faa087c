//! Position and location tag tables.
//!
//! Three small CSV files drive payload construction: `positions.csv`
//! (position to tag id), `locations.csv` (location to tag id plus
//! timezone), and `excluded_positions.csv` (positions that never get
//! provisioned). Lookups are case-insensitive.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::SyncResult;

/// Timezone applied when a location row does not name one.
pub const DEFAULT_TIMEZONE: &str = "America/Chicago";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationMapping {
    pub tag_id: String,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TagMappings {
    positions: HashMap<String, String>,
    locations: HashMap<String, LocationMapping>,
    excluded_positions: HashSet<String>,
}

impl TagMappings {
    pub fn new() -> Self {
        TagMappings::default()
    }

    /// Load all three tables from a data directory. A missing file means
    /// an empty table; a file that exists but will not parse is an error.
    pub fn load_from_dir(dir: &Path) -> SyncResult<Self> {
        let mut mappings = TagMappings::new();
        mappings.load_positions(&dir.join("positions.csv"))?;
        mappings.load_locations(&dir.join("locations.csv"))?;
        mappings.load_excluded(&dir.join("excluded_positions.csv"))?;
        debug!(
            positions = mappings.positions.len(),
            locations = mappings.locations.len(),
            excluded = mappings.excluded_positions.len(),
            "tag mappings loaded"
        );
        Ok(mappings)
    }

    pub fn add_position(&mut self, position: &str, tag_id: &str) {
        self.positions
            .insert(normalize_key(position), tag_id.trim().to_string());
    }

    pub fn add_location(&mut self, location: &str, mapping: LocationMapping) {
        self.locations.insert(normalize_key(location), mapping);
    }

    pub fn exclude_position(&mut self, position: &str) {
        self.excluded_positions.insert(normalize_key(position));
    }

    pub fn position_tag(&self, position: &str) -> Option<&str> {
        self.positions
            .get(&normalize_key(position))
            .map(String::as_str)
    }

    pub fn location(&self, location: &str) -> Option<&LocationMapping> {
        self.locations.get(&normalize_key(location))
    }

    pub fn is_excluded_position(&self, position: &str) -> bool {
        self.excluded_positions.contains(&normalize_key(position))
    }

    /// Timezone for a location, falling back to [`DEFAULT_TIMEZONE`].
    pub fn timezone_for(&self, location: Option<&str>) -> String {
        location
            .and_then(|name| self.location(name))
            .and_then(|mapping| mapping.timezone.clone())
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string())
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    pub fn excluded_count(&self) -> usize {
        self.excluded_positions.len()
    }

    fn load_positions(&mut self, path: &Path) -> SyncResult<()> {
        if !path.exists() {
            warn!(path = %path.display(), "no position mapping file, positions will go untagged");
            return Ok(());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let headers = reader.headers()?.clone();
        let position_idx = column_index(&headers, "position").unwrap_or(0);
        let tag_idx = column_index(&headers, "tag_id").unwrap_or(1);
        for result in reader.records() {
            let record = result?;
            let position = record.get(position_idx).map(str::trim).unwrap_or("");
            let tag_id = record.get(tag_idx).map(str::trim).unwrap_or("");
            if position.is_empty() || tag_id.is_empty() {
                continue;
            }
            self.add_position(position, tag_id);
        }
        Ok(())
    }

    fn load_locations(&mut self, path: &Path) -> SyncResult<()> {
        if !path.exists() {
            warn!(path = %path.display(), "no location mapping file, locations will go untagged");
            return Ok(());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let headers = reader.headers()?.clone();
        let location_idx = column_index(&headers, "location").unwrap_or(0);
        let tag_idx = column_index(&headers, "tag_id").unwrap_or(1);
        let timezone_idx = column_index(&headers, "timezone").unwrap_or(2);
        for result in reader.records() {
            let record = result?;
            let location = record.get(location_idx).map(str::trim).unwrap_or("");
            let tag_id = record.get(tag_idx).map(str::trim).unwrap_or("");
            if location.is_empty() || tag_id.is_empty() {
                continue;
            }
            let timezone = record
                .get(timezone_idx)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(String::from);
            self.add_location(
                location,
                LocationMapping {
                    tag_id: tag_id.to_string(),
                    timezone,
                },
            );
        }
        Ok(())
    }

    fn load_excluded(&mut self, path: &Path) -> SyncResult<()> {
        if !path.exists() {
            return Ok(());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let headers = reader.headers()?.clone();
        let position_idx = column_index(&headers, "position").unwrap_or(0);
        for result in reader.records() {
            let record = result?;
            let position = record.get(position_idx).map(str::trim).unwrap_or("");
            if position.is_empty() {
                continue;
            }
            self.exclude_position(position);
        }
        Ok(())
    }
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(name))
}

fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn lookups_are_case_insensitive() {
        let mut mappings = TagMappings::new();
        mappings.add_position("Driver", "101");
        mappings.exclude_position("Office Admin");

        assert_eq!(mappings.position_tag("driver"), Some("101"));
        assert_eq!(mappings.position_tag("DRIVER "), Some("101"));
        assert!(mappings.is_excluded_position("office admin"));
        assert!(!mappings.is_excluded_position("driver"));
    }

    #[test]
    fn timezone_falls_back_to_default() {
        let mut mappings = TagMappings::new();
        mappings.add_location(
            "Dallas Yard",
            LocationMapping {
                tag_id: "201".to_string(),
                timezone: None,
            },
        );
        mappings.add_location(
            "Phoenix Yard",
            LocationMapping {
                tag_id: "202".to_string(),
                timezone: Some("America/Phoenix".to_string()),
            },
        );

        assert_eq!(mappings.timezone_for(Some("Phoenix Yard")), "America/Phoenix");
        assert_eq!(mappings.timezone_for(Some("Dallas Yard")), DEFAULT_TIMEZONE);
        assert_eq!(mappings.timezone_for(Some("Unknown")), DEFAULT_TIMEZONE);
        assert_eq!(mappings.timezone_for(None), DEFAULT_TIMEZONE);
    }

    #[test]
    fn load_from_dir_reads_all_three_tables() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("positions.csv"),
            "position,tag_id\nDriver,101\nYard Hostler,102\n",
        )
        .expect("writes");
        fs::write(
            dir.path().join("locations.csv"),
            "location,tag_id,timezone\nDallas Yard,201,\nPhoenix Yard,202,America/Phoenix\n",
        )
        .expect("writes");
        fs::write(
            dir.path().join("excluded_positions.csv"),
            "position\nOffice Admin\n",
        )
        .expect("writes");

        let mappings = TagMappings::load_from_dir(dir.path()).expect("loads");
        assert_eq!(mappings.position_count(), 2);
        assert_eq!(mappings.location_count(), 2);
        assert_eq!(mappings.excluded_count(), 1);
        assert_eq!(mappings.position_tag("yard hostler"), Some("102"));
        assert_eq!(
            mappings.location("dallas yard"),
            Some(&LocationMapping {
                tag_id: "201".to_string(),
                timezone: None
            })
        );
    }

    #[test]
    fn missing_files_load_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mappings = TagMappings::load_from_dir(dir.path()).expect("loads");
        assert_eq!(mappings.position_count(), 0);
        assert_eq!(mappings.location_count(), 0);
        assert_eq!(mappings.excluded_count(), 0);
    }
}
