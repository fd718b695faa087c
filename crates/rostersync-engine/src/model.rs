//! Core data types: payroll records and the driver shapes the remote
//! directory speaks.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::external_id::sanitize_name;

/// One row of a payroll export, parsed and validated at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayrollRecord {
    pub first_name: String,
    pub last_name: String,
    /// Missing on termination rows whose export predates the hire column.
    pub hire_date: Option<NaiveDate>,
    pub termination_date: Option<NaiveDate>,
    pub position: Option<String>,
    pub location: Option<String>,
    /// Two-letter licensing state, when the report carries one.
    pub license_state: Option<String>,
}

impl PayrollRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Driver activation status as the remote API spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationStatus {
    #[default]
    Active,
    Deactivated,
}

impl ActivationStatus {
    pub fn is_active(self) -> bool {
        matches!(self, ActivationStatus::Active)
    }

    /// Query-parameter spelling used by the listing endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            ActivationStatus::Active => "active",
            ActivationStatus::Deactivated => "deactivated",
        }
    }
}

impl std::fmt::Display for ActivationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tag attached to a driver, as returned by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A driver record as the remote directory returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDriver {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub external_ids: HashMap<String, String>,
    #[serde(default)]
    pub driver_activation_status: ActivationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl RemoteDriver {
    pub fn is_active(&self) -> bool {
        self.driver_activation_status.is_active()
    }

    pub fn has_external_id(&self, key: &str) -> bool {
        self.external_ids.contains_key(key)
    }

    pub fn external_id(&self, key: &str) -> Option<&str> {
        self.external_ids.get(key).map(String::as_str)
    }

    /// Compare against a payroll first/last name pair.
    ///
    /// Directory records spell names either `First Last` or `Last, First`;
    /// both spellings are recognized. The comparison ignores case and every
    /// non-alphanumeric character.
    pub fn matches_name(&self, first_name: &str, last_name: &str) -> bool {
        let stored = normalize_name(&self.name);
        stored == normalize_name(&format!("{first_name} {last_name}"))
            || stored == normalize_name(&format!("{last_name} {first_name}"))
    }
}

fn normalize_name(name: &str) -> String {
    sanitize_name(name).to_lowercase()
}

/// Request body for creating a driver.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverCreatePayload {
    pub external_ids: HashMap<String, String>,
    pub name: String,
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_state: Option<String>,
    pub eld_exempt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eld_exempt_reason: Option<String>,
    pub locale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tag_ids: Vec<String>,
}

/// Partial update for an existing driver. Only populated fields are sent;
/// the directory leaves everything else untouched.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_activation_status: Option<ActivationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Full replacement map; callers merge before patching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ids: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_state: Option<String>,
}
