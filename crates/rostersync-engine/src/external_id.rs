//! Composite external-identifier codec.
//!
//! A payroll identity is keyed by `paycomname` with the value
//! `<First>-<Last>_<MM-DD-YYYY>`, derived from the legal name and hire date.
//! Encoding is deterministic: the same inputs always produce the same
//! identifier, which is what makes reruns idempotent.

use std::fmt;

use chrono::NaiveDate;

use crate::error::{SyncError, SyncResult};

/// External-ID key under which payroll identities are stored.
pub const EXTERNAL_ID_KEY: &str = "paycomname";

/// Date spelling used inside identifier values and driver notes.
pub const DATE_FORMAT: &str = "%m-%d-%Y";

/// A fully-encoded external identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalId {
    value: String,
}

impl ExternalId {
    /// Encode a name and hire date into an identifier value.
    ///
    /// Names are stripped to ASCII alphanumerics before use, so `O'Brien`
    /// and `OBrien` encode identically. A name that is empty after
    /// stripping is rejected rather than silently producing a degenerate
    /// identifier.
    pub fn encode(first_name: &str, last_name: &str, hire_date: NaiveDate) -> SyncResult<Self> {
        let first = sanitize_name(first_name);
        let last = sanitize_name(last_name);
        if first.is_empty() || last.is_empty() {
            return Err(SyncError::invalid_input(format!(
                "name '{first_name} {last_name}' is empty after sanitization"
            )));
        }
        Ok(ExternalId {
            value: format!("{first}-{last}_{}", hire_date.format(DATE_FORMAT)),
        })
    }

    /// Split a stored identifier value back into its parts.
    pub fn parse(value: &str) -> SyncResult<(String, String, NaiveDate)> {
        let (name_part, date_part) = value
            .rsplit_once('_')
            .ok_or_else(|| SyncError::invalid_input(format!("identifier '{value}' has no date")))?;
        let (first, last) = name_part.split_once('-').ok_or_else(|| {
            SyncError::invalid_input(format!("identifier '{value}' has no name separator"))
        })?;
        if first.is_empty() || last.is_empty() {
            return Err(SyncError::invalid_input(format!(
                "identifier '{value}' has an empty name component"
            )));
        }
        let hire_date = NaiveDate::parse_from_str(date_part, DATE_FORMAT).map_err(|_| {
            SyncError::invalid_input(format!("identifier '{value}' has an invalid date"))
        })?;
        Ok((first.to_string(), last.to_string(), hire_date))
    }

    pub fn key(&self) -> &'static str {
        EXTERNAL_ID_KEY
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// `key:value` pair as the directory spells it.
    pub fn qualified(&self) -> String {
        format!("{EXTERNAL_ID_KEY}:{}", self.value)
    }

    /// Percent-encoded `key:value` safe to embed in a URL path segment.
    /// The colon becomes `%3A`, which is what the directory expects for
    /// external-ID path parameters.
    pub fn transport(&self) -> String {
        encode_path_segment(&self.qualified())
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// Strip everything outside ASCII alphanumerics.
pub fn sanitize_name(name: &str) -> String {
    name.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Percent-encode a string for use as a single URL path segment.
/// RFC 3986 unreserved characters pass through untouched.
pub(crate) fn encode_path_segment(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push('%');
                encoded.push_str(&format!("{byte:02X}"));
            }
        }
    }
    encoded
}
