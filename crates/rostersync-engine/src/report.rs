//! Payroll report parsing.
//!
//! Hire and termination exports share most columns. Rows are validated
//! individually: a bad row becomes a [`RowIssue`] and the rest of the
//! file still parses. Only a structural problem (missing required
//! column, unreadable file) fails the whole report.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::model::PayrollRecord;

const COL_FIRST_NAME: &str = "Legal_Firstname";
const COL_LAST_NAME: &str = "Legal_Lastname";
const COL_HIRE_DATE: &str = "Hire_Date";
const COL_TERMINATION_DATE: &str = "Termination_Date";
const COL_POSITION: &str = "Position";
const COL_LOCATION: &str = "Work_Location";
const COL_STATE: &str = "State";
const COL_STATUS: &str = "Employee_Status";

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Which report shape is being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Hires,
    Terminations,
}

impl ReportKind {
    fn required_date_column(self) -> &'static str {
        match self {
            ReportKind::Hires => COL_HIRE_DATE,
            ReportKind::Terminations => COL_TERMINATION_DATE,
        }
    }
}

/// One rejected row. Line numbers are 1-based with the header on line 1,
/// so the first data row is line 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    pub line_number: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ReportParseResult {
    pub records: Vec<PayrollRecord>,
    pub issues: Vec<RowIssue>,
    /// Data rows seen, including rejected and filtered ones.
    pub total_rows: usize,
    /// Hire rows dropped because the employee status was not Active.
    pub skipped_inactive: usize,
}

/// Read and parse a report file.
pub fn read_report(path: &Path, kind: ReportKind) -> SyncResult<ReportParseResult> {
    let data = fs::read(path)?;
    debug!(path = %path.display(), bytes = data.len(), "reading report");
    parse_report(&data, kind)
}

/// Parse raw report bytes.
pub fn parse_report(data: &[u8], kind: ReportKind) -> SyncResult<ReportParseResult> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    if data.is_empty() {
        return Err(SyncError::invalid_input("report is empty"));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);
    let headers = reader.headers().map_err(SyncError::from)?.clone();
    let columns = column_map(&headers);

    for required in [COL_FIRST_NAME, COL_LAST_NAME, kind.required_date_column()] {
        if !columns.contains_key(&required.to_lowercase()) {
            return Err(SyncError::invalid_input(format!(
                "report is missing required column '{required}'"
            )));
        }
    }

    let mut result = ReportParseResult::default();
    for (idx, row) in reader.records().enumerate() {
        let line_number = idx + 2;
        result.total_rows += 1;
        let record = match row {
            Ok(record) => record,
            Err(e) => {
                result.issues.push(RowIssue {
                    line_number,
                    message: format!("unreadable row: {e}"),
                });
                continue;
            }
        };

        let first_name = field(&record, &columns, COL_FIRST_NAME);
        let last_name = field(&record, &columns, COL_LAST_NAME);
        let (Some(first_name), Some(last_name)) = (first_name, last_name) else {
            result.issues.push(RowIssue {
                line_number,
                message: "missing first or last name".to_string(),
            });
            continue;
        };

        if kind == ReportKind::Hires {
            if let Some(status) = field(&record, &columns, COL_STATUS) {
                if !status.eq_ignore_ascii_case("active") {
                    debug!(line_number, status = %status, "skipping non-active hire row");
                    result.skipped_inactive += 1;
                    continue;
                }
            }
        }

        let hire_date = match parse_date_field(&record, &columns, COL_HIRE_DATE) {
            Ok(date) => date,
            Err(message) => {
                result.issues.push(RowIssue {
                    line_number,
                    message,
                });
                continue;
            }
        };
        if kind == ReportKind::Hires && hire_date.is_none() {
            result.issues.push(RowIssue {
                line_number,
                message: format!("missing {COL_HIRE_DATE}"),
            });
            continue;
        }

        let termination_date = match parse_date_field(&record, &columns, COL_TERMINATION_DATE) {
            Ok(date) => date,
            Err(message) => {
                result.issues.push(RowIssue {
                    line_number,
                    message,
                });
                continue;
            }
        };
        if kind == ReportKind::Terminations && termination_date.is_none() {
            result.issues.push(RowIssue {
                line_number,
                message: format!("missing {COL_TERMINATION_DATE}"),
            });
            continue;
        }

        result.records.push(PayrollRecord {
            first_name,
            last_name,
            hire_date,
            termination_date,
            position: field(&record, &columns, COL_POSITION),
            location: field(&record, &columns, COL_LOCATION),
            license_state: field(&record, &columns, COL_STATE),
        });
    }

    debug!(
        records = result.records.len(),
        issues = result.issues.len(),
        skipped_inactive = result.skipped_inactive,
        "report parsed"
    );
    Ok(result)
}

/// Parse the date spellings payroll exports actually use.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    ["%m-%d-%Y", "%m/%d/%Y", "%Y-%m-%d"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

fn column_map(headers: &csv::StringRecord) -> std::collections::HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, header)| (header.trim().to_lowercase(), idx))
        .collect()
}

/// Trimmed, non-empty field value, or None when the column is absent or
/// blank.
fn field(
    record: &csv::StringRecord,
    columns: &std::collections::HashMap<String, usize>,
    name: &str,
) -> Option<String> {
    columns
        .get(&name.to_lowercase())
        .and_then(|idx| record.get(*idx))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from)
}

fn parse_date_field(
    record: &csv::StringRecord,
    columns: &std::collections::HashMap<String, usize>,
    name: &str,
) -> Result<Option<NaiveDate>, String> {
    match field(record, columns, name) {
        None => Ok(None),
        Some(raw) => parse_date(&raw)
            .map(Some)
            .ok_or_else(|| format!("unparseable {name} '{raw}'")),
    }
}
