//! Patient matching and import reporting models.

use serde::{Deserialize, Serialize};

use super::conflict::PhoneConflict;

/// Identity fields of one imported row, as handed to the matcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MatchQuery {
    pub given_name: String,
    pub family_name: String,
    pub phone: Option<String>,
}

impl MatchQuery {
    pub fn new(given_name: &str, family_name: &str, phone: Option<&str>) -> Self {
        Self {
            given_name: given_name.to_string(),
            family_name: family_name.to_string(),
            phone: phone.map(str::to_string),
        }
    }
}

/// How a row was bound to a patient.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Single patient holds this phone number
    Phone,
    /// Single active patient has this exact normalized name
    Name,
    /// Several candidates, none chosen
    Ambiguous,
    /// Nothing found
    Unmatched,
}

/// Matcher output for one row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchResult {
    pub patient_id: Option<String>,
    pub method: MatchMethod,
    /// Name similarity of the bound patient (0.0 when unbound)
    pub confidence: f64,
    pub phone_conflict: Option<PhoneConflict>,
}

impl MatchResult {
    pub fn unmatched() -> Self {
        Self {
            patient_id: None,
            method: MatchMethod::Unmatched,
            confidence: 0.0,
            phone_conflict: None,
        }
    }

    pub fn ambiguous() -> Self {
        Self {
            method: MatchMethod::Ambiguous,
            ..Self::unmatched()
        }
    }

    pub fn is_bound(&self) -> bool {
        self.patient_id.is_some()
    }
}

/// A row excluded from the import, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowError {
    /// 1-based data row number (header excluded)
    pub row: usize,
    pub reason: String,
}

/// Aggregate result of an import.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImportReport {
    pub entries_created: u32,
    pub patients_created: u32,
    pub phone_matched: u32,
    pub name_matched: u32,
    pub unmatched: u32,
    pub skipped_rows: u32,
    /// Rows already imported earlier (same fingerprint)
    pub duplicate_rows: u32,
    pub phone_conflicts: Vec<PhoneConflict>,
    pub row_errors: Vec<RowError>,
    pub entry_ids: Vec<String>,
}

impl ImportReport {
    pub fn skip(&mut self, row: usize, reason: impl Into<String>) {
        self.skipped_rows += 1;
        self.row_errors.push(RowError {
            row,
            reason: reason.into(),
        });
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
