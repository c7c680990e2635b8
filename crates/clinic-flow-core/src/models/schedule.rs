//! Schedule / queue entry models.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a schedule entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Scheduled, patient not yet arrived
    Expected,
    /// Patient is in the waiting room
    CheckedIn,
    /// Called into treatment
    InTreatment,
    /// Visit done
    Completed,
    /// Patient never showed up
    NoShow,
    /// Patient left before the visit ended
    Left,
}

impl EntryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::NoShow | Self::Left)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expected => "expected",
            Self::CheckedIn => "checked_in",
            Self::InTreatment => "in_treatment",
            Self::Completed => "completed",
            Self::NoShow => "no_show",
            Self::Left => "left",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled or walk-in visit slot. The same record is the queue entry once
/// the patient checks in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    pub id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub doctor_id: String,
    pub box_id: Option<String>,
    /// Linked patient; `None` while the imported name is unmatched
    pub patient_id: Option<String>,
    /// Given name as written on the plan
    pub given_name: String,
    /// Family name as written on the plan
    pub family_name: String,
    pub phone: Option<String>,
    pub status: EntryStatus,
    /// Rank in the doctor's queue for the day, assigned at check-in
    pub position: Option<u32>,
    pub from_import: bool,
    /// Fingerprint of the imported row, used to skip re-imports
    pub import_fingerprint: Option<String>,
    pub zone_ids: Vec<String>,
    pub notes: Option<String>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub called_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Monotonic check-in ticket; orders entries across reassignment
    pub check_in_seq: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl ScheduleEntry {
    pub fn display_name(&self) -> String {
        super::patient::join_name(&self.given_name, &self.family_name)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Input for creating a schedule entry, either manually or from an import row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewEntry {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub doctor_id: String,
    pub box_id: Option<String>,
    pub patient_id: Option<String>,
    pub given_name: String,
    pub family_name: String,
    pub phone: Option<String>,
    pub zone_ids: Vec<String>,
    pub notes: Option<String>,
    pub from_import: bool,
    pub import_fingerprint: Option<String>,
}

impl NewEntry {
    /// Manual entry for a known patient.
    pub fn manual(
        date: NaiveDate,
        start_time: NaiveTime,
        doctor_id: impl Into<String>,
        patient_id: Option<String>,
        given_name: impl Into<String>,
        family_name: impl Into<String>,
    ) -> Self {
        Self {
            date,
            start_time,
            doctor_id: doctor_id.into(),
            box_id: None,
            patient_id,
            given_name: given_name.into(),
            family_name: family_name.into(),
            phone: None,
            zone_ids: Vec::new(),
            notes: None,
            from_import: false,
            import_fingerprint: None,
        }
    }

    pub(crate) fn into_entry(self) -> ScheduleEntry {
        ScheduleEntry {
            id: uuid::Uuid::new_v4().to_string(),
            date: self.date,
            start_time: self.start_time,
            doctor_id: self.doctor_id,
            box_id: self.box_id,
            patient_id: self.patient_id,
            given_name: self.given_name,
            family_name: self.family_name,
            phone: self.phone,
            status: EntryStatus::Expected,
            position: None,
            from_import: self.from_import,
            import_fingerprint: self.import_fingerprint,
            zone_ids: self.zone_ids,
            notes: self.notes,
            checked_in_at: None,
            called_at: None,
            finished_at: None,
            check_in_seq: None,
            created_at: Utc::now(),
        }
    }
}

/// How an operator resolves a check-in conflict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckInResolution {
    /// Check in anyway, leaving both entries in place
    Force,
    /// Fold this entry into the conflicting one and check that one in
    Merge,
}

/// Queue entries of one doctor, ordered by position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueGroup {
    pub doctor_id: String,
    pub entries: Vec<ScheduleEntry>,
}

/// Row of the queue listing surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItemView {
    pub id: String,
    pub patient_display_name: String,
    pub doctor_name: String,
    pub status: EntryStatus,
    pub position: Option<u32>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub box_name: Option<String>,
}

/// Listing grouped by doctor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueListing {
    pub doctor_id: String,
    pub doctor_name: String,
    pub items: Vec<QueueItemView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(EntryStatus::Completed.is_terminal());
        assert!(EntryStatus::NoShow.is_terminal());
        assert!(EntryStatus::Left.is_terminal());
        assert!(!EntryStatus::Expected.is_terminal());
        assert!(!EntryStatus::CheckedIn.is_terminal());
        assert!(!EntryStatus::InTreatment.is_terminal());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&EntryStatus::CheckedIn).unwrap();
        assert_eq!(json, "\"checked_in\"");
        assert_eq!(EntryStatus::NoShow.to_string(), "no_show");
    }

    #[test]
    fn test_new_entry_starts_expected_without_position() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let entry = NewEntry::manual(date, time, "dr-1", None, "Amel", "Boudiaf").into_entry();

        assert_eq!(entry.status, EntryStatus::Expected);
        assert!(entry.position.is_none());
        assert!(!entry.from_import);
        assert_eq!(entry.display_name(), "Amel Boudiaf");
    }
}
