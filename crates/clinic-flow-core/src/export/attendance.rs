//! Daily attendance export.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::directory::DoctorDirectory;
use crate::error::FlowResult;
use crate::models::{EntryStatus, ScheduleEntry};
use crate::queue::QueueEngine;

/// Every entry of one day with its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceExport {
    pub date: NaiveDate,
    /// Export timestamp
    pub exported_at: String,
    pub rows: Vec<AttendanceRow>,
}

/// One entry of the day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRow {
    pub entry_id: String,
    pub start_time: String,
    pub doctor_id: String,
    pub doctor_name: String,
    pub patient_id: Option<String>,
    pub patient_name: String,
    pub status: EntryStatus,
    pub position: Option<u32>,
    pub checked_in_at: Option<String>,
    pub called_at: Option<String>,
    pub finished_at: Option<String>,
    pub from_import: bool,
}

impl AttendanceRow {
    fn from_entry(entry: &ScheduleEntry, directory: &dyn DoctorDirectory) -> Self {
        Self {
            entry_id: entry.id.clone(),
            start_time: entry.start_time.format("%H:%M").to_string(),
            doctor_id: entry.doctor_id.clone(),
            doctor_name: directory
                .doctor_name(&entry.doctor_id)
                .unwrap_or_else(|| entry.doctor_id.clone()),
            patient_id: entry.patient_id.clone(),
            patient_name: entry.display_name(),
            status: entry.status,
            position: entry.position,
            checked_in_at: entry.checked_in_at.map(|t| t.to_rfc3339()),
            called_at: entry.called_at.map(|t| t.to_rfc3339()),
            finished_at: entry.finished_at.map(|t| t.to_rfc3339()),
            from_import: entry.from_import,
        }
    }
}

impl AttendanceExport {
    /// Count of rows in a status.
    pub fn count(&self, status: EntryStatus) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV format.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("date,start_time,doctor,patient_id,patient,status,position,checked_in_at,called_at,finished_at,from_import\n");

        for row in &self.rows {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{},{},{}\n",
                self.date,
                row.start_time,
                escape_csv(&row.doctor_name),
                row.patient_id.as_deref().unwrap_or(""),
                escape_csv(&row.patient_name),
                row.status,
                row.position.map(|p| p.to_string()).unwrap_or_default(),
                row.checked_in_at.as_deref().unwrap_or(""),
                row.called_at.as_deref().unwrap_or(""),
                row.finished_at.as_deref().unwrap_or(""),
                row.from_import,
            ));
        }

        csv
    }
}

/// Attendance exporter.
pub struct AttendanceExporter<'a> {
    queue: &'a QueueEngine,
    directory: &'a dyn DoctorDirectory,
}

impl<'a> AttendanceExporter<'a> {
    pub fn new(queue: &'a QueueEngine, directory: &'a dyn DoctorDirectory) -> Self {
        Self { queue, directory }
    }

    /// Export every entry of `date`, grouped by doctor in queue order.
    pub fn export_day(&self, date: NaiveDate) -> FlowResult<AttendanceExport> {
        let rows = self
            .queue
            .entries_for_day(date)?
            .iter()
            .map(|entry| AttendanceRow::from_entry(entry, self.directory))
            .collect();

        Ok(AttendanceExport {
            date,
            exported_at: chrono::Utc::now().to_rfc3339(),
            rows,
        })
    }
}

/// Escape a string for CSV output.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::models::NewEntry;
    use chrono::NaiveTime;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn seeded() -> (QueueEngine, StaticDirectory) {
        let queue = QueueEngine::new();
        let directory = StaticDirectory::new();
        directory.add_doctor("dr-1", "Benali, Sofia").unwrap();

        let at = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
        let seen = queue
            .create_entry(NewEntry::manual(day(), at(9), "dr-1", None, "Amel", "Boudiaf"))
            .unwrap();
        let missed = queue
            .create_entry(NewEntry::manual(day(), at(10), "dr-1", None, "Karim", "Hadj"))
            .unwrap();
        queue.check_in(&seen.id).unwrap();
        queue.call(&seen.id).unwrap();
        queue.complete(&seen.id).unwrap();
        queue.mark_no_show(&missed.id).unwrap();
        (queue, directory)
    }

    #[test]
    fn test_export_day_covers_all_statuses() {
        let (queue, directory) = seeded();
        let export = AttendanceExporter::new(&queue, &directory)
            .export_day(day())
            .unwrap();

        assert_eq!(export.rows.len(), 2);
        assert_eq!(export.count(EntryStatus::Completed), 1);
        assert_eq!(export.count(EntryStatus::NoShow), 1);
        assert_eq!(export.rows[0].position, Some(1));
        assert!(export.rows[0].finished_at.is_some());
    }

    #[test]
    fn test_attendance_json() {
        let (queue, directory) = seeded();
        let export = AttendanceExporter::new(&queue, &directory)
            .export_day(day())
            .unwrap();

        let json = export.to_json().unwrap();
        assert!(json.contains("\"no_show\""));
        assert!(json.contains("Amel Boudiaf"));
    }

    #[test]
    fn test_attendance_csv() {
        let (queue, directory) = seeded();
        let csv = AttendanceExporter::new(&queue, &directory)
            .export_day(day())
            .unwrap()
            .to_csv();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("date,start_time"));
        assert!(lines[1].contains("\"Benali, Sofia\""));
        assert!(lines[1].contains("completed"));
        assert!(lines[2].contains("no_show"));
    }

    #[test]
    fn test_csv_escaping() {
        assert_eq!(escape_csv("simple"), "simple");
        assert_eq!(escape_csv("with,comma"), "\"with,comma\"");
        assert_eq!(escape_csv("with\"quote"), "\"with\"\"quote\"");
    }
}
