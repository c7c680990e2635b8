//! Per-(doctor, date) queue state.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::{EntryStatus, ScheduleEntry};

/// One doctor's day. Every mutation of a partition happens under its own mutex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct PartitionKey {
    pub doctor_id: String,
    pub date: NaiveDate,
}

impl PartitionKey {
    pub fn new(doctor_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            doctor_id: doctor_id.into(),
            date,
        }
    }

    pub fn of(entry: &ScheduleEntry) -> Self {
        Self::new(entry.doctor_id.clone(), entry.date)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Partition {
    pub entries: HashMap<String, ScheduleEntry>,
}

impl Partition {
    /// Highest position handed out in this partition, plus one.
    pub fn next_position(&self) -> u32 {
        self.entries
            .values()
            .filter_map(|e| e.position)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Renumber waiting entries by check-in sequence. Entries that already left
    /// the waiting room keep their position; waiting ones rank above the highest.
    pub fn rerank(&mut self) {
        let settled = self
            .entries
            .values()
            .filter(|e| e.status != EntryStatus::CheckedIn)
            .filter_map(|e| e.position)
            .max()
            .unwrap_or(0);
        let mut ranked: Vec<(u64, String)> = self
            .entries
            .values()
            .filter(|e| e.status == EntryStatus::CheckedIn && e.position.is_some())
            .map(|e| (e.check_in_seq.unwrap_or(u64::MAX), e.id.clone()))
            .collect();
        ranked.sort();
        for (rank, (_, id)) in ranked.iter().enumerate() {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.position = Some(settled + rank as u32 + 1);
            }
        }
    }

    /// Entries sorted for display: queued ones by position, then the rest by time.
    pub fn sorted(&self) -> Vec<ScheduleEntry> {
        let mut entries: Vec<ScheduleEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| {
            (a.position.is_none(), a.position, a.start_time, &a.id).cmp(&(
                b.position.is_none(),
                b.position,
                b.start_time,
                &b.id,
            ))
        });
        entries
    }
}
