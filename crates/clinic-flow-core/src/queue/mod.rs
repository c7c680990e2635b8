//! Waiting-queue lifecycle.
//!
//! ```text
//! expected --check_in--> checked_in --call--> in_treatment --complete--> completed
//! expected/checked_in --mark_no_show--> no_show
//! checked_in/in_treatment --mark_left--> left
//! ```
//!
//! Entries live in partitions keyed by (doctor, date). Each partition has its
//! own mutex, so positions are handed out serially within a doctor's day while
//! different doctors and days proceed in parallel.

mod partition;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::directory::DoctorDirectory;
use crate::error::{FlowError, FlowResult};
use crate::models::{
    CheckInConflict, CheckInResolution, Conflict, EntryStatus, NewEntry, Outcome, QueueGroup,
    QueueItemView, QueueListing, ScheduleEntry,
};

use partition::{Partition, PartitionKey};

/// How many times a lookup follows an entry that moved between partitions.
const MAX_RELOCATE_ATTEMPTS: usize = 8;

const ENTITY: &str = "entry";

/// Owner of every schedule entry and of its state machine.
#[derive(Default)]
pub struct QueueEngine {
    partitions: RwLock<HashMap<PartitionKey, Arc<Mutex<Partition>>>>,
    /// entry id → partition currently holding it
    locations: RwLock<HashMap<String, PartitionKey>>,
    /// Fingerprints of imported rows, kept after merges so re-imports stay skipped
    fingerprints: Mutex<HashSet<String>>,
    check_in_seq: AtomicU64,
}

impl QueueEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create one entry in `expected`.
    pub fn create_entry(&self, fields: NewEntry) -> FlowResult<ScheduleEntry> {
        let fingerprint = fields.import_fingerprint.clone();
        self.try_create_entry(fields)?.ok_or_else(|| {
            FlowError::Validation(format!(
                "an entry was already imported with fingerprint {}",
                fingerprint.unwrap_or_default()
            ))
        })
    }

    /// Create an entry unless one with the same import fingerprint already exists.
    pub fn try_create_entry(&self, fields: NewEntry) -> FlowResult<Option<ScheduleEntry>> {
        if fields.doctor_id.trim().is_empty() {
            return Err(FlowError::Validation("doctor_id is required".into()));
        }
        if let Some(fingerprint) = &fields.import_fingerprint {
            if !self.fingerprints.lock()?.insert(fingerprint.clone()) {
                return Ok(None);
            }
        }

        let entry = fields.into_entry();
        let key = PartitionKey::of(&entry);
        let partition = self.partition(&key)?;
        partition
            .lock()?
            .entries
            .insert(entry.id.clone(), entry.clone());
        self.locations.write()?.insert(entry.id.clone(), key);

        info!(
            "Created entry {} for {} with {} on {}",
            entry.id,
            entry.display_name(),
            entry.doctor_id,
            entry.date
        );
        Ok(Some(entry))
    }

    pub fn is_imported(&self, fingerprint: &str) -> FlowResult<bool> {
        Ok(self.fingerprints.lock()?.contains(fingerprint))
    }

    // =========================================================================
    // Check-in
    // =========================================================================

    /// Check an expected entry in, assigning the next position of its partition.
    ///
    /// If the same patient has another non-terminal entry that day, nothing
    /// changes and the conflict is returned.
    pub fn check_in(&self, entry_id: &str) -> FlowResult<Outcome<ScheduleEntry>> {
        let entry = self.get_entry(entry_id)?;
        if entry.status != EntryStatus::Expected {
            return Err(FlowError::transition(ENTITY, entry_id, entry.status, "check in"));
        }

        if let Some(conflict) = self.find_check_in_conflict(&entry)? {
            warn!(
                "Check-in of {} blocked: patient {} already has entry {}",
                entry_id, conflict.patient_id, conflict.conflicting_entry_id
            );
            return Ok(Outcome::Blocked(Conflict::CheckIn(conflict)));
        }

        self.with_partition_of(entry_id, |_, partition| {
            self.check_in_locked(partition, entry_id)
        })
        .map(Outcome::Proceed)
    }

    /// Apply an operator's decision on a blocked check-in.
    pub fn resolve_check_in(
        &self,
        entry_id: &str,
        resolution: CheckInResolution,
    ) -> FlowResult<ScheduleEntry> {
        match resolution {
            CheckInResolution::Force => {
                info!("Forcing check-in of {}", entry_id);
                self.with_partition_of(entry_id, |_, partition| {
                    self.check_in_locked(partition, entry_id)
                })
            }
            CheckInResolution::Merge => self.merge_into_conflicting(entry_id),
        }
    }

    fn check_in_locked(&self, partition: &mut Partition, entry_id: &str) -> FlowResult<ScheduleEntry> {
        let position = partition.next_position();
        let entry = partition
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| FlowError::not_found("Entry", entry_id))?;
        if entry.status != EntryStatus::Expected {
            return Err(FlowError::transition(ENTITY, entry_id, entry.status, "check in"));
        }

        entry.status = EntryStatus::CheckedIn;
        entry.position = Some(position);
        entry.checked_in_at = Some(Utc::now());
        entry.check_in_seq = Some(self.check_in_seq.fetch_add(1, Ordering::SeqCst));

        info!(
            "Checked in {} at position {} for {} on {}",
            entry_id, position, entry.doctor_id, entry.date
        );
        Ok(entry.clone())
    }

    fn find_check_in_conflict(&self, entry: &ScheduleEntry) -> FlowResult<Option<CheckInConflict>> {
        let Some(patient_id) = entry.patient_id.as_deref() else {
            return Ok(None);
        };
        let mut others: Vec<ScheduleEntry> = self
            .entries_for_day(entry.date)?
            .into_iter()
            .filter(|other| {
                other.id != entry.id
                    && !other.is_terminal()
                    && other.patient_id.as_deref() == Some(patient_id)
            })
            .collect();
        others.sort_by_key(|other| other.start_time);

        Ok(others.into_iter().next().map(|other| CheckInConflict {
            entry_id: entry.id.clone(),
            conflicting_entry_id: other.id,
            patient_id: patient_id.to_string(),
            date: entry.date,
            conflicting_doctor_id: other.doctor_id,
        }))
    }

    /// Fold `entry_id` into the entry it conflicts with and drop it.
    fn merge_into_conflicting(&self, entry_id: &str) -> FlowResult<ScheduleEntry> {
        let entry = self.get_entry(entry_id)?;
        if entry.status != EntryStatus::Expected {
            return Err(FlowError::transition(ENTITY, entry_id, entry.status, "merge"));
        }
        let conflict = self.find_check_in_conflict(&entry)?.ok_or_else(|| {
            FlowError::Validation(format!("entry {} has no conflicting entry to merge into", entry_id))
        })?;
        let survivor_id = conflict.conflicting_entry_id;

        let (dup_key, dup_partition) = self.locate(entry_id)?;
        let (keep_key, keep_partition) = self.locate(&survivor_id)?;

        let merged = if dup_key == keep_key {
            let mut partition = dup_partition.lock()?;
            let duplicate = expected_entry(&partition, entry_id)?;
            let merged = self.absorb(&mut partition, &survivor_id, duplicate)?;
            partition.entries.remove(entry_id);
            merged
        } else {
            let (mut dup, mut keep) = if dup_key < keep_key {
                let dup = dup_partition.lock()?;
                (dup, keep_partition.lock()?)
            } else {
                let keep = keep_partition.lock()?;
                (dup_partition.lock()?, keep)
            };
            let duplicate = expected_entry(&dup, entry_id)?;
            let merged = self.absorb(&mut keep, &survivor_id, duplicate)?;
            dup.entries.remove(entry_id);
            merged
        };
        self.locations.write()?.remove(entry_id);

        info!("Merged entry {} into {}", entry_id, merged.id);
        Ok(merged)
    }

    fn absorb(
        &self,
        partition: &mut Partition,
        survivor_id: &str,
        duplicate: ScheduleEntry,
    ) -> FlowResult<ScheduleEntry> {
        let survivor = partition
            .entries
            .get_mut(survivor_id)
            .ok_or_else(|| FlowError::not_found("Entry", survivor_id))?;
        if survivor.is_terminal() {
            return Err(FlowError::transition(ENTITY, survivor_id, survivor.status, "merge into"));
        }

        for zone in duplicate.zone_ids {
            if !survivor.zone_ids.contains(&zone) {
                survivor.zone_ids.push(zone);
            }
        }
        survivor.notes = match (survivor.notes.take(), duplicate.notes) {
            (Some(a), Some(b)) if a != b => Some(format!("{}\n{}", a, b)),
            (a, b) => a.or(b),
        };
        if survivor.phone.is_none() {
            survivor.phone = duplicate.phone;
        }

        if survivor.status == EntryStatus::Expected {
            self.check_in_locked(partition, survivor_id)
        } else {
            Ok(survivor.clone())
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Call a waiting patient into treatment.
    pub fn call(&self, entry_id: &str) -> FlowResult<ScheduleEntry> {
        let entry = self.transition(entry_id, "call", &[EntryStatus::CheckedIn], |e| {
            e.status = EntryStatus::InTreatment;
            e.called_at = Some(Utc::now());
        })?;
        info!("Called {} ({}) into treatment", entry.id, entry.display_name());
        Ok(entry)
    }

    pub fn complete(&self, entry_id: &str) -> FlowResult<ScheduleEntry> {
        let entry = self.transition(entry_id, "complete", &[EntryStatus::InTreatment], |e| {
            e.status = EntryStatus::Completed;
            e.finished_at = Some(Utc::now());
        })?;
        info!("Completed {}", entry.id);
        Ok(entry)
    }

    pub fn mark_no_show(&self, entry_id: &str) -> FlowResult<ScheduleEntry> {
        let entry = self.transition(
            entry_id,
            "mark no-show",
            &[EntryStatus::Expected, EntryStatus::CheckedIn],
            |e| {
                e.status = EntryStatus::NoShow;
                e.finished_at = Some(Utc::now());
            },
        )?;
        info!("Marked {} as no-show", entry.id);
        Ok(entry)
    }

    pub fn mark_left(&self, entry_id: &str) -> FlowResult<ScheduleEntry> {
        let entry = self.transition(
            entry_id,
            "mark left",
            &[EntryStatus::CheckedIn, EntryStatus::InTreatment],
            |e| {
                e.status = EntryStatus::Left;
                e.finished_at = Some(Utc::now());
            },
        )?;
        info!("Marked {} as left", entry.id);
        Ok(entry)
    }

    /// Move an entry to another doctor on the same day.
    ///
    /// A checked-in entry keeps its place relative to the other patients: the
    /// target queue is re-ranked by original check-in order.
    pub fn reassign(&self, entry_id: &str, doctor_id: &str) -> FlowResult<ScheduleEntry> {
        if doctor_id.trim().is_empty() {
            return Err(FlowError::Validation("doctor_id is required".into()));
        }

        for _ in 0..MAX_RELOCATE_ATTEMPTS {
            let (from_key, from) = self.locate(entry_id)?;
            if from_key.doctor_id == doctor_id {
                return Err(FlowError::Validation(format!(
                    "entry {} is already assigned to {}",
                    entry_id, doctor_id
                )));
            }
            let to_key = PartitionKey::new(doctor_id, from_key.date);
            let to = self.partition(&to_key)?;

            let (mut source, mut target) = if from_key < to_key {
                let source = from.lock()?;
                (source, to.lock()?)
            } else {
                let target = to.lock()?;
                (from.lock()?, target)
            };

            let Some(current) = source.entries.get(entry_id) else {
                continue;
            };
            if !matches!(current.status, EntryStatus::Expected | EntryStatus::CheckedIn) {
                return Err(FlowError::transition(ENTITY, entry_id, current.status, "reassign"));
            }

            let Some(mut entry) = source.entries.remove(entry_id) else {
                continue;
            };
            let previous = std::mem::replace(&mut entry.doctor_id, doctor_id.to_string());
            let queued = entry.position.is_some();
            target.entries.insert(entry.id.clone(), entry);
            if queued {
                target.rerank();
            }
            self.locations
                .write()?
                .insert(entry_id.to_string(), to_key.clone());

            let moved = target
                .entries
                .get(entry_id)
                .cloned()
                .ok_or_else(|| FlowError::not_found("Entry", entry_id))?;
            info!(
                "Reassigned {} from {} to {} (position {:?})",
                entry_id, previous, doctor_id, moved.position
            );
            return Ok(moved);
        }
        Err(FlowError::not_found("Entry", entry_id))
    }

    /// Link an entry to a registry patient (manual match).
    pub fn link_patient(&self, entry_id: &str, patient_id: &str) -> FlowResult<ScheduleEntry> {
        if patient_id.trim().is_empty() {
            return Err(FlowError::Validation("patient_id is required".into()));
        }
        let entry = self.update_open(entry_id, "link patient to", |e| {
            e.patient_id = Some(patient_id.to_string());
        })?;
        info!("Linked entry {} to patient {}", entry_id, patient_id);
        Ok(entry)
    }

    pub fn assign_box(&self, entry_id: &str, box_id: Option<&str>) -> FlowResult<ScheduleEntry> {
        self.update_open(entry_id, "assign box to", |e| {
            e.box_id = box_id.map(str::to_string);
        })
    }

    fn update_open(
        &self,
        entry_id: &str,
        action: &'static str,
        apply: impl FnOnce(&mut ScheduleEntry),
    ) -> FlowResult<ScheduleEntry> {
        self.transition(
            entry_id,
            action,
            &[
                EntryStatus::Expected,
                EntryStatus::CheckedIn,
                EntryStatus::InTreatment,
            ],
            apply,
        )
    }

    fn transition(
        &self,
        entry_id: &str,
        action: &'static str,
        allowed: &[EntryStatus],
        apply: impl FnOnce(&mut ScheduleEntry),
    ) -> FlowResult<ScheduleEntry> {
        self.with_partition_of(entry_id, |_, partition| {
            let entry = partition
                .entries
                .get_mut(entry_id)
                .ok_or_else(|| FlowError::not_found("Entry", entry_id))?;
            if !allowed.contains(&entry.status) {
                return Err(FlowError::transition(ENTITY, entry_id, entry.status, action));
            }
            apply(entry);
            Ok(entry.clone())
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get_entry(&self, entry_id: &str) -> FlowResult<ScheduleEntry> {
        self.with_partition_of(entry_id, |_, partition| {
            partition
                .entries
                .get(entry_id)
                .cloned()
                .ok_or_else(|| FlowError::not_found("Entry", entry_id))
        })
    }

    /// Every entry of a day, all statuses, grouped by doctor then queue order.
    pub fn entries_for_day(&self, date: NaiveDate) -> FlowResult<Vec<ScheduleEntry>> {
        let mut entries = Vec::new();
        for (_, partition) in self.partitions_for(date, None)? {
            entries.extend(partition.lock()?.sorted());
        }
        Ok(entries)
    }

    /// Non-terminal entries of a day grouped by doctor, ordered by position.
    /// Entries not yet checked in follow, by appointment time.
    pub fn list_queue(&self, date: NaiveDate, doctor_id: Option<&str>) -> FlowResult<Vec<QueueGroup>> {
        let mut groups = Vec::new();
        for (key, partition) in self.partitions_for(date, doctor_id)? {
            let entries: Vec<ScheduleEntry> = partition
                .lock()?
                .sorted()
                .into_iter()
                .filter(|e| !e.is_terminal())
                .collect();
            if !entries.is_empty() {
                groups.push(QueueGroup {
                    doctor_id: key.doctor_id,
                    entries,
                });
            }
        }
        Ok(groups)
    }

    /// Queue rendered with display names.
    pub fn listing(
        &self,
        date: NaiveDate,
        doctor_id: Option<&str>,
        directory: &dyn DoctorDirectory,
    ) -> FlowResult<Vec<QueueListing>> {
        let listing = self
            .list_queue(date, doctor_id)?
            .into_iter()
            .map(|group| {
                let doctor_name = directory
                    .doctor_name(&group.doctor_id)
                    .unwrap_or_else(|| group.doctor_id.clone());
                let items = group
                    .entries
                    .iter()
                    .map(|e| QueueItemView {
                        id: e.id.clone(),
                        patient_display_name: e.display_name(),
                        doctor_name: doctor_name.clone(),
                        status: e.status,
                        position: e.position,
                        checked_in_at: e.checked_in_at,
                        box_name: e.box_id.as_deref().map(|id| {
                            directory.box_name(id).unwrap_or_else(|| id.to_string())
                        }),
                    })
                    .collect();
                QueueListing {
                    doctor_id: group.doctor_id,
                    doctor_name,
                    items,
                }
            })
            .collect();
        Ok(listing)
    }

    // =========================================================================
    // Partition plumbing
    // =========================================================================

    fn partition(&self, key: &PartitionKey) -> FlowResult<Arc<Mutex<Partition>>> {
        if let Some(partition) = self.partitions.read()?.get(key) {
            return Ok(Arc::clone(partition));
        }
        let mut partitions = self.partitions.write()?;
        Ok(Arc::clone(partitions.entry(key.clone()).or_default()))
    }

    fn partitions_for(
        &self,
        date: NaiveDate,
        doctor_id: Option<&str>,
    ) -> FlowResult<Vec<(PartitionKey, Arc<Mutex<Partition>>)>> {
        let mut selected: Vec<(PartitionKey, Arc<Mutex<Partition>>)> = self
            .partitions
            .read()?
            .iter()
            .filter(|(key, _)| key.date == date)
            .filter(|(key, _)| doctor_id.map_or(true, |d| key.doctor_id == d))
            .map(|(key, partition)| (key.clone(), Arc::clone(partition)))
            .collect();
        selected.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(selected)
    }

    fn locate(&self, entry_id: &str) -> FlowResult<(PartitionKey, Arc<Mutex<Partition>>)> {
        let key = self
            .locations
            .read()?
            .get(entry_id)
            .cloned()
            .ok_or_else(|| FlowError::not_found("Entry", entry_id))?;
        let partition = self
            .partitions
            .read()?
            .get(&key)
            .cloned()
            .ok_or_else(|| FlowError::not_found("Entry", entry_id))?;
        Ok((key, partition))
    }

    /// Run `f` with the lock of the partition holding `entry_id`.
    fn with_partition_of<R>(
        &self,
        entry_id: &str,
        f: impl FnOnce(&PartitionKey, &mut Partition) -> FlowResult<R>,
    ) -> FlowResult<R> {
        for _ in 0..MAX_RELOCATE_ATTEMPTS {
            let (key, partition) = self.locate(entry_id)?;
            let mut guard = partition.lock()?;
            if guard.entries.contains_key(entry_id) {
                return f(&key, &mut guard);
            }
        }
        Err(FlowError::not_found("Entry", entry_id))
    }
}

fn expected_entry(partition: &Partition, entry_id: &str) -> FlowResult<ScheduleEntry> {
    match partition.entries.get(entry_id) {
        Some(e) if e.status == EntryStatus::Expected => Ok(e.clone()),
        Some(e) => Err(FlowError::transition(ENTITY, entry_id, e.status, "merge")),
        None => Err(FlowError::not_found("Entry", entry_id)),
    }
}
