//! The clinic day, end to end.
//!
//! `ClinicFlow` owns one instance of each engine and wires the steps that span
//! two of them: calling a waiting patient into a treatment session, finishing
//! that treatment, and a patient leaving mid-visit.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::FlowConfig;
use crate::consultation::PreConsultationWorkflow;
use crate::directory::DoctorDirectory;
use crate::error::{FlowError, FlowResult};
use crate::export::{AttendanceExport, AttendanceExporter};
use crate::import::{ImportOptions, ScheduleImporter};
use crate::models::{
    ActiveSession, EndOutcome, EntryStatus, ImportReport, LaserParams, Outcome, PendingZone,
    QueueListing, ScheduleEntry, SessionEnded, StartSession,
};
use crate::queue::QueueEngine;
use crate::registry::PatientRegistry;
use crate::session::SessionOrchestrator;

/// A queue entry called into a running session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Treatment {
    pub entry: ScheduleEntry,
    pub session: ActiveSession,
}

/// Result of finishing the current zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreatmentFinished {
    pub ended: SessionEnded,
    /// The visit's entry, when this was its last zone
    pub completed_entry: Option<ScheduleEntry>,
}

pub struct ClinicFlow {
    config: FlowConfig,
    registry: Arc<dyn PatientRegistry>,
    directory: Arc<dyn DoctorDirectory>,
    queue: QueueEngine,
    sessions: SessionOrchestrator,
    consultations: PreConsultationWorkflow,
}

impl ClinicFlow {
    pub fn new(
        config: FlowConfig,
        registry: Arc<dyn PatientRegistry>,
        directory: Arc<dyn DoctorDirectory>,
    ) -> FlowResult<Self> {
        config.validate()?;
        Ok(Self {
            sessions: SessionOrchestrator::new(Arc::clone(&registry)),
            consultations: PreConsultationWorkflow::new(
                Arc::clone(&registry),
                config.default_sessions_per_zone,
            ),
            queue: QueueEngine::new(),
            config,
            registry,
            directory,
        })
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn registry(&self) -> &dyn PatientRegistry {
        self.registry.as_ref()
    }

    pub fn directory(&self) -> &dyn DoctorDirectory {
        self.directory.as_ref()
    }

    pub fn queue(&self) -> &QueueEngine {
        &self.queue
    }

    pub fn sessions(&self) -> &SessionOrchestrator {
        &self.sessions
    }

    pub fn consultations(&self) -> &PreConsultationWorkflow {
        &self.consultations
    }

    // =========================================================================
    // Schedule
    // =========================================================================

    fn importer(&self) -> ScheduleImporter<'_> {
        ScheduleImporter::new(
            self.registry.as_ref(),
            &self.queue,
            self.directory.as_ref(),
            &self.config,
        )
    }

    pub fn import_schedule(&self, data: &[u8], options: &ImportOptions) -> FlowResult<ImportReport> {
        self.importer().import_bytes(data, options)
    }

    pub fn import_schedule_file<P: AsRef<Path>>(
        &self,
        path: P,
        options: &ImportOptions,
    ) -> FlowResult<ImportReport> {
        self.importer().import_path(path, options)
    }

    /// Link an unmatched entry to a patient known to the registry.
    pub fn link_patient(&self, entry_id: &str, patient_id: &str) -> FlowResult<ScheduleEntry> {
        if self.registry.get_patient(patient_id)?.is_none() {
            return Err(FlowError::not_found("Patient", patient_id));
        }
        self.queue.link_patient(entry_id, patient_id)
    }

    pub fn listing(&self, date: NaiveDate, doctor_id: Option<&str>) -> FlowResult<Vec<QueueListing>> {
        self.queue.listing(date, doctor_id, self.directory.as_ref())
    }

    pub fn attendance(&self, date: NaiveDate) -> FlowResult<AttendanceExport> {
        AttendanceExporter::new(&self.queue, self.directory.as_ref()).export_day(date)
    }

    // =========================================================================
    // Treatment
    // =========================================================================

    /// Start a session for a waiting patient, then move the entry to `in_treatment`.
    ///
    /// `zones` are treated in order; when empty, the zones planned on the entry
    /// are used. A busy practitioner blocks the call and the entry stays checked in.
    pub fn call_to_treatment(
        &self,
        entry_id: &str,
        practitioner_id: &str,
        zones: Vec<PendingZone>,
        laser_params: LaserParams,
    ) -> FlowResult<Outcome<Treatment>> {
        let entry = self.queue.get_entry(entry_id)?;
        if entry.status != EntryStatus::CheckedIn {
            return Err(FlowError::transition("entry", entry_id, entry.status, "call"));
        }
        let Some(patient_id) = entry.patient_id.clone() else {
            return Err(FlowError::Validation(format!(
                "entry {} is not linked to a patient",
                entry_id
            )));
        };

        let mut zones = if zones.is_empty() {
            entry.zone_ids.iter().map(PendingZone::new).collect()
        } else {
            zones
        };
        if zones.is_empty() {
            return Err(FlowError::Validation(format!(
                "no zone to treat for entry {}",
                entry_id
            )));
        }
        let first = zones.remove(0);

        let started = self.sessions.start_session(StartSession {
            practitioner_id: practitioner_id.to_string(),
            patient_id,
            first_zone_id: first.zone_id,
            remaining_zones: zones,
            laser_params: first.laser_params.unwrap_or(laser_params),
            queue_entry_id: Some(entry_id.to_string()),
        })?;
        let session = match started {
            Outcome::Proceed(session) => session,
            Outcome::Blocked(conflict) => return Ok(Outcome::Blocked(conflict)),
        };

        match self.queue.call(entry_id) {
            Ok(entry) => {
                info!(
                    "Entry {} called by practitioner {} (session {})",
                    entry_id, practitioner_id, session.session_id
                );
                Ok(Outcome::Proceed(Treatment { entry, session }))
            }
            Err(e) => {
                // The entry moved on meanwhile; the session must not outlive it
                self.sessions.cancel_session(practitioner_id)?;
                Err(e)
            }
        }
    }

    /// End the current zone. After the last zone, the visit's entry is completed.
    pub fn finish_treatment(
        &self,
        practitioner_id: &str,
        outcome: EndOutcome,
    ) -> FlowResult<TreatmentFinished> {
        let entry_id = self
            .sessions
            .active_session(practitioner_id)?
            .and_then(|s| s.queue_entry_id);
        let ended = self.sessions.end_session(practitioner_id, outcome)?;

        let mut completed_entry = None;
        if let (None, Some(entry_id)) = (&ended.next, entry_id) {
            match self.queue.complete(&entry_id) {
                Ok(entry) => completed_entry = Some(entry),
                Err(e) => warn!(
                    "Session {} ended but entry {} was not completed: {}",
                    ended.event.session_id, entry_id, e
                ),
            }
        }

        Ok(TreatmentFinished {
            ended,
            completed_entry,
        })
    }

    /// The patient left: close the entry and drop any session running for it.
    pub fn mark_left(&self, entry_id: &str) -> FlowResult<ScheduleEntry> {
        let entry = self.queue.mark_left(entry_id)?;
        if let Some(session) = self.sessions.cancel_for_entry(entry_id)? {
            info!(
                "Patient of entry {} left during session {}",
                entry_id, session.session_id
            );
        }
        Ok(entry)
    }
}
