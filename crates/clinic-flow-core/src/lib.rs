//! Clinic Flow Core Library
//!
//! Visit and session orchestration for a laser hair-removal clinic: from the
//! appointment sheet to the waiting room, the treatment box and back.
//!
//! # Architecture
//!
//! ```text
//! Appointment sheet (CSV)
//!         │
//!         ▼
//!   ScheduleImporter ──► PatientMatcher ──► PatientRegistry
//!         │                (phone, name)      (patients, zone allocations)
//!         ▼                                          ▲
//!     QueueEngine                                    │
//!   expected → checked_in → in_treatment → completed │
//!         │                                          │
//!         ▼                                          │
//! SessionOrchestrator ── one active session per ─────┘
//!   practitioner, pending zones chained in order
//!
//! PreConsultationWorkflow: draft → pending_validation → validated → patient_created
//! ```
//!
//! # Core Principle
//!
//! **Conflicts are data, never errors.** A duplicate check-in, a phone number
//! that belongs to someone else or a busy practitioner come back as
//! [`Outcome::Blocked`] for the operator to resolve.
//!
//! # Modules
//!
//! - [`queue`]: Per-(doctor, date) queues and the entry state machine
//! - [`import`]: Appointment sheet intake
//! - [`matcher`]: Phone and fuzzy-name patient matching
//! - [`session`]: Treatment sessions per practitioner
//! - [`consultation`]: Medical intake gating patient creation
//! - [`registry`]: Patient registry boundary (in-memory and SQLite)
//! - [`flow`]: Cross-engine steps of a visit
//! - [`export`]: Daily attendance export

pub mod config;
pub mod consultation;
pub mod db;
pub mod directory;
pub mod error;
pub mod export;
pub mod flow;
pub mod import;
pub mod matcher;
pub mod models;
pub mod queue;
pub mod registry;
pub mod session;

// Re-export commonly used types
pub use config::FlowConfig;
pub use consultation::PreConsultationWorkflow;
pub use db::Database;
pub use directory::{DoctorDirectory, StaticDirectory};
pub use error::{FlowError, FlowResult};
pub use flow::{ClinicFlow, Treatment, TreatmentFinished};
pub use import::{ImportOptions, ScheduleImporter};
pub use matcher::PatientMatcher;
pub use models::{
    ActiveSession, CheckInResolution, Conflict, ConsultationStatus, EntryStatus, ImportReport,
    LaserParams, Outcome, Patient, PreConsultation, ScheduleEntry,
};
pub use queue::QueueEngine;
pub use registry::{InMemoryRegistry, PatientRegistry, RegistryError, SqliteRegistry};
pub use session::SessionOrchestrator;

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing_subscriber::EnvFilter;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicFlowError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unreadable file: {0}")]
    UnreadableFile(String),

    #[error("Registry error: {0}")]
    RegistryError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<FlowError> for ClinicFlowError {
    fn from(e: FlowError) -> Self {
        let message = e.to_string();
        match e {
            FlowError::Validation(_) => ClinicFlowError::Validation(message),
            FlowError::InvalidTransition { .. } => ClinicFlowError::InvalidTransition(message),
            FlowError::NotFound { .. } => ClinicFlowError::NotFound(message),
            FlowError::UnreadableFile(_) => ClinicFlowError::UnreadableFile(message),
            FlowError::Registry(_) | FlowError::LockPoisoned(_) => {
                ClinicFlowError::RegistryError(message)
            }
        }
    }
}

impl From<RegistryError> for ClinicFlowError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(what) => ClinicFlowError::NotFound(what),
            other => ClinicFlowError::RegistryError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClinicFlowError {
    fn from(e: serde_json::Error) -> Self {
        ClinicFlowError::SerializationError(e.to_string())
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, ClinicFlowError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ClinicFlowError::InvalidInput(format!("expected YYYY-MM-DD, got '{}'", value)))
}

fn parse_time(value: &str) -> Result<NaiveTime, ClinicFlowError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ClinicFlowError::InvalidInput(format!("expected HH:MM, got '{}'", value)))
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Install a `tracing` subscriber writing to stderr. Later calls are no-ops.
#[uniffi::export]
pub fn init_logging(filter: String) {
    let filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Open the engine over a SQLite patient registry at the given path.
#[uniffi::export]
pub fn open_clinic_flow(db_path: String) -> Result<Arc<ClinicFlowCore>, ClinicFlowError> {
    ClinicFlowCore::build(Arc::new(SqliteRegistry::open(&db_path)?))
}

/// Open the engine over an in-memory SQLite registry (for testing).
#[uniffi::export]
pub fn open_clinic_flow_in_memory() -> Result<Arc<ClinicFlowCore>, ClinicFlowError> {
    ClinicFlowCore::build(Arc::new(SqliteRegistry::open_in_memory()?))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe engine handle for FFI.
#[derive(uniffi::Object)]
pub struct ClinicFlowCore {
    flow: ClinicFlow,
    directory: Arc<StaticDirectory>,
}

impl ClinicFlowCore {
    fn build(registry: Arc<dyn PatientRegistry>) -> Result<Arc<Self>, ClinicFlowError> {
        let directory = Arc::new(StaticDirectory::new());
        let flow = ClinicFlow::new(FlowConfig::from_env(), registry, directory.clone())?;
        Ok(Arc::new(Self { flow, directory }))
    }
}

#[uniffi::export]
impl ClinicFlowCore {
    // =========================================================================
    // Directory
    // =========================================================================

    pub fn add_doctor(&self, doctor_id: String, name: String) -> Result<(), ClinicFlowError> {
        Ok(self.directory.add_doctor(doctor_id, name)?)
    }

    pub fn add_box(&self, box_id: String, name: String) -> Result<(), ClinicFlowError> {
        Ok(self.directory.add_box(box_id, name)?)
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    pub fn get_patient(&self, patient_id: String) -> Result<Option<FfiPatient>, ClinicFlowError> {
        let patient = self.flow.registry().get_patient(&patient_id)?;
        Ok(patient.map(|p| p.into()))
    }

    pub fn get_zone_allocations(
        &self,
        patient_id: String,
    ) -> Result<Vec<FfiZoneAllocation>, ClinicFlowError> {
        let allocations = self.flow.registry().zone_allocations(&patient_id)?;
        Ok(allocations.into_iter().map(|a| a.into()).collect())
    }

    // =========================================================================
    // Schedule Import
    // =========================================================================

    /// Import an appointment sheet given as CSV bytes.
    pub fn import_schedule(
        &self,
        data: Vec<u8>,
        default_doctor_id: Option<String>,
    ) -> Result<FfiImportReport, ClinicFlowError> {
        let report = self
            .flow
            .import_schedule(&data, &ImportOptions { default_doctor_id })?;
        Ok(report.into())
    }

    pub fn import_schedule_file(
        &self,
        path: String,
        default_doctor_id: Option<String>,
    ) -> Result<FfiImportReport, ClinicFlowError> {
        let report = self
            .flow
            .import_schedule_file(&path, &ImportOptions { default_doctor_id })?;
        Ok(report.into())
    }

    // =========================================================================
    // Queue Operations
    // =========================================================================

    pub fn create_entry(&self, entry: FfiNewEntry) -> Result<FfiScheduleEntry, ClinicFlowError> {
        let fields = models::NewEntry {
            date: parse_date(&entry.date)?,
            start_time: parse_time(&entry.start_time)?,
            doctor_id: entry.doctor_id,
            box_id: entry.box_id,
            patient_id: entry.patient_id,
            given_name: entry.given_name,
            family_name: entry.family_name,
            phone: entry.phone,
            zone_ids: entry.zone_ids,
            notes: entry.notes,
            from_import: false,
            import_fingerprint: None,
        };
        Ok(self.flow.queue().create_entry(fields)?.into())
    }

    pub fn get_entry(&self, entry_id: String) -> Result<FfiScheduleEntry, ClinicFlowError> {
        Ok(self.flow.queue().get_entry(&entry_id)?.into())
    }

    /// Check a patient in. A conflict leaves the entry untouched.
    pub fn check_in(&self, entry_id: String) -> Result<FfiEntryOutcome, ClinicFlowError> {
        Ok(self.flow.queue().check_in(&entry_id)?.into())
    }

    /// Check in despite a conflict.
    pub fn force_check_in(&self, entry_id: String) -> Result<FfiScheduleEntry, ClinicFlowError> {
        let entry = self
            .flow
            .queue()
            .resolve_check_in(&entry_id, CheckInResolution::Force)?;
        Ok(entry.into())
    }

    /// Fold the entry into the conflicting one. Returns the surviving entry.
    pub fn merge_check_in(&self, entry_id: String) -> Result<FfiScheduleEntry, ClinicFlowError> {
        let entry = self
            .flow
            .queue()
            .resolve_check_in(&entry_id, CheckInResolution::Merge)?;
        Ok(entry.into())
    }

    pub fn mark_no_show(&self, entry_id: String) -> Result<FfiScheduleEntry, ClinicFlowError> {
        Ok(self.flow.queue().mark_no_show(&entry_id)?.into())
    }

    pub fn mark_left(&self, entry_id: String) -> Result<FfiScheduleEntry, ClinicFlowError> {
        Ok(self.flow.mark_left(&entry_id)?.into())
    }

    pub fn reassign(
        &self,
        entry_id: String,
        doctor_id: String,
    ) -> Result<FfiScheduleEntry, ClinicFlowError> {
        Ok(self.flow.queue().reassign(&entry_id, &doctor_id)?.into())
    }

    pub fn link_patient(
        &self,
        entry_id: String,
        patient_id: String,
    ) -> Result<FfiScheduleEntry, ClinicFlowError> {
        Ok(self.flow.link_patient(&entry_id, &patient_id)?.into())
    }

    pub fn assign_box(
        &self,
        entry_id: String,
        box_id: Option<String>,
    ) -> Result<FfiScheduleEntry, ClinicFlowError> {
        let entry = self.flow.queue().assign_box(&entry_id, box_id.as_deref())?;
        Ok(entry.into())
    }

    /// Queue of a day grouped by doctor.
    pub fn list_queue(
        &self,
        date: String,
        doctor_id: Option<String>,
    ) -> Result<Vec<FfiQueueListing>, ClinicFlowError> {
        let listing = self.flow.listing(parse_date(&date)?, doctor_id.as_deref())?;
        Ok(listing.into_iter().map(|l| l.into()).collect())
    }

    // =========================================================================
    // Treatment Operations
    // =========================================================================

    /// Call a checked-in patient into treatment. Empty `zone_ids` treats the
    /// zones planned on the entry.
    pub fn call_to_treatment(
        &self,
        entry_id: String,
        practitioner_id: String,
        zone_ids: Vec<String>,
        laser_params: FfiLaserParams,
    ) -> Result<FfiSessionOutcome, ClinicFlowError> {
        let zones = zone_ids.into_iter().map(models::PendingZone::new).collect();
        let outcome = self.flow.call_to_treatment(
            &entry_id,
            &practitioner_id,
            zones,
            laser_params.into(),
        )?;
        Ok(outcome.map(|t| t.session).into())
    }

    /// Start a session without a queue entry.
    pub fn start_session(
        &self,
        practitioner_id: String,
        patient_id: String,
        zone_ids: Vec<String>,
        laser_params: FfiLaserParams,
    ) -> Result<FfiSessionOutcome, ClinicFlowError> {
        let mut zones = zone_ids.into_iter();
        let first_zone_id = zones
            .next()
            .ok_or_else(|| ClinicFlowError::InvalidInput("at least one zone is required".into()))?;
        let outcome = self.flow.sessions().start_session(models::StartSession {
            practitioner_id,
            patient_id,
            first_zone_id,
            remaining_zones: zones.map(models::PendingZone::new).collect(),
            laser_params: laser_params.into(),
            queue_entry_id: None,
        })?;
        Ok(outcome.into())
    }

    /// End the current zone; the next pending zone starts automatically.
    pub fn end_session(
        &self,
        practitioner_id: String,
        outcome: FfiEndOutcome,
    ) -> Result<FfiSessionEnded, ClinicFlowError> {
        let finished = self.flow.finish_treatment(&practitioner_id, outcome.into())?;
        Ok(finished.into())
    }

    pub fn pause_session(&self, practitioner_id: String) -> Result<FfiActiveSession, ClinicFlowError> {
        Ok(self.flow.sessions().pause(&practitioner_id)?.into())
    }

    pub fn resume_session(&self, practitioner_id: String) -> Result<FfiActiveSession, ClinicFlowError> {
        Ok(self.flow.sessions().resume(&practitioner_id)?.into())
    }

    pub fn cancel_session(
        &self,
        practitioner_id: String,
    ) -> Result<Option<FfiActiveSession>, ClinicFlowError> {
        let cancelled = self.flow.sessions().cancel_session(&practitioner_id)?;
        Ok(cancelled.map(|s| s.into()))
    }

    pub fn get_active_session(
        &self,
        practitioner_id: String,
    ) -> Result<Option<FfiActiveSession>, ClinicFlowError> {
        let active = self.flow.sessions().active_session(&practitioner_id)?;
        Ok(active.map(|s| s.into()))
    }

    // =========================================================================
    // Pre-consultation Operations
    // =========================================================================

    pub fn create_pre_consultation(
        &self,
        form: FfiPreConsultationForm,
    ) -> Result<FfiPreConsultation, ClinicFlowError> {
        Ok(self.flow.consultations().create_draft(form.into())?.into())
    }

    pub fn update_pre_consultation(
        &self,
        id: String,
        form: FfiPreConsultationForm,
    ) -> Result<FfiPreConsultation, ClinicFlowError> {
        Ok(self.flow.consultations().update_draft(&id, form.into())?.into())
    }

    pub fn set_zone_evaluation(
        &self,
        id: String,
        evaluation: FfiZoneEvaluation,
    ) -> Result<FfiPreConsultation, ClinicFlowError> {
        let record = self
            .flow
            .consultations()
            .set_zone_evaluation(&id, evaluation.into())?;
        Ok(record.into())
    }

    pub fn submit_pre_consultation(&self, id: String) -> Result<FfiPreConsultation, ClinicFlowError> {
        Ok(self.flow.consultations().submit(&id)?.into())
    }

    pub fn validate_pre_consultation(
        &self,
        id: String,
        validator_id: String,
    ) -> Result<FfiPreConsultation, ClinicFlowError> {
        Ok(self.flow.consultations().validate(&id, &validator_id)?.into())
    }

    pub fn reject_pre_consultation(
        &self,
        id: String,
        reason: String,
    ) -> Result<FfiPreConsultation, ClinicFlowError> {
        Ok(self.flow.consultations().reject(&id, &reason)?.into())
    }

    /// Create the patient of a validated pre-consultation with allocations for
    /// the eligible zones among `zone_ids`.
    pub fn create_patient_from_pre_consultation(
        &self,
        id: String,
        zone_ids: Vec<String>,
        sessions_per_zone: Option<u32>,
    ) -> Result<FfiPatientCreation, ClinicFlowError> {
        let creation = self.flow.consultations().create_patient(
            &id,
            None,
            &zone_ids,
            sessions_per_zone,
        )?;
        Ok(creation.into())
    }

    pub fn get_pre_consultation(&self, id: String) -> Result<FfiPreConsultation, ClinicFlowError> {
        Ok(self.flow.consultations().get(&id)?.into())
    }

    /// Records in a status (`draft`, `pending_validation`, `validated`, ...).
    pub fn list_pre_consultations(
        &self,
        status: String,
    ) -> Result<Vec<FfiPreConsultation>, ClinicFlowError> {
        let status: ConsultationStatus =
            serde_json::from_value(serde_json::Value::String(status.clone()))
                .map_err(|_| ClinicFlowError::InvalidInput(format!("unknown status '{}'", status)))?;
        let records = self.flow.consultations().list_by_status(status)?;
        Ok(records.into_iter().map(|r| r.into()).collect())
    }

    // =========================================================================
    // Export Operations
    // =========================================================================

    /// Export a day's attendance as JSON.
    pub fn export_attendance_json(&self, date: String) -> Result<String, ClinicFlowError> {
        let export = self.flow.attendance(parse_date(&date)?)?;
        Ok(export.to_json()?)
    }

    /// Export a day's attendance as CSV.
    pub fn export_attendance_csv(&self, date: String) -> Result<String, ClinicFlowError> {
        let export = self.flow.attendance(parse_date(&date)?)?;
        Ok(export.to_csv())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub given_name: String,
    pub family_name: String,
    pub phone: Option<String>,
    pub card_code: String,
    pub date_of_birth: Option<String>,
    pub active: bool,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id,
            given_name: patient.given_name,
            family_name: patient.family_name,
            phone: patient.phone,
            card_code: patient.card_code,
            date_of_birth: patient.date_of_birth,
            active: patient.active,
        }
    }
}

/// FFI-safe zone allocation.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiZoneAllocation {
    pub zone_id: String,
    pub zone_name: String,
    pub planned_sessions: u32,
    pub completed_sessions: u32,
    pub remaining_sessions: u32,
}

impl From<models::PatientZoneAllocation> for FfiZoneAllocation {
    fn from(allocation: models::PatientZoneAllocation) -> Self {
        Self {
            remaining_sessions: allocation.remaining(),
            zone_id: allocation.zone_id,
            zone_name: allocation.zone_name,
            planned_sessions: allocation.planned_sessions,
            completed_sessions: allocation.completed_sessions,
        }
    }
}

/// FFI-safe phone conflict from an import.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPhoneConflict {
    pub entry_prenom: String,
    pub entry_nom: String,
    pub entry_telephone: String,
    pub matched_patient_id: String,
    pub matched_patient_prenom: String,
    pub matched_patient_nom: String,
    pub similarity: f64,
}

impl From<models::PhoneConflict> for FfiPhoneConflict {
    fn from(c: models::PhoneConflict) -> Self {
        Self {
            entry_prenom: c.entry_prenom,
            entry_nom: c.entry_nom,
            entry_telephone: c.entry_telephone,
            matched_patient_id: c.matched_patient_id,
            matched_patient_prenom: c.matched_patient_prenom,
            matched_patient_nom: c.matched_patient_nom,
            similarity: c.similarity,
        }
    }
}

/// FFI-safe import report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiImportReport {
    pub entries_created: u32,
    pub patients_created: u32,
    pub phone_matched: u32,
    pub name_matched: u32,
    pub unmatched: u32,
    pub skipped_rows: u32,
    pub duplicate_rows: u32,
    pub phone_conflicts: Vec<FfiPhoneConflict>,
    /// "row N: reason"
    pub row_errors: Vec<String>,
    pub entry_ids: Vec<String>,
}

impl From<ImportReport> for FfiImportReport {
    fn from(report: ImportReport) -> Self {
        Self {
            entries_created: report.entries_created,
            patients_created: report.patients_created,
            phone_matched: report.phone_matched,
            name_matched: report.name_matched,
            unmatched: report.unmatched,
            skipped_rows: report.skipped_rows,
            duplicate_rows: report.duplicate_rows,
            phone_conflicts: report.phone_conflicts.into_iter().map(|c| c.into()).collect(),
            row_errors: report
                .row_errors
                .into_iter()
                .map(|e| format!("row {}: {}", e.row, e.reason))
                .collect(),
            entry_ids: report.entry_ids,
        }
    }
}

/// FFI-safe manual entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewEntry {
    /// YYYY-MM-DD
    pub date: String,
    /// HH:MM
    pub start_time: String,
    pub doctor_id: String,
    pub box_id: Option<String>,
    pub patient_id: Option<String>,
    pub given_name: String,
    pub family_name: String,
    pub phone: Option<String>,
    pub zone_ids: Vec<String>,
    pub notes: Option<String>,
}

/// FFI-safe schedule entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiScheduleEntry {
    pub id: String,
    pub date: String,
    pub start_time: String,
    pub doctor_id: String,
    pub box_id: Option<String>,
    pub patient_id: Option<String>,
    pub display_name: String,
    pub phone: Option<String>,
    pub status: String,
    pub position: Option<u32>,
    pub from_import: bool,
    pub zone_ids: Vec<String>,
    pub notes: Option<String>,
    pub checked_in_at: Option<String>,
}

impl From<ScheduleEntry> for FfiScheduleEntry {
    fn from(entry: ScheduleEntry) -> Self {
        Self {
            display_name: entry.display_name(),
            date: entry.date.to_string(),
            start_time: entry.start_time.format("%H:%M").to_string(),
            status: entry.status.to_string(),
            checked_in_at: entry.checked_in_at.map(|t| t.to_rfc3339()),
            id: entry.id,
            doctor_id: entry.doctor_id,
            box_id: entry.box_id,
            patient_id: entry.patient_id,
            phone: entry.phone,
            position: entry.position,
            from_import: entry.from_import,
            zone_ids: entry.zone_ids,
            notes: entry.notes,
        }
    }
}

/// FFI-safe conflict. `details_json` carries the typed payload.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiConflict {
    /// "phone", "check_in" or "session"
    pub kind: String,
    pub message: String,
    pub details_json: String,
}

impl From<Conflict> for FfiConflict {
    fn from(conflict: Conflict) -> Self {
        let kind = match &conflict {
            Conflict::Phone(_) => "phone",
            Conflict::CheckIn(_) => "check_in",
            Conflict::Session(_) => "session",
        };
        Self {
            kind: kind.to_string(),
            message: conflict.to_string(),
            details_json: serde_json::to_string(&conflict).unwrap_or_default(),
        }
    }
}

/// Check-in result: either the entry or the conflict that blocked it.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEntryOutcome {
    pub entry: Option<FfiScheduleEntry>,
    pub conflict: Option<FfiConflict>,
}

impl From<Outcome<ScheduleEntry>> for FfiEntryOutcome {
    fn from(outcome: Outcome<ScheduleEntry>) -> Self {
        match outcome {
            Outcome::Proceed(entry) => Self {
                entry: Some(entry.into()),
                conflict: None,
            },
            Outcome::Blocked(conflict) => Self {
                entry: None,
                conflict: Some(conflict.into()),
            },
        }
    }
}

/// FFI-safe queue row.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiQueueItem {
    pub id: String,
    pub patient_display_name: String,
    pub doctor_name: String,
    pub status: String,
    pub position: Option<u32>,
    pub checked_in_at: Option<String>,
    pub box_name: Option<String>,
}

/// FFI-safe queue of one doctor.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiQueueListing {
    pub doctor_id: String,
    pub doctor_name: String,
    pub items: Vec<FfiQueueItem>,
}

impl From<models::QueueListing> for FfiQueueListing {
    fn from(listing: models::QueueListing) -> Self {
        Self {
            doctor_id: listing.doctor_id,
            doctor_name: listing.doctor_name,
            items: listing
                .items
                .into_iter()
                .map(|item| FfiQueueItem {
                    id: item.id,
                    patient_display_name: item.patient_display_name,
                    doctor_name: item.doctor_name,
                    status: item.status.to_string(),
                    position: item.position,
                    checked_in_at: item.checked_in_at.map(|t| t.to_rfc3339()),
                    box_name: item.box_name,
                })
                .collect(),
        }
    }
}

/// FFI-safe laser settings.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLaserParams {
    pub laser_type: String,
    pub spot_size_mm: f64,
    pub fluence_j_cm2: f64,
    pub pulse_duration_ms: f64,
    pub frequency_hz: f64,
}

impl From<FfiLaserParams> for LaserParams {
    fn from(p: FfiLaserParams) -> Self {
        LaserParams {
            laser_type: p.laser_type,
            spot_size_mm: p.spot_size_mm,
            fluence_j_cm2: p.fluence_j_cm2,
            pulse_duration_ms: p.pulse_duration_ms,
            frequency_hz: p.frequency_hz,
        }
    }
}

impl From<LaserParams> for FfiLaserParams {
    fn from(p: LaserParams) -> Self {
        Self {
            laser_type: p.laser_type,
            spot_size_mm: p.spot_size_mm,
            fluence_j_cm2: p.fluence_j_cm2,
            pulse_duration_ms: p.pulse_duration_ms,
            frequency_hz: p.frequency_hz,
        }
    }
}

/// FFI-safe active session.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiActiveSession {
    pub session_id: String,
    pub practitioner_id: String,
    pub patient_id: String,
    pub zone_id: String,
    pub zone_name: String,
    pub session_ordinal: u32,
    pub total_sessions: u32,
    pub laser_params: FfiLaserParams,
    pub paused: bool,
    pub started_at: String,
    pub queue_entry_id: Option<String>,
}

impl From<ActiveSession> for FfiActiveSession {
    fn from(s: ActiveSession) -> Self {
        Self {
            session_id: s.session_id,
            practitioner_id: s.practitioner_id,
            patient_id: s.patient_id,
            zone_id: s.zone_id,
            zone_name: s.zone_name,
            session_ordinal: s.session_ordinal,
            total_sessions: s.total_sessions,
            laser_params: s.laser_params.into(),
            paused: s.paused,
            started_at: s.started_at.to_rfc3339(),
            queue_entry_id: s.queue_entry_id,
        }
    }
}

/// What the treatment room display shows when a session starts.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSessionStarted {
    pub practitioner_id: String,
    pub patient_id: String,
    pub zone_name: String,
    pub session_ordinal: u32,
    pub total_sessions: u32,
    pub laser_params: FfiLaserParams,
}

impl From<models::SessionStartedEvent> for FfiSessionStarted {
    fn from(e: models::SessionStartedEvent) -> Self {
        Self {
            practitioner_id: e.practitioner_id,
            patient_id: e.patient_id,
            zone_name: e.zone_name,
            session_ordinal: e.session_ordinal,
            total_sessions: e.total_sessions,
            laser_params: e.laser_params.into(),
        }
    }
}

/// Session start result: either the session or the conflict that blocked it.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSessionOutcome {
    pub session: Option<FfiActiveSession>,
    pub started: Option<FfiSessionStarted>,
    pub conflict: Option<FfiConflict>,
}

impl From<Outcome<ActiveSession>> for FfiSessionOutcome {
    fn from(outcome: Outcome<ActiveSession>) -> Self {
        match outcome {
            Outcome::Proceed(session) => Self {
                started: Some(session.started_event().into()),
                session: Some(session.into()),
                conflict: None,
            },
            Outcome::Blocked(conflict) => Self {
                session: None,
                started: None,
                conflict: Some(conflict.into()),
            },
        }
    }
}

/// FFI-safe end-of-session input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEndOutcome {
    pub duration_secs: Option<i64>,
    pub notes: Option<String>,
    pub photos: Vec<String>,
    pub next_laser_params: Option<FfiLaserParams>,
}

impl From<FfiEndOutcome> for models::EndOutcome {
    fn from(o: FfiEndOutcome) -> Self {
        models::EndOutcome {
            duration_secs: o.duration_secs,
            notes: o.notes,
            photos: o.photos,
            next_laser_params: o.next_laser_params.map(|p| p.into()),
        }
    }
}

/// FFI-safe end-of-session result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSessionEnded {
    pub session_id: String,
    pub zone_name: String,
    pub session_ordinal: u32,
    pub total_sessions: u32,
    pub duration_secs: i64,
    pub notes: Option<String>,
    pub photos: Vec<String>,
    pub next: Option<FfiActiveSession>,
    pub next_started: Option<FfiSessionStarted>,
    /// Set when this ended the visit
    pub completed_entry: Option<FfiScheduleEntry>,
}

impl From<TreatmentFinished> for FfiSessionEnded {
    fn from(finished: TreatmentFinished) -> Self {
        let event = finished.ended.event;
        Self {
            session_id: event.session_id,
            zone_name: event.zone_name,
            session_ordinal: event.session_ordinal,
            total_sessions: event.total_sessions,
            duration_secs: event.duration_secs,
            notes: event.notes,
            photos: event.photos,
            next_started: finished.ended.next.as_ref().map(|s| s.started_event().into()),
            next: finished.ended.next.map(|s| s.into()),
            completed_entry: finished.completed_entry.map(|e| e.into()),
        }
    }
}

/// FFI-safe intake form.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPreConsultationForm {
    pub patient_id: Option<String>,
    pub given_name: String,
    pub family_name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub sex: Option<String>,
    pub address: Option<String>,
    pub is_pregnant: bool,
    pub is_breastfeeding: bool,
    pub pregnancy_planning: bool,
    pub previous_laser: bool,
    pub previous_laser_notes: Option<String>,
    pub medical_history: HashMap<String, String>,
}

impl From<FfiPreConsultationForm> for models::PreConsultationForm {
    fn from(f: FfiPreConsultationForm) -> Self {
        models::PreConsultationForm {
            patient_id: f.patient_id,
            given_name: f.given_name,
            family_name: f.family_name,
            phone: f.phone,
            date_of_birth: f.date_of_birth,
            sex: f.sex,
            address: f.address,
            is_pregnant: f.is_pregnant,
            is_breastfeeding: f.is_breastfeeding,
            pregnancy_planning: f.pregnancy_planning,
            previous_laser: f.previous_laser,
            previous_laser_notes: f.previous_laser_notes,
            medical_history: f.medical_history.into_iter().collect(),
        }
    }
}

/// FFI-safe zone verdict.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiZoneEvaluation {
    pub zone_id: String,
    pub zone_name: String,
    pub eligible: bool,
    pub observation: Option<String>,
}

impl From<FfiZoneEvaluation> for models::ZoneEvaluation {
    fn from(e: FfiZoneEvaluation) -> Self {
        models::ZoneEvaluation {
            zone_id: e.zone_id,
            zone_name: e.zone_name,
            eligible: e.eligible,
            observation: e.observation,
        }
    }
}

impl From<models::ZoneEvaluation> for FfiZoneEvaluation {
    fn from(e: models::ZoneEvaluation) -> Self {
        Self {
            zone_id: e.zone_id,
            zone_name: e.zone_name,
            eligible: e.eligible,
            observation: e.observation,
        }
    }
}

/// FFI-safe pre-consultation.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPreConsultation {
    pub id: String,
    pub patient_id: Option<String>,
    pub given_name: String,
    pub family_name: String,
    pub status: String,
    pub has_contraindications: bool,
    pub zone_evaluations: Vec<FfiZoneEvaluation>,
    pub validated_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_patient_id: Option<String>,
}

impl From<PreConsultation> for FfiPreConsultation {
    fn from(record: PreConsultation) -> Self {
        Self {
            has_contraindications: record.has_contraindications(),
            status: record.status.to_string(),
            id: record.id,
            patient_id: record.form.patient_id,
            given_name: record.form.given_name,
            family_name: record.form.family_name,
            zone_evaluations: record.zone_evaluations.into_iter().map(|e| e.into()).collect(),
            validated_by: record.validated_by,
            rejection_reason: record.rejection_reason,
            created_patient_id: record.created_patient_id,
        }
    }
}

/// FFI-safe patient creation result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientCreation {
    pub patient: FfiPatient,
    pub allocations: Vec<FfiZoneAllocation>,
    pub rejected_zones: Vec<String>,
}

impl From<models::PatientCreation> for FfiPatientCreation {
    fn from(creation: models::PatientCreation) -> Self {
        Self {
            patient: creation.patient.into(),
            allocations: creation.allocations.into_iter().map(|a| a.into()).collect(),
            rejected_zones: creation.rejected_zones,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn laser() -> FfiLaserParams {
        FfiLaserParams {
            laser_type: "diode".into(),
            spot_size_mm: 12.0,
            fluence_j_cm2: 10.0,
            pulse_duration_ms: 20.0,
            frequency_hz: 3.0,
        }
    }

    #[test]
    fn test_ffi_day_end_to_end() {
        let core = open_clinic_flow_in_memory().unwrap();
        core.add_doctor("dr-1".into(), "Dr Sofia Benali".into()).unwrap();

        let form = FfiPreConsultationForm {
            patient_id: None,
            given_name: "Amel".into(),
            family_name: "Boudiaf".into(),
            phone: Some("0555 12 34 56".into()),
            date_of_birth: None,
            sex: None,
            address: None,
            is_pregnant: false,
            is_breastfeeding: false,
            pregnancy_planning: false,
            previous_laser: false,
            previous_laser_notes: None,
            medical_history: HashMap::new(),
        };
        let record = core.create_pre_consultation(form).unwrap();
        core.set_zone_evaluation(
            record.id.clone(),
            FfiZoneEvaluation {
                zone_id: "legs".into(),
                zone_name: "Jambes".into(),
                eligible: true,
                observation: None,
            },
        )
        .unwrap();
        core.submit_pre_consultation(record.id.clone()).unwrap();
        core.validate_pre_consultation(record.id.clone(), "dr-1".into())
            .unwrap();
        let creation = core
            .create_patient_from_pre_consultation(record.id.clone(), vec!["legs".into()], None)
            .unwrap();
        assert_eq!(creation.allocations[0].planned_sessions, 6);

        let csv = "date;heure;nom;prenom;telephone\n2024-03-04;09:00;Boudiaf;Amel;0555123456\n";
        let report = core
            .import_schedule(csv.as_bytes().to_vec(), Some("dr-1".into()))
            .unwrap();
        assert_eq!(report.entries_created, 1);
        assert_eq!(report.phone_matched, 1);

        let entry_id = report.entry_ids[0].clone();
        let checked_in = core.check_in(entry_id.clone()).unwrap();
        assert_eq!(checked_in.entry.unwrap().position, Some(1));

        let started = core
            .call_to_treatment(entry_id.clone(), "pr-1".into(), vec!["legs".into()], laser())
            .unwrap();
        let session = started.session.unwrap();
        assert_eq!(session.session_ordinal, 1);
        assert_eq!(session.total_sessions, 6);
        let event = started.started.unwrap();
        assert_eq!(event.zone_name, "Jambes");
        assert_eq!((event.session_ordinal, event.total_sessions), (1, 6));
        assert_eq!(event.laser_params.laser_type, laser().laser_type);

        let ended = core
            .end_session(
                "pr-1".into(),
                FfiEndOutcome {
                    duration_secs: Some(900),
                    notes: None,
                    photos: Vec::new(),
                    next_laser_params: None,
                },
            )
            .unwrap();
        assert_eq!(ended.duration_secs, 900);
        assert!(ended.next_started.is_none());
        assert_eq!(ended.completed_entry.unwrap().status, "completed");

        let csv = core.export_attendance_csv("2024-03-04".into()).unwrap();
        assert_eq!(csv.lines().count(), 2);
    }

    #[test]
    fn test_ffi_rejects_malformed_dates() {
        let core = open_clinic_flow_in_memory().unwrap();
        let err = core.list_queue("04/03/2024".into(), None).unwrap_err();
        assert!(matches!(err, ClinicFlowError::InvalidInput(_)));
    }

    #[test]
    fn test_ffi_unknown_status_is_invalid_input() {
        let core = open_clinic_flow_in_memory().unwrap();
        assert!(core.list_pre_consultations("validated".into()).unwrap().is_empty());
        let err = core.list_pre_consultations("approved".into()).unwrap_err();
        assert!(matches!(err, ClinicFlowError::InvalidInput(_)));
    }

    #[test]
    fn test_flow_error_mapping() {
        let err: ClinicFlowError = FlowError::Validation("bad".into()).into();
        assert!(matches!(err, ClinicFlowError::Validation(_)));
        let err: ClinicFlowError = RegistryError::NotFound("patient p1".into()).into();
        assert!(matches!(err, ClinicFlowError::NotFound(_)));
    }
}
