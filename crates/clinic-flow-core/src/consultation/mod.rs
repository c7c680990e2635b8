//! Pre-consultation approval workflow.
//!
//! ```text
//! draft --submit--> pending_validation --validate--> validated --create_patient--> patient_created
//!                                      --reject----> rejected
//! ```
//!
//! `create_patient` is the only way a pre-consultation reaches the registry, and
//! it runs at most once per record.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{FlowError, FlowResult};
use crate::models::{
    ConsultationStatus, NewPatient, Patient, PatientCreation, PreConsultation, PreConsultationForm,
    Zone, ZoneEvaluation,
};
use crate::registry::PatientRegistry;

const ENTITY: &str = "pre-consultation";

/// Owner of pre-consultation records. Each record has its own lock, which is
/// what makes patient creation run once.
pub struct PreConsultationWorkflow {
    registry: Arc<dyn PatientRegistry>,
    records: RwLock<HashMap<String, Arc<Mutex<PreConsultation>>>>,
    default_sessions_per_zone: u32,
}

impl PreConsultationWorkflow {
    pub fn new(registry: Arc<dyn PatientRegistry>, default_sessions_per_zone: u32) -> Self {
        Self {
            registry,
            records: RwLock::new(HashMap::new()),
            default_sessions_per_zone,
        }
    }

    pub fn create_draft(&self, form: PreConsultationForm) -> FlowResult<PreConsultation> {
        let record = PreConsultation::new(form);
        self.records
            .write()?
            .insert(record.id.clone(), Arc::new(Mutex::new(record.clone())));
        info!("Created pre-consultation draft {}", record.id);
        Ok(record)
    }

    /// Replace the intake form of a draft.
    pub fn update_draft(&self, id: &str, form: PreConsultationForm) -> FlowResult<PreConsultation> {
        self.with_record(id, |record| {
            require(record, ConsultationStatus::Draft, "update")?;
            record.form = form;
            Ok(())
        })
    }

    /// Record the eligibility verdict for a zone, replacing any earlier one.
    pub fn set_zone_evaluation(&self, id: &str, evaluation: ZoneEvaluation) -> FlowResult<PreConsultation> {
        if evaluation.zone_id.trim().is_empty() {
            return Err(FlowError::Validation("zone_id is required".into()));
        }
        self.with_record(id, |record| {
            require(record, ConsultationStatus::Draft, "evaluate zones of")?;
            match record
                .zone_evaluations
                .iter_mut()
                .find(|e| e.zone_id == evaluation.zone_id)
            {
                Some(existing) => *existing = evaluation,
                None => record.zone_evaluations.push(evaluation),
            }
            Ok(())
        })
    }

    pub fn submit(&self, id: &str) -> FlowResult<PreConsultation> {
        let record = self.with_record(id, |record| {
            require(record, ConsultationStatus::Draft, "submit")?;
            if record.zone_evaluations.is_empty() {
                return Err(FlowError::Validation(format!(
                    "pre-consultation {} has no zone evaluation",
                    record.id
                )));
            }
            record.status = ConsultationStatus::PendingValidation;
            Ok(())
        })?;
        info!("Submitted pre-consultation {}", id);
        Ok(record)
    }

    pub fn validate(&self, id: &str, validator_id: &str) -> FlowResult<PreConsultation> {
        if validator_id.trim().is_empty() {
            return Err(FlowError::Validation("validator id is required".into()));
        }
        let record = self.with_record(id, |record| {
            require(record, ConsultationStatus::PendingValidation, "validate")?;
            record.status = ConsultationStatus::Validated;
            record.validated_by = Some(validator_id.to_string());
            record.validated_at = Some(Utc::now());
            Ok(())
        })?;
        if record.has_contraindications() {
            warn!(
                "Pre-consultation {} validated by {} despite {:?}",
                id,
                validator_id,
                record.contraindications()
            );
        } else {
            info!("Pre-consultation {} validated by {}", id, validator_id);
        }
        Ok(record)
    }

    pub fn reject(&self, id: &str, reason: &str) -> FlowResult<PreConsultation> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(FlowError::Validation("a rejection reason is required".into()));
        }
        let record = self.with_record(id, |record| {
            require(record, ConsultationStatus::PendingValidation, "reject")?;
            record.status = ConsultationStatus::Rejected;
            record.rejection_reason = Some(reason.to_string());
            record.rejected_at = Some(Utc::now());
            Ok(())
        })?;
        info!("Pre-consultation {} rejected: {}", id, reason);
        Ok(record)
    }

    /// Create (or augment) the patient and allocate sessions for the requested
    /// zones that were judged eligible.
    ///
    /// `demographics` overrides the intake form's identity fields when given.
    pub fn create_patient(
        &self,
        id: &str,
        demographics: Option<NewPatient>,
        zone_ids: &[String],
        sessions_per_zone: Option<u32>,
    ) -> FlowResult<PatientCreation> {
        let sessions = sessions_per_zone.unwrap_or(self.default_sessions_per_zone);
        if sessions == 0 {
            return Err(FlowError::Validation("sessions per zone cannot be zero".into()));
        }

        let handle = self.record(id)?;
        let mut record = handle.lock()?;
        require(&record, ConsultationStatus::Validated, "create patient from")?;

        let mut accepted: Vec<Zone> = Vec::new();
        let mut rejected_zones = Vec::new();
        let mut seen = HashSet::new();
        for zone_id in zone_ids {
            if !seen.insert(zone_id.as_str()) {
                continue;
            }
            match record.evaluation(zone_id) {
                Some(eval) if eval.eligible => accepted.push(Zone::new(&eval.zone_id, &eval.zone_name)),
                _ => rejected_zones.push(zone_id.clone()),
            }
        }
        if !rejected_zones.is_empty() {
            warn!(
                "Pre-consultation {}: zones {:?} are not eligible and were dropped",
                id, rejected_zones
            );
        }

        let fields = demographics.unwrap_or_else(|| form_identity(&record.form));
        let patient = self.upsert_patient(&record, fields)?;
        // Remember the patient before allocating so a retry cannot create a second one
        record.created_patient_id = Some(patient.id.clone());

        let mut allocations = Vec::with_capacity(accepted.len());
        for zone in &accepted {
            // Sessions added by an interrupted earlier attempt are not added twice
            if record.allocated_zone_ids.contains(&zone.id) {
                let existing = self
                    .registry
                    .zone_allocation(&patient.id, &zone.id)?
                    .ok_or_else(|| {
                        FlowError::not_found("Allocation", format!("{}/{}", patient.id, zone.id))
                    })?;
                allocations.push(existing);
                continue;
            }
            allocations.push(self.registry.add_planned_sessions(&patient.id, zone, sessions)?);
            record.allocated_zone_ids.push(zone.id.clone());
        }

        record.status = ConsultationStatus::PatientCreated;
        record.touch();
        info!(
            "Pre-consultation {} created patient {} with {} zones",
            id,
            patient.id,
            allocations.len()
        );

        Ok(PatientCreation {
            patient,
            allocations,
            rejected_zones,
        })
    }

    pub fn get(&self, id: &str) -> FlowResult<PreConsultation> {
        Ok(self.record(id)?.lock()?.clone())
    }

    /// Records in a status, oldest first.
    pub fn list_by_status(&self, status: ConsultationStatus) -> FlowResult<Vec<PreConsultation>> {
        let handles: Vec<Arc<Mutex<PreConsultation>>> =
            self.records.read()?.values().cloned().collect();
        let mut found = Vec::new();
        for handle in handles {
            let record = handle.lock()?;
            if record.status == status {
                found.push(record.clone());
            }
        }
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    /// Patient linked on the form (or created by an earlier attempt) is updated;
    /// otherwise a new one is created.
    fn upsert_patient(&self, record: &PreConsultation, fields: NewPatient) -> FlowResult<Patient> {
        if fields.given_name.trim().is_empty() || fields.family_name.trim().is_empty() {
            return Err(FlowError::Validation(
                "given and family names are required to create a patient".into(),
            ));
        }

        let existing_id = record
            .created_patient_id
            .as_deref()
            .or(record.form.patient_id.as_deref());
        let Some(existing_id) = existing_id else {
            return Ok(self.registry.create_patient(fields)?);
        };

        let mut patient = self
            .registry
            .get_patient(existing_id)?
            .ok_or_else(|| FlowError::not_found("Patient", existing_id))?;
        patient.given_name = fields.given_name;
        patient.family_name = fields.family_name;
        if fields.phone.is_some() {
            patient.phone = fields.phone;
        }
        if fields.date_of_birth.is_some() {
            patient.date_of_birth = fields.date_of_birth;
        }
        if fields.sex.is_some() {
            patient.sex = fields.sex;
        }
        if fields.address.is_some() {
            patient.address = fields.address;
        }
        patient.touch();
        self.registry.update_patient(&patient)?;
        Ok(patient)
    }

    fn with_record(
        &self,
        id: &str,
        apply: impl FnOnce(&mut PreConsultation) -> FlowResult<()>,
    ) -> FlowResult<PreConsultation> {
        let handle = self.record(id)?;
        let mut record = handle.lock()?;
        apply(&mut record)?;
        record.touch();
        Ok(record.clone())
    }

    fn record(&self, id: &str) -> FlowResult<Arc<Mutex<PreConsultation>>> {
        self.records
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| FlowError::not_found("Pre-consultation", id))
    }
}

fn require(
    record: &PreConsultation,
    expected: ConsultationStatus,
    action: &'static str,
) -> FlowResult<()> {
    if record.status == expected {
        Ok(())
    } else {
        Err(FlowError::transition(ENTITY, &record.id, record.status, action))
    }
}

fn form_identity(form: &PreConsultationForm) -> NewPatient {
    NewPatient {
        given_name: form.given_name.clone(),
        family_name: form.family_name.clone(),
        phone: form.phone.clone(),
        date_of_birth: form.date_of_birth.clone(),
        sex: form.sex.clone(),
        address: form.address.clone(),
    }
}
