//! Pre-consultation models: the medical intake that gates patient creation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::patient::{Patient, PatientZoneAllocation};

/// Pre-consultation approval status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    /// Intake being filled in
    Draft,
    /// Submitted, awaiting a doctor's decision
    PendingValidation,
    /// Approved, patient may be created
    Validated,
    /// Refused by the doctor
    Rejected,
    /// Patient and allocations created
    PatientCreated,
}

impl ConsultationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::PatientCreated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingValidation => "pending_validation",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
            Self::PatientCreated => "patient_created",
        }
    }
}

impl std::fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Eligibility verdict for one zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneEvaluation {
    pub zone_id: String,
    pub zone_name: String,
    pub eligible: bool,
    pub observation: Option<String>,
}

/// A contraindication flag that is set on a pre-consultation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Contraindication {
    Pregnant,
    Breastfeeding,
    PlanningPregnancy,
}

/// Demographic and medical fields captured at intake.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PreConsultationForm {
    /// Existing patient this intake concerns, if any
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
    /// Free-form medical history answers keyed by question
    pub medical_history: BTreeMap<String, String>,
}

/// The intake record and its approval state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreConsultation {
    pub id: String,
    pub form: PreConsultationForm,
    pub zone_evaluations: Vec<ZoneEvaluation>,
    pub status: ConsultationStatus,
    pub validated_by: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    /// Patient created from this record
    pub created_patient_id: Option<String>,
    /// Zones whose sessions were already added to that patient
    #[serde(default)]
    pub allocated_zone_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PreConsultation {
    /// Create a new draft.
    pub fn new(form: PreConsultationForm) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            form,
            zone_evaluations: Vec::new(),
            status: ConsultationStatus::Draft,
            validated_by: None,
            validated_at: None,
            rejection_reason: None,
            rejected_at: None,
            created_patient_id: None,
            allocated_zone_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Derived from the current flags; never stored.
    pub fn has_contraindications(&self) -> bool {
        self.form.is_pregnant || self.form.is_breastfeeding || self.form.pregnancy_planning
    }

    /// The flags that are currently set.
    pub fn contraindications(&self) -> Vec<Contraindication> {
        let mut found = Vec::new();
        if self.form.is_pregnant {
            found.push(Contraindication::Pregnant);
        }
        if self.form.is_breastfeeding {
            found.push(Contraindication::Breastfeeding);
        }
        if self.form.pregnancy_planning {
            found.push(Contraindication::PlanningPregnancy);
        }
        found
    }

    pub fn evaluation(&self, zone_id: &str) -> Option<&ZoneEvaluation> {
        self.zone_evaluations.iter().find(|e| e.zone_id == zone_id)
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Result of turning a validated pre-consultation into a treatable patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientCreation {
    pub patient: Patient,
    pub allocations: Vec<PatientZoneAllocation>,
    /// Requested zones dropped because they are ineligible or unevaluated
    pub rejected_zones: Vec<String>,
}
