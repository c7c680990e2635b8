//! Patient and treatment-zone allocation models.

use serde::{Deserialize, Serialize};

/// A patient record as held by the clinic registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Local UUID
    pub id: String,
    /// Given name (prénom)
    pub given_name: String,
    /// Family name (nom)
    pub family_name: String,
    /// Phone number, used for schedule matching
    pub phone: Option<String>,
    /// Patient card code printed on the clinic card
    pub card_code: String,
    /// Date of birth (YYYY-MM-DD)
    pub date_of_birth: Option<String>,
    /// Sex as recorded at intake
    pub sex: Option<String>,
    /// Postal address
    pub address: Option<String>,
    /// Inactive patients are ignored by name matching
    pub active: bool,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Patient {
    /// Create a new patient with required fields.
    pub fn new(given_name: String, family_name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        let id = uuid::Uuid::new_v4();
        Self {
            card_code: card_code_for(&id),
            id: id.to_string(),
            given_name,
            family_name,
            phone: None,
            date_of_birth: None,
            sex: None,
            address: None,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Display name, given name first.
    pub fn full_name(&self) -> String {
        join_name(&self.given_name, &self.family_name)
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Fields used to create a patient through the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewPatient {
    pub given_name: String,
    pub family_name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub sex: Option<String>,
    pub address: Option<String>,
}

impl NewPatient {
    pub fn into_patient(self) -> Patient {
        let mut patient = Patient::new(self.given_name, self.family_name);
        patient.phone = self.phone;
        patient.date_of_birth = self.date_of_birth;
        patient.sex = self.sex;
        patient.address = self.address;
        patient
    }
}

/// Per-patient, per-zone session counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientZoneAllocation {
    pub patient_id: String,
    pub zone_id: String,
    /// Zone display name (e.g. "Jambes")
    pub zone_name: String,
    /// Sessions planned for this zone
    pub planned_sessions: u32,
    /// Sessions already performed
    pub completed_sessions: u32,
}

impl PatientZoneAllocation {
    pub fn new(patient_id: String, zone: &Zone, planned_sessions: u32) -> Self {
        Self {
            patient_id,
            zone_id: zone.id.clone(),
            zone_name: zone.name.clone(),
            planned_sessions,
            completed_sessions: 0,
        }
    }

    /// Sessions left; never negative.
    pub fn remaining(&self) -> u32 {
        self.planned_sessions.saturating_sub(self.completed_sessions)
    }

    /// Ordinal of the next session to perform (completed + 1).
    pub fn next_ordinal(&self) -> u32 {
        self.completed_sessions + 1
    }

    /// Apply a delta to the completed counter, clamped to `0..=planned`.
    pub fn apply_completed_delta(&mut self, delta: i32) {
        let next = i64::from(self.completed_sessions) + i64::from(delta);
        self.completed_sessions = next.clamp(0, i64::from(self.planned_sessions)) as u32;
    }
}

/// A treatable body area.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Zone {
    pub id: String,
    pub name: String,
}

impl Zone {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

pub(crate) fn join_name(given: &str, family: &str) -> String {
    format!("{} {}", given.trim(), family.trim()).trim().to_string()
}

fn card_code_for(id: &uuid::Uuid) -> String {
    let simple = id.simple().to_string();
    format!("LC-{}", simple[..8].to_uppercase())
}
