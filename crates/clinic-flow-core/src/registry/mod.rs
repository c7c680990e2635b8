//! Patient registry boundary.
//!
//! The registry owns patients and their zone allocations. The engines only read
//! and create through [`PatientRegistry`]; two implementations ship with the
//! crate, an in-memory one and a SQLite adapter.

mod memory;
mod sqlite;
#[cfg(test)]
mod failing;

pub use memory::*;
pub use sqlite::*;
#[cfg(test)]
pub(crate) use failing::FailingRegistry;

use thiserror::Error;

use crate::db::DbError;
use crate::models::{NewPatient, Patient, PatientZoneAllocation, Zone};

/// Registry errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

impl<T> From<std::sync::PoisonError<T>> for RegistryError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        RegistryError::Unavailable(format!("Lock poisoned: {}", e))
    }
}

/// Operations the engines need from the clinic's patient registry.
pub trait PatientRegistry: Send + Sync {
    /// Patients whose phone equals `phone` after normalization.
    fn find_patients_by_phone(&self, phone: &str) -> RegistryResult<Vec<Patient>>;

    /// Patients whose normalized full name equals that of `full_name`.
    fn find_patients_by_name(&self, full_name: &str) -> RegistryResult<Vec<Patient>>;

    fn get_patient(&self, id: &str) -> RegistryResult<Option<Patient>>;

    fn create_patient(&self, fields: NewPatient) -> RegistryResult<Patient>;

    fn update_patient(&self, patient: &Patient) -> RegistryResult<()>;

    fn zone_allocations(&self, patient_id: &str) -> RegistryResult<Vec<PatientZoneAllocation>>;

    /// Create the allocation or add `sessions` planned sessions to it.
    fn add_planned_sessions(
        &self,
        patient_id: &str,
        zone: &Zone,
        sessions: u32,
    ) -> RegistryResult<PatientZoneAllocation>;

    /// Move the completed counter by `delta`; remaining never drops below zero.
    fn adjust_zone_allocation(
        &self,
        patient_id: &str,
        zone_id: &str,
        delta: i32,
    ) -> RegistryResult<PatientZoneAllocation>;

    fn zone_allocation(
        &self,
        patient_id: &str,
        zone_id: &str,
    ) -> RegistryResult<Option<PatientZoneAllocation>> {
        Ok(self
            .zone_allocations(patient_id)?
            .into_iter()
            .find(|a| a.zone_id == zone_id))
    }
}
