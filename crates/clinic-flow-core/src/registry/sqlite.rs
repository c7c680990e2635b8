//! SQLite-backed registry adapter.

use std::path::Path;
use std::sync::Mutex;

use super::{PatientRegistry, RegistryError, RegistryResult};
use crate::db::{Database, DbError};
use crate::models::{NewPatient, Patient, PatientZoneAllocation, Zone};

/// Registry over a [`Database`]. The connection is not `Sync`, so every call
/// takes the mutex for its duration.
pub struct SqliteRegistry {
    db: Mutex<Database>,
}

impl SqliteRegistry {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> RegistryResult<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> RegistryResult<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }
}

impl PatientRegistry for SqliteRegistry {
    fn find_patients_by_phone(&self, phone: &str) -> RegistryResult<Vec<Patient>> {
        Ok(self.db.lock()?.find_patients_by_phone(phone)?)
    }

    fn find_patients_by_name(&self, full_name: &str) -> RegistryResult<Vec<Patient>> {
        Ok(self.db.lock()?.find_patients_by_name(full_name)?)
    }

    fn get_patient(&self, id: &str) -> RegistryResult<Option<Patient>> {
        Ok(self.db.lock()?.get_patient(id)?)
    }

    fn create_patient(&self, fields: NewPatient) -> RegistryResult<Patient> {
        let patient = fields.into_patient();
        self.db.lock()?.insert_patient(&patient)?;
        Ok(patient)
    }

    fn update_patient(&self, patient: &Patient) -> RegistryResult<()> {
        if self.db.lock()?.update_patient(patient)? {
            Ok(())
        } else {
            Err(RegistryError::NotFound(format!("patient {}", patient.id)))
        }
    }

    fn zone_allocations(&self, patient_id: &str) -> RegistryResult<Vec<PatientZoneAllocation>> {
        Ok(self.db.lock()?.get_zone_allocations(patient_id)?)
    }

    fn zone_allocation(
        &self,
        patient_id: &str,
        zone_id: &str,
    ) -> RegistryResult<Option<PatientZoneAllocation>> {
        Ok(self.db.lock()?.get_zone_allocation(patient_id, zone_id)?)
    }

    fn add_planned_sessions(
        &self,
        patient_id: &str,
        zone: &Zone,
        sessions: u32,
    ) -> RegistryResult<PatientZoneAllocation> {
        let db = self.db.lock()?;
        if db.get_patient(patient_id)?.is_none() {
            return Err(RegistryError::NotFound(format!("patient {}", patient_id)));
        }
        Ok(db.add_planned_sessions(patient_id, zone, sessions)?)
    }

    fn adjust_zone_allocation(
        &self,
        patient_id: &str,
        zone_id: &str,
        delta: i32,
    ) -> RegistryResult<PatientZoneAllocation> {
        match self.db.lock()?.adjust_zone_allocation(patient_id, zone_id, delta) {
            Err(DbError::NotFound(what)) => Err(RegistryError::NotFound(what)),
            other => Ok(other?),
        }
    }
}
