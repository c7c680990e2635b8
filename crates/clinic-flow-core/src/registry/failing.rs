//! Registry whose chosen calls fail, for error-path tests.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{InMemoryRegistry, PatientRegistry, RegistryError, RegistryResult};
use crate::models::{NewPatient, Patient, PatientZoneAllocation, Zone};

/// Wraps an [`InMemoryRegistry`]; the n-th call (1-based) of an armed
/// operation returns `Unavailable`.
#[derive(Default)]
pub(crate) struct FailingRegistry {
    pub inner: InMemoryRegistry,
    armed: Mutex<HashMap<&'static str, usize>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl FailingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, operation: &'static str, nth_call: usize) {
        self.armed.lock().unwrap().insert(operation, nth_call);
        self.calls.lock().unwrap().remove(operation);
    }

    pub fn disarm(&self) {
        self.armed.lock().unwrap().clear();
    }

    fn tick(&self, operation: &'static str) -> RegistryResult<()> {
        let mut calls = self.calls.lock()?;
        let count = calls.entry(operation).or_insert(0);
        *count += 1;
        if self.armed.lock()?.get(operation) == Some(&*count) {
            return Err(RegistryError::Unavailable(format!("{} failed", operation)));
        }
        Ok(())
    }
}

impl PatientRegistry for FailingRegistry {
    fn find_patients_by_phone(&self, phone: &str) -> RegistryResult<Vec<Patient>> {
        self.tick("find_patients_by_phone")?;
        self.inner.find_patients_by_phone(phone)
    }

    fn find_patients_by_name(&self, full_name: &str) -> RegistryResult<Vec<Patient>> {
        self.tick("find_patients_by_name")?;
        self.inner.find_patients_by_name(full_name)
    }

    fn get_patient(&self, id: &str) -> RegistryResult<Option<Patient>> {
        self.tick("get_patient")?;
        self.inner.get_patient(id)
    }

    fn create_patient(&self, fields: NewPatient) -> RegistryResult<Patient> {
        self.tick("create_patient")?;
        self.inner.create_patient(fields)
    }

    fn update_patient(&self, patient: &Patient) -> RegistryResult<()> {
        self.tick("update_patient")?;
        self.inner.update_patient(patient)
    }

    fn zone_allocations(&self, patient_id: &str) -> RegistryResult<Vec<PatientZoneAllocation>> {
        self.tick("zone_allocations")?;
        self.inner.zone_allocations(patient_id)
    }

    fn add_planned_sessions(
        &self,
        patient_id: &str,
        zone: &Zone,
        sessions: u32,
    ) -> RegistryResult<PatientZoneAllocation> {
        self.tick("add_planned_sessions")?;
        self.inner.add_planned_sessions(patient_id, zone, sessions)
    }

    fn adjust_zone_allocation(
        &self,
        patient_id: &str,
        zone_id: &str,
        delta: i32,
    ) -> RegistryResult<PatientZoneAllocation> {
        self.tick("adjust_zone_allocation")?;
        self.inner.adjust_zone_allocation(patient_id, zone_id, delta)
    }
}
