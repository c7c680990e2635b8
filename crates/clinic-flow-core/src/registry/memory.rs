//! In-memory registry.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{PatientRegistry, RegistryError, RegistryResult};
use crate::matcher::{name_key, normalize_phone};
use crate::models::{NewPatient, Patient, PatientZoneAllocation, Zone};

/// Lock-guarded maps; suitable for tests and embedded hosts.
#[derive(Default)]
pub struct InMemoryRegistry {
    patients: RwLock<HashMap<String, Patient>>,
    /// Keyed by (patient_id, zone_id)
    allocations: RwLock<HashMap<(String, String), PatientZoneAllocation>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed patient (seeding).
    pub fn insert(&self, patient: Patient) -> RegistryResult<()> {
        self.patients.write()?.insert(patient.id.clone(), patient);
        Ok(())
    }

    pub fn patient_count(&self) -> RegistryResult<usize> {
        Ok(self.patients.read()?.len())
    }
}

impl PatientRegistry for InMemoryRegistry {
    fn find_patients_by_phone(&self, phone: &str) -> RegistryResult<Vec<Patient>> {
        let Some(wanted) = normalize_phone(phone) else {
            return Ok(Vec::new());
        };
        let patients = self.patients.read()?;
        let mut found: Vec<Patient> = patients
            .values()
            .filter(|p| p.phone.as_deref().and_then(normalize_phone) == Some(wanted.clone()))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    fn find_patients_by_name(&self, full_name: &str) -> RegistryResult<Vec<Patient>> {
        let wanted = name_key(full_name, "");
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let patients = self.patients.read()?;
        let mut found: Vec<Patient> = patients
            .values()
            .filter(|p| name_key(&p.given_name, &p.family_name) == wanted)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    fn get_patient(&self, id: &str) -> RegistryResult<Option<Patient>> {
        Ok(self.patients.read()?.get(id).cloned())
    }

    fn create_patient(&self, fields: NewPatient) -> RegistryResult<Patient> {
        let patient = fields.into_patient();
        self.patients
            .write()?
            .insert(patient.id.clone(), patient.clone());
        Ok(patient)
    }

    fn update_patient(&self, patient: &Patient) -> RegistryResult<()> {
        let mut patients = self.patients.write()?;
        match patients.get_mut(&patient.id) {
            Some(stored) => {
                *stored = patient.clone();
                Ok(())
            }
            None => Err(RegistryError::NotFound(format!("patient {}", patient.id))),
        }
    }

    fn zone_allocations(&self, patient_id: &str) -> RegistryResult<Vec<PatientZoneAllocation>> {
        let allocations = self.allocations.read()?;
        let mut found: Vec<PatientZoneAllocation> = allocations
            .values()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.zone_name.cmp(&b.zone_name));
        Ok(found)
    }

    fn add_planned_sessions(
        &self,
        patient_id: &str,
        zone: &Zone,
        sessions: u32,
    ) -> RegistryResult<PatientZoneAllocation> {
        if !self.patients.read()?.contains_key(patient_id) {
            return Err(RegistryError::NotFound(format!("patient {}", patient_id)));
        }
        let mut allocations = self.allocations.write()?;
        let allocation = allocations
            .entry((patient_id.to_string(), zone.id.clone()))
            .and_modify(|a| {
                a.planned_sessions = a.planned_sessions.saturating_add(sessions);
                a.zone_name = zone.name.clone();
            })
            .or_insert_with(|| PatientZoneAllocation::new(patient_id.to_string(), zone, sessions));
        Ok(allocation.clone())
    }

    fn adjust_zone_allocation(
        &self,
        patient_id: &str,
        zone_id: &str,
        delta: i32,
    ) -> RegistryResult<PatientZoneAllocation> {
        let mut allocations = self.allocations.write()?;
        let allocation = allocations
            .get_mut(&(patient_id.to_string(), zone_id.to_string()))
            .ok_or_else(|| {
                RegistryError::NotFound(format!("allocation {}/{}", patient_id, zone_id))
            })?;
        allocation.apply_completed_delta(delta);
        Ok(allocation.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_patient(given: &str, family: &str, phone: Option<&str>) -> NewPatient {
        NewPatient {
            given_name: given.into(),
            family_name: family.into(),
            phone: phone.map(Into::into),
            ..NewPatient::default()
        }
    }

    #[test]
    fn test_create_and_find_by_phone() {
        let registry = InMemoryRegistry::new();
        let created = registry
            .create_patient(new_patient("Amel", "Boudiaf", Some("0555111111")))
            .unwrap();

        let found = registry.find_patients_by_phone("0555 111 111").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, created.id);
    }

    #[test]
    fn test_find_by_name_uses_normalized_key() {
        let registry = InMemoryRegistry::new();
        registry
            .create_patient(new_patient("Yasmine", "Ould-Ali", None))
            .unwrap();

        assert_eq!(registry.find_patients_by_name("ould ali yasmine").unwrap().len(), 1);
        assert!(registry.find_patients_by_name("Yasmina Ould Ali").unwrap().is_empty());
    }

    #[test]
    fn test_allocations_require_patient() {
        let registry = InMemoryRegistry::new();
        let zone = Zone::new("z1", "Jambes");
        assert!(matches!(
            registry.add_planned_sessions("ghost", &zone, 6),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_planned_sessions_saturate() {
        let registry = InMemoryRegistry::new();
        let p = registry.create_patient(new_patient("Karim", "Hadj", None)).unwrap();
        let zone = Zone::new("z1", "Jambes");
        registry.add_planned_sessions(&p.id, &zone, u32::MAX).unwrap();

        let a = registry.add_planned_sessions(&p.id, &zone, 6).unwrap();
        assert_eq!(a.planned_sessions, u32::MAX);
    }

    #[test]
    fn test_adjust_allocation_bounded() {
        let registry = InMemoryRegistry::new();
        let p = registry.create_patient(new_patient("Karim", "Hadj", None)).unwrap();
        let zone = Zone::new("z1", "Jambes");
        registry.add_planned_sessions(&p.id, &zone, 1).unwrap();

        let a = registry.adjust_zone_allocation(&p.id, "z1", 1).unwrap();
        assert_eq!(a.remaining(), 0);
        let a = registry.adjust_zone_allocation(&p.id, "z1", 1).unwrap();
        assert_eq!(a.completed_sessions, 1);
        assert_eq!(
            registry.zone_allocation(&p.id, "z1").unwrap().unwrap().remaining(),
            0
        );
    }
}
