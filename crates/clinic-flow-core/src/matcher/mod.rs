//! Patient matcher for imported schedule rows.
//!
//! Pipeline: phone lookup → name comparison → exact-name fallback
//!
//! Phone is the stronger signal: a single phone hit binds the row even when the
//! names disagree, and the disagreement is reported as a [`PhoneConflict`].

mod normalizer;

pub use normalizer::*;

use tracing::debug;

use crate::models::{MatchMethod, MatchQuery, MatchResult, Patient, PhoneConflict};
use crate::registry::{PatientRegistry, RegistryResult};

/// Default similarity at or above which two names are the same person.
pub const DEFAULT_NAME_THRESHOLD: f64 = 0.85;

/// Resolves imported rows to registry patients.
pub struct PatientMatcher<'a> {
    registry: &'a dyn PatientRegistry,
    threshold: f64,
}

impl<'a> PatientMatcher<'a> {
    /// Create a matcher with the default threshold.
    pub fn new(registry: &'a dyn PatientRegistry) -> Self {
        Self::with_threshold(registry, DEFAULT_NAME_THRESHOLD)
    }

    pub fn with_threshold(registry: &'a dyn PatientRegistry, threshold: f64) -> Self {
        Self {
            registry,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Resolve one row.
    pub fn match_row(&self, query: &MatchQuery) -> RegistryResult<MatchResult> {
        let phone = query.phone.as_deref().and_then(normalize_phone);
        let has_name = !normalize_name(&format!("{} {}", query.given_name, query.family_name))
            .is_empty();

        if let Some(phone) = phone.as_deref() {
            let hits = self.registry.find_patients_by_phone(phone)?;
            match hits.len() {
                0 => {}
                1 => return Ok(self.bind_by_phone(query, phone, &hits[0], has_name)),
                n => {
                    debug!("{} patients share phone {}", n, phone);
                    return Ok(self.pick_among_phone_hits(query, &hits, has_name));
                }
            }
        }

        if !has_name {
            return Ok(MatchResult::unmatched());
        }

        let full_name = format!("{} {}", query.given_name, query.family_name);
        let candidates: Vec<Patient> = self
            .registry
            .find_patients_by_name(&full_name)?
            .into_iter()
            .filter(|p| p.active)
            .collect();

        match candidates.as_slice() {
            [] => {
                debug!("no patient for {:?}", full_name.trim());
                Ok(MatchResult::unmatched())
            }
            [patient] => Ok(MatchResult {
                patient_id: Some(patient.id.clone()),
                method: MatchMethod::Name,
                confidence: 1.0,
                phone_conflict: None,
            }),
            many => {
                debug!("{} patients named {:?}", many.len(), full_name.trim());
                Ok(MatchResult::ambiguous())
            }
        }
    }

    fn bind_by_phone(
        &self,
        query: &MatchQuery,
        phone: &str,
        patient: &Patient,
        has_name: bool,
    ) -> MatchResult {
        if !has_name {
            return MatchResult {
                patient_id: Some(patient.id.clone()),
                method: MatchMethod::Phone,
                confidence: 1.0,
                phone_conflict: None,
            };
        }

        let similarity = self.similarity(query, patient);
        let phone_conflict = (similarity < self.threshold).then(|| PhoneConflict {
            entry_prenom: query.given_name.trim().to_string(),
            entry_nom: query.family_name.trim().to_string(),
            entry_telephone: phone.to_string(),
            matched_patient_id: patient.id.clone(),
            matched_patient_prenom: patient.given_name.clone(),
            matched_patient_nom: patient.family_name.clone(),
            similarity,
        });

        MatchResult {
            patient_id: Some(patient.id.clone()),
            method: MatchMethod::Phone,
            confidence: similarity,
            phone_conflict,
        }
    }

    /// Several patients share the phone (family members): keep the only one whose
    /// name is close enough, otherwise refuse to guess.
    fn pick_among_phone_hits(
        &self,
        query: &MatchQuery,
        hits: &[Patient],
        has_name: bool,
    ) -> MatchResult {
        if !has_name {
            return MatchResult::ambiguous();
        }
        let close: Vec<(&Patient, f64)> = hits
            .iter()
            .map(|p| (p, self.similarity(query, p)))
            .filter(|(_, score)| *score >= self.threshold)
            .collect();

        match close.as_slice() {
            [(patient, score)] => MatchResult {
                patient_id: Some(patient.id.clone()),
                method: MatchMethod::Phone,
                confidence: *score,
                phone_conflict: None,
            },
            _ => MatchResult::ambiguous(),
        }
    }

    fn similarity(&self, query: &MatchQuery, patient: &Patient) -> f64 {
        name_similarity(
            &query.given_name,
            &query.family_name,
            &patient.given_name,
            &patient.family_name,
        )
    }
}
