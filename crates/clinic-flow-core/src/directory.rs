//! Doctor and box lookup.
//!
//! Staff and rooms are owned by the clinic's administration; the engines only
//! need to resolve a planned doctor name to an id and render display names.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::FlowResult;
use crate::matcher::normalize_name;

/// Honorifics dropped before comparing doctor names.
const TITLES: &[&str] = &["dr", "docteur", "doctor", "pr", "professeur"];

pub trait DoctorDirectory: Send + Sync {
    /// Resolve a name as written on a plan ("Dr Benali", "benali") to a doctor id.
    fn find_doctor(&self, name: &str) -> Option<String>;

    fn doctor_name(&self, doctor_id: &str) -> Option<String>;

    fn box_name(&self, box_id: &str) -> Option<String>;
}

/// Directory held in memory, filled by the host at startup.
#[derive(Default)]
pub struct StaticDirectory {
    doctors: RwLock<HashMap<String, String>>,
    boxes: RwLock<HashMap<String, String>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_doctor(&self, id: impl Into<String>, name: impl Into<String>) -> FlowResult<()> {
        self.doctors.write()?.insert(id.into(), name.into());
        Ok(())
    }

    pub fn add_box(&self, id: impl Into<String>, name: impl Into<String>) -> FlowResult<()> {
        self.boxes.write()?.insert(id.into(), name.into());
        Ok(())
    }
}

impl DoctorDirectory for StaticDirectory {
    fn find_doctor(&self, name: &str) -> Option<String> {
        let doctors = self.doctors.read().ok()?;
        if doctors.contains_key(name.trim()) {
            return Some(name.trim().to_string());
        }
        let wanted = strip_titles(name);
        if wanted.is_empty() {
            return None;
        }
        let mut hits = doctors
            .iter()
            .filter(|(_, stored)| strip_titles(stored) == wanted)
            .map(|(id, _)| id.clone());
        let first = hits.next()?;
        // Two doctors sharing a name cannot be told apart from a plan cell
        match hits.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    fn doctor_name(&self, doctor_id: &str) -> Option<String> {
        self.doctors.read().ok()?.get(doctor_id).cloned()
    }

    fn box_name(&self, box_id: &str) -> Option<String> {
        self.boxes.read().ok()?.get(box_id).cloned()
    }
}

/// Order-insensitive doctor name without honorifics.
fn strip_titles(name: &str) -> String {
    let normalized = normalize_name(name);
    let mut tokens: Vec<&str> = normalized
        .split(' ')
        .filter(|token| !token.is_empty() && !TITLES.contains(token))
        .collect();
    tokens.sort_unstable();
    tokens.join(" ")
}
