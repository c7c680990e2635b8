//! Conflicts returned to callers as data.
//!
//! None of these are errors: the operation that found them either proceeded
//! (phone conflicts are advisory) or stopped without mutating anything, and the
//! caller decides what to do next.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Imported row matched an existing patient by phone, but the names disagree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhoneConflict {
    pub entry_prenom: String,
    pub entry_nom: String,
    pub entry_telephone: String,
    pub matched_patient_id: String,
    pub matched_patient_prenom: String,
    pub matched_patient_nom: String,
    /// Name similarity that fell below the threshold
    pub similarity: f64,
}

/// Checking in this entry would put the same patient in two queues on the same day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckInConflict {
    pub entry_id: String,
    pub conflicting_entry_id: String,
    pub patient_id: String,
    pub date: NaiveDate,
    pub conflicting_doctor_id: String,
}

/// The practitioner already has an active session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConflict {
    pub practitioner_id: String,
    pub active_session_id: String,
    pub active_patient_id: String,
    pub active_zone_id: String,
}

/// Every kind of conflict the engine can report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conflict {
    Phone(PhoneConflict),
    CheckIn(CheckInConflict),
    Session(SessionConflict),
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Conflict::Phone(c) => write!(
                f,
                "phone {} belongs to {} {}, not {} {}",
                c.entry_telephone,
                c.matched_patient_prenom,
                c.matched_patient_nom,
                c.entry_prenom,
                c.entry_nom
            ),
            Conflict::CheckIn(c) => write!(
                f,
                "patient {} already has entry {} on {}",
                c.patient_id, c.conflicting_entry_id, c.date
            ),
            Conflict::Session(c) => write!(
                f,
                "practitioner {} is busy with session {}",
                c.practitioner_id, c.active_session_id
            ),
        }
    }
}

/// Result of an operation that can be blocked by a conflict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// The operation was applied
    Proceed(T),
    /// Nothing changed; the caller must resolve the conflict
    Blocked(Conflict),
}

impl<T> Outcome<T> {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Outcome::Blocked(_))
    }

    pub fn proceeded(self) -> Option<T> {
        match self {
            Outcome::Proceed(value) => Some(value),
            Outcome::Blocked(_) => None,
        }
    }

    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            Outcome::Proceed(_) => None,
            Outcome::Blocked(conflict) => Some(conflict),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Proceed(value) => Outcome::Proceed(f(value)),
            Outcome::Blocked(conflict) => Outcome::Blocked(conflict),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let ok: Outcome<u32> = Outcome::Proceed(3);
        assert!(!ok.is_blocked());
        assert_eq!(ok.map(|v| v * 2).proceeded(), Some(6));

        let blocked: Outcome<u32> = Outcome::Blocked(Conflict::Session(SessionConflict {
            practitioner_id: "pr-1".into(),
            active_session_id: "s1".into(),
            active_patient_id: "p1".into(),
            active_zone_id: "z1".into(),
        }));
        assert!(blocked.is_blocked());
        assert!(matches!(blocked.conflict(), Some(Conflict::Session(_))));
        assert_eq!(blocked.proceeded(), None);
    }

    #[test]
    fn test_conflict_serializes_tagged() {
        let conflict = Conflict::CheckIn(CheckInConflict {
            entry_id: "e2".into(),
            conflicting_entry_id: "e1".into(),
            patient_id: "p1".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            conflicting_doctor_id: "dr-2".into(),
        });
        let json = serde_json::to_value(&conflict).unwrap();
        assert_eq!(json["kind"], "check_in");
        assert_eq!(json["conflicting_entry_id"], "e1");
    }
}
