//! Per-practitioner treatment sessions.
//!
//! A practitioner runs at most one session at a time. A visit covering several
//! zones is one session followed by its pending zones, started one after the
//! other as each zone ends. A patient is in at most one practitioner's visit
//! at a time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{FlowError, FlowResult};
use crate::models::{
    ActiveSession, Conflict, EndOutcome, LaserParams, Outcome, PatientZoneAllocation, PendingZone,
    SessionConflict, SessionEnded, SessionEndedEvent, StartSession,
};
use crate::registry::PatientRegistry;

const ENTITY: &str = "session";

/// Slot state shown in transition errors when nothing is running.
const IDLE: &str = "idle";

#[derive(Debug, Default)]
struct PractitionerSlot {
    active: Option<ActiveSession>,
    pending: VecDeque<PendingZone>,
}

/// Which practitioner's visit a patient is in.
///
/// Only written while the owning practitioner's slot is locked, and always
/// locked after it.
#[derive(Debug, Clone)]
struct PatientClaim {
    practitioner_id: String,
    session_id: String,
    zone_id: String,
}

/// Owner of every practitioner's session slot and pending-zone queue.
pub struct SessionOrchestrator {
    registry: Arc<dyn PatientRegistry>,
    slots: RwLock<HashMap<String, Arc<Mutex<PractitionerSlot>>>>,
    claims: Mutex<HashMap<String, PatientClaim>>,
}

impl SessionOrchestrator {
    pub fn new(registry: Arc<dyn PatientRegistry>) -> Self {
        Self {
            registry,
            slots: RwLock::new(HashMap::new()),
            claims: Mutex::new(HashMap::new()),
        }
    }

    /// Start a session for the first zone and queue the others.
    ///
    /// Blocked, with nothing changed, when the practitioner is already busy or
    /// the patient is in another practitioner's visit.
    pub fn start_session(&self, request: StartSession) -> FlowResult<Outcome<ActiveSession>> {
        if request.practitioner_id.trim().is_empty() {
            return Err(FlowError::Validation("practitioner_id is required".into()));
        }
        if request.patient_id.trim().is_empty() {
            return Err(FlowError::Validation("patient_id is required".into()));
        }
        check_distinct_zones(&request)?;

        let slot = self.slot(&request.practitioner_id)?;
        let mut slot = slot.lock()?;

        if let Some(active) = &slot.active {
            warn!(
                "Practitioner {} already treating patient {} (session {})",
                active.practitioner_id, active.patient_id, active.session_id
            );
            return Ok(Outcome::Blocked(Conflict::Session(SessionConflict {
                practitioner_id: active.practitioner_id.clone(),
                active_session_id: active.session_id.clone(),
                active_patient_id: active.patient_id.clone(),
                active_zone_id: active.zone_id.clone(),
            })));
        }

        let mut claims = self.claims.lock()?;
        if let Some(claim) = claims.get(&request.patient_id) {
            warn!(
                "Patient {} is already with practitioner {} (session {})",
                request.patient_id, claim.practitioner_id, claim.session_id
            );
            return Ok(Outcome::Blocked(Conflict::Session(SessionConflict {
                practitioner_id: claim.practitioner_id.clone(),
                active_session_id: claim.session_id.clone(),
                active_patient_id: request.patient_id.clone(),
                active_zone_id: claim.zone_id.clone(),
            })));
        }

        let first = self.treatable_allocation(&request.patient_id, &request.first_zone_id)?;
        for pending in &request.remaining_zones {
            self.treatable_allocation(&request.patient_id, &pending.zone_id)?;
        }

        let session = open_session(
            &request.practitioner_id,
            &first,
            request.laser_params,
            request.queue_entry_id,
        );
        claims.insert(session.patient_id.clone(), PatientClaim::of(&session));
        info!(
            "Practitioner {} started {} {}/{} for patient {} ({} zones pending)",
            session.practitioner_id,
            session.zone_name,
            session.session_ordinal,
            session.total_sessions,
            session.patient_id,
            request.remaining_zones.len()
        );
        slot.pending = request.remaining_zones.into();
        slot.active = Some(session.clone());
        Ok(Outcome::Proceed(session))
    }

    /// End the running session, count it on the zone, and start the next pending zone.
    pub fn end_session(&self, practitioner_id: &str, outcome: EndOutcome) -> FlowResult<SessionEnded> {
        if matches!(outcome.duration_secs, Some(d) if d < 0) {
            return Err(FlowError::Validation("duration cannot be negative".into()));
        }
        let slot = self.existing_slot(practitioner_id, "end")?;
        let mut slot = slot.lock()?;
        let Some(active) = slot.active.clone() else {
            return Err(FlowError::transition(ENTITY, practitioner_id, IDLE, "end"));
        };

        // Resolve the next zone before touching anything so a failure leaves the slot as is.
        // Zones whose plan was used up since the visit started are dropped.
        let mut exhausted = 0;
        let mut next_allocation = None;
        for pending in &slot.pending {
            let allocation = self
                .registry
                .zone_allocation(&active.patient_id, &pending.zone_id)?
                .ok_or_else(|| missing_allocation(&active.patient_id, &pending.zone_id))?;
            if allocation.remaining() > 0 {
                next_allocation = Some(allocation);
                break;
            }
            warn!(
                "Skipping {} for patient {}: all {} planned sessions are done",
                allocation.zone_name, active.patient_id, allocation.planned_sessions
            );
            exhausted += 1;
        }

        let now = Utc::now();
        let duration_secs = outcome
            .duration_secs
            .unwrap_or_else(|| active.elapsed_at(now).num_seconds());
        let counted = self
            .registry
            .adjust_zone_allocation(&active.patient_id, &active.zone_id, 1)?;

        let event = SessionEndedEvent {
            session_id: active.session_id.clone(),
            practitioner_id: active.practitioner_id.clone(),
            patient_id: active.patient_id.clone(),
            zone_id: active.zone_id.clone(),
            zone_name: active.zone_name.clone(),
            session_ordinal: active.session_ordinal,
            total_sessions: active.total_sessions,
            duration_secs,
            notes: outcome.notes,
            photos: outcome.photos,
        };
        info!(
            "Practitioner {} ended {} {}/{} after {}s ({} of {} done)",
            practitioner_id,
            active.zone_name,
            active.session_ordinal,
            active.total_sessions,
            duration_secs,
            counted.completed_sessions,
            counted.planned_sessions
        );

        slot.pending.drain(..exhausted);
        let next = match (slot.pending.pop_front(), next_allocation) {
            (Some(pending), Some(allocation)) => {
                let params = outcome
                    .next_laser_params
                    .or(pending.laser_params)
                    .unwrap_or_else(|| active.laser_params.clone());
                let session = open_session(
                    practitioner_id,
                    &allocation,
                    params,
                    active.queue_entry_id.clone(),
                );
                info!(
                    "Practitioner {} moved on to {} {}/{}",
                    practitioner_id, session.zone_name, session.session_ordinal, session.total_sessions
                );
                Some(session)
            }
            _ => None,
        };
        slot.active = next.clone();
        let mut claims = self.claims.lock()?;
        match &next {
            Some(session) => {
                claims.insert(session.patient_id.clone(), PatientClaim::of(session));
            }
            None => {
                claims.remove(&active.patient_id);
            }
        }

        Ok(SessionEnded { event, next })
    }

    pub fn pause(&self, practitioner_id: &str) -> FlowResult<ActiveSession> {
        self.with_active(practitioner_id, "pause", |session| {
            if session.pause_at(Utc::now()) {
                Ok(())
            } else {
                Err(FlowError::transition(ENTITY, &session.session_id, "paused", "pause"))
            }
        })
    }

    pub fn resume(&self, practitioner_id: &str) -> FlowResult<ActiveSession> {
        self.with_active(practitioner_id, "resume", |session| {
            if session.resume_at(Utc::now()) {
                Ok(())
            } else {
                Err(FlowError::transition(ENTITY, &session.session_id, "running", "resume"))
            }
        })
    }

    /// Drop the session and its pending zones without counting anything.
    pub fn cancel_session(&self, practitioner_id: &str) -> FlowResult<Option<ActiveSession>> {
        let slot = match self.slots.read()?.get(practitioner_id) {
            Some(slot) => Arc::clone(slot),
            None => return Ok(None),
        };
        let mut slot = slot.lock()?;
        slot.pending.clear();
        let cancelled = slot.active.take();
        if let Some(session) = &cancelled {
            self.claims.lock()?.remove(&session.patient_id);
            info!(
                "Cancelled session {} of practitioner {} on {}",
                session.session_id, practitioner_id, session.zone_name
            );
        }
        Ok(cancelled)
    }

    /// Cancel whichever session was started from this queue entry.
    pub fn cancel_for_entry(&self, queue_entry_id: &str) -> FlowResult<Option<ActiveSession>> {
        for (practitioner_id, slot) in self.all_slots()? {
            let mut slot = slot.lock()?;
            let linked = slot
                .active
                .as_ref()
                .is_some_and(|s| s.queue_entry_id.as_deref() == Some(queue_entry_id));
            if linked {
                slot.pending.clear();
                let cancelled = slot.active.take();
                if let Some(session) = &cancelled {
                    self.claims.lock()?.remove(&session.patient_id);
                }
                info!(
                    "Cancelled session of practitioner {} for entry {}",
                    practitioner_id, queue_entry_id
                );
                return Ok(cancelled);
            }
        }
        Ok(None)
    }

    pub fn active_session(&self, practitioner_id: &str) -> FlowResult<Option<ActiveSession>> {
        match self.slots.read()?.get(practitioner_id) {
            Some(slot) => Ok(slot.lock()?.active.clone()),
            None => Ok(None),
        }
    }

    pub fn pending_zones(&self, practitioner_id: &str) -> FlowResult<Vec<PendingZone>> {
        match self.slots.read()?.get(practitioner_id) {
            Some(slot) => Ok(slot.lock()?.pending.iter().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }

    /// Snapshot of every running session, by practitioner id.
    pub fn active_sessions(&self) -> FlowResult<Vec<ActiveSession>> {
        let mut sessions = Vec::new();
        for (_, slot) in self.all_slots()? {
            if let Some(active) = &slot.lock()?.active {
                sessions.push(active.clone());
            }
        }
        Ok(sessions)
    }

    fn with_active(
        &self,
        practitioner_id: &str,
        action: &'static str,
        apply: impl FnOnce(&mut ActiveSession) -> FlowResult<()>,
    ) -> FlowResult<ActiveSession> {
        let slot = self.existing_slot(practitioner_id, action)?;
        let mut slot = slot.lock()?;
        let Some(session) = slot.active.as_mut() else {
            return Err(FlowError::transition(ENTITY, practitioner_id, IDLE, action));
        };
        apply(session)?;
        info!("Practitioner {} {}d session {}", practitioner_id, action, session.session_id);
        Ok(session.clone())
    }

    /// Allocation the patient can still be treated on.
    fn treatable_allocation(&self, patient_id: &str, zone_id: &str) -> FlowResult<PatientZoneAllocation> {
        let allocation = self
            .registry
            .zone_allocation(patient_id, zone_id)?
            .ok_or_else(|| missing_allocation(patient_id, zone_id))?;
        if allocation.remaining() == 0 {
            return Err(FlowError::Validation(format!(
                "all {} planned sessions of {} are done for patient {}",
                allocation.planned_sessions, allocation.zone_name, patient_id
            )));
        }
        Ok(allocation)
    }

    fn slot(&self, practitioner_id: &str) -> FlowResult<Arc<Mutex<PractitionerSlot>>> {
        if let Some(slot) = self.slots.read()?.get(practitioner_id) {
            return Ok(Arc::clone(slot));
        }
        let mut slots = self.slots.write()?;
        Ok(Arc::clone(slots.entry(practitioner_id.to_string()).or_default()))
    }

    fn existing_slot(
        &self,
        practitioner_id: &str,
        action: &'static str,
    ) -> FlowResult<Arc<Mutex<PractitionerSlot>>> {
        self.slots
            .read()?
            .get(practitioner_id)
            .cloned()
            .ok_or_else(|| FlowError::transition(ENTITY, practitioner_id, IDLE, action))
    }

    fn all_slots(&self) -> FlowResult<Vec<(String, Arc<Mutex<PractitionerSlot>>)>> {
        let mut slots: Vec<(String, Arc<Mutex<PractitionerSlot>>)> = self
            .slots
            .read()?
            .iter()
            .map(|(id, slot)| (id.clone(), Arc::clone(slot)))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(slots)
    }
}

impl PatientClaim {
    fn of(session: &ActiveSession) -> Self {
        Self {
            practitioner_id: session.practitioner_id.clone(),
            session_id: session.session_id.clone(),
            zone_id: session.zone_id.clone(),
        }
    }
}

fn open_session(
    practitioner_id: &str,
    allocation: &PatientZoneAllocation,
    laser_params: LaserParams,
    queue_entry_id: Option<String>,
) -> ActiveSession {
    ActiveSession {
        session_id: uuid::Uuid::new_v4().to_string(),
        practitioner_id: practitioner_id.to_string(),
        patient_id: allocation.patient_id.clone(),
        zone_id: allocation.zone_id.clone(),
        zone_name: allocation.zone_name.clone(),
        session_ordinal: allocation.next_ordinal(),
        total_sessions: allocation.planned_sessions,
        laser_params,
        paused: false,
        started_at: Utc::now(),
        paused_at: None,
        paused_ms: 0,
        queue_entry_id,
    }
}

fn check_distinct_zones(request: &StartSession) -> FlowResult<()> {
    let mut seen = HashSet::new();
    let zone_ids = std::iter::once(&request.first_zone_id)
        .chain(request.remaining_zones.iter().map(|z| &z.zone_id));
    for zone_id in zone_ids {
        if !seen.insert(zone_id.as_str()) {
            return Err(FlowError::Validation(format!(
                "zone {} appears twice in the visit",
                zone_id
            )));
        }
    }
    Ok(())
}

fn missing_allocation(patient_id: &str, zone_id: &str) -> FlowError {
    FlowError::Validation(format!(
        "patient {} has no planned sessions for zone {}",
        patient_id, zone_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPatient, Zone};
    use crate::registry::InMemoryRegistry;

    fn params(fluence: f64) -> LaserParams {
        LaserParams {
            laser_type: "alexandrite".into(),
            spot_size_mm: 18.0,
            fluence_j_cm2: fluence,
            pulse_duration_ms: 3.0,
            frequency_hz: 2.0,
        }
    }

    /// Patient with Jambes at 1 of 6 done and Aisselles untouched.
    fn setup() -> (Arc<InMemoryRegistry>, SessionOrchestrator, String) {
        let registry = Arc::new(InMemoryRegistry::new());
        let patient = registry
            .create_patient(NewPatient {
                given_name: "Amel".into(),
                family_name: "Boudiaf".into(),
                ..NewPatient::default()
            })
            .unwrap();
        registry
            .add_planned_sessions(&patient.id, &Zone::new("z-legs", "Jambes"), 6)
            .unwrap();
        registry
            .adjust_zone_allocation(&patient.id, "z-legs", 1)
            .unwrap();
        registry
            .add_planned_sessions(&patient.id, &Zone::new("z-armpits", "Aisselles"), 6)
            .unwrap();
        let sessions = SessionOrchestrator::new(registry.clone());
        (registry, sessions, patient.id)
    }

    fn request(patient_id: &str, first: &str, rest: &[&str]) -> StartSession {
        StartSession {
            practitioner_id: "pr-1".into(),
            patient_id: patient_id.into(),
            first_zone_id: first.into(),
            remaining_zones: rest.iter().map(|z| PendingZone::new(*z)).collect(),
            laser_params: params(14.0),
            queue_entry_id: Some("entry-1".into()),
        }
    }

    #[test]
    fn test_multi_zone_visit_chains_sessions() {
        let (registry, sessions, patient) = setup();

        let started = sessions
            .start_session(request(&patient, "z-legs", &["z-armpits"]))
            .unwrap()
            .proceeded()
            .unwrap();
        assert_eq!(started.zone_name, "Jambes");
        assert_eq!((started.session_ordinal, started.total_sessions), (2, 6));
        assert_eq!(sessions.pending_zones("pr-1").unwrap().len(), 1);

        let ended = sessions
            .end_session(
                "pr-1",
                EndOutcome {
                    duration_secs: Some(900),
                    notes: Some("RAS".into()),
                    photos: vec!["legs-before.jpg".into()],
                    next_laser_params: None,
                },
            )
            .unwrap();

        assert_eq!(ended.event.duration_secs, 900);
        assert_eq!(ended.event.photos, vec!["legs-before.jpg".to_string()]);
        let next = ended.next.expect("next zone should start");
        assert_eq!(next.zone_name, "Aisselles");
        assert_eq!((next.session_ordinal, next.total_sessions), (1, 6));
        assert_eq!(next.patient_id, patient);
        assert_eq!(next.laser_params, params(14.0));
        assert_eq!(next.queue_entry_id.as_deref(), Some("entry-1"));
        assert!(sessions.pending_zones("pr-1").unwrap().is_empty());

        let legs = registry.zone_allocation(&patient, "z-legs").unwrap().unwrap();
        assert_eq!(legs.completed_sessions, 2);
        assert_eq!(legs.remaining(), 4);

        let last = sessions.end_session("pr-1", EndOutcome::default()).unwrap();
        assert!(last.next.is_none());
        assert!(sessions.active_session("pr-1").unwrap().is_none());
    }

    #[test]
    fn test_second_start_is_blocked() {
        let (_, sessions, patient) = setup();
        sessions
            .start_session(request(&patient, "z-legs", &[]))
            .unwrap();

        let outcome = sessions
            .start_session(request(&patient, "z-armpits", &[]))
            .unwrap();
        match outcome.conflict() {
            Some(Conflict::Session(c)) => assert_eq!(c.active_zone_id, "z-legs"),
            other => panic!("expected session conflict, got {:?}", other),
        }
        assert_eq!(sessions.active_session("pr-1").unwrap().unwrap().zone_id, "z-legs");
    }

    #[test]
    fn test_next_zone_param_precedence() {
        let (_, sessions, patient) = setup();
        let mut req = request(&patient, "z-legs", &[]);
        req.remaining_zones = vec![PendingZone {
            zone_id: "z-armpits".into(),
            laser_params: Some(params(10.0)),
        }];
        sessions.start_session(req.clone()).unwrap();
        let next = sessions
            .end_session("pr-1", EndOutcome::default())
            .unwrap()
            .next
            .unwrap();
        assert_eq!(next.laser_params.fluence_j_cm2, 10.0);
        sessions.cancel_session("pr-1").unwrap();

        sessions.start_session(req).unwrap();
        let outcome = EndOutcome {
            next_laser_params: Some(params(8.0)),
            ..EndOutcome::default()
        };
        let next = sessions.end_session("pr-1", outcome).unwrap().next.unwrap();
        assert_eq!(next.laser_params.fluence_j_cm2, 8.0);
    }

    #[test]
    fn test_start_requires_treatable_allocation() {
        let (registry, sessions, patient) = setup();
        assert!(matches!(
            sessions.start_session(request(&patient, "z-face", &[])),
            Err(FlowError::Validation(_))
        ));
        assert!(matches!(
            sessions.start_session(request(&patient, "z-legs", &["z-face"])),
            Err(FlowError::Validation(_))
        ));
        assert!(matches!(
            sessions.start_session(request(&patient, "z-legs", &["z-legs"])),
            Err(FlowError::Validation(_))
        ));

        registry.adjust_zone_allocation(&patient, "z-legs", 5).unwrap();
        assert!(matches!(
            sessions.start_session(request(&patient, "z-legs", &[])),
            Err(FlowError::Validation(_))
        ));
        assert!(sessions.active_session("pr-1").unwrap().is_none());
    }

    #[test]
    fn test_pause_resume_guards() {
        let (_, sessions, patient) = setup();
        assert!(sessions.pause("pr-1").unwrap_err().is_invalid_transition());

        sessions.start_session(request(&patient, "z-legs", &[])).unwrap();
        assert!(sessions.pause("pr-1").unwrap().paused);
        assert!(sessions.pause("pr-1").unwrap_err().is_invalid_transition());
        assert!(!sessions.resume("pr-1").unwrap().paused);
        assert!(sessions.resume("pr-1").unwrap_err().is_invalid_transition());
    }

    #[test]
    fn test_end_without_session_is_invalid() {
        let (_, sessions, _) = setup();
        assert!(sessions
            .end_session("pr-1", EndOutcome::default())
            .unwrap_err()
            .is_invalid_transition());
    }

    #[test]
    fn test_cancel_leaves_allocations_alone() {
        let (registry, sessions, patient) = setup();
        sessions
            .start_session(request(&patient, "z-legs", &["z-armpits"]))
            .unwrap();

        let cancelled = sessions.cancel_for_entry("entry-1").unwrap();
        assert_eq!(cancelled.map(|s| s.zone_id), Some("z-legs".to_string()));
        assert!(sessions.active_sessions().unwrap().is_empty());
        assert!(sessions.pending_zones("pr-1").unwrap().is_empty());
        assert_eq!(
            registry
                .zone_allocation(&patient, "z-legs")
                .unwrap()
                .unwrap()
                .completed_sessions,
            1
        );
        assert!(sessions.cancel_for_entry("entry-1").unwrap().is_none());
    }

    #[test]
    fn test_practitioners_are_independent() {
        let (registry, sessions, patient) = setup();
        let other_patient = registry
            .create_patient(NewPatient {
                given_name: "Karim".into(),
                family_name: "Hadj".into(),
                ..NewPatient::default()
            })
            .unwrap();
        registry
            .add_planned_sessions(&other_patient.id, &Zone::new("z-legs", "Jambes"), 6)
            .unwrap();

        sessions.start_session(request(&patient, "z-legs", &[])).unwrap();
        let mut other = request(&other_patient.id, "z-legs", &[]);
        other.practitioner_id = "pr-2".into();

        assert!(!sessions.start_session(other).unwrap().is_blocked());
        assert_eq!(sessions.active_sessions().unwrap().len(), 2);
    }

    #[test]
    fn test_patient_cannot_be_in_two_visits() {
        let (_, sessions, patient) = setup();
        sessions
            .start_session(request(&patient, "z-legs", &["z-armpits"]))
            .unwrap();

        // Same zone and a pending zone are both taken
        for zone in ["z-legs", "z-armpits"] {
            let mut other = request(&patient, zone, &[]);
            other.practitioner_id = "pr-2".into();
            match sessions.start_session(other).unwrap().conflict() {
                Some(Conflict::Session(c)) => {
                    assert_eq!(c.practitioner_id, "pr-1");
                    assert_eq!(c.active_zone_id, "z-legs");
                }
                other => panic!("expected session conflict, got {:?}", other),
            }
        }
        assert!(sessions.active_session("pr-2").unwrap().is_none());

        // Still held while the visit chains to the next zone
        sessions.end_session("pr-1", EndOutcome::default()).unwrap();
        let mut other = request(&patient, "z-armpits", &[]);
        other.practitioner_id = "pr-2".into();
        assert!(sessions.start_session(other.clone()).unwrap().is_blocked());

        sessions.end_session("pr-1", EndOutcome::default()).unwrap();
        assert!(!sessions.start_session(other).unwrap().is_blocked());
    }

    #[test]
    fn test_cancel_releases_patient() {
        let (_, sessions, patient) = setup();
        sessions.start_session(request(&patient, "z-legs", &[])).unwrap();
        sessions.cancel_session("pr-1").unwrap();

        let mut other = request(&patient, "z-legs", &[]);
        other.practitioner_id = "pr-2".into();
        assert!(!sessions.start_session(other).unwrap().is_blocked());
        sessions.cancel_for_entry("entry-1").unwrap();

        assert!(!sessions
            .start_session(request(&patient, "z-legs", &[]))
            .unwrap()
            .is_blocked());
    }

    #[test]
    fn test_exhausted_pending_zone_is_not_started() {
        let (registry, sessions, patient) = setup();
        registry
            .add_planned_sessions(&patient, &Zone::new("z-arms", "Bras"), 1)
            .unwrap();
        sessions
            .start_session(request(&patient, "z-legs", &["z-arms"]))
            .unwrap();
        // The only planned arms session gets recorded elsewhere meanwhile
        registry.adjust_zone_allocation(&patient, "z-arms", 1).unwrap();

        let ended = sessions.end_session("pr-1", EndOutcome::default()).unwrap();
        assert!(ended.next.is_none());
        assert!(sessions.pending_zones("pr-1").unwrap().is_empty());
        assert!(sessions.active_session("pr-1").unwrap().is_none());

        let legs = registry.zone_allocation(&patient, "z-legs").unwrap().unwrap();
        assert_eq!(legs.completed_sessions, 2);
        let arms = registry.zone_allocation(&patient, "z-arms").unwrap().unwrap();
        assert_eq!((arms.completed_sessions, arms.planned_sessions), (1, 1));
    }

    #[test]
    fn test_exhausted_pending_zone_is_skipped() {
        let (registry, sessions, patient) = setup();
        registry
            .add_planned_sessions(&patient, &Zone::new("z-arms", "Bras"), 1)
            .unwrap();
        sessions
            .start_session(request(&patient, "z-legs", &["z-arms", "z-armpits"]))
            .unwrap();
        registry.adjust_zone_allocation(&patient, "z-arms", 1).unwrap();

        let next = sessions
            .end_session("pr-1", EndOutcome::default())
            .unwrap()
            .next
            .expect("armpits should start");
        assert_eq!(next.zone_id, "z-armpits");
        assert_eq!((next.session_ordinal, next.total_sessions), (1, 6));
        assert!(sessions.pending_zones("pr-1").unwrap().is_empty());
    }
}
