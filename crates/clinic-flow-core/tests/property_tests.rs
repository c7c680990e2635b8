//! Queue and session invariants under arbitrary operation sequences.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use clinic_flow_core::models::{
    EndOutcome, EntryStatus, LaserParams, NewEntry, Outcome, Patient, PendingZone, StartSession,
    Zone,
};
use clinic_flow_core::{InMemoryRegistry, PatientRegistry, QueueEngine, SessionOrchestrator};
use proptest::prelude::*;

const DOCTORS: [&str; 3] = ["dr-1", "dr-2", "dr-3"];

#[derive(Debug, Clone)]
enum QueueOp {
    CheckIn(usize),
    Call(usize),
    Complete(usize),
    NoShow(usize),
    Left(usize),
    Reassign(usize, usize),
}

fn queue_op(entries: usize) -> impl Strategy<Value = QueueOp> {
    prop_oneof![
        3 => (0..entries).prop_map(QueueOp::CheckIn),
        1 => (0..entries).prop_map(QueueOp::Call),
        1 => (0..entries).prop_map(QueueOp::Complete),
        1 => (0..entries).prop_map(QueueOp::NoShow),
        1 => (0..entries).prop_map(QueueOp::Left),
        1 => (0..entries, 0..DOCTORS.len()).prop_map(|(e, d)| QueueOp::Reassign(e, d)),
    ]
}

#[derive(Debug, Clone)]
enum SessionOp {
    Start(usize, usize),
    End(usize),
    Pause(usize),
    Resume(usize),
    Cancel(usize),
}

fn session_op() -> impl Strategy<Value = SessionOp> {
    prop_oneof![
        3 => (0..2usize, 0..3usize).prop_map(|(p, patient)| SessionOp::Start(p, patient)),
        2 => (0..2usize).prop_map(SessionOp::End),
        1 => (0..2usize).prop_map(SessionOp::Pause),
        1 => (0..2usize).prop_map(SessionOp::Resume),
        1 => (0..2usize).prop_map(SessionOp::Cancel),
    ]
}

fn params() -> LaserParams {
    LaserParams {
        laser_type: "nd:yag".to_string(),
        spot_size_mm: 10.0,
        fluence_j_cm2: 30.0,
        pulse_duration_ms: 10.0,
        frequency_hz: 1.0,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever the operators do, positions within a doctor's day stay unique
    /// and only entries that were checked in carry one.
    #[test]
    fn prop_positions_unique_per_partition(
        ops in prop::collection::vec(queue_op(8), 1..60)
    ) {
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let queue = QueueEngine::new();
        let ids: Vec<String> = (0..8)
            .map(|i| {
                queue
                    .create_entry(NewEntry::manual(
                        day,
                        NaiveTime::from_hms_opt(8 + i as u32, 0, 0).unwrap(),
                        DOCTORS[i % DOCTORS.len()],
                        None,
                        "Patient",
                        format!("P{}", i),
                    ))
                    .unwrap()
                    .id
            })
            .collect();

        for op in ops {
            // Refused transitions are part of the game; only the state matters
            let _ = match op {
                QueueOp::CheckIn(i) => queue.check_in(&ids[i]).map(|_| ()),
                QueueOp::Call(i) => queue.call(&ids[i]).map(|_| ()),
                QueueOp::Complete(i) => queue.complete(&ids[i]).map(|_| ()),
                QueueOp::NoShow(i) => queue.mark_no_show(&ids[i]).map(|_| ()),
                QueueOp::Left(i) => queue.mark_left(&ids[i]).map(|_| ()),
                QueueOp::Reassign(i, d) => queue.reassign(&ids[i], DOCTORS[d]).map(|_| ()),
            };
        }

        let entries = queue.entries_for_day(day).unwrap();
        prop_assert_eq!(entries.len(), ids.len());
        for doctor in DOCTORS {
            let positions: Vec<u32> = entries
                .iter()
                .filter(|e| e.doctor_id == doctor)
                .filter_map(|e| e.position)
                .collect();
            let unique: HashSet<u32> = positions.iter().copied().collect();
            prop_assert_eq!(unique.len(), positions.len());
        }
        for entry in &entries {
            if entry.status == EntryStatus::Expected {
                prop_assert!(entry.position.is_none());
            }
            if matches!(entry.status, EntryStatus::CheckedIn | EntryStatus::InTreatment) {
                prop_assert!(entry.position.is_some());
            }
        }
    }

    /// A practitioner never holds more than one session, a patient is never in
    /// two, and allocations count exactly the sessions that ended.
    #[test]
    fn prop_single_active_session(ops in prop::collection::vec(session_op(), 1..50)) {
        let registry = Arc::new(InMemoryRegistry::new());
        let mut patients = Vec::new();
        for i in 0..3 {
            let patient = Patient::new("Patient".to_string(), format!("P{}", i));
            registry.insert(patient.clone()).unwrap();
            registry.add_planned_sessions(&patient.id, &Zone::new("legs", "Jambes"), 50).unwrap();
            registry.add_planned_sessions(&patient.id, &Zone::new("armpits", "Aisselles"), 50).unwrap();
            patients.push(patient.id);
        }
        let sessions = SessionOrchestrator::new(registry.clone());
        let practitioners = ["pr-1", "pr-2"];
        let mut ended = 0u32;

        for op in ops {
            match op {
                SessionOp::Start(p, patient) => {
                    let before = sessions.active_session(practitioners[p]).unwrap();
                    let outcome = sessions.start_session(StartSession {
                        practitioner_id: practitioners[p].to_string(),
                        patient_id: patients[patient].clone(),
                        first_zone_id: "legs".to_string(),
                        remaining_zones: vec![PendingZone::new("armpits")],
                        laser_params: params(),
                        queue_entry_id: None,
                    }).unwrap();
                    match outcome {
                        Outcome::Proceed(_) => prop_assert!(before.is_none()),
                        Outcome::Blocked(_) => {
                            // Nothing changed
                            prop_assert_eq!(sessions.active_session(practitioners[p]).unwrap(), before);
                        }
                    }
                }
                SessionOp::End(p) => {
                    let pending = sessions.pending_zones(practitioners[p]).unwrap().len();
                    if let Ok(result) = sessions.end_session(practitioners[p], EndOutcome::default()) {
                        ended += 1;
                        prop_assert_eq!(result.next.is_some(), pending > 0);
                        prop_assert_eq!(
                            sessions.pending_zones(practitioners[p]).unwrap().len(),
                            pending.saturating_sub(1)
                        );
                    }
                }
                SessionOp::Pause(p) => { let _ = sessions.pause(practitioners[p]); }
                SessionOp::Resume(p) => { let _ = sessions.resume(practitioners[p]); }
                SessionOp::Cancel(p) => { let _ = sessions.cancel_session(practitioners[p]); }
            }

            let active = sessions.active_sessions().unwrap();
            let owners: HashSet<&str> = active.iter().map(|s| s.practitioner_id.as_str()).collect();
            prop_assert_eq!(owners.len(), active.len());
            let treated: HashSet<&str> = active.iter().map(|s| s.patient_id.as_str()).collect();
            prop_assert_eq!(treated.len(), active.len());
        }

        let mut counted = 0;
        for patient_id in &patients {
            for allocation in registry.zone_allocations(patient_id).unwrap() {
                counted += allocation.completed_sessions;
            }
        }
        prop_assert_eq!(counted, ended);
    }
}
