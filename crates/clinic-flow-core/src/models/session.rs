//! Treatment session models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Laser device settings for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaserParams {
    /// Laser type (e.g. "alexandrite", "nd:yag", "diode")
    pub laser_type: String,
    /// Spot size in mm
    pub spot_size_mm: f64,
    /// Fluence in J/cm²
    pub fluence_j_cm2: f64,
    /// Pulse duration in ms
    pub pulse_duration_ms: f64,
    /// Frequency in Hz
    pub frequency_hz: f64,
}

/// A zone queued behind the active one within the same visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingZone {
    pub zone_id: String,
    /// Settings for this zone; inherits the running session's when `None`
    pub laser_params: Option<LaserParams>,
}

impl PendingZone {
    pub fn new(zone_id: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            laser_params: None,
        }
    }
}

/// The treatment a practitioner is currently performing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveSession {
    pub session_id: String,
    pub practitioner_id: String,
    pub patient_id: String,
    pub zone_id: String,
    pub zone_name: String,
    /// Completed sessions + 1 at start
    pub session_ordinal: u32,
    /// Planned sessions for the zone
    pub total_sessions: u32,
    pub laser_params: LaserParams,
    pub paused: bool,
    pub started_at: DateTime<Utc>,
    pub paused_at: Option<DateTime<Utc>>,
    /// Accumulated paused time in milliseconds, excluding the current pause
    pub paused_ms: i64,
    /// Queue entry that triggered the session
    pub queue_entry_id: Option<String>,
}

impl ActiveSession {
    /// Mark paused at `now`. Returns false if already paused.
    pub fn pause_at(&mut self, now: DateTime<Utc>) -> bool {
        if self.paused {
            return false;
        }
        self.paused = true;
        self.paused_at = Some(now);
        true
    }

    /// Resume at `now`, folding the pause into the paused total. Returns false if not paused.
    pub fn resume_at(&mut self, now: DateTime<Utc>) -> bool {
        let Some(since) = self.paused_at.take() else {
            return false;
        };
        self.paused = false;
        self.paused_ms += (now - since).num_milliseconds().max(0);
        true
    }

    /// Treatment time up to `now`, excluding every paused interval.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Duration {
        let mut paused = self.paused_ms;
        if let Some(since) = self.paused_at {
            paused += (now - since).num_milliseconds().max(0);
        }
        let wall = (now - self.started_at).num_milliseconds();
        Duration::milliseconds((wall - paused).max(0))
    }

    pub fn started_event(&self) -> SessionStartedEvent {
        SessionStartedEvent {
            practitioner_id: self.practitioner_id.clone(),
            patient_id: self.patient_id.clone(),
            zone_name: self.zone_name.clone(),
            session_ordinal: self.session_ordinal,
            total_sessions: self.total_sessions,
            laser_params: self.laser_params.clone(),
        }
    }
}

/// Emitted when a session starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionStartedEvent {
    pub practitioner_id: String,
    pub patient_id: String,
    pub zone_name: String,
    pub session_ordinal: u32,
    pub total_sessions: u32,
    pub laser_params: LaserParams,
}

/// Emitted when a session ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEndedEvent {
    pub session_id: String,
    pub practitioner_id: String,
    pub patient_id: String,
    pub zone_id: String,
    pub zone_name: String,
    pub session_ordinal: u32,
    pub total_sessions: u32,
    /// Treatment duration in seconds
    pub duration_secs: i64,
    pub notes: Option<String>,
    pub photos: Vec<String>,
}

/// Request to start a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartSession {
    pub practitioner_id: String,
    pub patient_id: String,
    pub first_zone_id: String,
    pub remaining_zones: Vec<PendingZone>,
    pub laser_params: LaserParams,
    pub queue_entry_id: Option<String>,
}

/// What the practitioner records when a session ends.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EndOutcome {
    /// Explicit duration in seconds; computed from the session clock when `None`
    pub duration_secs: Option<i64>,
    pub notes: Option<String>,
    pub photos: Vec<String>,
    /// Settings for the next pending zone, overriding inherited ones
    pub next_laser_params: Option<LaserParams>,
}

/// Result of ending a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEnded {
    pub event: SessionEndedEvent,
    /// Session started automatically for the next pending zone
    pub next: Option<ActiveSession>,
}
