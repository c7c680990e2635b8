//! SQLite schema definition.

/// Complete database schema for the patient registry adapter.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    given_name TEXT NOT NULL,
    family_name TEXT NOT NULL,
    name_key TEXT NOT NULL,                      -- normalized, order-insensitive full name
    phone TEXT,
    phone_normalized TEXT,                       -- digits only, national form
    card_code TEXT NOT NULL UNIQUE,
    date_of_birth TEXT,
    sex TEXT,
    address TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_phone ON patients(phone_normalized);
CREATE INDEX IF NOT EXISTS idx_patients_name_key ON patients(name_key);

-- ============================================================================
-- Zone Allocations (planned / completed sessions per zone)
-- ============================================================================

CREATE TABLE IF NOT EXISTS zone_allocations (
    patient_id TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    zone_id TEXT NOT NULL,
    zone_name TEXT NOT NULL,
    planned_sessions INTEGER NOT NULL CHECK (planned_sessions >= 0),
    completed_sessions INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (patient_id, zone_id),
    CHECK (completed_sessions >= 0 AND completed_sessions <= planned_sessions)
);

CREATE INDEX IF NOT EXISTS idx_allocations_patient ON zone_allocations(patient_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_allocation_cannot_exceed_planned() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO patients (id, given_name, family_name, name_key, card_code) VALUES ('p1', 'Amel', 'Boudiaf', 'amel boudiaf', 'LC-1')",
            [],
        )
        .unwrap();

        // Over-consumed allocation should fail
        let result = conn.execute(
            "INSERT INTO zone_allocations (patient_id, zone_id, zone_name, planned_sessions, completed_sessions) VALUES ('p1', 'z1', 'Jambes', 6, 7)",
            [],
        );
        assert!(result.is_err());

        // Valid allocation should succeed
        let result = conn.execute(
            "INSERT INTO zone_allocations (patient_id, zone_id, zone_name, planned_sessions, completed_sessions) VALUES ('p1', 'z1', 'Jambes', 6, 2)",
            [],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_allocation_requires_patient() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO zone_allocations (patient_id, zone_id, zone_name, planned_sessions) VALUES ('ghost', 'z1', 'Jambes', 6)",
            [],
        );
        assert!(result.is_err());
    }
}
