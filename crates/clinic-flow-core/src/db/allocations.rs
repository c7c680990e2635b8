//! Zone allocation database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{PatientZoneAllocation, Zone};

impl Database {
    /// All allocations of a patient, ordered by zone name.
    pub fn get_zone_allocations(&self, patient_id: &str) -> DbResult<Vec<PatientZoneAllocation>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT patient_id, zone_id, zone_name, planned_sessions, completed_sessions
            FROM zone_allocations
            WHERE patient_id = ?
            ORDER BY zone_name
            "#,
        )?;
        let rows = stmt.query_map([patient_id], allocation_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// A single allocation.
    pub fn get_zone_allocation(
        &self,
        patient_id: &str,
        zone_id: &str,
    ) -> DbResult<Option<PatientZoneAllocation>> {
        self.conn
            .query_row(
                r#"
                SELECT patient_id, zone_id, zone_name, planned_sessions, completed_sessions
                FROM zone_allocations
                WHERE patient_id = ?1 AND zone_id = ?2
                "#,
                params![patient_id, zone_id],
                allocation_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Create the allocation, or add `sessions` to the planned count of an existing one.
    pub fn add_planned_sessions(
        &self,
        patient_id: &str,
        zone: &Zone,
        sessions: u32,
    ) -> DbResult<PatientZoneAllocation> {
        self.conn.execute(
            r#"
            INSERT INTO zone_allocations (patient_id, zone_id, zone_name, planned_sessions)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(patient_id, zone_id) DO UPDATE SET
                planned_sessions = MIN(planned_sessions + excluded.planned_sessions, 4294967295),
                zone_name = excluded.zone_name,
                updated_at = datetime('now')
            "#,
            params![patient_id, zone.id, zone.name, sessions],
        )?;
        self.get_zone_allocation(patient_id, &zone.id)?
            .ok_or_else(|| DbError::NotFound(format!("allocation {}/{}", patient_id, zone.id)))
    }

    /// Move the completed counter by `delta`, clamped to `0..=planned`.
    pub fn adjust_zone_allocation(
        &self,
        patient_id: &str,
        zone_id: &str,
        delta: i32,
    ) -> DbResult<PatientZoneAllocation> {
        let mut allocation = self
            .get_zone_allocation(patient_id, zone_id)?
            .ok_or_else(|| DbError::NotFound(format!("allocation {}/{}", patient_id, zone_id)))?;
        allocation.apply_completed_delta(delta);

        self.conn.execute(
            r#"
            UPDATE zone_allocations SET
                completed_sessions = ?3,
                updated_at = datetime('now')
            WHERE patient_id = ?1 AND zone_id = ?2
            "#,
            params![patient_id, zone_id, allocation.completed_sessions],
        )?;
        Ok(allocation)
    }
}

fn allocation_from_row(row: &Row<'_>) -> rusqlite::Result<PatientZoneAllocation> {
    Ok(PatientZoneAllocation {
        patient_id: row.get(0)?,
        zone_id: row.get(1)?,
        zone_name: row.get(2)?,
        planned_sessions: row.get(3)?,
        completed_sessions: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Patient;

    fn setup_db() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Amel".into(), "Boudiaf".into());
        db.insert_patient(&patient).unwrap();
        (db, patient.id)
    }

    #[test]
    fn test_add_planned_sessions_creates_then_augments() {
        let (db, patient_id) = setup_db();
        let legs = Zone::new("z-legs", "Jambes");

        let alloc = db.add_planned_sessions(&patient_id, &legs, 6).unwrap();
        assert_eq!(alloc.planned_sessions, 6);
        assert_eq!(alloc.completed_sessions, 0);

        let alloc = db.add_planned_sessions(&patient_id, &legs, 4).unwrap();
        assert_eq!(alloc.planned_sessions, 10);

        assert_eq!(db.get_zone_allocations(&patient_id).unwrap().len(), 1);
    }

    #[test]
    fn test_planned_sessions_saturate() {
        let (db, patient_id) = setup_db();
        let legs = Zone::new("z-legs", "Jambes");
        db.add_planned_sessions(&patient_id, &legs, u32::MAX - 1).unwrap();

        let alloc = db.add_planned_sessions(&patient_id, &legs, 10).unwrap();
        assert_eq!(alloc.planned_sessions, u32::MAX);
    }

    #[test]
    fn test_adjust_is_bounded() {
        let (db, patient_id) = setup_db();
        let armpits = Zone::new("z-arm", "Aisselles");
        db.add_planned_sessions(&patient_id, &armpits, 2).unwrap();

        let alloc = db.adjust_zone_allocation(&patient_id, "z-arm", 1).unwrap();
        assert_eq!(alloc.remaining(), 1);

        let alloc = db.adjust_zone_allocation(&patient_id, "z-arm", 5).unwrap();
        assert_eq!(alloc.completed_sessions, 2);
        assert_eq!(alloc.remaining(), 0);

        let stored = db.get_zone_allocation(&patient_id, "z-arm").unwrap().unwrap();
        assert_eq!(stored.completed_sessions, 2);
    }

    #[test]
    fn test_adjust_missing_allocation() {
        let (db, patient_id) = setup_db();
        let result = db.adjust_zone_allocation(&patient_id, "nope", 1);
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }
}
