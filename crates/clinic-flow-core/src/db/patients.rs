//! Patient database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::matcher::{name_key, normalize_phone};
use crate::models::Patient;

const PATIENT_COLUMNS: &str = r#"
    id, given_name, family_name, phone, card_code, date_of_birth,
    sex, address, active, created_at, updated_at
"#;

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO patients (
                id, given_name, family_name, name_key, phone, phone_normalized,
                card_code, date_of_birth, sex, address, active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                patient.id,
                patient.given_name,
                patient.family_name,
                name_key(&patient.given_name, &patient.family_name),
                patient.phone,
                patient.phone.as_deref().and_then(normalize_phone),
                patient.card_code,
                patient.date_of_birth,
                patient.sex,
                patient.address,
                patient.active,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing patient.
    pub fn update_patient(&self, patient: &Patient) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                given_name = ?2,
                family_name = ?3,
                name_key = ?4,
                phone = ?5,
                phone_normalized = ?6,
                date_of_birth = ?7,
                sex = ?8,
                address = ?9,
                active = ?10,
                updated_at = ?11
            WHERE id = ?1
            "#,
            params![
                patient.id,
                patient.given_name,
                patient.family_name,
                name_key(&patient.given_name, &patient.family_name),
                patient.phone,
                patient.phone.as_deref().and_then(normalize_phone),
                patient.date_of_birth,
                patient.sex,
                patient.address,
                patient.active,
                patient.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM patients WHERE id = ?", PATIENT_COLUMNS),
                [id],
                patient_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Patients whose normalized phone equals the normalized query.
    pub fn find_patients_by_phone(&self, phone: &str) -> DbResult<Vec<Patient>> {
        let Some(normalized) = normalize_phone(phone) else {
            return Ok(Vec::new());
        };
        self.query_patients(
            &format!(
                "SELECT {} FROM patients WHERE phone_normalized = ? ORDER BY created_at",
                PATIENT_COLUMNS
            ),
            &normalized,
        )
    }

    /// Patients whose normalized full name equals that of `full_name`.
    pub fn find_patients_by_name(&self, full_name: &str) -> DbResult<Vec<Patient>> {
        let key = name_key(full_name, "");
        if key.is_empty() {
            return Ok(Vec::new());
        }
        self.query_patients(
            &format!(
                "SELECT {} FROM patients WHERE name_key = ? ORDER BY created_at",
                PATIENT_COLUMNS
            ),
            &key,
        )
    }

    fn query_patients(&self, sql: &str, arg: &str) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([arg], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(0)?,
        given_name: row.get(1)?,
        family_name: row.get(2)?,
        phone: row.get(3)?,
        card_code: row.get(4)?,
        date_of_birth: row.get(5)?,
        sex: row.get(6)?,
        address: row.get(7)?,
        active: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
