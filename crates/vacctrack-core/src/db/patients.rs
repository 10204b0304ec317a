//! Patient database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{fmt_ts, parse_ts, Database, DbError, DbResult};
use crate::models::Patient;
use crate::schedule::start_of_day;

const PATIENT_COLUMNS: &str = "id, first_name, last_name, mother_name, father_name, gender, dob, \
     time_of_birth, mode_of_delivery, birth_weight_grams, length_cm, \
     head_circumference_cm, contact_number, notes, created_at";

impl Database {
    /// Insert or update a patient by id.
    pub fn upsert_patient(&self, patient: &Patient) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO patients (
                id, first_name, last_name, mother_name, father_name, gender, dob,
                time_of_birth, mode_of_delivery, birth_weight_grams, length_cm,
                head_circumference_cm, contact_number, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                mother_name = excluded.mother_name,
                father_name = excluded.father_name,
                gender = excluded.gender,
                dob = excluded.dob,
                time_of_birth = excluded.time_of_birth,
                mode_of_delivery = excluded.mode_of_delivery,
                birth_weight_grams = excluded.birth_weight_grams,
                length_cm = excluded.length_cm,
                head_circumference_cm = excluded.head_circumference_cm,
                contact_number = excluded.contact_number,
                notes = excluded.notes,
                created_at = excluded.created_at
            "#,
            params![
                patient.id,
                patient.first_name,
                patient.last_name,
                patient.mother_name,
                patient.father_name,
                patient.gender,
                fmt_ts(patient.dob),
                patient.time_of_birth,
                patient.mode_of_delivery,
                patient.birth_weight_grams,
                patient.length_cm,
                patient.head_circumference_cm,
                patient.contact_number,
                patient.notes,
                fmt_ts(patient.created_at),
            ],
        )?;
        Ok(())
    }

    /// Get a patient by id.
    pub fn get_patient(&self, id: &str) -> DbResult<Option<Patient>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?"),
                [id],
                map_patient_row,
            )
            .optional()?;
        row.map(PatientRow::try_into).transpose()
    }

    /// List all patients in creation order (export order).
    pub fn list_patients(&self) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map([], map_patient_row)?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.try_into()?);
        }
        Ok(patients)
    }

    /// Delete a patient; doses cascade.
    pub fn delete_patient(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM patients WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Delete every patient (restore flow). Doses cascade.
    pub fn delete_all_patients(&self) -> DbResult<usize> {
        Ok(self.conn.execute("DELETE FROM patients", [])?)
    }

    pub fn count_patients(&self) -> DbResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?)
    }

    /// Count patients sharing an identity: same trimmed case-insensitive
    /// first/last name, born on the same calendar day. A missing last name
    /// and an empty one compare equal. `exclude_id` skips the record being
    /// edited.
    pub fn count_identity_matches(
        &self,
        first_name: &str,
        last_name: Option<&str>,
        dob: DateTime<Utc>,
        exclude_id: Option<&str>,
    ) -> DbResult<i64> {
        let day_start = start_of_day(dob);
        let day_end = day_start + chrono::Duration::days(1);
        let count = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM patients
            WHERE lower(trim(first_name)) = lower(trim(?1))
              AND lower(trim(coalesce(last_name, ''))) = lower(trim(?2))
              AND dob >= ?3 AND dob < ?4
              AND id != coalesce(?5, '')
            "#,
            params![
                first_name,
                last_name.unwrap_or(""),
                fmt_ts(day_start),
                fmt_ts(day_end),
                exclude_id,
            ],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// Intermediate row struct for database mapping.
struct PatientRow {
    id: String,
    first_name: String,
    last_name: Option<String>,
    mother_name: Option<String>,
    father_name: Option<String>,
    gender: Option<String>,
    dob: String,
    time_of_birth: Option<String>,
    mode_of_delivery: Option<String>,
    birth_weight_grams: i32,
    length_cm: i32,
    head_circumference_cm: f32,
    contact_number: Option<String>,
    notes: Option<String>,
    created_at: String,
}

fn map_patient_row(row: &Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        mother_name: row.get(3)?,
        father_name: row.get(4)?,
        gender: row.get(5)?,
        dob: row.get(6)?,
        time_of_birth: row.get(7)?,
        mode_of_delivery: row.get(8)?,
        birth_weight_grams: row.get(9)?,
        length_cm: row.get(10)?,
        head_circumference_cm: row.get(11)?,
        contact_number: row.get(12)?,
        notes: row.get(13)?,
        created_at: row.get(14)?,
    })
}

impl TryFrom<PatientRow> for Patient {
    type Error = DbError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        Ok(Patient {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            mother_name: row.mother_name,
            father_name: row.father_name,
            gender: row.gender,
            dob: parse_ts(&row.dob)?,
            time_of_birth: row.time_of_birth,
            mode_of_delivery: row.mode_of_delivery,
            birth_weight_grams: row.birth_weight_grams,
            length_cm: row.length_cm,
            head_circumference_cm: row.head_circumference_cm,
            contact_number: row.contact_number,
            notes: row.notes,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_upsert_and_get() {
        let db = setup_db();

        let mut patient = Patient::new("Maya".into(), at("2023-05-01T00:00:00Z"));
        patient.last_name = Some("Rao".into());
        patient.birth_weight_grams = 3200;

        db.upsert_patient(&patient).unwrap();

        let retrieved = db.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(retrieved, patient);
    }

    #[test]
    fn test_upsert_overwrites_scalars() {
        let db = setup_db();

        let mut patient = Patient::new("Maya".into(), at("2023-05-01T00:00:00Z"));
        db.upsert_patient(&patient).unwrap();

        patient.notes = Some("allergy noted".into());
        patient.gender = Some("F".into());
        db.upsert_patient(&patient).unwrap();

        let retrieved = db.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(retrieved.notes, Some("allergy noted".into()));
        assert_eq!(retrieved.gender, Some("F".into()));
        assert_eq!(db.count_patients().unwrap(), 1);
    }

    #[test]
    fn test_list_in_creation_order() {
        let db = setup_db();

        let mut a = Patient::new("First".into(), at("2023-05-01T00:00:00Z"));
        a.created_at = at("2024-01-02T00:00:00Z");
        let mut b = Patient::new("Second".into(), at("2023-05-01T00:00:00Z"));
        b.created_at = at("2024-01-01T00:00:00Z");

        db.upsert_patient(&a).unwrap();
        db.upsert_patient(&b).unwrap();

        let names: Vec<String> = db
            .list_patients()
            .unwrap()
            .into_iter()
            .map(|p| p.first_name)
            .collect();
        assert_eq!(names, vec!["Second", "First"]);
    }

    #[test]
    fn test_identity_match_is_case_and_space_insensitive() {
        let db = setup_db();

        let mut patient = Patient::new("Maya".into(), at("2023-05-01T10:00:00Z"));
        patient.last_name = Some("Rao".into());
        db.upsert_patient(&patient).unwrap();

        // Same identity, different casing and spacing, later the same day.
        let count = db
            .count_identity_matches("  maya ", Some("RAO"), at("2023-05-01T23:00:00Z"), None)
            .unwrap();
        assert_eq!(count, 1);

        // Different calendar day
        let count = db
            .count_identity_matches("maya", Some("rao"), at("2023-05-02T00:00:00Z"), None)
            .unwrap();
        assert_eq!(count, 0);

        // Excluding the record itself (edit flow)
        let count = db
            .count_identity_matches("maya", Some("rao"), patient.dob, Some(&patient.id))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_missing_and_empty_last_name_compare_equal() {
        let db = setup_db();

        let patient = Patient::new("Solo".into(), at("2023-05-01T00:00:00Z"));
        db.upsert_patient(&patient).unwrap();

        let count = db
            .count_identity_matches("solo", Some(""), patient.dob, None)
            .unwrap();
        assert_eq!(count, 1);
        let count = db
            .count_identity_matches("solo", None, patient.dob, None)
            .unwrap();
        assert_eq!(count, 1);
    }
}
