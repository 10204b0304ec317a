//! Dose database operations.

use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{fmt_ts, fmt_ts_opt, parse_ts, parse_ts_opt, Database, DbError, DbResult};
use crate::models::Dose;

const DOSE_COLUMNS: &str = "id, patient_id, vaccine_id, scheduled_date, due_date, given_on, \
     batch_number, facility, administered_by, notes, weight_at_dose, height_at_dose, \
     head_circumference_at_dose, vaccine_brand, photo_data, created_at";

impl Database {
    /// Insert or update a dose by id. Every scalar field is overwritten,
    /// given_on included.
    pub fn upsert_dose(&self, dose: &Dose) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO doses (
                id, patient_id, vaccine_id, scheduled_date, due_date, given_on,
                batch_number, facility, administered_by, notes, weight_at_dose,
                height_at_dose, head_circumference_at_dose, vaccine_brand,
                photo_data, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(id) DO UPDATE SET
                patient_id = excluded.patient_id,
                vaccine_id = excluded.vaccine_id,
                scheduled_date = excluded.scheduled_date,
                due_date = excluded.due_date,
                given_on = excluded.given_on,
                batch_number = excluded.batch_number,
                facility = excluded.facility,
                administered_by = excluded.administered_by,
                notes = excluded.notes,
                weight_at_dose = excluded.weight_at_dose,
                height_at_dose = excluded.height_at_dose,
                head_circumference_at_dose = excluded.head_circumference_at_dose,
                vaccine_brand = excluded.vaccine_brand,
                photo_data = excluded.photo_data,
                created_at = excluded.created_at
            "#,
            params![
                dose.id,
                dose.patient_id,
                dose.vaccine_id,
                fmt_ts(dose.scheduled_date),
                fmt_ts_opt(dose.due_date),
                fmt_ts_opt(dose.given_on),
                dose.batch_number,
                dose.facility,
                dose.administered_by,
                dose.notes,
                dose.weight_at_dose,
                dose.height_at_dose,
                dose.head_circumference_at_dose,
                dose.vaccine_brand,
                dose.photo_data,
                fmt_ts(dose.created_at),
            ],
        )?;
        Ok(())
    }

    /// Get a dose by id.
    pub fn get_dose(&self, id: &str) -> DbResult<Option<Dose>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {DOSE_COLUMNS} FROM doses WHERE id = ?"),
                [id],
                map_dose_row,
            )
            .optional()?;
        row.map(DoseRow::try_into).transpose()
    }

    /// Bulk fetch by id. Dose ids are unique across the whole store, so this
    /// lookup is global, not scoped to a patient.
    pub fn get_doses_by_ids(&self, ids: &[String]) -> DbResult<Vec<Dose>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DOSE_COLUMNS} FROM doses WHERE id IN ({placeholders})"
        ))?;
        let rows = stmt.query_map(params_from_iter(ids), map_dose_row)?;

        let mut doses = Vec::new();
        for row in rows {
            doses.push(row?.try_into()?);
        }
        Ok(doses)
    }

    /// All doses for one patient, earliest scheduled first.
    pub fn doses_for_patient(&self, patient_id: &str) -> DbResult<Vec<Dose>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DOSE_COLUMNS} FROM doses WHERE patient_id = ? ORDER BY scheduled_date, id"
        ))?;
        let rows = stmt.query_map([patient_id], map_dose_row)?;

        let mut doses = Vec::new();
        for row in rows {
            doses.push(row?.try_into()?);
        }
        Ok(doses)
    }

    /// All doses in the store (dedup sweeps).
    pub fn list_doses(&self) -> DbResult<Vec<Dose>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DOSE_COLUMNS} FROM doses ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map([], map_dose_row)?;

        let mut doses = Vec::new();
        for row in rows {
            doses.push(row?.try_into()?);
        }
        Ok(doses)
    }

    /// Delete a dose.
    pub fn delete_dose(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM doses WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Delete every dose (restore flow).
    pub fn delete_all_doses(&self) -> DbResult<usize> {
        Ok(self.conn.execute("DELETE FROM doses", [])?)
    }

    pub fn count_doses(&self) -> DbResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM doses", [], |row| row.get(0))?)
    }

    /// Re-point every dose referencing one catalog entry to another
    /// (catalog dedup).
    pub fn repoint_doses(&self, from_vaccine_id: &str, to_vaccine_id: &str) -> DbResult<usize> {
        Ok(self.conn.execute(
            "UPDATE doses SET vaccine_id = ?1 WHERE vaccine_id = ?2",
            params![to_vaccine_id, from_vaccine_id],
        )?)
    }
}

/// Intermediate row struct for database mapping.
struct DoseRow {
    id: String,
    patient_id: String,
    vaccine_id: Option<String>,
    scheduled_date: String,
    due_date: Option<String>,
    given_on: Option<String>,
    batch_number: Option<String>,
    facility: Option<String>,
    administered_by: Option<String>,
    notes: Option<String>,
    weight_at_dose: f32,
    height_at_dose: f32,
    head_circumference_at_dose: f32,
    vaccine_brand: Option<String>,
    photo_data: Option<Vec<u8>>,
    created_at: String,
}

fn map_dose_row(row: &Row<'_>) -> rusqlite::Result<DoseRow> {
    Ok(DoseRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        vaccine_id: row.get(2)?,
        scheduled_date: row.get(3)?,
        due_date: row.get(4)?,
        given_on: row.get(5)?,
        batch_number: row.get(6)?,
        facility: row.get(7)?,
        administered_by: row.get(8)?,
        notes: row.get(9)?,
        weight_at_dose: row.get(10)?,
        height_at_dose: row.get(11)?,
        head_circumference_at_dose: row.get(12)?,
        vaccine_brand: row.get(13)?,
        photo_data: row.get(14)?,
        created_at: row.get(15)?,
    })
}

impl TryFrom<DoseRow> for Dose {
    type Error = DbError;

    fn try_from(row: DoseRow) -> Result<Self, Self::Error> {
        Ok(Dose {
            id: row.id,
            patient_id: row.patient_id,
            vaccine_id: row.vaccine_id,
            scheduled_date: parse_ts(&row.scheduled_date)?,
            due_date: parse_ts_opt(row.due_date.as_deref())?,
            given_on: parse_ts_opt(row.given_on.as_deref())?,
            batch_number: row.batch_number,
            facility: row.facility,
            administered_by: row.administered_by,
            notes: row.notes,
            weight_at_dose: row.weight_at_dose,
            height_at_dose: row.height_at_dose,
            head_circumference_at_dose: row.head_circumference_at_dose,
            vaccine_brand: row.vaccine_brand,
            photo_data: row.photo_data,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Patient, Vaccine};
    use chrono::{DateTime, Utc};

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn insert_patient(db: &Database, name: &str) -> Patient {
        let patient = Patient::new(name.into(), at("2023-01-01T00:00:00Z"));
        db.upsert_patient(&patient).unwrap();
        patient
    }

    #[test]
    fn test_upsert_preserves_every_field() {
        let db = setup_db();
        let patient = insert_patient(&db, "Maya");
        let vaccine = Vaccine::new("BCG".into(), 0, 0);
        db.upsert_vaccine(&vaccine).unwrap();

        let mut dose = Dose::new(patient.id.clone(), at("2023-01-01T00:00:00Z"));
        dose.vaccine_id = Some(vaccine.id.clone());
        dose.given_on = Some(at("2023-01-02T09:15:00Z"));
        dose.batch_number = Some("B-42".into());
        dose.facility = Some("City Clinic".into());
        dose.administered_by = Some("Dr. Iyer".into());
        dose.weight_at_dose = 3.4;
        dose.vaccine_brand = Some("BrandX".into());
        dose.photo_data = Some(vec![0xff, 0xd8, 0xff]);

        db.upsert_dose(&dose).unwrap();

        let retrieved = db.get_dose(&dose.id).unwrap().unwrap();
        assert_eq!(retrieved, dose);
    }

    #[test]
    fn test_bulk_fetch_is_global() {
        let db = setup_db();
        let a = insert_patient(&db, "A");
        let b = insert_patient(&db, "B");

        let dose_a = Dose::new(a.id.clone(), at("2023-02-01T00:00:00Z"));
        let dose_b = Dose::new(b.id.clone(), at("2023-02-01T00:00:00Z"));
        db.upsert_dose(&dose_a).unwrap();
        db.upsert_dose(&dose_b).unwrap();

        let ids = vec![dose_a.id.clone(), dose_b.id.clone(), "missing".into()];
        let fetched = db.get_doses_by_ids(&ids).unwrap();
        assert_eq!(fetched.len(), 2);

        assert!(db.get_doses_by_ids(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_doses_for_patient_sorted_by_schedule() {
        let db = setup_db();
        let patient = insert_patient(&db, "Maya");

        let later = Dose::new(patient.id.clone(), at("2023-03-01T00:00:00Z"));
        let earlier = Dose::new(patient.id.clone(), at("2023-02-01T00:00:00Z"));
        db.upsert_dose(&later).unwrap();
        db.upsert_dose(&earlier).unwrap();

        let doses = db.doses_for_patient(&patient.id).unwrap();
        assert_eq!(doses[0].id, earlier.id);
        assert_eq!(doses[1].id, later.id);
    }

    #[test]
    fn test_repoint_doses() {
        let db = setup_db();
        let patient = insert_patient(&db, "Maya");
        let keep = Vaccine::new("Hib-1".into(), 6, 6);
        let dup = Vaccine::new("hib-1".into(), 6, 99);
        db.upsert_vaccine(&keep).unwrap();
        db.upsert_vaccine(&dup).unwrap();

        let mut dose = Dose::new(patient.id.clone(), at("2023-02-12T00:00:00Z"));
        dose.vaccine_id = Some(dup.id.clone());
        db.upsert_dose(&dose).unwrap();

        let moved = db.repoint_doses(&dup.id, &keep.id).unwrap();
        assert_eq!(moved, 1);
        assert_eq!(
            db.get_dose(&dose.id).unwrap().unwrap().vaccine_id,
            Some(keep.id)
        );
    }
}
