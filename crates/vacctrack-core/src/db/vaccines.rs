//! Vaccine catalog database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::Vaccine;

const VACCINE_COLUMNS: &str = "id, name, recommended_age_in_weeks, sequence, notes";

impl Database {
    /// Insert or update a catalog entry by id.
    pub fn upsert_vaccine(&self, vaccine: &Vaccine) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO vaccines (id, name, recommended_age_in_weeks, sequence, notes)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                recommended_age_in_weeks = excluded.recommended_age_in_weeks,
                sequence = excluded.sequence,
                notes = excluded.notes
            "#,
            params![
                vaccine.id,
                vaccine.name,
                vaccine.recommended_age_in_weeks,
                vaccine.sequence,
                vaccine.notes,
            ],
        )?;
        Ok(())
    }

    /// Get a catalog entry by id.
    pub fn get_vaccine(&self, id: &str) -> DbResult<Option<Vaccine>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {VACCINE_COLUMNS} FROM vaccines WHERE id = ?"),
                [id],
                map_vaccine_row,
            )
            .optional()?)
    }

    /// Case-insensitive lookup by name. Names are not unique; the lowest
    /// sequence wins, matching catalog display order.
    pub fn find_vaccine_by_name(&self, name: &str) -> DbResult<Option<Vaccine>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {VACCINE_COLUMNS} FROM vaccines \
                     WHERE lower(trim(name)) = lower(trim(?)) \
                     ORDER BY sequence LIMIT 1"
                ),
                [name],
                map_vaccine_row,
            )
            .optional()?)
    }

    /// Lookup by name and age offset (backfill key).
    pub fn find_vaccine_by_name_and_weeks(
        &self,
        name: &str,
        weeks: u32,
    ) -> DbResult<Option<Vaccine>> {
        Ok(self
            .conn
            .query_row(
                &format!(
                    "SELECT {VACCINE_COLUMNS} FROM vaccines \
                     WHERE lower(trim(name)) = lower(trim(?1)) AND recommended_age_in_weeks = ?2 \
                     ORDER BY sequence LIMIT 1"
                ),
                params![name, weeks],
                map_vaccine_row,
            )
            .optional()?)
    }

    /// List the catalog in generation/display order.
    pub fn list_vaccines(&self) -> DbResult<Vec<Vaccine>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {VACCINE_COLUMNS} FROM vaccines ORDER BY sequence, name"
        ))?;
        let rows = stmt.query_map([], map_vaccine_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a catalog entry; dose references are nullified.
    pub fn delete_vaccine(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM vaccines WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Delete the whole catalog (restore flow).
    pub fn delete_all_vaccines(&self) -> DbResult<usize> {
        Ok(self.conn.execute("DELETE FROM vaccines", [])?)
    }

    pub fn count_vaccines(&self) -> DbResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM vaccines", [], |row| row.get(0))?)
    }

    /// Next free sequence number for catalog entries created after seeding.
    pub fn next_vaccine_sequence(&self) -> DbResult<i32> {
        let max: Option<i32> = self
            .conn
            .query_row("SELECT MAX(sequence) FROM vaccines", [], |row| row.get(0))?;
        Ok(max.map_or(0, |m| m + 1))
    }
}

fn map_vaccine_row(row: &Row<'_>) -> rusqlite::Result<Vaccine> {
    Ok(Vaccine {
        id: row.get(0)?,
        name: row.get(1)?,
        recommended_age_in_weeks: row.get(2)?,
        sequence: row.get(3)?,
        notes: row.get(4)?,
    })
}
