//! App state key/value operations: backup timestamps, one-time flags.

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use super::{fmt_ts, parse_ts, Database, DbResult};

/// Timestamp of the most recent backup write.
pub const LAST_BACKUP_AT: &str = "last_backup_at";
/// Timestamp of the most recent restore; used to suppress backfill briefly.
pub const LAST_RESTORE_AT: &str = "last_restore_at";
/// One-time flag set after the catalog dedup sweep.
pub const CATALOG_DEDUP_DONE: &str = "catalog_dedup_done";

/// Per-patient one-time backfill flag.
pub fn backfill_flag_key(patient_id: &str) -> String {
    format!("backfilled_patient_{patient_id}")
}

impl Database {
    /// Set a state value, overwriting any previous one.
    pub fn set_state(&self, key: &str, value: &str) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO app_state (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')
            "#,
            [key, value],
        )?;
        Ok(())
    }

    /// Get a state value.
    pub fn get_state(&self, key: &str) -> DbResult<Option<String>> {
        Ok(self
            .conn
            .query_row("SELECT value FROM app_state WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?)
    }

    /// Read a boolean flag; absent means false.
    pub fn state_flag(&self, key: &str) -> DbResult<bool> {
        Ok(self.get_state(key)?.as_deref() == Some("true"))
    }

    /// Set a boolean flag.
    pub fn set_state_flag(&self, key: &str, value: bool) -> DbResult<()> {
        self.set_state(key, if value { "true" } else { "false" })
    }

    /// Read a timestamp value; absent means None.
    pub fn state_instant(&self, key: &str) -> DbResult<Option<DateTime<Utc>>> {
        self.get_state(key)?.as_deref().map(parse_ts).transpose()
    }

    /// Set a timestamp value.
    pub fn set_state_instant(&self, key: &str, value: DateTime<Utc>) -> DbResult<()> {
        self.set_state(key, &fmt_ts(value))
    }
}
