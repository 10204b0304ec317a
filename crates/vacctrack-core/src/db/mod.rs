//! Database layer for vacctrack.

mod doses;
mod patients;
mod schema;
pub mod seed;
mod state;
mod vaccines;

pub use schema::*;
#[allow(unused_imports)]
pub use state::*;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
///
/// Always passed explicitly; there is no ambient global store.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Parse an RFC 3339 timestamp column.
pub(crate) fn parse_ts(s: &str) -> DbResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

/// Parse an optional RFC 3339 timestamp column.
pub(crate) fn parse_ts_opt(s: Option<&str>) -> DbResult<Option<DateTime<Utc>>> {
    s.map(parse_ts).transpose()
}

/// Encode a timestamp for storage. RFC 3339 with a fixed UTC offset keeps
/// lexicographic ordering aligned with chronological ordering.
pub(crate) fn fmt_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

/// Encode an optional timestamp for storage.
pub(crate) fn fmt_ts_opt(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(fmt_ts)
}
