//! Device backup: one snapshot file at a fixed name under the app data
//! directory, always overwritten. Restore is authoritative (replace, not
//! merge) and anchors the backfill quiet window.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::db::{Database, DbError, LAST_BACKUP_AT, LAST_RESTORE_AT};
use crate::merge::{self, MergeError};
use crate::snapshot::{self, SnapshotError};

pub const BACKUP_FILE_NAME: &str = "vacctrack_backup.json";

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("no backup found")]
    NoBackup,
    #[error("backup file error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("database error: {0}")]
    Db(#[from] DbError),
}

pub type BackupResult<T> = Result<T, BackupError>;

/// Backup file location under the app data directory.
pub fn backup_path(dir: &Path) -> PathBuf {
    dir.join(BACKUP_FILE_NAME)
}

pub fn has_backup(dir: &Path) -> bool {
    backup_path(dir).exists()
}

/// When the last backup was written, if ever.
pub fn last_backup_at(db: &Database) -> BackupResult<Option<DateTime<Utc>>> {
    Ok(db.state_instant(LAST_BACKUP_AT)?)
}

/// When the store was last restored from a backup, if ever.
pub fn last_restore_at(db: &Database) -> BackupResult<Option<DateTime<Utc>>> {
    Ok(db.state_instant(LAST_RESTORE_AT)?)
}

/// Write the whole store as a snapshot file, overwriting any previous
/// backup, and record the backup instant.
pub fn create_backup(db: &Database, dir: &Path, now: DateTime<Utc>) -> BackupResult<()> {
    fs::create_dir_all(dir)?;
    let documents = snapshot::export_all(db)?;
    let text = snapshot::encode(&documents)?;
    fs::write(backup_path(dir), text)?;
    db.set_state_instant(LAST_BACKUP_AT, now)?;
    info!(patients = documents.len(), "wrote backup");
    Ok(())
}

/// Replace the store with the backup file's contents.
///
/// Returns the instant the backup was written (falling back to `now` when
/// the state row is gone, e.g. a backup file carried over from another
/// install). Records `now` as the restore instant; app state itself is not
/// part of the snapshot and survives the restore.
pub fn restore_backup(
    db: &mut Database,
    dir: &Path,
    now: DateTime<Utc>,
) -> BackupResult<DateTime<Utc>> {
    let path = backup_path(dir);
    if !path.exists() {
        return Err(BackupError::NoBackup);
    }

    let backup_at = db.state_instant(LAST_BACKUP_AT)?.unwrap_or(now);
    let text = fs::read_to_string(path)?;
    let documents = snapshot::decode(&text)?;
    let summary = merge::replace_all(db, &documents)?;
    db.set_state_instant(LAST_RESTORE_AT, now)?;
    info!(
        patients = summary.patients_total(),
        doses = summary.doses_created,
        "restored backup"
    );
    Ok(backup_at)
}

/// Restore only when a backup file exists; absence is not an error here.
pub fn restore_if_available(
    db: &mut Database,
    dir: &Path,
    now: DateTime<Utc>,
) -> BackupResult<Option<DateTime<Utc>>> {
    if !has_backup(dir) {
        return Ok(None);
    }
    restore_backup(db, dir, now).map(Some)
}

/// Remove the backup file. Deleting a backup that does not exist is a no-op.
pub fn delete_backup(dir: &Path) -> BackupResult<()> {
    let path = backup_path(dir);
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}
