//! Schedule backfill: patients created before the current catalog existed
//! get the doses they are missing, once.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use super::MergeResult;
use crate::db::seed::default_catalog;
use crate::db::{backfill_flag_key, Database, DbError, LAST_RESTORE_AT};
use crate::models::{Dose, Vaccine};
use crate::schedule::scheduled_date;

/// How long after a restore backfill stays quiet, so a freshly restored
/// snapshot is not immediately padded with doses its author deleted.
const RESTORE_QUIET_SECONDS: i64 = 600;

/// Add any catalog doses the patient is missing, keyed by catalog entry and
/// scheduled calendar day. Runs at most once per patient (app-state flag)
/// and not at all inside the post-restore quiet window; the quiet window
/// does not consume the flag, so the backfill still happens later. Returns
/// the number of doses added.
pub fn backfill_missing_doses(
    db: &mut Database,
    patient_id: &str,
    now: DateTime<Utc>,
) -> MergeResult<usize> {
    let flag = backfill_flag_key(patient_id);
    if db.state_flag(&flag)? {
        return Ok(0);
    }
    if let Some(restored_at) = db.state_instant(LAST_RESTORE_AT)? {
        let elapsed = now.signed_duration_since(restored_at).num_seconds();
        if (0..RESTORE_QUIET_SECONDS).contains(&elapsed) {
            return Ok(0);
        }
    }

    let patient = db
        .get_patient(patient_id)?
        .ok_or_else(|| DbError::NotFound(format!("patient {patient_id}")))?;

    let tx = db.conn().unchecked_transaction().map_err(DbError::from)?;

    let mut existing: HashSet<(String, NaiveDate)> = db
        .doses_for_patient(patient_id)?
        .into_iter()
        .filter_map(|d| {
            d.vaccine_id
                .map(|vid| (vid, d.scheduled_date.date_naive()))
        })
        .collect();

    let mut added = 0;
    for entry in default_catalog() {
        let vaccine = match db
            .find_vaccine_by_name_and_weeks(entry.name, entry.recommended_age_in_weeks)?
        {
            Some(v) => v,
            None => {
                let mut v = Vaccine::new(
                    entry.name.to_string(),
                    entry.recommended_age_in_weeks,
                    db.next_vaccine_sequence()?,
                );
                v.notes = entry.notes.map(str::to_string);
                db.upsert_vaccine(&v)?;
                v
            }
        };

        let scheduled = scheduled_date(patient.dob, entry.recommended_age_in_weeks);
        let key = (vaccine.id.clone(), scheduled.date_naive());
        if existing.contains(&key) {
            continue;
        }

        let mut dose = Dose::new(patient.id.clone(), scheduled);
        dose.vaccine_id = Some(vaccine.id);
        dose.created_at = now;
        db.upsert_dose(&dose)?;
        existing.insert(key);
        added += 1;
    }

    tx.commit().map_err(DbError::from)?;
    db.set_state_flag(&flag, true)?;
    if added > 0 {
        info!(patient = patient_id, added, "backfilled missing doses");
    }
    Ok(added)
}
