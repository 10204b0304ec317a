//! Dedup sweeps: repair duplicates left behind by historical merge bugs.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::info;

use super::MergeResult;
use crate::db::{Database, DbError, CATALOG_DEDUP_DONE};
use crate::models::{Dose, Vaccine};

/// Collapse catalog entries that share a name (case-insensitive, trimmed)
/// and age offset. The lowest-sequence entry survives; doses pointing at the
/// duplicates are re-pointed to it before the duplicates are deleted.
/// Returns the number of entries removed.
pub fn dedup_catalog(db: &mut Database) -> MergeResult<usize> {
    let tx = db.conn().unchecked_transaction().map_err(DbError::from)?;

    let mut groups: HashMap<(String, u32), Vec<Vaccine>> = HashMap::new();
    for vaccine in db.list_vaccines()? {
        groups.entry(vaccine.dedup_key()).or_default().push(vaccine);
    }

    let mut removed = 0;
    for group in groups.into_values() {
        if group.len() < 2 {
            continue;
        }
        // list_vaccines orders by sequence, so the first entry is canonical.
        let keeper = &group[0];
        for duplicate in &group[1..] {
            db.repoint_doses(&duplicate.id, &keeper.id)?;
            db.delete_vaccine(&duplicate.id)?;
            removed += 1;
        }
    }

    tx.commit().map_err(DbError::from)?;
    if removed > 0 {
        info!(removed, "collapsed duplicate catalog entries");
    }
    Ok(removed)
}

/// One-time catalog sweep, gated by an app-state flag so startup only pays
/// for it once.
pub fn dedup_catalog_once(db: &mut Database) -> MergeResult<usize> {
    if db.state_flag(CATALOG_DEDUP_DONE)? {
        return Ok(0);
    }
    let removed = dedup_catalog(db)?;
    db.set_state_flag(CATALOG_DEDUP_DONE, true)?;
    Ok(removed)
}

/// Collapse doses that duplicate one another: same patient, same catalog
/// entry, same scheduled calendar day. A dose with `given_on` set wins over
/// one without; among equals the most recently created survives. Returns
/// the number of doses removed.
pub fn dedup_doses(db: &mut Database) -> MergeResult<usize> {
    let tx = db.conn().unchecked_transaction().map_err(DbError::from)?;

    let mut groups: HashMap<(String, Option<String>, NaiveDate), Vec<Dose>> = HashMap::new();
    for dose in db.list_doses()? {
        let key = (
            dose.patient_id.clone(),
            dose.vaccine_id.clone(),
            dose.scheduled_date.date_naive(),
        );
        groups.entry(key).or_default().push(dose);
    }

    let mut removed = 0;
    for group in groups.into_values() {
        if group.len() < 2 {
            continue;
        }
        // list_doses orders by created_at, so scanning from the back finds
        // the newest given dose, else the newest dose overall.
        let keeper_id = group
            .iter()
            .rev()
            .find(|d| d.given_on.is_some())
            .map_or_else(|| group[group.len() - 1].id.clone(), |d| d.id.clone());
        for dose in &group {
            if dose.id != keeper_id {
                db.delete_dose(&dose.id)?;
                removed += 1;
            }
        }
    }

    tx.commit().map_err(DbError::from)?;
    if removed > 0 {
        info!(removed, "removed duplicate doses");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Patient;
    use chrono::{DateTime, Utc};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_catalog_dedup_repoints_doses() {
        let mut db = Database::open_in_memory().unwrap();
        let keep = Vaccine::new("Hib-1".into(), 6, 6);
        let dup = Vaccine::new("  hib-1 ".into(), 6, 40);
        db.upsert_vaccine(&keep).unwrap();
        db.upsert_vaccine(&dup).unwrap();

        let patient = Patient::new("Maya".into(), at("2023-01-01T00:00:00Z"));
        db.upsert_patient(&patient).unwrap();
        let mut dose = Dose::new(patient.id.clone(), at("2023-02-12T00:00:00Z"));
        dose.vaccine_id = Some(dup.id.clone());
        db.upsert_dose(&dose).unwrap();

        let removed = dedup_catalog(&mut db).unwrap();
        assert_eq!(removed, 1);
        assert!(db.get_vaccine(&dup.id).unwrap().is_none());
        assert_eq!(
            db.get_dose(&dose.id).unwrap().unwrap().vaccine_id,
            Some(keep.id)
        );
    }

    #[test]
    fn test_catalog_dedup_keeps_distinct_age_offsets() {
        let mut db = Database::open_in_memory().unwrap();
        db.upsert_vaccine(&Vaccine::new("Influenza".into(), 103, 40))
            .unwrap();
        db.upsert_vaccine(&Vaccine::new("Influenza".into(), 155, 41))
            .unwrap();

        assert_eq!(dedup_catalog(&mut db).unwrap(), 0);
        assert_eq!(db.count_vaccines().unwrap(), 2);
    }

    #[test]
    fn test_catalog_dedup_once_is_gated() {
        let mut db = Database::open_in_memory().unwrap();
        db.upsert_vaccine(&Vaccine::new("Hib-1".into(), 6, 6)).unwrap();
        db.upsert_vaccine(&Vaccine::new("hib-1".into(), 6, 7)).unwrap();

        assert_eq!(dedup_catalog_once(&mut db).unwrap(), 1);

        // Flag is set; a fresh duplicate is no longer swept by the gated
        // entry point.
        db.upsert_vaccine(&Vaccine::new("HIB-1".into(), 6, 8)).unwrap();
        assert_eq!(dedup_catalog_once(&mut db).unwrap(), 0);
        assert_eq!(db.count_vaccines().unwrap(), 2);
    }

    #[test]
    fn test_dose_dedup_prefers_given() {
        let mut db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Maya".into(), at("2023-01-01T00:00:00Z"));
        db.upsert_patient(&patient).unwrap();
        let vaccine = Vaccine::new("BCG".into(), 0, 0);
        db.upsert_vaccine(&vaccine).unwrap();

        let mut given = Dose::new(patient.id.clone(), at("2023-01-01T00:00:00Z"));
        given.vaccine_id = Some(vaccine.id.clone());
        given.given_on = Some(at("2023-01-02T09:00:00Z"));
        given.created_at = at("2023-01-01T00:00:00Z");
        // Duplicate scheduled later in the same day, never given, created
        // after the given one.
        let mut dup = Dose::new(patient.id.clone(), at("2023-01-01T08:00:00Z"));
        dup.vaccine_id = Some(vaccine.id.clone());
        dup.created_at = at("2023-06-01T00:00:00Z");
        db.upsert_dose(&given).unwrap();
        db.upsert_dose(&dup).unwrap();

        assert_eq!(dedup_doses(&mut db).unwrap(), 1);
        assert!(db.get_dose(&given.id).unwrap().is_some());
        assert!(db.get_dose(&dup.id).unwrap().is_none());
    }

    #[test]
    fn test_dose_dedup_keeps_newest_when_none_given() {
        let mut db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Maya".into(), at("2023-01-01T00:00:00Z"));
        db.upsert_patient(&patient).unwrap();

        let mut old = Dose::new(patient.id.clone(), at("2023-02-12T00:00:00Z"));
        old.created_at = at("2023-01-01T00:00:00Z");
        let mut new = Dose::new(patient.id.clone(), at("2023-02-12T00:00:00Z"));
        new.created_at = at("2023-03-01T00:00:00Z");
        db.upsert_dose(&old).unwrap();
        db.upsert_dose(&new).unwrap();

        assert_eq!(dedup_doses(&mut db).unwrap(), 1);
        assert!(db.get_dose(&old.id).unwrap().is_none());
        assert!(db.get_dose(&new.id).unwrap().is_some());
    }

    #[test]
    fn test_dose_dedup_ignores_distinct_days() {
        let mut db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Maya".into(), at("2023-01-01T00:00:00Z"));
        db.upsert_patient(&patient).unwrap();

        db.upsert_dose(&Dose::new(patient.id.clone(), at("2023-02-12T00:00:00Z")))
            .unwrap();
        db.upsert_dose(&Dose::new(patient.id.clone(), at("2023-02-13T00:00:00Z")))
            .unwrap();

        assert_eq!(dedup_doses(&mut db).unwrap(), 0);
        assert_eq!(db.count_doses().unwrap(), 2);
    }
}
