//! Snapshot merge engine: reconciles decoded patient documents into the
//! store.
//!
//! Two grades of application share one body. `merge` is additive and
//! id-driven: matching records are overwritten field-for-field, unknown
//! records are created, and doses a known patient no longer carries are
//! pruned. `replace_all` wipes the store first and applies the snapshot as
//! the authoritative state. Either way the whole application runs inside a
//! single transaction, so a failed merge leaves the store untouched.

pub mod backfill;
pub mod dedup;

use std::collections::{HashMap, HashSet};

use tracing::info;
use uuid::Uuid;

use crate::db::{Database, DbError};
use crate::models::{Dose, Vaccine};
use crate::snapshot::{PatientDocument, VaccineRef};

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("database error: {0}")]
    Db(#[from] DbError),
}

pub type MergeResult<T> = Result<T, MergeError>;

/// What a merge changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub patients_created: usize,
    pub patients_updated: usize,
    pub doses_created: usize,
    pub doses_updated: usize,
    pub doses_pruned: usize,
}

impl MergeSummary {
    pub fn patients_total(&self) -> usize {
        self.patients_created + self.patients_updated
    }
}

/// Merge incoming documents into the store, additively.
pub fn merge(db: &mut Database, incoming: &[PatientDocument]) -> MergeResult<MergeSummary> {
    let tx = db.conn().unchecked_transaction().map_err(DbError::from)?;
    let summary = apply(db, incoming)?;
    tx.commit().map_err(DbError::from)?;
    info!(
        patients = summary.patients_total(),
        doses_created = summary.doses_created,
        doses_pruned = summary.doses_pruned,
        "merged snapshot"
    );
    Ok(summary)
}

/// Wipe the store and apply the snapshot as the authoritative state.
pub fn replace_all(db: &mut Database, incoming: &[PatientDocument]) -> MergeResult<MergeSummary> {
    let tx = db.conn().unchecked_transaction().map_err(DbError::from)?;
    db.delete_all_doses()?;
    db.delete_all_patients()?;
    db.delete_all_vaccines()?;
    let summary = apply(db, incoming)?;
    tx.commit().map_err(DbError::from)?;
    info!(
        patients = summary.patients_total(),
        doses = summary.doses_created,
        "replaced store from snapshot"
    );
    Ok(summary)
}

/// The merge body. Runs inside the caller's transaction; must not open its
/// own.
fn apply(db: &Database, incoming: &[PatientDocument]) -> MergeResult<MergeSummary> {
    let mut summary = MergeSummary::default();

    // Dose ids are unique across the store, so one bulk fetch covers every
    // incoming patient.
    let incoming_dose_ids: Vec<String> = incoming
        .iter()
        .flat_map(PatientDocument::dose_ids)
        .map(str::to_string)
        .collect();
    let existing_doses: HashMap<String, Dose> = db
        .get_doses_by_ids(&incoming_dose_ids)?
        .into_iter()
        .map(|d| (d.id.clone(), d))
        .collect();

    for doc in incoming {
        let local = db.get_patient(&doc.id)?;
        if local.is_some() {
            summary.patients_updated += 1;
        } else {
            summary.patients_created += 1;
        }

        let mut patient = doc.to_model();
        // A blank incoming first name marks a corrupt or placeholder
        // record; keep the local name, but every other field is still
        // overwritten from the document.
        if patient.first_name.trim().is_empty() {
            if let Some(local) = &local {
                patient.first_name = local.first_name.clone();
            }
        }
        db.upsert_patient(&patient)?;

        for dose_doc in &doc.doses {
            let vaccine_id = resolve_vaccine(db, dose_doc.vaccine.as_ref())?;
            if existing_doses.contains_key(&dose_doc.id) {
                summary.doses_updated += 1;
            } else {
                summary.doses_created += 1;
            }
            db.upsert_dose(&dose_doc.to_model(&doc.id, vaccine_id))?;
        }

        // The snapshot is authoritative for the patients it carries: local
        // doses it no longer lists are pruned. Patients absent from the
        // snapshot are never touched.
        if local.is_some() {
            let incoming_ids: HashSet<&str> = doc.dose_ids().collect();
            for dose in db.doses_for_patient(&doc.id)? {
                if !incoming_ids.contains(dose.id.as_str()) {
                    db.delete_dose(&dose.id)?;
                    summary.doses_pruned += 1;
                }
            }
        }
    }
    Ok(summary)
}

/// Resolve an embedded vaccine reference to a catalog id: by id first, then
/// case-insensitive name, else materialize a new entry from the reference.
fn resolve_vaccine(db: &Database, vaccine: Option<&VaccineRef>) -> MergeResult<Option<String>> {
    let Some(vref) = vaccine else {
        return Ok(None);
    };

    if let Some(id) = &vref.id {
        if db.get_vaccine(id)?.is_some() {
            return Ok(Some(id.clone()));
        }
    }
    if let Some(found) = db.find_vaccine_by_name(&vref.name)? {
        return Ok(Some(found.id));
    }

    let materialized = Vaccine {
        id: vref
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: vref.name.clone(),
        recommended_age_in_weeks: vref.recommended_age_in_weeks,
        sequence: vref.sequence,
        notes: vref.notes.clone(),
    };
    db.upsert_vaccine(&materialized)?;
    Ok(Some(materialized.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Patient;
    use crate::snapshot;
    use chrono::{DateTime, Utc};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn snapshot_of(db: &Database) -> Vec<PatientDocument> {
        snapshot::export_all(db).unwrap()
    }

    #[test]
    fn test_merge_creates_unknown_patients() {
        let mut source = Database::open_in_memory().unwrap();
        let patient = Patient::new("Maya".into(), at("2023-01-01T00:00:00Z"));
        source.upsert_patient(&patient).unwrap();
        let mut dose = Dose::new(patient.id.clone(), at("2023-02-12T00:00:00Z"));
        dose.given_on = Some(at("2023-02-13T10:00:00Z"));
        source.upsert_dose(&dose).unwrap();
        let docs = snapshot_of(&source);

        let mut target = Database::open_in_memory().unwrap();
        let summary = merge(&mut target, &docs).unwrap();

        assert_eq!(summary.patients_created, 1);
        assert_eq!(summary.doses_created, 1);
        assert_eq!(summary.doses_pruned, 0);
        let restored = target.get_dose(&dose.id).unwrap().unwrap();
        assert_eq!(restored.given_on, dose.given_on);
    }

    #[test]
    fn test_blank_first_name_keeps_local_name_but_overwrites_the_rest() {
        let mut db = Database::open_in_memory().unwrap();
        let mut patient = Patient::new("Maya".into(), at("2023-01-01T00:00:00Z"));
        patient.last_name = Some("Old".into());
        patient.contact_number = Some("555-0100".into());
        db.upsert_patient(&patient).unwrap();

        let mut docs = snapshot_of(&db);
        docs[0].first_name = "   ".into();
        docs[0].last_name = Some("New".into());
        docs[0].notes = Some("from snapshot".into());
        docs[0].contact_number = None;
        let summary = merge(&mut db, &docs).unwrap();

        assert_eq!(summary.patients_updated, 1);
        let local = db.get_patient(&patient.id).unwrap().unwrap();
        // Only the primary identity field survives a blank overwrite.
        assert_eq!(local.first_name, "Maya");
        assert_eq!(local.last_name.as_deref(), Some("New"));
        assert_eq!(local.notes.as_deref(), Some("from snapshot"));
        assert_eq!(local.contact_number, None);
    }

    #[test]
    fn test_replace_all_drops_patients_missing_from_snapshot() {
        let mut db = Database::open_in_memory().unwrap();
        let kept = Patient::new("Kept".into(), at("2023-01-01T00:00:00Z"));
        let dropped = Patient::new("Dropped".into(), at("2023-06-01T00:00:00Z"));
        db.upsert_patient(&kept).unwrap();
        db.upsert_patient(&dropped).unwrap();

        let docs = vec![snapshot::export_patient(&db, &kept.id).unwrap()];
        replace_all(&mut db, &docs).unwrap();

        assert!(db.get_patient(&kept.id).unwrap().is_some());
        assert!(db.get_patient(&dropped.id).unwrap().is_none());
    }

    #[test]
    fn test_resolve_vaccine_falls_back_to_name() {
        let db = Database::open_in_memory().unwrap();
        let existing = Vaccine::new("Hib-1".into(), 6, 6);
        db.upsert_vaccine(&existing).unwrap();

        // Reference with an unknown id but a known name must not duplicate
        // the catalog entry.
        let vref = VaccineRef {
            id: Some("not-a-real-id".into()),
            name: "hib-1".into(),
            recommended_age_in_weeks: 6,
            sequence: 99,
            notes: None,
        };
        let resolved = resolve_vaccine(&db, Some(&vref)).unwrap();
        assert_eq!(resolved, Some(existing.id));
        assert_eq!(db.count_vaccines().unwrap(), 1);
    }

    #[test]
    fn test_resolve_vaccine_materializes_unknown_entry() {
        let db = Database::open_in_memory().unwrap();
        let vref = VaccineRef {
            id: None,
            name: "Novel".into(),
            recommended_age_in_weeks: 12,
            sequence: 3,
            notes: Some("custom".into()),
        };
        let id = resolve_vaccine(&db, Some(&vref)).unwrap().unwrap();
        let created = db.get_vaccine(&id).unwrap().unwrap();
        assert_eq!(created.name, "Novel");
        assert_eq!(created.recommended_age_in_weeks, 12);
    }
}
