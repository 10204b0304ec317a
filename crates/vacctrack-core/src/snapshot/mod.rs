//! JSON snapshot codec: the single interchange format for share exports,
//! imports, and device backups.
//!
//! Encoding is deterministic: object keys are sorted and the output is
//! pretty-printed, so encoding the same state twice yields byte-identical
//! text. Decoding accepts either an array of patient documents or a single
//! bare document (single-patient share files).

mod dto;

pub use dto::{DoseDocument, PatientDocument, VaccineRef};

use std::collections::HashMap;

use crate::db::{Database, DbError};
use crate::models::Vaccine;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("malformed snapshot document: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Db(#[from] DbError),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Encode patient documents as deterministic pretty JSON.
pub fn encode(patients: &[PatientDocument]) -> SnapshotResult<String> {
    // Round-tripping through Value sorts object keys (its map is ordered).
    let value = serde_json::to_value(patients)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Encode a single patient as a bare document, not a one-element array.
pub fn encode_one(patient: &PatientDocument) -> SnapshotResult<String> {
    let value = serde_json::to_value(patient)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Decode snapshot text. Tries an array first, then falls back to a single
/// bare document; the error reported is the one from the fallback attempt.
pub fn decode(text: &str) -> SnapshotResult<Vec<PatientDocument>> {
    if let Ok(patients) = serde_json::from_str::<Vec<PatientDocument>>(text) {
        return Ok(patients);
    }
    let single = serde_json::from_str::<PatientDocument>(text)?;
    Ok(vec![single])
}

/// Assemble documents for every patient in the store, in stable creation
/// order, each with its doses sorted by scheduled date.
pub fn export_all(db: &Database) -> SnapshotResult<Vec<PatientDocument>> {
    let mut vaccines: HashMap<String, Option<Vaccine>> = HashMap::new();
    db.list_patients()?
        .iter()
        .map(|p| export_one(db, &p.id, &mut vaccines))
        .collect()
}

/// Assemble the document for one patient.
pub fn export_patient(db: &Database, patient_id: &str) -> SnapshotResult<PatientDocument> {
    let mut vaccines = HashMap::new();
    export_one(db, patient_id, &mut vaccines)
}

fn export_one(
    db: &Database,
    patient_id: &str,
    vaccines: &mut HashMap<String, Option<Vaccine>>,
) -> SnapshotResult<PatientDocument> {
    let patient = db
        .get_patient(patient_id)?
        .ok_or_else(|| DbError::NotFound(format!("patient {patient_id}")))?;

    let mut docs = Vec::new();
    for dose in db.doses_for_patient(patient_id)? {
        let vaccine = match &dose.vaccine_id {
            Some(id) => {
                if !vaccines.contains_key(id) {
                    vaccines.insert(id.clone(), db.get_vaccine(id)?);
                }
                vaccines.get(id).and_then(Option::as_ref)
            }
            None => None,
        };
        docs.push(DoseDocument::from_model(&dose, vaccine));
    }
    Ok(PatientDocument::from_model(&patient, docs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dose, Patient};
    use chrono::{DateTime, Utc};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        let vaccine = Vaccine::new("Hib-1".into(), 6, 6);
        db.upsert_vaccine(&vaccine).unwrap();

        let patient = Patient::new("Maya".into(), at("2023-01-01T00:00:00Z"));
        db.upsert_patient(&patient).unwrap();

        let mut dose = Dose::new(patient.id.clone(), at("2023-02-12T00:00:00Z"));
        dose.vaccine_id = Some(vaccine.id);
        db.upsert_dose(&dose).unwrap();
        db
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let db = seeded_db();
        let docs = export_all(&db).unwrap();
        let first = encode(&docs).unwrap();
        let second = encode(&export_all(&db).unwrap()).unwrap();
        assert_eq!(first, second);

        // Keys come out sorted regardless of struct field order.
        let created = first.find("\"createdAt\"").unwrap();
        let dob = first.find("\"dob\"").unwrap();
        assert!(created < dob);
    }

    #[test]
    fn test_decode_accepts_array_and_single_document() {
        let db = seeded_db();
        let docs = export_all(&db).unwrap();

        let from_array = decode(&encode(&docs).unwrap()).unwrap();
        assert_eq!(from_array, docs);

        let from_single = decode(&encode_one(&docs[0]).unwrap()).unwrap();
        assert_eq!(from_single, docs);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode("{\"not\": \"a snapshot\"}").is_err());
        assert!(decode("nonsense").is_err());
    }

    #[test]
    fn test_export_embeds_vaccine_ref() {
        let db = seeded_db();
        let docs = export_all(&db).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].doses.len(), 1);

        let vaccine = docs[0].doses[0].vaccine.as_ref().unwrap();
        assert_eq!(vaccine.name, "Hib-1");
        assert_eq!(vaccine.recommended_age_in_weeks, 6);
    }

    #[test]
    fn test_export_missing_patient_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            export_patient(&db, "nope"),
            Err(SnapshotError::Db(DbError::NotFound(_)))
        ));
    }
}
