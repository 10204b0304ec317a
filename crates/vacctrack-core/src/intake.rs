//! Patient intake and dose editing workflows: normalization, validation,
//! and the initial schedule generation that runs when a patient is first
//! saved.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::db::{Database, DbError};
use crate::models::{Dose, Patient};
use crate::schedule::generate_doses;

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("{0}")]
    Validation(String),
    #[error("database error: {0}")]
    Db(#[from] DbError),
}

pub type IntakeResult<T> = Result<T, IntakeError>;

fn validation(msg: &str) -> IntakeError {
    IntakeError::Validation(msg.to_string())
}

/// Trim an optional free-text field; whitespace-only collapses to None.
fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Validate and save a patient, creating or updating by id.
///
/// Free-text fields are trimmed and blank ones dropped. Rejected: a blank
/// first name, a date of birth in the future, or another patient with the
/// same first/last name and birth day. On first save (the patient has no
/// doses yet) the full schedule is generated from the current catalog, all
/// in one transaction. Returns the normalized patient.
pub fn save_patient(
    db: &mut Database,
    mut patient: Patient,
    now: DateTime<Utc>,
) -> IntakeResult<Patient> {
    patient.first_name = patient.first_name.trim().to_string();
    patient.last_name = normalize(patient.last_name);
    patient.mother_name = normalize(patient.mother_name);
    patient.father_name = normalize(patient.father_name);
    patient.gender = normalize(patient.gender);
    patient.time_of_birth = normalize(patient.time_of_birth);
    patient.mode_of_delivery = normalize(patient.mode_of_delivery);
    patient.contact_number = normalize(patient.contact_number);
    patient.notes = normalize(patient.notes);

    if patient.first_name.is_empty() {
        return Err(validation("first name is required"));
    }
    if patient.dob > now {
        return Err(validation("date of birth cannot be in the future"));
    }
    let duplicates = db.count_identity_matches(
        &patient.first_name,
        patient.last_name.as_deref(),
        patient.dob,
        Some(&patient.id),
    )?;
    if duplicates > 0 {
        return Err(validation(
            "a patient with this name and date of birth already exists",
        ));
    }

    let tx = db.conn().unchecked_transaction().map_err(DbError::from)?;
    db.upsert_patient(&patient)?;
    if db.doses_for_patient(&patient.id)?.is_empty() {
        let catalog = db.list_vaccines()?;
        let doses = generate_doses(&patient, &catalog, now);
        for dose in &doses {
            db.upsert_dose(dose)?;
        }
        info!(
            patient = %patient.id,
            doses = doses.len(),
            "generated initial schedule"
        );
    }
    tx.commit().map_err(DbError::from)?;
    Ok(patient)
}

/// Validate and save an edited dose. Free-text fields are normalized; an
/// administration date before the patient's birth day is rejected. Returns
/// the normalized dose.
pub fn update_dose(
    db: &Database,
    mut dose: Dose,
    patient_dob: DateTime<Utc>,
) -> IntakeResult<Dose> {
    dose.batch_number = normalize(dose.batch_number);
    dose.facility = normalize(dose.facility);
    dose.administered_by = normalize(dose.administered_by);
    dose.notes = normalize(dose.notes);
    dose.vaccine_brand = normalize(dose.vaccine_brand);

    if let Some(given) = dose.given_on {
        if given.date_naive() < patient_dob.date_naive() {
            return Err(validation(
                "administration date cannot be before the date of birth",
            ));
        }
    }

    db.upsert_dose(&dose)?;
    Ok(dose)
}

/// Mark a dose as administered right now.
pub fn mark_given_now(db: &Database, dose_id: &str, now: DateTime<Utc>) -> IntakeResult<Dose> {
    let mut dose = db
        .get_dose(dose_id)?
        .ok_or_else(|| DbError::NotFound(format!("dose {dose_id}")))?;
    dose.given_on = Some(now);
    db.upsert_dose(&dose)?;
    Ok(dose)
}

/// Add an ad-hoc dose outside the generated schedule.
pub fn add_dose(
    db: &Database,
    patient_id: &str,
    vaccine_id: Option<String>,
    scheduled_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> IntakeResult<Dose> {
    if db.get_patient(patient_id)?.is_none() {
        return Err(DbError::NotFound(format!("patient {patient_id}")).into());
    }
    if let Some(vid) = &vaccine_id {
        if db.get_vaccine(vid)?.is_none() {
            return Err(DbError::NotFound(format!("vaccine {vid}")).into());
        }
    }

    let mut dose = Dose::new(patient_id.to_string(), scheduled_date);
    dose.vaccine_id = vaccine_id;
    dose.created_at = now;
    db.upsert_dose(&dose)?;
    Ok(dose)
}

/// Remove a dose. Returns whether anything was deleted.
pub fn remove_dose(db: &Database, dose_id: &str) -> IntakeResult<bool> {
    Ok(db.delete_dose(dose_id)?)
}
