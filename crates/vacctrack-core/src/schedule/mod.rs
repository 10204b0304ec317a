//! Dose scheduling: date math and initial schedule generation.

mod dates;

pub use dates::*;

use chrono::{DateTime, Utc};

use crate::models::{Dose, Patient, Vaccine};

/// Generate the initial dose set for a patient: exactly one dose per
/// catalog entry, scheduled (and due) at the entry's age offset from the
/// patient's birth day.
///
/// Output order is catalog sequence ascending, ties broken by scheduled
/// date. An empty catalog yields an empty vec; that is a valid state, not
/// an error. Callers must only invoke this for patients with zero doses.
pub fn generate_doses(patient: &Patient, catalog: &[Vaccine], now: DateTime<Utc>) -> Vec<Dose> {
    let mut entries: Vec<(&Vaccine, DateTime<Utc>)> = catalog
        .iter()
        .map(|v| (v, scheduled_date(patient.dob, v.recommended_age_in_weeks)))
        .collect();
    entries.sort_by(|a, b| a.0.sequence.cmp(&b.0.sequence).then(a.1.cmp(&b.1)));

    entries
        .into_iter()
        .map(|(vaccine, scheduled)| {
            let mut dose = Dose::new(patient.id.clone(), scheduled);
            dose.vaccine_id = Some(vaccine.id.clone());
            dose.created_at = now;
            dose
        })
        .collect()
}
