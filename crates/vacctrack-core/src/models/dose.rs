//! Dose model and derived status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scheduled-or-administered vaccination event for a patient.
///
/// `given_on` being set is the sole signal that the dose was administered.
/// The vaccine link is nullable: deleting a catalog entry leaves the dose
/// behind with no vaccine reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dose {
    /// Stable UUID, unique across the whole store (not per patient)
    pub id: String,
    /// Owning patient
    pub patient_id: String,
    /// Referenced catalog entry, if any
    pub vaccine_id: Option<String>,
    /// Derived from patient DOB + vaccine age offset
    pub scheduled_date: DateTime<Utc>,
    /// Mirrors the scheduled date in practice
    pub due_date: Option<DateTime<Utc>>,
    /// Administration timestamp; None until the dose is given
    pub given_on: Option<DateTime<Utc>>,
    pub batch_number: Option<String>,
    pub facility: Option<String>,
    pub administered_by: Option<String>,
    pub notes: Option<String>,
    /// Weight in kg at administration, 0 when not recorded
    pub weight_at_dose: f32,
    /// Height in cm at administration, 0 when not recorded
    pub height_at_dose: f32,
    /// Head circumference in cm at administration, 0 when not recorded
    pub head_circumference_at_dose: f32,
    pub vaccine_brand: Option<String>,
    /// Photo attachment
    pub photo_data: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl Dose {
    /// Create a dose for a patient, scheduled on the given date.
    pub fn new(patient_id: String, scheduled_date: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            vaccine_id: None,
            scheduled_date,
            due_date: Some(scheduled_date),
            given_on: None,
            batch_number: None,
            facility: None,
            administered_by: None,
            notes: None,
            weight_at_dose: 0.0,
            height_at_dose: 0.0,
            head_circumference_at_dose: 0.0,
            vaccine_brand: None,
            photo_data: None,
            created_at: Utc::now(),
        }
    }

    /// Status relative to `now`. See [`dose_status`].
    pub fn status(&self, now: DateTime<Utc>) -> DoseStatus {
        dose_status(self.scheduled_date, self.given_on, now)
    }

    /// Weight at dose for display; 0 means "not recorded".
    pub fn recorded_weight(&self) -> Option<f32> {
        (self.weight_at_dose != 0.0).then_some(self.weight_at_dose)
    }

    /// Height at dose for display; 0 means "not recorded".
    pub fn recorded_height(&self) -> Option<f32> {
        (self.height_at_dose != 0.0).then_some(self.height_at_dose)
    }

    /// Head circumference at dose for display; 0 means "not recorded".
    pub fn recorded_head_circumference(&self) -> Option<f32> {
        (self.head_circumference_at_dose != 0.0).then_some(self.head_circumference_at_dose)
    }
}

/// Derived dose state, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoseStatus {
    /// Scheduled today, not yet given
    NotGiven,
    /// Due in this many calendar days
    Upcoming(i64),
    /// Administered on this date
    Given(DateTime<Utc>),
    /// Overdue by this many calendar days
    Overdue(i64),
}

/// Compute a dose's status as a pure function of its two dates and `now`.
///
/// Comparisons run on civil calendar days, so a dose scheduled later today
/// is `NotGiven`, never `Upcoming(0)`.
pub fn dose_status(
    scheduled: DateTime<Utc>,
    given_on: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DoseStatus {
    if let Some(given) = given_on {
        return DoseStatus::Given(given);
    }
    let days = scheduled
        .date_naive()
        .signed_duration_since(now.date_naive())
        .num_days();
    if days > 0 {
        DoseStatus::Upcoming(days)
    } else if days < 0 {
        DoseStatus::Overdue(-days)
    } else {
        DoseStatus::NotGiven
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_given_wins_over_dates() {
        let given = at("2024-01-05T09:30:00Z");
        let status = dose_status(at("2030-01-01T00:00:00Z"), Some(given), at("2024-02-01T00:00:00Z"));
        assert_eq!(status, DoseStatus::Given(given));
    }

    #[test]
    fn test_upcoming_counts_calendar_days() {
        let status = dose_status(
            at("2024-03-11T00:00:00Z"),
            None,
            at("2024-03-01T18:00:00Z"),
        );
        assert_eq!(status, DoseStatus::Upcoming(10));
    }

    #[test]
    fn test_overdue_counts_calendar_days() {
        let status = dose_status(
            at("2024-03-01T00:00:00Z"),
            None,
            at("2024-03-08T06:00:00Z"),
        );
        assert_eq!(status, DoseStatus::Overdue(7));
    }

    #[test]
    fn test_same_day_is_not_given_regardless_of_time() {
        // Scheduled later the same day must not read as upcoming.
        let status = dose_status(
            at("2024-03-01T23:00:00Z"),
            None,
            at("2024-03-01T01:00:00Z"),
        );
        assert_eq!(status, DoseStatus::NotGiven);
    }

    #[test]
    fn test_recorded_measurements_treat_zero_as_absent() {
        let mut dose = Dose::new("p1".into(), Utc::now());
        assert_eq!(dose.recorded_weight(), None);
        dose.weight_at_dose = 4.2;
        assert_eq!(dose.recorded_weight(), Some(4.2));
    }
}
