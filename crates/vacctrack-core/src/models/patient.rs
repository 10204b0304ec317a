//! Patient model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked patient. Owns its doses (deleting a patient cascades to them).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Stable UUID, generated locally
    pub id: String,
    /// Primary identity field, never blank
    pub first_name: String,
    pub last_name: Option<String>,
    pub mother_name: Option<String>,
    pub father_name: Option<String>,
    pub gender: Option<String>,
    /// Date of birth; schedule arithmetic uses its civil calendar day
    pub dob: DateTime<Utc>,
    pub time_of_birth: Option<String>,
    pub mode_of_delivery: Option<String>,
    /// Birth weight in grams, 0 when not recorded
    pub birth_weight_grams: i32,
    /// Birth length in cm, 0 when not recorded
    pub length_cm: i32,
    /// Head circumference in cm, 0 when not recorded
    pub head_circumference_cm: f32,
    pub contact_number: Option<String>,
    pub notes: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Patient {
    /// Create a new patient with required fields.
    pub fn new(first_name: String, dob: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            first_name,
            last_name: None,
            mother_name: None,
            father_name: None,
            gender: None,
            dob,
            time_of_birth: None,
            mode_of_delivery: None,
            birth_weight_grams: 0,
            length_cm: 0,
            head_circumference_cm: 0.0,
            contact_number: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    /// First and last name joined, skipping a missing last name.
    pub fn display_name(&self) -> String {
        let last = self.last_name.as_deref().unwrap_or("").trim();
        if last.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, last)
        }
    }
}
