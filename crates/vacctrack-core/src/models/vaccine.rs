//! Vaccine catalog model.

use serde::{Deserialize, Serialize};

/// A catalog entry from which doses are generated; not patient-specific.
///
/// Names are not unique: age-variants of the same vaccine (e.g. "Influenza"
/// at 2 and 3 years) are distinct rows distinguished by their age offset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vaccine {
    /// Stable UUID
    pub id: String,
    /// Display name, non-unique across age-variants
    pub name: String,
    /// Recommended age offset from birth, in weeks
    pub recommended_age_in_weeks: u32,
    /// Stable ordering for display and dose generation
    pub sequence: i32,
    /// Free text, commonly an age-band label
    pub notes: Option<String>,
}

impl Vaccine {
    /// Create a new catalog entry.
    pub fn new(name: String, recommended_age_in_weeks: u32, sequence: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            recommended_age_in_weeks,
            sequence,
            notes: None,
        }
    }

    /// Canonical grouping key for the catalog dedup pass.
    pub fn dedup_key(&self) -> (String, u32) {
        (
            self.name.trim().to_lowercase(),
            self.recommended_age_in_weeks,
        )
    }
}
