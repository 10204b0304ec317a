//! Snapshot interchange documents.
//!
//! Field names are the file format (camelCase, self-describing), dates are
//! RFC 3339 absolute instants, the photo is base64. Optional fields are
//! omitted when absent. Conversion to models is the single legacy-decode
//! point: documents written before the measurement fields existed default
//! them to 0 here, once, so everything downstream works on fully-typed
//! records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Dose, Patient, Vaccine};

/// One patient with its full dose graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatientDocument {
    pub id: String,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mother_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub father_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    pub dob: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_of_delivery: Option<String>,
    #[serde(default)]
    pub birth_weight_grams: i32,
    #[serde(default)]
    pub length_cm: i32,
    #[serde(default)]
    pub head_circumference_cm: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub doses: Vec<DoseDocument>,
}

/// One dose under a patient document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DoseDocument {
    pub id: String,
    pub scheduled_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administered_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vaccine: Option<VaccineRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_at_dose: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_at_dose: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_circumference_at_dose: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vaccine_brand: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "photo_base64"
    )]
    pub photo_data: Option<Vec<u8>>,
}

/// Embedded vaccine reference. The id may be absent in documents produced
/// by older exports; the merge engine then falls back to name lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VaccineRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub recommended_age_in_weeks: u32,
    pub sequence: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PatientDocument {
    /// Build a document from a patient and its already-assembled doses.
    pub fn from_model(patient: &Patient, doses: Vec<DoseDocument>) -> Self {
        Self {
            id: patient.id.clone(),
            first_name: patient.first_name.clone(),
            last_name: patient.last_name.clone(),
            mother_name: patient.mother_name.clone(),
            father_name: patient.father_name.clone(),
            gender: patient.gender.clone(),
            dob: patient.dob,
            time_of_birth: patient.time_of_birth.clone(),
            mode_of_delivery: patient.mode_of_delivery.clone(),
            birth_weight_grams: patient.birth_weight_grams,
            length_cm: patient.length_cm,
            head_circumference_cm: patient.head_circumference_cm,
            contact_number: patient.contact_number.clone(),
            notes: patient.notes.clone(),
            created_at: patient.created_at,
            doses,
        }
    }

    /// Materialize a patient record. The id comes from the document, never
    /// regenerated.
    pub fn to_model(&self) -> Patient {
        Patient {
            id: self.id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            mother_name: self.mother_name.clone(),
            father_name: self.father_name.clone(),
            gender: self.gender.clone(),
            dob: self.dob,
            time_of_birth: self.time_of_birth.clone(),
            mode_of_delivery: self.mode_of_delivery.clone(),
            birth_weight_grams: self.birth_weight_grams,
            length_cm: self.length_cm,
            head_circumference_cm: self.head_circumference_cm,
            contact_number: self.contact_number.clone(),
            notes: self.notes.clone(),
            created_at: self.created_at,
        }
    }

    /// Ids of every dose this document carries.
    pub fn dose_ids(&self) -> impl Iterator<Item = &str> {
        self.doses.iter().map(|d| d.id.as_str())
    }
}

impl DoseDocument {
    /// Build a document from a dose and its resolved vaccine, if any.
    pub fn from_model(dose: &Dose, vaccine: Option<&Vaccine>) -> Self {
        Self {
            id: dose.id.clone(),
            scheduled_date: dose.scheduled_date,
            due_date: dose.due_date,
            given_on: dose.given_on,
            batch_number: dose.batch_number.clone(),
            facility: dose.facility.clone(),
            administered_by: dose.administered_by.clone(),
            notes: dose.notes.clone(),
            created_at: dose.created_at,
            vaccine: vaccine.map(|v| VaccineRef {
                id: Some(v.id.clone()),
                name: v.name.clone(),
                recommended_age_in_weeks: v.recommended_age_in_weeks,
                sequence: v.sequence,
                notes: v.notes.clone(),
            }),
            weight_at_dose: Some(dose.weight_at_dose),
            height_at_dose: Some(dose.height_at_dose),
            head_circumference_at_dose: Some(dose.head_circumference_at_dose),
            vaccine_brand: dose.vaccine_brand.clone(),
            photo_data: dose.photo_data.clone(),
        }
    }

    /// Materialize a dose linked to the given patient and vaccine. Missing
    /// measurements become literal 0 ("not recorded").
    pub fn to_model(&self, patient_id: &str, vaccine_id: Option<String>) -> Dose {
        Dose {
            id: self.id.clone(),
            patient_id: patient_id.to_string(),
            vaccine_id,
            scheduled_date: self.scheduled_date,
            due_date: self.due_date,
            given_on: self.given_on,
            batch_number: self.batch_number.clone(),
            facility: self.facility.clone(),
            administered_by: self.administered_by.clone(),
            notes: self.notes.clone(),
            weight_at_dose: self.weight_at_dose.unwrap_or(0.0),
            height_at_dose: self.height_at_dose.unwrap_or(0.0),
            head_circumference_at_dose: self.head_circumference_at_dose.unwrap_or(0.0),
            vaccine_brand: self.vaccine_brand.clone(),
            photo_data: self.photo_data.clone(),
            created_at: self.created_at,
        }
    }
}

mod photo_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_str(&STANDARD.encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?;
        text.map(|t| STANDARD.decode(t).map_err(serde::de::Error::custom))
            .transpose()
    }
}
