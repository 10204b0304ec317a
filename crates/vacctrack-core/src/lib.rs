//! VaccTrack Core Library
//!
//! Local-first immunization tracking for a single clinic device: schedule
//! generation, shareable JSON snapshots, and a merge engine for moving
//! records between devices.
//!
//! # Architecture
//!
//! ```text
//! Patient intake ──► validate ──► SQLite store ◄── seed catalog
//!        │                            │
//!        └── generate schedule ───────┤
//!                                     │
//!                        ┌────────────┼────────────┐
//!                        ▼            ▼            ▼
//!                  JSON export   merge import   backup file
//!                  (share)       (id-driven)    (replace-all
//!                                               on restore)
//! ```
//!
//! # Core Principle
//!
//! **The snapshot is authoritative for the patients it carries.** A merge
//! overwrites matching records field-for-field and prunes doses the
//! snapshot no longer lists; patients absent from the snapshot are never
//! touched.
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer and seed catalog
//! - [`models`]: Domain types (Patient, Vaccine, Dose)
//! - [`schedule`]: Civil-calendar date math and schedule generation
//! - [`snapshot`]: JSON snapshot codec (export/import/backup format)
//! - [`merge`]: Merge engine, dedup sweeps, schedule backfill
//! - [`backup`]: Device backup file management
//! - [`intake`]: Patient and dose editing workflows

pub mod backup;
pub mod db;
pub mod intake;
pub mod merge;
pub mod models;
pub mod schedule;
pub mod snapshot;

// Re-export commonly used types
pub use db::Database;
pub use merge::MergeSummary;
pub use models::{dose_status, Dose, DoseStatus, Patient, Vaccine};
pub use snapshot::{DoseDocument, PatientDocument, VaccineRef};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum VaccTrackError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Backup error: {0}")]
    BackupError(String),
}

impl From<db::DbError> for VaccTrackError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => VaccTrackError::NotFound(what),
            other => VaccTrackError::DatabaseError(other.to_string()),
        }
    }
}

impl From<snapshot::SnapshotError> for VaccTrackError {
    fn from(e: snapshot::SnapshotError) -> Self {
        match e {
            snapshot::SnapshotError::Decode(err) => {
                VaccTrackError::SerializationError(err.to_string())
            }
            snapshot::SnapshotError::Db(err) => err.into(),
        }
    }
}

impl From<merge::MergeError> for VaccTrackError {
    fn from(e: merge::MergeError) -> Self {
        match e {
            merge::MergeError::Db(err) => err.into(),
        }
    }
}

impl From<backup::BackupError> for VaccTrackError {
    fn from(e: backup::BackupError) -> Self {
        match e {
            backup::BackupError::Db(err) => err.into(),
            backup::BackupError::Merge(err) => err.into(),
            backup::BackupError::Snapshot(err) => err.into(),
            other => VaccTrackError::BackupError(other.to_string()),
        }
    }
}

impl From<intake::IntakeError> for VaccTrackError {
    fn from(e: intake::IntakeError) -> Self {
        match e {
            intake::IntakeError::Validation(msg) => VaccTrackError::InvalidInput(msg),
            intake::IntakeError::Db(err) => err.into(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for VaccTrackError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        VaccTrackError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>, VaccTrackError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| VaccTrackError::InvalidInput(format!("invalid timestamp '{text}': {e}")))
}

fn parse_instant_opt(text: Option<&str>) -> Result<Option<DateTime<Utc>>, VaccTrackError> {
    text.map(parse_instant).transpose()
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path. Seeds the catalog when it
/// is empty and runs the one-time catalog dedup sweep.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<VaccTrackCore>, VaccTrackError> {
    let mut db = Database::open(&path)?;
    db.seed_catalog_best_effort();
    merge::dedup::dedup_catalog_once(&mut db)?;
    Ok(Arc::new(VaccTrackCore {
        db: Arc::new(Mutex::new(db)),
    }))
}

/// Create an in-memory database (for testing). Not seeded.
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<VaccTrackCore>, VaccTrackError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(VaccTrackCore {
        db: Arc::new(Mutex::new(db)),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct VaccTrackCore {
    db: Arc<Mutex<Database>>,
}

#[uniffi::export]
impl VaccTrackCore {
    // =========================================================================
    // Catalog Operations
    // =========================================================================

    /// Seed the vaccine catalog when it is empty. Returns entries inserted.
    pub fn seed_catalog(&self) -> Result<u32, VaccTrackError> {
        let db = self.db.lock()?;
        Ok(db.seed_catalog_if_needed()? as u32)
    }

    /// The catalog in display order.
    pub fn list_catalog(&self) -> Result<Vec<FfiVaccine>, VaccTrackError> {
        let db = self.db.lock()?;
        Ok(db.list_vaccines()?.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Validate and save a patient. An empty id creates a new record; on
    /// first save the full schedule is generated from the catalog.
    pub fn save_patient(&self, patient: FfiPatient) -> Result<FfiPatient, VaccTrackError> {
        let mut db = self.db.lock()?;
        let saved = intake::save_patient(&mut db, patient.try_into()?, Utc::now())?;
        Ok(saved.into())
    }

    /// Get a patient by id.
    pub fn get_patient(&self, id: String) -> Result<Option<FfiPatient>, VaccTrackError> {
        let db = self.db.lock()?;
        Ok(db.get_patient(&id)?.map(Into::into))
    }

    /// All patients in creation order.
    pub fn list_patients(&self) -> Result<Vec<FfiPatient>, VaccTrackError> {
        let db = self.db.lock()?;
        Ok(db.list_patients()?.into_iter().map(Into::into).collect())
    }

    /// Delete a patient; their doses go with them.
    pub fn delete_patient(&self, id: String) -> Result<bool, VaccTrackError> {
        let db = self.db.lock()?;
        Ok(db.delete_patient(&id)?)
    }

    // =========================================================================
    // Dose Operations
    // =========================================================================

    /// A patient's doses, earliest scheduled first, with status computed
    /// against the current instant.
    pub fn doses_for_patient(&self, patient_id: String) -> Result<Vec<FfiDose>, VaccTrackError> {
        let db = self.db.lock()?;
        let now = Utc::now();
        Ok(db
            .doses_for_patient(&patient_id)?
            .into_iter()
            .map(|d| dose_to_ffi(d, now))
            .collect())
    }

    /// Validate and save an edited dose.
    pub fn update_dose(&self, dose: FfiDose) -> Result<FfiDose, VaccTrackError> {
        let db = self.db.lock()?;
        let dose: Dose = dose.try_into()?;
        let patient = db
            .get_patient(&dose.patient_id)?
            .ok_or_else(|| VaccTrackError::NotFound(format!("patient {}", dose.patient_id)))?;
        let saved = intake::update_dose(&db, dose, patient.dob)?;
        Ok(dose_to_ffi(saved, Utc::now()))
    }

    /// Mark a dose as administered right now.
    pub fn mark_dose_given_now(&self, dose_id: String) -> Result<FfiDose, VaccTrackError> {
        let db = self.db.lock()?;
        let now = Utc::now();
        Ok(dose_to_ffi(intake::mark_given_now(&db, &dose_id, now)?, now))
    }

    /// Add an ad-hoc dose outside the generated schedule.
    pub fn add_dose(
        &self,
        patient_id: String,
        vaccine_id: Option<String>,
        scheduled_date: String,
    ) -> Result<FfiDose, VaccTrackError> {
        let db = self.db.lock()?;
        let now = Utc::now();
        let scheduled = parse_instant(&scheduled_date)?;
        let dose = intake::add_dose(&db, &patient_id, vaccine_id, scheduled, now)?;
        Ok(dose_to_ffi(dose, now))
    }

    /// Remove a dose. Returns whether anything was deleted.
    pub fn remove_dose(&self, dose_id: String) -> Result<bool, VaccTrackError> {
        let db = self.db.lock()?;
        Ok(intake::remove_dose(&db, &dose_id)?)
    }

    // =========================================================================
    // Snapshot Operations
    // =========================================================================

    /// Export every patient as snapshot JSON (an array of documents).
    pub fn export_all_json(&self) -> Result<String, VaccTrackError> {
        let db = self.db.lock()?;
        let documents = snapshot::export_all(&db)?;
        Ok(snapshot::encode(&documents)?)
    }

    /// Export one patient as snapshot JSON (a bare document).
    pub fn export_patient_json(&self, patient_id: String) -> Result<String, VaccTrackError> {
        let db = self.db.lock()?;
        let document = snapshot::export_patient(&db, &patient_id)?;
        Ok(snapshot::encode_one(&document)?)
    }

    /// Decode snapshot JSON and merge it into the store.
    pub fn import_json(&self, text: String) -> Result<FfiMergeSummary, VaccTrackError> {
        let mut db = self.db.lock()?;
        let documents = snapshot::decode(&text)?;
        Ok(merge::merge(&mut db, &documents)?.into())
    }

    // =========================================================================
    // Backup Operations
    // =========================================================================

    /// Write the backup file under the given directory, overwriting any
    /// previous backup.
    pub fn create_backup(&self, dir: String) -> Result<(), VaccTrackError> {
        let db = self.db.lock()?;
        Ok(backup::create_backup(&db, Path::new(&dir), Utc::now())?)
    }

    /// Replace the store with the backup file's contents. Returns the
    /// instant the backup was written, RFC 3339.
    pub fn restore_backup(&self, dir: String) -> Result<String, VaccTrackError> {
        let mut db = self.db.lock()?;
        let backed_up_at = backup::restore_backup(&mut db, Path::new(&dir), Utc::now())?;
        Ok(backed_up_at.to_rfc3339())
    }

    pub fn has_backup(&self, dir: String) -> bool {
        backup::has_backup(Path::new(&dir))
    }

    /// Remove the backup file, if present.
    pub fn delete_backup(&self, dir: String) -> Result<(), VaccTrackError> {
        Ok(backup::delete_backup(Path::new(&dir))?)
    }

    /// When the last backup was written, RFC 3339, if ever.
    pub fn last_backup_at(&self) -> Result<Option<String>, VaccTrackError> {
        let db = self.db.lock()?;
        Ok(backup::last_backup_at(&db)?.map(|t| t.to_rfc3339()))
    }

    // =========================================================================
    // Maintenance Operations
    // =========================================================================

    /// Run both dedup sweeps. Returns the number of records removed.
    pub fn run_dedup(&self) -> Result<u32, VaccTrackError> {
        let mut db = self.db.lock()?;
        let catalog = merge::dedup::dedup_catalog(&mut db)?;
        let doses = merge::dedup::dedup_doses(&mut db)?;
        Ok((catalog + doses) as u32)
    }

    /// Backfill catalog doses the patient is missing. Runs at most once per
    /// patient. Returns the number of doses added.
    pub fn backfill_patient(&self, patient_id: String) -> Result<u32, VaccTrackError> {
        let mut db = self.db.lock()?;
        Ok(merge::backfill::backfill_missing_doses(&mut db, &patient_id, Utc::now())? as u32)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe patient. Timestamps are RFC 3339 strings; an empty id means
/// "create a new record" and an empty created_at means "now".
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub mother_name: Option<String>,
    pub father_name: Option<String>,
    pub gender: Option<String>,
    pub dob: String,
    pub time_of_birth: Option<String>,
    pub mode_of_delivery: Option<String>,
    pub birth_weight_grams: i32,
    pub length_cm: i32,
    pub head_circumference_cm: f32,
    pub contact_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id,
            first_name: patient.first_name,
            last_name: patient.last_name,
            mother_name: patient.mother_name,
            father_name: patient.father_name,
            gender: patient.gender,
            dob: patient.dob.to_rfc3339(),
            time_of_birth: patient.time_of_birth,
            mode_of_delivery: patient.mode_of_delivery,
            birth_weight_grams: patient.birth_weight_grams,
            length_cm: patient.length_cm,
            head_circumference_cm: patient.head_circumference_cm,
            contact_number: patient.contact_number,
            notes: patient.notes,
            created_at: patient.created_at.to_rfc3339(),
        }
    }
}

impl TryFrom<FfiPatient> for Patient {
    type Error = VaccTrackError;

    fn try_from(patient: FfiPatient) -> Result<Self, Self::Error> {
        let created_at = if patient.created_at.is_empty() {
            Utc::now()
        } else {
            parse_instant(&patient.created_at)?
        };
        Ok(Patient {
            id: if patient.id.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                patient.id
            },
            first_name: patient.first_name,
            last_name: patient.last_name,
            mother_name: patient.mother_name,
            father_name: patient.father_name,
            gender: patient.gender,
            dob: parse_instant(&patient.dob)?,
            time_of_birth: patient.time_of_birth,
            mode_of_delivery: patient.mode_of_delivery,
            birth_weight_grams: patient.birth_weight_grams,
            length_cm: patient.length_cm,
            head_circumference_cm: patient.head_circumference_cm,
            contact_number: patient.contact_number,
            notes: patient.notes,
            created_at,
        })
    }
}

/// FFI-safe vaccine catalog entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVaccine {
    pub id: String,
    pub name: String,
    pub recommended_age_in_weeks: u32,
    pub sequence: i32,
    pub notes: Option<String>,
}

impl From<Vaccine> for FfiVaccine {
    fn from(vaccine: Vaccine) -> Self {
        Self {
            id: vaccine.id,
            name: vaccine.name,
            recommended_age_in_weeks: vaccine.recommended_age_in_weeks,
            sequence: vaccine.sequence,
            notes: vaccine.notes,
        }
    }
}

/// FFI-safe dose. `status` and `status_days` are derived on the way out
/// ("given", "upcoming", "overdue", "not_given") and ignored on the way in.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDose {
    pub id: String,
    pub patient_id: String,
    pub vaccine_id: Option<String>,
    pub scheduled_date: String,
    pub due_date: Option<String>,
    pub given_on: Option<String>,
    pub batch_number: Option<String>,
    pub facility: Option<String>,
    pub administered_by: Option<String>,
    pub notes: Option<String>,
    pub weight_at_dose: f32,
    pub height_at_dose: f32,
    pub head_circumference_at_dose: f32,
    pub vaccine_brand: Option<String>,
    pub photo_data: Option<Vec<u8>>,
    pub created_at: String,
    pub status: String,
    pub status_days: Option<i64>,
}

fn dose_to_ffi(dose: Dose, now: DateTime<Utc>) -> FfiDose {
    let (status, status_days) = match dose.status(now) {
        DoseStatus::Given(_) => ("given", None),
        DoseStatus::Upcoming(days) => ("upcoming", Some(days)),
        DoseStatus::Overdue(days) => ("overdue", Some(days)),
        DoseStatus::NotGiven => ("not_given", None),
    };
    FfiDose {
        id: dose.id,
        patient_id: dose.patient_id,
        vaccine_id: dose.vaccine_id,
        scheduled_date: dose.scheduled_date.to_rfc3339(),
        due_date: dose.due_date.map(|t| t.to_rfc3339()),
        given_on: dose.given_on.map(|t| t.to_rfc3339()),
        batch_number: dose.batch_number,
        facility: dose.facility,
        administered_by: dose.administered_by,
        notes: dose.notes,
        weight_at_dose: dose.weight_at_dose,
        height_at_dose: dose.height_at_dose,
        head_circumference_at_dose: dose.head_circumference_at_dose,
        vaccine_brand: dose.vaccine_brand,
        photo_data: dose.photo_data,
        created_at: dose.created_at.to_rfc3339(),
        status: status.to_string(),
        status_days,
    }
}

impl TryFrom<FfiDose> for Dose {
    type Error = VaccTrackError;

    fn try_from(dose: FfiDose) -> Result<Self, Self::Error> {
        let created_at = if dose.created_at.is_empty() {
            Utc::now()
        } else {
            parse_instant(&dose.created_at)?
        };
        Ok(Dose {
            id: if dose.id.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                dose.id
            },
            patient_id: dose.patient_id,
            vaccine_id: dose.vaccine_id,
            scheduled_date: parse_instant(&dose.scheduled_date)?,
            due_date: parse_instant_opt(dose.due_date.as_deref())?,
            given_on: parse_instant_opt(dose.given_on.as_deref())?,
            batch_number: dose.batch_number,
            facility: dose.facility,
            administered_by: dose.administered_by,
            notes: dose.notes,
            weight_at_dose: dose.weight_at_dose,
            height_at_dose: dose.height_at_dose,
            head_circumference_at_dose: dose.head_circumference_at_dose,
            vaccine_brand: dose.vaccine_brand,
            photo_data: dose.photo_data,
            created_at,
        })
    }
}

/// FFI-safe merge summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMergeSummary {
    pub patients_created: u32,
    pub patients_updated: u32,
    pub doses_created: u32,
    pub doses_updated: u32,
    pub doses_pruned: u32,
}

impl From<MergeSummary> for FfiMergeSummary {
    fn from(summary: MergeSummary) -> Self {
        Self {
            patients_created: summary.patients_created as u32,
            patients_updated: summary.patients_updated as u32,
            doses_created: summary.doses_created as u32,
            doses_updated: summary.doses_updated as u32,
            doses_pruned: summary.doses_pruned as u32,
        }
    }
}
