//! SQLite schema definition.

/// Complete database schema for vacctrack.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name TEXT,
    mother_name TEXT,
    father_name TEXT,
    gender TEXT,
    dob TEXT NOT NULL,
    time_of_birth TEXT,
    mode_of_delivery TEXT,
    birth_weight_grams INTEGER NOT NULL DEFAULT 0,
    length_cm INTEGER NOT NULL DEFAULT 0,
    head_circumference_cm REAL NOT NULL DEFAULT 0,
    contact_number TEXT,
    notes TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(first_name, last_name);
CREATE INDEX IF NOT EXISTS idx_patients_created ON patients(created_at);

-- ============================================================================
-- Vaccine Catalog
-- ============================================================================

CREATE TABLE IF NOT EXISTS vaccines (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,                          -- not unique: age-variants share a name
    recommended_age_in_weeks INTEGER NOT NULL DEFAULT 0,
    sequence INTEGER NOT NULL DEFAULT 0,
    notes TEXT
);

CREATE INDEX IF NOT EXISTS idx_vaccines_name ON vaccines(name);
CREATE INDEX IF NOT EXISTS idx_vaccines_sequence ON vaccines(sequence);

-- ============================================================================
-- Doses
-- ============================================================================

CREATE TABLE IF NOT EXISTS doses (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    vaccine_id TEXT REFERENCES vaccines(id) ON DELETE SET NULL,
    scheduled_date TEXT NOT NULL,
    due_date TEXT,
    given_on TEXT,
    batch_number TEXT,
    facility TEXT,
    administered_by TEXT,
    notes TEXT,
    weight_at_dose REAL NOT NULL DEFAULT 0,
    height_at_dose REAL NOT NULL DEFAULT 0,
    head_circumference_at_dose REAL NOT NULL DEFAULT 0,
    vaccine_brand TEXT,
    photo_data BLOB,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_doses_patient ON doses(patient_id);
CREATE INDEX IF NOT EXISTS idx_doses_vaccine ON doses(vaccine_id);
CREATE INDEX IF NOT EXISTS idx_doses_scheduled ON doses(scheduled_date);

-- ============================================================================
-- App State (key/value: backup timestamps, seeding and backfill flags)
-- ============================================================================

CREATE TABLE IF NOT EXISTS app_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
