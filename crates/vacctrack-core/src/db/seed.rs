//! Vaccine catalog seed source.
//!
//! A fixed, versioned list spanning birth through adolescence. Month and
//! year bands are pre-converted to weeks (1 month = 4.33 weeks, truncated),
//! which is why e.g. 12 months appears as 51 weeks.

use tracing::{info, warn};

use super::{Database, DbResult};
use crate::models::Vaccine;

/// One seed catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct SeedVaccine {
    pub name: &'static str,
    pub recommended_age_in_weeks: u32,
    pub sequence: i32,
    pub notes: Option<&'static str>,
}

const fn seed(
    name: &'static str,
    weeks: u32,
    sequence: i32,
    notes: Option<&'static str>,
) -> SeedVaccine {
    SeedVaccine {
        name,
        recommended_age_in_weeks: weeks,
        sequence,
        notes,
    }
}

/// The default immunization catalog.
pub fn default_catalog() -> &'static [SeedVaccine] {
    const CATALOG: &[SeedVaccine] = &[
        // At Birth
        seed("BCG", 0, 0, Some("At Birth")),
        seed("OPV", 0, 1, Some("At Birth")),
        seed("Hepatitis B-1", 0, 2, Some("At Birth")),
        // 6 Weeks
        seed("DTwP / DTaP-1", 6, 3, None),
        seed("IPV-1", 6, 4, None),
        seed("Hepatitis B-2", 6, 5, None),
        seed("Hib-1", 6, 6, None),
        seed("Rotavirus-1", 6, 7, None),
        seed("PCV-1", 6, 8, None),
        // 10 Weeks
        seed("DTwP / DTaP-2", 10, 9, None),
        seed("IPV-2", 10, 10, None),
        seed("Hepatitis B-3", 10, 11, None),
        seed("Hib-2", 10, 12, None),
        seed("Rotavirus-2", 10, 13, None),
        seed("PCV-2", 10, 14, None),
        // 14 Weeks
        seed("DTwP / DTaP-3", 14, 15, None),
        seed("IPV-3", 14, 16, None),
        seed("Hepatitis B-4", 14, 17, None),
        seed("Hib-3", 14, 18, None),
        seed("Rotavirus-3", 14, 19, None),
        seed("PCV-3", 14, 20, None),
        // 6-7 Months
        seed("Influenza-1", 25, 21, Some("6 months")),
        seed("Influenza-2", 30, 22, Some("7 months")),
        // 6-9 Months
        seed("TCV (Typhoid Conjugate Vaccine)", 34, 23, Some("6-9 months")),
        // 9-13 Months series
        seed("MMR-1", 38, 24, Some("9 months")),
        seed("MCV-1 (Meningococcal Vaccine 1)", 38, 25, None),
        seed("Hepatitis A-1", 51, 26, Some("12 months")),
        seed("MMR-2", 51, 27, None),
        seed("Varicella-1", 51, 28, None),
        seed("JE-1 (Japanese Encephalitis 1)", 51, 29, None),
        seed("Cholera-1", 51, 30, None),
        seed("JE-2 (Japanese Encephalitis 2)", 56, 31, None),
        seed("Cholera-2", 56, 32, None),
        // 15 Months
        seed("PCV Booster (PCV-B)", 64, 33, None),
        // MCV-2 is given at 12 months despite sitting in the 15-month block
        seed("MCV-2 (Meningococcal Vaccine 2)", 51, 34, None),
        // 16-18 Months
        seed("DTwP / DTaP-B1", 69, 35, None),
        seed("IPV-B1", 69, 36, None),
        seed("Hib-B1", 69, 37, None),
        // 18-19 Months
        seed("Hepatitis A-2", 77, 38, None),
        seed("Varicella-2", 77, 39, None),
        // Yearly influenza bands
        seed("Influenza", 103, 40, Some("2-3 Years")),
        seed("Influenza", 155, 41, Some("3-4 Years")),
        seed("Influenza", 207, 42, Some("4-5 Years")),
        // 4-6 Years
        seed("DTwP / DTaP-B2", 259, 43, None),
        seed("IPV-B2", 259, 44, None),
        seed("MMR-3", 259, 45, None),
        seed(
            "PPSV (Pneumococcal Polysaccharide Vaccine)",
            103,
            46,
            Some("After 2 years"),
        ),
        // 9-14 Years
        seed("Tdap", 467, 47, None),
        seed("HPV-1", 467, 48, None),
        seed("HPV-2", 493, 49, None),
        // After 9 Months / Any Age
        seed("Yellow Fever (for travelers/high-risk regions)", 43, 50, None),
        seed(
            "Rabies (post-exposure or pre-exposure in high-risk area)",
            0,
            51,
            None,
        ),
    ];
    CATALOG
}

impl Database {
    /// Seed the catalog from the default list. Idempotent: a non-empty
    /// catalog is left untouched. Returns the number of entries inserted.
    pub fn seed_catalog_if_needed(&self) -> DbResult<usize> {
        if self.count_vaccines()? > 0 {
            return Ok(0);
        }

        let entries = default_catalog();
        for entry in entries {
            let mut vaccine = Vaccine::new(
                entry.name.to_string(),
                entry.recommended_age_in_weeks,
                entry.sequence,
            );
            vaccine.notes = entry.notes.map(str::to_string);
            self.upsert_vaccine(&vaccine)?;
        }
        info!(count = entries.len(), "seeded vaccine catalog");
        Ok(entries.len())
    }

    /// Seed wrapper for app startup: failures are logged and swallowed so a
    /// catalog load error never blocks launch (the app runs with an empty
    /// catalog instead).
    pub fn seed_catalog_best_effort(&self) -> usize {
        match self.seed_catalog_if_needed() {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "seeding vaccine catalog failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_spans_birth_to_adolescence() {
        let catalog = default_catalog();
        assert_eq!(catalog.len(), 52);
        assert_eq!(catalog[0].recommended_age_in_weeks, 0);
        assert!(catalog.iter().any(|v| v.recommended_age_in_weeks > 400));

        // Sequences are unique and ascending.
        for pair in catalog.windows(2) {
            assert!(pair[0].sequence < pair[1].sequence);
        }
    }

    #[test]
    fn test_seed_is_idempotent() {
        let db = Database::open_in_memory().unwrap();

        let first = db.seed_catalog_if_needed().unwrap();
        assert_eq!(first as i64, db.count_vaccines().unwrap());

        let second = db.seed_catalog_if_needed().unwrap();
        assert_eq!(second, 0);
        assert_eq!(first as i64, db.count_vaccines().unwrap());
    }

    #[test]
    fn test_seed_skipped_when_catalog_non_empty() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_vaccine(&Vaccine::new("Custom".into(), 0, 0)).unwrap();

        assert_eq!(db.seed_catalog_if_needed().unwrap(), 0);
        assert_eq!(db.count_vaccines().unwrap(), 1);
    }
}
