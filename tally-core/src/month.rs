//! Month names as printed by Mexican and US statements.

use crate::error::DateError;

const MONTHS: &[(&str, u32)] = &[
    // Spanish abbreviations
    ("ENE", 1),
    ("FEB", 2),
    ("MAR", 3),
    ("ABR", 4),
    ("MAY", 5),
    ("JUN", 6),
    ("JUL", 7),
    ("AGO", 8),
    ("SEP", 9),
    ("SEPT", 9),
    ("OCT", 10),
    ("NOV", 11),
    ("DIC", 12),
    // Spanish full names
    ("ENERO", 1),
    ("FEBRERO", 2),
    ("MARZO", 3),
    ("ABRIL", 4),
    ("MAYO", 5),
    ("JUNIO", 6),
    ("JULIO", 7),
    ("AGOSTO", 8),
    ("SEPTIEMBRE", 9),
    ("OCTUBRE", 10),
    ("NOVIEMBRE", 11),
    ("DICIEMBRE", 12),
    // English abbreviations not shared with Spanish
    ("JAN", 1),
    ("APR", 4),
    ("AUG", 8),
    ("DEC", 12),
    // English full names
    ("JANUARY", 1),
    ("FEBRUARY", 2),
    ("MARCH", 3),
    ("APRIL", 4),
    ("JUNE", 6),
    ("JULY", 7),
    ("AUGUST", 8),
    ("SEPTEMBER", 9),
    ("OCTOBER", 10),
    ("NOVEMBER", 11),
    ("DECEMBER", 12),
];

/// Month number (1-12) for a Spanish or English month name or abbreviation.
/// Case-insensitive: `ene`, `ENE` and `Enero` all give 1.
pub fn month_number(name: &str) -> Result<u32, DateError> {
    let normalized = name.trim().to_uppercase();
    MONTHS
        .iter()
        .find(|(key, _)| *key == normalized)
        .map(|(_, n)| *n)
        .ok_or_else(|| DateError::UnknownMonth(name.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_and_english_variants() {
        assert_eq!(month_number("ENE").unwrap(), 1);
        assert_eq!(month_number("ene").unwrap(), 1);
        assert_eq!(month_number("Enero").unwrap(), 1);
        assert_eq!(month_number("January").unwrap(), 1);
        assert_eq!(month_number("ago").unwrap(), 8);
        assert_eq!(month_number("Aug").unwrap(), 8);
        assert_eq!(month_number("SEPT").unwrap(), 9);
        assert_eq!(month_number("dic").unwrap(), 12);
        assert_eq!(month_number(" May ").unwrap(), 5);
    }

    #[test]
    fn unknown_month_is_an_error() {
        assert_eq!(
            month_number("XYZ"),
            Err(DateError::UnknownMonth("XYZ".to_string()))
        );
    }
}
