//! Bank date parsing.
//!
//! Every issuer prints dates differently:
//!   BBVA        05/OCT           (year from the statement period)
//!   Banorte     05-OCT-24
//!   JP Morgan   05OCT24
//!   Santander   5-OCT-2024
//!   Intercam    5                (year and month from the period)
//!   numeric     05/10/2024       (always day first)

use chrono::NaiveDate;

use crate::error::DateError;
use crate::month::month_number;

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn all_alpha(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic())
}

fn number<T: std::str::FromStr>(s: &str, text: &str) -> Result<T, DateError> {
    s.parse().map_err(|_| DateError::Unsupported(text.to_string()))
}

/// Expand a two-digit year: 00-49 → 2000s, 50-99 → 1900s. Four-digit years pass through.
pub fn expand_year(year: i32) -> i32 {
    match year {
        y if y >= 100 => y,
        y if y < 50 => 2000 + y,
        y => 1900 + y,
    }
}

/// Build a date, reporting the original text when the calendar rejects it.
pub fn build_date(year: i32, month: u32, day: u32, text: &str) -> Result<NaiveDate, DateError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| DateError::OutOfRange {
        text: text.to_string(),
        year,
        month,
        day,
    })
}

/// Parse a statement date. `year`/`month` fill in whatever the text omits.
pub fn parse_bank_date(text: &str, year: Option<i32>, month: Option<u32>) -> Result<NaiveDate, DateError> {
    let t = text.trim();
    if t.is_empty() {
        return Err(DateError::Empty);
    }

    if all_digits(t) && t.len() <= 2 {
        let day = number(t, t)?;
        let (Some(y), Some(m)) = (year, month) else {
            return Err(DateError::Incomplete {
                text: t.to_string(),
                missing: "year and month",
            });
        };
        return build_date(y, m, day, t);
    }

    // DDMMMYY
    if t.len() == 7 && t.is_ascii() && all_digits(&t[..2]) && all_alpha(&t[2..5]) && all_digits(&t[5..]) {
        let m = month_number(&t[2..5])?;
        let y = expand_year(number(&t[5..], t)?);
        return build_date(y, m, number(&t[..2], t)?, t);
    }

    let parts: Vec<&str> = t
        .split(|c: char| c == '/' || c == '-' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();

    // DD/MMM, DD-MMM-YY, DD MMM YYYY
    if (parts.len() == 2 || parts.len() == 3)
        && all_digits(parts[0])
        && parts[0].len() <= 2
        && all_alpha(parts[1])
        && parts[1].len() >= 3
    {
        let day = number(parts[0], t)?;
        let m = month_number(parts[1])?;
        let y = match (parts.get(2), year) {
            (Some(y), _) if all_digits(y) && (2..=4).contains(&y.len()) => expand_year(number(y, t)?),
            (Some(_), _) => return Err(DateError::Unsupported(t.to_string())),
            (None, Some(y)) => y,
            (None, None) => {
                return Err(DateError::Incomplete {
                    text: t.to_string(),
                    missing: "a year",
                });
            }
        };
        return build_date(y, m, day, t);
    }

    // DD/MM/YY, DD/MM/YYYY
    let slashed: Vec<&str> = t.split('/').collect();
    if slashed.len() == 3
        && all_digits(slashed[0])
        && slashed[0].len() <= 2
        && all_digits(slashed[1])
        && slashed[1].len() <= 2
        && all_digits(slashed[2])
        && (2..=4).contains(&slashed[2].len())
    {
        let y = expand_year(number(slashed[2], t)?);
        return build_date(y, number(slashed[1], t)?, number(slashed[0], t)?, t);
    }

    Err(DateError::Unsupported(t.to_string()))
}
