//! Exact-decimal money parsing for locale-formatted statement amounts.
//!
//! Statements print amounts as `$1,234.56`, `1,234.56`, `1234.56`, `-1,234.56` or with
//! OCR-inserted spaces (`1,234 . 56`). Every variant becomes a `Decimal`; floats never
//! touch money.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::MoneyError;

fn strip_amount(text: &str) -> String {
    text.trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect()
}

/// Parse a money string into an exact decimal.
///
/// Fails on empty input, a bare `-`, or anything that is not a number once the currency
/// symbol, spaces and thousands separators are removed.
pub fn parse_money(text: &str) -> Result<Decimal, MoneyError> {
    if text.trim().is_empty() {
        return Err(MoneyError::Empty);
    }
    let cleaned = strip_amount(text);
    if cleaned.is_empty() || cleaned == "-" {
        return Err(MoneyError::Invalid(text.to_string()));
    }
    if !cleaned
        .chars()
        .enumerate()
        .all(|(i, c)| c.is_ascii_digit() || c == '.' || (i == 0 && matches!(c, '-' | '+')))
    {
        return Err(MoneyError::Invalid(text.to_string()));
    }
    Decimal::from_str(&cleaned).map_err(|_| MoneyError::Invalid(text.to_string()))
}

/// `$1,234,567.89`, or `-$1,234.56` for negatives. Always two decimals.
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let abs = rounded.abs();
    let fixed = format!("{abs:.2}");
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${grouped}.{frac_part}")
    } else {
        format!("${grouped}.{frac_part}")
    }
}

/// Whether a token looks like a printed amount (`1,234.56`, `$0.00`, `-12.50`).
pub fn is_money_string(text: &str) -> bool {
    let cleaned = strip_amount(text);
    let digits = cleaned.strip_prefix('-').unwrap_or(&cleaned);
    match digits.split_once('.') {
        Some((int_part, frac)) => {
            !int_part.is_empty()
                && int_part.chars().all(|c| c.is_ascii_digit())
                && frac.len() == 2
                && frac.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}
