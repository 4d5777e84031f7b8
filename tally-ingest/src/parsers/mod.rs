//! Bank statement parsers.
//!
//! One parser per issuer, all behind [`BankParser`]. Two families:
//!   line      regexes over the merged page text (Santander, Scotiabank, Vantage)
//!   position  rows and columns rebuilt from word coordinates (BBVA, Banorte, HSBC)

pub mod banorte;
pub mod bbva;
pub mod hsbc;
pub mod layout;
pub mod santander;
pub mod scotiabank;
pub mod vantage;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tally_core::money::parse_money;
use tally_core::{Amount, Currency, Movement, MovementKind, PageText, ParseError, ParseResult, Period};

pub use banorte::BanorteParser;
pub use bbva::BbvaParser;
pub use hsbc::HsbcParser;
pub use santander::SantanderParser;
pub use scotiabank::ScotiabankParser;
pub use vantage::VantageParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseStrategy {
    Line,
    Position,
}

/// The contract every issuer-specific parser implements.
///
/// Parsers are built once and shared by every file in a batch.
pub trait BankParser: Send + Sync {
    /// Identity as printed by the bank identifier (`"BBVA"`, `"VANTAGE_BANK"`).
    fn bank(&self) -> &'static str;

    fn strategy(&self) -> ParseStrategy;

    /// Whether pages must keep their word boxes for this parser.
    fn requires_words(&self) -> bool {
        self.strategy() == ParseStrategy::Position
    }

    fn parse(&self, pages: &[PageText], file_name: &str) -> Result<ParseResult, ParseError>;
}

pub(crate) fn ensure_pages(bank: &str, pages: &[PageText], file_name: &str) -> Result<(), ParseError> {
    if pages.is_empty() {
        return Err(ParseError::new(bank, file_name, "no pages to parse"));
    }
    Ok(())
}

pub(crate) fn period_or_fail(
    bank: &str,
    file_name: &str,
    found: Option<(i32, u32)>,
) -> Result<Period, ParseError> {
    found
        .and_then(|(y, m)| Period::new(y, m))
        .ok_or_else(|| ParseError::new(bank, file_name, "could not determine the statement period"))
}

/// Where a parser is when something goes wrong: bank, file and the offending row.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowContext<'a> {
    pub bank: &'a str,
    pub file: &'a str,
    pub line: &'a str,
}

impl<'a> RowContext<'a> {
    pub fn new(bank: &'a str, file: &'a str, line: &'a str) -> Self {
        Self { bank, file, line }
    }

    pub fn fail(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.bank, self.file, message).at_line(self.line)
    }

    /// A printed amount that must be a number. Malformed text fails the whole file.
    pub fn amount(&self, token: &str) -> Result<Decimal, ParseError> {
        parse_money(token).map_err(|e| self.fail(format!("malformed amount: {e}")))
    }

    pub fn movement(
        &self,
        date: NaiveDate,
        concept: impl Into<String>,
        reference: impl Into<String>,
        kind: MovementKind,
        value: Decimal,
    ) -> Result<Movement, ParseError> {
        Movement::new(date, concept, reference, Amount::new(kind, value)).map_err(|msg| self.fail(msg))
    }

    /// Withdrawal and deposit read from separate columns of one row.
    pub fn single_side(
        &self,
        withdrawal: Option<Decimal>,
        deposit: Option<Decimal>,
    ) -> Result<Option<(MovementKind, Decimal)>, ParseError> {
        let positive = |v: Option<Decimal>| v.filter(|v| *v > Decimal::ZERO);
        match (positive(withdrawal), positive(deposit)) {
            (Some(_), Some(_)) => Err(self.fail("row carries both a withdrawal and a deposit")),
            (Some(w), None) => Ok(Some((MovementKind::Withdrawal, w))),
            (None, Some(d)) => Ok(Some((MovementKind::Deposit, d))),
            (None, None) => Ok(None),
        }
    }
}

/// USD when any of `markers` appears in `text` (upper-cased), MXN otherwise.
pub(crate) fn currency_from(text: &str, markers: &[&str]) -> Currency {
    let upper = text.to_uppercase();
    if markers.iter().any(|m| upper.contains(m)) {
        Currency::USD
    } else {
        Currency::MXN
    }
}

pub(crate) fn contains_any(upper: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| upper.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_is_a_contract_violation() {
        let ctx = RowContext::new("X", "f.pdf", "row");
        let err = ctx.single_side(Some(Decimal::ONE), Some(Decimal::TWO)).unwrap_err();
        assert_eq!(err.line.as_deref(), Some("row"));
        assert_eq!(ctx.single_side(None, Some(Decimal::ZERO)).unwrap(), None);
        assert_eq!(
            ctx.single_side(None, Some(Decimal::TWO)).unwrap(),
            Some((MovementKind::Deposit, Decimal::TWO))
        );
    }

    #[test]
    fn malformed_amount_names_the_line() {
        let ctx = RowContext::new("BBVA", "mar.pdf", "02/MAR PAGO $12,5O0.00");
        let err = ctx.amount("$12,5O0.00").unwrap_err();
        assert_eq!(err.file, "mar.pdf");
        assert!(err.message.contains("malformed amount"));
        assert_eq!(err.line.as_deref(), Some("02/MAR PAGO $12,5O0.00"));
    }

    #[test]
    fn currency_markers() {
        assert_eq!(currency_from("Cuenta en dolares", &["USD", "DOLAR"]), Currency::USD);
        assert_eq!(currency_from("Pesos", &["USD"]), Currency::MXN);
    }
}
