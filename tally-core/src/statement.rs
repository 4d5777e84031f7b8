//! Parsed statement model: who owns the account, what moved, and the verified summary.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::summary::{StatedTotals, Summary, SummaryMismatch};

/// Account number used when the statement prints none.
pub const NO_ACCOUNT: &str = "SIN_CUENTA";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    MXN,
    USD,
    EUR,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MXN => "MXN",
            Self::USD => "USD",
            Self::EUR => "EUR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub bank: String,
    pub account: String,
    pub currency: Currency,
    pub rfc: Option<String>,
    pub clabe: Option<String>,
}

impl AccountInfo {
    /// Blank account numbers become [`NO_ACCOUNT`].
    pub fn new(bank: impl Into<String>, account: impl Into<String>, currency: Currency) -> Self {
        let account = account.into();
        let account = if account.trim().is_empty() {
            NO_ACCOUNT.to_string()
        } else {
            account.trim().to_string()
        };
        Self {
            bank: bank.into(),
            account,
            currency,
            rfc: None,
            clabe: None,
        }
    }

    pub fn with_clabe(mut self, clabe: impl Into<String>) -> Self {
        self.clabe = Some(clabe.into());
        self
    }

    pub fn with_rfc(mut self, rfc: impl Into<String>) -> Self {
        self.rfc = Some(rfc.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    Withdrawal,
    Deposit,
}

/// Exactly one side of a movement; the other side is zero by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Amount {
    Withdrawal(Decimal),
    Deposit(Decimal),
}

impl Amount {
    pub fn new(kind: MovementKind, value: Decimal) -> Self {
        match kind {
            MovementKind::Withdrawal => Self::Withdrawal(value),
            MovementKind::Deposit => Self::Deposit(value),
        }
    }

    pub fn kind(&self) -> MovementKind {
        match self {
            Self::Withdrawal(_) => MovementKind::Withdrawal,
            Self::Deposit(_) => MovementKind::Deposit,
        }
    }

    pub fn value(&self) -> Decimal {
        match self {
            Self::Withdrawal(v) | Self::Deposit(v) => *v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MovementRecord")]
pub struct Movement {
    pub date: NaiveDate,
    pub concept: String,
    pub reference: String,
    amount: Amount,
}

/// Wire form of a movement, checked by `Movement::new` on the way in.
#[derive(Deserialize)]
struct MovementRecord {
    date: NaiveDate,
    concept: String,
    reference: String,
    amount: Amount,
}

impl TryFrom<MovementRecord> for Movement {
    type Error = String;

    fn try_from(r: MovementRecord) -> Result<Self, Self::Error> {
        Self::new(r.date, r.concept, r.reference, r.amount)
    }
}

impl Movement {
    /// Rejects zero and negative amounts; callers turn the message into a `ParseError`.
    pub fn new(
        date: NaiveDate,
        concept: impl Into<String>,
        reference: impl Into<String>,
        amount: Amount,
    ) -> Result<Self, String> {
        if amount.value() <= Decimal::ZERO {
            return Err(format!("movement amount must be positive, got {}", amount.value()));
        }
        Ok(Self {
            date,
            concept: concept.into(),
            reference: reference.into(),
            amount,
        })
    }

    pub fn withdrawal(
        date: NaiveDate,
        concept: impl Into<String>,
        reference: impl Into<String>,
        value: Decimal,
    ) -> Result<Self, String> {
        Self::new(date, concept, reference, Amount::Withdrawal(value))
    }

    pub fn deposit(
        date: NaiveDate,
        concept: impl Into<String>,
        reference: impl Into<String>,
        value: Decimal,
    ) -> Result<Self, String> {
        Self::new(date, concept, reference, Amount::Deposit(value))
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn kind(&self) -> MovementKind {
        self.amount.kind()
    }

    pub fn withdrawal_amount(&self) -> Decimal {
        match self.amount {
            Amount::Withdrawal(v) => v,
            Amount::Deposit(_) => Decimal::ZERO,
        }
    }

    pub fn deposit_amount(&self) -> Decimal {
        match self.amount {
            Amount::Deposit(v) => v,
            Amount::Withdrawal(_) => Decimal::ZERO,
        }
    }
}

/// Statement month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "PeriodRecord")]
pub struct Period {
    year: i32,
    month: u32,
}

#[derive(Deserialize)]
struct PeriodRecord {
    year: i32,
    month: u32,
}

impl TryFrom<PeriodRecord> for Period {
    type Error = String;

    fn try_from(r: PeriodRecord) -> Result<Self, Self::Error> {
        Self::new(r.year, r.month).ok_or_else(|| format!("no statement month {}-{:02}", r.year, r.month))
    }
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        ((2000..=2100).contains(&year) && (1..=12).contains(&month)).then_some(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// One parsed statement. The summary is always recomputed from the movements, so there is
/// no way to build one except `new`; it serializes for reports but is never read back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseResult {
    pub account: AccountInfo,
    movements: Vec<Movement>,
    summary: Summary,
    pub period: Option<Period>,
    pub source_file: String,
    warnings: Vec<SummaryMismatch>,
}

impl ParseResult {
    /// Sum the movements, take balances from `stated`, and record every disagreement
    /// between the printed figures and the computed ones as a warning.
    pub fn new(
        account: AccountInfo,
        movements: Vec<Movement>,
        period: Option<Period>,
        source_file: impl Into<String>,
        stated: &StatedTotals,
    ) -> Self {
        let summary = Summary::from_movements(&movements)
            .with_balances(stated.opening_balance, stated.closing_balance);
        let warnings = stated.reconcile(&summary);
        Self {
            account,
            movements,
            summary,
            period,
            source_file: source_file.into(),
            warnings,
        }
    }

    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn warnings(&self) -> &[SummaryMismatch] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn bank(&self) -> &str {
        &self.account.bank
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn movement_sides_are_exclusive() {
        let m = Movement::withdrawal(date(1), "PAGO TARJETA", "REF123", d("1250.00")).unwrap();
        assert_eq!(m.kind(), MovementKind::Withdrawal);
        assert_eq!(m.withdrawal_amount(), d("1250.00"));
        assert_eq!(m.deposit_amount(), Decimal::ZERO);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        assert!(Movement::deposit(date(1), "X", "", Decimal::ZERO).is_err());
        assert!(Movement::deposit(date(1), "X", "", d("-5.00")).is_err());
    }

    #[test]
    fn deserialized_values_are_checked() {
        let ok = r#"{"date":"2024-03-01","concept":"PAGO","reference":"","amount":{"kind":"Deposit","value":"10.00"}}"#;
        let m: Movement = serde_json::from_str(ok).unwrap();
        assert_eq!(m.deposit_amount(), d("10.00"));

        let negative = ok.replace("10.00", "-10.00");
        assert!(serde_json::from_str::<Movement>(&negative).is_err());
        let zero = ok.replace("10.00", "0.00");
        assert!(serde_json::from_str::<Movement>(&zero).is_err());

        let period: Period = serde_json::from_str(r#"{"year":2024,"month":3}"#).unwrap();
        assert_eq!(period, Period::new(2024, 3).unwrap());
        assert!(serde_json::from_str::<Period>(r#"{"year":2024,"month":13}"#).is_err());
    }

    #[test]
    fn period_bounds_and_display() {
        assert_eq!(Period::new(2024, 3).unwrap().to_string(), "2024-03");
        assert!(Period::new(2024, 13).is_none());
        assert!(Period::new(1999, 1).is_none());
    }

    #[test]
    fn blank_account_gets_placeholder() {
        let info = AccountInfo::new("BBVA", "  ", Currency::MXN);
        assert_eq!(info.account, NO_ACCOUNT);
    }

    #[test]
    fn parse_result_summarizes_movements() {
        let movements = vec![
            Movement::withdrawal(date(1), "PAGO", "", d("100.10")).unwrap(),
            Movement::deposit(date(2), "DEPOSITO", "", d("50.05")).unwrap(),
            Movement::withdrawal(date(3), "COMISION", "", d("0.90")).unwrap(),
        ];
        let result = ParseResult::new(
            AccountInfo::new("BBVA", "0123456789", Currency::MXN),
            movements,
            Period::new(2024, 3),
            "marzo.pdf",
            &StatedTotals::default(),
        );
        assert_eq!(result.summary().total_withdrawals, d("101.00"));
        assert_eq!(result.summary().total_deposits, d("50.05"));
        assert_eq!(result.summary().withdrawal_count, 2);
        assert!(!result.has_warnings());
    }
}
