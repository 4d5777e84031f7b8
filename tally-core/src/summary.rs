//! Computed totals and their cross-check against what the statement prints.
//!
//! Printed figures look like:
//!   SALDO ANTERIOR            $12,500.00
//!   SALDO FINAL               $10,300.00
//!   TOTAL DEPOSITOS            4,000.00
//!   Ending balance            $1,204.11

use std::fmt;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{format_money, parse_money};
use crate::statement::{Amount, Movement};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub deposit_count: usize,
    pub withdrawal_count: usize,
    pub opening_balance: Option<Decimal>,
    pub closing_balance: Option<Decimal>,
}

impl Summary {
    pub fn from_movements(movements: &[Movement]) -> Self {
        movements.iter().fold(Self::default(), |mut acc, m| {
            match m.amount() {
                Amount::Deposit(v) => {
                    acc.total_deposits += v;
                    acc.deposit_count += 1;
                }
                Amount::Withdrawal(v) => {
                    acc.total_withdrawals += v;
                    acc.withdrawal_count += 1;
                }
            }
            acc
        })
    }

    pub fn with_balances(mut self, opening: Option<Decimal>, closing: Option<Decimal>) -> Self {
        self.opening_balance = opening;
        self.closing_balance = closing;
        self
    }

    /// Deposits minus withdrawals.
    pub fn net_movements(&self) -> Decimal {
        self.total_deposits - self.total_withdrawals
    }

    /// Closing minus opening balance, when both are known.
    pub fn balance_delta(&self) -> Option<Decimal> {
        Some(self.closing_balance? - self.opening_balance?)
    }

    pub fn movement_count(&self) -> usize {
        self.deposit_count + self.withdrawal_count
    }
}

/// Figures the statement prints about itself. Absent values are never checked.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatedTotals {
    pub opening_balance: Option<Decimal>,
    pub closing_balance: Option<Decimal>,
    pub total_deposits: Option<Decimal>,
    pub total_withdrawals: Option<Decimal>,
}

impl StatedTotals {
    pub fn is_empty(&self) -> bool {
        self.opening_balance.is_none()
            && self.closing_balance.is_none()
            && self.total_deposits.is_none()
            && self.total_withdrawals.is_none()
    }

    /// Compare against a computed summary.
    pub fn reconcile(&self, summary: &Summary) -> Vec<SummaryMismatch> {
        let mut out = Vec::new();
        if let Some(stated) = self.total_deposits.filter(|s| *s != summary.total_deposits) {
            out.push(SummaryMismatch::new(MismatchField::TotalDeposits, stated, summary.total_deposits));
        }
        if let Some(stated) = self.total_withdrawals.filter(|s| *s != summary.total_withdrawals) {
            out.push(SummaryMismatch::new(
                MismatchField::TotalWithdrawals,
                stated,
                summary.total_withdrawals,
            ));
        }
        if let (Some(open), Some(close)) = (self.opening_balance, self.closing_balance) {
            let stated = close - open;
            let computed = summary.net_movements();
            if stated != computed {
                out.push(SummaryMismatch::new(MismatchField::BalanceChange, stated, computed));
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MismatchField {
    TotalDeposits,
    TotalWithdrawals,
    /// Closing minus opening balance against deposits minus withdrawals.
    BalanceChange,
}

impl fmt::Display for MismatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TotalDeposits => "total deposits",
            Self::TotalWithdrawals => "total withdrawals",
            Self::BalanceChange => "balance change",
        })
    }
}

/// A printed figure that disagrees with the computed one. Attached to a successful result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryMismatch {
    pub field: MismatchField,
    pub stated: Decimal,
    pub computed: Decimal,
}

impl SummaryMismatch {
    pub fn new(field: MismatchField, stated: Decimal, computed: Decimal) -> Self {
        Self {
            field,
            stated,
            computed,
        }
    }

    pub fn difference(&self) -> Decimal {
        self.stated - self.computed
    }
}

impl fmt::Display for SummaryMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mismatch: statement says {}, movements add up to {}",
            self.field,
            format_money(self.stated),
            format_money(self.computed)
        )
    }
}

const AMOUNT: &str = r"(-?\$?\s*\d[\d,]*\.\d{2})";

/// Finds the labelled totals a statement prints. The first match of each label wins.
#[derive(Debug, Clone)]
pub struct TotalsScanner {
    opening: Regex,
    closing: Regex,
    deposits: Regex,
    withdrawals: Regex,
}

impl TotalsScanner {
    pub fn new() -> Result<Self, regex::Error> {
        let labelled = |label: &str| Regex::new(&format!(r"(?im)(?:{label})[^\d\n-]*{AMOUNT}"));
        Ok(Self {
            opening: labelled(r"SALDO\s+(?:ANTERIOR|INICIAL)|(?:BEGINNING|OPENING|PREVIOUS)\s+BALANCE")?,
            closing: labelled(r"SALDO\s+(?:FINAL|ACTUAL|AL\s+CORTE)|(?:ENDING|CLOSING)\s+BALANCE")?,
            deposits: labelled(r"TOTAL\s+(?:DE\s+)?(?:DEP[OÓ]SITOS|ABONOS)|TOTAL\s+DEPOSITS")?,
            withdrawals: labelled(r"TOTAL\s+(?:DE\s+)?(?:RETIROS|CARGOS)|TOTAL\s+WITHDRAWALS")?,
        })
    }

    pub fn scan(&self, text: &str) -> StatedTotals {
        let find = |re: &Regex| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .and_then(|m| parse_money(m.as_str()).ok())
        };
        StatedTotals {
            opening_balance: find(&self.opening),
            closing_balance: find(&self.closing),
            total_deposits: find(&self.deposits),
            total_withdrawals: find(&self.withdrawals),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn movements() -> Vec<Movement> {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        vec![
            Movement::withdrawal(day, "PAGO", "", d("1250.00")).unwrap(),
            Movement::deposit(day, "DEPOSITO", "", d("3000.00")).unwrap(),
        ]
    }

    #[test]
    fn scanner_reads_spanish_and_english_labels() {
        let scanner = TotalsScanner::new().unwrap();
        let stated = scanner.scan(
            "SALDO ANTERIOR $12,500.00\nTOTAL DE DEPOSITOS 4,000.00\nTotal retiros: 6,200.00\nSALDO FINAL $10,300.00",
        );
        assert_eq!(stated.opening_balance, Some(d("12500.00")));
        assert_eq!(stated.closing_balance, Some(d("10300.00")));
        assert_eq!(stated.total_deposits, Some(d("4000.00")));
        assert_eq!(stated.total_withdrawals, Some(d("6200.00")));

        let english = scanner.scan("Beginning balance $1,000.00\nEnding balance $1,204.11");
        assert_eq!(english.opening_balance, Some(d("1000.00")));
        assert_eq!(english.closing_balance, Some(d("1204.11")));
    }

    #[test]
    fn label_without_amount_on_its_line_is_ignored() {
        let scanner = TotalsScanner::new().unwrap();
        let stated = scanner.scan("SALDO FINAL\n01/MAR PAGO 1,250.00");
        assert!(stated.closing_balance.is_none());
        assert!(stated.is_empty());
    }

    #[test]
    fn matching_figures_produce_no_warnings() {
        let summary = Summary::from_movements(&movements()).with_balances(Some(d("100.00")), Some(d("1850.00")));
        let stated = StatedTotals {
            opening_balance: Some(d("100.00")),
            closing_balance: Some(d("1850.00")),
            total_deposits: Some(d("3000.00")),
            total_withdrawals: Some(d("1250.00")),
        };
        assert!(stated.reconcile(&summary).is_empty());
        assert_eq!(summary.balance_delta(), Some(d("1750.00")));
    }

    #[test]
    fn disagreements_are_reported_per_field() {
        let summary = Summary::from_movements(&movements());
        let stated = StatedTotals {
            opening_balance: Some(d("100.00")),
            closing_balance: Some(d("999.00")),
            total_deposits: Some(d("3000.00")),
            total_withdrawals: Some(d("1200.00")),
        };
        let warnings = stated.reconcile(&summary);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].field, MismatchField::TotalWithdrawals);
        assert_eq!(warnings[0].difference(), d("-50.00"));
        assert_eq!(warnings[1].field, MismatchField::BalanceChange);
        assert_eq!(warnings[1].stated, d("899.00"));
        assert_eq!(warnings[1].computed, d("1750.00"));
        assert!(warnings[1].to_string().contains("$899.00"));
    }
}
