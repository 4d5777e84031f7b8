//! Vantage Bank (Texas) statement parser (line)
//!
//! Direction comes from the section a row sits in, not from its wording. Rows print the
//! description first and an American month-day date:
//!   DEPOSITOS
//!   Descripción                 Fecha      Monto
//!   WIRE TRANSFER IN ACME LLC   03-14   12,500.00
//!   Total                                  12,500.00

use regex::Regex;
use rust_decimal::Decimal;
use tally_core::dates::build_date;
use tally_core::month::month_number;
use tally_core::types::joined_text;
use tally_core::{AccountInfo, Currency, Movement, MovementKind, PageText, ParseError, ParseResult, TotalsScanner};
use tracing::debug;

use super::{BankParser, ParseStrategy, RowContext, ensure_pages, period_or_fail};

const BANK: &str = "VANTAGE_BANK";

const HEAD_CHARS: usize = 2000;
const YEAR_LINES: usize = 30;

const SECTION_END: &[&str] = &["Total", "DESGLOCE", "www.", "PERIODO ACTUAL"];
const HEADER_LINES: &[&str] = &["Descripción", "Descripcion", "Fecha"];

#[derive(Debug, Clone)]
pub struct VantageParser {
    section: Regex,
    row: Regex,
    account: Regex,
    year: Regex,
    month_name: Regex,
    totals: TotalsScanner,
}

impl VantageParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            section: Regex::new(r"(?i)(OTROS\s+DEBITOS|DEPOSITOS|DEPÓSITOS|RETIROS|DEBITOS|DÉBITOS)")?,
            row: Regex::new(r"^(.+?)\s+(\d{1,2})-(\d{1,2})\s+([\d,]+\.\d{2})$")?,
            account: Regex::new(r"(?i)cuenta\s+(\d{9})")?,
            year: Regex::new(r"\b(20\d{2})\b")?,
            month_name: Regex::new(concat!(
                r"(?i)\b(january|february|march|april|may|june|july|august|september|october|",
                r"november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\b"
            ))?,
            totals: TotalsScanner::new()?,
        })
    }

    /// Dollar accounts unless the header says MXN.
    fn account_info(&self, text: &str) -> AccountInfo {
        let account = self
            .account
            .captures(text)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        let head: String = text.chars().take(HEAD_CHARS).collect();
        let currency = if head.to_uppercase().contains("MXN") {
            Currency::MXN
        } else {
            Currency::USD
        };
        AccountInfo::new(BANK, account, currency)
    }

    /// Year from the first lines; month from the first month name in the header, then the
    /// first row, then January.
    fn period(&self, text: &str) -> Option<(i32, u32)> {
        let year = text
            .lines()
            .take(YEAR_LINES)
            .find_map(|l| self.year.captures(l).and_then(|c| c[1].parse::<i32>().ok()))?;

        let head: String = text.chars().take(HEAD_CHARS).collect();
        let month = self
            .month_name
            .captures(&head)
            .and_then(|c| month_number(&c[1]).ok())
            .or_else(|| {
                text.lines()
                    .find_map(|l| self.row.captures(l.trim()))
                    .and_then(|c| c[2].parse::<u32>().ok())
                    .filter(|m| (1..=12).contains(m))
            })
            .unwrap_or(1);
        Some((year, month))
    }

    fn movement(&self, line: &str, year: i32, kind: MovementKind, file: &str) -> Result<Option<Movement>, ParseError> {
        if line.is_empty() || HEADER_LINES.iter().any(|h| line.starts_with(h)) {
            return Ok(None);
        }
        let Some(caps) = self.row.captures(line) else {
            return Ok(None);
        };
        let ctx = RowContext::new(BANK, file, line);

        let date = match (caps[2].parse::<u32>(), caps[3].parse::<u32>()) {
            (Ok(month), Ok(day)) => build_date(year, month, day, line).ok(),
            _ => None,
        };
        let Some(date) = date else {
            debug!(file, line, "skipping row with impossible date");
            return Ok(None);
        };
        let value = ctx.amount(&caps[4])?;
        if value <= Decimal::ZERO {
            return Ok(None);
        }
        ctx.movement(date, caps[1].trim(), "", kind, value).map(Some)
    }
}

impl BankParser for VantageParser {
    fn bank(&self) -> &'static str {
        BANK
    }

    fn strategy(&self) -> ParseStrategy {
        ParseStrategy::Line
    }

    fn parse(&self, pages: &[PageText], file_name: &str) -> Result<ParseResult, ParseError> {
        ensure_pages(BANK, pages, file_name)?;
        let text = joined_text(pages);
        let account = self.account_info(&text);
        let period = period_or_fail(BANK, file_name, self.period(&text))?;

        let mut movements = Vec::new();
        let mut section: Option<MovementKind> = None;
        for line in text.lines().map(str::trim) {
            if let Some(caps) = self.section.captures(line) {
                let name = caps[1].to_uppercase();
                section = Some(if name.contains("DEPOSITO") || name.contains("DEPÓSITO") {
                    MovementKind::Deposit
                } else {
                    MovementKind::Withdrawal
                });
                continue;
            }
            let Some(kind) = section else {
                continue;
            };
            if SECTION_END.iter().any(|m| line.starts_with(m)) {
                section = None;
                continue;
            }
            movements.extend(self.movement(line, period.year(), kind, file_name)?);
        }

        let stated = self.totals.scan(&text);
        Ok(ParseResult::new(account, movements, Some(period), file_name, &stated))
    }
}
