//! BBVA Mexico statement parser (position, with a line fallback)
//!
//! Movement table as laid out on the page:
//!   OPER    LIQ     DESCRIPCION                        CARGOS     ABONOS    SALDO
//!   01/MAR  01/MAR  SPEI ENVIADO BANORTE               1,500.00             8,500.00
//!                   0012345CLIENTE
//!                   Ref. 0012345
//!
//! Cargos and abonos are told apart only by column, so rows are rebuilt from word boxes.
//! Pages without boxes (fixtures, plain-text dumps) are read line by line instead:
//!   01/MAR  PAGO TARJETA  REF123  $1,250.00

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use tally_core::dates::parse_bank_date;
use tally_core::money::is_money_string;
use tally_core::month::month_number;
use tally_core::types::joined_text;
use tally_core::{
    AccountInfo, Movement, MovementKind, PageText, ParseError, ParseResult, TotalsScanner,
};
use tracing::debug;

use super::layout::rows_by_rounded_top;
use super::{BankParser, ParseStrategy, RowContext, contains_any, currency_from, ensure_pages, period_or_fail};

const BANK: &str = "BBVA";

const X_WITHDRAWAL_MAX: f64 = 400.0;
const X_DEPOSIT_MAX: f64 = 470.0;

// lower-cased header/footer lines that never continue a concept
const SKIP: &[&str] = &[
    "bbva bancomer, s.a.",
    "bbva méxico, s.a.",
    "bbva mexico, s.a.",
    "institucion de banca multiple",
    "paseo de la reforma",
    "estado de cuenta",
    "pagina",
    "no. cuenta",
    "no. cliente",
    "grupo financiero",
    "fecha de corte",
];

const DEPOSIT_KEYWORDS: &[&str] = &[
    "DEPOSITO",
    "DEPÓSITO",
    "ABONO",
    "RECIBIDO",
    "DEVOLUCION",
    "DEVOLUCIÓN",
    "INTERESES",
    "BONIFICACION",
];

const USD_MARKERS: &[&str] = &["USD", "DOLAR", "DOLLAR"];

#[derive(Debug)]
struct Pending {
    line: String,
    date: NaiveDate,
    concept: String,
    reference: String,
    kind: MovementKind,
    value: Decimal,
}

#[derive(Debug, Clone)]
pub struct BbvaParser {
    row: Regex,
    reference: Regex,
    bare_amount: Regex,
    grouped_amount: Regex,
    inline_amount: Regex,
    leading_date: Regex,
    accounts: Vec<Regex>,
    periods: Vec<Regex>,
    any_year: Regex,
    any_month: Regex,
    totals: TotalsScanner,
}

fn looks_like_reference(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit()) && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl BbvaParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            row: Regex::new(r"^(\d{2}/[A-Z]{3})\s+(.+)")?,
            reference: Regex::new(r"Ref\.\s*([A-Z]*:?\s*[\w-]+)")?,
            bare_amount: Regex::new(r"^\d+\.\d{2}$")?,
            grouped_amount: Regex::new(r"^\d{1,3}(,\d{3})*\.\d{2}$")?,
            inline_amount: Regex::new(r"\$?\b\d[\d,]*\.\d{2}\b")?,
            leading_date: Regex::new(r"^\d{2}/[A-Z]{3}\s*")?,
            accounts: vec![
                Regex::new(r"(?i)(?:Cuenta|No\.\s*de\s*Cuenta)[:\s]+(\d+)")?,
                Regex::new(r"(?i)No\.\s*Cuenta\s+(\d+)")?,
                Regex::new(r"(?i)CUENTA\s+(\d{8,})")?,
            ],
            periods: vec![
                Regex::new(concat!(
                    r"(?i)(?:Periodo|Per[ií]odo)[:\s]+\d{1,2}\s*[/\s]\s*",
                    r"([A-Za-z]{3,})\s*[/\s]\s*(\d{4})"
                ))?,
                Regex::new(r"(?i)del?\s+\d{1,2}\s+de\s+([A-Za-z]+)\s+.*?(\d{4})")?,
                Regex::new(r"(?i)fecha\s+de\s+corte[:\s]+\d{1,2}[/\s]([A-Za-z]{3,})[/\s](\d{4})")?,
                Regex::new(r"(?i)corte\s+al?\s+\d{1,2}\s+de\s+([A-Za-z]+)\s+de\s+(\d{4})")?,
                Regex::new(r"(?i)(?:corte|periodo)[:\s]+\d{1,2}/(\d{2})/(\d{4})")?,
            ],
            any_year: Regex::new(r"20(\d{2})")?,
            any_month: Regex::new(r"\d{1,2}[/\s]([A-Za-z]{3})")?,
            totals: TotalsScanner::new()?,
        })
    }

    fn account_info(&self, text: &str) -> AccountInfo {
        let account = self
            .accounts
            .iter()
            .find_map(|re| re.captures(text).map(|c| c[1].to_string()))
            .unwrap_or_default();
        AccountInfo::new(BANK, account, currency_from(text, USD_MARKERS))
    }

    fn period(&self, text: &str) -> Option<(i32, u32)> {
        for re in &self.periods {
            let Some(caps) = re.captures(text) else {
                continue;
            };
            let month = if caps[1].chars().all(|c| c.is_ascii_digit()) {
                caps[1].parse().ok()
            } else {
                month_number(&caps[1]).ok()
            };
            if let (Ok(year), Some(month)) = (caps[2].parse::<i32>(), month) {
                return Some((year, month));
            }
        }

        let year = 2000 + self.any_year.captures(text)?[1].parse::<i32>().ok()?;
        let month = self
            .any_month
            .captures_iter(text)
            .find_map(|c| month_number(&c[1]).ok())
            .unwrap_or(1);
        Some((year, month))
    }

    fn clean_concept(&self, concept: &str) -> String {
        let without_date = self.leading_date.replace(concept, "");
        let without_amounts = self.inline_amount.replace_all(&without_date, " ");
        without_amounts.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn is_skip(line: &str) -> bool {
        let lower = line.to_lowercase();
        SKIP.iter().any(|s| lower.contains(s))
    }

    /// Split a `Ref.` line into the text before the marker and the reference itself.
    fn split_reference<'a>(&self, line: &'a str) -> Option<(&'a str, String)> {
        let caps = self.reference.captures(line)?;
        let start = caps.get(0).map_or(0, |m| m.start());
        Some((line[..start].trim(), caps[1].trim().to_string()))
    }

    fn position_movements(&self, page: &PageText, year: i32, file: &str) -> Result<Vec<Movement>, ParseError> {
        let rows = rows_by_rounded_top(&page.words, 0.1);
        let texts: Vec<String> = rows.iter().map(|r| r.text()).collect();
        let mut out = Vec::new();

        for (i, row) in rows.iter().enumerate() {
            let line = texts[i].as_str();
            let Some(caps) = self.row.captures(line) else {
                continue;
            };
            let ctx = RowContext::new(BANK, file, line);

            let mut withdrawal = None;
            let mut deposit = None;
            for word in &row.words {
                if !self.bare_amount.is_match(&word.text.replace(',', "")) {
                    continue;
                }
                let value = ctx.amount(&word.text)?;
                if value.is_zero() {
                    continue;
                }
                if word.x0 < X_WITHDRAWAL_MAX {
                    withdrawal.get_or_insert(value);
                } else if word.x0 < X_DEPOSIT_MAX {
                    deposit.get_or_insert(value);
                }
            }
            let Some((kind, value)) = ctx.single_side(withdrawal, deposit)? else {
                continue;
            };
            let date = match parse_bank_date(&caps[1], Some(year), None) {
                Ok(date) => date,
                Err(e) => {
                    debug!(file, line, error = %e, "skipping row with unreadable date");
                    continue;
                }
            };

            let mut concept = self.clean_concept(&caps[2]);
            let mut reference = String::new();
            for next in &texts[i + 1..] {
                if Self::is_skip(next) {
                    continue;
                }
                if self.row.is_match(next) {
                    break;
                }
                if let Some((before, found)) = self.split_reference(next) {
                    if !before.is_empty() && !before.to_uppercase().starts_with("REF:") {
                        concept.push(' ');
                        concept.push_str(before);
                    }
                    reference = found;
                    break;
                }
                if next.split_whitespace().any(|t| self.grouped_amount.is_match(t)) {
                    continue;
                }
                concept.push(' ');
                concept.push_str(next);
            }

            out.push(ctx.movement(date, self.clean_concept(&concept), reference, kind, value)?);
        }
        Ok(out)
    }

    fn line_row(&self, line: &str, year: i32, file: &str) -> Result<Option<Pending>, ParseError> {
        let Some(caps) = self.row.captures(line) else {
            return Ok(None);
        };
        let mut tokens: Vec<&str> = caps.get(2).map_or("", |m| m.as_str()).split_whitespace().collect();
        let mut amounts = Vec::new();
        while let Some(last) = tokens.last().copied() {
            // a bare `$` belongs to the amount printed after it
            if last == "$" && !amounts.is_empty() {
                tokens.pop();
                continue;
            }
            if !(last.starts_with('$') || is_money_string(last)) {
                break;
            }
            amounts.push(last);
            tokens.pop();
        }
        // the first printed amount is the movement; a second one is the running balance
        let Some(first) = amounts.last().copied() else {
            return Ok(None);
        };
        let ctx = RowContext::new(BANK, file, line);
        for token in &amounts {
            ctx.amount(token)?;
        }
        let value = ctx.amount(first)?;
        if value <= Decimal::ZERO {
            return Ok(None);
        }
        let date = match parse_bank_date(&caps[1], Some(year), None) {
            Ok(date) => date,
            Err(e) => {
                debug!(file, line, error = %e, "skipping row with unreadable date");
                return Ok(None);
            }
        };

        let reference = match tokens.last() {
            Some(last) if tokens.len() > 1 && looks_like_reference(last) => tokens.pop().unwrap_or_default(),
            _ => "",
        };
        let concept = self.clean_concept(&tokens.join(" "));
        let kind = if contains_any(&concept.to_uppercase(), DEPOSIT_KEYWORDS) {
            MovementKind::Deposit
        } else {
            MovementKind::Withdrawal
        };
        Ok(Some(Pending {
            line: line.to_string(),
            date,
            concept,
            reference: reference.to_string(),
            kind,
            value,
        }))
    }

    fn flush(pending: &mut Option<Pending>, out: &mut Vec<Movement>, file: &str) -> Result<(), ParseError> {
        if let Some(p) = pending.take() {
            let ctx = RowContext::new(BANK, file, &p.line);
            out.push(ctx.movement(p.date, p.concept, p.reference, p.kind, p.value)?);
        }
        Ok(())
    }

    fn line_movements(&self, page: &PageText, year: i32, file: &str) -> Result<Vec<Movement>, ParseError> {
        let mut out = Vec::new();
        let mut pending: Option<Pending> = None;

        for raw in page.lines() {
            let line = raw.trim();
            if line.is_empty() {
                Self::flush(&mut pending, &mut out, file)?;
                continue;
            }
            if Self::is_skip(line) {
                continue;
            }
            if self.row.is_match(line) {
                Self::flush(&mut pending, &mut out, file)?;
                pending = self.line_row(line, year, file)?;
                continue;
            }
            let Some(current) = pending.as_mut() else {
                continue;
            };
            if let Some((before, found)) = self.split_reference(line) {
                if !before.is_empty() && !before.to_uppercase().starts_with("REF:") {
                    current.concept = format!("{} {before}", current.concept);
                }
                current.reference = found;
                Self::flush(&mut pending, &mut out, file)?;
                continue;
            }
            if line.split_whitespace().any(is_money_string) {
                Self::flush(&mut pending, &mut out, file)?;
                continue;
            }
            current.concept = format!("{} {line}", current.concept);
        }
        Self::flush(&mut pending, &mut out, file)?;
        Ok(out)
    }
}

impl BankParser for BbvaParser {
    fn bank(&self) -> &'static str {
        BANK
    }

    fn strategy(&self) -> ParseStrategy {
        ParseStrategy::Position
    }

    fn parse(&self, pages: &[PageText], file_name: &str) -> Result<ParseResult, ParseError> {
        ensure_pages(BANK, pages, file_name)?;
        let head = joined_text(&pages[..pages.len().min(2)]);
        let account = self.account_info(&head);
        let period = period_or_fail(BANK, file_name, self.period(&head))?;

        let mut movements = Vec::new();
        for page in pages {
            let found = if page.has_words() {
                self.position_movements(page, period.year(), file_name)?
            } else {
                self.line_movements(page, period.year(), file_name)?
            };
            movements.extend(found);
        }

        let stated = self.totals.scan(&joined_text(pages));
        Ok(ParseResult::new(account, movements, Some(period), file_name, &stated))
    }
}
