//! Santander Mexico statement parser (line)
//!
//! Every movement opens with its full date and folio; the lines after it carry the
//! counterparty details until the next date:
//!   01-ABR-2025 5635768 ABONO TRANSFERENCIA SPEI HORA 09:58:31  51,451.13  2,744,700.76
//!               RECIBIDO DE BAJIO
//!               CLAVE DE RASTREO BB1029312020788
//!
//! Some files carry two overprinted text layers (`RREECCIIBBIIDDOO`); those lines are
//! collapsed before matching.

use regex::Regex;
use rust_decimal::Decimal;
use tally_core::dates::build_date;
use tally_core::month::month_number;
use tally_core::text::{clean_whitespace, collapse_doubled_chars, looks_doubled};
use tally_core::types::joined_text;
use tally_core::{AccountInfo, Movement, MovementKind, PageText, ParseError, ParseResult, TotalsScanner};
use tracing::debug;

use super::{BankParser, ParseStrategy, RowContext, contains_any, currency_from, ensure_pages, period_or_fail};

const BANK: &str = "SANTANDER";

const DEPOSIT_KEYWORDS: &[&str] = &["ABONO", "DEPOSITO", "DEPÓSITO", "RECIBID", "DEVOLUCION", "DEVOLUCIÓN"];

const USD_MARKERS: &[&str] = &["USD", "DOLARES", "DÓLARES"];

#[derive(Debug, Clone)]
pub struct SantanderParser {
    row: Regex,
    money: Regex,
    account: Regex,
    noise: Vec<Regex>,
    periods: Vec<Regex>,
    first_row: Regex,
    any_year: Regex,
    totals: TotalsScanner,
}

/// A dated line and the continuation lines gathered under it.
#[derive(Debug)]
struct Block {
    line: String,
    continuation: Vec<String>,
}

impl SantanderParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            row: Regex::new(r"^(\d{1,2})-([A-Z]{3})-(\d{4})\s*(\d+)(.*)")?,
            money: Regex::new(r"[\d,]+\.\d{2}")?,
            account: Regex::new(r"(?:^|\D)(\d{2}-\d{8}-\d)(?:\D|$)")?,
            noise: vec![
                Regex::new(r"(?i)^p[áa]gina\s*\d+")?,
                Regex::new(r"(?i)^pgina\s*\d+")?,
                Regex::new(r"(?i)^p\s+gina\s*\d+")?,
                Regex::new(r"^\s*-{3,}\s*$")?,
                Regex::new(r"^\d+\s*$")?,
                Regex::new(r"P-P\s+\d+")?,
                Regex::new(r"^FECHA\s+FOLIO\s+DESCRIPCION")?,
                Regex::new(r"^ESTADO DE CUENTA")?,
                Regex::new(r"^Banco Santander")?,
                Regex::new(r"^Institucin|^Grupo Financiero")?,
                Regex::new(r"^PRADERAS|^PERIODO DEL|^CODIGO DE CLIENTE")?,
                Regex::new(r"(?i)^TOTAL\s")?,
                Regex::new(r"(?i)SALDO FINAL")?,
                Regex::new(r"(?i)Significado de abreviaturas")?,
                Regex::new(r"(?i)Detalles de movimientos")?,
                Regex::new(r"(?i)INVERSION CRECIENTE")?,
            ],
            periods: vec![
                Regex::new(r"[Pp]eriodo.*?(\d{1,2})[/-]([A-Za-z]{3})[/-](\d{4})")?,
                Regex::new(r"[Ff]echa\s+de\s+[Cc]orte.*?(\d{1,2})[/-]([A-Za-z]{3})[/-](\d{4})")?,
                Regex::new(r"[Cc]orte.*?(\d{1,2})[/-]([A-Za-z]{3})[/-](\d{4})")?,
            ],
            first_row: Regex::new(r"(?m)^(\d{1,2})-([A-Z]{3})-(\d{4})\s*\d+")?,
            any_year: Regex::new(r"20(\d{2})")?,
            totals: TotalsScanner::new()?,
        })
    }

    fn account_info(&self, first_page: &str) -> AccountInfo {
        let account = self
            .account
            .captures(first_page)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        AccountInfo::new(BANK, account, currency_from(first_page, USD_MARKERS))
    }

    /// Header patterns, then the first movement's date, then any `20YY` in January.
    fn period(&self, text: &str) -> Option<(i32, u32)> {
        let dated = self.periods.iter().chain(std::iter::once(&self.first_row));
        for re in dated {
            let Some(caps) = re.captures(text) else {
                continue;
            };
            if let (Ok(month), Ok(year)) = (month_number(&caps[2]), caps[3].parse::<i32>()) {
                return Some((year, month));
            }
        }
        let caps = self.any_year.captures(text)?;
        Some((2000 + caps[1].parse::<i32>().ok()?, 1))
    }

    fn is_continuation(&self, line: &str) -> bool {
        !self.noise.iter().any(|re| re.is_match(line))
    }

    fn blocks(&self, page: &PageText) -> Vec<Block> {
        let mut blocks: Vec<Block> = Vec::new();
        for raw in page.lines() {
            let mut line = raw.trim().to_string();
            if line.is_empty() {
                continue;
            }
            if looks_doubled(&line) {
                line = collapse_doubled_chars(&line);
            }
            if self.row.is_match(&line) {
                blocks.push(Block { line, continuation: Vec::new() });
            } else if let Some(block) = blocks.last_mut().filter(|_| self.is_continuation(&line)) {
                block.continuation.push(line);
            }
        }
        blocks
    }

    fn movement(&self, block: &Block, file: &str) -> Result<Option<Movement>, ParseError> {
        let Some(caps) = self.row.captures(&block.line) else {
            return Ok(None);
        };
        let ctx = RowContext::new(BANK, file, &block.line);

        let date = match (caps[1].parse::<u32>(), month_number(&caps[2]), caps[3].parse::<i32>()) {
            (Ok(day), Ok(month), Ok(year)) => build_date(year, month, day, &block.line).ok(),
            _ => None,
        };
        let Some(date) = date else {
            debug!(file, line = %block.line, "skipping row with unreadable date");
            return Ok(None);
        };
        let folio = caps[4].to_string();
        let rest = caps[5].trim();

        let amounts: Vec<&str> = self.money.find_iter(rest).map(|m| m.as_str()).collect();
        if amounts.len() < 2 {
            return Ok(None);
        }
        let mut concept = rest.to_string();
        for amount in &amounts {
            concept = concept.replace(*amount, "");
        }
        let mut concept = clean_whitespace(&concept);
        if !block.continuation.is_empty() {
            let extra: Vec<String> = block.continuation.iter().map(|l| clean_whitespace(l)).collect();
            concept = format!("{concept} | {}", extra.join(" | "));
        }

        // `ABONO POR PAGO DE ... 0.00 <amount> <balance>`: the first column is a zero tax line
        let mut value = ctx.amount(amounts[0])?;
        if value.is_zero() && amounts.len() >= 3 {
            value = ctx.amount(amounts[1])?;
        }
        if value <= Decimal::ZERO {
            return Ok(None);
        }

        let kind = if contains_any(&concept.to_uppercase(), DEPOSIT_KEYWORDS) {
            MovementKind::Deposit
        } else {
            MovementKind::Withdrawal
        };
        ctx.movement(date, concept, folio, kind, value).map(Some)
    }
}

impl BankParser for SantanderParser {
    fn bank(&self) -> &'static str {
        BANK
    }

    fn strategy(&self) -> ParseStrategy {
        ParseStrategy::Line
    }

    fn parse(&self, pages: &[PageText], file_name: &str) -> Result<ParseResult, ParseError> {
        ensure_pages(BANK, pages, file_name)?;
        let account = self.account_info(&pages[0].text);
        let head = joined_text(&pages[..pages.len().min(2)]);
        let period = period_or_fail(BANK, file_name, self.period(&head))?;

        let mut movements = Vec::new();
        for page in pages {
            for block in self.blocks(page) {
                movements.extend(self.movement(&block, file_name)?);
            }
        }

        let stated = self.totals.scan(&joined_text(pages));
        Ok(ParseResult::new(account, movements, Some(period), file_name, &stated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;
    use tally_core::Period;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn parse(text: &str) -> ParseResult {
        SantanderParser::new()
            .unwrap()
            .parse(&[PageText::new(1, text)], "santander.pdf")
            .unwrap()
    }

    #[test]
    fn rows_with_continuation() {
        let result = parse(concat!(
            "Banco Santander Mexico\n",
            "CUENTA 65-50123456-7\n",
            "PERIODO DEL 01-ABR-2025 AL 30-ABR-2025\n",
            "01-ABR-2025 5635768 ABONO TRANSFERENCIA SPEI  51,451.13  2,744,700.76\n",
            "RECIBIDO DE BAJIO\n",
            "Pagina 2 de 16\n",
            "CLAVE DE RASTREO BB1029312020788\n",
            "03-ABR-2025 5635801 PAGO PROVEEDOR  1,200.00  2,743,500.76\n",
        ));
        assert_eq!(result.account.account, "65-50123456-7");
        assert_eq!(result.period, Period::new(2025, 4));

        let m = result.movements();
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].date, NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
        assert_eq!(m[0].reference, "5635768");
        assert_eq!(
            m[0].concept,
            "ABONO TRANSFERENCIA SPEI | RECIBIDO DE BAJIO | CLAVE DE RASTREO BB1029312020788"
        );
        assert_eq!(m[0].deposit_amount(), d("51451.13"));
        assert_eq!(m[1].kind(), MovementKind::Withdrawal);
        assert_eq!(m[1].withdrawal_amount(), d("1200.00"));
    }

    #[test]
    fn zero_first_amount_uses_the_second() {
        let result = parse("02-MAY-2025 100 ABONO POR PAGO DE INTERESES 0.00 35.50 1,035.50\n");
        assert_eq!(result.movements()[0].deposit_amount(), d("35.50"));
        assert_eq!(result.period, Period::new(2025, 5));
    }

    #[test]
    fn doubled_lines_are_collapsed() {
        let result = parse(concat!(
            "PERIODO 01-JUN-2025\n",
            "0055--JJUUNN--22002255  77889900  PPAAGGOO  225500..0000  11,,000000..0000\n",
        ));
        let m = result.movements();
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].date, NaiveDate::from_ymd_opt(2025, 6, 5).unwrap());
        assert_eq!(m[0].withdrawal_amount(), d("250.00"));
        assert_eq!(m[0].reference, "7890");
    }

    #[test]
    fn single_amount_rows_are_not_movements() {
        let result = parse("PERIODO 01-JUN-2025\n05-JUN-2025 7890 SALDO 250.00\n");
        assert!(result.movements().is_empty());
    }

    #[test]
    fn year_only_falls_back_to_january() {
        let result = parse("Estado 2024\n");
        assert_eq!(result.period, Period::new(2024, 1));
    }
}
