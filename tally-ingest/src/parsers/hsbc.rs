//! HSBC Mexico statement parser (position, cipher-aware)
//!
//! The movements table follows its marker line; column edges come from the header row:
//!   DETALLE MOVIMIENTOS CUENTA INTEGRAL No. 4007185804
//!   Dia  Descripcion          Referencia/Serial   Retiro/Cargo   Deposito/Abono   Saldo
//!   03   PAGO TARJETA         13651011            1,250.00                        8,750.00
//!                             41234
//!
//! Statements reach this parser decoded by the pipeline; pages that still carry the glyph
//! cipher are decoded here first.

use regex::Regex;
use rust_decimal::Decimal;
use tally_core::dates::build_date;
use tally_core::types::joined_text;
use tally_core::{AccountInfo, Movement, PageText, ParseError, ParseResult, Period, TotalsScanner};
use tracing::debug;

use super::layout::{Band, Columns, Row, rows_by_tolerance};
use super::{BankParser, ParseStrategy, RowContext, currency_from, ensure_pages, period_or_fail};
use crate::cipher::CipherDecoder;

const BANK: &str = "HSBC";

const TABLE_MARKER: &str = "DETALLE MOVIMIENTOS CUENTA INTEGRAL";

const ROW_TOLERANCE: f64 = 4.0;
const HEADER_DEPTH: f64 = 30.0;
// the day column is two digits wide; descriptions start right after it
const DAY_WIDTH: f64 = 18.0;

const END_MARKERS: &[&str] = &[
    "CoDi",
    "Informacion",
    "Información",
    "Aclaraciones",
    "Promociones",
    "Mensajes",
    "Emitido",
];

const USD_MARKERS: &[&str] = &["USD", "DOLARES"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Day,
    Description,
    Reference,
    Withdrawal,
    Deposit,
    Balance,
}

const HEADER_KEYWORDS: &[(Column, &[&str])] = &[
    (Column::Day, &["Dia", "DUa", "Día"]),
    (Column::Description, &["Descripcion", "Descripción"]),
    (Column::Reference, &["Referencia", "Serial"]),
    (Column::Withdrawal, &["Retiro", "Cargo"]),
    (Column::Deposit, &["Deposito", "Depósito", "Abono"]),
    (Column::Balance, &["Saldo"]),
];

#[derive(Debug, Default)]
struct Pending {
    line: String,
    day: String,
    description: String,
    reference: String,
    withdrawal: String,
    deposit: String,
}

fn append(field: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !field.is_empty() {
        field.push(' ');
    }
    field.push_str(text);
}

fn as_day(text: &str) -> Option<u32> {
    if text.is_empty() || text.len() > 2 || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok().filter(|d| (1..=31).contains(d))
}

#[derive(Debug, Clone)]
pub struct HsbcParser {
    decoder: CipherDecoder,
    account_integral: Regex,
    account_number: Regex,
    period: Regex,
    totals: TotalsScanner,
}

impl HsbcParser {
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_decoder(CipherDecoder::default())
    }

    pub fn with_decoder(decoder: CipherDecoder) -> Result<Self, regex::Error> {
        Ok(Self {
            decoder,
            account_integral: Regex::new(r"CUENTA\s+INTEGRAL\s+No\.\s+(\d{10})")?,
            account_number: Regex::new(r"NUMERO\s+DE\s+CUENTA\s+.*?(\d{10})")?,
            period: Regex::new(r"(\d{2})/(\d{2})/(\d{4})\s+al\s+(\d{2})/(\d{2})/(\d{4})")?,
            totals: TotalsScanner::new()?,
        })
    }

    fn account_info(&self, text: &str) -> AccountInfo {
        let account = self
            .account_integral
            .captures(text)
            .or_else(|| self.account_number.captures(text))
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        let head: String = text.chars().take(3000).collect();
        AccountInfo::new(BANK, account, currency_from(&head, USD_MARKERS))
    }

    /// The closing date of `DD/MM/YYYY al DD/MM/YYYY` names the period.
    fn period(&self, text: &str) -> Option<(i32, u32)> {
        let caps = self.period.captures(text)?;
        Some((caps[6].parse().ok()?, caps[5].parse().ok()?))
    }

    /// Column bands and the header's vertical position, read from the words under the marker.
    fn detect_columns(rows: &[Row<'_>]) -> Option<(Vec<Band<Column>>, f64)> {
        let marker_top = rows
            .iter()
            .find(|r| {
                let text = r.text();
                text.contains("DETALLE") && text.contains("MOVIMIENTO")
            })?
            .top;

        let mut found: Vec<(Column, f64, f64)> = Vec::new();
        let header_words = rows
            .iter()
            .flat_map(|r| r.words.iter())
            .filter(|w| w.top > marker_top && w.top <= marker_top + HEADER_DEPTH);
        for word in header_words {
            let text = word.text.trim();
            for (column, keywords) in HEADER_KEYWORDS {
                if found.iter().any(|(c, _, _)| c == column) {
                    continue;
                }
                if keywords.iter().any(|k| text.contains(k)) {
                    found.push((*column, word.x0, word.top));
                    break;
                }
            }
        }

        let at = |column: Column| found.iter().find(|(c, _, _)| *c == column).map(|(_, x, top)| (*x, *top));
        let (day, _) = at(Column::Day)?;
        let (withdrawal, _) = at(Column::Withdrawal)?;
        let (deposit, _) = at(Column::Deposit)?;
        let (balance, header_top) = at(Column::Balance)?;
        let reference = at(Column::Reference).map_or(withdrawal - 80.0, |(x, _)| x);
        let description = day + DAY_WIDTH;

        let bands = vec![
            Band::new(Column::Day, day, description),
            Band::new(Column::Description, description, reference),
            Band::new(Column::Reference, reference, withdrawal),
            Band::new(Column::Withdrawal, withdrawal, deposit),
            Band::new(Column::Deposit, deposit, balance),
            Band::new(Column::Balance, balance, f64::INFINITY),
        ];
        Some((bands, header_top))
    }

    fn build(&self, pending: Pending, period: Period, file: &str) -> Result<Option<Movement>, ParseError> {
        let ctx = RowContext::new(BANK, file, &pending.line);
        if pending.description.is_empty() {
            return Ok(None);
        }
        let Some(day) = as_day(&pending.day) else {
            return Ok(None);
        };
        let date = match build_date(period.year(), period.month(), day, &pending.day) {
            Ok(date) => date,
            Err(e) => {
                debug!(file, error = %e, "skipping row with impossible day");
                return Ok(None);
            }
        };

        let amount = |text: &str| -> Result<Option<Decimal>, ParseError> {
            let cleaned: String = text.chars().filter(|c| *c != '$' && *c != ' ').collect();
            if cleaned.is_empty() {
                Ok(None)
            } else {
                ctx.amount(&cleaned).map(Some)
            }
        };
        let Some((kind, value)) = ctx.single_side(amount(&pending.withdrawal)?, amount(&pending.deposit)?)? else {
            return Ok(None);
        };

        let reference = pending.reference.split_whitespace().collect::<Vec<_>>().join(" ");
        ctx.movement(date, pending.description.clone(), reference, kind, value).map(Some)
    }

    fn page_movements(&self, page: &PageText, period: Period, file: &str) -> Result<Vec<Movement>, ParseError> {
        if !page.has_words() || !page.text.contains(TABLE_MARKER) {
            return Ok(Vec::new());
        }
        let rows = rows_by_tolerance(&page.words, ROW_TOLERANCE);
        let Some((bands, header_top)) = Self::detect_columns(&rows) else {
            debug!(file, page = page.page_number, "movement table header not found");
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        let mut current: Option<Pending> = None;
        for row in rows.iter().filter(|r| r.top > header_top + 5.0) {
            let line = row.text();
            if END_MARKERS.iter().any(|m| line.contains(m)) {
                break;
            }
            let cols = Columns::split(&row.words, &bands);
            let day = cols.get(Column::Day);

            if as_day(&day).is_some() {
                if let Some(done) = current.take() {
                    out.extend(self.build(done, period, file)?);
                }
                current = Some(Pending {
                    line,
                    day,
                    description: cols.get(Column::Description),
                    reference: cols.get(Column::Reference),
                    withdrawal: cols.get(Column::Withdrawal),
                    deposit: cols.get(Column::Deposit),
                });
            } else if let Some(p) = current.as_mut() {
                append(&mut p.reference, &cols.get(Column::Reference));
                append(&mut p.description, &cols.get(Column::Description));
                if p.withdrawal.is_empty() {
                    p.withdrawal = cols.get(Column::Withdrawal);
                }
                if p.deposit.is_empty() {
                    p.deposit = cols.get(Column::Deposit);
                }
            }
        }
        if let Some(done) = current.take() {
            out.extend(self.build(done, period, file)?);
        }
        Ok(out)
    }
}

impl BankParser for HsbcParser {
    fn bank(&self) -> &'static str {
        BANK
    }

    fn strategy(&self) -> ParseStrategy {
        ParseStrategy::Position
    }

    fn parse(&self, pages: &[PageText], file_name: &str) -> Result<ParseResult, ParseError> {
        ensure_pages(BANK, pages, file_name)?;
        if !pages.iter().any(PageText::has_words) {
            return Err(ParseError::new(
                BANK,
                file_name,
                "pages carry no word positions; HSBC columns are only told apart by position",
            ));
        }

        let decoded: Vec<PageText> = pages.iter().map(|p| self.decoder.decode_page(p.clone()).0).collect();
        let text = joined_text(&decoded);
        let account = self.account_info(&text);
        let period = period_or_fail(BANK, file_name, self.period(&text))?;

        let mut movements = Vec::new();
        for page in &decoded {
            movements.extend(self.page_movements(page, period, file_name)?);
        }

        let stated = self.totals.scan(&text);
        Ok(ParseResult::new(account, movements, Some(period), file_name, &stated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::CipherTable;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::str::FromStr;
    use tally_core::{MovementKind, Word};

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn word(t: &str, x0: f64, top: f64) -> Word {
        Word::new(t, x0, x0 + 5.0 * t.chars().count() as f64, top, top + 8.0)
    }

    const TEXT: &str = "HSBC MEXICO\nPeriodo del 01/11/2025 al 30/11/2025\nDETALLE MOVIMIENTOS CUENTA INTEGRAL No. 4007185804";

    fn page() -> PageText {
        let words = vec![
            word("DETALLE", 20.0, 100.0),
            word("MOVIMIENTOS", 70.0, 100.0),
            word("CUENTA", 150.0, 100.0),
            word("INTEGRAL", 190.0, 100.0),
            word("Dia", 40.0, 115.0),
            word("Descripcion", 140.0, 115.0),
            word("Referencia", 300.0, 115.0),
            word("Retiro/Cargo", 380.0, 115.0),
            word("Deposito/Abono", 450.0, 115.0),
            word("Saldo", 530.0, 115.0),
            word("03", 42.0, 130.0),
            word("PAGO", 62.0, 130.0),
            word("TARJETA", 90.0, 130.0),
            word("13651011", 305.0, 130.0),
            word("1,250.00", 390.0, 130.0),
            word("8,750.00", 540.0, 130.0),
            word("41234", 310.0, 142.0),
            word("05", 42.0, 160.0),
            word("DEPOSITO", 62.0, 160.0),
            word("SPEI", 110.0, 160.0),
            word("500.00", 460.0, 160.0),
            word("9,250.00", 540.0, 160.0),
            word("Aclaraciones", 20.0, 180.0),
            word("07", 42.0, 195.0),
            word("NO", 62.0, 195.0),
            word("99.00", 390.0, 195.0),
        ];
        PageText::with_words(1, TEXT, words)
    }

    fn encode(text: &str) -> String {
        let table = CipherTable::hsbc();
        let inverse: HashMap<&str, &str> = table.entries().map(|(from, to)| (to, from)).collect();
        let mut out = String::new();
        for ch in text.chars() {
            let s = ch.to_string();
            out.push_str(inverse.get(s.as_str()).copied().unwrap_or(s.as_str()));
        }
        out
    }

    #[test]
    fn columns_from_header() {
        let result = HsbcParser::new().unwrap().parse(&[page()], "nov.pdf").unwrap();
        assert_eq!(result.account.account, "4007185804");
        assert_eq!(result.period, Period::new(2025, 11));

        let m = result.movements();
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].date, NaiveDate::from_ymd_opt(2025, 11, 3).unwrap());
        assert_eq!(m[0].concept, "PAGO TARJETA");
        assert_eq!(m[0].reference, "13651011 41234");
        assert_eq!(m[0].withdrawal_amount(), d("1250.00"));
        assert_eq!(m[1].kind(), MovementKind::Deposit);
        assert_eq!(m[1].deposit_amount(), d("500.00"));
    }

    #[test]
    fn still_encoded_pages_are_decoded_first() {
        let plain = page();
        let encoded = PageText::with_words(
            1,
            encode(&plain.text),
            plain.words.iter().map(|w| w.with_text(encode(&w.text))).collect(),
        );
        assert!(encoded.text.contains("(cid:"));

        let parser = HsbcParser::new().unwrap();
        let a = parser.parse(&[plain], "nov.pdf").unwrap();
        let b = parser.parse(&[encoded], "nov.pdf").unwrap();
        assert_eq!(a.movements(), b.movements());
        assert_eq!(b.account.account, "4007185804");
    }

    #[test]
    fn period_is_required() {
        let page = PageText::with_words(1, "HSBC", vec![word("HSBC", 10.0, 10.0)]);
        let err = HsbcParser::new().unwrap().parse(&[page], "x.pdf").unwrap_err();
        assert_eq!(err.bank, "HSBC");
    }
}
