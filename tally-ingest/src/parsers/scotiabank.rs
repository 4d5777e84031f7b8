//! Scotiabank Mexico statement parser (line)
//!
//! Only the "Detalle de tus movimientos" section is read. Rows print day and month only;
//! a concept spans several lines and closes once amount and balance have both appeared:
//!   05 MAR  TRANSF INTERBANCARIA SPEI
//!           ORDENANTE EMPRESA SA 0123456789012
//!           $15,000.00  $45,210.33

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use tally_core::dates::build_date;
use tally_core::month::month_number;
use tally_core::text::clean_whitespace;
use tally_core::types::joined_text;
use tally_core::{AccountInfo, Movement, MovementKind, PageText, ParseError, ParseResult, TotalsScanner};
use tracing::debug;

use super::{BankParser, ParseStrategy, RowContext, contains_any, currency_from, ensure_pages, period_or_fail};

const BANK: &str = "SCOTIABANK";

const MAX_CONCEPT_LINES: usize = 15;

const SECTION_MARKERS: &[&str] = &[
    "Detalledetusmovimientos",
    "Detalle de tus movimientos",
    "Fecha Concepto Origen",
];

const SKIP_LINES: &[&str] = &[
    "Fecha Concepto Origen",
    "PAGINA",
    "Producto No.de",
    "Para los efectos",
    "Scotiabank Inverlat",
];

// received phrases outrank the generic PAGO withdrawal keyword
const RECEIVED: &[&str] = &["PAGO RECIBIDO", "TRANSFERENCIA RECIBIDA"];

const WITHDRAWAL_KEYWORDS: &[&str] = &[
    "SEL TRASPASO ENTRE CUENTAS",
    "SEL TRANSF. INTERBANCARIA SPEI",
    "TRASPASOS A OTROS BANCOS",
    "COBRO DE COMISION",
    "IVA POR COMISIONES",
    "IVA - COMISIONES",
    "IVA COMISION",
    "IVA COMISIÓN",
    "RETIRO",
    "PAGO",
    "APERTURA CONTRATO",
    "CARGO",
    "OPERACION MT101",
    "COMISION MT101",
    "COMISIÓN MT101",
];

const DEPOSIT_KEYWORDS: &[&str] = &[
    "CANCELACION DEPOSITO A PLAZO",
    "TRANSF INTERBANCARIA SPEI",
    "ABONO",
    "DEPOSITO",
    "DEPÓSITO",
    "CREDITO",
    "CRÉDITO",
];

const USD_MARKERS: &[&str] = &["USD", "DOLARES", "DÓLARES"];

fn kind_of(concept: &str) -> MovementKind {
    let upper = concept.to_uppercase();
    if contains_any(&upper, RECEIVED) {
        MovementKind::Deposit
    } else if contains_any(&upper, WITHDRAWAL_KEYWORDS) {
        MovementKind::Withdrawal
    } else if contains_any(&upper, DEPOSIT_KEYWORDS) {
        MovementKind::Deposit
    } else {
        MovementKind::Withdrawal
    }
}

#[derive(Debug, Clone)]
pub struct ScotiabankParser {
    row: Regex,
    money: Regex,
    leading_date: Regex,
    account: Regex,
    reference: Regex,
    period: Regex,
    any_year: Regex,
    totals: TotalsScanner,
}

impl ScotiabankParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            row: Regex::new(r"^(\d{2})\s+([A-Z]{3})\b")?,
            money: Regex::new(r"\$([\d,]+\.\d{2})")?,
            leading_date: Regex::new(r"^\d{2}\s+[A-Z]{3}\s+")?,
            account: Regex::new(r"(?i)cuenta\s+(\d+)")?,
            reference: Regex::new(r"\b(\d{10,})\b")?,
            period: Regex::new(r"(\d{2})-([A-Z]{3})-(\d{2})")?,
            any_year: Regex::new(r"20(\d{2})")?,
            totals: TotalsScanner::new()?,
        })
    }

    /// Account numbers embedded in a barcode run long; the account is digits 4..15.
    fn account_info(&self, first_page: &str) -> AccountInfo {
        let account = self
            .account
            .captures(first_page)
            .map(|c| {
                let raw = &c[1];
                if raw.len() > 15 { raw[4..15].to_string() } else { raw.to_string() }
            })
            .unwrap_or_default();
        AccountInfo::new(BANK, account, currency_from(first_page, USD_MARKERS))
    }

    /// The last `DD-MMM-YY` on the first page closes the period.
    fn period(&self, first_page: &str) -> Option<(i32, u32)> {
        let last = self.period.captures_iter(first_page).last();
        if let Some(caps) = last {
            if let (Ok(month), Ok(yy)) = (month_number(&caps[2]), caps[3].parse::<i32>()) {
                return Some((2000 + yy, month));
            }
        }
        let caps = self.any_year.captures(first_page)?;
        Some((2000 + caps[1].parse::<i32>().ok()?, 1))
    }

    fn is_skip(line: &str) -> bool {
        SKIP_LINES.iter().any(|s| line.contains(s))
    }

    fn row_date(&self, line: &str, year: i32) -> Option<NaiveDate> {
        let caps = self.row.captures(line)?;
        let day = caps[1].parse().ok()?;
        let month = month_number(&caps[2]).ok()?;
        build_date(year, month, day, line).ok()
    }

    fn page_movements(&self, page: &PageText, year: i32, file: &str) -> Result<Vec<Movement>, ParseError> {
        let lines: Vec<&str> = page.lines().map(str::trim).collect();
        let mut out = Vec::new();
        let mut in_section = false;
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            i += 1;
            if SECTION_MARKERS.iter().any(|m| line.contains(m)) {
                in_section = true;
                continue;
            }
            if !in_section || line.is_empty() || Self::is_skip(line) || !self.row.is_match(line) {
                continue;
            }
            let Some(date) = self.row_date(line, year) else {
                debug!(file, line, "skipping row with unreadable date");
                continue;
            };

            let mut block = vec![line];
            let mut added = 0;
            while i < lines.len() && added < MAX_CONCEPT_LINES {
                let next = lines[i];
                if self.row.is_match(next) {
                    break;
                }
                if next.is_empty() {
                    i += 1;
                    continue;
                }
                if Self::is_skip(next) {
                    break;
                }
                block.push(next);
                added += 1;
                i += 1;
                if self.money.find_iter(&block.join(" ")).count() >= 2 {
                    break;
                }
            }
            out.extend(self.movement(date, &block, file)?);
        }
        Ok(out)
    }

    fn movement(&self, date: NaiveDate, block: &[&str], file: &str) -> Result<Option<Movement>, ParseError> {
        let full = block.join(" ");
        let ctx = RowContext::new(BANK, file, block[0]);
        let concept = self.leading_date.replace(&full, "").trim().to_string();

        let mut value = None;
        for caps in self.money.captures_iter(&full) {
            let amount = ctx.amount(&caps[1])?;
            if amount > Decimal::ZERO {
                value = Some(amount);
                break;
            }
        }
        let Some(value) = value else {
            return Ok(None);
        };

        let reference = self
            .reference
            .captures(&concept)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        let kind = kind_of(&concept);
        let cleaned = clean_whitespace(&self.money.replace_all(&concept, "").replace('$', ""));
        ctx.movement(date, cleaned, reference, kind, value).map(Some)
    }
}

impl BankParser for ScotiabankParser {
    fn bank(&self) -> &'static str {
        BANK
    }

    fn strategy(&self) -> ParseStrategy {
        ParseStrategy::Line
    }

    fn parse(&self, pages: &[PageText], file_name: &str) -> Result<ParseResult, ParseError> {
        ensure_pages(BANK, pages, file_name)?;
        let first = &pages[0].text;
        let account = self.account_info(first);
        let period = period_or_fail(BANK, file_name, self.period(first))?;

        let mut movements = Vec::new();
        for page in pages {
            movements.extend(self.page_movements(page, period.year(), file_name)?);
        }

        let stated = self.totals.scan(&joined_text(pages));
        Ok(ParseResult::new(account, movements, Some(period), file_name, &stated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tally_core::Period;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    const STATEMENT: &str = concat!(
        "Scotiabank Inverlat S.A.\n",
        "Cuenta 04401234567\n",
        "Periodo 01-MAR-24 al 31-MAR-24\n",
        "05 MAR DEPOSITO QUE NO ES MOVIMIENTO $1.00\n",
        "Detalle de tus movimientos\n",
        "Fecha Concepto Origen\n",
        "05 MAR TRANSF INTERBANCARIA SPEI\n",
        "ORDENANTE EMPRESA SA 0123456789012\n",
        "$15,000.00 $45,210.33\n",
        "\n",
        "08 MAR PAGO RECIBIDO CLIENTE\n",
        "$2,000.00 $47,210.33\n",
        "12 MAR COBRO DE COMISION\n",
        "$0.00 $150.00 $47,060.33\n",
        "PAGINA 2 DE 3\n",
        "14 MAR SEL TRASPASO ENTRE CUENTAS $500.00 $46,560.33\n",
    );

    fn parse() -> ParseResult {
        ScotiabankParser::new()
            .unwrap()
            .parse(&[PageText::new(1, STATEMENT)], "scotia.pdf")
            .unwrap()
    }

    #[test]
    fn section_rows() {
        let result = parse();
        assert_eq!(result.period, Period::new(2024, 3));
        assert_eq!(result.account.account, "04401234567");

        let m = result.movements();
        assert_eq!(m.len(), 4);
        assert_eq!(m[0].concept, "TRANSF INTERBANCARIA SPEI ORDENANTE EMPRESA SA 0123456789012");
        assert_eq!(m[0].reference, "0123456789012");
        assert_eq!(m[0].deposit_amount(), d("15000.00"));
        assert_eq!(m[1].kind(), MovementKind::Deposit);
        assert_eq!(m[2].kind(), MovementKind::Withdrawal);
        assert_eq!(m[2].withdrawal_amount(), d("150.00"));
        assert_eq!(m[3].kind(), MovementKind::Withdrawal);
        assert_eq!(m[3].concept, "SEL TRASPASO ENTRE CUENTAS");
    }

    #[test]
    fn barcode_accounts_are_trimmed() {
        let parser = ScotiabankParser::new().unwrap();
        let info = parser.account_info("CUENTA 0010000044158123456");
        assert_eq!(info.account, "00004415812");
    }

    #[test]
    fn received_phrases_outrank_pago() {
        assert_eq!(kind_of("PAGO RECIBIDO DE CLIENTE"), MovementKind::Deposit);
        assert_eq!(kind_of("PAGO DE SERVICIO"), MovementKind::Withdrawal);
        assert_eq!(kind_of("ABONO INTERESES"), MovementKind::Deposit);
        assert_eq!(kind_of("CONCEPTO DESCONOCIDO"), MovementKind::Withdrawal);
    }
}
