//! Banorte statement parser (position)
//!
//! Only pages carrying the "DETALLE DE MOVIMIENTOS" section are read:
//!   FECHA      DESCRIPCION / ESTABLECIMIENTO        DEPOSITOS   RETIROS    SALDO
//!   05-OCT-24  SPEI RECIBIDO DE EMPRESA             12,000.00              45,100.00
//!              REFERENCIA: ABC123 CVE RAST: XYZ789
//!   07-OCT-24  CHEQUE PAGADO                                    3,000.00   42,100.00
//!
//! Amounts may carry a trailing minus (`29,536.44-`) for reversals; those never become
//! movements.

use regex::Regex;
use rust_decimal::Decimal;
use tally_core::dates::{expand_year, parse_bank_date};
use tally_core::month::month_number;
use tally_core::types::joined_text;
use tally_core::{AccountInfo, Movement, MovementKind, PageText, ParseError, ParseResult, TotalsScanner};
use tracing::debug;

use super::layout::{Band, band_at, rows_by_rounded_top};
use super::{BankParser, ParseStrategy, RowContext, currency_from, ensure_pages, period_or_fail};

const BANK: &str = "BANORTE";

const MOVEMENTS_MARKER: &str = "DETALLE DE MOVIMIENTOS";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Column {
    Deposit,
    Withdrawal,
}

const BANDS: [Band<Column>; 2] = [
    Band { column: Column::Deposit, start: 370.0, end: 445.0 },
    Band { column: Column::Withdrawal, start: 445.0, end: 515.0 },
];

// only consulted when an amount falls outside both bands
const DEPOSIT_KEYWORDS: &[&str] = &[
    "DEPOSITO",
    "DEPÓSITO",
    "DEP.",
    "SPEI RECIBIDO",
    "ABONO",
    "INTERES",
    "INTERÉS",
    "LIQ.INT",
    "RENDIMIENTO",
    "COMPENSACION DESFASE",
];

// page footers and trailing sections that must never stick to the last concept
const STOP_MARKERS: &[&str] = &[
    "LÍNEA DIRECTA",
    "LINEA DIRECTA",
    "CIUDAD DE MÉXICO",
    "CIUDAD DE MEXICO",
    "WWW.BANORTE",
    "BANCO MERCAN",
    "800 DIRECTA",
    "RESTO DEL PA",
    "CARGOS OBJETADOS",
    "INFORME DE DEP",
    "OTROS\u{25bc}",
    "FOLIO FECHA TIPO",
];

const USD_MARKERS: &[&str] = &["DOLARES", "DÓLARES", "USD"];

#[derive(Debug, Clone, Copy)]
struct RowAmount {
    x0: f64,
    value: Decimal,
    reversal: bool,
}

#[derive(Debug, Clone)]
pub struct BanorteParser {
    row_date: Regex,
    amount: Regex,
    leading_date: Regex,
    references: Vec<Regex>,
    accounts: Vec<Regex>,
    period_full_year: Regex,
    period_month_name: Regex,
    period_short: Regex,
    any_year: Regex,
    any_short_date: Regex,
    totals: TotalsScanner,
}

impl BanorteParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            row_date: Regex::new(r"^(\d{2}-[A-Z]{3}-\d{2}|\d{2}/\d{2}/\d{4})")?,
            amount: Regex::new(r"^(\d{1,3}(?:,\d{3})*\.\d{2})(-?)$")?,
            leading_date: Regex::new(r"^\d{2}-[A-Z]{3}-\d{2}")?,
            references: vec![
                Regex::new(r"(?i)REFERENCIA:\s*(\w+)")?,
                Regex::new(r"(?i)REF(?:\s+SERV\s+EMISOR)?:\s*(\w+)")?,
                Regex::new(r"(?i)CVE\s+RAST(?:REO)?:\s*(\w+)")?,
            ],
            accounts: vec![
                Regex::new(r"(?i)CUENTA\s+PRODUCTIVA\s+ESPECIAL\s+II?\s*(\d{10})")?,
                Regex::new(r"(?i)No\.\s*de\s*Cuenta[:\s]+(\d{10,})")?,
                Regex::new(r"(?i)CUENTA[^\d]*(\d{10})")?,
                Regex::new(r"(?i)ENLACE\s+NEGOCIOS\s+BASICA\s+(\d{10})")?,
            ],
            period_full_year: Regex::new(r"[Pp]eriodo\s+[Dd]el\s+\d{2}/\w+/(\d{4})")?,
            period_month_name: Regex::new(r"[Pp]eriodo\s+[Dd]el\s+\d{2}/([A-Za-z]+)/\d{4}")?,
            period_short: Regex::new(r"[Pp]eriodo\s+[Dd]el\s+\d{2}-([A-Za-z]{3})-(\d{2})")?,
            any_year: Regex::new(r"20(\d{2})")?,
            any_short_date: Regex::new(r"\d{2}-([A-Za-z]{3})-\d{2}")?,
            totals: TotalsScanner::new()?,
        })
    }

    /// Banorte sometimes prints the account on the second or third page.
    fn account_info(&self, pages: &[PageText]) -> AccountInfo {
        let mut account = String::new();
        let mut currency_text = String::new();
        for page in pages.iter().take(3) {
            currency_text.push_str(&page.text);
            currency_text.push('\n');
            if let Some(found) = self.accounts.iter().find_map(|re| re.captures(&page.text).map(|c| c[1].to_string())) {
                account = found;
                break;
            }
        }
        AccountInfo::new(BANK, account, currency_from(&currency_text, USD_MARKERS))
    }

    fn period(&self, text: &str) -> Option<(i32, u32)> {
        if let Some(caps) = self.period_full_year.captures(text) {
            let year = caps[1].parse().ok()?;
            let month = self
                .period_month_name
                .captures(text)
                .and_then(|c| month_number(&c[1]).ok())
                .unwrap_or(1);
            return Some((year, month));
        }

        if let Some(caps) = self.period_short.captures(text) {
            if let (Ok(month), Ok(year)) = (month_number(&caps[1]), caps[2].parse::<i32>()) {
                return Some((expand_year(year), month));
            }
        }

        let year = 2000 + self.any_year.captures(text)?[1].parse::<i32>().ok()?;
        let month = self
            .any_short_date
            .captures(text)
            .and_then(|c| month_number(&c[1]).ok())
            .unwrap_or(1);
        Some((year, month))
    }

    fn reference(&self, concept: &str) -> String {
        self.references
            .iter()
            .find_map(|re| re.captures(concept).map(|c| c[1].to_string()))
            .unwrap_or_default()
    }

    fn is_stop_line(line: &str) -> bool {
        let upper = line.to_uppercase();
        STOP_MARKERS.iter().any(|m| upper.contains(m))
    }

    /// Two amounts are `[movement, balance]`; three or more are `[deposit, withdrawal, …, balance]`.
    fn classify(
        &self,
        ctx: &RowContext<'_>,
        amounts: &[RowAmount],
        concept: &str,
    ) -> Result<Option<(MovementKind, Decimal)>, ParseError> {
        match amounts {
            [first, _balance] => {
                if first.reversal {
                    return Ok(None);
                }
                let kind = match band_at(&BANDS, first.x0) {
                    Some(Column::Deposit) => MovementKind::Deposit,
                    Some(Column::Withdrawal) => MovementKind::Withdrawal,
                    None => {
                        let upper = concept.to_uppercase();
                        let deposit = DEPOSIT_KEYWORDS.iter().any(|k| upper.starts_with(k))
                            || upper.contains("SPEI RECIBIDO");
                        if deposit { MovementKind::Deposit } else { MovementKind::Withdrawal }
                    }
                };
                Ok(Some((kind, first.value)))
            }
            [columns @ .., _balance] if columns.len() >= 2 => {
                let mut deposit = None;
                let mut withdrawal = None;
                for a in columns.iter().filter(|a| !a.reversal) {
                    match band_at(&BANDS, a.x0) {
                        Some(Column::Deposit) => {
                            deposit.get_or_insert(a.value);
                        }
                        Some(Column::Withdrawal) => {
                            withdrawal.get_or_insert(a.value);
                        }
                        None => {}
                    }
                }
                ctx.single_side(withdrawal, deposit)
            }
            _ => Ok(None),
        }
    }

    fn page_movements(&self, page: &PageText, file: &str) -> Result<Vec<Movement>, ParseError> {
        let rows = rows_by_rounded_top(&page.words, 2.0);
        let texts: Vec<String> = rows.iter().map(|r| r.text()).collect();
        let mut out = Vec::new();

        for (i, line) in texts.iter().enumerate() {
            let Some(date_text) = self.row_date.captures(line).map(|c| c[1].to_string()) else {
                continue;
            };
            if line.to_uppercase().contains("SALDO ANTERIOR") {
                continue;
            }

            let mut words = rows[i].words.clone();
            for (next_row, next) in rows.iter().zip(&texts).skip(i + 1) {
                if self.row_date.is_match(next) || Self::is_stop_line(next) {
                    break;
                }
                words.extend(next_row.words.iter().copied());
            }

            let ctx = RowContext::new(BANK, file, line);
            let mut concept_parts = Vec::new();
            let mut amounts = Vec::new();
            for word in &words {
                let text = word.text.trim();
                if let Some(caps) = self.amount.captures(text) {
                    let value = ctx.amount(&caps[1])?;
                    if value > Decimal::ZERO {
                        amounts.push(RowAmount {
                            x0: word.x0,
                            value,
                            reversal: !caps[2].is_empty(),
                        });
                    }
                } else if !text.is_empty() && text != date_text {
                    concept_parts.push(text);
                }
            }
            let joined = concept_parts.join(" ");
            let concept = self.leading_date.replace(joined.trim(), "").trim().to_string();
            let reference = self.reference(&concept);

            let Some((kind, value)) = self.classify(&ctx, &amounts, &concept)? else {
                continue;
            };
            let date = match parse_bank_date(&date_text, None, None) {
                Ok(date) => date,
                Err(e) => {
                    debug!(file, line = %line, error = %e, "skipping row with unreadable date");
                    continue;
                }
            };
            out.push(ctx.movement(date, concept, reference, kind, value)?);
        }
        Ok(out)
    }
}

impl BankParser for BanorteParser {
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
                "pages carry no word positions; Banorte needs them to tell columns apart",
            ));
        }

        let account = self.account_info(pages);
        let head = joined_text(&pages[..pages.len().min(2)]);
        let period = period_or_fail(BANK, file_name, self.period(&head))?;

        let mut movements = Vec::new();
        for page in pages {
            if page.has_words() && page.text.to_uppercase().contains(MOVEMENTS_MARKER) {
                movements.extend(self.page_movements(page, file_name)?);
            }
        }

        let stated = self.totals.scan(&joined_text(pages));
        Ok(ParseResult::new(account, movements, Some(period), file_name, &stated))
    }
}
