//! CSV output for a finished batch: one summary row per statement, one row per movement,
//! and an error report when anything failed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use tally_core::ParseResult;
use tracing::info;

use crate::batch::BatchResult;

pub const SUMMARY_FILE: &str = "resumen.csv";
pub const MOVEMENTS_FILE: &str = "movimientos.csv";
pub const ERRORS_FILE: &str = "errores.csv";

const SUMMARY_HEADER: [&str; 9] = [
    "Bank",
    "Account",
    "Currency",
    "Period",
    "Total Deposits",
    "Deposit Count",
    "Total Withdrawals",
    "Withdrawal Count",
    "File",
];

/// `Date` is written twice; consumers address columns by position.
const MOVEMENTS_HEADER: [&str; 9] = [
    "Bank",
    "Account",
    "Currency",
    "Date",
    "Date",
    "Concept",
    "Reference",
    "Withdrawals",
    "Deposits",
];

const ERRORS_HEADER: [&str; 3] = ["File", "Stage", "Error"];

/// Paths of the files a write produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub summary: PathBuf,
    pub movements: PathBuf,
    pub errors: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CsvWriter {
    dir: PathBuf,
}

/// Two decimals, no grouping, no symbol.
fn plain(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.2}")
}

fn summary_row(result: &ParseResult) -> Vec<String> {
    let s = result.summary();
    vec![
        result.account.bank.clone(),
        result.account.account.clone(),
        result.account.currency.to_string(),
        result.period.map(|p| p.to_string()).unwrap_or_default(),
        plain(s.total_deposits),
        s.deposit_count.to_string(),
        plain(s.total_withdrawals),
        s.withdrawal_count.to_string(),
        result.source_file.clone(),
    ]
}

impl CsvWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Summary and movements are always written (header only when empty); the error file
    /// only when at least one file failed.
    pub fn write(&self, batch: &BatchResult) -> Result<WrittenFiles> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create output directory {}", self.dir.display()))?;

        let summary = self.dir.join(SUMMARY_FILE);
        self.write_summary(&summary, batch)?;
        let movements = self.dir.join(MOVEMENTS_FILE);
        self.write_movements(&movements, batch)?;

        let errors = if batch.failure_count() > 0 {
            let path = self.dir.join(ERRORS_FILE);
            self.write_errors(&path, batch)?;
            Some(path)
        } else {
            None
        };

        info!(dir = %self.dir.display(), statements = batch.success_count(), "output written");
        Ok(WrittenFiles { summary, movements, errors })
    }

    fn write_summary(&self, path: &Path, batch: &BatchResult) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        wtr.write_record(SUMMARY_HEADER)?;
        for (_, result) in batch.successes() {
            wtr.write_record(summary_row(result))?;
        }
        wtr.flush().with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn write_movements(&self, path: &Path, batch: &BatchResult) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        wtr.write_record(MOVEMENTS_HEADER)?;
        for (_, result) in batch.successes() {
            let currency = result.account.currency.to_string();
            for m in result.movements() {
                let date = m.date.format("%d/%m/%Y").to_string();
                let withdrawal = plain(m.withdrawal_amount());
                let deposit = plain(m.deposit_amount());
                wtr.write_record([
                    result.account.bank.as_str(),
                    result.account.account.as_str(),
                    currency.as_str(),
                    date.as_str(),
                    date.as_str(),
                    m.concept.as_str(),
                    m.reference.as_str(),
                    withdrawal.as_str(),
                    deposit.as_str(),
                ])?;
            }
        }
        wtr.flush().with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn write_errors(&self, path: &Path, batch: &BatchResult) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        wtr.write_record(ERRORS_HEADER)?;
        for (file, failure) in batch.failures() {
            wtr.write_record([file.to_string(), failure.stage.to_string(), failure.error.to_string()])?;
        }
        wtr.flush().with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
