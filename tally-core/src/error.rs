//! Error taxonomy shared by every stage of the pipeline.
//!
//! Per-file errors (`ExtractionError`, `IdentificationFailure`, `ParseError`) are fatal to
//! one file only; the batch layer collects them as values inside `StatementError`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("amount text is empty")]
    Empty,
    #[error("cannot read an amount from '{0}'")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("date text is empty")]
    Empty,
    #[error("unknown month name '{0}'")]
    UnknownMonth(String),
    #[error("date '{text}' needs {missing} to be resolved")]
    Incomplete { text: String, missing: &'static str },
    #[error("date '{text}' is not a calendar date (year={year}, month={month}, day={day})")]
    OutOfRange {
        text: String,
        year: i32,
        month: u32,
        day: u32,
    },
    #[error("unsupported date format '{0}'")]
    Unsupported(String),
}

/// The document could not be read (corrupt, unopenable, or every strategy failed).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot extract text from '{file}': {cause}")]
pub struct ExtractionError {
    pub file: String,
    pub cause: String,
}

impl ExtractionError {
    pub fn new(file: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            cause: cause.into(),
        }
    }
}

/// No catalog entry matched the statement text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bank not identified in '{file}'{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct IdentificationFailure {
    pub file: String,
    pub detail: Option<String>,
}

/// Malformed amount, missing required field, or a movement contract violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{bank} parse error in '{file}': {message}{}", .line.as_deref().map(|l| format!(" (line: {l:?})")).unwrap_or_default())]
pub struct ParseError {
    pub bank: String,
    pub file: String,
    pub line: Option<String>,
    pub message: String,
}

impl ParseError {
    pub fn new(bank: impl Into<String>, file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            bank: bank.into(),
            file: file.into(),
            line: None,
            message: message.into(),
        }
    }

    pub fn at_line(mut self, line: impl Into<String>) -> Self {
        self.line = Some(line.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a parser for bank '{bank}' is already registered")]
    Duplicate { bank: String },
    #[error("parser for '{bank}' has an invalid pattern: {message}")]
    Pattern { bank: String, message: String },
}

impl RegistryError {
    pub fn pattern(bank: impl Into<String>, err: regex::Error) -> Self {
        Self::Pattern {
            bank: bank.into(),
            message: err.to_string(),
        }
    }
}

/// Everything that can fail a single file inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatementError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Identification(#[from] IdentificationFailure),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("bank '{bank}' identified but no parser is registered (available: {})", .available.join(", "))]
    NoParser { bank: String, available: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_mentions_offending_line() {
        let err = ParseError::new("BBVA", "oct.pdf", "malformed amount").at_line("01/OCT PAGO 1,2x.00");
        let msg = err.to_string();
        assert!(msg.contains("BBVA"));
        assert!(msg.contains("oct.pdf"));
        assert!(msg.contains("1,2x.00"));
    }

    #[test]
    fn identification_failure_without_detail() {
        let err = IdentificationFailure {
            file: "x.pdf".into(),
            detail: None,
        };
        assert_eq!(err.to_string(), "bank not identified in 'x.pdf'");
    }

    #[test]
    fn statement_error_wraps_transparently() {
        let err: StatementError = ExtractionError::new("a.pdf", "not a PDF").into();
        assert_eq!(err.to_string(), "cannot extract text from 'a.pdf': not a PDF");
    }
}
