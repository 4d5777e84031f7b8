//! One file through the whole pipeline: extract → classify → identify → parse.
//!
//! Every failure is caught here and returned as a value; nothing a single file does can
//! abort the batch around it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tally_core::{ExtractionError, IdentificationFailure, PageText, ParseResult, StatementError};
use tally_ingest::extract::file_label;
use tally_ingest::{BankIdentifier, HybridPipeline, ParserRegistry, PdfClassification};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Extracting,
    Classifying,
    Identifying,
    Parsing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Extracting => "extracting",
            Self::Classifying => "classifying",
            Self::Identifying => "identifying",
            Self::Parsing => "parsing",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// The stage a file was in when it failed, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct FileFailure {
    pub stage: Stage,
    pub error: StatementError,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file: String,
    pub path: PathBuf,
    /// Stages in the order they were entered; ends with `Done` or `Failed`.
    pub trail: Vec<Stage>,
    pub classification: Option<PdfClassification>,
    pub bank: Option<String>,
    pub ocr_pages: Vec<u32>,
    /// Pages with cipher tokens left after decoding, and how many.
    pub undecoded_tokens: Vec<(u32, usize)>,
    pub result: Result<ParseResult, FileFailure>,
}

impl FileOutcome {
    fn started(path: &Path) -> Self {
        Self {
            file: file_label(path),
            path: path.to_path_buf(),
            trail: vec![Stage::Extracting],
            classification: None,
            bank: None,
            ocr_pages: Vec::new(),
            undecoded_tokens: Vec::new(),
            result: Err(FileFailure {
                stage: Stage::Extracting,
                error: ExtractionError::new(file_label(path), "not processed").into(),
            }),
        }
    }

    /// A file whose worker died before producing an outcome.
    pub fn crashed(path: &Path, cause: impl Into<String>) -> Self {
        let mut outcome = Self::started(path);
        let error = ExtractionError::new(outcome.file.clone(), cause);
        outcome.fail(error.into());
        outcome
    }

    fn enter(&mut self, stage: Stage) {
        self.trail.push(stage);
    }

    fn fail(&mut self, error: StatementError) {
        let stage = self.stage();
        self.trail.push(Stage::Failed);
        self.result = Err(FileFailure { stage, error });
    }

    fn finish(&mut self, result: ParseResult) {
        self.trail.push(Stage::Done);
        self.result = Ok(result);
    }

    /// The last stage entered.
    pub fn stage(&self) -> Stage {
        self.trail.last().copied().unwrap_or(Stage::Extracting)
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Extraction, identification and parsing wired together. Cheap to clone: everything
/// inside is shared and read-only.
#[derive(Debug, Clone)]
pub struct StatementProcessor {
    pipeline: HybridPipeline,
    identifier: Arc<BankIdentifier>,
    registry: Arc<ParserRegistry>,
}

impl StatementProcessor {
    pub fn new(pipeline: HybridPipeline, identifier: BankIdentifier, registry: ParserRegistry) -> Self {
        Self {
            pipeline,
            identifier: Arc::new(identifier),
            registry: Arc::new(registry),
        }
    }

    pub fn identifier(&self) -> &BankIdentifier {
        &self.identifier
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    pub fn pipeline(&self) -> &HybridPipeline {
        &self.pipeline
    }

    fn needs_words(&self, pages: &[PageText]) -> bool {
        self.identifier
            .identify(pages)
            .and_then(|bank| self.registry.get(bank))
            .is_some_and(|parser| parser.requires_words())
    }

    pub fn process_file(&self, path: &Path) -> FileOutcome {
        let mut outcome = FileOutcome::started(path);
        let file = outcome.file.clone();
        info!(file = %file, "file received");

        let extracted = match self.pipeline.extract_with(path, |pages| self.needs_words(pages)) {
            Ok(extracted) => extracted,
            Err(e) => {
                error!(file = %file, error = %e, "extraction failed");
                outcome.fail(e.into());
                return outcome;
            }
        };
        outcome.enter(Stage::Classifying);
        outcome.classification = Some(extracted.classification());
        outcome.ocr_pages = extracted.ocr_pages.clone();
        outcome.undecoded_tokens = extracted.undecoded_tokens.clone();
        let pages = extracted.pages;

        outcome.enter(Stage::Identifying);
        let Some(bank) = self.identifier.identify(&pages) else {
            warn!(file = %file, "bank not identified");
            outcome.fail(
                IdentificationFailure {
                    file: file.clone(),
                    detail: Some(format!(
                        "no catalog keyword in {} page(s), classification {}",
                        pages.len(),
                        extracted.report.classification
                    )),
                }
                .into(),
            );
            return outcome;
        };
        info!(file = %file, bank, "bank identified");
        outcome.bank = Some(bank.to_string());

        let Some(parser) = self.registry.get(bank) else {
            warn!(file = %file, bank, "no parser registered");
            outcome.fail(StatementError::NoParser {
                bank: bank.to_string(),
                available: self.registry.available_banks(),
            });
            return outcome;
        };

        outcome.enter(Stage::Parsing);
        match parser.parse(&pages, &file) {
            Ok(result) => {
                for mismatch in result.warnings() {
                    warn!(file = %file, bank, field = %mismatch.field, %mismatch, "summary mismatch");
                }
                info!(
                    file = %file,
                    bank,
                    pages = pages.len(),
                    movements = result.movements().len(),
                    "parse complete"
                );
                outcome.finish(result);
            }
            Err(e) => {
                error!(file = %file, bank, error = %e, "parse failed");
                outcome.fail(e.into());
            }
        }
        outcome
    }
}
