//! tally-ingest: PDF text extraction (native and OCR), classification, cipher decoding, bank
//! identification and the per-bank parsers.

pub mod cipher;
pub mod classify;
pub mod extract;
pub mod hybrid;
pub mod identify;
pub mod parsers;
pub mod registry;

pub use cipher::{CipherDecoder, CipherTable};
pub use classify::{
    ClassificationReport, ClassifierConfig, PageAssessment, PageUsability, PdfClassification,
    PdfClassifier,
};
pub use extract::{
    DocumentFacts, DocumentProbe, NativeExtractor, OcrConfig, OcrExtractor, TextExtractor,
};
pub use hybrid::{ExtractionOutcome, HybridPipeline};
pub use identify::{BankIdentifier, CatalogEntry};
pub use parsers::{BankParser, ParseStrategy};
pub use registry::{ParserRegistry, default_registry};
