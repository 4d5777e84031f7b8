use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tally_batch::{BatchResult, CsvWriter, Stage, StatementProcessor};
use tally_core::{ExtractionError, MismatchField, PageText, StatementError};
use tally_ingest::extract::file_label;
use tally_ingest::{
    BankIdentifier, CipherDecoder, ClassifierConfig, DocumentFacts, DocumentProbe, HybridPipeline,
    PdfClassification, TextExtractor, default_registry,
};

/// Serves canned pages per file name; unknown files fail like unreadable PDFs.
#[derive(Clone, Default)]
struct Library(Arc<HashMap<String, Vec<PageText>>>);

impl Library {
    fn with(files: &[(&str, Vec<PageText>)]) -> Self {
        Self(Arc::new(
            files.iter().map(|(name, pages)| (name.to_string(), pages.clone())).collect(),
        ))
    }

    fn pages(&self, path: &Path) -> Result<&Vec<PageText>, ExtractionError> {
        let file = file_label(path);
        self.0
            .get(&file)
            .ok_or_else(|| ExtractionError::new(file, "not a PDF"))
    }
}

impl TextExtractor for Library {
    fn name(&self) -> &'static str {
        "library"
    }

    fn extract(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError> {
        self.pages(path).cloned()
    }
}

impl DocumentProbe for Library {
    fn inspect(&self, path: &Path) -> Result<DocumentFacts, ExtractionError> {
        let count = self.pages(path)?.len() as u32;
        Ok(DocumentFacts {
            page_count: count,
            copy_protected: false,
            image_pages: vec![false; count as usize],
        })
    }
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn processor(library: Library) -> StatementProcessor {
    let shared = Arc::new(library);
    let pipeline = HybridPipeline::new(
        shared.clone(),
        shared,
        None,
        ClassifierConfig::default(),
        CipherDecoder::default(),
    );
    StatementProcessor::new(pipeline, BankIdentifier::default(), default_registry().unwrap())
}

const HEADER: &str = "BBVA MEXICO, S.A.\nNo. de Cuenta: 0123456789\nPeriodo: 01/MAR/2024 al 31/MAR/2024\n";

fn march() -> Vec<PageText> {
    vec![
        PageText::new(
            1,
            format!("{HEADER}\n01/MAR  PAGO TARJETA  REF123  $1,250.00\n05/MAR  DEPOSITO EFECTIVO  $500.00"),
        ),
        PageText::new(2, "15/MAR  SPEI RECIBIDO BANORTE 0012345  $2,000.00"),
    ]
}

fn april_malformed() -> Vec<PageText> {
    vec![PageText::new(
        1,
        "BBVA MEXICO, S.A.\nNo. de Cuenta: 0123456789\nPeriodo: 01/ABR/2024 al 30/ABR/2024\n02/ABR  PAGO PROVEEDOR  $12,5O0.00",
    )]
}

fn may() -> Vec<PageText> {
    vec![PageText::new(
        1,
        "BBVA MEXICO, S.A.\nNo. de Cuenta: 0123456789\nPeriodo: 01/MAY/2024 al 31/MAY/2024\n03/MAY  DEPOSITO NOMINA  $8,000.00",
    )]
}

fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(|n| PathBuf::from("/in").join(n)).collect()
}

#[test]
fn native_statement_end_to_end() {
    let p = processor(Library::with(&[("mar.pdf", march())]));
    let outcome = p.process_file(Path::new("/in/mar.pdf"));

    assert_eq!(
        outcome.trail,
        vec![Stage::Extracting, Stage::Classifying, Stage::Identifying, Stage::Parsing, Stage::Done]
    );
    assert_eq!(outcome.classification, Some(PdfClassification::Native));
    assert_eq!(outcome.bank.as_deref(), Some("BBVA"));
    assert!(outcome.ocr_pages.is_empty());
    assert!(outcome.undecoded_tokens.is_empty());

    let result = outcome.result.unwrap();
    assert_eq!(result.movements().len(), 3);
    assert_eq!(result.summary().total_withdrawals, d("1250.00"));
    assert_eq!(result.summary().total_deposits, d("2500.00"));
    assert_eq!(result.summary().withdrawal_count, 1);
    assert_eq!(result.summary().deposit_count, 2);
    assert!(!result.has_warnings());
}

#[test]
fn one_bad_file_does_not_stop_the_batch() {
    let p = processor(Library::with(&[
        ("mar.pdf", march()),
        ("abr.pdf", april_malformed()),
        ("may.pdf", may()),
    ]));
    let batch = p.process_paths(&paths(&["mar.pdf", "abr.pdf", "may.pdf"]));

    assert_eq!(batch.len(), 3);
    assert_eq!(batch.success_count(), 2);
    assert_eq!(batch.total_movements(), 4);
    let failures: Vec<_> = batch.failures().collect();
    assert_eq!(failures.len(), 1);
    let (file, failure) = failures[0];
    assert_eq!(file, "abr.pdf");
    assert_eq!(failure.stage, Stage::Parsing);
    let StatementError::Parse(err) = &failure.error else {
        panic!("expected a parse error, got {:?}", failure.error);
    };
    assert!(err.line.as_deref().is_some_and(|l| l.contains("$12,5O0.00")));
    assert!(!batch.all_failed());
}

#[tokio::test]
async fn parallel_batch_matches_sequential() {
    let library = Library::with(&[
        ("mar.pdf", march()),
        ("abr.pdf", april_malformed()),
        ("may.pdf", may()),
    ]);
    let p = Arc::new(processor(library));
    let inputs = paths(&["may.pdf", "abr.pdf", "mar.pdf", "missing.pdf"]);

    let sequential = p.process_paths(&inputs);
    let parallel = p.process_paths_parallel(inputs, 2).await;

    let keys = |b: &BatchResult| b.outcomes().map(|(k, o)| (k.to_string(), o.stage())).collect::<Vec<_>>();
    assert_eq!(keys(&sequential), keys(&parallel));
    assert_eq!(parallel.success_count(), 2);
    assert_eq!(parallel.failure_count(), 2);
    let missing = parallel.get("missing.pdf").unwrap();
    assert_eq!(missing.result.as_ref().unwrap_err().stage, Stage::Extracting);
}

#[tokio::test]
async fn duplicate_names_are_keyed_in_input_order() {
    let p = Arc::new(processor(Library::with(&[("mar.pdf", march())])));
    let inputs = vec![
        PathBuf::from("/in/2024/mar.pdf"),
        PathBuf::from("/in/2023/mar.pdf"),
    ];

    for _ in 0..8 {
        let batch = p.process_paths_parallel(inputs.clone(), 2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get("mar.pdf").unwrap().path, inputs[0]);
        assert_eq!(batch.get("/in/2023/mar.pdf").unwrap().path, inputs[1]);
    }
    let sequential = p.process_paths(&inputs);
    assert_eq!(sequential.get("mar.pdf").unwrap().path, inputs[0]);
}

#[test]
fn stated_balances_that_disagree_become_warnings() {
    let page = PageText::new(
        1,
        format!(
            "{HEADER}SALDO ANTERIOR $10,000.00\n01/MAR  PAGO TARJETA  REF123  $1,250.00\n05/MAR  DEPOSITO EFECTIVO  $500.00\nSALDO FINAL $9,000.00"
        ),
    );
    let p = processor(Library::with(&[("mar.pdf", vec![page])]));
    let batch = p.process_paths(&paths(&["mar.pdf"]));

    assert_eq!(batch.success_count(), 1);
    let warnings = batch.warnings();
    assert_eq!(warnings.len(), 1);
    let (file, mismatch) = warnings[0];
    assert_eq!(file, "mar.pdf");
    assert_eq!(mismatch.field, MismatchField::BalanceChange);
    assert_eq!(mismatch.stated, d("-1000.00"));
    assert_eq!(mismatch.computed, d("-750.00"));

    let (_, result) = batch.successes().next().unwrap();
    assert_eq!(result.movements().len(), 2);
    assert_eq!(result.summary().opening_balance, Some(d("10000.00")));
    assert_eq!(result.summary().closing_balance, Some(d("9000.00")));
}

#[test]
fn unknown_issuer_and_missing_parser_fail_at_identification() {
    let p = processor(Library::with(&[
        (
            "coop.pdf",
            vec![PageText::new(1, "COOPERATIVA LOCAL\nESTADO DE CUENTA MENSUAL\nCliente 4455")],
        ),
        (
            "monex.pdf",
            vec![PageText::new(1, "BANCO MONEX S.A.\nEstado de cuenta marzo 2024")],
        ),
    ]));
    let batch = p.process_paths(&paths(&["coop.pdf", "monex.pdf"]));
    assert!(batch.all_failed());

    let coop = batch.get("coop.pdf").unwrap().result.as_ref().unwrap_err();
    assert_eq!(coop.stage, Stage::Identifying);
    assert!(matches!(coop.error, StatementError::Identification(_)));

    let monex = batch.get("monex.pdf").unwrap().result.as_ref().unwrap_err();
    assert_eq!(monex.stage, Stage::Identifying);
    let StatementError::NoParser { bank, available } = &monex.error else {
        panic!("expected a missing parser, got {:?}", monex.error);
    };
    assert_eq!(bank, "MONEX");
    assert!(available.contains(&"BBVA".to_string()));
}

#[test]
fn batch_renders_both_tables_and_the_error_report() {
    let p = processor(Library::with(&[("mar.pdf", march()), ("abr.pdf", april_malformed())]));
    let batch = p.process_paths(&paths(&["mar.pdf", "abr.pdf"]));
    let dir = tempfile::tempdir().unwrap();
    let written = CsvWriter::new(dir.path()).write(&batch).unwrap();

    let summary = std::fs::read_to_string(&written.summary).unwrap();
    let rows: Vec<&str> = summary.lines().collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1], "BBVA,0123456789,MXN,2024-03,2500.00,2,1250.00,1,mar.pdf");

    let movements = std::fs::read_to_string(&written.movements).unwrap();
    let rows: Vec<&str> = movements.lines().collect();
    assert_eq!(rows[0], "Bank,Account,Currency,Date,Date,Concept,Reference,Withdrawals,Deposits");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[1], "BBVA,0123456789,MXN,01/03/2024,01/03/2024,PAGO TARJETA,REF123,1250.00,0.00");
    assert_eq!(rows[2], "BBVA,0123456789,MXN,05/03/2024,05/03/2024,DEPOSITO EFECTIVO,,0.00,500.00");

    let errors = std::fs::read_to_string(written.errors.unwrap()).unwrap();
    let rows: Vec<&str> = errors.lines().collect();
    assert_eq!(rows[0], "File,Stage,Error");
    assert!(rows[1].starts_with("abr.pdf,parsing,"));
}
