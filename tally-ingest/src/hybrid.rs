//! Native first, OCR only where native failed.
//!
//! Every document goes through the native text layer. The classifier then decides which
//! pages (if any) are re-read by OCR, cipher pages are decoded, and the merged result keeps
//! one entry per page in page order, empty pages included.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tally_core::{ExtractionError, PageText};
use tracing::{debug, info, warn};

use crate::cipher::{CipherDecoder, residual_tokens};
use crate::classify::{ClassificationReport, ClassifierConfig, PageUsability, PdfClassification, PdfClassifier};
use crate::extract::{DocumentFacts, DocumentProbe, NativeExtractor, OcrConfig, OcrExtractor, TextExtractor, file_label};

/// What the pipeline produced for one document and how it got there.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutcome {
    pub pages: Vec<PageText>,
    pub report: ClassificationReport,
    pub facts: DocumentFacts,
    /// Pages whose final text came from OCR.
    pub ocr_pages: Vec<u32>,
    /// Pages the cipher decoder rewrote.
    pub decoded_pages: Vec<u32>,
    /// Decoded pages still holding `(cid:N)` tokens no table maps, with their count.
    pub undecoded_tokens: Vec<(u32, usize)>,
}

impl ExtractionOutcome {
    pub fn classification(&self) -> PdfClassification {
        self.report.classification
    }
}

#[derive(Clone)]
pub struct HybridPipeline {
    native: Arc<dyn TextExtractor>,
    probe: Arc<dyn DocumentProbe>,
    ocr: Option<Arc<dyn TextExtractor>>,
    classifier: PdfClassifier,
    decoder: CipherDecoder,
}

impl std::fmt::Debug for HybridPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridPipeline")
            .field("native", &self.native.name())
            .field("ocr", &self.ocr.as_ref().map(|o| o.name()))
            .field("classifier", self.classifier.config())
            .finish()
    }
}

impl HybridPipeline {
    pub fn new(
        native: Arc<dyn TextExtractor>,
        probe: Arc<dyn DocumentProbe>,
        ocr: Option<Arc<dyn TextExtractor>>,
        classifier: ClassifierConfig,
        decoder: CipherDecoder,
    ) -> Self {
        Self {
            native,
            probe,
            ocr,
            classifier: PdfClassifier::new(classifier, decoder.clone()),
            decoder,
        }
    }

    /// lopdf for the text layer and the probe; pdftoppm + tesseract when `ocr` is given.
    pub fn standard(ocr: Option<OcrConfig>, classifier: ClassifierConfig) -> Self {
        let native = Arc::new(NativeExtractor::new());
        let ocr = ocr.map(|c| Arc::new(OcrExtractor::new(c)) as Arc<dyn TextExtractor>);
        Self::new(native.clone(), native, ocr, classifier, CipherDecoder::default())
    }

    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    /// Native extraction padded to the probed page count, in page order.
    fn native_pages(&self, path: &Path) -> Result<(Vec<PageText>, DocumentFacts), ExtractionError> {
        let facts = self.probe.inspect(path)?;
        let mut pages = self.native.extract(path)?;
        for n in 1..=facts.page_count {
            if !pages.iter().any(|p| p.page_number == n) {
                pages.push(PageText::empty(n));
            }
        }
        pages.sort_by_key(|p| p.page_number);
        Ok((pages, facts))
    }

    /// Classification only, from the native text layer.
    pub fn classify(&self, path: &Path) -> Result<(ClassificationReport, DocumentFacts), ExtractionError> {
        let (pages, facts) = self.native_pages(path)?;
        Ok((self.classifier.classify(&pages, &facts), facts))
    }

    /// Full extraction, word positions kept.
    pub fn extract(&self, path: &Path) -> Result<ExtractionOutcome, ExtractionError> {
        self.extract_with(path, |_| true)
    }

    /// Full extraction; `needs_words` sees the merged pages and decides whether word boxes
    /// are kept.
    pub fn extract_with(
        &self,
        path: &Path,
        needs_words: impl Fn(&[PageText]) -> bool,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let file = file_label(path);
        debug!(file = %file, strategy = self.native.name(), "extraction start");
        let (pages, facts) = self.native_pages(path)?;
        let report = self.classifier.classify(&pages, &facts);
        info!(
            file = %file,
            classification = %report.classification,
            pages = pages.len(),
            "document classified"
        );

        let (mut pages, decoded_pages) = if report.classification == PdfClassification::CipherEncoded {
            let (pages, decoded) = self.decoder.decode_pages(pages);
            info!(file = %file, pages = ?decoded, "cipher decoded");
            (pages, decoded)
        } else {
            (pages, Vec::new())
        };
        let undecoded_tokens = Self::undecoded_tokens(&file, &pages, &decoded_pages);

        let targets = self.ocr_targets(&report, &pages);
        let ocr_pages = if targets.is_empty() {
            Vec::new()
        } else {
            self.run_ocr(path, &file, &targets, &mut pages)
        };

        if !needs_words(&pages) {
            pages = pages.into_iter().map(PageText::without_words).collect();
        }

        Ok(ExtractionOutcome {
            pages,
            report,
            facts,
            ocr_pages,
            decoded_pages,
            undecoded_tokens,
        })
    }

    fn undecoded_tokens(file: &str, pages: &[PageText], decoded: &[u32]) -> Vec<(u32, usize)> {
        let mut found = Vec::new();
        for page in pages.iter().filter(|p| decoded.contains(&p.page_number)) {
            let left = residual_tokens(&page.text);
            if left > 0 {
                warn!(file, page = page.page_number, tokens = left, "cipher tokens left after decoding");
                found.push((page.page_number, left));
            }
        }
        found
    }

    fn ocr_targets(&self, report: &ClassificationReport, pages: &[PageText]) -> Vec<u32> {
        match report.classification {
            PdfClassification::Native => Vec::new(),
            PdfClassification::NativePartial => report.unusable_pages(),
            PdfClassification::Blocked | PdfClassification::Scanned => {
                pages.iter().map(|p| p.page_number).collect()
            }
            PdfClassification::CipherEncoded => pages
                .iter()
                .filter(|p| self.classifier.assess_page(p).usability == PageUsability::Empty)
                .map(|p| p.page_number)
                .collect(),
        }
    }

    /// Replaces targeted pages with their OCR text. Near-empty OCR output leaves the page
    /// empty; a failed or missing OCR step keeps the native pages.
    fn run_ocr(&self, path: &Path, file: &str, targets: &[u32], pages: &mut [PageText]) -> Vec<u32> {
        let Some(ocr) = &self.ocr else {
            warn!(file, pages = ?targets, "ocr disabled; pages kept as extracted");
            return Vec::new();
        };
        info!(file, pages = ?targets, strategy = ocr.name(), "ocr start");
        let recognized = match ocr.extract_pages(path, targets) {
            Ok(recognized) => recognized,
            Err(e) => {
                warn!(file, error = %e, "ocr unavailable; pages kept as extracted");
                return Vec::new();
            }
        };

        let min_chars = self.classifier.config().min_page_chars;
        let mut replaced = Vec::new();
        for page in recognized {
            let Some(slot) = pages.iter_mut().find(|p| p.page_number == page.page_number) else {
                continue;
            };
            if page.char_count() >= min_chars {
                replaced.push(page.page_number);
                *slot = page;
            } else {
                debug!(file, page = page.page_number, "ocr found no text; page kept empty");
                *slot = PageText::empty(page.page_number);
            }
        }
        replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tally_core::Word;

    const LINE: &str = "01/MAR PAGO TARJETA REF123 $1,250.00 saldo al corte";

    struct Fixed(Vec<PageText>);

    impl TextExtractor for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn extract(&self, _path: &Path) -> Result<Vec<PageText>, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    struct Probe(DocumentFacts);

    impl DocumentProbe for Probe {
        fn inspect(&self, _path: &Path) -> Result<DocumentFacts, ExtractionError> {
            Ok(self.0.clone())
        }
    }

    /// Returns `text` for every requested page and remembers the requests.
    #[derive(Default)]
    struct Recorder {
        text: String,
        fail: bool,
        asked: Mutex<Vec<u32>>,
    }

    impl TextExtractor for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn extract(&self, _path: &Path) -> Result<Vec<PageText>, ExtractionError> {
            unreachable!("the pipeline only asks for selected pages")
        }

        fn extract_pages(&self, _path: &Path, pages: &[u32]) -> Result<Vec<PageText>, ExtractionError> {
            self.asked.lock().unwrap().extend_from_slice(pages);
            if self.fail {
                return Err(ExtractionError::new("x.pdf", "tesseract not found on PATH"));
            }
            Ok(pages.iter().map(|n| PageText::new(*n, self.text.clone())).collect())
        }
    }

    fn facts(page_count: u32, images: bool) -> DocumentFacts {
        DocumentFacts {
            page_count,
            copy_protected: !images,
            image_pages: vec![images; page_count as usize],
        }
    }

    fn pipeline(native: Vec<PageText>, facts: DocumentFacts, ocr: Option<Arc<Recorder>>) -> HybridPipeline {
        HybridPipeline::new(
            Arc::new(Fixed(native)),
            Arc::new(Probe(facts)),
            ocr.map(|o| o as Arc<dyn TextExtractor>),
            ClassifierConfig::default(),
            CipherDecoder::default(),
        )
    }

    #[test]
    fn native_documents_never_reach_ocr() {
        let ocr = Arc::new(Recorder::default());
        let p = pipeline(vec![PageText::new(1, LINE)], facts(1, false), Some(ocr.clone()));
        let out = p.extract(Path::new("x.pdf")).unwrap();
        assert_eq!(out.classification(), PdfClassification::Native);
        assert!(ocr.asked.lock().unwrap().is_empty());
        assert!(out.ocr_pages.is_empty());
    }

    #[test]
    fn partial_documents_ocr_only_the_empty_pages() {
        let ocr = Arc::new(Recorder {
            text: "05/MAR DEPOSITO EFECTIVO $500.00 recuperado".into(),
            ..Default::default()
        });
        let native = vec![PageText::new(1, LINE), PageText::new(2, " "), PageText::new(3, LINE)];
        let p = pipeline(native, facts(3, false), Some(ocr.clone()));
        let out = p.extract(Path::new("x.pdf")).unwrap();

        assert_eq!(out.classification(), PdfClassification::NativePartial);
        assert_eq!(*ocr.asked.lock().unwrap(), vec![2]);
        assert_eq!(out.ocr_pages, vec![2]);
        assert_eq!(out.pages.len(), 3);
        assert!(out.pages[1].text.contains("DEPOSITO"));
        assert_eq!(out.pages[0].text, LINE);
    }

    #[test]
    fn near_empty_ocr_keeps_page_slots() {
        let ocr = Arc::new(Recorder {
            text: "~".into(),
            ..Default::default()
        });
        let p = pipeline(Vec::new(), facts(2, true), Some(ocr.clone()));
        let out = p.extract(Path::new("scan.pdf")).unwrap();

        assert_eq!(out.classification(), PdfClassification::Scanned);
        assert_eq!(*ocr.asked.lock().unwrap(), vec![1, 2]);
        assert!(out.ocr_pages.is_empty());
        assert_eq!(out.pages.iter().map(|p| p.page_number).collect::<Vec<_>>(), vec![1, 2]);
        assert!(out.pages.iter().all(PageText::is_empty));
    }

    #[test]
    fn failed_ocr_is_not_fatal() {
        let ocr = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let p = pipeline(vec![PageText::empty(1)], facts(1, false), Some(ocr));
        let out = p.extract(Path::new("locked.pdf")).unwrap();
        assert_eq!(out.classification(), PdfClassification::Blocked);
        assert_eq!(out.pages.len(), 1);
        assert!(out.ocr_pages.is_empty());
    }

    #[test]
    fn cipher_pages_are_decoded() {
        // "CUENTA INTEGRAL" in the substituted font
        let encoded = "\u{2c6}(cid:228)\u{af}(cid:213)\u{aa}`@(cid:201)(cid:213)\u{aa}\u{af}\u{2d9}(cid:217)`(cid:211)";
        let page = PageText::with_words(1, encoded, vec![Word::new(encoded, 10.0, 90.0, 10.0, 18.0)]);
        let p = pipeline(vec![page], facts(1, false), None);
        let out = p.extract(Path::new("hsbc.pdf")).unwrap();

        assert_eq!(out.classification(), PdfClassification::CipherEncoded);
        assert_eq!(out.decoded_pages, vec![1]);
        assert_eq!(out.pages[0].text, "CUENTA INTEGRAL");
        assert_eq!(out.pages[0].words[0].text, "CUENTA INTEGRAL");
        assert!(out.undecoded_tokens.is_empty());
    }

    #[test]
    fn unmapped_cipher_tokens_are_reported() {
        let clean = "\u{2c6}(cid:228)\u{af}(cid:213)\u{aa}`@(cid:201)(cid:213)\u{aa}\u{af}\u{2d9}(cid:217)`(cid:211)";
        let pages = vec![
            PageText::new(1, clean),
            PageText::new(2, format!("{clean} (cid:999) (cid:998)")),
        ];
        let p = pipeline(pages, facts(2, false), None);
        let out = p.extract(Path::new("hsbc.pdf")).unwrap();

        assert_eq!(out.decoded_pages, vec![1, 2]);
        assert_eq!(out.undecoded_tokens, vec![(2, 2)]);
        assert!(out.pages[1].text.starts_with("CUENTA INTEGRAL (cid:999)"));
    }

    #[test]
    fn words_dropped_when_not_needed() {
        let page = PageText::with_words(1, LINE, vec![Word::new("01/MAR", 10.0, 40.0, 10.0, 18.0)]);
        let p = pipeline(vec![page], facts(1, false), None);
        let out = p.extract_with(Path::new("x.pdf"), |_| false).unwrap();
        assert!(!out.pages[0].has_words());
        let out = p.extract(Path::new("x.pdf")).unwrap();
        assert!(out.pages[0].has_words());
    }
}
