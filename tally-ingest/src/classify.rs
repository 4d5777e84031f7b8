//! How hard is this PDF to read?
//!
//! Each page of the native extraction is judged usable, empty or garbled; the document
//! label is a reduction over those judgements plus the probe's structural facts.

use std::fmt;

use serde::{Deserialize, Serialize};
use tally_core::PageText;

use crate::cipher::CipherDecoder;
use crate::extract::DocumentFacts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PdfClassification {
    Native,
    NativePartial,
    Blocked,
    Scanned,
    CipherEncoded,
}

impl PdfClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::NativePartial => "native-partial",
            Self::Blocked => "blocked",
            Self::Scanned => "scanned",
            Self::CipherEncoded => "cipher-encoded",
        }
    }
}

impl fmt::Display for PdfClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageUsability {
    Usable,
    Empty,
    Garbled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Pages with fewer non-whitespace characters are empty.
    pub min_page_chars: usize,
    /// Share of symbol characters above which a page is garbled.
    pub max_garbled_ratio: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_page_chars: 20,
            max_garbled_ratio: 0.45,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAssessment {
    pub page_number: u32,
    pub usability: PageUsability,
    /// The page carries a known cipher signature.
    pub cipher: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classification: PdfClassification,
    pub pages: Vec<PageAssessment>,
}

impl ClassificationReport {
    pub fn pages_where(&self, pred: impl Fn(&PageAssessment) -> bool) -> Vec<u32> {
        self.pages.iter().filter(|p| pred(p)).map(|p| p.page_number).collect()
    }

    pub fn unusable_pages(&self) -> Vec<u32> {
        self.pages_where(|p| p.usability != PageUsability::Usable)
    }
}

const COMMON_PUNCTUATION: &str = ".,:;/$-()%&'\"#*+_@|°ºª¿?¡!";

fn symbol_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut odd = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if !c.is_alphanumeric() && !COMMON_PUNCTUATION.contains(c) {
            odd += 1;
        }
    }
    if total == 0 { 0.0 } else { odd as f64 / total as f64 }
}

#[derive(Debug, Clone, Default)]
pub struct PdfClassifier {
    config: ClassifierConfig,
    decoder: CipherDecoder,
}

impl PdfClassifier {
    pub fn new(config: ClassifierConfig, decoder: CipherDecoder) -> Self {
        Self { config, decoder }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn assess_page(&self, page: &PageText) -> PageAssessment {
        let cipher = self.decoder.needs_decoding(page);
        let usability = if cipher {
            PageUsability::Garbled
        } else if page.char_count() < self.config.min_page_chars {
            PageUsability::Empty
        } else if symbol_ratio(&page.text) > self.config.max_garbled_ratio {
            PageUsability::Garbled
        } else {
            PageUsability::Usable
        };
        PageAssessment {
            page_number: page.page_number,
            usability,
            cipher,
        }
    }

    /// First matching rule wins: cipher, all usable, some usable, images, otherwise blocked.
    pub fn classify(&self, pages: &[PageText], facts: &DocumentFacts) -> ClassificationReport {
        let assessed: Vec<PageAssessment> = pages.iter().map(|p| self.assess_page(p)).collect();
        let usable = assessed
            .iter()
            .filter(|a| a.usability == PageUsability::Usable)
            .count();

        let classification = if assessed.iter().any(|a| a.cipher) {
            PdfClassification::CipherEncoded
        } else if !assessed.is_empty() && usable == assessed.len() {
            PdfClassification::Native
        } else if usable > 0 {
            PdfClassification::NativePartial
        } else if facts.has_images() {
            PdfClassification::Scanned
        } else {
            PdfClassification::Blocked
        };

        ClassificationReport {
            classification,
            pages: assessed,
        }
    }
}
