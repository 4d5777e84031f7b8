//! Extraction port: per-page text (and word positions) from a PDF on disk.
//!
//! Two strategies implement the same trait, native text-layer reading and OCR, so the
//! hybrid pipeline never needs to know which one produced a page.

pub mod native;
pub mod ocr;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tally_core::{ExtractionError, PageText};

pub use native::NativeExtractor;
pub use ocr::{OcrConfig, OcrExtractor};

pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Every page of the document, in page order.
    fn extract(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError>;

    /// Only the given 1-based pages. Unknown page numbers are ignored.
    fn extract_pages(&self, path: &Path, pages: &[u32]) -> Result<Vec<PageText>, ExtractionError> {
        Ok(self
            .extract(path)?
            .into_iter()
            .filter(|p| pages.contains(&p.page_number))
            .collect())
    }
}

/// Structural facts about a document that text alone cannot tell.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentFacts {
    pub page_count: u32,
    pub copy_protected: bool,
    /// Indexed by page number minus one.
    pub image_pages: Vec<bool>,
}

impl DocumentFacts {
    pub fn has_images(&self) -> bool {
        self.image_pages.iter().any(|&i| i)
    }

    pub fn is_image_page(&self, page_number: u32) -> bool {
        page_number
            .checked_sub(1)
            .and_then(|i| self.image_pages.get(i as usize))
            .copied()
            .unwrap_or(false)
    }
}

pub trait DocumentProbe: Send + Sync {
    fn inspect(&self, path: &Path) -> Result<DocumentFacts, ExtractionError>;
}

/// File name used in errors and logs.
pub fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
