//! OCR extraction: render a page with `pdftoppm`, recognize it with `tesseract`.
//!
//! Tesseract's TSV output has one row per recognized element:
//!   level page_num block_num par_num line_num word_num left top width height conf text
//!   5     1        2         1       3        1        412  990 160   38     91.2 1,250.00
//! Level 5 rows are words; their pixel boxes are scaled back to PDF points.

use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tally_core::text::clean_whitespace;
use tally_core::{ExtractionError, PageText, Word};
use tracing::{debug, warn};

use super::{TextExtractor, file_label};

const WORD_LEVEL: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub languages: String,
    pub dpi: u32,
    pub pdftoppm: String,
    pub tesseract: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: "spa+eng".to_string(),
            dpi: 300,
            pdftoppm: "pdftoppm".to_string(),
            tesseract: "tesseract".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TsvRow {
    level: u8,
    block_num: u32,
    par_num: u32,
    line_num: u32,
    left: f64,
    top: f64,
    width: f64,
    height: f64,
    text: Option<String>,
}

/// Turn tesseract TSV into page text and words. Pixels become points at `72 / dpi`.
pub fn parse_tsv(tsv: &str, dpi: u32) -> Result<(String, Vec<Word>), csv::Error> {
    let dpi = f64::from(dpi.max(1));
    let to_points = |px: f64| px * 72.0 / dpi;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(tsv.as_bytes());

    let mut lines: Vec<((u32, u32, u32), Vec<String>)> = Vec::new();
    let mut words = Vec::new();
    for row in rdr.deserialize::<TsvRow>() {
        let row = row?;
        let Some(text) = row.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            continue;
        };
        if row.level != WORD_LEVEL {
            continue;
        }
        let key = (row.block_num, row.par_num, row.line_num);
        match lines.last_mut() {
            Some((k, line)) if *k == key => line.push(text.to_string()),
            _ => lines.push((key, vec![text.to_string()])),
        }
        words.push(Word::new(
            text,
            to_points(row.left),
            to_points(row.left + row.width),
            to_points(row.top),
            to_points(row.top + row.height),
        ));
    }

    let text = lines
        .iter()
        .map(|(_, line)| clean_whitespace(&line.join(" ")))
        .collect::<Vec<_>>()
        .join("\n");
    Ok((text, words))
}

/// Slow path for pages without a usable text layer.
#[derive(Debug, Clone, Default)]
pub struct OcrExtractor {
    config: OcrConfig,
}

impl OcrExtractor {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Both external tools must be on PATH.
    pub fn check_tools(&self) -> Result<(), String> {
        for tool in [&self.config.pdftoppm, &self.config.tesseract] {
            which::which(tool).map_err(|_| format!("{tool} not found on PATH"))?;
        }
        Ok(())
    }

    fn page_count(path: &Path) -> Result<u32, ExtractionError> {
        lopdf::Document::load(path)
            .map(|doc| doc.get_pages().len() as u32)
            .map_err(|e| ExtractionError::new(file_label(path), e.to_string()))
    }

    fn run(cmd: &mut Command, what: &str) -> Result<Vec<u8>, String> {
        let output = cmd.output().map_err(|e| format!("failed to run {what}: {e}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{what} failed (exit {}): {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ));
        }
        Ok(output.stdout)
    }

    fn recognize(&self, path: &Path, page: u32, workdir: &Path) -> Result<PageText, String> {
        let prefix = workdir.join(format!("page-{page}"));
        let n = page.to_string();
        let dpi = self.config.dpi.to_string();
        Self::run(
            Command::new(&self.config.pdftoppm)
                .args(["-f", n.as_str(), "-l", n.as_str(), "-r", dpi.as_str(), "-png", "-singlefile"])
                .arg(path)
                .arg(&prefix),
            "pdftoppm",
        )?;
        let png = prefix.with_extension("png");
        let stdout = Self::run(
            Command::new(&self.config.tesseract)
                .arg(&png)
                .arg("stdout")
                .args(["-l", self.config.languages.as_str(), "tsv"]),
            "tesseract",
        )?;
        let (text, words) =
            parse_tsv(&String::from_utf8_lossy(&stdout), self.config.dpi).map_err(|e| e.to_string())?;
        Ok(PageText::with_words(page, text, words))
    }
}

impl TextExtractor for OcrExtractor {
    fn name(&self) -> &'static str {
        "ocr"
    }

    fn extract(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError> {
        let count = Self::page_count(path)?;
        self.extract_pages(path, &(1..=count).collect::<Vec<_>>())
    }

    /// A page that fails to render or recognize comes back empty; missing tools fail the call.
    fn extract_pages(&self, path: &Path, pages: &[u32]) -> Result<Vec<PageText>, ExtractionError> {
        let file = file_label(path);
        self.check_tools().map_err(|cause| ExtractionError::new(&file, cause))?;
        let workdir = tempfile::tempdir().map_err(|e| ExtractionError::new(&file, e.to_string()))?;

        let mut sorted = pages.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut out = Vec::with_capacity(sorted.len());
        for page in sorted {
            match self.recognize(path, page, workdir.path()) {
                Ok(text) => {
                    debug!(file = %file, page, chars = text.char_count(), "ocr page done");
                    out.push(text);
                }
                Err(cause) => {
                    warn!(file = %file, page, %cause, "ocr failed for page");
                    out.push(PageText::empty(page));
                }
            }
        }
        Ok(out)
    }
}
