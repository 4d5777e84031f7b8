//! Native text-layer extraction with lopdf.
//!
//! Each page's content stream is walked while tracking the graphics and text matrices.
//! Every shown string becomes one or more positioned runs; runs on the same baseline are
//! merged into words and lines. Glyph widths are estimated (half an em per character), so
//! word boxes are approximate but consistent within a document.
//!
//! Composite (Type0) fonts without a ToUnicode entry for a code emit `(cid:N)`, which is
//! what cipher-encoded statements look like before decoding.

use std::collections::HashMap;
use std::path::Path;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tally_core::text::clean_pdf_text;
use tally_core::{ExtractionError, PageText, Word};
use tracing::debug;

use super::{DocumentFacts, DocumentProbe, TextExtractor, file_label};

type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
const GLYPH_WIDTH_EM: f64 = 0.5;
const DEFAULT_PAGE_HEIGHT: f64 = 792.0;

fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn translate(tx: f64, ty: f64) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn operand(operands: &[Object], i: usize) -> f64 {
    operands.get(i).and_then(number).unwrap_or(0.0)
}

#[derive(Debug, Clone, Default)]
struct FontInfo {
    composite: bool,
    to_unicode: HashMap<u32, String>,
}

/// Text shown at one position, before word merging. `y` is the PDF baseline (origin bottom-left).
#[derive(Debug, Clone)]
struct Run {
    text: String,
    x0: f64,
    x1: f64,
    y: f64,
    size: f64,
}

#[derive(Debug, Default)]
struct PageScan {
    runs: Vec<Run>,
    has_images: bool,
}

struct TextState {
    ctm: Matrix,
    saved: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    leading: f64,
    size: f64,
    char_spacing: f64,
    word_spacing: f64,
    h_scale: f64,
    font: Option<Vec<u8>>,
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: IDENTITY,
            saved: Vec::new(),
            tm: IDENTITY,
            tlm: IDENTITY,
            leading: 0.0,
            size: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            font: None,
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.tlm = multiply(&translate(tx, ty), &self.tlm);
        self.tm = self.tlm;
    }

    fn advance(&mut self, tx: f64) {
        self.tm = multiply(&translate(tx, 0.0), &self.tm);
    }

    /// Lay out `text` from the current text position, splitting runs at whitespace.
    fn show(&mut self, text: &str, runs: &mut Vec<Run>) {
        let m = multiply(&self.tm, &self.ctm);
        let v_scale = (m[2] * m[2] + m[3] * m[3]).sqrt();
        let eff_size = (self.size * v_scale).abs();
        let mut offset = 0.0;
        let mut current: Option<(String, f64)> = None;

        for ch in text.chars() {
            let mut width = GLYPH_WIDTH_EM * self.size + self.char_spacing;
            if ch == ' ' {
                width += self.word_spacing;
            }
            width *= self.h_scale;
            if ch.is_whitespace() {
                if let Some((word, start)) = current.take() {
                    runs.push(Run {
                        text: word,
                        x0: m[4] + m[0] * start,
                        x1: m[4] + m[0] * offset,
                        y: m[5],
                        size: eff_size,
                    });
                }
            } else {
                current.get_or_insert_with(|| (String::new(), offset)).0.push(ch);
            }
            offset += width;
        }
        if let Some((word, start)) = current {
            runs.push(Run {
                text: word,
                x0: m[4] + m[0] * start,
                x1: m[4] + m[0] * offset,
                y: m[5],
                size: eff_size,
            });
        }
        self.advance(offset);
    }
}

/// Look a key up on the page, then up the page tree (Resources and MediaBox are inheritable).
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..16 {
        if let Ok(value) = node.get(key) {
            return doc.dereference(value).ok().map(|(_, obj)| obj);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resource_dict<'a>(doc: &'a Document, resources: Option<&'a Dictionary>, kind: &[u8]) -> Option<&'a Dictionary> {
    let entry = resources?.get(kind).ok()?;
    doc.dereference(entry).ok()?.1.as_dict().ok()
}

fn page_height(doc: &Document, page_id: ObjectId) -> f64 {
    inherited(doc, page_id, b"MediaBox")
        .and_then(|obj| obj.as_array().ok())
        .filter(|arr| arr.len() >= 4)
        .and_then(|arr| Some(number(&arr[3])? - number(&arr[1])?))
        .unwrap_or(DEFAULT_PAGE_HEIGHT)
}

fn stream_bytes(doc: &Document, obj: &Object) -> Option<Vec<u8>> {
    let (_, target) = doc.dereference(obj).ok()?;
    let stream = target.as_stream().ok()?;
    Some(stream.decompressed_content().unwrap_or_else(|_| stream.content.clone()))
}

fn hex_tokens(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = line;
    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start + 1..].find('>') else {
            break;
        };
        tokens.push(
            rest[start + 1..start + 1 + len]
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect(),
        );
        rest = &rest[start + 2 + len..];
    }
    tokens
}

/// `None` for anything but hex digits; a lossy-decoded stream can carry multi-byte chars.
fn hex_units(token: &str) -> Option<Vec<u16>> {
    if !token.is_ascii() {
        return None;
    }
    if token.is_empty() || token.len() % 4 != 0 {
        return u16::from_str_radix(token, 16).ok().map(|u| vec![u]);
    }
    (0..token.len())
        .step_by(4)
        .map(|i| u16::from_str_radix(&token[i..i + 4], 16).ok())
        .collect()
}

fn sections<'a>(cmap: &'a str, begin: &str, end: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut rest = cmap;
    while let Some(start) = rest.find(begin) {
        let body = &rest[start + begin.len()..];
        let stop = body.find(end).unwrap_or(body.len());
        out.push(&body[..stop]);
        rest = &body[stop..];
    }
    out
}

/// bfchar and bfrange entries of a ToUnicode CMap.
fn parse_to_unicode(cmap: &str) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    for section in sections(cmap, "beginbfchar", "endbfchar") {
        for line in section.lines() {
            let tokens = hex_tokens(line);
            let [src, dst] = tokens.as_slice() else {
                continue;
            };
            if let (Ok(code), Some(units)) = (u32::from_str_radix(src, 16), hex_units(dst)) {
                map.insert(code, String::from_utf16_lossy(&units));
            }
        }
    }
    for section in sections(cmap, "beginbfrange", "endbfrange") {
        for line in section.lines() {
            let tokens = hex_tokens(line);
            if tokens.len() < 3 {
                continue;
            }
            let (Ok(lo), Ok(hi)) = (u32::from_str_radix(&tokens[0], 16), u32::from_str_radix(&tokens[1], 16)) else {
                continue;
            };
            if line.contains('[') {
                for (code, dst) in (lo..=hi).zip(&tokens[2..]) {
                    if let Some(units) = hex_units(dst) {
                        map.insert(code, String::from_utf16_lossy(&units));
                    }
                }
            } else if let Some(base) = hex_units(&tokens[2]) {
                for (i, code) in (lo..=hi).take(0x1_0000).enumerate() {
                    let mut units = base.clone();
                    if let Some(last) = units.last_mut() {
                        *last = last.wrapping_add(i as u16);
                    }
                    map.insert(code, String::from_utf16_lossy(&units));
                }
            }
        }
    }
    map
}

fn page_fonts(doc: &Document, resources: Option<&Dictionary>) -> HashMap<Vec<u8>, FontInfo> {
    let mut fonts = HashMap::new();
    let Some(dict) = resource_dict(doc, resources, b"Font") else {
        return fonts;
    };
    for (name, obj) in dict.iter() {
        let Some(font) = doc.dereference(obj).ok().and_then(|(_, f)| f.as_dict().ok()) else {
            continue;
        };
        let composite = font
            .get(b"Subtype")
            .and_then(|s| s.as_name())
            .map(|n| n == b"Type0")
            .unwrap_or(false);
        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|obj| stream_bytes(doc, obj))
            .map(|bytes| parse_to_unicode(&String::from_utf8_lossy(&bytes)))
            .unwrap_or_default();
        fonts.insert(name.clone(), FontInfo { composite, to_unicode });
    }
    fonts
}

/// UTF-16BE with BOM, then UTF-8, then Latin-1.
fn decode_plain(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&units) {
            return s;
        }
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn decode_string(bytes: &[u8], font: Option<&FontInfo>) -> String {
    match font {
        Some(f) if f.composite => bytes
            .chunks(2)
            .map(|c| {
                let code = if c.len() == 2 {
                    u32::from(u16::from_be_bytes([c[0], c[1]]))
                } else {
                    u32::from(c[0])
                };
                f.to_unicode
                    .get(&code)
                    .cloned()
                    .unwrap_or_else(|| format!("(cid:{code})"))
            })
            .collect(),
        Some(f) if !f.to_unicode.is_empty() => bytes
            .iter()
            .map(|&b| {
                f.to_unicode
                    .get(&u32::from(b))
                    .cloned()
                    .unwrap_or_else(|| char::from(b).to_string())
            })
            .collect(),
        _ => decode_plain(bytes),
    }
}

fn is_image_xobject(doc: &Document, xobjects: Option<&Dictionary>, name: &[u8]) -> bool {
    xobjects
        .and_then(|d| d.get(name).ok())
        .and_then(|obj| doc.dereference(obj).ok())
        .and_then(|(_, obj)| obj.as_stream().ok())
        .and_then(|s| s.dict.get(b"Subtype").ok())
        .and_then(|s| s.as_name().ok())
        .map(|n| n == b"Image")
        .unwrap_or(false)
}

fn scan_page(doc: &Document, page_id: ObjectId) -> PageScan {
    let mut scan = PageScan::default();
    let content = match doc.get_page_content(page_id).map(|bytes| Content::decode(&bytes)) {
        Ok(Ok(content)) => content,
        Ok(Err(err)) | Err(err) => {
            debug!(?page_id, error = %err, "page content unreadable");
            return scan;
        }
    };
    let resources = inherited(doc, page_id, b"Resources").and_then(|r| r.as_dict().ok());
    let fonts = page_fonts(doc, resources);
    let xobjects = resource_dict(doc, resources, b"XObject");
    let mut st = TextState::new();

    for op in &content.operations {
        let ops = op.operands.as_slice();
        match op.operator.as_str() {
            "q" => st.saved.push(st.ctm),
            "Q" => st.ctm = st.saved.pop().unwrap_or(IDENTITY),
            "cm" if ops.len() == 6 => {
                let m = [0, 1, 2, 3, 4, 5].map(|i| operand(ops, i));
                st.ctm = multiply(&m, &st.ctm);
            }
            "BT" => {
                st.tm = IDENTITY;
                st.tlm = IDENTITY;
            }
            "Tf" => {
                st.font = ops.first().and_then(|o| o.as_name().ok()).map(<[u8]>::to_vec);
                st.size = operand(ops, 1);
            }
            "TL" => st.leading = operand(ops, 0),
            "Tc" => st.char_spacing = operand(ops, 0),
            "Tw" => st.word_spacing = operand(ops, 0),
            "Tz" => st.h_scale = operand(ops, 0) / 100.0,
            "Td" => st.move_line(operand(ops, 0), operand(ops, 1)),
            "TD" => {
                st.leading = -operand(ops, 1);
                st.move_line(operand(ops, 0), operand(ops, 1));
            }
            "Tm" if ops.len() == 6 => {
                st.tlm = [0, 1, 2, 3, 4, 5].map(|i| operand(ops, i));
                st.tm = st.tlm;
            }
            "T*" => st.move_line(0.0, -st.leading),
            "Tj" | "'" | "\"" => {
                if op.operator == "\"" {
                    st.word_spacing = operand(ops, 0);
                    st.char_spacing = operand(ops, 1);
                }
                if op.operator != "Tj" {
                    st.move_line(0.0, -st.leading);
                }
                let font = st.font.as_ref().and_then(|f| fonts.get(f));
                if let Some(Object::String(bytes, _)) = ops.last() {
                    let text = decode_string(bytes, font);
                    st.show(&text, &mut scan.runs);
                }
            }
            "TJ" => {
                let font = st.font.as_ref().and_then(|f| fonts.get(f));
                if let Some(Object::Array(items)) = ops.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => {
                                let text = decode_string(bytes, font);
                                st.show(&text, &mut scan.runs);
                            }
                            other => {
                                if let Some(adjust) = number(other) {
                                    st.advance(-adjust / 1000.0 * st.size * st.h_scale);
                                }
                            }
                        }
                    }
                }
            }
            "Do" => {
                let name = ops.first().and_then(|o| o.as_name().ok());
                if name.is_some_and(|n| is_image_xobject(doc, xobjects, n)) {
                    scan.has_images = true;
                }
            }
            "BI" | "ID" | "EI" => scan.has_images = true,
            _ => {}
        }
    }
    scan
}

/// Merge runs into words and lines. Coordinates flip to a top-left origin.
fn assemble(mut runs: Vec<Run>, height: f64) -> (String, Vec<Word>) {
    runs.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x0.total_cmp(&b.x0)));

    let mut lines: Vec<Vec<Run>> = Vec::new();
    for run in runs {
        match lines.last_mut() {
            Some(line) if (line[0].y - run.y).abs() <= (line[0].size * 0.3).max(1.0) => line.push(run),
            _ => lines.push(vec![run]),
        }
    }

    let mut text_lines = Vec::with_capacity(lines.len());
    let mut words = Vec::new();
    for mut line in lines {
        line.sort_by(|a, b| a.x0.total_cmp(&b.x0));
        let mut line_words: Vec<Word> = Vec::new();
        for run in line {
            let top = height - run.y - run.size;
            let bottom = height - run.y;
            match line_words.last_mut() {
                Some(last) if run.x0 - last.x1 < run.size * 0.15 => {
                    last.text.push_str(&run.text);
                    last.x1 = last.x1.max(run.x1);
                }
                _ => line_words.push(Word::new(run.text, run.x0, run.x1, top, bottom)),
            }
        }
        text_lines.push(
            line_words
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        );
        words.extend(line_words);
    }
    (clean_pdf_text(&text_lines.join("\n")), words)
}

/// Reads the embedded text layer. Also answers structural questions as a [`DocumentProbe`].
#[derive(Debug, Clone, Default)]
pub struct NativeExtractor;

impl NativeExtractor {
    pub fn new() -> Self {
        Self
    }

    fn load(path: &Path) -> Result<(Document, bool), ExtractionError> {
        let file = file_label(path);
        let bytes = std::fs::read(path).map_err(|e| ExtractionError::new(&file, e.to_string()))?;
        let encrypted = bytes.windows(8).any(|w| w == b"/Encrypt");
        let doc = Document::load_mem(&bytes).map_err(|e| ExtractionError::new(&file, e.to_string()))?;
        let encrypted = encrypted || doc.trailer.get(b"Encrypt").is_ok();
        Ok((doc, encrypted))
    }

    fn read(&self, path: &Path, only: Option<&[u32]>) -> Result<Vec<PageText>, ExtractionError> {
        let (doc, _) = Self::load(path)?;
        let pages = doc
            .get_pages()
            .into_iter()
            .filter(|(n, _)| only.is_none_or(|o| o.contains(n)))
            .map(|(number, id)| {
                let scan = scan_page(&doc, id);
                let (text, words) = assemble(scan.runs, page_height(&doc, id));
                PageText::with_words(number, text, words)
            })
            .collect::<Vec<_>>();
        debug!(file = %file_label(path), pages = pages.len(), "native extraction done");
        Ok(pages)
    }
}

impl TextExtractor for NativeExtractor {
    fn name(&self) -> &'static str {
        "native"
    }

    fn extract(&self, path: &Path) -> Result<Vec<PageText>, ExtractionError> {
        self.read(path, None)
    }

    fn extract_pages(&self, path: &Path, pages: &[u32]) -> Result<Vec<PageText>, ExtractionError> {
        self.read(path, Some(pages))
    }
}

impl DocumentProbe for NativeExtractor {
    fn inspect(&self, path: &Path) -> Result<DocumentFacts, ExtractionError> {
        let (doc, copy_protected) = Self::load(path)?;
        let image_pages = doc
            .get_pages()
            .values()
            .map(|&id| scan_page(&doc, id).has_images)
            .collect::<Vec<_>>();
        Ok(DocumentFacts {
            page_count: image_pages.len() as u32,
            copy_protected,
            image_pages,
        })
    }
}
