//! String cleanup for extracted PDF text. No bank or money knowledge here.

/// Collapse runs of whitespace into single spaces and trim.
pub fn clean_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace control characters (other than `\n`, `\r`, `\t`) with spaces.
pub fn remove_non_printable(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_control() && !matches!(c, '\n' | '\r' | '\t') {
                ' '
            } else {
                c
            }
        })
        .collect()
}

pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Cleanup every extractor applies before handing text to parsers.
///
/// Line breaks are preserved: parsers work line by line.
pub fn clean_pdf_text(text: &str) -> String {
    normalize_line_endings(&remove_non_printable(text))
}

/// Whether a line was overprinted (two identical text layers interleaved: `RREECCIIBBIIDDOO`).
///
/// Looks at the first 20 alphanumerics; more than 70% identical pairs means doubled.
pub fn looks_doubled(text: &str) -> bool {
    let alnum: Vec<char> = text.chars().filter(|c| c.is_alphanumeric()).take(20).collect();
    if alnum.len() < 6 {
        return false;
    }
    let pairs = alnum.len() / 2;
    let same = alnum.chunks_exact(2).filter(|p| p[0] == p[1]).count();
    pairs > 0 && same as f64 / pairs as f64 > 0.7
}

/// Reduce every run of two identical characters to one: `22--EENNEE` → `2-ENE`.
pub fn collapse_doubled_chars(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() / 2 + 1);
    let mut i = 0;
    while i < chars.len() {
        out.push(chars[i]);
        if i + 1 < chars.len() && chars[i] == chars[i + 1] {
            i += 2;
        } else {
            i += 1;
        }
    }
    out
}
