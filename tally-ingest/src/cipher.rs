//! Glyph-substitution decoding for statements whose text layer is deliberately mis-mapped.
//!
//! HSBC Mexico embeds a custom font laid out like EBCDIC: the text layer carries the
//! wrong code points and every glyph outside Latin-1 comes out as a `(cid:N)` token.
//!   ˆ(cid:228)¯(cid:213)ª`@(cid:201)(cid:213)ª¯˙(cid:217)`(cid:211)   →   CUENTA INTEGRAL
//!   (cid:244)(cid:240)(cid:240)(cid:247)æłıł(cid:240)(cid:244)          →   4007185804
//!
//! The table maps ordinary ASCII letters too ('a' is '/'), so it must only ever touch
//! pages that carry the signature.

use std::collections::HashMap;

use tally_core::PageText;

const CID_OPEN: &str = "(cid:";

const HSBC_GLYPHS: &[(&str, &str)] = &[
    // space and punctuation
    ("@", " "),
    ("K", "."),
    ("k", ","),
    ("a", "/"),
    ("[", "$"),
    ("]", ")"),
    ("M", "("),
    ("l", "%"),
    ("z", ":"),
    ("N", "+"),
    ("O", "*"),
    // uppercase
    ("`", "A"),
    ("\u{b4}", "B"),
    ("\u{2c6}", "C"),
    ("\u{2dc}", "D"),
    ("\u{af}", "E"),
    ("\u{2d8}", "F"),
    ("\u{2d9}", "G"),
    ("\u{a8}", "H"),
    ("(cid:201)", "I"),
    ("(cid:209)", "J"),
    ("(cid:210)", "K"),
    ("(cid:211)", "L"),
    ("(cid:212)", "M"),
    ("(cid:213)", "N"),
    ("(cid:214)", "O"),
    ("(cid:215)", "P"),
    ("(cid:216)", "Q"),
    ("(cid:217)", "R"),
    ("(cid:226)", "S"),
    ("\u{aa}", "T"),
    ("(cid:228)", "U"),
    ("(cid:229)", "V"),
    ("(cid:230)", "W"),
    ("(cid:231)", "X"),
    ("(cid:232)", "Y"),
    ("(cid:233)", "Z"),
    // lowercase
    ("(cid:129)", "a"),
    ("(cid:130)", "b"),
    ("(cid:131)", "c"),
    ("(cid:132)", "d"),
    ("(cid:133)", "e"),
    ("(cid:134)", "f"),
    ("(cid:135)", "g"),
    ("(cid:136)", "h"),
    ("(cid:137)", "i"),
    ("(cid:145)", "j"),
    ("(cid:146)", "k"),
    ("(cid:147)", "l"),
    ("(cid:148)", "m"),
    ("(cid:149)", "n"),
    ("(cid:150)", "o"),
    ("(cid:151)", "p"),
    ("(cid:152)", "q"),
    ("(cid:153)", "r"),
    ("\u{a2}", "s"),
    ("\u{a3}", "t"),
    ("\u{2044}", "u"),
    ("\u{a5}", "v"),
    ("\u{192}", "w"),
    // digits
    ("(cid:240)", "0"),
    ("\u{e6}", "1"),
    ("(cid:242)", "2"),
    ("(cid:243)", "3"),
    ("(cid:244)", "4"),
    ("\u{131}", "5"),
    ("(cid:246)", "6"),
    ("(cid:247)", "7"),
    ("\u{142}", "8"),
    ("\u{f8}", "9"),
    // Spanish letters
    ("(cid:238)", "Ñ"),
    ("\u{2db}", "ó"),
    ("(cid:254)", "ú"),
    ("(cid:222)", "ú"),
    ("(cid:190)", "'"),
    // dashes
    ("\u{2019}", "-"),
    ("\u{2018}", "-"),
    ("\u{203a}", "-"),
    ("\u{c6}", "-"),
];

/// One issuer's substitution table. Tokens are either a single character or `(cid:N)`.
#[derive(Debug, Clone)]
pub struct CipherTable {
    name: String,
    signature: String,
    map: HashMap<String, String>,
}

impl CipherTable {
    pub fn new<'a>(
        name: impl Into<String>,
        signature: impl Into<String>,
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self {
            name: name.into(),
            signature: signature.into(),
            map: entries
                .into_iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }

    pub fn hsbc() -> Self {
        Self::new("HSBC", CID_OPEN, HSBC_GLYPHS.iter().copied())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn matches(&self, text: &str) -> bool {
        text.contains(&self.signature)
    }

    /// Total: unmapped tokens pass through unchanged.
    pub fn decode(&self, encoded: &str) -> String {
        let mut out = String::with_capacity(encoded.len());
        let mut rest = encoded;
        while let Some(ch) = rest.chars().next() {
            let close = rest
                .strip_prefix(CID_OPEN)
                .and_then(|tail| tail.find(')'));
            if let Some(close) = close {
                let token = &rest[..CID_OPEN.len() + close + 1];
                out.push_str(self.map.get(token).map(String::as_str).unwrap_or(token));
                rest = &rest[token.len()..];
                continue;
            }
            let token = &rest[..ch.len_utf8()];
            out.push_str(self.map.get(token).map(String::as_str).unwrap_or(token));
            rest = &rest[ch.len_utf8()..];
        }
        out
    }
}

/// `(cid:` tokens a table failed to resolve.
pub fn residual_tokens(text: &str) -> usize {
    text.matches(CID_OPEN).count()
}

/// The registered tables, tried in order.
#[derive(Debug, Clone)]
pub struct CipherDecoder {
    tables: Vec<CipherTable>,
}

impl Default for CipherDecoder {
    fn default() -> Self {
        Self::new(vec![CipherTable::hsbc()])
    }
}

impl CipherDecoder {
    pub fn new(tables: Vec<CipherTable>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &[CipherTable] {
        &self.tables
    }

    pub fn detect(&self, text: &str) -> Option<&CipherTable> {
        self.tables.iter().find(|t| t.matches(text))
    }

    fn page_table(&self, page: &PageText) -> Option<&CipherTable> {
        self.detect(&page.text)
            .or_else(|| page.words.iter().find_map(|w| self.detect(&w.text)))
    }

    pub fn needs_decoding(&self, page: &PageText) -> bool {
        self.page_table(page).is_some()
    }

    /// Decode a page's text and words if it carries a table's signature. Clean pages are
    /// returned untouched.
    pub fn decode_page(&self, page: PageText) -> (PageText, Option<String>) {
        let Some(table) = self.page_table(&page) else {
            return (page, None);
        };
        let words = page.words.iter().map(|w| w.with_text(table.decode(&w.text))).collect();
        let decoded = PageText::with_words(page.page_number, table.decode(&page.text), words);
        (decoded, Some(table.name().to_string()))
    }

    /// Decode every page that needs it; returns the decoded page numbers.
    pub fn decode_pages(&self, pages: Vec<PageText>) -> (Vec<PageText>, Vec<u32>) {
        let mut decoded = Vec::new();
        let pages = pages
            .into_iter()
            .map(|p| {
                let (page, table) = self.decode_page(p);
                if table.is_some() {
                    decoded.push(page.page_number);
                }
                page
            })
            .collect();
        (pages, decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::Word;

    #[test]
    fn decodes_account_header_and_digits() {
        let table = CipherTable::hsbc();
        assert_eq!(
            table.decode("ˆ(cid:228)¯(cid:213)ª`@(cid:201)(cid:213)ª¯˙(cid:217)`(cid:211)"),
            "CUENTA INTEGRAL"
        );
        assert_eq!(
            table.decode("(cid:244)(cid:240)(cid:240)(cid:247)æłıł(cid:240)(cid:244)"),
            "4007185804"
        );
    }

    #[test]
    fn unmapped_tokens_pass_through() {
        let table = CipherTable::hsbc();
        assert_eq!(table.decode("(cid:999)\n#"), "(cid:999)\n#");
        assert_eq!(table.decode("(cid:12"), "(cid:12");
        assert_eq!(residual_tokens("(cid:999) ok (cid:1)"), 2);
    }

    #[test]
    fn clean_pages_are_never_decoded() {
        let decoder = CipherDecoder::default();
        let clean = PageText::new(1, "SALDO anterior 1,000.00");
        let (page, table) = decoder.decode_page(clean.clone());
        assert_eq!(page, clean);
        assert!(table.is_none());
    }

    #[test]
    fn words_are_decoded_with_the_page() {
        let decoder = CipherDecoder::default();
        let page = PageText::with_words(
            2,
            "(cid:215)`˙(cid:214)",
            vec![Word::new("(cid:215)`˙(cid:214)", 10.0, 40.0, 5.0, 15.0)],
        );
        let (pages, decoded) = decoder.decode_pages(vec![page, PageText::new(3, "plain")]);
        assert_eq!(decoded, vec![2]);
        assert_eq!(pages[0].text, "PAGO");
        assert_eq!(pages[0].words[0].text, "PAGO");
        assert_eq!(pages[0].words[0].x0, 10.0);
        assert_eq!(pages[1].text, "plain");
    }
}
