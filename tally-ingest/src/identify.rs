//! Which bank issued this statement?
//!
//! Keyword catalog, most specific first. The header (first 20 lines) is searched before the
//! whole text because movement concepts name other banks: "SPEI A BBVA", "PAGO SANTANDER".

use tally_core::{PageText, types::joined_text};

const HEADER_LINES: usize = 20;
const PAGES_SEARCHED: usize = 2;

const DEFAULT_CATALOG: &[(&str, &[&str])] = &[
    // "BBVA" alone last: other banks print it inside transfer concepts
    ("BBVA", &["BBVA BANCOMER", "BBVA MEXICO", "BBVA MÉXICO", "BANCOMER", "BBVA"]),
    // some Banorte statements only name the product
    ("BANORTE", &["BANCO MERCANTIL DEL NORTE", "BANORTE", "ENLACE GLOBAL", "ENLACE NEGOCIOS"]),
    ("HSBC", &["HSBC MÉXICO", "HSBC MEXICO", "HSBC"]),
    (
        "CITIBANAMEX",
        &["CITIBANAMEX", "BANAMEX", "BANCO NACIONAL DE MEXICO", "BANCO NACIONAL DE MÉXICO"],
    ),
    // after CITIBANAMEX so that name never reads as CITI
    ("CITI", &["CITIBANK", "CITI BANK"]),
    ("SANTANDER", &["SANTANDER", "BANCO SANTANDER"]),
    ("SCOTIABANK", &["SCOTIABANK", "SCOTIA"]),
    ("MONEX", &["BANCO MONEX", "MONEX"]),
    ("SABADELL", &["BANCO SABADELL", "SABADELL"]),
    ("BANREGIO", &["BANREGIO", "BANCO REGIONAL"]),
    ("INBURSA", &["INBURSA", "BANCO INBURSA"]),
    ("INTERCAM", &["INTERCAM", "BANCO INTERCAM"]),
    ("BANKAOOL", &["BANKAOOL"]),
    ("BANK_OF_AMERICA", &["BANK OF AMERICA"]),
    ("VANTAGE_BANK", &["VANTAGE BANK", "VANTAGE"]),
    ("JP_MORGAN", &["J.P. MORGAN", "JPMORGAN", "JP MORGAN"]),
    ("BX_PLUS", &["BX+", "BANCO VE POR MÁS", "BANCO VE POR MAS"]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub bank: String,
    keywords: Vec<String>,
}

impl CatalogEntry {
    pub fn new(bank: impl Into<String>, keywords: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            bank: bank.into(),
            keywords: keywords.into_iter().map(|k| k.as_ref().to_uppercase()).collect(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    fn matches(&self, upper: &str) -> bool {
        self.keywords.iter().any(|k| upper.contains(k.as_str()))
    }
}

/// Read-only after construction; shared by every file in a batch.
#[derive(Debug, Clone)]
pub struct BankIdentifier {
    catalog: Vec<CatalogEntry>,
}

impl Default for BankIdentifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_CATALOG
                .iter()
                .map(|(bank, keywords)| CatalogEntry::new(*bank, keywords.iter())),
        )
    }
}

impl BankIdentifier {
    pub fn new(catalog: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            catalog: catalog.into_iter().collect(),
        }
    }

    pub fn supported_banks(&self) -> Vec<&str> {
        self.catalog.iter().map(|e| e.bank.as_str()).collect()
    }

    fn first_match(&self, text: &str) -> Option<&str> {
        let upper = text.to_uppercase();
        self.catalog
            .iter()
            .find(|e| e.matches(&upper))
            .map(|e| e.bank.as_str())
    }

    /// Header first, then the whole text. Within a phase the earliest catalog entry wins.
    pub fn identify_text(&self, text: &str) -> Option<&str> {
        let header = text.split('\n').take(HEADER_LINES).collect::<Vec<_>>().join("\n");
        self.first_match(&header).or_else(|| self.first_match(text))
    }

    /// Looks at the first two pages only.
    pub fn identify(&self, pages: &[PageText]) -> Option<&str> {
        let head = &pages[..pages.len().min(PAGES_SEARCHED)];
        self.identify_text(&joined_text(head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_beats_body_mentions() {
        let mut text = String::from("Banco Santander Mexico\nESTADO DE CUENTA\n");
        for i in 0..25 {
            text.push_str(&format!("linea {i}\n"));
        }
        text.push_str("SPEI ENVIADO BBVA BANCOMER\n");
        assert_eq!(BankIdentifier::default().identify_text(&text), Some("SANTANDER"));
    }

    #[test]
    fn earlier_entry_wins_within_a_phase() {
        let id = BankIdentifier::default();
        assert_eq!(id.identify_text("CITIBANAMEX\nCITIBANK N.A."), Some("CITIBANAMEX"));
        assert_eq!(id.identify_text("scotiabank inverlat / bbva"), Some("BBVA"));
    }

    #[test]
    fn falls_back_to_full_text() {
        let mut text = "x\n".repeat(30);
        text.push_str("Vantage Bank Texas");
        assert_eq!(BankIdentifier::default().identify_text(&text), Some("VANTAGE_BANK"));
    }

    #[test]
    fn only_first_two_pages_count() {
        let pages = vec![
            PageText::new(1, "estado de cuenta"),
            PageText::new(2, "detalle"),
            PageText::new(3, "BANORTE"),
        ];
        assert_eq!(BankIdentifier::default().identify(&pages), None);
    }

    #[test]
    fn custom_catalog_order() {
        let id = BankIdentifier::new([
            CatalogEntry::new("GENERIC", ["banco"]),
            CatalogEntry::new("SPECIFIC", ["banco especifico"]),
        ]);
        assert_eq!(id.identify_text("BANCO ESPECIFICO"), Some("GENERIC"));
        assert_eq!(id.supported_banks(), vec!["GENERIC", "SPECIFIC"]);
        assert_eq!(BankIdentifier::default().supported_banks().len(), 17);
    }
}
