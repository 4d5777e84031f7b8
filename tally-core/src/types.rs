use serde::{Deserialize, Serialize};

/// One word with its bounding box, in PDF points with the origin at the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub x0: f64,
    pub x1: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Word {
    pub fn new(text: impl Into<String>, x0: f64, x1: f64, top: f64, bottom: f64) -> Self {
        Self {
            text: text.into(),
            x0,
            x1,
            top,
            bottom,
        }
    }

    pub fn center_x(&self) -> f64 {
        (self.x0 + self.x1) / 2.0
    }

    pub fn center_y(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }

    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..self.clone()
        }
    }
}

/// Extracted content of one page. `page_number` is 1-based and stable across strategies.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
    #[serde(default)]
    pub words: Vec<Word>,
}

impl PageText {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
            words: Vec::new(),
        }
    }

    pub fn with_words(page_number: u32, text: impl Into<String>, words: Vec<Word>) -> Self {
        Self {
            page_number,
            text: text.into(),
            words,
        }
    }

    pub fn empty(page_number: u32) -> Self {
        Self::new(page_number, "")
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn has_words(&self) -> bool {
        !self.words.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }

    /// Count of non-whitespace characters.
    pub fn char_count(&self) -> usize {
        self.text.chars().filter(|c| !c.is_whitespace()).count()
    }

    pub fn without_words(self) -> Self {
        Self {
            words: Vec::new(),
            ..self
        }
    }
}

/// Join the text of the given pages with newlines.
pub fn joined_text(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_emptiness_ignores_whitespace() {
        assert!(PageText::new(1, "  \n\t ").is_empty());
        assert!(!PageText::new(1, "x").is_empty());
        assert_eq!(PageText::new(1, "a b\nc").char_count(), 3);
    }

    #[test]
    fn word_centers() {
        let w = Word::new("1,250.00", 400.0, 440.0, 100.0, 110.0);
        assert_eq!(w.center_x(), 420.0);
        assert_eq!(w.center_y(), 105.0);
    }

    #[test]
    fn lines_split_on_newline() {
        let p = PageText::new(2, "uno\ndos\n");
        assert_eq!(p.lines().collect::<Vec<_>>(), vec!["uno", "dos", ""]);
    }
}
