//! Rebuilding table rows from word boxes.
//!
//! Native extraction interleaves columns when a statement draws them out of order, so
//! position parsers regroup words themselves: rows by vertical position, columns by
//! horizontal bands calibrated per issuer.

use std::collections::BTreeMap;

use tally_core::Word;

/// One visual line, words left to right.
#[derive(Debug, Clone)]
pub struct Row<'a> {
    pub top: f64,
    pub words: Vec<&'a Word>,
}

impl Row<'_> {
    pub fn text(&self) -> String {
        self.words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ")
    }
}

fn sorted_row(top: f64, mut words: Vec<&Word>) -> Row<'_> {
    words.sort_by(|a, b| a.x0.total_cmp(&b.x0));
    Row { top, words }
}

/// Rows keyed by `top` snapped to a multiple of `step` (`0.1` keeps one decimal, `2.0`
/// absorbs the jitter of looser layouts). Top-down order.
pub fn rows_by_rounded_top(words: &[Word], step: f64) -> Vec<Row<'_>> {
    let step = if step > 0.0 { step } else { 1.0 };
    let mut grouped: BTreeMap<i64, Vec<&Word>> = BTreeMap::new();
    for word in words {
        grouped.entry((word.top / step).round() as i64).or_default().push(word);
    }
    grouped
        .into_iter()
        .map(|(key, words)| sorted_row(key as f64 * step, words))
        .collect()
}

/// Rows where every word sits within `tolerance` of the first word that opened the row.
pub fn rows_by_tolerance(words: &[Word], tolerance: f64) -> Vec<Row<'_>> {
    let mut ordered: Vec<&Word> = words.iter().collect();
    ordered.sort_by(|a, b| a.top.total_cmp(&b.top).then(a.x0.total_cmp(&b.x0)));

    let mut rows: Vec<(f64, Vec<&Word>)> = Vec::new();
    for word in ordered {
        match rows.iter_mut().find(|(top, _)| (word.top - *top).abs() <= tolerance) {
            Some((_, row)) => row.push(word),
            None => rows.push((word.top, vec![word])),
        }
    }
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));
    rows.into_iter().map(|(top, words)| sorted_row(top, words)).collect()
}

/// A column: `[start, end)` on the x axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band<C> {
    pub column: C,
    pub start: f64,
    pub end: f64,
}

impl<C: Copy + PartialEq> Band<C> {
    pub fn new(column: C, start: f64, end: f64) -> Self {
        Self { column, start, end }
    }

    pub fn contains(&self, x: f64) -> bool {
        self.start <= x && x < self.end
    }
}

/// The first band containing `x`.
pub fn band_at<C: Copy + PartialEq>(bands: &[Band<C>], x: f64) -> Option<C> {
    bands.iter().find(|b| b.contains(x)).map(|b| b.column)
}

/// Text per column for one row, words placed by their horizontal center.
#[derive(Debug, Clone)]
pub struct Columns<C> {
    cells: Vec<(C, Vec<String>)>,
}

impl<C: Copy + PartialEq> Columns<C> {
    pub fn split(words: &[&Word], bands: &[Band<C>]) -> Self {
        let mut cells: Vec<(C, Vec<String>)> = bands.iter().map(|b| (b.column, Vec::new())).collect();
        for word in words {
            let Some(column) = band_at(bands, word.center_x()) else {
                continue;
            };
            if let Some((_, parts)) = cells.iter_mut().find(|(c, _)| *c == column) {
                parts.push(word.text.clone());
            }
        }
        Self { cells }
    }

    pub fn get(&self, column: C) -> String {
        self.cells
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, parts)| parts.join(" ").trim().to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(text: &str, x0: f64, top: f64) -> Word {
        Word::new(text, x0, x0 + 10.0 * text.len() as f64 / 2.0, top, top + 8.0)
    }

    #[test]
    fn rounded_rows_are_top_down_and_left_to_right() {
        let words = vec![w("B", 90.0, 100.04), w("A", 10.0, 100.01), w("C", 10.0, 80.0)];
        let rows = rows_by_rounded_top(&words, 0.1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text(), "C");
        assert_eq!(rows[1].text(), "A B");
    }

    #[test]
    fn coarse_step_merges_jitter() {
        let words = vec![w("05-OCT-24", 20.0, 200.9), w("DEP.EFECTIVO", 80.0, 199.8)];
        assert_eq!(rows_by_rounded_top(&words, 2.0).len(), 1);
        assert_eq!(rows_by_rounded_top(&words, 0.1).len(), 2);
    }

    #[test]
    fn tolerance_rows() {
        let words = vec![w("3", 40.0, 300.0), w("PAGO", 70.0, 302.5), w("41234", 300.0, 312.0)];
        let rows = rows_by_tolerance(&words, 4.0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text(), "3 PAGO");
        assert_eq!(rows[0].top, 300.0);
    }

    #[test]
    fn columns_by_center() {
        #[derive(Debug, Clone, Copy, PartialEq)]
        enum Col {
            Concept,
            Amount,
        }
        let bands = [Band::new(Col::Concept, 0.0, 200.0), Band::new(Col::Amount, 200.0, f64::INFINITY)];
        let words = [w("SPEI", 20.0, 0.0), w("ENVIADO", 60.0, 0.0), w("100.00", 195.0, 0.0)];
        let refs: Vec<&Word> = words.iter().collect();
        let cols = Columns::split(&refs, &bands);
        assert_eq!(cols.get(Col::Concept), "SPEI ENVIADO");
        assert_eq!(cols.get(Col::Amount), "100.00");
        assert_eq!(band_at(&bands, 250.0), Some(Col::Amount));
    }
}
