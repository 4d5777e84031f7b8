//! Many files: input discovery, sequential and bounded-parallel runs, and the fold of
//! per-file outcomes into one batch result.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tally_core::{ParseResult, SummaryMismatch};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::processor::{FileFailure, FileOutcome, StatementProcessor};

/// Outcomes keyed by file label, so iteration order does not depend on which worker
/// finished first.
#[derive(Debug, Default)]
pub struct BatchResult {
    outcomes: BTreeMap<String, FileOutcome>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Two inputs with the same file name (from different folders) keep both; the one
    /// inserted second is keyed by its full path.
    pub fn insert(&mut self, outcome: FileOutcome) {
        let key = if self.outcomes.contains_key(&outcome.file) {
            outcome.path.display().to_string()
        } else {
            outcome.file.clone()
        };
        self.outcomes.insert(key, outcome);
    }

    pub fn outcomes(&self) -> impl Iterator<Item = (&str, &FileOutcome)> {
        self.outcomes.iter().map(|(k, o)| (k.as_str(), o))
    }

    pub fn get(&self, file: &str) -> Option<&FileOutcome> {
        self.outcomes.get(file)
    }

    pub fn successes(&self) -> impl Iterator<Item = (&str, &ParseResult)> {
        self.outcomes
            .iter()
            .filter_map(|(k, o)| o.result.as_ref().ok().map(|r| (k.as_str(), r)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &FileFailure)> {
        self.outcomes
            .iter()
            .filter_map(|(k, o)| o.result.as_ref().err().map(|f| (k.as_str(), f)))
    }

    /// Summary mismatches across every successful file.
    pub fn warnings(&self) -> Vec<(&str, &SummaryMismatch)> {
        self.successes()
            .flat_map(|(file, r)| r.warnings().iter().map(move |w| (file, w)))
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn total_movements(&self) -> usize {
        self.successes().map(|(_, r)| r.movements().len()).sum()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// True when files were given but none of them produced a result.
    pub fn all_failed(&self) -> bool {
        !self.is_empty() && self.success_count() == 0
    }

    fn log_summary(&self) {
        info!(
            received = self.len(),
            processed = self.success_count(),
            failed = self.failure_count(),
            movements = self.total_movements(),
            warnings = self.warnings().len(),
            "batch complete"
        );
    }
}

impl StatementProcessor {
    /// One file after another on the calling thread.
    pub fn process_paths(&self, paths: &[PathBuf]) -> BatchResult {
        let mut batch = BatchResult::new();
        for path in paths {
            batch.insert(self.process_file(path));
        }
        batch.log_summary();
        batch
    }

    /// At most `workers` files in flight at once, each on the blocking pool. A worker that
    /// panics costs only its own file.
    pub async fn process_paths_parallel(self: &Arc<Self>, paths: Vec<PathBuf>, workers: usize) -> BatchResult {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut tasks = JoinSet::new();

        for (index, path) in paths.into_iter().enumerate() {
            let processor = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let target = path.clone();
                let outcome = match tokio::task::spawn_blocking(move || processor.process_file(&target)).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "worker failed");
                        FileOutcome::crashed(&path, format!("worker failed: {e}"))
                    }
                };
                (index, outcome)
            });
        }

        let mut finished = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(done) => finished.push(done),
                Err(e) => error!(error = %e, "batch task failed"),
            }
        }
        // input order decides which of two same-named files keeps the short key
        finished.sort_by_key(|(index, _)| *index);
        let mut batch = BatchResult::new();
        for (_, outcome) in finished {
            batch.insert(outcome);
        }
        batch.log_summary();
        batch
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// A single file is taken as given; a folder yields its `*.pdf` files (any case), sorted.
pub fn collect_inputs(path: &Path, recursive: bool) -> io::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut found = Vec::new();
    walk(path, recursive, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, recursive: bool, found: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                walk(&path, recursive, found)?;
            }
        } else if is_pdf(&path) {
            found.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;

    #[test]
    fn inputs_are_pdfs_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "A.PDF", "notes.txt", "c.Pdf"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("d.pdf"), b"x").unwrap();

        let flat = collect_inputs(dir.path(), false).unwrap();
        let names: Vec<_> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A.PDF", "b.pdf", "c.Pdf"]);

        assert_eq!(collect_inputs(dir.path(), true).unwrap().len(), 4);
    }

    #[test]
    fn single_file_is_taken_as_given() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("only.pdf");
        fs::write(&file, b"x").unwrap();
        assert_eq!(collect_inputs(&file, false).unwrap(), vec![file]);
    }

    #[test]
    fn missing_folder_is_an_error() {
        assert!(collect_inputs(Path::new("/definitely/not/here"), false).is_err());
    }

    #[test]
    fn same_name_in_two_folders_keeps_both() {
        let mut batch = BatchResult::new();
        batch.insert(FileOutcome::crashed(Path::new("/a/x.pdf"), "boom"));
        batch.insert(FileOutcome::crashed(Path::new("/b/x.pdf"), "boom"));
        assert_eq!(batch.len(), 2);
        assert!(batch.get("x.pdf").is_some());
        assert!(batch.get("/b/x.pdf").is_some());
        assert!(batch.all_failed());
        assert_eq!(batch.failure_count(), 2);
    }

    proptest! {
        #[test]
        fn every_input_lands_exactly_once(names in proptest::collection::vec("[a-c]{1,2}", 0..12)) {
            let mut batch = BatchResult::new();
            for (i, name) in names.iter().enumerate() {
                let path = PathBuf::from(format!("/dir{i}/{name}.pdf"));
                batch.insert(FileOutcome::crashed(&path, "boom"));
            }
            prop_assert_eq!(batch.len(), names.len());
            prop_assert_eq!(batch.success_count() + batch.failure_count(), batch.len());
            prop_assert_eq!(batch.all_failed(), !names.is_empty());
        }
    }
}
