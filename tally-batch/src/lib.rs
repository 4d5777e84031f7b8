//! tally-batch: per-file processing with isolated failures, bounded-parallel batches and
//! CSV output.

pub mod batch;
pub mod processor;
pub mod writer;

pub use batch::{BatchResult, collect_inputs};
pub use processor::{FileFailure, FileOutcome, Stage, StatementProcessor};
pub use writer::{CsvWriter, WrittenFiles};
