//! tally-core: statement data model, exact-money and date primitives, error taxonomy.

pub mod dates;
pub mod error;
pub mod money;
pub mod month;
pub mod statement;
pub mod summary;
pub mod text;
pub mod types;

pub use error::{
    DateError, ExtractionError, IdentificationFailure, MoneyError, ParseError, RegistryError,
    StatementError,
};
pub use statement::{
    AccountInfo, Amount, Currency, Movement, MovementKind, NO_ACCOUNT, ParseResult, Period,
};
pub use summary::{MismatchField, StatedTotals, Summary, SummaryMismatch, TotalsScanner};
pub use types::{PageText, Word};
