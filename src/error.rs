use thiserror::Error;

/// Why a raw announcement did not become a record. Both variants are
/// recoverable: the line goes to the rejection ledger and the batch goes on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no weekday + date anchor in line")]
    NoMatch,

    #[error("{day}.{month}.{year} is not a calendar date")]
    MalformedDate { day: u32, month: u32, year: i32 },
}
