//! Errors of the review engine.

use std::{error, fmt};

use crate::cards::CardId;

/// An error raised by selection, grading or import.
///
/// None of these are fatal: the state handed to the failing operation is left untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// There are no eligible cards to select from.
    EmptyPool,
    /// The referenced card does not exist (anymore).
    CardNotFound(CardId),
    /// A judgment mark that is not one of `o`, `d` or `x`.
    InvalidJudgment(String),
    /// An imported card violates the card invariants.
    InvalidCard(CardId, &'static str),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::EmptyPool => write!(f, "no cards to review"),
            Error::CardNotFound(id) => write!(f, "card '{}' not found", id),
            Error::InvalidJudgment(mark) => write!(f, "invalid judgment '{}' (expected o, d or x)", mark),
            Error::InvalidCard(id, reason) => write!(f, "invalid card '{}': {}", id, reason),
        }
    }
}
