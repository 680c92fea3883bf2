//! Typed failures carried inside [`eyre::Report`]s
//!
//! All iterator operations return `eyre::Result`. The failures a caller may
//! want to react to are raised as [`IterError`] so they can be recovered with
//! `report.downcast_ref::<IterError>()`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterError {
    /// `next()` was called with no elements left
    Exhausted,
    /// Iteration started before a query was prepared
    NotPrepared,
    /// The operation conflicts with the iterator's current state
    IllegalState(&'static str),
    /// The iterator does not support the operation
    Unsupported(&'static str),
}

impl fmt::Display for IterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "No more elements"),
            Self::NotPrepared => write!(f, "prepare_search not called"),
            Self::IllegalState(reason) => write!(f, "Illegal state: {}", reason),
            Self::Unsupported(operation) => write!(f, "Unsupported operation: {}", operation),
        }
    }
}

impl std::error::Error for IterError {}

/// Whether the report was raised because the iterator ran out of elements
pub fn is_exhausted(report: &eyre::Report) -> bool {
    matches!(report.downcast_ref::<IterError>(), Some(IterError::Exhausted))
}
