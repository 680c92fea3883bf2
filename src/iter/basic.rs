use super::CountedIterator;
use crate::error::IterError;
use eyre::Result;
use std::iter::Peekable;

/// Adapts any std [`Iterator`] to the [`CountedIterator`] contract
///
/// The size is only known when given explicitly or when wrapping a `Vec`.
pub struct BasicWrappedIterator<I: Iterator> {
    wrapped: Peekable<I>,
    size: Option<u64>,
    total_size: Option<u64>,
    count: u64,
}

impl<I: Iterator> BasicWrappedIterator<I> {
    pub fn new(wrapped: I) -> Self {
        Self {
            wrapped: wrapped.peekable(),
            size: None,
            total_size: None,
            count: 0,
        }
    }

    pub fn with_size(size: u64, wrapped: I) -> Self {
        Self {
            size: Some(size),
            ..Self::new(wrapped)
        }
    }

    /// Report a total size different from the size, e.g. when the wrapped
    /// iterator is one page of something bigger
    pub fn with_total_size(mut self, total_size: u64) -> Self {
        self.total_size = Some(total_size);
        self
    }
}

impl<T> From<Vec<T>> for BasicWrappedIterator<std::vec::IntoIter<T>> {
    fn from(items: Vec<T>) -> Self {
        let size = items.len() as u64;
        Self::with_size(size, items.into_iter())
    }
}

impl<I: Iterator> CountedIterator for BasicWrappedIterator<I> {
    type Item = I::Item;

    fn has_next(&mut self) -> Result<bool> {
        Ok(self.wrapped.peek().is_some())
    }

    fn next(&mut self) -> Result<Self::Item> {
        let item = self.wrapped.next().ok_or(IterError::Exhausted)?;
        self.count += 1;
        Ok(item)
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn total_size(&self) -> Option<u64> {
        self.total_size.or(self.size)
    }
}
