use super::CountedIterator;
use crate::error::IterError;
use eyre::Result;

/// Adds single-element lookahead to a [`CountedIterator`]
///
/// [`PeekingIterator::peek`] fetches the next element into a lookahead slot
/// without consuming it; the following `next()` returns that element without
/// touching the wrapped iterator.
pub struct PeekingIterator<I: CountedIterator> {
    wrapped: I,
    peeked: Option<I::Item>,
}

impl<I: CountedIterator> PeekingIterator<I> {
    pub fn new(wrapped: I) -> Self {
        Self {
            wrapped,
            peeked: None,
        }
    }

    /// The next element, without consuming it
    ///
    /// # Errors
    /// [`IterError::Exhausted`] when there is no next element
    pub fn peek(&mut self) -> Result<&I::Item> {
        if self.peeked.is_none() {
            let item = self.wrapped.next()?;
            self.peeked = Some(item);
        }
        self.peeked.as_ref().ok_or_else(|| IterError::Exhausted.into())
    }

    /// Whether an element sits in the lookahead slot
    pub fn is_peeked(&self) -> bool {
        self.peeked.is_some()
    }

    /// The element in the lookahead slot, without fetching
    pub fn peeked(&self) -> Option<&I::Item> {
        self.peeked.as_ref()
    }

    pub fn into_inner(self) -> I {
        self.wrapped
    }
}

impl<I: CountedIterator> CountedIterator for PeekingIterator<I> {
    type Item = I::Item;

    fn has_next(&mut self) -> Result<bool> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        self.wrapped.has_next()
    }

    fn next(&mut self) -> Result<Self::Item> {
        match self.peeked.take() {
            Some(item) => Ok(item),
            None => self.wrapped.next(),
        }
    }

    /// Elements returned by this iterator, not counting a pending peek
    fn count(&self) -> u64 {
        self.wrapped.count() - u64::from(self.peeked.is_some())
    }

    fn size(&self) -> Option<u64> {
        self.wrapped.size()
    }

    fn total_size(&self) -> Option<u64> {
        self.wrapped.total_size()
    }

    fn close(&mut self) -> Result<()> {
        self.wrapped.close()
    }

    /// # Errors
    /// [`IterError::IllegalState`] while a peeked element is pending, since the
    /// wrapped position has already moved past the last returned element
    fn remove(&mut self) -> Result<()> {
        if self.peeked.is_some() {
            return Err(IterError::IllegalState("cannot remove after peek()").into());
        }
        self.wrapped.remove()
    }
}
