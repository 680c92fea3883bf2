//! The counted iterator contract and its decorators
//!
//! Every source adapter in this crate implements [`CountedIterator`]: a
//! forward-only, fallible iterator that knows how many elements it has
//! returned, optionally how many it holds, and that owns a resource which
//! [`CountedIterator::close`] releases.
//!
//! Decorators wrap any other `CountedIterator` and delegate `close()` to it.
//!
//! None of the iterators are synchronized. They take `&mut self` everywhere,
//! so a single instance belongs to a single thread; run independent instances
//! to consume several sources concurrently.

mod basic;
mod batched;
mod filtering;
mod max_offset;
mod merged;
mod peeking;
mod skipping;
mod tail;

pub use basic::BasicWrappedIterator;
pub use batched::{BatchedReceiver, DEFAULT_BATCH_SIZE};
pub use filtering::FilteringIterator;
pub use max_offset::MaxOffsetIterator;
pub use merged::MergedSortedIterator;
pub use peeking::PeekingIterator;
pub use skipping::SkippingIterator;
pub use tail::{TailAdder, TailMode};

use crate::error::IterError;
use eyre::Result;

/// Forward-only iterator over a possibly remote, possibly unbounded source
///
/// Implementations guarantee:
/// - `has_next()` may be called any number of times without consuming
/// - `next()` performs the `has_next()` check itself and fails with
///   [`IterError::Exhausted`] when nothing is left
/// - once `has_next()` returned `false` it keeps returning `false`
/// - after a source failure has been returned, the iterator is exhausted
/// - `close()` is idempotent
pub trait CountedIterator {
    type Item;

    /// Whether another element is available, fetching it if needed
    fn has_next(&mut self) -> Result<bool>;

    /// Return the next element
    ///
    /// # Errors
    /// [`IterError::Exhausted`] when there is no next element, or the source
    /// failure that occurred while fetching it
    fn next(&mut self) -> Result<Self::Item>;

    /// Number of elements returned so far
    fn count(&self) -> u64;

    /// Number of elements in the currently known batch, if the source reveals it
    fn size(&self) -> Option<u64> {
        None
    }

    /// Number of elements across all batches, if the source reveals it
    fn total_size(&self) -> Option<u64> {
        self.size()
    }

    /// Release the underlying resource. Calling this more than once is a no-op.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Remove the last returned element from the underlying source
    fn remove(&mut self) -> Result<()> {
        Err(IterError::Unsupported("remove").into())
    }

    /// Borrow as a std [`Iterator`] of results, ending after the first error
    fn elements(&mut self) -> Elements<'_, Self>
    where
        Self: Sized,
    {
        Elements {
            inner: self,
            failed: false,
        }
    }

    fn peeking(self) -> PeekingIterator<Self>
    where
        Self: Sized,
    {
        PeekingIterator::new(self)
    }

    fn skipping(self) -> SkippingIterator<Self>
    where
        Self: Sized,
        Self::Item: Clone + PartialEq,
    {
        SkippingIterator::new(self)
    }

    fn filtering<P>(self, predicate: P) -> FilteringIterator<Self, P>
    where
        Self: Sized,
        P: FnMut(&Self::Item) -> bool,
    {
        FilteringIterator::new(self, predicate)
    }

    fn max_offset(self, offset: u64, max: Option<u64>) -> MaxOffsetIterator<Self>
    where
        Self: Sized,
    {
        MaxOffsetIterator::new(self, offset, max)
    }
}

impl<I: CountedIterator + ?Sized> CountedIterator for Box<I> {
    type Item = I::Item;

    fn has_next(&mut self) -> Result<bool> {
        (**self).has_next()
    }

    fn next(&mut self) -> Result<Self::Item> {
        (**self).next()
    }

    fn count(&self) -> u64 {
        (**self).count()
    }

    fn size(&self) -> Option<u64> {
        (**self).size()
    }

    fn total_size(&self) -> Option<u64> {
        (**self).total_size()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn remove(&mut self) -> Result<()> {
        (**self).remove()
    }
}

/// Std iterator view of a [`CountedIterator`]
///
/// Yields `Err` at most once; the view is fused after the first failure.
pub struct Elements<'a, I> {
    inner: &'a mut I,
    failed: bool,
}

impl<I: CountedIterator> Iterator for Elements<'_, I> {
    type Item = Result<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.inner.has_next() {
            Ok(true) => {
                let result = self.inner.next();
                self.failed = result.is_err();
                Some(result)
            }
            Ok(false) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// An iterator with nothing in it
pub fn empty<T>() -> BasicWrappedIterator<std::iter::Empty<T>> {
    BasicWrappedIterator::with_size(0, std::iter::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_exhausted;

    #[test]
    fn test_empty() {
        let mut iter = empty::<i32>();
        assert!(!iter.has_next().unwrap());
        assert!(is_exhausted(&iter.next().unwrap_err()));
        assert_eq!(iter.size(), Some(0));
        assert_eq!(iter.count(), 0);
    }

    #[test]
    fn test_elements_collects() {
        let mut iter = BasicWrappedIterator::from(vec![1, 2, 3]);
        let collected: Vec<i32> = iter.elements().collect::<Result<_>>().unwrap();
        assert_eq!(collected, vec![1, 2, 3]);
        assert_eq!(iter.count(), 3);
    }

    #[test]
    fn test_boxed_trait_object() {
        let mut iter: Box<dyn CountedIterator<Item = &str>> =
            Box::new(BasicWrappedIterator::from(vec!["a", "b"]));
        assert_eq!(iter.size(), Some(2));
        assert_eq!(iter.next().unwrap(), "a");
        assert_eq!(iter.next().unwrap(), "b");
        assert!(!iter.has_next().unwrap());
        assert_eq!(iter.count(), 2);
    }

    #[test]
    fn test_remove_unsupported_by_default() {
        let mut iter = BasicWrappedIterator::from(vec![1]);
        let err = iter.remove().unwrap_err();
        assert_eq!(
            err.downcast_ref::<IterError>(),
            Some(&IterError::Unsupported("remove"))
        );
    }
}
