//! Merge several sorted iterators into one sorted iterator

use super::{CountedIterator, PeekingIterator};
use crate::error::IterError;
use eyre::Result;
use std::cmp::Ordering;

type Comparator<T> = Box<dyn FnMut(&T, &T) -> Ordering>;

/// Yields the elements of several sorted inputs in merged order
///
/// Every input must already be sorted by the comparator. The merge runs on
/// the calling thread: each input holds at most one element in its lookahead
/// slot, and the smallest of those is returned next. Of equal elements, the
/// one from the earlier input comes first.
///
/// Use boxed inputs (`Box<dyn CountedIterator<Item = T>>`) to merge sources of
/// different types.
///
/// # Example
/// ```
/// use pagewalk::iter::{BasicWrappedIterator, CountedIterator, MergedSortedIterator};
///
/// let mut merged = MergedSortedIterator::new(vec![
///     BasicWrappedIterator::from(vec![1, 4, 7]),
///     BasicWrappedIterator::from(vec![2, 3, 8]),
/// ]);
/// assert_eq!(merged.size(), Some(6));
/// let all: Vec<i32> = merged.elements().collect::<eyre::Result<_>>().unwrap();
/// assert_eq!(all, vec![1, 2, 3, 4, 7, 8]);
/// ```
pub struct MergedSortedIterator<I: CountedIterator> {
    inputs: Vec<PeekingIterator<I>>,
    compare: Comparator<I::Item>,
    exhausted: bool,
    count: u64,
}

impl<I> MergedSortedIterator<I>
where
    I: CountedIterator,
    I::Item: Ord,
{
    pub fn new(inputs: impl IntoIterator<Item = I>) -> Self {
        Self::with_comparator(inputs, |a, b| a.cmp(b))
    }
}

impl<I: CountedIterator> MergedSortedIterator<I> {
    pub fn with_comparator<C>(inputs: impl IntoIterator<Item = I>, compare: C) -> Self
    where
        C: FnMut(&I::Item, &I::Item) -> Ordering + 'static,
    {
        Self {
            inputs: inputs.into_iter().map(PeekingIterator::new).collect(),
            compare: Box::new(compare),
            exhausted: false,
            count: 0,
        }
    }

    /// Index of the input holding the smallest pending element
    fn select(&mut self) -> Result<Option<usize>> {
        if self.exhausted {
            return Ok(None);
        }
        let result = self.fill().map(|()| self.smallest());
        match &result {
            Ok(None) | Err(_) => self.exhausted = true,
            Ok(Some(_)) => {}
        }
        result
    }

    fn fill(&mut self) -> Result<()> {
        for input in &mut self.inputs {
            if !input.is_peeked() && input.has_next()? {
                input.peek()?;
            }
        }
        Ok(())
    }

    fn smallest(&mut self) -> Option<usize> {
        let Self {
            inputs, compare, ..
        } = self;
        let mut best: Option<(usize, &I::Item)> = None;
        for (index, input) in inputs.iter().enumerate() {
            let Some(candidate) = input.peeked() else {
                continue;
            };
            match best {
                Some((_, current)) if compare(current, candidate) != Ordering::Greater => {}
                _ => best = Some((index, candidate)),
            }
        }
        best.map(|(index, _)| index)
    }
}

impl<I: CountedIterator> CountedIterator for MergedSortedIterator<I> {
    type Item = I::Item;

    fn has_next(&mut self) -> Result<bool> {
        self.select().map(|index| index.is_some())
    }

    fn next(&mut self) -> Result<Self::Item> {
        let index = self.select()?.ok_or(IterError::Exhausted)?;
        let item = self.inputs[index].next()?;
        self.count += 1;
        Ok(item)
    }

    fn count(&self) -> u64 {
        self.count
    }

    /// The sum of the input sizes, unknown if any of them is
    fn size(&self) -> Option<u64> {
        self.inputs.iter().map(CountedIterator::size).sum()
    }

    fn total_size(&self) -> Option<u64> {
        self.inputs.iter().map(CountedIterator::total_size).sum()
    }

    /// Closes every input, returning the first failure
    fn close(&mut self) -> Result<()> {
        self.exhausted = true;
        let mut result = Ok(());
        for input in &mut self.inputs {
            if let Err(e) = input.close() {
                if result.is_ok() {
                    result = Err(e);
                } else {
                    log::warn!("Failed to close merged input: {:#}", e);
                }
            }
        }
        result
    }
}
