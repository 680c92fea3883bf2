use super::CountedIterator;
use crate::error::IterError;
use eyre::Result;

type Equality<T> = Box<dyn FnMut(&T, &T) -> bool>;

/// Skips elements equal to the element returned just before them
///
/// Only adjacent runs are compressed: `[a, b, x, b]` stays as it is, while
/// `[a, b, b, c]` becomes `[a, b, c]`. Only the last returned element is
/// retained for comparison.
pub struct SkippingIterator<I: CountedIterator> {
    wrapped: I,
    equality: Equality<I::Item>,
    last: Option<I::Item>,
    next: Option<I::Item>,
    exhausted: bool,
    count: u64,
}

impl<I> SkippingIterator<I>
where
    I: CountedIterator,
    I::Item: Clone + PartialEq,
{
    pub fn new(wrapped: I) -> Self {
        Self::with_equality(wrapped, |a, b| a == b)
    }
}

impl<I> SkippingIterator<I>
where
    I: CountedIterator,
    I::Item: Clone,
{
    pub fn with_equality<E>(wrapped: I, equality: E) -> Self
    where
        E: FnMut(&I::Item, &I::Item) -> bool + 'static,
    {
        Self {
            wrapped,
            equality: Box::new(equality),
            last: None,
            next: None,
            exhausted: false,
            count: 0,
        }
    }

    pub fn into_inner(self) -> I {
        self.wrapped
    }

    fn find_next(&mut self) -> Result<()> {
        if self.next.is_some() || self.exhausted {
            return Ok(());
        }
        loop {
            let candidate = match self.fetch() {
                Ok(Some(candidate)) => candidate,
                Ok(None) => {
                    self.exhausted = true;
                    return Ok(());
                }
                Err(e) => {
                    self.exhausted = true;
                    return Err(e);
                }
            };
            let duplicate = match &self.last {
                Some(last) => (self.equality)(last, &candidate),
                None => false,
            };
            if !duplicate {
                self.next = Some(candidate);
                return Ok(());
            }
        }
    }

    fn fetch(&mut self) -> Result<Option<I::Item>> {
        if self.wrapped.has_next()? {
            self.wrapped.next().map(Some)
        } else {
            Ok(None)
        }
    }
}

impl<I> CountedIterator for SkippingIterator<I>
where
    I: CountedIterator,
    I::Item: Clone,
{
    type Item = I::Item;

    fn has_next(&mut self) -> Result<bool> {
        self.find_next()?;
        Ok(self.next.is_some())
    }

    fn next(&mut self) -> Result<Self::Item> {
        self.find_next()?;
        let item = self.next.take().ok_or(IterError::Exhausted)?;
        self.last = Some(item.clone());
        self.count += 1;
        Ok(item)
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn total_size(&self) -> Option<u64> {
        self.wrapped.total_size()
    }

    fn close(&mut self) -> Result<()> {
        self.wrapped.close()
    }
}
