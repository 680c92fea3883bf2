use super::CountedIterator;
use crate::error::IterError;
use eyre::Result;

/// Yields only the elements of the wrapped iterator matching a predicate
pub struct FilteringIterator<I: CountedIterator, P> {
    wrapped: I,
    predicate: P,
    next: Option<I::Item>,
    exhausted: bool,
    count: u64,
}

impl<I, P> FilteringIterator<I, P>
where
    I: CountedIterator,
    P: FnMut(&I::Item) -> bool,
{
    pub fn new(wrapped: I, predicate: P) -> Self {
        Self {
            wrapped,
            predicate,
            next: None,
            exhausted: false,
            count: 0,
        }
    }

    fn find_next(&mut self) -> Result<()> {
        if self.next.is_some() || self.exhausted {
            return Ok(());
        }
        let result = self.advance();
        if result.is_err() {
            self.exhausted = true;
        }
        result
    }

    fn advance(&mut self) -> Result<()> {
        while self.wrapped.has_next()? {
            let candidate = self.wrapped.next()?;
            if (self.predicate)(&candidate) {
                self.next = Some(candidate);
                return Ok(());
            }
        }
        self.exhausted = true;
        Ok(())
    }
}

impl<I, P> CountedIterator for FilteringIterator<I, P>
where
    I: CountedIterator,
    P: FnMut(&I::Item) -> bool,
{
    type Item = I::Item;

    fn has_next(&mut self) -> Result<bool> {
        self.find_next()?;
        Ok(self.next.is_some())
    }

    fn next(&mut self) -> Result<Self::Item> {
        self.find_next()?;
        let item = self.next.take().ok_or(IterError::Exhausted)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::BasicWrappedIterator;

    #[test]
    fn test_filters() {
        let mut iter = BasicWrappedIterator::from((1..=10).collect::<Vec<_>>()).filtering(|i| i % 3 == 0);
        let result: Vec<i32> = iter.elements().collect::<Result<_>>().unwrap();
        assert_eq!(result, vec![3, 6, 9]);
        assert_eq!(iter.count(), 3);
        assert_eq!(iter.size(), None);
        assert_eq!(iter.total_size(), Some(10));
    }

    #[test]
    fn test_nothing_matches() {
        let mut iter = BasicWrappedIterator::from(vec!["a", "b"]).filtering(|s| s.is_empty());
        assert!(!iter.has_next().unwrap());
        assert!(crate::error::is_exhausted(&iter.next().unwrap_err()));
    }
}
