//! Add elements at the end of another iterator

use super::CountedIterator;
use crate::error::IterError;
use eyre::Result;
use std::collections::VecDeque;

type TailSupplier<T> = Box<dyn FnOnce(Option<&T>) -> Result<T>>;

/// When the tail is appended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TailMode {
    #[default]
    Always,
    /// Only when the wrapped iterator produced nothing
    OnlyIfEmpty,
    /// Only when the wrapped iterator produced at least one element
    OnlyIfNotEmpty,
}

/// Adapts an iterator to add elements at the end, perhaps based on the last
/// element
///
/// Each supplier receives the last element of the wrapped iterator and adds
/// at most one element. A supplier that fails adds nothing; the failure is
/// logged and the next supplier is tried.
pub struct TailAdder<I: CountedIterator> {
    wrapped: I,
    mode: TailMode,
    suppliers: VecDeque<TailSupplier<I::Item>>,
    wrapped_done: bool,
    wrapped_count: u64,
    last: Option<I::Item>,
    next_tail: Option<I::Item>,
    failed: bool,
    count: u64,
}

impl<I> TailAdder<I>
where
    I: CountedIterator,
    I::Item: Clone,
{
    pub fn new<F>(wrapped: I, mode: TailMode, supplier: F) -> Self
    where
        F: FnOnce(Option<&I::Item>) -> Result<I::Item> + 'static,
    {
        Self {
            wrapped,
            mode,
            suppliers: VecDeque::new(),
            wrapped_done: false,
            wrapped_count: 0,
            last: None,
            next_tail: None,
            failed: false,
            count: 0,
        }
        .with_supplier(supplier)
    }

    /// Chain another supplier after the existing ones
    pub fn with_supplier<F>(mut self, supplier: F) -> Self
    where
        F: FnOnce(Option<&I::Item>) -> Result<I::Item> + 'static,
    {
        self.suppliers.push_back(Box::new(supplier));
        self
    }

    fn tail_applies(&self, wrapped_len: u64) -> bool {
        match self.mode {
            TailMode::Always => true,
            TailMode::OnlyIfEmpty => wrapped_len == 0,
            TailMode::OnlyIfNotEmpty => wrapped_len > 0,
        }
    }

    fn wrapped_has_next(&mut self) -> Result<bool> {
        if self.wrapped_done {
            return Ok(false);
        }
        match self.wrapped.has_next() {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.wrapped_done = true;
                Ok(false)
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    fn find_tail(&mut self) {
        if self.next_tail.is_some() || !self.tail_applies(self.wrapped_count) {
            return;
        }
        while let Some(supplier) = self.suppliers.pop_front() {
            match supplier(self.last.as_ref()) {
                Ok(tail) => {
                    self.next_tail = Some(tail);
                    return;
                }
                Err(e) => log::warn!("No tail added: {:#}", e),
            }
        }
    }
}

impl<I> CountedIterator for TailAdder<I>
where
    I: CountedIterator,
    I::Item: Clone,
{
    type Item = I::Item;

    fn has_next(&mut self) -> Result<bool> {
        if self.failed {
            return Ok(false);
        }
        if self.wrapped_has_next()? {
            return Ok(true);
        }
        self.find_tail();
        Ok(self.next_tail.is_some())
    }

    fn next(&mut self) -> Result<Self::Item> {
        if !self.failed && self.wrapped_has_next()? {
            let item = self.wrapped.next().inspect_err(|_| self.failed = true)?;
            self.wrapped_count += 1;
            self.last = Some(item.clone());
            self.count += 1;
            return Ok(item);
        }
        if !self.failed {
            self.find_tail();
        }
        let tail = self.next_tail.take().ok_or(IterError::Exhausted)?;
        self.count += 1;
        Ok(tail)
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn size(&self) -> Option<u64> {
        let wrapped = self.wrapped.size()?;
        let pending = self.suppliers.len() as u64 + u64::from(self.next_tail.is_some());
        if self.tail_applies(wrapped) {
            Some(wrapped + pending)
        } else {
            Some(wrapped)
        }
    }

    fn close(&mut self) -> Result<()> {
        self.wrapped.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::BasicWrappedIterator;

    fn collect<I: CountedIterator>(mut iter: I) -> Vec<I::Item> {
        iter.elements().collect::<Result<_>>().unwrap()
    }

    #[test]
    fn test_always() {
        let iter = TailAdder::new(
            BasicWrappedIterator::from(vec!["a", "b"]),
            TailMode::Always,
            |_| Ok("c"),
        );
        assert_eq!(iter.size(), Some(3));
        assert_eq!(collect(iter), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_only_if_empty() {
        let iter = TailAdder::new(
            BasicWrappedIterator::from(vec!["a", "b"]),
            TailMode::OnlyIfEmpty,
            |_| Ok("c"),
        );
        assert_eq!(iter.size(), Some(2));
        assert_eq!(collect(iter), vec!["a", "b"]);

        let iter = TailAdder::new(
            BasicWrappedIterator::from(Vec::<&str>::new()),
            TailMode::OnlyIfEmpty,
            |_| Ok("c"),
        );
        assert_eq!(iter.size(), Some(1));
        assert_eq!(collect(iter), vec!["c"]);
    }

    #[test]
    fn test_only_if_not_empty() {
        let iter = TailAdder::new(
            BasicWrappedIterator::from(Vec::<&str>::new()),
            TailMode::OnlyIfNotEmpty,
            |_| Ok("c"),
        );
        assert_eq!(collect(iter), Vec::<&str>::new());

        let iter = TailAdder::new(
            BasicWrappedIterator::from(vec!["a"]),
            TailMode::OnlyIfNotEmpty,
            |_| Ok("c"),
        );
        assert_eq!(collect(iter), vec!["a", "c"]);
    }

    #[test]
    fn test_failing_supplier_is_no_tail() {
        let mut iter = TailAdder::new(
            BasicWrappedIterator::from(vec!["a", "b"]),
            TailMode::Always,
            |_| eyre::bail!("no tail today"),
        );
        assert_eq!(iter.next().unwrap(), "a");
        assert_eq!(iter.next().unwrap(), "b");
        assert!(!iter.has_next().unwrap());
        assert!(crate::error::is_exhausted(&iter.next().unwrap_err()));
        assert_eq!(iter.count(), 2);
    }

    #[test]
    fn test_tail_from_last_element() {
        let iter = TailAdder::new(
            BasicWrappedIterator::from(vec![1, 2, 3]),
            TailMode::Always,
            |last| Ok(last.map(|l| l * 10).unwrap_or(-1)),
        )
        .with_supplier(|_| eyre::bail!("skipped"))
        .with_supplier(|last| Ok(last.copied().unwrap_or_default() + 1));
        assert_eq!(collect(iter), vec![1, 2, 3, 30, 4]);
    }

    #[test]
    fn test_has_next_is_stable() {
        let mut iter = TailAdder::new(
            BasicWrappedIterator::from(Vec::<i32>::new()),
            TailMode::Always,
            |_| Ok(7),
        );
        assert!(iter.has_next().unwrap());
        assert!(iter.has_next().unwrap());
        assert_eq!(iter.next().unwrap(), 7);
        assert!(!iter.has_next().unwrap());
        assert!(!iter.has_next().unwrap());
    }
}
