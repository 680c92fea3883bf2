use super::CountedIterator;
use crate::error::IterError;
use eyre::Result;

type Callback = Box<dyn FnMut()>;

/// Implements offset and max for another iterator
///
/// The first `offset` elements of the wrapped iterator are skipped, after
/// which at most `max` elements are returned. Callbacks registered with
/// [`MaxOffsetIterator::on_complete`] run once, when the window is used up or
/// the wrapped iterator ends.
pub struct MaxOffsetIterator<I: CountedIterator> {
    wrapped: I,
    offset: u64,
    offset_max: u64,
    position: u64,
    next: Option<I::Item>,
    exhausted: bool,
    callbacks: Vec<Callback>,
    count: u64,
}

impl<I: CountedIterator> MaxOffsetIterator<I> {
    pub fn new(wrapped: I, offset: u64, max: Option<u64>) -> Self {
        Self {
            wrapped,
            offset,
            offset_max: max.map_or(u64::MAX, |max| max.saturating_add(offset)),
            position: 0,
            next: None,
            exhausted: false,
            callbacks: Vec::new(),
            count: 0,
        }
    }

    pub fn on_complete<F: FnMut() + 'static>(mut self, callback: F) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn complete(&mut self) {
        self.exhausted = true;
        for mut callback in self.callbacks.drain(..) {
            callback();
        }
    }

    fn find_next(&mut self) -> Result<()> {
        if self.next.is_some() || self.exhausted {
            return Ok(());
        }
        let result = self.advance();
        if result.is_err() || self.next.is_none() {
            self.complete();
        }
        result
    }

    fn advance(&mut self) -> Result<()> {
        while self.position < self.offset && self.wrapped.has_next()? {
            self.wrapped.next()?;
            self.position += 1;
        }
        if self.position < self.offset_max && self.wrapped.has_next()? {
            self.next = Some(self.wrapped.next()?);
            self.position += 1;
        }
        Ok(())
    }
}

impl<I: CountedIterator> CountedIterator for MaxOffsetIterator<I> {
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

    fn size(&self) -> Option<u64> {
        let size = self.wrapped.size()?;
        let window = self.offset_max.min(size).saturating_sub(self.offset);
        Some(window)
    }

    /// The size of the unrestricted iterator
    fn total_size(&self) -> Option<u64> {
        self.wrapped.total_size()
    }

    fn close(&mut self) -> Result<()> {
        self.wrapped.close()
    }
}
