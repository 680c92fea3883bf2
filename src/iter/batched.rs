//! Iterate an API that only offers batched (offset + limit) retrieval

use super::CountedIterator;
use crate::error::IterError;
use eyre::{Result, WrapErr};

pub const DEFAULT_BATCH_SIZE: usize = 100;

type BatchGetter<P> = Box<dyn FnMut(u64, usize) -> Result<P>>;

/// Visits all elements of a batched API as one iterator
///
/// The getter receives the offset and the batch size and returns one page.
/// Pages are fetched lazily, one at a time, and the first page that yields no
/// elements ends the iteration. The getter is never asked for a total.
///
/// # Example
/// ```
/// use pagewalk::iter::{BatchedReceiver, CountedIterator};
///
/// let source: Vec<u32> = (0..25).collect();
/// let mut iter = BatchedReceiver::new(move |offset, limit| {
///     let offset = offset as usize;
///     Ok(source.iter().skip(offset).take(limit).copied().collect::<Vec<_>>())
/// })
/// .batch_size(10);
///
/// let all: Vec<u32> = iter.elements().collect::<eyre::Result<_>>().unwrap();
/// assert_eq!(all.len(), 25);
/// ```
pub struct BatchedReceiver<P: IntoIterator> {
    batch_size: usize,
    offset: u64,
    getter: BatchGetter<P>,
    page: Option<P::IntoIter>,
    page_count: u64,
    next: Option<P::Item>,
    exhausted: bool,
    count: u64,
}

impl<P: IntoIterator> BatchedReceiver<P> {
    pub fn new<F>(getter: F) -> Self
    where
        F: FnMut(u64, usize) -> Result<P> + 'static,
    {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            offset: 0,
            getter: Box::new(getter),
            page: None,
            page_count: 0,
            next: None,
            exhausted: false,
            count: 0,
        }
    }

    /// For resumption-token style APIs where offset and limit are irrelevant
    pub fn resumable<F>(mut supplier: F) -> Self
    where
        F: FnMut() -> Result<P> + 'static,
    {
        Self::new(move |_, _| supplier())
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    fn fetch(&mut self) -> Result<()> {
        log::debug!(
            "Fetching batch at offset {} (batch size {})",
            self.offset,
            self.batch_size
        );
        match (self.getter)(self.offset, self.batch_size) {
            Ok(page) => {
                self.page = Some(page.into_iter());
                self.page_count = 0;
                Ok(())
            }
            Err(e) => {
                self.exhausted = true;
                Err(e).wrap_err_with(|| format!("Failed to fetch batch at offset {}", self.offset))
            }
        }
    }

    fn find_next(&mut self) -> Result<()> {
        if self.next.is_some() || self.exhausted {
            return Ok(());
        }
        loop {
            if self.page.is_none() {
                self.fetch()?;
            }
            let Some(page) = self.page.as_mut() else {
                return Ok(());
            };
            if let Some(item) = page.next() {
                self.page_count += 1;
                self.next = Some(item);
                return Ok(());
            }
            self.page = None;
            if self.page_count == 0 {
                log::debug!("Empty batch at offset {}, done", self.offset);
                self.exhausted = true;
                return Ok(());
            }
            self.offset += self.page_count;
        }
    }
}

impl<P: IntoIterator> CountedIterator for BatchedReceiver<P> {
    type Item = P::Item;

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
}
