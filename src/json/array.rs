//! Iterate the first array of a JSON stream
//!
//! Search and listing APIs commonly answer with something like
//! `{"size": 10, "totalSize": 1234, "array": [...]}`. [`JsonArrayIterator`]
//! picks up the size fields that precede the array and then converts the
//! array's entries one at a time.

use super::reader::{Token, TokenReader};
use crate::error::IterError;
use crate::iter::CountedIterator;
use eyre::{Result, WrapErr, eyre};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::Read;

type ValueCreator<T> = Box<dyn FnMut(Value) -> Result<T>>;
type Callback = Box<dyn FnOnce()>;

pub struct JsonArrayIteratorBuilder<R, T> {
    input: R,
    value_creator: ValueCreator<T>,
    size_field: String,
    total_size_field: String,
    skip_nulls: bool,
    on_complete: Option<Callback>,
}

impl<R: Read, T> JsonArrayIteratorBuilder<R, T> {
    /// The number field holding the size of the array, default `size`
    pub fn size_field(mut self, field: impl Into<String>) -> Self {
        self.size_field = field.into();
        self
    }

    /// The number field holding the size of the complete result when the
    /// array is one page of it, default `totalSize`
    pub fn total_size_field(mut self, field: impl Into<String>) -> Self {
        self.total_size_field = field.into();
        self
    }

    /// Whether `null` entries are skipped, default `true`
    pub fn skip_nulls(mut self, skip_nulls: bool) -> Self {
        self.skip_nulls = skip_nulls;
        self
    }

    /// Runs once, when the array ends, the iterator fails or is closed
    pub fn on_complete<F: FnOnce() + 'static>(mut self, callback: F) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Read up to the start of the array
    ///
    /// # Errors
    /// Returns an error if the stream is not valid JSON up to the array
    pub fn build(self) -> Result<JsonArrayIterator<R, T>> {
        let mut reader = TokenReader::new(self.input);
        let mut size = None;
        let mut total_size = None;
        let mut found_array = false;
        while let Some(token) = reader.next_token()? {
            match token {
                Token::StartArray => {
                    found_array = true;
                    break;
                }
                Token::Scalar(Value::Number(number)) => {
                    let name = reader.current_name();
                    if name == Some(self.size_field.as_str()) {
                        size = number.as_u64();
                    } else if name == Some(self.total_size_field.as_str()) {
                        total_size = number.as_u64();
                    }
                }
                _ => {}
            }
        }
        if !found_array {
            log::debug!("No array found in JSON stream");
        }
        Ok(JsonArrayIterator {
            reader: found_array.then_some(reader),
            value_creator: self.value_creator,
            size,
            total_size,
            skip_nulls: self.skip_nulls,
            on_complete: self.on_complete,
            next: None,
            exhausted: !found_array,
            skipped: 0,
            count: 0,
        })
    }
}

/// Streams the entries of the first array in a JSON document
///
/// Entries that are `null`, or that the value creator cannot convert, are
/// logged and skipped. Like [`super::DocumentStream`], the count is the
/// position in the array, including the skipped entries before the last
/// returned one.
pub struct JsonArrayIterator<R, T> {
    reader: Option<TokenReader<R>>,
    value_creator: ValueCreator<T>,
    size: Option<u64>,
    total_size: Option<u64>,
    skip_nulls: bool,
    on_complete: Option<Callback>,
    next: Option<T>,
    exhausted: bool,
    skipped: u64,
    count: u64,
}

impl<R: Read, T: DeserializeOwned + 'static> JsonArrayIterator<R, T> {
    /// Deserialize each entry into `T`
    pub fn builder(input: R) -> JsonArrayIteratorBuilder<R, T> {
        Self::builder_with(input, |value| {
            serde_json::from_value(value).wrap_err("Failed to deserialize array entry")
        })
    }

    pub fn new(input: R) -> Result<Self> {
        Self::builder(input).build()
    }
}

impl<R: Read, T> JsonArrayIterator<R, T> {
    /// Convert each entry with `value_creator`
    pub fn builder_with<F>(input: R, value_creator: F) -> JsonArrayIteratorBuilder<R, T>
    where
        F: FnMut(Value) -> Result<T> + 'static,
    {
        JsonArrayIteratorBuilder {
            input,
            value_creator: Box::new(value_creator),
            size_field: "size".to_string(),
            total_size_field: "totalSize".to_string(),
            skip_nulls: true,
            on_complete: None,
        }
    }

    fn complete(&mut self) {
        self.exhausted = true;
        if let Some(callback) = self.on_complete.take() {
            callback();
        }
    }

    fn find_next(&mut self) -> Result<()> {
        if self.next.is_some() || self.exhausted {
            return Ok(());
        }
        match self.advance() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.reader = None;
                self.complete();
                Err(e.wrap_err("Failed to read next array entry"))
            }
        }
    }

    fn advance(&mut self) -> Result<()> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| eyre!("JSON stream already closed"))?;
        loop {
            let token = reader.expect_token()?;
            if token == Token::EndArray {
                self.reader = None;
                self.complete();
                return Ok(());
            }
            let tree = reader.read_tree(token)?;
            if tree.is_null() && self.skip_nulls {
                self.skipped += 1;
                continue;
            }
            let position = reader.position();
            match (self.value_creator)(tree) {
                Ok(value) => {
                    if self.skipped > 0 {
                        log::warn!("Found {} null(s) or invalid entries, skipped", self.skipped);
                    }
                    self.next = Some(value);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("{:#} for entry ending at byte {}, skipped", e, position);
                    self.skipped += 1;
                }
            }
        }
    }
}

impl<R: Read, T> CountedIterator for JsonArrayIterator<R, T> {
    type Item = T;

    fn has_next(&mut self) -> Result<bool> {
        self.find_next()?;
        Ok(self.next.is_some())
    }

    fn next(&mut self) -> Result<Self::Item> {
        self.find_next()?;
        let value = self.next.take().ok_or(IterError::Exhausted)?;
        self.count += self.skipped + 1;
        self.skipped = 0;
        Ok(value)
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

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        self.next = None;
        self.complete();
        Ok(())
    }
}
