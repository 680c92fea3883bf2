//! NDJSON (Newline Delimited JSON) streams

use crate::error::IterError;
use crate::iter::CountedIterator;
use eyre::{Result, WrapErr};
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Reads NDJSON one line at a time
///
/// Blank lines are skipped. A line that is not valid JSON fails the call
/// that reads it and ends the stream.
pub struct NdjsonReader<R> {
    lines: Option<std::io::Lines<R>>,
    next: Option<Value>,
    line_number: u64,
    count: u64,
}

impl NdjsonReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .wrap_err_with(|| format!("Failed to open NDJSON file: {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> NdjsonReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            lines: Some(input.lines()),
            next: None,
            line_number: 0,
            count: 0,
        }
    }

    fn find_next(&mut self) -> Result<()> {
        if self.next.is_some() {
            return Ok(());
        }
        let Some(lines) = self.lines.as_mut() else {
            return Ok(());
        };
        let result = loop {
            let Some(line) = lines.next() else {
                break Ok(None);
            };
            self.line_number += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => break Err(e.into()),
            };
            if line.trim().is_empty() {
                continue;
            }
            break serde_json::from_str(&line)
                .map(Some)
                .wrap_err_with(|| format!("Failed to parse JSON line {}", self.line_number));
        };
        match result {
            Ok(Some(value)) => {
                self.next = Some(value);
                Ok(())
            }
            Ok(None) => {
                self.lines = None;
                Ok(())
            }
            Err(e) => {
                self.lines = None;
                Err(e)
            }
        }
    }
}

impl<R: BufRead> CountedIterator for NdjsonReader<R> {
    type Item = Value;

    fn has_next(&mut self) -> Result<bool> {
        self.find_next()?;
        Ok(self.next.is_some())
    }

    fn next(&mut self) -> Result<Self::Item> {
        self.find_next()?;
        let value = self.next.take().ok_or(IterError::Exhausted)?;
        self.count += 1;
        Ok(value)
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn close(&mut self) -> Result<()> {
        self.lines = None;
        self.next = None;
        Ok(())
    }
}

/// Writes one JSON document per line
pub struct NdjsonWriter<W: Write> {
    writer: W,
    written: u64,
}

impl NdjsonWriter<BufWriter<File>> {
    /// Create or truncate the file at `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .wrap_err_with(|| format!("Failed to create NDJSON file: {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn write<T: Serialize>(&mut self, item: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, item).wrap_err("Failed to serialize NDJSON line")?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Drain `iter` into the stream and close it, returning the number of lines written
    ///
    /// `progress` is called after every line with the running total. The
    /// iterator is closed whether or not writing succeeds.
    pub fn write_all<I, F>(&mut self, iter: &mut I, mut progress: F) -> Result<u64>
    where
        I: CountedIterator + ?Sized,
        I::Item: Serialize,
        F: FnMut(u64, &I),
    {
        let start = self.written;
        let result = (|| {
            while iter.has_next()? {
                let item = iter.next()?;
                self.write(&item)?;
                progress(self.written - start, &*iter);
            }
            self.flush()
        })();
        let closed = iter.close();
        result?;
        closed?;
        Ok(self.written - start)
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().wrap_err("Failed to flush NDJSON output")
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
