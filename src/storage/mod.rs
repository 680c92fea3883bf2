//! File system storage operations
//!
//! This module handles the file I/O around the iterators:
//! - NDJSON reading/writing, one document per line
//! - `{"array": [...]}` documents as read by [`crate::json::JsonArrayIterator`]
//! - JSON5 query files

mod json_writer;
mod ndjson;

pub use json_writer::{ArrayWriter, from_json5_str, read_json5_file, read_query_file};
pub use ndjson::{NdjsonReader, NdjsonWriter};
