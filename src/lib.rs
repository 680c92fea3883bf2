//! pagewalk
//!
//! Lazy, resource-bound iterators over paginated and streaming sources: a
//! batched API adapter, decorators, streaming JSON extractors and a search
//! scroll iterator, all behind the [`CountedIterator`] contract.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod iter;
pub mod json;
pub mod scroll;
pub mod storage;

// Re-exports for convenience
pub use client::{Auth, AuthType, HttpSearchClient, KeepAlive, SearchClient};
pub use config::SearchConfig;
pub use error::{IterError, is_exhausted};
pub use iter::{
    BasicWrappedIterator, BatchedReceiver, CountedIterator, FilteringIterator, MaxOffsetIterator,
    MergedSortedIterator, PeekingIterator, SkippingIterator, TailAdder, TailMode,
};
pub use json::{DocumentFilter, DocumentStream, JsonArrayIterator, TokenReader};
pub use scroll::ScrollIterator;
pub use storage::{ArrayWriter, NdjsonReader, NdjsonWriter};
