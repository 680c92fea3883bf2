//! Iterators over JSON streams that never load the whole document

mod array;
mod documents;
mod reader;

pub use array::{JsonArrayIterator, JsonArrayIteratorBuilder};
pub use documents::{DocumentFilter, DocumentStream};
pub use reader::{Token, TokenReader};
