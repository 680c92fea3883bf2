//! Stream documents found at a fixed depth of a JSON document
//!
//! Views and listings as returned by CouchDB look like
//!
//! ```json
//! {"total_rows": 2, "offset": 0, "rows": [
//!   {"id": "a", "doc": {"_id": "a", "urn": "..."}},
//!   {"id": "b", "doc": {"_id": "b", "_attachments": {"...": "..."}}}
//! ]}
//! ```
//!
//! [`DocumentStream`] walks such a stream token by token and only ever holds
//! the single row it is looking at in memory.

use super::reader::{Token, TokenReader};
use crate::error::IterError;
use crate::iter::CountedIterator;
use eyre::{Result, WrapErr};
use serde_json::Value;
use std::io::Read;

/// Which subtrees a [`DocumentStream`] yields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    /// The subtree's container must be the value of this property
    pub property: Option<String>,
    /// The subtree must have this child field
    pub required: Option<String>,
    /// This field must be absent, from the required child if one is
    /// configured, otherwise from the subtree itself
    pub excluded: Option<String>,
}

impl DocumentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn required(mut self, field: impl Into<String>) -> Self {
        self.required = Some(field.into());
        self
    }

    pub fn excluded(mut self, field: impl Into<String>) -> Self {
        self.excluded = Some(field.into());
        self
    }

    fn in_property(&self, property: Option<&str>) -> bool {
        match &self.property {
            Some(expected) => property == Some(expected.as_str()),
            None => true,
        }
    }

    fn accepts(&self, tree: &Value) -> bool {
        let checked = match &self.required {
            Some(required) => match tree.get(required) {
                Some(child) => child,
                None => return false,
            },
            None => tree,
        };
        match &self.excluded {
            Some(excluded) => checked.get(excluded).is_none(),
            None => true,
        }
    }
}

/// Lazily yields the subtrees found at `depth` that pass the filter
///
/// Depth 1 is the root container, so the rows of a CouchDB view are at depth
/// 3. Subtrees that do not pass the filter, and scalars such as `null`
/// standing where a subtree was expected, are skipped.
///
/// [`CountedIterator::count`] is the position in the source container: the
/// skipped entries are counted once the next document is returned.
pub struct DocumentStream<R> {
    reader: Option<TokenReader<R>>,
    target_depth: usize,
    filter: DocumentFilter,
    depth: usize,
    next: Option<Value>,
    exhausted: bool,
    skipped: u64,
    count: u64,
}

impl<R: Read> DocumentStream<R> {
    pub fn new(input: R, depth: usize, filter: DocumentFilter) -> Self {
        Self {
            reader: Some(TokenReader::new(input)),
            target_depth: depth,
            filter,
            depth: 0,
            next: None,
            exhausted: false,
            skipped: 0,
            count: 0,
        }
    }

    /// Rows with a `doc` without attachments, as in `_all_docs?include_docs=true`
    pub fn couchdb_view(input: R) -> Self {
        Self::new(
            input,
            3,
            DocumentFilter::new()
                .property("rows")
                .required("doc")
                .excluded("_attachments"),
        )
    }

    fn find_next(&mut self) -> Result<()> {
        if self.next.is_some() || self.exhausted {
            return Ok(());
        }
        let result = self.advance();
        if result.is_err() {
            self.exhausted = true;
            self.reader = None;
        }
        result.wrap_err("Failed to read next document from JSON stream")
    }

    fn advance(&mut self) -> Result<()> {
        let Some(reader) = self.reader.as_mut() else {
            self.exhausted = true;
            return Ok(());
        };
        while let Some(token) = reader.next_token()? {
            if token.is_end() {
                self.depth -= 1;
                continue;
            }
            if token.is_start() {
                self.depth += 1;
                if self.depth != self.target_depth {
                    continue;
                }
                let in_property = self
                    .filter
                    .in_property(reader.property_of(reader.depth().saturating_sub(2)));
                let tree = reader.read_tree(token)?;
                // the subtree's end token was consumed with it
                self.depth -= 1;
                if !in_property {
                    continue;
                }
                if self.filter.accepts(&tree) {
                    self.next = Some(tree);
                    return Ok(());
                }
                log::debug!("Skipping document at byte {}", reader.position());
                self.skipped += 1;
            } else if matches!(token, Token::Scalar(_))
                && self.depth + 1 == self.target_depth
                && self
                    .filter
                    .in_property(reader.property_of(reader.depth().saturating_sub(1)))
            {
                self.skipped += 1;
            }
        }
        self.exhausted = true;
        Ok(())
    }
}

impl<R: Read> CountedIterator for DocumentStream<R> {
    type Item = Value;

    fn has_next(&mut self) -> Result<bool> {
        self.find_next()?;
        Ok(self.next.is_some())
    }

    fn next(&mut self) -> Result<Self::Item> {
        self.find_next()?;
        let document = self.next.take().ok_or(IterError::Exhausted)?;
        self.count += self.skipped + 1;
        self.skipped = 0;
        Ok(document)
    }

    fn count(&self) -> u64 {
        self.count
    }

    /// Drops the reader, and with it the input stream
    fn close(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            log::debug!("Closed JSON stream after {} document(s)", self.count);
        }
        self.exhausted = true;
        self.next = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const VIEW: &str = r#"{"total_rows": 4, "offset": 0, "rows": [
        {"id": "a", "key": "a", "doc": {"_id": "a", "urn": "urn:vpro:media:program:1"}},
        {"id": "b", "key": "b", "doc": {"_id": "b", "_attachments": {"big.bin": {"length": 1}}}},
        {"id": "c", "key": "c"},
        {"id": "d", "key": "d", "doc": {"_id": "d", "urn": "urn:vpro:media:program:4"}}
    ]}"#;

    fn collect<R: Read>(mut stream: DocumentStream<R>) -> Result<Vec<Value>> {
        stream.elements().collect()
    }

    #[test]
    fn test_couchdb_view() {
        let mut stream = DocumentStream::couchdb_view(VIEW.as_bytes());
        let docs: Vec<Value> = stream.elements().collect::<Result<_>>().unwrap();
        let urns: Vec<&str> = docs
            .iter()
            .map(|d| d["doc"]["urn"].as_str().unwrap())
            .collect();
        assert_eq!(urns, vec!["urn:vpro:media:program:1", "urn:vpro:media:program:4"]);
        assert_eq!(stream.count(), 4);
    }

    #[test]
    fn test_empty_array() {
        let stream = DocumentStream::new(
            r#"{"array": []}"#.as_bytes(),
            3,
            DocumentFilter::new().property("array"),
        );
        assert!(collect(stream).unwrap().is_empty());
    }

    #[test]
    fn test_nulls_are_skipped_but_counted() {
        let mut stream = DocumentStream::new(
            r#"{"array": [null, {}, null, {}]}"#.as_bytes(),
            3,
            DocumentFilter::new().property("array"),
        );
        assert_eq!(stream.next().unwrap(), json!({}));
        assert_eq!(stream.count(), 2);
        assert_eq!(stream.next().unwrap(), json!({}));
        assert_eq!(stream.count(), 4);
        assert!(!stream.has_next().unwrap());
    }

    #[test]
    fn test_other_property_ignored() {
        let input = r#"{"meta": [{"doc": 1}], "rows": [{"doc": 2}]}"#;
        let stream = DocumentStream::new(
            input.as_bytes(),
            3,
            DocumentFilter::new().property("rows").required("doc"),
        );
        assert_eq!(collect(stream).unwrap(), vec![json!({"doc": 2})]);
    }

    #[test]
    fn test_nested_containers_do_not_confuse_depth() {
        let input = r#"{"a": {"b": [[1, 2], {"c": []}]}, "rows": [[3], {"x": {"y": [4]}}]}"#;
        let stream = DocumentStream::new(input.as_bytes(), 3, DocumentFilter::new());
        assert_eq!(
            collect(stream).unwrap(),
            vec![
                json!([[1, 2], {"c": []}]),
                json!([3]),
                json!({"x": {"y": [4]}})
            ]
        );
    }

    #[test]
    fn test_truncated_input() {
        let input = r#"{"rows": [{"doc": {"a": 1}}, {"doc": {"a""#;
        let mut stream = DocumentStream::new(
            input.as_bytes(),
            3,
            DocumentFilter::new().property("rows").required("doc"),
        );
        assert_eq!(stream.next().unwrap(), json!({"doc": {"a": 1}}));
        let err = stream.has_next().unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid JSON"), "{:#}", err);
        assert!(!stream.has_next().unwrap());
        assert!(crate::error::is_exhausted(&stream.next().unwrap_err()));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut stream = DocumentStream::couchdb_view(VIEW.as_bytes());
        assert!(stream.has_next().unwrap());
        stream.close().unwrap();
        stream.close().unwrap();
        assert!(!stream.has_next().unwrap());
    }

    #[test]
    fn test_deeply_nested_document_fails_once() {
        let input = format!(r#"{{"rows": [{}{}]}}"#, "[".repeat(5000), "]".repeat(5000));
        let mut stream = DocumentStream::new(input.as_bytes(), 3, DocumentFilter::new());
        let err = stream.has_next().unwrap_err();
        assert!(format!("{:#}", err).contains("nested deeper than"), "{:#}", err);
        assert!(!stream.has_next().unwrap());
        assert_eq!(stream.count(), 0);
    }
}
