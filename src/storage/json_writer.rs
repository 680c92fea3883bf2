use crate::iter::CountedIterator;
use eyre::{Result, WrapErr};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;

/// Read a JSON5 file and parse it into a serde_json::Value.
///
/// JSON5 allows comments, trailing commas and unquoted keys, which makes
/// hand-written query files easier to maintain.
///
/// # Example
///
/// ```no_run
/// use pagewalk::storage::read_json5_file;
/// use std::path::Path;
///
/// let query = read_json5_file(Path::new("query.json5")).unwrap();
/// ```
pub fn read_json5_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read file: {}", path.display()))?;

    from_json5_str(&content)
        .wrap_err_with(|| format!("Failed to parse JSON5 from file: {}", path.display()))
}

/// Parse a JSON5 string into a serde_json::Value.
///
/// ```
/// use pagewalk::storage::from_json5_str;
///
/// let query = from_json5_str(r#"{
///     // only clips
///     query: {term: {type: "CLIP"}},
/// }"#).unwrap();
/// assert_eq!(query["query"]["term"]["type"], "CLIP");
/// ```
pub fn from_json5_str(s: &str) -> Result<Value> {
    json5::from_str(s).wrap_err("Failed to parse JSON5")
}

/// Read a search request body, which must be a JSON5 object
pub fn read_query_file(path: &Path) -> Result<Map<String, Value>> {
    match read_json5_file(path)? {
        Value::Object(body) => Ok(body),
        other => eyre::bail!(
            "Query file {} must contain an object, found {}",
            path.display(),
            type_name(&other)
        ),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Streams an iterator into a `{"totalSize": .., "array": [..]}` document
///
/// The layout is the one [`crate::json::JsonArrayIterator`] reads back. The
/// sizes are written when the iterator knows them after its first
/// `has_next()`; the array is written element by element.
pub struct ArrayWriter<W: Write> {
    writer: W,
    pretty: bool,
}

impl<W: Write> ArrayWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pretty: false,
        }
    }

    /// One array element per line
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Write the whole iterator and close it, returning the number of elements written
    pub fn write_all<I>(&mut self, iter: &mut I) -> Result<u64>
    where
        I: CountedIterator + ?Sized,
        I::Item: Serialize,
    {
        let result = self.write_document(iter);
        let closed = iter.close();
        let written = result?;
        closed?;
        Ok(written)
    }

    fn write_document<I>(&mut self, iter: &mut I) -> Result<u64>
    where
        I: CountedIterator + ?Sized,
        I::Item: Serialize,
    {
        let mut has_next = iter.has_next()?;
        write!(self.writer, "{{")?;
        if let Some(size) = iter.size() {
            write!(self.writer, "\"size\":{},", size)?;
        }
        if let Some(total_size) = iter.total_size() {
            write!(self.writer, "\"totalSize\":{},", total_size)?;
        }
        write!(self.writer, "\"array\":[")?;
        let mut written = 0;
        while has_next {
            let item = iter.next()?;
            if written > 0 {
                write!(self.writer, ",")?;
            }
            if self.pretty {
                write!(self.writer, "\n  ")?;
            }
            serde_json::to_writer(&mut self.writer, &item)
                .wrap_err("Failed to serialize array element")?;
            written += 1;
            has_next = iter.has_next()?;
        }
        if self.pretty && written > 0 {
            writeln!(self.writer)?;
        }
        writeln!(self.writer, "]}}")?;
        self.writer.flush()?;
        Ok(written)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iter::BasicWrappedIterator;
    use crate::json::JsonArrayIterator;
    use serde_json::json;
    use tempfile::NamedTempFile;

    #[test]
    fn test_json5_parse_with_comments() {
        let json5 = r#"{
            // This is a comment
            "size": 10,
            /* Multi-line
               comment */
            sort: ["_doc",],
        }"#;
        let value = from_json5_str(json5).unwrap();
        assert_eq!(value, json!({"size": 10, "sort": ["_doc"]}));
    }

    #[test]
    fn test_read_query_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{query: {{match_all: {{}}}}}}").unwrap();
        let body = read_query_file(file.path()).unwrap();
        assert_eq!(body["query"], json!({"match_all": {}}));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[1, 2]").unwrap();
        let err = read_query_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("an array"), "{}", err);
    }

    #[test]
    fn test_array_writer_reads_back() {
        let mut source = BasicWrappedIterator::from(vec![json!({"a": 1}), json!({"b": 2})])
            .with_total_size(10);
        let mut writer = ArrayWriter::new(Vec::new()).pretty(true);
        assert_eq!(writer.write_all(&mut source).unwrap(), 2);
        let output = writer.into_inner();
        assert_eq!(
            String::from_utf8(output.clone()).unwrap(),
            "{\"size\":2,\"totalSize\":10,\"array\":[\n  {\"a\":1},\n  {\"b\":2}\n]}\n"
        );

        let mut iter = JsonArrayIterator::<_, Value>::new(output.as_slice()).unwrap();
        assert_eq!(iter.size(), Some(2));
        assert_eq!(iter.total_size(), Some(10));
        assert_eq!(iter.elements().count(), 2);
    }

    #[test]
    fn test_array_writer_empty() {
        let mut source = crate::iter::empty::<Value>();
        let mut writer = ArrayWriter::new(Vec::new());
        assert_eq!(writer.write_all(&mut source).unwrap(), 0);
        assert_eq!(
            String::from_utf8(writer.into_inner()).unwrap(),
            "{\"size\":0,\"totalSize\":0,\"array\":[]}\n"
        );
    }
}
