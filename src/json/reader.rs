//! Pull tokenizer for JSON streams
//!
//! [`TokenReader`] reads one token at a time from a byte stream and keeps the
//! stack of open containers, so callers can ask where in the document the
//! last token sits. A subtree can be materialized into a
//! [`serde_json::Value`] with [`TokenReader::read_tree`] without buffering
//! the rest of the stream.

use eyre::{Result, bail, eyre};
use serde_json::{Map, Number, Value};
use std::io::{BufRead, BufReader, ErrorKind, Read};

/// Nesting limit of [`TokenReader::read_tree`], the same as serde_json's
pub const MAX_TREE_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    /// A property name inside an object
    Name(String),
    /// A string, number, boolean or null
    Scalar(Value),
}

impl Token {
    pub fn is_start(&self) -> bool {
        matches!(self, Self::StartObject | Self::StartArray)
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Self::EndObject | Self::EndArray)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// Just opened, a value/name or the closing bracket
    First,
    /// A comma or the closing bracket
    Separator,
    /// A value for the property name just read
    Value,
}

#[derive(Debug)]
struct Scope {
    object: bool,
    /// The property name most recently read in this object
    name: Option<String>,
    expect: Expect,
}

/// A container of a tree being materialized
enum Frame {
    Array(Vec<Value>),
    /// The map so far and the name waiting for its value
    Object(Map<String, Value>, Option<String>),
}

pub struct TokenReader<R> {
    input: BufReader<R>,
    scopes: Vec<Scope>,
    root_done: bool,
    position: u64,
}

impl<R: Read> TokenReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: BufReader::new(input),
            scopes: Vec::new(),
            root_done: false,
            position: 0,
        }
    }

    /// Number of containers currently open
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Byte offset of the reader in the stream
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The property name that holds the container at `index` (0 is the root
    /// container), if that container is the value of an object property
    pub fn property_of(&self, index: usize) -> Option<&str> {
        let parent = self.scopes.get(index.checked_sub(1)?)?;
        if parent.object {
            parent.name.as_deref()
        } else {
            None
        }
    }

    /// The current property name of the innermost open object scope
    pub fn current_name(&self) -> Option<&str> {
        match self.scopes.last() {
            Some(scope) if scope.object => scope.name.as_deref(),
            _ => None,
        }
    }

    /// Read the next token, `None` at the end of the document
    ///
    /// # Errors
    /// Returns an error on malformed or truncated input, or when the
    /// underlying stream fails
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        self.read_token()
            .map_err(|e| e.wrap_err(format!("Invalid JSON at byte {}", self.position)))
    }

    /// Read the next token, failing at the end of the document
    pub fn expect_token(&mut self) -> Result<Token> {
        self.next_token()?
            .ok_or_else(|| eyre!("Unexpected end of JSON input at byte {}", self.position))
    }

    /// Materialize the value that starts with `first`
    ///
    /// When `first` is a start token, the whole container up to and including
    /// its end token is consumed.
    ///
    /// # Errors
    /// Fails on malformed input, and on containers nested more than
    /// [`MAX_TREE_DEPTH`] levels below `first`
    pub fn read_tree(&mut self, first: Token) -> Result<Value> {
        let mut frames: Vec<Frame> = Vec::new();
        let mut token = first;
        loop {
            let value = match token {
                Token::Scalar(value) => value,
                Token::StartArray | Token::StartObject => {
                    if frames.len() >= MAX_TREE_DEPTH {
                        bail!(
                            "Document nested deeper than {} levels at byte {}",
                            MAX_TREE_DEPTH,
                            self.position
                        );
                    }
                    frames.push(match token {
                        Token::StartArray => Frame::Array(Vec::new()),
                        _ => Frame::Object(Map::new(), None),
                    });
                    token = self.expect_token()?;
                    continue;
                }
                Token::Name(name) => match frames.last_mut() {
                    Some(Frame::Object(_, pending)) => {
                        *pending = Some(name);
                        token = self.expect_token()?;
                        continue;
                    }
                    _ => bail!("Unexpected property name '{}'", name),
                },
                Token::EndArray => match frames.pop() {
                    Some(Frame::Array(items)) => Value::Array(items),
                    _ => bail!("Cannot start a value with {:?}", Token::EndArray),
                },
                Token::EndObject => match frames.pop() {
                    Some(Frame::Object(map, _)) => Value::Object(map),
                    _ => bail!("Cannot start a value with {:?}", Token::EndObject),
                },
            };
            match frames.last_mut() {
                None => return Ok(value),
                Some(Frame::Array(items)) => items.push(value),
                Some(Frame::Object(map, pending)) => {
                    let name = pending
                        .take()
                        .ok_or_else(|| eyre!("Object value without a property name"))?;
                    map.insert(name, value);
                }
            }
            token = self.expect_token()?;
        }
    }

    fn read_token(&mut self) -> Result<Option<Token>> {
        let Some(byte) = self.skip_whitespace()? else {
            if self.scopes.is_empty() {
                return Ok(None);
            }
            bail!("Unexpected end of input inside {} container(s)", self.scopes.len());
        };

        let Some((object, expect)) = self.scopes.last().map(|s| (s.object, s.expect)) else {
            if self.root_done {
                bail!("Trailing characters after the document");
            }
            return self.read_value(byte).map(Some);
        };

        match (object, expect, byte) {
            (false, Expect::First | Expect::Separator, b']') => Ok(Some(self.close(false))),
            (true, Expect::First | Expect::Separator, b'}') => Ok(Some(self.close(true))),
            (_, Expect::Separator, b',') => {
                self.consume();
                let Some(byte) = self.skip_whitespace()? else {
                    bail!("Unexpected end of input after ','");
                };
                if self.in_object() {
                    self.read_name(byte).map(Some)
                } else {
                    self.read_value(byte).map(Some)
                }
            }
            (_, Expect::Separator, other) => bail!("Expected ',' but found '{}'", other as char),
            (true, Expect::First, byte) => self.read_name(byte).map(Some),
            (false, Expect::First, byte) | (true, Expect::Value, byte) => {
                self.read_value(byte).map(Some)
            }
            (false, Expect::Value, _) => bail!("Array scope expecting a property value"),
        }
    }

    fn in_object(&self) -> bool {
        self.scopes.last().is_some_and(|scope| scope.object)
    }

    fn close(&mut self, object: bool) -> Token {
        self.consume();
        self.scopes.pop();
        if self.scopes.is_empty() {
            self.root_done = true;
        }
        if object {
            Token::EndObject
        } else {
            Token::EndArray
        }
    }

    fn read_name(&mut self, byte: u8) -> Result<Token> {
        if byte != b'"' {
            bail!("Expected property name but found '{}'", byte as char);
        }
        self.consume();
        let name = self.read_string()?;
        match self.skip_whitespace()? {
            Some(b':') => self.consume(),
            Some(other) => bail!("Expected ':' but found '{}'", other as char),
            None => bail!("Unexpected end of input after property name"),
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.name = Some(name.clone());
            scope.expect = Expect::Value;
        }
        Ok(Token::Name(name))
    }

    fn read_value(&mut self, byte: u8) -> Result<Token> {
        match self.scopes.last_mut() {
            Some(scope) => scope.expect = Expect::Separator,
            None => self.root_done = true,
        }
        match byte {
            b'{' | b'[' => {
                self.consume();
                let object = byte == b'{';
                // the root container is not done until it closes
                self.root_done = false;
                self.scopes.push(Scope {
                    object,
                    name: None,
                    expect: Expect::First,
                });
                Ok(if object {
                    Token::StartObject
                } else {
                    Token::StartArray
                })
            }
            b'"' => {
                self.consume();
                Ok(Token::Scalar(Value::String(self.read_string()?)))
            }
            b't' => self.read_literal(b"true", Value::Bool(true)),
            b'f' => self.read_literal(b"false", Value::Bool(false)),
            b'n' => self.read_literal(b"null", Value::Null),
            b'-' | b'0'..=b'9' => self.read_number(),
            other => bail!("Unexpected character '{}'", other as char),
        }
    }

    fn read_literal(&mut self, literal: &[u8], value: Value) -> Result<Token> {
        for expected in literal {
            match self.peek_byte()? {
                Some(byte) if byte == *expected => self.consume(),
                _ => bail!(
                    "Invalid literal, expected '{}'",
                    String::from_utf8_lossy(literal)
                ),
            }
        }
        Ok(Token::Scalar(value))
    }

    fn read_number(&mut self) -> Result<Token> {
        let mut text = String::new();
        while let Some(byte) = self.peek_byte()? {
            if !matches!(byte, b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E') {
                break;
            }
            text.push(byte as char);
            self.consume();
        }
        let number: Number = text
            .parse()
            .map_err(|_| eyre!("Invalid number '{}'", text))?;
        Ok(Token::Scalar(Value::Number(number)))
    }

    /// Read a string body, the opening quote already consumed
    fn read_string(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            let Some(byte) = self.peek_byte()? else {
                bail!("Unterminated string");
            };
            self.consume();
            match byte {
                b'"' => break,
                b'\\' => self.read_escape(&mut bytes)?,
                0x00..=0x1f => bail!("Control character in string"),
                _ => bytes.push(byte),
            }
        }
        String::from_utf8(bytes).map_err(|e| eyre!("Invalid UTF-8 in string: {}", e))
    }

    fn read_escape(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let Some(byte) = self.peek_byte()? else {
            bail!("Unterminated escape sequence");
        };
        self.consume();
        let unescaped = match byte {
            b'"' => '"',
            b'\\' => '\\',
            b'/' => '/',
            b'b' => '\u{8}',
            b'f' => '\u{c}',
            b'n' => '\n',
            b'r' => '\r',
            b't' => '\t',
            b'u' => self.read_unicode_escape()?,
            other => bail!("Invalid escape '\\{}'", other as char),
        };
        let mut buffer = [0; 4];
        out.extend_from_slice(unescaped.encode_utf8(&mut buffer).as_bytes());
        Ok(())
    }

    fn read_unicode_escape(&mut self) -> Result<char> {
        let high = self.read_hex4()?;
        if !(0xD800..0xDC00).contains(&high) {
            return char::from_u32(high).ok_or_else(|| eyre!("Invalid code point {:#x}", high));
        }
        // surrogate pair, the low half must follow as another \u escape
        for expected in b"\\u" {
            match self.peek_byte()? {
                Some(byte) if byte == *expected => self.consume(),
                _ => bail!("Unpaired surrogate {:#x}", high),
            }
        }
        let low = self.read_hex4()?;
        if !(0xDC00..0xE000).contains(&low) {
            bail!("Invalid low surrogate {:#x}", low);
        }
        let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
        char::from_u32(code).ok_or_else(|| eyre!("Invalid code point {:#x}", code))
    }

    fn read_hex4(&mut self) -> Result<u32> {
        let mut value = 0;
        for _ in 0..4 {
            let Some(byte) = self.peek_byte()? else {
                bail!("Unterminated unicode escape");
            };
            let digit = (byte as char)
                .to_digit(16)
                .ok_or_else(|| eyre!("Invalid hex digit '{}'", byte as char))?;
            self.consume();
            value = value * 16 + digit;
        }
        Ok(value)
    }

    fn skip_whitespace(&mut self) -> Result<Option<u8>> {
        while let Some(byte) = self.peek_byte()? {
            if !matches!(byte, b' ' | b'\t' | b'\n' | b'\r') {
                return Ok(Some(byte));
            }
            self.consume();
        }
        Ok(None)
    }

    fn peek_byte(&mut self) -> Result<Option<u8>> {
        loop {
            match self.input.fill_buf() {
                Ok(buffer) => return Ok(buffer.first().copied()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn consume(&mut self) {
        self.input.consume(1);
        self.position += 1;
    }
}
