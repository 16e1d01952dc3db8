//! PDF Object Parser
//!
//! Parses PDF objects from tokens according to ISO 32000-1 Section 7.3

use super::filters;
use super::lexer::{find_bytes, is_whitespace, Lexer, Token};
use crate::error::{PdfError, Result};
use std::collections::HashMap;

/// Nesting bound for arrays and dictionaries.
const MAX_NESTING: usize = 256;

/// PDF Name object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PdfName(pub String);

impl PdfName {
    pub fn new(name: impl Into<String>) -> Self {
        PdfName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// PDF String object
#[derive(Debug, Clone, PartialEq)]
pub struct PdfString(pub Vec<u8>);

impl PdfString {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode as a PDF text string (UTF-16BE with BOM, else byte-per-char).
    pub fn to_text(&self) -> String {
        if self.0.starts_with(&[0xFE, 0xFF]) {
            let units: Vec<u16> = self.0[2..]
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        } else {
            self.0.iter().map(|&b| b as char).collect()
        }
    }
}

/// PDF Array object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfObject>);

impl PdfArray {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PdfObject> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PdfObject> {
        self.0.iter()
    }
}

/// PDF Dictionary object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary(pub HashMap<PdfName, PdfObject>);

impl PdfDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.get(&PdfName::new(key))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PdfObject) {
        self.0.insert(PdfName::new(key), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(&PdfName::new(key))
    }

    /// Value of `/Type`, if it is a name
    pub fn get_type(&self) -> Option<&str> {
        self.get("Type").and_then(|obj| obj.as_name())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// PDF Stream object
///
/// `data` holds the payload after the filter chain ran; `raw_data` keeps the
/// bytes exactly as they appeared in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    pub raw_data: Vec<u8>,
    pub data: Vec<u8>,
    /// First filter in the chain that could not be applied
    pub unsupported_filter: Option<String>,
}

impl PdfStream {
    /// Build a stream and run its filter chain.
    pub fn new(dict: PdfDictionary, raw_data: Vec<u8>) -> Self {
        let decoded = filters::decode_stream(&raw_data, &dict);
        Self {
            dict,
            raw_data,
            data: decoded.data,
            unsupported_filter: decoded.unsupported,
        }
    }

    /// Get the decoded stream data
    pub fn decoded(&self) -> &[u8] {
        &self.data
    }

    pub fn is_fully_decoded(&self) -> bool {
        self.unsupported_filter.is_none()
    }
}

/// PDF Object types
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(PdfString),
    Name(PdfName),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    Reference(u32, u16), // object number, generation number
}

impl PdfObject {
    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of an integer or real
    pub fn as_real(&self) -> Option<f64> {
        match self {
            PdfObject::Integer(i) => Some(*i as f64),
            PdfObject::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            PdfObject::Name(n) => Some(n.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Dictionary view; a stream yields its dictionary
    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(dict) => Some(dict),
            PdfObject::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<(u32, u16)> {
        match self {
            PdfObject::Reference(num, gen) => Some((*num, *gen)),
            _ => None,
        }
    }
}

/// Resolves an indirect `/Length` before a stream body is read.
pub trait LengthResolver {
    fn resolve_length(&self, obj_num: u32, generation: u16) -> Option<usize>;
}

/// Object parser over a byte buffer.
pub struct Parser<'a, 'r> {
    lexer: Lexer<'a>,
    lengths: Option<&'r dyn LengthResolver>,
}

impl<'a, 'r> Parser<'a, 'r> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(data),
            lengths: None,
        }
    }

    /// Parser anchored at `position`
    pub fn at(data: &'a [u8], position: usize) -> Self {
        Self {
            lexer: Lexer::at(data, position),
            lengths: None,
        }
    }

    pub fn with_length_resolver(mut self, lengths: &'r dyn LengthResolver) -> Self {
        self.lengths = Some(lengths);
        self
    }

    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    pub fn lexer_mut(&mut self) -> &mut Lexer<'a> {
        &mut self.lexer
    }

    /// Parse one direct object.
    pub fn parse_object(&mut self) -> Result<PdfObject> {
        let token = self.lexer.next_token()?;
        self.parse_from_token(token, 0)
    }

    /// Parse `N G obj ... endobj`, returning the object id and body.
    pub fn parse_indirect_object(&mut self) -> Result<(u32, u16, PdfObject)> {
        let start = self.lexer.position();
        let (obj_num, generation) = self.parse_object_header()?;

        let token = self.lexer.next_token()?;
        let object = match token {
            Token::DictStart => {
                let dict = self.parse_dictionary(0)?;
                if self.lexer.peek_token()?.is_keyword("stream") {
                    self.lexer.next_token()?;
                    PdfObject::Stream(self.parse_stream_body(dict)?)
                } else {
                    PdfObject::Dictionary(dict)
                }
            }
            // `N G obj endobj` is an empty object
            Token::Keyword(ref k) if k == "endobj" => return Ok((obj_num, generation, PdfObject::Null)),
            other => self.parse_from_token(other, 0)?,
        };

        match self.lexer.peek_token() {
            Ok(token) if token.is_keyword("endobj") => {
                self.lexer.next_token()?;
            }
            _ => {
                tracing::debug!("object {} {} at byte {} has no endobj", obj_num, generation, start);
            }
        }

        Ok((obj_num, generation, object))
    }

    /// Read the `N G obj` header.
    pub fn parse_object_header(&mut self) -> Result<(u32, u16)> {
        let start = self.lexer.position();
        let num = self.lexer.next_token()?;
        let gen = self.lexer.next_token()?;
        let keyword = self.lexer.next_token()?;

        match (num, gen, keyword) {
            (Token::Integer(n), Token::Integer(g), Token::Keyword(k))
                if k == "obj" && (0..=u32::MAX as i64).contains(&n) && (0..=u16::MAX as i64).contains(&g) =>
            {
                Ok((n as u32, g as u16))
            }
            _ => Err(PdfError::syntax(start, "expected 'N G obj' header")),
        }
    }

    /// Parse an object whose first token was already read.
    pub(crate) fn parse_operand(&mut self, token: Token) -> Result<PdfObject> {
        self.parse_from_token(token, 0)
    }

    fn parse_from_token(&mut self, token: Token, depth: usize) -> Result<PdfObject> {
        let position = self.lexer.position();
        match token {
            Token::Null => Ok(PdfObject::Null),
            Token::Boolean(b) => Ok(PdfObject::Boolean(b)),
            Token::Integer(i) => Ok(self.integer_or_reference(i)),
            Token::Real(r) => Ok(PdfObject::Real(r)),
            Token::String(s) | Token::HexString(s) => Ok(PdfObject::String(PdfString(s))),
            Token::Name(n) => Ok(PdfObject::Name(PdfName(n))),
            Token::ArrayStart => self.parse_array(depth + 1),
            Token::DictStart => self.parse_dictionary(depth + 1).map(PdfObject::Dictionary),
            Token::Eof => Err(PdfError::syntax(position, "unexpected end of input")),
            other => Err(PdfError::syntax(
                position,
                format!("expected object, found {other:?}"),
            )),
        }
    }

    /// `N G R` lookahead after an integer
    fn integer_or_reference(&mut self, value: i64) -> PdfObject {
        let saved = self.lexer.position();
        if (0..=u32::MAX as i64).contains(&value) {
            if let (Ok(Token::Integer(gen)), Ok(Token::Keyword(k))) =
                (self.lexer.next_token(), self.lexer.next_token())
            {
                if k == "R" && (0..=u16::MAX as i64).contains(&gen) {
                    return PdfObject::Reference(value as u32, gen as u16);
                }
            }
        }
        self.lexer.set_position(saved);
        PdfObject::Integer(value)
    }

    fn parse_array(&mut self, depth: usize) -> Result<PdfObject> {
        let start = self.lexer.position();
        if depth > MAX_NESTING {
            return Err(PdfError::syntax(start, "array nesting too deep"));
        }

        let mut elements = Vec::new();
        loop {
            match self.lexer.next_token()? {
                Token::ArrayEnd => break,
                Token::Eof => return Err(PdfError::syntax(start, "unterminated array")),
                token => elements.push(self.parse_from_token(token, depth)?),
            }
        }
        Ok(PdfObject::Array(PdfArray(elements)))
    }

    /// Parse dictionary entries after `<<` up to and including `>>`.
    pub fn parse_dictionary(&mut self, depth: usize) -> Result<PdfDictionary> {
        let start = self.lexer.position();
        if depth > MAX_NESTING {
            return Err(PdfError::syntax(start, "dictionary nesting too deep"));
        }

        let mut dict = PdfDictionary::new();
        loop {
            let key = match self.lexer.next_token()? {
                Token::DictEnd => break,
                Token::Name(name) => name,
                Token::Eof => return Err(PdfError::syntax(start, "unterminated dictionary")),
                other => {
                    return Err(PdfError::syntax(
                        self.lexer.position(),
                        format!("dictionary key must be a name, found {other:?}"),
                    ))
                }
            };

            let value = match self.lexer.next_token()? {
                // `/Key >>` with the value missing
                Token::DictEnd => break,
                token => self.parse_from_token(token, depth)?,
            };
            // A null value is equivalent to an absent entry
            if !value.is_null() {
                dict.insert(key, value);
            }
        }
        Ok(dict)
    }

    /// Read stream data after the `stream` keyword.
    fn parse_stream_body(&mut self, dict: PdfDictionary) -> Result<PdfStream> {
        self.lexer.skip_stream_eol();
        let data = self.lexer.data();
        let data_start = self.lexer.position();

        let declared = match dict.get("Length") {
            Some(PdfObject::Integer(len)) if *len >= 0 => Some(*len as usize),
            Some(PdfObject::Reference(num, gen)) => {
                self.lengths.and_then(|lengths| lengths.resolve_length(*num, *gen))
            }
            _ => None,
        };

        let data_end = match declared.filter(|&len| ends_at_endstream(data, data_start, len)) {
            Some(len) => data_start + len,
            None => {
                let end = find_endstream(data, data_start);
                tracing::debug!(
                    "stream at byte {} has unusable /Length {:?}, found end at {}",
                    data_start,
                    declared,
                    end
                );
                end
            }
        };

        let raw = data[data_start..data_end].to_vec();
        self.lexer.set_position(data_end);
        if self.lexer.peek_token()?.is_keyword("endstream") {
            self.lexer.next_token()?;
        }

        Ok(PdfStream::new(dict, raw))
    }
}

/// A declared length is trusted only if `endstream` follows it.
fn ends_at_endstream(data: &[u8], start: usize, len: usize) -> bool {
    let Some(end) = start.checked_add(len) else {
        return false;
    };
    if end > data.len() {
        return false;
    }
    let mut i = end;
    while i < data.len() && is_whitespace(data[i]) {
        i += 1;
    }
    data[i..].starts_with(b"endstream")
}

/// Locate the data end by scanning for `endstream`, dropping the EOL before it.
fn find_endstream(data: &[u8], start: usize) -> usize {
    let mut end = find_bytes(data, b"endstream", start)
        .or_else(|| find_bytes(data, b"endobj", start))
        .unwrap_or(data.len());
    if end > start && data[end - 1] == b'\n' {
        end -= 1;
    }
    if end > start && data[end - 1] == b'\r' {
        end -= 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Result<PdfObject> {
        Parser::new(input).parse_object()
    }

    #[test]
    fn test_parse_simple_objects() {
        assert_eq!(parse(b"null").unwrap(), PdfObject::Null);
        assert_eq!(parse(b"true").unwrap(), PdfObject::Boolean(true));
        assert_eq!(parse(b"42").unwrap(), PdfObject::Integer(42));
        assert_eq!(parse(b"-3.5").unwrap(), PdfObject::Real(-3.5));
        assert_eq!(
            parse(b"/Type").unwrap(),
            PdfObject::Name(PdfName::new("Type"))
        );
        assert_eq!(
            parse(b"(Hi)").unwrap(),
            PdfObject::String(PdfString(b"Hi".to_vec()))
        );
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse(b"12 0 R").unwrap(), PdfObject::Reference(12, 0));
        // Two integers not followed by R stay integers
        let mut parser = Parser::new(b"12 0 obj");
        assert_eq!(parser.parse_object().unwrap(), PdfObject::Integer(12));
        assert_eq!(parser.parse_object().unwrap(), PdfObject::Integer(0));
    }

    #[test]
    fn test_parse_array() {
        let obj = parse(b"[1 2.5 /N (s) [3] 4 0 R]").unwrap();
        let array = obj.as_array().unwrap();
        assert_eq!(array.len(), 6);
        assert_eq!(array.get(0), Some(&PdfObject::Integer(1)));
        assert_eq!(array.get(4).and_then(|o| o.as_array()).map(|a| a.len()), Some(1));
        assert_eq!(array.get(5), Some(&PdfObject::Reference(4, 0)));
    }

    #[test]
    fn test_parse_dictionary() {
        let obj = parse(b"<< /Type /Page /Count 3 /Kids [1 0 R] /Sub << /A 1 >> >>").unwrap();
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get_type(), Some("Page"));
        assert_eq!(dict.get("Count").and_then(|o| o.as_integer()), Some(3));
        assert!(dict.get("Sub").and_then(|o| o.as_dict()).is_some());
    }

    #[test]
    fn test_null_entries_are_absent() {
        let obj = parse(b"<< /A null /B 1 >>").unwrap();
        let dict = obj.as_dict().unwrap();
        assert!(!dict.contains_key("A"));
        assert!(dict.contains_key("B"));
    }

    #[test]
    fn test_malformed_dictionary() {
        assert!(matches!(parse(b"<< /A 1"), Err(PdfError::MalformedSyntax { .. })));
        assert!(matches!(parse(b"<< 1 2 >>"), Err(PdfError::MalformedSyntax { .. })));
        assert!(matches!(parse(b"[1 2"), Err(PdfError::MalformedSyntax { .. })));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let input = vec![b'['; 10_000];
        assert!(matches!(parse(&input), Err(PdfError::MalformedSyntax { .. })));
    }

    #[test]
    fn test_indirect_object() {
        let mut parser = Parser::new(b"7 0 obj\n<< /Type /Catalog >>\nendobj");
        let (num, gen, obj) = parser.parse_indirect_object().unwrap();
        assert_eq!((num, gen), (7, 0));
        assert_eq!(obj.as_dict().and_then(|d| d.get_type()), Some("Catalog"));
    }

    #[test]
    fn test_stream_with_direct_length() {
        let input = b"1 0 obj\n<< /Length 5 >>\nstream\nhello\nendstream\nendobj";
        let (_, _, obj) = Parser::new(input).parse_indirect_object().unwrap();
        let stream = obj.as_stream().unwrap();
        assert_eq!(stream.data, b"hello");
        assert!(stream.is_fully_decoded());
    }

    #[test]
    fn test_stream_with_wrong_length_falls_back_to_endstream() {
        let input = b"1 0 obj\n<< /Length 3 >>\nstream\nhello world\nendstream\nendobj";
        let (_, _, obj) = Parser::new(input).parse_indirect_object().unwrap();
        assert_eq!(obj.as_stream().unwrap().data, b"hello world");

        let input = b"1 0 obj\n<< /Length 999 >>\nstream\r\nabc\r\nendstream\nendobj";
        let (_, _, obj) = Parser::new(input).parse_indirect_object().unwrap();
        assert_eq!(obj.as_stream().unwrap().data, b"abc");
    }

    struct FixedLengths;

    impl LengthResolver for FixedLengths {
        fn resolve_length(&self, obj_num: u32, _generation: u16) -> Option<usize> {
            (obj_num == 9).then_some(4)
        }
    }

    #[test]
    fn test_stream_with_indirect_length() {
        let input = b"1 0 obj\n<< /Length 9 0 R >>\nstream\nabcd\nendstream\nendobj";
        let resolver = FixedLengths;
        let mut parser = Parser::new(input).with_length_resolver(&resolver);
        let (_, _, obj) = parser.parse_indirect_object().unwrap();
        assert_eq!(obj.as_stream().unwrap().data, b"abcd");
    }

    #[test]
    fn test_text_string_decoding() {
        let s = PdfString(vec![0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69]);
        assert_eq!(s.to_text(), "Hi");
        assert_eq!(PdfString(b"plain".to_vec()).to_text(), "plain");
    }
}
