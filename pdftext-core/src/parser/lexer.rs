//! PDF Lexer
//!
//! Tokenizes a borrowed byte slice according to ISO 32000-1 Section 7.2.
//! The lexer never reads past the end of its input: truncated data simply
//! ends the token stream with [`Token::Eof`].

use crate::error::{PdfError, Result};

/// PDF Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Boolean literal: true or false
    Boolean(bool),

    /// Integer number
    Integer(i64),

    /// Real number
    Real(f64),

    /// Literal string: (text)
    String(Vec<u8>),

    /// Hexadecimal string: <48656C6C6F>
    HexString(Vec<u8>),

    /// Name object: /Name
    Name(String),

    /// Array start: [
    ArrayStart,

    /// Array end: ]
    ArrayEnd,

    /// Dictionary start: <<
    DictStart,

    /// Dictionary end: >>
    DictEnd,

    /// Null object
    Null,

    /// Any other regular-character run: obj, endobj, stream, R, Tj, ...
    Keyword(String),

    /// End of input
    Eof,
}

impl Token {
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Keyword(k) if k == keyword)
    }
}

/// Byte-slice lexer with an explicit cursor.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Create a lexer whose cursor starts at `position`.
    pub fn at(data: &'a [u8], position: usize) -> Self {
        Self {
            data,
            position: position.min(data.len()),
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) {
        self.position = position.min(self.data.len());
    }

    pub fn is_eof(&self) -> bool {
        self.position >= self.data.len()
    }

    fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.data.get(self.position + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek_byte()?;
        self.position += 1;
        Some(byte)
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace_and_comments();

        let start = self.position;
        let ch = match self.peek_byte() {
            Some(ch) => ch,
            None => return Ok(Token::Eof),
        };

        match ch {
            b'/' => {
                self.position += 1;
                Ok(Token::Name(self.read_name()))
            }
            b'(' => {
                self.position += 1;
                self.read_literal_string(start).map(Token::String)
            }
            b'<' => {
                if self.peek_byte_at(1) == Some(b'<') {
                    self.position += 2;
                    Ok(Token::DictStart)
                } else {
                    self.position += 1;
                    self.read_hex_string(start).map(Token::HexString)
                }
            }
            b'>' => {
                if self.peek_byte_at(1) == Some(b'>') {
                    self.position += 2;
                    Ok(Token::DictEnd)
                } else {
                    self.position += 1;
                    Err(PdfError::syntax(start, "unexpected '>'"))
                }
            }
            b'[' => {
                self.position += 1;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.position += 1;
                Ok(Token::ArrayEnd)
            }
            b'{' | b'}' => {
                self.position += 1;
                Ok(Token::Keyword((ch as char).to_string()))
            }
            b')' => {
                self.position += 1;
                Err(PdfError::syntax(start, "unbalanced ')'"))
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => Ok(self.read_number()),
            _ => Ok(self.read_keyword()),
        }
    }

    /// Look at the next token without consuming it.
    pub fn peek_token(&mut self) -> Result<Token> {
        let saved = self.position;
        let token = self.next_token();
        self.position = saved;
        token
    }

    pub fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.peek_byte() {
            if is_whitespace(ch) {
                self.position += 1;
            } else if ch == b'%' {
                while let Some(ch) = self.peek_byte() {
                    if ch == b'\n' || ch == b'\r' {
                        break;
                    }
                    self.position += 1;
                }
            } else {
                break;
            }
        }
    }

    /// Skip the end-of-line that follows the `stream` keyword.
    pub fn skip_stream_eol(&mut self) {
        // Some producers pad with spaces before the EOL.
        while self.peek_byte() == Some(b' ') {
            self.position += 1;
        }
        match self.peek_byte() {
            Some(b'\r') => {
                self.position += 1;
                if self.peek_byte() == Some(b'\n') {
                    self.position += 1;
                }
            }
            Some(b'\n') => self.position += 1,
            _ => {}
        }
    }

    /// Skip inline image data after the `ID` operator.
    ///
    /// The cursor ends just after the `EI` keyword. Image data is binary and
    /// may contain anything, so the only reliable boundary is `EI` surrounded
    /// by whitespace (or end of input).
    pub fn skip_inline_image_data(&mut self) {
        // Exactly one whitespace byte separates ID from the data.
        if self.peek_byte().is_some_and(is_whitespace) {
            self.position += 1;
        }

        let mut i = self.position;
        while i + 1 < self.data.len() {
            if self.data[i] == b'E'
                && self.data[i + 1] == b'I'
                && (i == self.position || is_whitespace(self.data[i - 1]))
                && self.data.get(i + 2).map_or(true, |&b| is_whitespace(b) || is_delimiter(b))
            {
                self.position = i + 2;
                return;
            }
            i += 1;
        }
        self.position = self.data.len();
    }

    fn read_name(&mut self) -> String {
        let mut name = Vec::new();
        while let Some(ch) = self.peek_byte() {
            if is_whitespace(ch) || is_delimiter(ch) {
                break;
            }
            self.position += 1;
            if ch == b'#' {
                let hi = self.peek_byte().and_then(hex_value);
                let lo = self.peek_byte_at(1).and_then(hex_value);
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    self.position += 2;
                    name.push((hi << 4) | lo);
                    continue;
                }
            }
            name.push(ch);
        }
        String::from_utf8_lossy(&name).into_owned()
    }

    fn read_literal_string(&mut self, start: usize) -> Result<Vec<u8>> {
        let mut result = Vec::new();
        let mut depth = 1usize;

        loop {
            let ch = self
                .bump()
                .ok_or_else(|| PdfError::syntax(start, "unterminated literal string"))?;

            match ch {
                b'\\' => {
                    let escaped = match self.bump() {
                        Some(byte) => byte,
                        None => return Err(PdfError::syntax(start, "unterminated literal string")),
                    };
                    match escaped {
                        b'n' => result.push(b'\n'),
                        b'r' => result.push(b'\r'),
                        b't' => result.push(b'\t'),
                        b'b' => result.push(0x08),
                        b'f' => result.push(0x0C),
                        b'(' | b')' | b'\\' => result.push(escaped),
                        b'0'..=b'7' => {
                            let mut value = u32::from(escaped - b'0');
                            for _ in 0..2 {
                                match self.peek_byte() {
                                    Some(d @ b'0'..=b'7') => {
                                        self.position += 1;
                                        value = value * 8 + u32::from(d - b'0');
                                    }
                                    _ => break,
                                }
                            }
                            result.push((value & 0xFF) as u8);
                        }
                        // Line continuation
                        b'\r' => {
                            if self.peek_byte() == Some(b'\n') {
                                self.position += 1;
                            }
                        }
                        b'\n' => {}
                        other => result.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    result.push(ch);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(result);
                    }
                    result.push(ch);
                }
                _ => result.push(ch),
            }
        }
    }

    fn read_hex_string(&mut self, start: usize) -> Result<Vec<u8>> {
        let mut result = Vec::new();
        let mut pending: Option<u8> = None;

        loop {
            let ch = self
                .bump()
                .ok_or_else(|| PdfError::syntax(start, "unterminated hex string"))?;

            if ch == b'>' {
                // Odd digit count: last digit is padded with 0
                if let Some(hi) = pending {
                    result.push(hi << 4);
                }
                return Ok(result);
            }
            if is_whitespace(ch) {
                continue;
            }
            let value = hex_value(ch).ok_or_else(|| {
                PdfError::syntax(self.position - 1, format!("invalid hex digit '{}'", ch as char))
            })?;
            match pending.take() {
                Some(hi) => result.push((hi << 4) | value),
                None => pending = Some(value),
            }
        }
    }

    fn read_number(&mut self) -> Token {
        let start = self.position;
        if matches!(self.peek_byte(), Some(b'+' | b'-')) {
            self.position += 1;
        }
        // Tolerate doubled signs such as "--5".
        while matches!(self.peek_byte(), Some(b'+' | b'-')) {
            self.position += 1;
        }

        let mut seen_dot = false;
        while let Some(ch) = self.peek_byte() {
            match ch {
                b'0'..=b'9' => self.position += 1,
                b'.' if !seen_dot => {
                    seen_dot = true;
                    self.position += 1;
                }
                _ => break,
            }
        }

        let text = String::from_utf8_lossy(&self.data[start..self.position]);
        let negative = text.starts_with('-');
        let digits = text.trim_start_matches(['+', '-']);

        if seen_dot {
            let value: f64 = if digits == "." || digits.is_empty() {
                0.0
            } else {
                digits.parse().unwrap_or(0.0)
            };
            Token::Real(if negative { -value } else { value })
        } else {
            match digits.parse::<i64>() {
                Ok(value) => Token::Integer(if negative { -value } else { value }),
                Err(_) if digits.is_empty() => Token::Integer(0),
                // Out-of-range integers degrade to reals
                Err(_) => {
                    let value: f64 = digits.parse().unwrap_or(0.0);
                    Token::Real(if negative { -value } else { value })
                }
            }
        }
    }

    fn read_keyword(&mut self) -> Token {
        let start = self.position;
        while let Some(ch) = self.peek_byte() {
            if is_whitespace(ch) || is_delimiter(ch) {
                break;
            }
            self.position += 1;
        }
        if self.position == start {
            // A lone byte that is neither whitespace nor handled above
            self.position += 1;
        }

        let word = String::from_utf8_lossy(&self.data[start..self.position]);
        match word.as_ref() {
            "true" => Token::Boolean(true),
            "false" => Token::Boolean(false),
            "null" => Token::Null,
            _ => Token::Keyword(word.into_owned()),
        }
    }
}

pub(crate) fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r' | 0x0C | 0x00)
}

pub(crate) fn is_delimiter(ch: u8) -> bool {
    matches!(
        ch,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

pub(crate) fn hex_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}

/// Find the first occurrence of `needle` at or after `from`.
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

/// Find the last occurrence of `needle` that starts before `before`.
pub(crate) fn rfind_bytes(haystack: &[u8], needle: &[u8], before: usize) -> Option<usize> {
    let end = before.min(haystack.len());
    if needle.is_empty() || end < needle.len() {
        return None;
    }
    haystack[..end]
        .windows(needle.len())
        .rposition(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &[u8]) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token == Token::Eof {
                break;
            }
            out.push(token);
        }
        out
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            tokens(b"true false null 123 -456 3.14 /Name"),
            vec![
                Token::Boolean(true),
                Token::Boolean(false),
                Token::Null,
                Token::Integer(123),
                Token::Integer(-456),
                Token::Real(3.14),
                Token::Name("Name".to_string()),
            ]
        );
    }

    #[test]
    fn test_delimiters() {
        assert_eq!(
            tokens(b"[ ] << >>"),
            vec![
                Token::ArrayStart,
                Token::ArrayEnd,
                Token::DictStart,
                Token::DictEnd
            ]
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            tokens(b"1 0 obj endobj stream R T* '"),
            vec![
                Token::Integer(1),
                Token::Integer(0),
                Token::Keyword("obj".to_string()),
                Token::Keyword("endobj".to_string()),
                Token::Keyword("stream".to_string()),
                Token::Keyword("R".to_string()),
                Token::Keyword("T*".to_string()),
                Token::Keyword("'".to_string()),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            tokens(b"%PDF-1.7\n1 % trailing\n2"),
            vec![Token::Integer(1), Token::Integer(2)]
        );
    }

    #[test]
    fn test_literal_string_nested_and_escapes() {
        assert_eq!(
            tokens(b"(a (nested) string)"),
            vec![Token::String(b"a (nested) string".to_vec())]
        );
        assert_eq!(
            tokens(br"(\(escaped\) \\ \n\t)"),
            vec![Token::String(b"(escaped) \\ \n\t".to_vec())]
        );
    }

    #[test]
    fn test_literal_string_octal() {
        assert_eq!(tokens(br"(\101\102\7)"), vec![Token::String(vec![b'A', b'B', 7])]);
        // Octal escape stops after three digits
        assert_eq!(tokens(br"(\1011)"), vec![Token::String(b"A1".to_vec())]);
    }

    #[test]
    fn test_literal_string_line_continuation() {
        assert_eq!(
            tokens(b"(abc\\\ndef)"),
            vec![Token::String(b"abcdef".to_vec())]
        );
    }

    #[test]
    fn test_hex_string_odd_padding() {
        assert_eq!(
            tokens(b"<48656C6C6F>"),
            vec![Token::HexString(b"Hello".to_vec())]
        );
        assert_eq!(tokens(b"<901FA>"), vec![Token::HexString(vec![0x90, 0x1F, 0xA0])]);
        assert_eq!(tokens(b"<48 65\n6C>"), vec![Token::HexString(b"Hel".to_vec())]);
    }

    #[test]
    fn test_name_hex_escape() {
        assert_eq!(
            tokens(b"/A#20B /Lime#20Green"),
            vec![
                Token::Name("A B".to_string()),
                Token::Name("Lime Green".to_string())
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens(b"+17 -.002 .5 4. 0"),
            vec![
                Token::Integer(17),
                Token::Real(-0.002),
                Token::Real(0.5),
                Token::Real(4.0),
                Token::Integer(0),
            ]
        );
    }

    #[test]
    fn test_unterminated_string_is_malformed() {
        let mut lexer = Lexer::new(b"(never closed");
        assert!(matches!(
            lexer.next_token(),
            Err(PdfError::MalformedSyntax { position: 0, .. })
        ));

        let mut lexer = Lexer::new(b"<4142");
        assert!(matches!(
            lexer.next_token(),
            Err(PdfError::MalformedSyntax { .. })
        ));
    }

    #[test]
    fn test_truncated_input_is_eof() {
        let mut lexer = Lexer::new(b"  ");
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);

        let mut lexer = Lexer::new(b"% only a comment");
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut lexer = Lexer::new(b"/A /B");
        assert_eq!(lexer.peek_token().unwrap(), Token::Name("A".to_string()));
        assert_eq!(lexer.next_token().unwrap(), Token::Name("A".to_string()));
        assert_eq!(lexer.next_token().unwrap(), Token::Name("B".to_string()));
    }

    #[test]
    fn test_skip_inline_image_data() {
        let data = b"ID \x00\xFFEIx\x01 EI Q";
        let mut lexer = Lexer::new(data);
        assert_eq!(lexer.next_token().unwrap(), Token::Keyword("ID".to_string()));
        lexer.skip_inline_image_data();
        assert_eq!(lexer.next_token().unwrap(), Token::Keyword("Q".to_string()));
    }

    #[test]
    fn test_find_helpers() {
        let data = b"startxref 1 startxref 2";
        assert_eq!(find_bytes(data, b"startxref", 0), Some(0));
        assert_eq!(find_bytes(data, b"startxref", 1), Some(12));
        assert_eq!(rfind_bytes(data, b"startxref", data.len()), Some(12));
        assert_eq!(rfind_bytes(data, b"startxref", 12), Some(0));
        assert_eq!(find_bytes(data, b"missing", 0), None);
    }
}
