//! CMap and ToUnicode support for text extraction
//!
//! This module implements CMap parsing and ToUnicode mappings according to
//! ISO 32000-1:2008 Section 9.10 (Extraction of Text Content) and Section 9.7.5 (CMaps).
//!
//! CMaps define the mapping from character codes to character selectors (CIDs, character names,
//! or Unicode values). Only the parts needed for text recovery are kept: codespace ranges decide
//! how many bytes each code spans, and `bfchar` / `bfrange` blocks give the Unicode text.

use super::glyph_list::glyph_name_to_unicode;
use crate::parser::lexer::{Lexer, Token};
use std::collections::HashMap;

/// Ranges wider than this are assumed to be corrupt
const MAX_RANGE_SPAN: u32 = 0xFFFF;

/// Character code range from `begincodespacerange`
#[derive(Debug, Clone, PartialEq)]
pub struct CodeRange {
    /// Number of bytes per code in this range
    pub bytes: usize,
    pub low: u32,
    pub high: u32,
}

impl CodeRange {
    /// Check if a code of `bytes` length is within this range
    pub fn contains(&self, code: u32, bytes: usize) -> bool {
        bytes == self.bytes && code >= self.low && code <= self.high
    }
}

#[derive(Debug, Clone)]
enum RangeTarget {
    /// UTF-16BE start value; successive codes increment the last unit
    Offset(Vec<u16>),
    /// One destination per code
    Array(Vec<String>),
}

#[derive(Debug, Clone)]
struct BfRange {
    bytes: usize,
    low: u32,
    high: u32,
    target: RangeTarget,
}

/// CMap structure for character code mappings
#[derive(Debug, Clone, Default)]
pub struct CMap {
    /// CMap name
    pub name: Option<String>,
    /// Code space ranges
    pub codespace_ranges: Vec<CodeRange>,
    singles: HashMap<(usize, u32), String>,
    ranges: Vec<BfRange>,
}

impl CMap {
    /// Create a new empty CMap
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a CMap from stream data.
    ///
    /// Parsing is best effort: malformed entries are dropped and the rest is kept.
    pub fn parse(data: &[u8]) -> Self {
        let mut cmap = Self::new();
        let mut lexer = Lexer::new(data);
        let mut previous: Option<Token> = None;

        loop {
            let before = lexer.position();
            let token = match lexer.next_token() {
                Ok(Token::Eof) => break,
                Ok(token) => token,
                Err(_) => {
                    if lexer.position() <= before {
                        lexer.set_position(before + 1);
                    }
                    continue;
                }
            };

            match &token {
                Token::Keyword(k) if k == "begincodespacerange" => cmap.parse_codespace(&mut lexer),
                Token::Keyword(k) if k == "beginbfchar" => cmap.parse_bfchar(&mut lexer),
                Token::Keyword(k) if k == "beginbfrange" => cmap.parse_bfrange(&mut lexer),
                Token::Name(value) => {
                    if let Some(Token::Name(key)) = &previous {
                        if key == "CMapName" {
                            cmap.name = Some(value.clone());
                        }
                    }
                }
                _ => {}
            }
            previous = Some(token);
        }

        cmap
    }

    fn parse_codespace(&mut self, lexer: &mut Lexer<'_>) {
        while let Some([low, high]) = read_group::<2>(lexer, "endcodespacerange") {
            let (Token::HexString(low), Token::HexString(high)) = (low, high) else {
                continue;
            };
            if low.is_empty() || low.len() > 4 || low.len() != high.len() {
                continue;
            }
            self.codespace_ranges.push(CodeRange {
                bytes: low.len(),
                low: code_value(&low),
                high: code_value(&high),
            });
        }
    }

    fn parse_bfchar(&mut self, lexer: &mut Lexer<'_>) {
        while let Some([src, dst]) = read_group::<2>(lexer, "endbfchar") {
            let Token::HexString(src) = src else { continue };
            if src.is_empty() || src.len() > 4 {
                continue;
            }
            let text = match dst {
                Token::HexString(dst) => utf16_to_string(&dst),
                Token::Name(name) => glyph_name_to_unicode(&name).map(String::from),
                _ => None,
            };
            if let Some(text) = text {
                self.singles.insert((src.len(), code_value(&src)), text);
            }
        }
    }

    fn parse_bfrange(&mut self, lexer: &mut Lexer<'_>) {
        while let Some([low, high]) = read_group::<2>(lexer, "endbfrange") {
            let dst = match lexer.next_token() {
                Ok(Token::ArrayStart) => read_array(lexer).map(RangeTarget::Array),
                Ok(Token::HexString(dst)) if !dst.is_empty() => Some(RangeTarget::Offset(
                    dst.chunks(2)
                        .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
                        .collect(),
                )),
                _ => None,
            };
            let (Token::HexString(low), Token::HexString(high), Some(target)) = (low, high, dst) else {
                continue;
            };
            if low.is_empty() || low.len() > 4 || low.len() != high.len() {
                continue;
            }
            let (low_value, high_value) = (code_value(&low), code_value(&high));
            if high_value < low_value || high_value - low_value > MAX_RANGE_SPAN {
                continue;
            }
            self.ranges.push(BfRange {
                bytes: low.len(),
                low: low_value,
                high: high_value,
                target,
            });
        }
    }

    /// Whether the CMap carries any Unicode mappings
    pub fn has_mappings(&self) -> bool {
        !self.singles.is_empty() || !self.ranges.is_empty()
    }

    /// Split off the next code from `bytes`, returning `(code, length)`.
    ///
    /// Codespace ranges decide the length; without a matching range the
    /// shortest mapped code length is used, then `fallback_len`.
    pub fn next_code(&self, bytes: &[u8], fallback_len: usize) -> (u32, usize) {
        for len in 1..=4.min(bytes.len()) {
            let code = code_value(&bytes[..len]);
            if self.codespace_ranges.iter().any(|r| r.contains(code, len)) {
                return (code, len);
            }
        }

        let len = if self.codespace_ranges.is_empty() {
            self.shortest_mapped_len().unwrap_or(fallback_len)
        } else {
            // Outside every range: consume the shortest declared width
            self.codespace_ranges
                .iter()
                .map(|r| r.bytes)
                .min()
                .unwrap_or(fallback_len)
        };
        let len = len.clamp(1, 4).min(bytes.len()).max(1);
        (code_value(&bytes[..len.min(bytes.len())]), len)
    }

    fn shortest_mapped_len(&self) -> Option<usize> {
        self.singles
            .keys()
            .map(|(len, _)| *len)
            .chain(self.ranges.iter().map(|r| r.bytes))
            .min()
    }

    /// Unicode text for a code of `bytes` length
    pub fn lookup(&self, code: u32, bytes: usize) -> Option<String> {
        if let Some(text) = self.singles.get(&(bytes, code)) {
            return Some(text.clone());
        }

        let range = self
            .ranges
            .iter()
            .rev()
            .find(|r| r.bytes == bytes && code >= r.low && code <= r.high)?;
        let offset = code - range.low;
        match &range.target {
            RangeTarget::Offset(start) => {
                let mut units = start.clone();
                let last = units.last_mut()?;
                *last = last.wrapping_add(offset as u16);
                String::from_utf16(&units).ok()
            }
            RangeTarget::Array(items) => items.get(offset as usize).cloned(),
        }
    }
}

/// Read `N` tokens, stopping at `end` or end of input.
fn read_group<const N: usize>(lexer: &mut Lexer<'_>, end: &str) -> Option<[Token; N]> {
    let mut group: [Token; N] = std::array::from_fn(|_| Token::Null);
    for slot in group.iter_mut() {
        match lexer.next_token() {
            Ok(Token::Eof) => return None,
            Ok(Token::Keyword(k)) if k == end => return None,
            Ok(token) => *slot = token,
            Err(_) => return None,
        }
    }
    Some(group)
}

fn read_array(lexer: &mut Lexer<'_>) -> Option<Vec<String>> {
    let mut items = Vec::new();
    loop {
        match lexer.next_token().ok()? {
            Token::ArrayEnd => return Some(items),
            Token::HexString(dst) => {
                items.push(utf16_to_string(&dst).unwrap_or_else(|| char::REPLACEMENT_CHARACTER.to_string()))
            }
            Token::Eof => return None,
            _ => {}
        }
    }
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

/// Decode UTF-16BE, accepting a lone trailing byte as a Latin-1 character.
fn utf16_to_string(bytes: &[u8]) -> Option<String> {
    if bytes.len() == 1 {
        return Some(char::from(bytes[0]).to_string());
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).ok()
}
