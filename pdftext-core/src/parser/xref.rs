//! PDF Cross-Reference Table Parser
//!
//! Parses classic xref tables (ISO 32000-1 Section 7.5.4) and cross-reference
//! streams (Section 7.5.8), following `/Prev` and `/XRefStm` links.

use super::lexer::{rfind_bytes, Lexer, Token};
use super::objects::{PdfDictionary, PdfName, PdfObject, Parser};
use crate::error::{PdfError, Result};
use std::collections::{HashMap, HashSet};

/// How far from the end of the file `startxref` is searched for first.
const STARTXREF_WINDOW: usize = 1024;

/// Upper bound on `/Prev` hops.
const MAX_SECTIONS: usize = 512;

/// Cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XRefEntry {
    /// Free object (type 0)
    Free { next_free_object: u32, generation: u16 },
    /// Uncompressed object at a byte offset (type 1)
    InUse { offset: usize, generation: u16 },
    /// Object stored inside an object stream (type 2)
    Compressed {
        stream_object_number: u32,
        index_within_stream: u32,
    },
}

impl XRefEntry {
    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }

    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } | XRefEntry::InUse { generation, .. } => {
                *generation
            }
            XRefEntry::Compressed { .. } => 0,
        }
    }
}

/// One xref section plus its trailer
#[derive(Debug, Clone, Default)]
struct XRefSection {
    entries: Vec<(u32, XRefEntry)>,
    trailer: PdfDictionary,
}

/// Cross-reference table
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    /// Map of object number to xref entry
    entries: HashMap<u32, XRefEntry>,
    /// Trailer dictionary (newest section wins per key)
    trailer: PdfDictionary,
}

impl XRefTable {
    /// Create a new empty xref table
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(entries: HashMap<u32, XRefEntry>, trailer: PdfDictionary) -> Self {
        Self { entries, trailer }
    }

    /// Parse the xref chain starting at the file's `startxref` offset.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let start = find_startxref(data)?;
        Self::parse_from(data, start)
    }

    /// Parse the xref chain starting at `offset`, following `/Prev`.
    ///
    /// The section at `offset` must parse. A broken `/Prev` link further
    /// back only truncates the chain.
    pub fn parse_from(data: &[u8], offset: usize) -> Result<Self> {
        let mut table = Self::new();
        let mut visited = HashSet::new();
        let mut next = Some(offset);

        while let Some(offset) = next.take() {
            if visited.len() >= MAX_SECTIONS || !visited.insert(offset) {
                tracing::warn!("xref /Prev chain loops back to byte {}", offset);
                break;
            }

            let section = match parse_section(data, offset) {
                Ok(section) => section,
                Err(e) if visited.len() == 1 => return Err(e),
                Err(e) => {
                    tracing::warn!("ignoring older xref section at byte {}: {}", offset, e);
                    break;
                }
            };
            next = offset_value(section.trailer.get("Prev"));

            let mut section_entries: HashMap<u32, XRefEntry> =
                section.entries.into_iter().collect();

            // Hybrid-reference file: the stream fills in what the table marks free
            if let Some(stm) = offset_value(section.trailer.get("XRefStm")) {
                if visited.insert(stm) {
                    match parse_section(data, stm) {
                        Ok(stream_section) => {
                            for (num, entry) in stream_section.entries {
                                let replace = section_entries
                                    .get(&num)
                                    .map_or(true, |existing| existing.is_free());
                                if replace {
                                    section_entries.insert(num, entry);
                                }
                            }
                        }
                        Err(e) => tracing::warn!("ignoring /XRefStm at byte {}: {}", stm, e),
                    }
                }
            }

            // Newer sections were merged first, so existing entries win
            for (num, entry) in section_entries {
                table.entries.entry(num).or_insert(entry);
            }
            for (key, value) in section.trailer.0 {
                table.trailer.0.entry(key).or_insert(value);
            }

            tracing::debug!("parsed xref section at byte {}", offset);
        }

        table.trailer.0.remove(&PdfName::new("Prev"));
        Ok(table)
    }

    pub fn get(&self, obj_num: u32) -> Option<&XRefEntry> {
        self.entries.get(&obj_num)
    }

    pub fn insert(&mut self, obj_num: u32, entry: XRefEntry) {
        self.entries.insert(obj_num, entry);
    }

    pub fn trailer(&self) -> &PdfDictionary {
        &self.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut PdfDictionary {
        &mut self.trailer
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &XRefEntry)> {
        self.entries.iter()
    }
}

fn offset_value(obj: Option<&PdfObject>) -> Option<usize> {
    obj.and_then(|o| o.as_integer())
        .and_then(|v| usize::try_from(v).ok())
}

/// Locate the offset recorded after the last `startxref` keyword.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    let tail_start = data.len().saturating_sub(STARTXREF_WINDOW);
    let keyword = rfind_bytes(&data[tail_start..], b"startxref", data.len() - tail_start)
        .map(|pos| pos + tail_start)
        .or_else(|| rfind_bytes(data, b"startxref", data.len()))
        .ok_or_else(|| PdfError::structure("startxref not found"))?;

    let mut lexer = Lexer::at(data, keyword + b"startxref".len());
    match lexer.next_token()? {
        Token::Integer(offset) if offset >= 0 && (offset as usize) < data.len() => {
            Ok(offset as usize)
        }
        other => Err(PdfError::structure(format!(
            "startxref points nowhere: {other:?}"
        ))),
    }
}

/// Parse one section: either `xref ... trailer << >>` or an xref stream object.
fn parse_section(data: &[u8], offset: usize) -> Result<XRefSection> {
    let mut lexer = Lexer::at(data, offset);
    match lexer.peek_token()? {
        Token::Keyword(k) if k == "xref" => {
            lexer.next_token()?;
            parse_classic_section(&mut lexer)
        }
        Token::Integer(_) => parse_stream_section(data, offset),
        other => Err(PdfError::structure(format!(
            "no xref section at byte {offset}: found {other:?}"
        ))),
    }
}

/// Subsections of `start count` followed by `offset generation n|f` triples.
fn parse_classic_section(lexer: &mut Lexer<'_>) -> Result<XRefSection> {
    let mut section = XRefSection::default();

    loop {
        let position = lexer.position();
        match lexer.next_token()? {
            Token::Keyword(k) if k == "trailer" => break,
            Token::Integer(first) => {
                let count = match lexer.next_token()? {
                    Token::Integer(count) if count >= 0 => count,
                    _ => return Err(PdfError::syntax(position, "bad xref subsection header")),
                };
                if first < 0 {
                    return Err(PdfError::syntax(position, "negative xref subsection start"));
                }
                // Entries past u32::MAX are still read to keep the lexer in step
                for i in 0..count {
                    let entry = parse_classic_entry(lexer)?;
                    if let Some(num) = object_number(first, i) {
                        section.entries.push((num, entry));
                    }
                }
            }
            Token::Eof => return Err(PdfError::syntax(position, "xref table without trailer")),
            other => {
                return Err(PdfError::syntax(
                    position,
                    format!("unexpected token in xref table: {other:?}"),
                ))
            }
        }
    }

    match lexer.next_token()? {
        Token::DictStart => {
            let mut parser = Parser::at(lexer.data(), lexer.position());
            section.trailer = parser.parse_dictionary(1)?;
            Ok(section)
        }
        _ => Err(PdfError::syntax(lexer.position(), "trailer is not a dictionary")),
    }
}

fn parse_classic_entry(lexer: &mut Lexer<'_>) -> Result<XRefEntry> {
    let position = lexer.position();
    let offset = lexer.next_token()?;
    let generation = lexer.next_token()?;
    let kind = lexer.next_token()?;

    match (offset, generation, kind) {
        (Token::Integer(offset), Token::Integer(gen), Token::Keyword(kind))
            if offset >= 0 && gen >= 0 =>
        {
            let generation = gen.min(u16::MAX as i64) as u16;
            match kind.as_str() {
                "n" => Ok(XRefEntry::InUse {
                    offset: offset as usize,
                    generation,
                }),
                "f" => Ok(XRefEntry::Free {
                    next_free_object: offset.min(u32::MAX as i64) as u32,
                    generation,
                }),
                _ => Err(PdfError::syntax(position, format!("bad xref entry type '{kind}'"))),
            }
        }
        _ => Err(PdfError::syntax(position, "malformed xref entry")),
    }
}

/// Cross-reference stream: `/W` field widths, `/Index` subsections.
fn parse_stream_section(data: &[u8], offset: usize) -> Result<XRefSection> {
    let mut parser = Parser::at(data, offset);
    let (_, _, object) = parser.parse_indirect_object()?;
    let stream = match object {
        PdfObject::Stream(stream) if stream.dict.get_type() == Some("XRef") => stream,
        _ => return Err(PdfError::structure(format!("object at byte {offset} is not an xref stream"))),
    };
    if let Some(filter) = &stream.unsupported_filter {
        return Err(PdfError::UnsupportedFilter(filter.clone()));
    }

    let entries = decode_stream_entries(&stream.dict, &stream.data)?;
    Ok(XRefSection {
        entries,
        trailer: stream.dict,
    })
}

fn decode_stream_entries(dict: &PdfDictionary, data: &[u8]) -> Result<Vec<(u32, XRefEntry)>> {
    let widths: Vec<usize> = dict
        .get("W")
        .and_then(|w| w.as_array())
        .map(|w| {
            w.iter()
                .map(|v| v.as_integer().unwrap_or(0).clamp(0, 8) as usize)
                .collect()
        })
        .unwrap_or_default();
    if widths.len() != 3 {
        return Err(PdfError::structure("xref stream /W must have three entries"));
    }
    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(PdfError::structure("xref stream /W is all zero"));
    }

    let size = dict.get("Size").and_then(|s| s.as_integer()).unwrap_or(0).max(0);
    let index: Vec<i64> = match dict.get("Index").and_then(|i| i.as_array()) {
        Some(array) => array.iter().filter_map(|v| v.as_integer()).collect(),
        None => vec![0, size],
    };

    let mut entries = Vec::new();
    let mut rows = data.chunks_exact(row_len);
    'subsections: for pair in index.chunks_exact(2) {
        let (first, count) = (pair[0].max(0), pair[1].max(0));
        for i in 0..count {
            let Some(row) = rows.next() else {
                break 'subsections;
            };
            let (a, rest) = row.split_at(widths[0]);
            let (b, c) = rest.split_at(widths[1]);
            // A zero-width type field defaults to type 1
            let kind = if widths[0] == 0 { 1 } else { read_field(a) };
            let (f2, f3) = (read_field(b), read_field(c));

            let entry = match kind {
                0 => XRefEntry::Free {
                    next_free_object: f2.min(u32::MAX as u64) as u32,
                    generation: f3.min(u16::MAX as u64) as u16,
                },
                1 => XRefEntry::InUse {
                    offset: f2 as usize,
                    generation: f3.min(u16::MAX as u64) as u16,
                },
                2 => XRefEntry::Compressed {
                    stream_object_number: f2.min(u32::MAX as u64) as u32,
                    index_within_stream: f3.min(u32::MAX as u64) as u32,
                },
                // Unknown types are treated as null references
                _ => continue,
            };
            if let Some(num) = object_number(first, i) {
                entries.push((num, entry));
            }
        }
    }
    Ok(entries)
}

/// Object number `first + i` of a subsection, if it fits in `u32`
fn object_number(first: i64, i: i64) -> Option<u32> {
    first.checked_add(i).and_then(|num| u32::try_from(num).ok())
}

/// Big-endian unsigned field
fn read_field(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::PdfArray;

    fn classic_pdf() -> Vec<u8> {
        let mut pdf = b"%PDF-1.4\n".to_vec();
        let obj1 = pdf.len();
        pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");
        let xref = pdf.len();
        pdf.extend_from_slice(b"xref\n0 2\n");
        pdf.extend_from_slice(b"0000000000 65535 f \n");
        pdf.extend_from_slice(format!("{obj1:010} 00000 n \n").as_bytes());
        pdf.extend_from_slice(b"trailer\n<< /Size 2 /Root 1 0 R >>\n");
        pdf.extend_from_slice(format!("startxref\n{xref}\n%%EOF\n").as_bytes());
        pdf
    }

    #[test]
    fn test_find_startxref() {
        let pdf = classic_pdf();
        let offset = find_startxref(&pdf).unwrap();
        assert!(pdf[offset..].starts_with(b"xref"));
    }

    #[test]
    fn test_missing_startxref() {
        assert!(matches!(
            find_startxref(b"%PDF-1.4\n1 0 obj null endobj"),
            Err(PdfError::MalformedStructure(_))
        ));
    }

    #[test]
    fn test_parse_classic_table() {
        let pdf = classic_pdf();
        let table = XRefTable::parse(&pdf).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get(0).unwrap().is_free());
        assert_eq!(table.get(1), Some(&XRefEntry::InUse { offset: 9, generation: 0 }));
        assert_eq!(table.trailer().get("Root"), Some(&PdfObject::Reference(1, 0)));
    }

    #[test]
    fn test_prev_chain_newest_wins() {
        let mut pdf = classic_pdf();
        let first_xref = find_startxref(&pdf).unwrap();

        // Incremental update redefining object 1 and adding 2
        let obj1 = pdf.len();
        pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Updated true >>\nendobj\n");
        let obj2 = pdf.len();
        pdf.extend_from_slice(b"2 0 obj\n(new)\nendobj\n");
        let xref = pdf.len();
        pdf.extend_from_slice(b"xref\n1 2\n");
        pdf.extend_from_slice(format!("{obj1:010} 00000 n \n{obj2:010} 00000 n \n").as_bytes());
        pdf.extend_from_slice(
            format!("trailer\n<< /Size 3 /Root 1 0 R /Prev {first_xref} >>\nstartxref\n{xref}\n%%EOF\n")
                .as_bytes(),
        );

        let table = XRefTable::parse(&pdf).unwrap();
        assert_eq!(table.get(1), Some(&XRefEntry::InUse { offset: obj1, generation: 0 }));
        assert_eq!(table.get(2), Some(&XRefEntry::InUse { offset: obj2, generation: 0 }));
        assert!(table.get(0).unwrap().is_free());
        assert_eq!(table.trailer().get("Size"), Some(&PdfObject::Integer(3)));
        assert!(!table.trailer().contains_key("Prev"));
    }

    #[test]
    fn test_prev_loop_terminates() {
        let mut pdf = b"%PDF-1.4\n".to_vec();
        let xref = pdf.len();
        pdf.extend_from_slice(
            format!("xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev {xref} >>\n").as_bytes(),
        );
        pdf.extend_from_slice(format!("startxref\n{xref}\n%%EOF").as_bytes());
        let table = XRefTable::parse(&pdf).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_decode_stream_entries() {
        let mut dict = PdfDictionary::new();
        dict.insert(
            "W",
            PdfObject::Array(PdfArray(vec![
                PdfObject::Integer(1),
                PdfObject::Integer(2),
                PdfObject::Integer(1),
            ])),
        );
        dict.insert("Size", PdfObject::Integer(3));
        let data = [
            0, 0x00, 0x00, 0xFF, // free
            1, 0x01, 0x00, 0x00, // offset 256
            2, 0x00, 0x05, 0x02, // in stream 5, index 2
        ];
        let entries = decode_stream_entries(&dict, &data).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].1.is_free());
        assert_eq!(entries[1], (1, XRefEntry::InUse { offset: 256, generation: 0 }));
        assert_eq!(
            entries[2],
            (
                2,
                XRefEntry::Compressed {
                    stream_object_number: 5,
                    index_within_stream: 2
                }
            )
        );
    }

    #[test]
    fn test_decode_stream_entries_with_index() {
        let mut dict = PdfDictionary::new();
        dict.insert(
            "W",
            PdfObject::Array(PdfArray(vec![
                PdfObject::Integer(0),
                PdfObject::Integer(1),
                PdfObject::Integer(0),
            ])),
        );
        dict.insert(
            "Index",
            PdfObject::Array(PdfArray(vec![
                PdfObject::Integer(10),
                PdfObject::Integer(1),
                PdfObject::Integer(20),
                PdfObject::Integer(2),
            ])),
        );
        let entries = decode_stream_entries(&dict, &[7, 8, 9]).unwrap();
        let nums: Vec<u32> = entries.iter().map(|(n, _)| *n).collect();
        assert_eq!(nums, vec![10, 20, 21]);
        assert_eq!(entries[0].1, XRefEntry::InUse { offset: 7, generation: 0 });
    }

    #[test]
    fn test_subsection_start_near_i64_max() {
        let mut pdf = b"%PDF-1.4\n".to_vec();
        let obj1 = pdf.len();
        pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");
        let xref = pdf.len();
        pdf.extend_from_slice(b"xref\n0 2\n0000000000 65535 f \n");
        pdf.extend_from_slice(format!("{obj1:010} 00000 n \n").as_bytes());
        pdf.extend_from_slice(b"9223372036854775807 2\n");
        pdf.extend_from_slice(format!("{obj1:010} 00000 n \n{obj1:010} 00000 n \n").as_bytes());
        pdf.extend_from_slice(b"trailer\n<< /Size 2 /Root 1 0 R >>\n");
        pdf.extend_from_slice(format!("startxref\n{xref}\n%%EOF\n").as_bytes());

        let table = XRefTable::parse(&pdf).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some(&XRefEntry::InUse { offset: obj1, generation: 0 }));
        assert_eq!(table.trailer().get("Root"), Some(&PdfObject::Reference(1, 0)));
    }

    #[test]
    fn test_stream_index_start_near_i64_max() {
        let mut dict = PdfDictionary::new();
        dict.insert(
            "W",
            PdfObject::Array(PdfArray(vec![
                PdfObject::Integer(0),
                PdfObject::Integer(1),
                PdfObject::Integer(0),
            ])),
        );
        dict.insert(
            "Index",
            PdfObject::Array(PdfArray(vec![
                PdfObject::Integer(i64::MAX),
                PdfObject::Integer(2),
                PdfObject::Integer(3),
                PdfObject::Integer(1),
            ])),
        );
        let entries = decode_stream_entries(&dict, &[7, 8, 9]).unwrap();
        assert_eq!(entries, vec![(3, XRefEntry::InUse { offset: 9, generation: 0 })]);
    }

    #[test]
    fn test_bad_offset_is_error() {
        let pdf = b"%PDF-1.4\njunk here\nstartxref\n9\n%%EOF";
        assert!(XRefTable::parse(pdf).is_err());
    }
}
