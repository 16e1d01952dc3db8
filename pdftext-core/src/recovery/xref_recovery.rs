//! XRef recovery for corrupted PDF files
//!
//! Rebuilds the cross-reference table by scanning the whole buffer for
//! `N G obj` headers when the table at `startxref` is missing or wrong.

use crate::parser::lexer::{find_bytes, is_delimiter, is_whitespace, Lexer, Token};
use crate::parser::object_stream::ObjectStream;
use crate::parser::objects::{PdfDictionary, PdfObject, Parser};
use crate::parser::xref::{XRefEntry, XRefTable};
use std::collections::{BTreeMap, HashMap};

/// XRef recovery engine
#[derive(Default)]
pub struct XRefRecovery {
    /// Found objects during scan: id -> (generation, offset)
    objects: BTreeMap<u32, (u16, usize)>,
    /// Trailer dictionaries found in file order
    trailers: Vec<PdfDictionary>,
    /// Statistics
    stats: RecoveryStats,
}

/// Recovery statistics
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecoveryStats {
    /// Number of `N G obj` headers found
    pub objects_found: usize,
    /// Objects indexed from inside object streams
    pub compressed_found: usize,
    /// Whether a trailer with `/Root` was found
    pub trailer_found: bool,
    /// Whether `/Root` had to be guessed from a `/Type /Catalog` object
    pub catalog_guessed: bool,
}

impl XRefRecovery {
    /// Create a new XRef recovery instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `data` and build a best-effort table.
    pub fn recover(data: &[u8]) -> (XRefTable, RecoveryStats) {
        let mut recovery = Self::new();
        recovery.scan_buffer(data);
        recovery.scan_trailers(data);
        let table = recovery.build_xref_table(data);
        (table, recovery.stats)
    }

    /// Map of object number to header offset, later definitions winning.
    pub fn scan_offsets(data: &[u8]) -> HashMap<u32, (u16, usize)> {
        let mut recovery = Self::new();
        recovery.scan_buffer(data);
        recovery.objects.into_iter().collect()
    }

    /// Scan buffer for PDF objects
    fn scan_buffer(&mut self, data: &[u8]) {
        let mut pos = 0;
        while let Some(obj_pos) = find_bytes(data, b"obj", pos) {
            pos = obj_pos + 3;

            // "obj" must be a whole keyword, not part of "endobj" or "objx"
            if data.get(pos).is_some_and(|&b| !is_whitespace(b) && !is_delimiter(b)) {
                continue;
            }
            if let Some((id, gen, start)) = parse_object_header(data, obj_pos) {
                // Later definitions override earlier ones (incremental updates)
                self.objects.insert(id, (gen, start));
                self.stats.objects_found += 1;
            }
        }
        tracing::debug!("recovery scan found {} object headers", self.stats.objects_found);
    }

    /// Collect every parseable `trailer << ... >>`.
    fn scan_trailers(&mut self, data: &[u8]) {
        let mut pos = 0;
        while let Some(found) = find_bytes(data, b"trailer", pos) {
            pos = found + b"trailer".len();
            let mut lexer = Lexer::at(data, pos);
            if !matches!(lexer.next_token(), Ok(Token::DictStart)) {
                continue;
            }
            if let Ok(dict) = Parser::at(data, lexer.position()).parse_dictionary(1) {
                self.trailers.push(dict);
            }
        }
    }

    /// Build XRef table from found objects
    fn build_xref_table(&mut self, data: &[u8]) -> XRefTable {
        let mut entries: HashMap<u32, XRefEntry> = self
            .objects
            .iter()
            .map(|(&id, &(generation, offset))| (id, XRefEntry::InUse { offset, generation }))
            .collect();

        let mut catalog = None;
        let mut compressed_catalog = None;
        let mut xref_stream_trailer = None;

        for (&id, &(generation, offset)) in &self.objects {
            let Ok((_, _, object)) = Parser::at(data, offset).parse_indirect_object() else {
                continue;
            };
            let Some(dict) = object.as_dict() else {
                continue;
            };
            match dict.get_type() {
                Some("Catalog") => catalog = Some((id, generation)),
                Some("XRef") if dict.contains_key("Root") => {
                    xref_stream_trailer = Some(dict.clone());
                }
                Some("ObjStm") => {
                    if let Some(objstm) = object.as_stream().and_then(|s| ObjectStream::parse(s).ok()) {
                        for (index, &num) in objstm.numbers().iter().enumerate() {
                            let is_catalog = objstm
                                .get(num, index as u32)
                                .and_then(|o| o.as_dict())
                                .is_some_and(|d| d.get_type() == Some("Catalog"));
                            if is_catalog && catalog.is_none() {
                                compressed_catalog = Some(num);
                            }
                            entries.entry(num).or_insert_with(|| {
                                self.stats.compressed_found += 1;
                                XRefEntry::Compressed {
                                    stream_object_number: id,
                                    index_within_stream: index as u32,
                                }
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        // Newest trailer naming a root wins
        let mut trailer = self
            .trailers
            .iter()
            .rev()
            .find(|t| t.contains_key("Root"))
            .cloned()
            .or(xref_stream_trailer)
            .unwrap_or_default();

        if trailer.contains_key("Root") {
            self.stats.trailer_found = true;
        } else if let Some((id, generation)) = catalog {
            trailer.insert("Root", PdfObject::Reference(id, generation));
            self.stats.catalog_guessed = true;
        } else if let Some(id) = compressed_catalog {
            trailer.insert("Root", PdfObject::Reference(id, 0));
            self.stats.catalog_guessed = true;
        }

        let size = entries.keys().max().map_or(0, |max| i64::from(*max) + 1);
        trailer.insert("Size", PdfObject::Integer(size));

        XRefTable::from_parts(entries, trailer)
    }

    /// Get recovery statistics
    pub fn stats(&self) -> &RecoveryStats {
        &self.stats
    }
}

/// Read `N G` backwards from the `obj` keyword at `obj_pos`.
fn parse_object_header(data: &[u8], obj_pos: usize) -> Option<(u32, u16, usize)> {
    let mut i = obj_pos;

    let skip_ws = |mut i: usize| {
        while i > 0 && is_whitespace(data[i - 1]) {
            i -= 1;
        }
        i
    };
    let digits_start = |mut i: usize| {
        while i > 0 && data[i - 1].is_ascii_digit() {
            i -= 1;
        }
        i
    };

    let gen_end = skip_ws(i);
    if gen_end == i {
        // The keyword must be separated from the generation number
        return None;
    }
    let gen_start = digits_start(gen_end);
    if gen_start == gen_end {
        return None;
    }
    i = skip_ws(gen_start);
    if i == gen_start {
        return None;
    }
    let id_end = i;
    let id_start = digits_start(id_end);
    if id_start == id_end {
        return None;
    }
    // The object number must start a token
    if id_start > 0 && !is_whitespace(data[id_start - 1]) && !is_delimiter(data[id_start - 1]) {
        return None;
    }

    let id = std::str::from_utf8(&data[id_start..id_end]).ok()?.parse::<u32>().ok()?;
    let gen = std::str::from_utf8(&data[gen_start..gen_end]).ok()?.parse::<u16>().ok()?;
    Some((id, gen, id_start))
}
