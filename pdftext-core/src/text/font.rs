//! Font dictionaries as seen by text extraction
//!
//! A [`FontInfo`] turns the bytes of a text-showing operator into glyphs:
//! Unicode text plus the advance width needed to position what follows.

use super::cmap::CMap;
use super::encoding::TextEncoding;
use super::glyph_list::glyph_name_to_unicode;
use crate::parser::objects::{PdfDictionary, PdfObject};
use crate::parser::reader::PdfReader;
use std::collections::HashMap;

/// Width used when a simple font gives none, in glyph space units
const DEFAULT_GLYPH_WIDTH: f64 = 500.0;
/// `/DW` default for CID fonts
const DEFAULT_CID_WIDTH: f64 = 1000.0;

/// One decoded character code
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub code: u32,
    /// Unicode text, U+FFFD when the code cannot be mapped
    pub text: String,
    /// Horizontal advance in glyph space (thousandths of text space)
    pub width: f64,
    /// Single-byte code 32, which receives word spacing
    pub is_word_space: bool,
}

#[derive(Debug, Clone)]
enum FontEncoding {
    Simple(Box<[Option<char>; 256]>),
    /// Type0 font; the CMap splits codes, `None` meaning Identity-H/V
    Composite(Option<CMap>),
}

#[derive(Debug, Clone)]
enum GlyphWidths {
    Simple {
        first_char: u32,
        widths: Vec<f64>,
        missing: f64,
    },
    Cid {
        default: f64,
        widths: HashMap<u32, f64>,
    },
}

/// Font information with CMap support
#[derive(Debug, Clone)]
pub struct FontInfo {
    /// `/BaseFont`
    pub name: String,
    /// Font type (Type1, TrueType, Type0, etc.)
    pub subtype: String,
    encoding: FontEncoding,
    to_unicode: Option<CMap>,
    widths: GlyphWidths,
}

impl FontInfo {
    /// Font used when `Tf` names a resource that does not exist
    pub fn fallback() -> Self {
        Self {
            name: String::new(),
            subtype: "Type1".to_string(),
            encoding: FontEncoding::Simple(Box::new(implicit_encoding())),
            to_unicode: None,
            widths: GlyphWidths::Simple {
                first_char: 0,
                widths: Vec::new(),
                missing: DEFAULT_GLYPH_WIDTH,
            },
        }
    }

    /// Build from a font dictionary, resolving what it references.
    ///
    /// Never fails: unreadable parts fall back to defaults.
    pub fn from_dict(dict: &PdfDictionary, reader: &PdfReader<'_>) -> Self {
        let subtype = dict
            .get("Subtype")
            .and_then(|o| o.as_name())
            .unwrap_or("Type1")
            .to_string();
        let name = dict
            .get("BaseFont")
            .and_then(|o| o.as_name())
            .unwrap_or_default()
            .to_string();

        let to_unicode = dict.get("ToUnicode").and_then(|obj| {
            let resolved = reader.resolve(obj).ok()?;
            let stream = resolved.as_stream()?;
            let cmap = CMap::parse(stream.decoded());
            cmap.has_mappings().then_some(cmap)
        });

        if subtype == "Type0" {
            let descendant = dict
                .get("DescendantFonts")
                .and_then(|obj| resolve_dict_in_array(reader, obj));
            let encoding = match dict.get("Encoding") {
                Some(obj) if obj.as_reference().is_some() => reader
                    .resolve(obj)
                    .ok()
                    .and_then(|r| r.as_stream().map(|s| CMap::parse(s.decoded()))),
                Some(PdfObject::Name(name)) if !name.as_str().starts_with("Identity") => {
                    tracing::debug!("predefined CMap {} treated as Identity", name.as_str());
                    None
                }
                _ => None,
            };
            let widths = descendant
                .as_ref()
                .map(|d| cid_widths(d, reader))
                .unwrap_or(GlyphWidths::Cid {
                    default: DEFAULT_CID_WIDTH,
                    widths: HashMap::new(),
                });
            return Self {
                name,
                subtype,
                encoding: FontEncoding::Composite(encoding),
                to_unicode,
                widths,
            };
        }

        Self {
            encoding: FontEncoding::Simple(Box::new(simple_encoding(dict, reader))),
            widths: simple_widths(dict, reader),
            name,
            subtype,
            to_unicode,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.encoding, FontEncoding::Composite(_))
    }

    pub fn has_to_unicode(&self) -> bool {
        self.to_unicode.is_some()
    }

    /// Split a string operand into glyphs
    pub fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        match &self.encoding {
            FontEncoding::Simple(table) => bytes
                .iter()
                .map(|&byte| {
                    let code = u32::from(byte);
                    let text = self
                        .to_unicode
                        .as_ref()
                        .and_then(|cmap| cmap.lookup(code, 1).or_else(|| cmap.lookup(code, 2)))
                        .or_else(|| table[byte as usize].map(String::from))
                        .unwrap_or_else(replacement);
                    Glyph {
                        code,
                        text,
                        width: self.width(code),
                        is_word_space: byte == b' ',
                    }
                })
                .collect(),
            FontEncoding::Composite(cmap) => {
                let mut glyphs = Vec::new();
                let mut rest = bytes;
                while !rest.is_empty() {
                    let (code, len) = self.split_code(cmap.as_ref(), rest);
                    rest = &rest[len.min(rest.len())..];
                    let text = self
                        .to_unicode
                        .as_ref()
                        .and_then(|tu| tu.lookup(code, len))
                        .or_else(|| {
                            char::from_u32(code)
                                .filter(|c| !c.is_control())
                                .map(String::from)
                        })
                        .unwrap_or_else(replacement);
                    glyphs.push(Glyph {
                        code,
                        text,
                        width: self.width(code),
                        is_word_space: len == 1 && code == 32,
                    });
                }
                glyphs
            }
        }
    }

    fn split_code(&self, encoding: Option<&CMap>, bytes: &[u8]) -> (u32, usize) {
        if let Some(cmap) = encoding.filter(|c| !c.codespace_ranges.is_empty()) {
            return cmap.next_code(bytes, 2);
        }
        if let Some(tu) = self.to_unicode.as_ref().filter(|c| !c.codespace_ranges.is_empty()) {
            return tu.next_code(bytes, 2);
        }
        match bytes {
            [hi, lo, ..] => ((u32::from(*hi) << 8) | u32::from(*lo), 2),
            [only] => (u32::from(*only), 1),
            [] => (0, 1),
        }
    }

    /// Advance width of a code in glyph space
    pub fn width(&self, code: u32) -> f64 {
        match &self.widths {
            GlyphWidths::Simple {
                first_char,
                widths,
                missing,
            } => code
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize))
                .copied()
                .unwrap_or(*missing),
            GlyphWidths::Cid { default, widths } => widths.get(&code).copied().unwrap_or(*default),
        }
    }
}

fn replacement() -> String {
    char::REPLACEMENT_CHARACTER.to_string()
}

/// StandardEncoding with ASCII quotes, used when `/Encoding` is absent
fn implicit_encoding() -> [Option<char>; 256] {
    let mut table = TextEncoding::StandardEncoding.table();
    table[0x27] = Some('\'');
    table[0x60] = Some('`');
    table
}

fn simple_encoding(dict: &PdfDictionary, reader: &PdfReader<'_>) -> [Option<char>; 256] {
    let Some(encoding) = dict.get("Encoding") else {
        return implicit_encoding();
    };
    let Ok(encoding) = reader.resolve(encoding) else {
        return implicit_encoding();
    };

    match &*encoding {
        PdfObject::Name(name) => TextEncoding::from_name(name.as_str())
            .map(|e| e.table())
            .unwrap_or_else(implicit_encoding),
        PdfObject::Dictionary(enc_dict) => {
            let mut table = enc_dict
                .get("BaseEncoding")
                .and_then(|o| o.as_name())
                .and_then(TextEncoding::from_name)
                .map(|e| e.table())
                .unwrap_or_else(implicit_encoding);
            if let Some(differences) = enc_dict.get("Differences") {
                if let Ok(differences) = reader.resolve(differences) {
                    if let Some(array) = differences.as_array() {
                        apply_differences(&mut table, array.iter());
                    }
                }
            }
            table
        }
        _ => implicit_encoding(),
    }
}

/// `[code /name /name ... code /name ...]`
fn apply_differences<'o>(table: &mut [Option<char>; 256], items: impl Iterator<Item = &'o PdfObject>) {
    let mut code: Option<usize> = None;
    for item in items {
        match item {
            PdfObject::Integer(n) => code = usize::try_from(*n).ok(),
            PdfObject::Name(name) => {
                if let Some(c) = code.filter(|c| *c < 256) {
                    table[c] = glyph_name_to_unicode(name.as_str());
                }
                code = code.and_then(|c| c.checked_add(1));
            }
            _ => {}
        }
    }
}

fn number(reader: &PdfReader<'_>, obj: &PdfObject) -> Option<f64> {
    reader.resolve(obj).ok().and_then(|o| o.as_real())
}

fn simple_widths(dict: &PdfDictionary, reader: &PdfReader<'_>) -> GlyphWidths {
    let first_char = dict
        .get("FirstChar")
        .and_then(|o| number(reader, o))
        .filter(|n| *n >= 0.0)
        .map_or(0, |n| n as u32);
    let widths: Vec<f64> = dict
        .get("Widths")
        .and_then(|o| reader.resolve(o).ok())
        .and_then(|o| {
            o.as_array().map(|array| {
                array
                    .iter()
                    .map(|w| number(reader, w).unwrap_or(DEFAULT_GLYPH_WIDTH))
                    .collect()
            })
        })
        .unwrap_or_default();
    let missing = dict
        .get("FontDescriptor")
        .and_then(|o| reader.resolve(o).ok())
        .and_then(|d| d.as_dict().and_then(|d| d.get("MissingWidth")).and_then(|w| number(reader, w)))
        .filter(|w| *w > 0.0)
        .unwrap_or(DEFAULT_GLYPH_WIDTH);

    GlyphWidths::Simple {
        first_char,
        widths,
        missing,
    }
}

/// `/DW` and `/W` of a CIDFont
fn cid_widths(descendant: &PdfDictionary, reader: &PdfReader<'_>) -> GlyphWidths {
    let default = descendant
        .get("DW")
        .and_then(|o| number(reader, o))
        .unwrap_or(DEFAULT_CID_WIDTH);
    let mut widths = HashMap::new();

    let w = descendant.get("W").and_then(|o| reader.resolve(o).ok());
    if let Some(items) = w.as_ref().and_then(|o| o.as_array()) {
        let mut i = 0;
        while i < items.len() {
            let Some(first) = items.get(i).and_then(|o| number(reader, o)) else {
                break;
            };
            let first = first.max(0.0) as u32;
            match items.get(i + 1).map(|o| reader.resolve(o)) {
                Some(Ok(next)) if next.as_array().is_some() => {
                    if let Some(list) = next.as_array() {
                        for (offset, width) in list.iter().enumerate() {
                            if let Some(width) = number(reader, width) {
                                widths.insert(first.saturating_add(offset as u32), width);
                            }
                        }
                    }
                    i += 2;
                }
                Some(Ok(next)) => {
                    let last = next.as_real().map_or(first, |l| l.max(0.0) as u32);
                    let width = items.get(i + 2).and_then(|o| number(reader, o));
                    if let Some(width) = width {
                        // Bounded so a corrupt range cannot exhaust memory
                        for cid in first..=last.min(first.saturating_add(0xFFFF)) {
                            widths.insert(cid, width);
                        }
                    }
                    i += 3;
                }
                _ => break,
            }
        }
    }

    GlyphWidths::Cid { default, widths }
}

/// First element of an array (or the object itself) as a dictionary
fn resolve_dict_in_array(reader: &PdfReader<'_>, obj: &PdfObject) -> Option<PdfDictionary> {
    let resolved = reader.resolve(obj).ok()?;
    match resolved.as_array() {
        Some(array) => {
            let first = reader.resolve(array.get(0)?).ok()?;
            first.as_dict().cloned()
        }
        None => resolved.as_dict().cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::{PdfArray, PdfName};

    const MINIMAL: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n";

    fn name(n: &str) -> PdfObject {
        PdfObject::Name(PdfName::new(n))
    }

    #[test]
    fn test_fallback_decodes_ascii() {
        let font = FontInfo::fallback();
        let text: String = font.decode(b"It's `ok`").into_iter().map(|g| g.text).collect();
        assert_eq!(text, "It's `ok`");
    }

    #[test]
    fn test_simple_font_with_differences() {
        let reader = PdfReader::new(MINIMAL).unwrap();

        let mut encoding = PdfDictionary::new();
        encoding.insert("BaseEncoding", name("WinAnsiEncoding"));
        encoding.insert(
            "Differences",
            PdfObject::Array(PdfArray(vec![
                PdfObject::Integer(65),
                name("bullet"),
                name("g12"),
            ])),
        );
        let mut dict = PdfDictionary::new();
        dict.insert("Subtype", name("Type1"));
        dict.insert("Encoding", PdfObject::Dictionary(encoding));
        dict.insert("FirstChar", PdfObject::Integer(65));
        dict.insert(
            "Widths",
            PdfObject::Array(PdfArray(vec![PdfObject::Integer(600), PdfObject::Integer(700)])),
        );

        let font = FontInfo::from_dict(&dict, &reader);
        let glyphs = font.decode(b"ABC\x80");
        let texts: Vec<&str> = glyphs.iter().map(|g| g.text.as_str()).collect();
        assert_eq!(texts, vec!["•", "\u{FFFD}", "C", "€"]);
        assert_eq!(glyphs[0].width, 600.0);
        assert_eq!(glyphs[1].width, 700.0);
        assert_eq!(glyphs[2].width, DEFAULT_GLYPH_WIDTH);
    }

    #[test]
    fn test_differences_with_huge_codes() {
        let mut table = [None; 256];
        let items = [
            PdfObject::Integer(i64::MAX),
            name("A"),
            name("B"),
            PdfObject::Integer(-5),
            name("C"),
            PdfObject::Integer(65),
            name("D"),
        ];
        apply_differences(&mut table, items.iter());
        assert_eq!(table[65], Some('D'));
        assert_eq!(table.iter().flatten().count(), 1);
    }

    #[test]
    fn test_identity_type0_without_to_unicode() {
        let reader = PdfReader::new(MINIMAL).unwrap();

        let mut dict = PdfDictionary::new();
        dict.insert("Subtype", name("Type0"));
        dict.insert("Encoding", name("Identity-H"));
        let font = FontInfo::from_dict(&dict, &reader);
        assert!(font.is_composite());

        let glyphs = font.decode(&[0x00, 0x48, 0x00, 0x69, 0x00]);
        let text: String = glyphs.iter().map(|g| g.text.as_str()).collect();
        assert_eq!(text, "Hi\u{FFFD}");
        assert_eq!(glyphs[0].width, DEFAULT_CID_WIDTH);
    }

    #[test]
    fn test_cid_widths_both_forms() {
        let reader = PdfReader::new(MINIMAL).unwrap();

        let mut descendant = PdfDictionary::new();
        descendant.insert("DW", PdfObject::Integer(800));
        descendant.insert(
            "W",
            PdfObject::Array(PdfArray(vec![
                PdfObject::Integer(1),
                PdfObject::Array(PdfArray(vec![PdfObject::Integer(100), PdfObject::Integer(200)])),
                PdfObject::Integer(10),
                PdfObject::Integer(12),
                PdfObject::Integer(300),
            ])),
        );
        let widths = cid_widths(&descendant, &reader);
        let font = FontInfo {
            name: String::new(),
            subtype: "Type0".to_string(),
            encoding: FontEncoding::Composite(None),
            to_unicode: None,
            widths,
        };
        assert_eq!(font.width(1), 100.0);
        assert_eq!(font.width(2), 200.0);
        assert_eq!(font.width(11), 300.0);
        assert_eq!(font.width(13), 800.0);
    }
}
