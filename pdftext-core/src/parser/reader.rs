//! High-level PDF reader
//!
//! Resolves indirect objects through the cross-reference table. When the
//! table at `startxref` cannot be used, the reader tries the last `xref`
//! keyword in the file and finally rebuilds the map from a full scan.

use super::header::{PdfHeader, PdfVersion};
use super::lexer::{is_whitespace, rfind_bytes};
use super::object_stream::ObjectStream;
use super::objects::{LengthResolver, Parser, PdfDictionary, PdfObject};
use super::xref::{XRefEntry, XRefTable};
use super::ParseOptions;
use crate::error::{PdfError, Result};
use crate::recovery::XRefRecovery;
use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::ops::Deref;
use std::rc::Rc;

/// Longest `R -> R -> ...` chain followed before giving up
const MAX_REFERENCE_CHAIN: usize = 32;

enum Slot {
    Resolving,
    Resolved(Rc<PdfObject>),
    Failed(PdfError),
}

/// An object that was either direct or fetched through the cache.
#[derive(Debug, Clone)]
pub enum Resolved<'o> {
    Direct(&'o PdfObject),
    Indirect(Rc<PdfObject>),
}

impl Deref for Resolved<'_> {
    type Target = PdfObject;

    fn deref(&self) -> &PdfObject {
        match self {
            Resolved::Direct(object) => object,
            Resolved::Indirect(object) => object,
        }
    }
}

/// PDF reader over a borrowed buffer
pub struct PdfReader<'a> {
    /// Input starting at the `%PDF-` signature; all offsets are relative to it
    data: &'a [u8],
    header: PdfHeader,
    xref: XRefTable,
    options: ParseOptions,
    /// The whole map came from a scan
    rebuilt: bool,
    /// Some object was located by scanning
    recovered: Cell<bool>,
    scanned: OnceCell<HashMap<u32, (u16, usize)>>,
    cache: RefCell<HashMap<u32, Slot>>,
    object_streams: RefCell<HashMap<u32, Result<Rc<ObjectStream>>>>,
}

impl<'a> PdfReader<'a> {
    /// Open a buffer with default options
    pub fn new(data: &'a [u8]) -> Result<Self> {
        Self::with_options(data, ParseOptions::default())
    }

    pub fn with_options(data: &'a [u8], options: ParseOptions) -> Result<Self> {
        let header = PdfHeader::find(data, options.signature_scan_window)?;
        let body = &data[header.offset..];

        let (xref, rebuilt) = match load_xref(body) {
            Ok(xref) => (xref, false),
            Err(e) if options.recover => {
                tracing::warn!("cross-reference table unusable ({}), scanning for objects", e);
                (XRefRecovery::recover(body).0, true)
            }
            Err(e) => return Err(e),
        };

        let mut reader = Self {
            data: body,
            header,
            xref,
            options,
            rebuilt,
            recovered: Cell::new(rebuilt),
            scanned: OnceCell::new(),
            cache: RefCell::new(HashMap::new()),
            object_streams: RefCell::new(HashMap::new()),
        };

        if !reader.rebuilt && reader.options.recover {
            if let Err(e) = reader.catalog() {
                tracing::warn!("catalog unreachable through cross-reference table ({}), scanning for objects", e);
                reader.rebuild_from_scan();
            }
        }

        Ok(reader)
    }

    /// Replace the map with one rebuilt from a scan, if the scan finds a root.
    fn rebuild_from_scan(&mut self) {
        let (table, stats) = XRefRecovery::recover(self.data);
        if !table.trailer().contains_key("Root") {
            tracing::debug!("scan found {} objects but no catalog, keeping original table", stats.objects_found);
            return;
        }
        self.xref = table;
        self.rebuilt = true;
        self.recovered.set(true);
        self.cache.borrow_mut().clear();
        self.object_streams.borrow_mut().clear();
    }

    /// PDF version from the header
    pub fn version(&self) -> Option<PdfVersion> {
        self.header.version
    }

    /// Offset of the `%PDF-` signature in the original input
    pub fn header_offset(&self) -> usize {
        self.header.offset
    }

    /// Whether any part of the object map came from the recovery scan
    pub fn was_recovered(&self) -> bool {
        self.recovered.get()
    }

    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    pub fn trailer(&self) -> &PdfDictionary {
        self.xref.trailer()
    }

    /// The document catalog named by the trailer's `/Root`
    pub fn catalog(&self) -> Result<PdfDictionary> {
        let root = self
            .trailer()
            .get("Root")
            .ok_or_else(|| PdfError::structure("trailer has no /Root"))?;
        let resolved = self.resolve(root)?;
        match resolved.as_dict() {
            Some(dict) if dict.get_type().map_or(true, |t| t == "Catalog") && dict.contains_key("Pages") => {
                Ok(dict.clone())
            }
            Some(_) => Err(PdfError::structure("catalog has no /Pages")),
            None => Err(PdfError::structure("/Root is not a dictionary")),
        }
    }

    /// Follow references until a direct object is reached.
    pub fn resolve<'o>(&self, object: &'o PdfObject) -> Result<Resolved<'o>> {
        let PdfObject::Reference(obj_num, generation) = object else {
            return Ok(Resolved::Direct(object));
        };

        let mut current = self.get_object(*obj_num, *generation)?;
        for _ in 0..MAX_REFERENCE_CHAIN {
            match current.as_reference() {
                Some((num, gen)) => current = self.get_object(num, gen)?,
                None => return Ok(Resolved::Indirect(current)),
            }
        }
        Err(PdfError::structure(format!(
            "reference chain from {} {} R is too long",
            obj_num, generation
        )))
    }

    /// Get an object by reference, memoized per object number.
    pub fn get_object(&self, obj_num: u32, generation: u16) -> Result<Rc<PdfObject>> {
        let cached = match self.cache.borrow().get(&obj_num) {
            Some(Slot::Resolved(object)) => Some(Ok(Rc::clone(object))),
            Some(Slot::Failed(e)) => Some(Err(e.clone())),
            Some(Slot::Resolving) => Some(Err(PdfError::structure(format!(
                "object {} {} R depends on itself",
                obj_num, generation
            )))),
            None => None,
        };
        if let Some(result) = cached {
            return result;
        }

        self.cache.borrow_mut().insert(obj_num, Slot::Resolving);
        let result = self.load_object(obj_num, generation).map(Rc::new);
        let slot = match &result {
            Ok(object) => Slot::Resolved(Rc::clone(object)),
            Err(e) => Slot::Failed(e.clone()),
        };
        self.cache.borrow_mut().insert(obj_num, slot);
        result
    }

    fn load_object(&self, obj_num: u32, generation: u16) -> Result<PdfObject> {
        let primary = match self.xref.get(obj_num) {
            Some(XRefEntry::InUse { offset, .. }) => self.parse_at(*offset, obj_num),
            Some(XRefEntry::Compressed {
                stream_object_number,
                index_within_stream,
            }) => self.load_compressed(obj_num, *stream_object_number, *index_within_stream),
            Some(XRefEntry::Free { .. }) => return Err(PdfError::ObjectNotFound(obj_num, generation)),
            None => Err(PdfError::ObjectNotFound(obj_num, generation)),
        };

        match primary {
            Err(e) if self.options.recover && !self.rebuilt => {
                self.load_scanned(obj_num).map_err(|_| e)
            }
            other => other,
        }
    }

    /// Parse `N G obj` at `offset`, requiring the object number to match.
    fn parse_at(&self, offset: usize, obj_num: u32) -> Result<PdfObject> {
        if offset >= self.data.len() {
            return Err(PdfError::structure(format!(
                "object {} mapped past end of file (byte {})",
                obj_num, offset
            )));
        }
        let mut parser = Parser::at(self.data, offset).with_length_resolver(self);
        let (found, _, object) = parser.parse_indirect_object()?;
        if found != obj_num {
            return Err(PdfError::structure(format!(
                "byte {} holds object {}, expected {}",
                offset, found, obj_num
            )));
        }
        Ok(object)
    }

    fn load_scanned(&self, obj_num: u32) -> Result<PdfObject> {
        let offsets = self
            .scanned
            .get_or_init(|| XRefRecovery::scan_offsets(self.data));
        let &(generation, offset) = offsets
            .get(&obj_num)
            .ok_or(PdfError::ObjectNotFound(obj_num, 0))?;
        let object = self.parse_at(offset, obj_num)?;
        tracing::debug!("object {} {} R recovered by scan at byte {}", obj_num, generation, offset);
        self.recovered.set(true);
        Ok(object)
    }

    fn load_compressed(&self, obj_num: u32, stream_num: u32, index: u32) -> Result<PdfObject> {
        let objstm = self.object_stream(stream_num)?;
        objstm
            .get(obj_num, index)
            .cloned()
            .ok_or(PdfError::ObjectNotFound(obj_num, 0))
    }

    fn object_stream(&self, stream_num: u32) -> Result<Rc<ObjectStream>> {
        let cached = self.object_streams.borrow().get(&stream_num).cloned();
        if let Some(result) = cached {
            return result;
        }

        let result = self.get_object(stream_num, 0).and_then(|object| match object.as_stream() {
            Some(stream) => ObjectStream::parse(stream).map(Rc::new),
            None => Err(PdfError::structure(format!(
                "object {} is not an object stream",
                stream_num
            ))),
        });
        self.object_streams
            .borrow_mut()
            .insert(stream_num, result.clone());
        result
    }
}

impl LengthResolver for PdfReader<'_> {
    fn resolve_length(&self, obj_num: u32, generation: u16) -> Option<usize> {
        self.get_object(obj_num, generation)
            .ok()
            .and_then(|object| object.as_integer())
            .and_then(|len| usize::try_from(len).ok())
    }
}

/// `startxref` first, then the last free-standing `xref` keyword.
fn load_xref(data: &[u8]) -> Result<XRefTable> {
    match XRefTable::parse(data) {
        Ok(table) => Ok(table),
        Err(e) => {
            let Some(pos) = last_xref_keyword(data) else {
                return Err(e);
            };
            tracing::debug!("startxref unusable ({}), trying xref keyword at byte {}", e, pos);
            XRefTable::parse_from(data, pos)
        }
    }
}

fn last_xref_keyword(data: &[u8]) -> Option<usize> {
    let mut before = data.len();
    while let Some(pos) = rfind_bytes(data, b"xref", before) {
        let starts_token = pos == 0 || is_whitespace(data[pos - 1]);
        let ends_token = data.get(pos + 4).map_or(true, |&b| is_whitespace(b));
        if starts_token && ends_token {
            return Some(pos);
        }
        before = pos + 3;
    }
    None
}
