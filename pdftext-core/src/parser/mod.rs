//! PDF Parser Module
//!
//! This module implements a native PDF parser for reading PDF files
//! according to the ISO 32000-1 (PDF 1.7) and ISO 32000-2 (PDF 2.0)
//! specifications, as far as text extraction needs: tokens, objects,
//! stream filters, cross-reference resolution, the page tree and content
//! stream operators.

pub mod content;
pub mod document;
pub mod filters;
pub mod header;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod page_tree;
pub mod reader;
pub mod stack_safe;
pub mod xref;

pub use self::content::{ContentOperation, ContentParser, TextElement};
pub use self::document::PdfDocument;
pub use self::header::{PdfHeader, PdfVersion};
pub use self::objects::{PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString};
pub use self::page_tree::ParsedPage;
pub use self::reader::{PdfReader, Resolved};

/// Default number of leading bytes searched for `%PDF-`
pub const DEFAULT_SIGNATURE_WINDOW: usize = 1024;

/// Options for opening a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Rebuild the object map by scanning when the xref is unusable
    pub recover: bool,
    /// How many leading bytes may precede `%PDF-`
    pub signature_scan_window: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            recover: true,
            signature_scan_window: DEFAULT_SIGNATURE_WINDOW,
        }
    }
}

impl ParseOptions {
    /// Strict parsing: no recovery scan
    pub fn strict() -> Self {
        Self {
            recover: false,
            ..Self::default()
        }
    }
}
