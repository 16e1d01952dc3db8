//! # pdftext
//!
//! A standalone, pure Rust PDF text-extraction engine. It takes a byte
//! buffer and returns the text of every page, in page order.
//!
//! ## Features
//!
//! - **Tolerant parsing**: classic and stream cross-reference tables, `/Prev`
//!   chains, object streams, and a full-file scan when the xref is broken
//! - **Page tree**: inherited `/Resources`, `/MediaBox`, `/CropBox` and
//!   `/Rotate`, with bounded `/Parent` walks
//! - **Content streams**: text state, text and graphics matrices, `TJ`
//!   spacing, form XObjects, inline images skipped
//! - **Fonts**: base encodings with `/Differences`, ToUnicode CMaps,
//!   Identity-H/V composite fonts, glyph widths
//! - **Failure isolation**: a broken page is skipped, the rest is still extracted
//!
//! ## Quick Start
//!
//! ```rust
//! let pdf = b"%PDF-1.4
//! 1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj
//! 2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj
//! 3 0 obj << /Type /Page /Parent 2 0 R /Contents 4 0 R >> endobj
//! 4 0 obj << /Length 43 >> stream
//! BT /F1 24 Tf 100 700 Td (Hello there) Tj ET
//! endstream endobj
//! ";
//!
//! let result = pdftext::extract_text(pdf);
//! assert!(result.success);
//! assert_eq!(result.page_count, 1);
//! assert_eq!(result.text, "=== Page 1 ===\nHello there");
//! ```
//!
//! ## Modules
//!
//! - [`parser`] - lexer, objects, filters, xref resolution, page tree and
//!   content-stream tokenizing
//!   - [`parser::PdfReader`] - object resolution with memoization
//!   - [`parser::PdfDocument`] - catalog, pages and per-page text
//! - [`recovery`] - rebuilding the object map by scanning
//! - [`text`] - fonts, encodings, CMaps and the content-stream interpreter
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events (recovery fallbacks and skipped pages
//! at `warn`, parsing details at `debug` and `trace`) and installs no
//! subscriber of its own.

pub mod error;
pub mod extract;
pub mod parser;
pub mod recovery;
pub mod text;

pub use error::{PdfError, Result};
pub use extract::{extract_text, extract_text_with_options, ExtractionResult, SkippedPage};
pub use parser::{ParseOptions, ParsedPage, PdfDocument, PdfReader, PdfVersion};
pub use text::{ExtractedText, ExtractionOptions, PositionedChar, TextExtractor};

/// Current version of pdftext
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
