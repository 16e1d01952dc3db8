//! PDF Document - the per-call view over a parsed file
//!
//! A [`PdfDocument`] owns the [`PdfReader`] (and through it the object cache)
//! for the duration of one extraction, together with the catalog and the
//! enumerated page tree. Everything is released when the document is dropped.
//!
//! Pages are resolved lazily and cached, so `page_at(i)` returns the same
//! [`ParsedPage`] on repeated calls. A page that fails to resolve keeps
//! failing with the same error without being re-parsed.
//!
//! # Example
//!
//! ```rust
//! use pdftext::parser::PdfDocument;
//! use pdftext::ExtractionOptions;
//!
//! let data = b"%PDF-1.4
//! 1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj
//! 2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj
//! 3 0 obj << /Type /Page /Parent 2 0 R /Contents 4 0 R >> endobj
//! 4 0 obj << /Length 25 >> stream
//! BT 10 10 Td (Hello) Tj ET
//! endstream endobj
//! ";
//! let document = PdfDocument::parse(data, &ExtractionOptions::default())?;
//! assert_eq!(document.page_count(), 1);
//! assert_eq!(document.page_text(0)?, "Hello");
//! # Ok::<(), pdftext::PdfError>(())
//! ```

use super::page_tree::{PageTree, ParsedPage};
use super::reader::PdfReader;
use super::{ParseOptions, PdfDictionary};
use crate::error::{PdfError, Result};
use crate::text::{ExtractionOptions, PageJob, ResourceLoader, TextExtractor};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// High-level document view
pub struct PdfDocument<'a> {
    reader: PdfReader<'a>,
    catalog: PdfDictionary,
    tree: PageTree,
    options: ExtractionOptions,
    /// Resolved pages by index, failures included
    pages: RefCell<HashMap<usize, Result<Rc<ParsedPage>>>>,
}

impl<'a> PdfDocument<'a> {
    /// Open a buffer with recovery enabled
    pub fn parse(data: &'a [u8], options: &ExtractionOptions) -> Result<Self> {
        let parse_options = ParseOptions {
            signature_scan_window: options.signature_scan_window,
            ..ParseOptions::default()
        };
        let reader = PdfReader::with_options(data, parse_options)?;
        Self::with_options(reader, options.clone())
    }

    /// Build a document from a reader with default extraction options
    pub fn new(reader: PdfReader<'a>) -> Result<Self> {
        Self::with_options(reader, ExtractionOptions::default())
    }

    /// Resolve the catalog and enumerate the page tree.
    ///
    /// Fails when the catalog or the root `/Pages` node is unusable.
    pub fn with_options(reader: PdfReader<'a>, options: ExtractionOptions) -> Result<Self> {
        let catalog = reader.catalog()?;
        let root = catalog
            .get("Pages")
            .cloned()
            .ok_or_else(|| PdfError::structure("catalog has no /Pages"))?;
        let tree = PageTree::load(&reader, &root, options.max_parent_depth)?;
        tracing::debug!("document has {} pages", tree.page_count());

        Ok(Self {
            reader,
            catalog,
            tree,
            options,
            pages: RefCell::new(HashMap::new()),
        })
    }

    pub fn reader(&self) -> &PdfReader<'a> {
        &self.reader
    }

    pub fn catalog(&self) -> &PdfDictionary {
        &self.catalog
    }

    pub fn options(&self) -> &ExtractionOptions {
        &self.options
    }

    /// Number of leaf pages found in the page tree
    pub fn page_count(&self) -> usize {
        self.tree.page_count()
    }

    /// Zero-based page access, memoized
    pub fn page_at(&self, index: usize) -> Result<Rc<ParsedPage>> {
        if let Some(cached) = self.pages.borrow().get(&index) {
            return cached.clone();
        }
        let page = self
            .tree
            .load_page(&self.reader, index, self.options.max_parent_depth)
            .map(Rc::new);
        self.pages.borrow_mut().insert(index, page.clone());
        page
    }

    /// Decoded content of a page; array parts are joined with a newline.
    ///
    /// Unreadable parts of a `/Contents` array are skipped. A single stream
    /// whose filter is not supported fails the page.
    pub fn page_content(&self, page: &ParsedPage) -> Result<Vec<u8>> {
        let Some(contents) = page.dict.get("Contents") else {
            return Ok(Vec::new());
        };
        let contents = self.reader.resolve(contents)?;

        if let Some(stream) = contents.as_stream() {
            if let Some(filter) = &stream.unsupported_filter {
                return Err(PdfError::UnsupportedFilter(filter.clone()));
            }
            return Ok(stream.decoded().to_vec());
        }

        let parts = contents.as_array().ok_or_else(|| {
            PdfError::structure(format!("page {} /Contents is not a stream or array", page.index))
        })?;
        let mut data = Vec::new();
        for part in parts.iter() {
            let stream = match self.reader.resolve(part) {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!("page {}: skipping content part: {}", page.index, e);
                    continue;
                }
            };
            match stream.as_stream() {
                Some(stream) if stream.unsupported_filter.is_none() => {
                    if !data.is_empty() {
                        data.push(b'\n');
                    }
                    data.extend_from_slice(stream.decoded());
                }
                Some(stream) => tracing::warn!(
                    "page {}: skipping content part with filter {:?}",
                    page.index,
                    stream.unsupported_filter
                ),
                None => tracing::warn!("page {}: content part is not a stream", page.index),
            }
        }
        Ok(data)
    }

    /// Parse a page's content and gather its resources for interpretation
    pub fn page_job(&self, index: usize, loader: &mut ResourceLoader<'_, 'a>) -> Result<PageJob> {
        let page = self.page_at(index)?;
        let content = self.page_content(&page)?;
        Ok(loader.page_job(index, &content, &page.resources))
    }

    /// A loader for this document's resources
    pub fn resource_loader(&self) -> ResourceLoader<'_, 'a> {
        ResourceLoader::new(&self.reader, self.options.max_form_depth)
    }

    /// Text of a single page
    pub fn page_text(&self, index: usize) -> Result<String> {
        let mut loader = self.resource_loader();
        let job = self.page_job(index, &mut loader)?;
        Ok(TextExtractor::with_options(self.options.clone())
            .extract_page(&job)
            .text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(objects: &[String]) -> Vec<u8> {
        let mut out = b"%PDF-1.7\n".to_vec();
        for (i, body) in objects.iter().enumerate() {
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        out
    }

    fn stream(content: &str) -> String {
        format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content)
    }

    fn two_pages() -> Vec<u8> {
        pdf(&[
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 \
             /Resources << /Font << /F1 7 0 R >> >> >>"
                .to_string(),
            "<< /Type /Page /Parent 2 0 R /Contents [5 0 R 8 0 R 6 0 R] >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /Contents 6 0 R >>".to_string(),
            stream("BT /F1 12 Tf 72 700 Td (Page one) Tj ET"),
            stream("BT /F1 12 Tf 72 600 Td (Second part) Tj ET"),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
            "<< /Length 4 /Filter /DCTDecode >>\nstream\n\u{1}\u{2}\u{3}\u{4}\nendstream".to_string(),
        ])
    }

    #[test]
    fn test_page_at_is_memoized() {
        let data = two_pages();
        let document = PdfDocument::parse(&data, &ExtractionOptions::default()).unwrap();
        assert_eq!(document.page_count(), 2);
        let first = document.page_at(0).unwrap();
        assert!(Rc::ptr_eq(&first, &document.page_at(0).unwrap()));
        assert!(document.page_at(5).is_err());
    }

    #[test]
    fn test_content_array_skips_unsupported_part() {
        let data = two_pages();
        let document = PdfDocument::parse(&data, &ExtractionOptions::default()).unwrap();
        assert_eq!(document.page_text(0).unwrap(), "Page one\nSecond part");
        assert_eq!(document.page_text(1).unwrap(), "Second part");
    }

    #[test]
    fn test_missing_pages_is_document_error() {
        let data = pdf(&[
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "(not a node)".to_string(),
        ]);
        assert!(PdfDocument::parse(&data, &ExtractionOptions::default()).is_err());
    }

    #[test]
    fn test_single_unsupported_stream_fails_page() {
        let data = pdf(&[
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>".to_string(),
            "<< /Length 2 /Filter /JBIG2Decode >>\nstream\nxx\nendstream".to_string(),
        ]);
        let document = PdfDocument::parse(&data, &ExtractionOptions::default()).unwrap();
        assert_eq!(
            document.page_text(0),
            Err(PdfError::UnsupportedFilter("JBIG2Decode".to_string()))
        );
    }
}
