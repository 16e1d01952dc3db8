//! Whole-document text extraction
//!
//! [`extract_text`] never fails: every outcome, including an unreadable
//! buffer, is reported through [`ExtractionResult`]. Pages that cannot be
//! resolved or decoded are recorded in `skipped_pages` and the remaining
//! pages are still extracted.

use crate::error::PdfError;
use crate::parser::PdfDocument;
use crate::text::{ExtractedText, ExtractionOptions, PageJob, TextExtractor};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

/// A page left out of the text, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SkippedPage {
    pub index: usize,
    pub error: String,
}

/// Outcome of one extraction call
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ExtractionResult {
    /// False only when the document itself could not be opened
    pub success: bool,
    /// Page texts in page order, each under its page marker
    pub text: String,
    /// Pages found in the page tree
    pub page_count: usize,
    /// Pages whose text made it into `text`
    pub processed_pages: usize,
    /// Unicode scalar values in `text`
    pub char_count: usize,
    /// Document-level failure message
    pub error: Option<String>,
    /// Zero-based indices of the processed pages
    pub processed_page_indices: Vec<usize>,
    pub skipped_pages: Vec<SkippedPage>,
    /// Version from the `%PDF-x.y` header
    pub version: Option<String>,
    /// Whether any object had to be located by scanning the file
    pub recovered: bool,
}

impl ExtractionResult {
    fn failure(error: &PdfError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Extract the text of every page with default options
pub fn extract_text(bytes: &[u8]) -> ExtractionResult {
    extract_text_with_options(bytes, &ExtractionOptions::default())
}

/// Extract the text of every page
pub fn extract_text_with_options(bytes: &[u8], options: &ExtractionOptions) -> ExtractionResult {
    let document = match PdfDocument::parse(bytes, options) {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!("cannot open document: {}", e);
            return ExtractionResult::failure(&e);
        }
    };

    let page_count = document.page_count();
    let mut jobs = Vec::with_capacity(page_count);
    let mut skipped_pages = Vec::new();
    {
        let mut loader = document.resource_loader();
        for index in 0..page_count {
            match document.page_job(index, &mut loader) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    tracing::warn!("skipping page {}: {}", index + 1, e);
                    skipped_pages.push(SkippedPage {
                        index,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    let extractor = TextExtractor::with_options(options.clone());
    let pages = if options.parallel && jobs.len() > 1 {
        interpret_parallel(&extractor, jobs, options.thread_count())
    } else {
        jobs.iter()
            .map(|job| (job.index, extractor.extract_page(job)))
            .collect()
    };

    let text = assemble(options, &pages);
    let reader = document.reader();
    ExtractionResult {
        success: true,
        char_count: text.chars().count(),
        text,
        page_count,
        processed_pages: pages.len(),
        error: None,
        processed_page_indices: pages.iter().map(|(index, _)| *index).collect(),
        skipped_pages,
        version: reader.version().map(|v| v.to_string()),
        recovered: reader.was_recovered(),
    }
}

/// Join page texts under their markers
fn assemble(options: &ExtractionOptions, pages: &[(usize, ExtractedText)]) -> String {
    let mut text = String::new();
    for (index, page) in pages {
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&options.marker_for(*index));
        let body = page.text.trim_end();
        if !body.is_empty() {
            text.push('\n');
            text.push_str(body);
        }
    }
    text
}

/// Interpret pages on a pool of worker threads, returning them in page order
fn interpret_parallel(
    extractor: &TextExtractor,
    jobs: Vec<PageJob>,
    workers: usize,
) -> Vec<(usize, ExtractedText)> {
    let count = jobs.len();
    let workers = workers.min(count).max(1);
    let (job_sender, job_receiver) = mpsc::channel::<(usize, PageJob)>();
    let job_receiver = Arc::new(Mutex::new(job_receiver));
    let (result_sender, result_receiver) = mpsc::channel();

    for (slot, job) in jobs.into_iter().enumerate() {
        // The receiver is alive until the scope below ends
        let _ = job_sender.send((slot, job));
    }
    drop(job_sender);

    thread::scope(|scope| {
        for id in 0..workers {
            let receiver = Arc::clone(&job_receiver);
            let results = result_sender.clone();
            scope.spawn(move || loop {
                let next = match receiver.lock() {
                    Ok(guard) => guard.recv(),
                    Err(_) => break,
                };
                let Ok((slot, job)) = next else { break };
                tracing::trace!("worker {} interpreting page {}", id, job.index + 1);
                let text = extractor.extract_page(&job);
                if results.send((slot, job.index, text)).is_err() {
                    break;
                }
            });
        }
    });
    drop(result_sender);

    let mut ordered: Vec<Option<(usize, ExtractedText)>> = vec![None; count];
    for (slot, index, text) in result_receiver {
        if let Some(entry) = ordered.get_mut(slot) {
            *entry = Some((index, text));
        }
    }
    ordered.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_pdf(texts: &[&str]) -> Vec<u8> {
        let n = texts.len();
        let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 3 + 2 * i)).collect();
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), n),
        ];
        for (i, text) in texts.iter().enumerate() {
            let content = format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET", text);
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /Contents {} 0 R >>",
                4 + 2 * i
            ));
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                content.len(),
                content
            ));
        }
        let mut out = b"%PDF-1.4\n".to_vec();
        for (i, body) in objects.iter().enumerate() {
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        out
    }

    #[test]
    fn test_pages_under_markers() {
        let result = extract_text(&page_pdf(&["alpha", "beta"]));
        assert!(result.success);
        assert_eq!(
            result.text,
            "=== Page 1 ===\nalpha\n\n=== Page 2 ===\nbeta"
        );
        assert_eq!(result.page_count, 2);
        assert_eq!(result.processed_pages, 2);
        assert_eq!(result.processed_page_indices, vec![0, 1]);
        assert_eq!(result.char_count, result.text.chars().count());
        assert_eq!(result.version.as_deref(), Some("1.4"));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let texts: Vec<String> = (0..9).map(|i| format!("page-{}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let data = page_pdf(&refs);
        let sequential = extract_text(&data);
        let parallel = extract_text_with_options(
            &data,
            &ExtractionOptions::default().with_parallel(true).with_threads(3),
        );
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_missing_signature() {
        let result = extract_text(b"hello world");
        assert!(!result.success);
        assert_eq!(result.error, Some(PdfError::InvalidSignature.to_string()));
        assert_eq!(result.text, "");
    }

    #[test]
    fn test_custom_marker() {
        let options = ExtractionOptions::default().with_page_marker("<{page}>");
        let result = extract_text_with_options(&page_pdf(&["x"]), &options);
        assert_eq!(result.text, "<1>\nx");
    }
}
