//! Text extraction from PDF content streams
//!
//! Interprets the text-related subset of the content-stream operators and
//! produces positioned characters in encounter order, plus the page text
//! assembled from them.

use super::font::FontInfo;
use super::resources::{PageJob, ResourceSet, IDENTITY};
use crate::error::PdfError;
use crate::parser::content::{ContentOperation, TextElement};
use crate::parser::stack_safe::DEFAULT_MAX_PARENT_DEPTH;
use crate::parser::DEFAULT_SIGNATURE_WINDOW;
use std::sync::Arc;

/// Text extraction options
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOptions {
    /// Page boundary marker; `{page}` becomes the 1-based page number
    pub page_marker: String,
    /// Number of leading bytes searched for the `%PDF-` signature
    pub signature_scan_window: usize,
    /// Longest `/Parent` chain accepted for a page
    pub max_parent_depth: usize,
    /// Deepest form XObject nesting that is executed
    pub max_form_depth: usize,
    /// Horizontal gap, as a fraction of the font size, that becomes a space
    pub space_threshold: f64,
    /// Vertical move, as a fraction of the font size, that becomes a newline
    pub newline_threshold: f64,
    /// Interpret pages on worker threads
    pub parallel: bool,
    /// Worker count for parallel extraction (defaults to the CPU count)
    pub threads: Option<usize>,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            page_marker: "=== Page {page} ===".to_string(),
            signature_scan_window: DEFAULT_SIGNATURE_WINDOW,
            max_parent_depth: DEFAULT_MAX_PARENT_DEPTH,
            max_form_depth: 16,
            space_threshold: 0.2,
            newline_threshold: 0.5,
            parallel: false,
            threads: None,
        }
    }
}

impl ExtractionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_marker(mut self, marker: impl Into<String>) -> Self {
        self.page_marker = marker.into();
        self
    }

    pub fn with_signature_scan_window(mut self, window: usize) -> Self {
        self.signature_scan_window = window;
        self
    }

    pub fn with_max_parent_depth(mut self, depth: usize) -> Self {
        self.max_parent_depth = depth;
        self
    }

    pub fn with_max_form_depth(mut self, depth: usize) -> Self {
        self.max_form_depth = depth;
        self
    }

    pub fn with_space_threshold(mut self, threshold: f64) -> Self {
        self.space_threshold = threshold;
        self
    }

    pub fn with_newline_threshold(mut self, threshold: f64) -> Self {
        self.newline_threshold = threshold;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Worker threads to use, at least one
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Marker line for a 0-based page index
    pub fn marker_for(&self, index: usize) -> String {
        self.page_marker.replace("{page}", &(index + 1).to_string())
    }
}

/// A character and its origin in unrotated page space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionedChar {
    pub ch: char,
    pub x: f64,
    pub y: f64,
}

/// Text recovered from one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    /// Glyph characters in encounter order (inserted separators excluded)
    pub chars: Vec<PositionedChar>,
}

/// Text state parameters (ISO 32000-1 9.3)
#[derive(Debug, Clone)]
struct TextState {
    font: Option<Arc<FontInfo>>,
    font_size: f64,
    char_space: f64,
    word_space: f64,
    /// `Tz / 100`
    horizontal_scale: f64,
    leading: f64,
    rise: f64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            font_size: 0.0,
            char_space: 0.0,
            word_space: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: [f64; 6],
    text: TextState,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            text: TextState::default(),
        }
    }
}

/// Text extractor for PDF pages
#[derive(Debug, Clone, Default)]
pub struct TextExtractor {
    options: ExtractionOptions,
}

impl TextExtractor {
    /// Create a new text extractor with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a text extractor with custom options
    pub fn with_options(options: ExtractionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExtractionOptions {
        &self.options
    }

    /// Interpret one page's operations
    pub fn extract_page(&self, job: &PageJob) -> ExtractedText {
        let mut interpreter = Interpreter::new(&self.options);
        interpreter.run(&job.operations, &job.resources);
        interpreter.assembler.finish()
    }
}

struct Interpreter {
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    /// Stack height at entry to the stream being run
    floor: usize,
    in_text: bool,
    text_matrix: [f64; 6],
    line_matrix: [f64; 6],
    fallback: Arc<FontInfo>,
    assembler: TextAssembler,
}

impl Interpreter {
    fn new(options: &ExtractionOptions) -> Self {
        Self {
            state: GraphicsState::default(),
            stack: Vec::new(),
            floor: 0,
            in_text: false,
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            fallback: Arc::new(FontInfo::fallback()),
            assembler: TextAssembler::new(options.space_threshold, options.newline_threshold),
        }
    }

    fn run(&mut self, operations: &[ContentOperation], resources: &ResourceSet) {
        let outer_floor = self.floor;
        self.floor = self.stack.len();
        for op in operations {
            self.apply(op, resources);
        }
        // Unbalanced q inside a stream must not leak out of it
        while self.stack.len() > self.floor {
            if let Some(state) = self.stack.pop() {
                self.state = state;
            }
        }
        self.floor = outer_floor;
    }

    fn apply(&mut self, op: &ContentOperation, resources: &ResourceSet) {
        match op {
            ContentOperation::SaveGraphicsState => self.stack.push(self.state.clone()),
            ContentOperation::RestoreGraphicsState => {
                if self.stack.len() > self.floor {
                    if let Some(state) = self.stack.pop() {
                        self.state = state;
                    }
                }
            }
            ContentOperation::SetTransformMatrix(a, b, c, d, e, f) => {
                self.state.ctm = multiply(&[*a, *b, *c, *d, *e, *f], &self.state.ctm);
            }
            ContentOperation::PaintXObject(name) => self.paint_form(name, resources),

            ContentOperation::BeginText => {
                self.in_text = true;
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            ContentOperation::EndText => self.in_text = false,

            ContentOperation::SetCharSpacing(v) => self.state.text.char_space = *v,
            ContentOperation::SetWordSpacing(v) => self.state.text.word_space = *v,
            ContentOperation::SetHorizontalScaling(v) => self.state.text.horizontal_scale = *v / 100.0,
            ContentOperation::SetLeading(v) => self.state.text.leading = *v,
            ContentOperation::SetTextRise(v) => self.state.text.rise = *v,
            ContentOperation::SetTextRenderMode(_) => {}
            ContentOperation::SetFont(name, size) => {
                let font = match resources.font(name) {
                    Some(font) => Arc::clone(font),
                    None => {
                        tracing::warn!("font /{} not found in resources, using fallback", name);
                        Arc::clone(&self.fallback)
                    }
                };
                self.state.text.font = Some(font);
                self.state.text.font_size = *size;
            }

            ContentOperation::SetTextMatrix(a, b, c, d, e, f) if self.in_text => {
                self.text_matrix = [*a, *b, *c, *d, *e, *f];
                self.line_matrix = self.text_matrix;
            }
            ContentOperation::MoveText(tx, ty) if self.in_text => self.move_line(*tx, *ty),
            ContentOperation::MoveTextSetLeading(tx, ty) if self.in_text => {
                self.state.text.leading = -*ty;
                self.move_line(*tx, *ty);
            }
            ContentOperation::NextLine if self.in_text => self.next_line(),
            ContentOperation::ShowText(bytes) if self.in_text => self.show(bytes),
            ContentOperation::ShowTextArray(elements) if self.in_text => {
                for element in elements {
                    match element {
                        TextElement::Text(bytes) => self.show(bytes),
                        TextElement::Spacing(adjustment) => {
                            let text = &self.state.text;
                            let tx = -adjustment / 1000.0 * text.font_size * text.horizontal_scale;
                            self.advance(tx);
                        }
                    }
                }
            }
            ContentOperation::NextLineShowText(bytes) if self.in_text => {
                self.next_line();
                self.show(bytes);
            }
            ContentOperation::SetSpacingNextLineShowText(word_space, char_space, bytes)
                if self.in_text =>
            {
                self.state.text.word_space = *word_space;
                self.state.text.char_space = *char_space;
                self.next_line();
                self.show(bytes);
            }

            ContentOperation::Unknown(name) => {
                tracing::trace!("{}", PdfError::UnsupportedOperator(name.clone()));
            }
            ContentOperation::BadOperands(name) => {
                tracing::trace!("ignoring {} with malformed operands", name);
            }
            // Positioning outside BT/ET, inline images and non-text operators
            _ => {}
        }
    }

    fn paint_form(&mut self, name: &str, resources: &ResourceSet) {
        let Some(form) = resources.form(name) else {
            return;
        };
        let saved = (self.in_text, self.text_matrix, self.line_matrix);
        self.stack.push(self.state.clone());
        self.state.ctm = multiply(&form.matrix, &self.state.ctm);
        self.in_text = false;

        self.run(&form.operations, &form.resources);

        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
        (self.in_text, self.text_matrix, self.line_matrix) = saved;
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = multiply(&[1.0, 0.0, 0.0, 1.0, tx, ty], &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = self.state.text.leading;
        self.move_line(0.0, -leading);
    }

    fn advance(&mut self, tx: f64) {
        self.text_matrix = multiply(&[1.0, 0.0, 0.0, 1.0, tx, 0.0], &self.text_matrix);
    }

    /// Text rendering matrix origin and effective font size in page space
    fn rendering_origin(&self) -> (f64, f64, f64) {
        let text = &self.state.text;
        let params = [
            text.font_size * text.horizontal_scale,
            0.0,
            0.0,
            text.font_size,
            0.0,
            text.rise,
        ];
        let trm = multiply(&multiply(&params, &self.text_matrix), &self.state.ctm);
        let size = trm[2].hypot(trm[3]);
        (trm[4], trm[5], size)
    }

    fn show(&mut self, bytes: &[u8]) {
        let font = self
            .state
            .text
            .font
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.fallback));

        for glyph in font.decode(bytes) {
            let (x, y, size) = self.rendering_origin();

            let text = &self.state.text;
            let mut tx = glyph.width / 1000.0 * text.font_size + text.char_space;
            if glyph.is_word_space {
                tx += text.word_space;
            }
            tx *= text.horizontal_scale;
            self.advance(tx);

            let (end_x, end_y, _) = self.rendering_origin();
            self.assembler
                .push(&glyph.text, (x, y), (end_x, end_y), size);
        }
    }
}

/// Joins glyphs into text, inserting separators from their geometry
struct TextAssembler {
    space_threshold: f64,
    newline_threshold: f64,
    text: String,
    chars: Vec<PositionedChar>,
    /// Where the previous glyph left the pen
    pen: Option<(f64, f64)>,
}

impl TextAssembler {
    fn new(space_threshold: f64, newline_threshold: f64) -> Self {
        Self {
            space_threshold,
            newline_threshold,
            text: String::new(),
            chars: Vec::new(),
            pen: None,
        }
    }

    fn push(&mut self, glyph: &str, origin: (f64, f64), end: (f64, f64), size: f64) {
        if glyph.is_empty() {
            return;
        }
        let size = if size > 0.0 { size } else { 1.0 };

        if let Some((pen_x, pen_y)) = self.pen {
            let dy = (origin.1 - pen_y).abs();
            let gap = origin.0 - pen_x;
            let starts_blank = glyph.starts_with(char::is_whitespace);
            let ends_blank = self.text.ends_with(char::is_whitespace);

            if dy > self.newline_threshold * size {
                if !self.text.ends_with('\n') {
                    trim_trailing_blanks(&mut self.text);
                    self.text.push('\n');
                }
            } else if gap > self.space_threshold * size && !starts_blank && !ends_blank {
                self.text.push(' ');
            }
        }

        self.text.push_str(glyph);
        self.chars.extend(glyph.chars().map(|ch| PositionedChar {
            ch,
            x: origin.0,
            y: origin.1,
        }));
        self.pen = Some(end);
    }

    fn finish(self) -> ExtractedText {
        ExtractedText {
            text: self.text,
            chars: self.chars,
        }
    }
}

fn trim_trailing_blanks(text: &mut String) {
    let trimmed = text.trim_end_matches(&[' ', '\t'][..]).len();
    text.truncate(trimmed);
}

/// `a × b` for matrices in `[a b c d e f]` form
fn multiply(a: &[f64; 6], b: &[f64; 6]) -> [f64; 6] {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}
