//! PDF Content Stream Parser
//!
//! This module implements parsing of PDF content streams according to the PDF specification.
//! Content streams contain the instructions that place text, graphics and images on a page.
//! Only operators that affect text recovery are decoded into dedicated variants; every other
//! operator is reported by name so the interpreter can skip it.

use super::lexer::Token;
use super::objects::{Parser, PdfObject};

/// Represents a single operator in a PDF content stream
#[derive(Debug, Clone, PartialEq)]
pub enum ContentOperation {
    // Text object operators
    BeginText, // BT
    EndText,   // ET

    // Text state operators
    SetCharSpacing(f64),       // Tc
    SetWordSpacing(f64),       // Tw
    SetHorizontalScaling(f64), // Tz
    SetLeading(f64),           // TL
    SetFont(String, f64),      // Tf
    SetTextRenderMode(i64),    // Tr
    SetTextRise(f64),          // Ts

    // Text positioning operators
    MoveText(f64, f64),                          // Td
    MoveTextSetLeading(f64, f64),                // TD
    SetTextMatrix(f64, f64, f64, f64, f64, f64), // Tm
    NextLine,                                    // T*

    // Text showing operators
    ShowText(Vec<u8>),                             // Tj
    ShowTextArray(Vec<TextElement>),               // TJ
    NextLineShowText(Vec<u8>),                     // '
    SetSpacingNextLineShowText(f64, f64, Vec<u8>), // "

    // Graphics state operators
    SaveGraphicsState,                                // q
    RestoreGraphicsState,                             // Q
    SetTransformMatrix(f64, f64, f64, f64, f64, f64), // cm

    // XObject operators
    PaintXObject(String), // Do

    /// `BI ... ID <data> EI`, skipped as one opaque span
    InlineImage,

    /// A standard operator with no effect on text (paths, colors, marked content)
    Other(String),

    /// A known operator whose operands did not have the expected types
    BadOperands(String),

    /// An operator outside the PDF operator set
    Unknown(String),
}

/// Represents a text element in a TJ array
#[derive(Debug, Clone, PartialEq)]
pub enum TextElement {
    Text(Vec<u8>),
    Spacing(f64),
}

/// Operators that are valid but irrelevant to text
const NON_TEXT_OPERATORS: &[&str] = &[
    "w", "J", "j", "M", "d", "ri", "i", "gs", "m", "l", "c", "v", "y", "h", "re", "S", "s", "f",
    "F", "f*", "B", "B*", "b", "b*", "n", "W", "W*", "CS", "cs", "SC", "SCN", "sc", "scn", "G",
    "g", "RG", "rg", "K", "k", "sh", "BMC", "BDC", "EMC", "MP", "DP", "BX", "EX", "d0", "d1",
    "ID", "EI",
];

/// Streaming content stream parser
///
/// Yields operations in stream order. Syntax errors never end the stream:
/// the offending bytes are skipped together with any pending operands.
pub struct ContentParser<'a> {
    parser: Parser<'a, 'static>,
    operands: Vec<PdfObject>,
}

impl<'a> ContentParser<'a> {
    /// Create a new content parser
    pub fn new(content: &'a [u8]) -> Self {
        Self {
            parser: Parser::new(content),
            operands: Vec::new(),
        }
    }

    /// Parse a whole content stream into a vector of operators
    pub fn parse_content(content: &[u8]) -> Vec<ContentOperation> {
        ContentParser::new(content).collect()
    }

    fn next_operation(&mut self) -> Option<ContentOperation> {
        loop {
            let before = self.parser.position();
            let token = match self.parser.lexer_mut().next_token() {
                Ok(token) => token,
                Err(e) => {
                    tracing::trace!("skipping content bytes: {}", e);
                    self.operands.clear();
                    self.ensure_progress(before);
                    continue;
                }
            };

            match token {
                Token::Eof => return None,
                Token::Keyword(op) if op == "BI" => {
                    self.operands.clear();
                    self.skip_inline_image();
                    return Some(ContentOperation::InlineImage);
                }
                Token::Keyword(op) => {
                    let operands = std::mem::take(&mut self.operands);
                    return Some(build_operation(op, operands));
                }
                token => match self.parser.parse_operand(token) {
                    Ok(operand) => self.operands.push(operand),
                    Err(e) => {
                        tracing::trace!("skipping malformed operand: {}", e);
                        self.operands.clear();
                        self.ensure_progress(before);
                    }
                },
            }
        }
    }

    /// Skip the inline image dictionary up to `ID`, then the binary data through `EI`.
    fn skip_inline_image(&mut self) {
        loop {
            let before = self.parser.position();
            match self.parser.lexer_mut().next_token() {
                Ok(Token::Keyword(k)) if k == "ID" => break,
                Ok(Token::Eof) => return,
                Ok(_) => {}
                Err(_) => self.ensure_progress(before),
            }
        }
        self.parser.lexer_mut().skip_inline_image_data();
    }

    fn ensure_progress(&mut self, before: usize) {
        if self.parser.position() <= before {
            self.parser.lexer_mut().set_position(before + 1);
        }
    }
}

impl Iterator for ContentParser<'_> {
    type Item = ContentOperation;

    fn next(&mut self) -> Option<ContentOperation> {
        self.next_operation()
    }
}

/// Operand stack, popped from the end like the PDF operand stack.
struct Operands(Vec<PdfObject>);

impl Operands {
    fn number(&mut self) -> Option<f64> {
        self.0.pop().and_then(|o| o.as_real())
    }

    fn integer(&mut self) -> Option<i64> {
        self.0.pop().and_then(|o| o.as_integer())
    }

    fn name(&mut self) -> Option<String> {
        self.0.pop().and_then(|o| o.as_name().map(str::to_string))
    }

    fn string(&mut self) -> Option<Vec<u8>> {
        match self.0.pop() {
            Some(PdfObject::String(s)) => Some(s.0),
            _ => None,
        }
    }

    fn matrix(&mut self) -> Option<[f64; 6]> {
        let mut m = [0.0; 6];
        for slot in m.iter_mut().rev() {
            *slot = self.number()?;
        }
        Some(m)
    }

    fn text_array(&mut self) -> Option<Vec<TextElement>> {
        match self.0.pop() {
            Some(PdfObject::Array(array)) => Some(
                array
                    .0
                    .into_iter()
                    .filter_map(|element| match element {
                        PdfObject::String(s) => Some(TextElement::Text(s.0)),
                        other => other.as_real().map(TextElement::Spacing),
                    })
                    .collect(),
            ),
            _ => None,
        }
    }
}

fn build_operation(op: String, operands: Vec<PdfObject>) -> ContentOperation {
    let mut ops = Operands(operands);
    let parsed = match op.as_str() {
        "BT" => Some(ContentOperation::BeginText),
        "ET" => Some(ContentOperation::EndText),

        "Tc" => ops.number().map(ContentOperation::SetCharSpacing),
        "Tw" => ops.number().map(ContentOperation::SetWordSpacing),
        "Tz" => ops.number().map(ContentOperation::SetHorizontalScaling),
        "TL" => ops.number().map(ContentOperation::SetLeading),
        "Tf" => ops
            .number()
            .and_then(|size| ops.name().map(|font| ContentOperation::SetFont(font, size))),
        "Tr" => ops.integer().map(ContentOperation::SetTextRenderMode),
        "Ts" => ops.number().map(ContentOperation::SetTextRise),

        "Td" => ops
            .number()
            .and_then(|ty| ops.number().map(|tx| ContentOperation::MoveText(tx, ty))),
        "TD" => ops
            .number()
            .and_then(|ty| ops.number().map(|tx| ContentOperation::MoveTextSetLeading(tx, ty))),
        "Tm" => ops
            .matrix()
            .map(|[a, b, c, d, e, f]| ContentOperation::SetTextMatrix(a, b, c, d, e, f)),
        "T*" => Some(ContentOperation::NextLine),

        "Tj" => ops.string().map(ContentOperation::ShowText),
        "TJ" => ops.text_array().map(ContentOperation::ShowTextArray),
        "'" => ops.string().map(ContentOperation::NextLineShowText),
        "\"" => ops.string().and_then(|text| {
            let ac = ops.number()?;
            let aw = ops.number()?;
            Some(ContentOperation::SetSpacingNextLineShowText(aw, ac, text))
        }),

        "q" => Some(ContentOperation::SaveGraphicsState),
        "Q" => Some(ContentOperation::RestoreGraphicsState),
        "cm" => ops
            .matrix()
            .map(|[a, b, c, d, e, f]| ContentOperation::SetTransformMatrix(a, b, c, d, e, f)),

        "Do" => ops.name().map(ContentOperation::PaintXObject),

        other if NON_TEXT_OPERATORS.contains(&other) => Some(ContentOperation::Other(op.clone())),
        _ => return ContentOperation::Unknown(op.clone()),
    };

    parsed.unwrap_or(ContentOperation::BadOperands(op))
}
