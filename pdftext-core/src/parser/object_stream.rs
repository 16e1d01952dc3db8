//! PDF Object Stream Parser
//!
//! Handles compressed objects stored in object streams (PDF 1.5+)

use super::lexer::{Lexer, Token};
use super::objects::{PdfObject, PdfStream, Parser};
use crate::error::{PdfError, Result};
use std::collections::HashMap;

/// Parsed contents of a `/Type /ObjStm` stream
#[derive(Debug, Default)]
pub struct ObjectStream {
    /// Object numbers in header order
    numbers: Vec<u32>,
    /// Parsed objects by object number
    objects: HashMap<u32, PdfObject>,
}

impl ObjectStream {
    /// Parse an object stream
    ///
    /// Objects that fail to parse are left out; the rest stay reachable.
    pub fn parse(stream: &PdfStream) -> Result<Self> {
        let dict = &stream.dict;
        if let Some(filter) = &stream.unsupported_filter {
            return Err(PdfError::UnsupportedFilter(filter.clone()));
        }

        let n = dict
            .get("N")
            .and_then(|obj| obj.as_integer())
            .filter(|n| *n >= 0)
            .ok_or_else(|| PdfError::structure("object stream without /N"))?;
        let first = dict
            .get("First")
            .and_then(|obj| obj.as_integer())
            .and_then(|f| usize::try_from(f).ok())
            .ok_or_else(|| PdfError::structure("object stream without /First"))?;

        let data = &stream.data;
        let mut lexer = Lexer::new(data);
        let mut header = Vec::new();
        for _ in 0..n {
            match (lexer.next_token()?, lexer.next_token()?) {
                (Token::Integer(num), Token::Integer(offset)) => {
                    match (u32::try_from(num), usize::try_from(offset)) {
                        (Ok(num), Ok(offset)) => header.push((num, offset)),
                        _ => break,
                    }
                }
                _ => break,
            }
        }

        let mut obj_stream = ObjectStream::default();
        for (num, offset) in header {
            obj_stream.numbers.push(num);
            let position = first.saturating_add(offset);
            if position >= data.len() {
                continue;
            }
            match Parser::at(data, position).parse_object() {
                Ok(object) => {
                    obj_stream.objects.insert(num, object);
                }
                Err(e) => tracing::debug!("object {} in object stream unreadable: {}", num, e),
            }
        }
        Ok(obj_stream)
    }

    /// Fetch object `obj_num`, stored at `index` according to the xref.
    pub fn get(&self, obj_num: u32, index: u32) -> Option<&PdfObject> {
        // The index is a hint; the header's object number is authoritative
        match self.numbers.get(index as usize) {
            Some(&num) if num == obj_num => self.objects.get(&num),
            _ => self.objects.get(&obj_num),
        }
    }

    /// Object numbers in header order
    pub fn numbers(&self) -> &[u32] {
        &self.numbers
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }
}
