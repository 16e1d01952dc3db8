//! PDF Header Parser
//!
//! Locates the `%PDF-x.y` signature according to ISO 32000-1 Section 7.5.2

use super::lexer::find_bytes;
use crate::error::{PdfError, Result};

/// PDF Version information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    /// Create a new PDF version
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Check if this version is supported
    pub fn is_supported(&self) -> bool {
        matches!((self.major, self.minor), (1, 0..=7) | (2, 0))
    }
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// PDF Header information
#[derive(Debug, Clone, PartialEq)]
pub struct PdfHeader {
    /// Byte offset of `%PDF-` within the input
    pub offset: usize,
    /// `None` when the digits after `%PDF-` are unreadable
    pub version: Option<PdfVersion>,
}

impl PdfHeader {
    /// Find the signature within the first `window` bytes.
    pub fn find(data: &[u8], window: usize) -> Result<Self> {
        let limit = window.min(data.len());
        let offset = find_bytes(&data[..limit], b"%PDF-", 0)
            // The signature may straddle the window boundary
            .or_else(|| {
                find_bytes(&data[..(limit + 4).min(data.len())], b"%PDF-", 0)
                    .filter(|&pos| pos < limit)
            })
            .ok_or(PdfError::InvalidSignature)?;

        if offset > 0 {
            tracing::warn!("%PDF- signature found at byte {} instead of 0", offset);
        }

        Ok(Self {
            offset,
            version: parse_version(&data[offset + 5..]),
        })
    }
}

fn parse_version(bytes: &[u8]) -> Option<PdfVersion> {
    let digit = |i: usize| {
        bytes
            .get(i)
            .filter(|b| b.is_ascii_digit())
            .map(|b| b - b'0')
    };
    let major = digit(0)?;
    if bytes.get(1) != Some(&b'.') {
        return None;
    }
    Some(PdfVersion::new(major, digit(2)?))
}
