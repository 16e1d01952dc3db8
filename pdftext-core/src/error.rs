use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PdfError {
    #[error("Malformed syntax at byte {position}: {message}")]
    MalformedSyntax { position: usize, message: String },

    #[error("Malformed structure: {0}")]
    MalformedStructure(String),

    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid signature: no %PDF- header found")]
    InvalidSignature,
}

impl PdfError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        PdfError::MalformedSyntax {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn structure(message: impl Into<String>) -> Self {
        PdfError::MalformedStructure(message.into())
    }
}

pub type Result<T> = std::result::Result<T, PdfError>;
