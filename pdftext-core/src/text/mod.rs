//! Text recovery: fonts, encodings, CMaps and the content-stream interpreter

pub mod cmap;
pub mod encoding;
pub mod extraction;
pub mod font;
pub mod glyph_list;
pub mod resources;

pub use cmap::CMap;
pub use encoding::TextEncoding;
pub use extraction::{ExtractedText, ExtractionOptions, PositionedChar, TextExtractor};
pub use font::{FontInfo, Glyph};
pub use glyph_list::glyph_name_to_unicode;
pub use resources::{FormXObject, PageJob, ResourceLoader, ResourceSet};
