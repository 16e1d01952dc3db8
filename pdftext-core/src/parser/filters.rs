//! PDF Stream Filters
//!
//! Handles decompression and decoding of PDF streams according to ISO 32000-1 Section 7.4

use super::lexer::{hex_value, is_whitespace};
use super::objects::{PdfDictionary, PdfObject};

#[cfg(feature = "compression")]
use flate2::read::{DeflateDecoder, ZlibDecoder};
#[cfg(feature = "compression")]
use std::io::Read;

/// Supported PDF filters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter {
    /// ASCII hex decode
    ASCIIHexDecode,

    /// ASCII 85 decode
    ASCII85Decode,

    /// Flate decode (zlib/deflate compression)
    FlateDecode,

    /// Run length decode
    RunLengthDecode,
}

impl Filter {
    /// Parse filter from name, including the inline-image abbreviations
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ASCIIHexDecode" | "AHx" => Some(Filter::ASCIIHexDecode),
            "ASCII85Decode" | "A85" => Some(Filter::ASCII85Decode),
            "FlateDecode" | "Fl" => Some(Filter::FlateDecode),
            "RunLengthDecode" | "RL" => Some(Filter::RunLengthDecode),
            _ => None,
        }
    }
}

/// Result of running a stream's filter chain
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub data: Vec<u8>,
    /// First filter that was unknown or failed; decoding stopped there
    pub unsupported: Option<String>,
}

/// Decode stream data according to the `/Filter` chain in `dict`.
///
/// Never fails: an unknown or broken filter leaves the payload as produced
/// by the filters before it and is reported in [`Decoded::unsupported`].
pub fn decode_stream(data: &[u8], dict: &PdfDictionary) -> Decoded {
    let filters: Vec<&str> = match dict.get("Filter") {
        Some(PdfObject::Name(name)) => vec![name.as_str()],
        Some(PdfObject::Array(array)) => array.iter().filter_map(|f| f.as_name()).collect(),
        _ => Vec::new(),
    };
    let params: Vec<Option<&PdfDictionary>> = match dict.get("DecodeParms") {
        Some(PdfObject::Dictionary(d)) => vec![Some(d)],
        Some(PdfObject::Array(array)) => array.iter().map(|p| p.as_dict()).collect(),
        _ => Vec::new(),
    };

    let mut result = data.to_vec();
    for (i, name) in filters.iter().enumerate() {
        let decoded = match Filter::from_name(name) {
            Some(filter) => apply_filter(&result, filter, params.get(i).copied().flatten()),
            None => None,
        };
        match decoded {
            Some(bytes) => result = bytes,
            None => {
                tracing::warn!("stream filter {} not applied, keeping payload as is", name);
                return Decoded {
                    data: result,
                    unsupported: Some((*name).to_string()),
                };
            }
        }
    }

    Decoded {
        data: result,
        unsupported: None,
    }
}

/// Apply a single filter to data
fn apply_filter(data: &[u8], filter: Filter, params: Option<&PdfDictionary>) -> Option<Vec<u8>> {
    match filter {
        Filter::FlateDecode => {
            let inflated = decode_flate(data)?;
            apply_predictor(inflated, params)
        }
        Filter::ASCIIHexDecode => decode_ascii_hex(data),
        Filter::ASCII85Decode => decode_ascii85(data),
        Filter::RunLengthDecode => Some(decode_run_length(data)),
    }
}

/// Decode FlateDecode (zlib/deflate) compressed data
///
/// Truncated streams keep whatever inflated before the error.
#[cfg(feature = "compression")]
fn decode_flate(data: &[u8]) -> Option<Vec<u8>> {
    let mut result = Vec::new();
    match ZlibDecoder::new(data).read_to_end(&mut result) {
        Ok(_) => return Some(result),
        Err(e) if !result.is_empty() => {
            tracing::debug!("flate stream ended early ({}), keeping {} bytes", e, result.len());
            return Some(result);
        }
        Err(_) => {}
    }

    // Some producers omit the zlib header
    let mut raw = Vec::new();
    match DeflateDecoder::new(data).read_to_end(&mut raw) {
        Ok(_) => Some(raw),
        Err(_) if !raw.is_empty() => Some(raw),
        Err(_) => None,
    }
}

#[cfg(not(feature = "compression"))]
fn decode_flate(_data: &[u8]) -> Option<Vec<u8>> {
    None
}

/// Undo PNG (10..=15) and TIFF (2) predictors.
fn apply_predictor(data: Vec<u8>, params: Option<&PdfDictionary>) -> Option<Vec<u8>> {
    let Some(params) = params else {
        return Some(data);
    };
    let int = |key: &str, default: i64| {
        params
            .get(key)
            .and_then(|o| o.as_integer())
            .unwrap_or(default)
    };
    let predictor = int("Predictor", 1);
    if predictor < 2 || data.is_empty() {
        return Some(data);
    }

    let colors = int("Colors", 1).clamp(1, 32) as usize;
    let bits = int("BitsPerComponent", 8).clamp(1, 16) as usize;
    let columns = usize::try_from(int("Columns", 1).max(1)).ok()?;
    let bpp = (colors * bits).div_ceil(8).max(1);
    // No row can be longer than the data
    let row_len = (colors * bits).checked_mul(columns)?.div_ceil(8);
    if row_len > data.len() {
        tracing::debug!("predictor row of {} bytes exceeds {} bytes of data", row_len, data.len());
        return None;
    }

    if predictor == 2 {
        if bits != 8 {
            return None;
        }
        let mut out = data;
        for row in out.chunks_mut(row_len) {
            for i in bpp..row.len() {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        return Some(out);
    }

    let mut out = Vec::with_capacity(data.len());
    let mut prev = vec![0u8; row_len];
    for chunk in data.chunks(row_len + 1) {
        let kind = chunk[0];
        let mut row = chunk[1..].to_vec();
        row.resize(row_len, 0);
        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            row[i] = match kind {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                _ => return None,
            };
        }
        out.extend_from_slice(&row);
        prev = row;
    }
    Some(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Decode ASCIIHexDecode data
fn decode_ascii_hex(data: &[u8]) -> Option<Vec<u8>> {
    let mut result = Vec::new();
    let mut pending: Option<u8> = None;

    for &ch in data {
        if ch == b'>' {
            break;
        }
        if is_whitespace(ch) {
            continue;
        }
        let value = hex_value(ch)?;
        match pending.take() {
            Some(hi) => result.push((hi << 4) | value),
            None => pending = Some(value),
        }
    }
    if let Some(hi) = pending {
        result.push(hi << 4);
    }
    Some(result)
}

/// Decode ASCII85Decode data
fn decode_ascii85(data: &[u8]) -> Option<Vec<u8>> {
    let body = data.strip_prefix(b"<~").unwrap_or(data);
    let mut result = Vec::new();
    let mut group = [0u8; 5];
    let mut count = 0;

    for &ch in body {
        match ch {
            b'~' => break,
            b'z' if count == 0 => result.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[count] = ch - b'!';
                count += 1;
                if count == 5 {
                    result.extend_from_slice(&ascii85_group(&group)?);
                    count = 0;
                }
            }
            _ if is_whitespace(ch) => {}
            _ => return None,
        }
    }

    if count == 1 {
        return None;
    }
    if count > 1 {
        // Pad the final partial group with 'u'
        for slot in group.iter_mut().skip(count) {
            *slot = b'u' - b'!';
        }
        let bytes = ascii85_group(&group)?;
        result.extend_from_slice(&bytes[..count - 1]);
    }
    Some(result)
}

fn ascii85_group(group: &[u8; 5]) -> Option<[u8; 4]> {
    let value = group
        .iter()
        .try_fold(0u64, |acc, &digit| Some(acc * 85 + u64::from(digit)))?;
    let value = u32::try_from(value).ok()?;
    Some(value.to_be_bytes())
}

/// Decode RunLengthDecode data
fn decode_run_length(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            0..=127 => {
                let end = (i + length as usize + 1).min(data.len());
                result.extend_from_slice(&data[i..end]);
                i = end;
            }
            128 => break,
            _ => {
                if let Some(&byte) = data.get(i) {
                    result.extend(std::iter::repeat(byte).take(257 - length as usize));
                }
                i += 1;
            }
        }
    }
    result
}
