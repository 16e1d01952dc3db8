//! Shared PDF builder for integration tests
//!
//! Writes objects in order, records their byte offsets and emits a classic
//! xref table, a cross-reference stream, or no xref at all.

#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XrefKind {
    Classic,
    Stream,
    /// Leave the xref out and let the reader scan
    Missing,
}

enum Entry {
    Body(Vec<u8>),
    /// Object stored inside object stream `stream`
    Compressed { stream: u32, body: String },
}

pub struct PdfBuilder {
    version: String,
    prefix: Vec<u8>,
    objects: BTreeMap<u32, Entry>,
    object_streams: Vec<u32>,
    xref: XrefKind,
    root: u32,
    /// `/N` and `/First` written into every object stream instead of the real values
    object_stream_header: Option<(i64, i64)>,
    /// `/Index` for the cross-reference stream
    xref_index: Option<Vec<i64>>,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.4".to_string(),
            prefix: Vec::new(),
            objects: BTreeMap::new(),
            object_streams: Vec::new(),
            xref: XrefKind::Classic,
            root: 1,
            object_stream_header: None,
            xref_index: None,
        }
    }

    pub fn version(&mut self, version: &str) -> &mut Self {
        self.version = version.to_string();
        self
    }

    /// Bytes placed before the `%PDF-` signature
    pub fn prefix(&mut self, junk: &[u8]) -> &mut Self {
        self.prefix = junk.to_vec();
        self
    }

    pub fn xref(&mut self, kind: XrefKind) -> &mut Self {
        self.xref = kind;
        self
    }

    pub fn root(&mut self, root: u32) -> &mut Self {
        self.root = root;
        self
    }

    pub fn object_stream_header(&mut self, n: i64, first: i64) -> &mut Self {
        self.object_stream_header = Some((n, first));
        self
    }

    pub fn xref_index(&mut self, index: &[i64]) -> &mut Self {
        self.xref_index = Some(index.to_vec());
        self
    }

    /// Add `num 0 obj <body> endobj`
    pub fn object(&mut self, num: u32, body: &str) -> &mut Self {
        self.objects.insert(num, Entry::Body(body.as_bytes().to_vec()));
        self
    }

    /// Add a stream object; `dict` holds extra dictionary entries
    pub fn stream(&mut self, num: u32, dict: &str, data: &[u8], compress: bool) -> &mut Self {
        let (data, filter) = if compress {
            (deflate(data), " /Filter /FlateDecode")
        } else {
            (data.to_vec(), "")
        };
        let mut body = format!("<< {}{} /Length {} >>\nstream\n", dict, filter, data.len()).into_bytes();
        body.extend_from_slice(&data);
        body.extend_from_slice(b"\nendstream");
        self.objects.insert(num, Entry::Body(body));
        self
    }

    /// Store `num` inside object stream `stream` (requires a stream xref)
    pub fn compressed(&mut self, num: u32, stream: u32, body: &str) -> &mut Self {
        if !self.object_streams.contains(&stream) {
            self.object_streams.push(stream);
        }
        self.objects.insert(
            num,
            Entry::Compressed {
                stream,
                body: body.to_string(),
            },
        );
        self
    }

    /// A complete document: catalog, page tree, Helvetica as /F1 and one
    /// page per content stream.
    pub fn with_pages(contents: &[&str]) -> Self {
        let mut builder = Self::new();
        let kids: Vec<String> = (0..contents.len())
            .map(|i| format!("{} 0 R", 4 + 2 * i))
            .collect();
        builder.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
        builder.object(
            2,
            &format!(
                "<< /Type /Pages /Kids [{}] /Count {} /Resources << /Font << /F1 3 0 R >> >> >>",
                kids.join(" "),
                contents.len()
            ),
        );
        builder.object(3, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>");
        for (i, content) in contents.iter().enumerate() {
            let page = 4 + 2 * i as u32;
            builder.object(
                page,
                &format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R >>",
                    page + 1
                ),
            );
            builder.stream(page + 1, "", content.as_bytes(), false);
        }
        builder
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = format!("%PDF-{}\n%\u{e2}\u{e3}\n", self.version).into_bytes();
        let mut offsets: BTreeMap<u32, (u8, u64, u64)> = BTreeMap::new();

        for (num, entry) in &self.objects {
            if let Entry::Body(body) = entry {
                offsets.insert(*num, (1, out.len() as u64, 0));
                out.extend_from_slice(format!("{} 0 obj\n", num).as_bytes());
                out.extend_from_slice(body);
                out.extend_from_slice(b"\nendobj\n");
            }
        }

        for &stream in &self.object_streams {
            let members: Vec<(u32, &String)> = self
                .objects
                .iter()
                .filter_map(|(num, entry)| match entry {
                    Entry::Compressed { stream: s, body } if *s == stream => Some((*num, body)),
                    _ => None,
                })
                .collect();
            let mut header = String::new();
            let mut bodies = String::new();
            for (index, (num, body)) in members.iter().enumerate() {
                header.push_str(&format!("{} {} ", num, bodies.len()));
                bodies.push_str(body);
                bodies.push('\n');
                offsets.insert(*num, (2, stream as u64, index as u64));
            }
            let payload = format!("{}{}", header, bodies);
            let (n, first) = self
                .object_stream_header
                .unwrap_or((members.len() as i64, header.len() as i64));
            offsets.insert(stream, (1, out.len() as u64, 0));
            out.extend_from_slice(
                format!(
                    "{} 0 obj\n<< /Type /ObjStm /N {} /First {} /Length {} >>\nstream\n{}\nendstream\nendobj\n",
                    stream,
                    n,
                    first,
                    payload.len(),
                    payload
                )
                .as_bytes(),
            );
        }

        let size = offsets.keys().max().map_or(1, |max| max + 1);
        let xref_offset = out.len();
        match self.xref {
            XrefKind::Classic => {
                out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
                out.extend_from_slice(b"0000000000 65535 f \n");
                for num in 1..size {
                    match offsets.get(&num) {
                        Some((1, offset, _)) => {
                            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes())
                        }
                        _ => out.extend_from_slice(b"0000000000 00000 f \n"),
                    }
                }
                out.extend_from_slice(
                    format!(
                        "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF\n",
                        size, self.root, xref_offset
                    )
                    .as_bytes(),
                );
            }
            XrefKind::Stream => {
                let xref_num = size;
                offsets.insert(xref_num, (1, xref_offset as u64, 0));
                let mut rows = Vec::new();
                for num in 0..=xref_num {
                    let (kind, field2, field3) = match offsets.get(&num) {
                        Some(entry) => *entry,
                        None if num == 0 => (0, 0, 65535),
                        None => (0, 0, 0),
                    };
                    rows.push(kind);
                    rows.extend_from_slice(&(field2 as u32).to_be_bytes());
                    rows.extend_from_slice(&(field3 as u16).to_be_bytes());
                }
                let data = deflate(&rows);
                let index = match &self.xref_index {
                    Some(index) => {
                        let values: Vec<String> = index.iter().map(i64::to_string).collect();
                        format!(" /Index [{}]", values.join(" "))
                    }
                    None => String::new(),
                };
                out.extend_from_slice(
                    format!(
                        "{} 0 obj\n<< /Type /XRef /Size {}{} /W [1 4 2] /Root {} 0 R /Filter /FlateDecode /Length {} >>\nstream\n",
                        xref_num,
                        xref_num + 1,
                        index,
                        self.root,
                        data.len()
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(&data);
                out.extend_from_slice(
                    format!("\nendstream\nendobj\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes(),
                );
            }
            XrefKind::Missing => out.extend_from_slice(b"%%EOF\n"),
        }

        let mut file = self.prefix.clone();
        file.extend_from_slice(&out);
        file
    }
}

/// Insert a classic xref subsection header and `entries` copies of the
/// first in-use entry just before the trailer. Object offsets are unchanged.
pub fn insert_subsection(data: &[u8], start: i64, count: i64, entries: usize) -> Vec<u8> {
    let text = String::from_utf8_lossy(data);
    let Some(trailer) = text.rfind("trailer") else {
        return data.to_vec();
    };
    let entry = text
        .lines()
        .find(|line| line.ends_with(" 00000 n ") && !line.starts_with("0000000000"))
        .unwrap_or("0000000000 00000 n ")
        .to_string();
    let mut out = data[..trailer].to_vec();
    out.extend_from_slice(format!("{} {}\n", start, count).as_bytes());
    for _ in 0..entries {
        out.extend_from_slice(format!("{}\n", entry).as_bytes());
    }
    out.extend_from_slice(&data[trailer..]);
    out
}

/// Append an incremental update whose xref section chains to the previous one
pub fn append_update(base: &[u8], objects: &[(u32, &str)], size: u32, root: u32) -> Vec<u8> {
    let previous = last_startxref(base);
    let mut out = base.to_vec();
    let mut entries = Vec::new();
    for (num, body) in objects {
        entries.push((*num, out.len()));
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", num, body).as_bytes());
    }
    let xref_offset = out.len();
    out.extend_from_slice(b"xref\n");
    for (num, offset) in &entries {
        out.extend_from_slice(format!("{} 1\n{:010} 00000 n \n", num, offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root {} 0 R /Prev {} >>\nstartxref\n{}\n%%EOF\n",
            size, root, previous, xref_offset
        )
        .as_bytes(),
    );
    out
}

fn last_startxref(data: &[u8]) -> usize {
    let text = String::from_utf8_lossy(data);
    text.rfind("startxref")
        .and_then(|pos| text[pos + 9..].split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Text content that shows `text` at a fixed position
pub fn show(text: &str) -> String {
    format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", text)
}
