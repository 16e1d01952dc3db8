//! PDF Page Tree Parser
//!
//! Enumerates the leaves of the page tree in document order and resolves
//! each page's effective attributes.
//!
//! # Overview
//!
//! - **Page tree nodes** (`/Type /Pages`) hold a `/Kids` array of nodes or pages.
//! - **Page objects** (`/Type /Page`) are the leaves.
//! - **Inherited attributes**: `/Resources`, `/MediaBox`, `/CropBox` and
//!   `/Rotate` may sit on any ancestor. They are found by walking `/Parent`
//!   upward from the page, the nearest definition winning.
//!
//! The `/Parent` walk is bounded; a chain that loops or runs deeper than the
//! bound makes that page fail with [`PdfError::MalformedStructure`].

use super::objects::{PdfDictionary, PdfObject};
use super::reader::PdfReader;
use super::stack_safe::StackSafeContext;
use crate::error::{PdfError, Result};
use std::collections::HashSet;

/// US Letter, used when no `/MediaBox` is found anywhere in the ancestry
pub const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

const INHERITABLE: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// Represents a single page with its inherited attributes resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPage {
    /// Zero-based position in document order
    pub index: usize,

    /// Object reference of the page dictionary, when it is an indirect object
    pub obj_ref: Option<(u32, u16)>,

    /// Page dictionary as found in the file
    pub dict: PdfDictionary,

    /// Effective resource dictionary (inherited when the page has none)
    pub resources: PdfDictionary,

    /// MediaBox in PDF units: [llx, lly, urx, ury]
    pub media_box: [f64; 4],

    /// CropBox, if one is defined on the page or an ancestor
    pub crop_box: Option<[f64; 4]>,

    /// Clockwise rotation in degrees: 0, 90, 180 or 270
    pub rotation: i32,
}

impl ParsedPage {
    /// Page width accounting for rotation
    pub fn width(&self) -> f64 {
        match self.rotation {
            90 | 270 => self.media_box[3] - self.media_box[1],
            _ => self.media_box[2] - self.media_box[0],
        }
    }

    /// Page height accounting for rotation
    pub fn height(&self) -> f64 {
        match self.rotation {
            90 | 270 => self.media_box[2] - self.media_box[0],
            _ => self.media_box[3] - self.media_box[1],
        }
    }
}

/// A leaf of the page tree, not yet resolved into a [`ParsedPage`]
#[derive(Debug, Clone)]
pub enum PageSlot {
    Reference(u32, u16),
    Direct(PdfDictionary),
    /// A kid that could not be loaded; the page at this index fails
    Broken(PdfError),
}

/// Page tree navigator
#[derive(Debug, Clone)]
pub struct PageTree {
    slots: Vec<PageSlot>,
}

impl PageTree {
    /// Walk `/Kids` from the root node, collecting leaves in order.
    ///
    /// Fails only when the root itself is unusable. Nodes reached twice are
    /// skipped, and nesting beyond `max_depth` is cut off.
    pub fn load(reader: &PdfReader<'_>, root: &PdfObject, max_depth: usize) -> Result<Self> {
        let root_ref = root.as_reference();
        let resolved = reader.resolve(root)?;
        let root_dict = resolved
            .as_dict()
            .ok_or_else(|| PdfError::structure("/Pages is not a dictionary"))?;
        if !is_node(root_dict) {
            // A catalog pointing straight at a single page
            let slot = match root_ref {
                Some((num, gen)) => PageSlot::Reference(num, gen),
                None => PageSlot::Direct(root_dict.clone()),
            };
            return Ok(Self { slots: vec![slot] });
        }

        let mut slots = Vec::new();
        let mut seen: HashSet<(u32, u16)> = root_ref.into_iter().collect();
        let mut pending: Vec<(PdfObject, usize)> = kids_of(reader, root_dict)
            .into_iter()
            .rev()
            .map(|kid| (kid, 1))
            .collect();

        while let Some((kid, depth)) = pending.pop() {
            let kid_ref = kid.as_reference();
            if let Some(r) = kid_ref {
                if !seen.insert(r) {
                    tracing::warn!("page tree visits {} {} R twice, skipping", r.0, r.1);
                    continue;
                }
            }

            let node = match reader.resolve(&kid) {
                Ok(node) => node,
                Err(e) => {
                    slots.push(PageSlot::Broken(e));
                    continue;
                }
            };
            let Some(dict) = node.as_dict() else {
                slots.push(PageSlot::Broken(PdfError::structure(
                    "page tree kid is not a dictionary",
                )));
                continue;
            };

            if is_node(dict) {
                if depth >= max_depth {
                    tracing::warn!("page tree deeper than {} levels, pruning", max_depth);
                    continue;
                }
                pending.extend(
                    kids_of(reader, dict)
                        .into_iter()
                        .rev()
                        .map(|child| (child, depth + 1)),
                );
            } else {
                slots.push(match kid_ref {
                    Some((num, gen)) => PageSlot::Reference(num, gen),
                    None => PageSlot::Direct(dict.clone()),
                });
            }
        }

        if let Some(count) = root_dict.get("Count").and_then(|c| c.as_integer()) {
            if count != slots.len() as i64 {
                tracing::debug!("/Count {} but {} pages found", count, slots.len());
            }
        }
        Ok(Self { slots })
    }

    pub fn page_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&PageSlot> {
        self.slots.get(index)
    }

    /// Resolve the page at `index` and its inherited attributes
    pub fn load_page(&self, reader: &PdfReader<'_>, index: usize, max_parent_depth: usize) -> Result<ParsedPage> {
        let slot = self
            .slots
            .get(index)
            .ok_or_else(|| PdfError::structure(format!("page index {} out of range", index)))?;

        let (obj_ref, dict) = match slot {
            PageSlot::Broken(e) => return Err(e.clone()),
            PageSlot::Direct(dict) => (None, dict.clone()),
            PageSlot::Reference(num, gen) => {
                let object = reader.get_object(*num, *gen)?;
                let dict = object.as_dict().cloned().ok_or_else(|| {
                    PdfError::structure(format!("page {} {} R is not a dictionary", num, gen))
                })?;
                (Some((*num, *gen)), dict)
            }
        };

        let mut values: [Option<PdfObject>; 4] = Default::default();
        for (slot, key) in values.iter_mut().zip(INHERITABLE) {
            *slot = dict.get(key).cloned();
        }
        walk_ancestry(reader, obj_ref, &dict, max_parent_depth, &mut values)?;
        let [resources, media_box, crop_box, rotate] = values;

        let resources = match resources.map(|r| resolve_owned(reader, &r)) {
            Some(Ok(PdfObject::Dictionary(d))) => d,
            Some(Ok(_)) => {
                tracing::warn!("page {} has a non-dictionary /Resources", index);
                PdfDictionary::new()
            }
            Some(Err(e)) => {
                tracing::warn!("page {} resources unavailable: {}", index, e);
                PdfDictionary::new()
            }
            None => PdfDictionary::new(),
        };
        let media_box = media_box
            .and_then(|b| rectangle(reader, &b))
            .unwrap_or(DEFAULT_MEDIA_BOX);
        let crop_box = crop_box.and_then(|b| rectangle(reader, &b));
        let rotation = rotate
            .and_then(|r| resolve_owned(reader, &r).ok())
            .and_then(|r| r.as_integer())
            .map_or(0, normalize_rotation);

        Ok(ParsedPage {
            index,
            obj_ref,
            dict,
            resources,
            media_box,
            crop_box,
            rotation,
        })
    }
}

/// Fill missing inheritable values from the `/Parent` chain
fn walk_ancestry(
    reader: &PdfReader<'_>,
    page_ref: Option<(u32, u16)>,
    page: &PdfDictionary,
    max_depth: usize,
    values: &mut [Option<PdfObject>; 4],
) -> Result<()> {
    let mut context = StackSafeContext::with_limit(max_depth);
    if let Some((num, gen)) = page_ref {
        context.visit_ref(num, gen)?;
    }

    let mut parent = page.get("Parent").cloned();
    while let Some(link) = parent.take() {
        context.enter()?;
        if let Some((num, gen)) = link.as_reference() {
            context.visit_ref(num, gen)?;
        }
        let node = match reader.resolve(&link) {
            Ok(node) => node,
            Err(e) => {
                tracing::warn!("page ancestor unavailable: {}", e);
                break;
            }
        };
        let Some(node) = node.as_dict() else { break };

        for (slot, key) in values.iter_mut().zip(INHERITABLE) {
            if slot.is_none() {
                *slot = node.get(key).cloned();
            }
        }
        parent = node.get("Parent").cloned();
    }
    Ok(())
}

fn is_node(dict: &PdfDictionary) -> bool {
    match dict.get_type() {
        Some("Pages") => true,
        Some("Page") => false,
        _ => dict.contains_key("Kids"),
    }
}

fn kids_of(reader: &PdfReader<'_>, node: &PdfDictionary) -> Vec<PdfObject> {
    let Some(kids) = node.get("Kids") else {
        return Vec::new();
    };
    match reader.resolve(kids) {
        Ok(resolved) => match resolved.as_array() {
            Some(array) => array.0.clone(),
            None => {
                tracing::warn!("/Kids is not an array");
                Vec::new()
            }
        },
        Err(e) => {
            tracing::warn!("cannot resolve /Kids: {}", e);
            Vec::new()
        }
    }
}

fn resolve_owned(reader: &PdfReader<'_>, object: &PdfObject) -> Result<PdfObject> {
    reader.resolve(object).map(|r| (*r).clone())
}

fn rectangle(reader: &PdfReader<'_>, object: &PdfObject) -> Option<[f64; 4]> {
    let resolved = reader.resolve(object).ok()?;
    let array = resolved.as_array()?;
    if array.len() != 4 {
        return None;
    }
    let mut rect = [0.0; 4];
    for (slot, item) in rect.iter_mut().zip(array.iter()) {
        *slot = reader.resolve(item).ok()?.as_real()?;
    }
    Some(rect)
}

fn normalize_rotation(rotate: i64) -> i32 {
    let rotation = rotate.rem_euclid(360) as i32;
    if rotation % 90 == 0 {
        rotation
    } else {
        tracing::debug!("ignoring /Rotate {}", rotate);
        0
    }
}
