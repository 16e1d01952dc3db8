//! Resource loading for the content-stream interpreter
//!
//! Fonts and form XObjects are resolved up front, while the reader is
//! available, into a [`ResourceSet`] that owns everything the interpreter
//! needs. The set is `Send`, so pages can be interpreted on worker threads.

use super::font::FontInfo;
use crate::parser::content::{ContentOperation, ContentParser};
use crate::parser::objects::{PdfDictionary, PdfObject};
use crate::parser::reader::PdfReader;
use crate::parser::stack_safe::StackSafeContext;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const IDENTITY: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Fonts and forms named by one content stream
#[derive(Debug, Clone, Default)]
pub struct ResourceSet {
    fonts: HashMap<String, Arc<FontInfo>>,
    xobjects: HashMap<String, Arc<FormXObject>>,
}

impl ResourceSet {
    pub fn font(&self, name: &str) -> Option<&Arc<FontInfo>> {
        self.fonts.get(name)
    }

    /// Form XObject by resource name; images and unknown names give `None`
    pub fn form(&self, name: &str) -> Option<&Arc<FormXObject>> {
        self.xobjects.get(name)
    }
}

/// A parsed form XObject ready to execute
#[derive(Debug, Clone)]
pub struct FormXObject {
    pub operations: Vec<ContentOperation>,
    pub matrix: [f64; 6],
    pub resources: ResourceSet,
}

/// Everything needed to interpret one page without the reader
#[derive(Debug, Clone)]
pub struct PageJob {
    pub index: usize,
    pub operations: Vec<ContentOperation>,
    pub resources: Arc<ResourceSet>,
}

/// Builds resource sets for one extraction call, caching by reference
pub struct ResourceLoader<'r, 'a> {
    reader: &'r PdfReader<'a>,
    fonts: HashMap<(u32, u16), Arc<FontInfo>>,
    forms: HashMap<(u32, u16), Arc<FormXObject>>,
    context: StackSafeContext,
}

impl<'r, 'a> ResourceLoader<'r, 'a> {
    pub fn new(reader: &'r PdfReader<'a>, max_form_depth: usize) -> Self {
        Self {
            reader,
            fonts: HashMap::new(),
            forms: HashMap::new(),
            context: StackSafeContext::with_limit(max_form_depth),
        }
    }

    /// Parse a page's content and load the resources it uses
    pub fn page_job(&mut self, index: usize, content: &[u8], resources: &PdfDictionary) -> PageJob {
        let operations = ContentParser::parse_content(content);
        let resources = Arc::new(self.load(resources, &operations));
        PageJob {
            index,
            operations,
            resources,
        }
    }

    /// Load the fonts and forms that `operations` refer to
    pub fn load(&mut self, resources: &PdfDictionary, operations: &[ContentOperation]) -> ResourceSet {
        let mut font_names = HashSet::new();
        let mut xobject_names = HashSet::new();
        for op in operations {
            match op {
                ContentOperation::SetFont(name, _) => {
                    font_names.insert(name.as_str());
                }
                ContentOperation::PaintXObject(name) => {
                    xobject_names.insert(name.as_str());
                }
                _ => {}
            }
        }

        let mut set = ResourceSet::default();
        if !font_names.is_empty() {
            if let Some(fonts) = self.sub_dictionary(resources, "Font") {
                for name in font_names {
                    if let Some(entry) = fonts.get(name) {
                        if let Some(font) = self.font(entry) {
                            set.fonts.insert(name.to_string(), font);
                        }
                    }
                }
            }
        }
        if !xobject_names.is_empty() {
            if let Some(xobjects) = self.sub_dictionary(resources, "XObject") {
                for name in xobject_names {
                    if let Some(entry) = xobjects.get(name) {
                        if let Some(form) = self.form(name, entry, resources) {
                            set.xobjects.insert(name.to_string(), form);
                        }
                    }
                }
            }
        }
        set
    }

    fn sub_dictionary(&self, resources: &PdfDictionary, key: &str) -> Option<PdfDictionary> {
        let entry = resources.get(key)?;
        match self.reader.resolve(entry) {
            Ok(resolved) => resolved.as_dict().cloned(),
            Err(e) => {
                tracing::warn!("cannot resolve /{} resources: {}", key, e);
                None
            }
        }
    }

    fn font(&mut self, entry: &PdfObject) -> Option<Arc<FontInfo>> {
        let key = entry.as_reference();
        if let Some(font) = key.and_then(|k| self.fonts.get(&k)) {
            return Some(Arc::clone(font));
        }
        let resolved = match self.reader.resolve(entry) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!("cannot resolve font: {}", e);
                return None;
            }
        };
        let font = Arc::new(FontInfo::from_dict(resolved.as_dict()?, self.reader));
        if let Some(key) = key {
            self.fonts.insert(key, Arc::clone(&font));
        }
        Some(font)
    }

    fn form(&mut self, name: &str, entry: &PdfObject, parent: &PdfDictionary) -> Option<Arc<FormXObject>> {
        let key = entry.as_reference();
        if let Some(form) = key.and_then(|k| self.forms.get(&k)) {
            return Some(Arc::clone(form));
        }

        let resolved = match self.reader.resolve(entry) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!("cannot resolve XObject /{}: {}", name, e);
                return None;
            }
        };
        let stream = resolved.as_stream()?;
        if stream.dict.get("Subtype").and_then(|o| o.as_name()) != Some("Form") {
            return None;
        }
        if let Some(filter) = &stream.unsupported_filter {
            tracing::warn!("form /{} uses unsupported filter {}", name, filter);
            return None;
        }

        if let Some((num, gen)) = key {
            if let Err(e) = self.context.visit_ref(num, gen) {
                tracing::warn!("skipping form /{}: {}", name, e);
                return None;
            }
        }
        if let Err(e) = self.context.enter() {
            tracing::warn!("skipping form /{}: {}", name, e);
            if let Some((num, gen)) = key {
                self.context.unvisit_ref(num, gen);
            }
            return None;
        }

        let own_resources = stream
            .dict
            .get("Resources")
            .and_then(|r| self.reader.resolve(r).ok())
            .and_then(|r| r.as_dict().cloned());
        let operations = ContentParser::parse_content(stream.decoded());
        let resources = self.load(own_resources.as_ref().unwrap_or(parent), &operations);
        let matrix = stream
            .dict
            .get("Matrix")
            .and_then(|m| matrix_from(self.reader, m))
            .unwrap_or(IDENTITY);

        self.context.exit();
        if let Some((num, gen)) = key {
            self.context.unvisit_ref(num, gen);
        }

        let form = Arc::new(FormXObject {
            operations,
            matrix,
            resources,
        });
        // A form borrowing its parent's resources may resolve differently elsewhere
        if let (Some(key), Some(_)) = (key, own_resources) {
            self.forms.insert(key, Arc::clone(&form));
        }
        Some(form)
    }
}

fn matrix_from(reader: &PdfReader<'_>, obj: &PdfObject) -> Option<[f64; 6]> {
    let resolved = reader.resolve(obj).ok()?;
    let array = resolved.as_array()?;
    if array.len() != 6 {
        return None;
    }
    let mut matrix = [0.0; 6];
    for (slot, item) in matrix.iter_mut().zip(array.iter()) {
        *slot = item.as_real()?;
    }
    Some(matrix)
}
