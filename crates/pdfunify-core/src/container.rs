//! In-memory page container built on a lopdf object graph.

use crate::error::{Result, UnifyError};
use crate::geometry::Rect;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeSet;
use tracing::debug;

/// Page attributes a page may inherit from its ancestors in the page tree.
pub(crate) const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Geometry of a single page, with inherited attributes already resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Page {
    pub id: ObjectId,
    pub media_box: Rect,
    pub rotation: i64,
}

impl Page {
    pub fn width(&self) -> f64 {
        self.media_box.width()
    }

    pub fn height(&self) -> f64 {
        self.media_box.height()
    }
}

/// One document's object graph plus its ordered page list.
#[derive(Debug, Clone)]
pub struct Container {
    doc: Document,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Empty merge target: a catalog and a page tree root with no kids.
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Kids", Object::Array(vec![])),
            ("Count", Object::Integer(0)),
        ]);
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]);
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        Self { doc }
    }

    /// Wrap an already-built graph. No integrity checks are run.
    pub fn from_document(doc: Document) -> Self {
        Self { doc }
    }

    /// Parse serialized PDF bytes and verify the page graph is closed.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let doc = Document::load_mem(bytes).map_err(|e| UnifyError::ParseError(e.to_string()))?;
        let container = Self { doc };
        container.validate()?;
        debug!(
            pages = container.page_count(),
            objects = container.doc.objects.len(),
            "loaded container"
        );
        Ok(container)
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Page object ids in display order.
    pub fn page_ids(&self) -> Vec<ObjectId> {
        self.doc.get_pages().into_values().collect()
    }

    pub fn page(&self, index: usize) -> Result<Page> {
        let id = self.page_id(index)?;
        self.page_by_id(id)
    }

    pub fn page_by_id(&self, id: ObjectId) -> Result<Page> {
        let media_box = self
            .resolved_attribute(id, b"MediaBox")
            .and_then(Rect::from_object)
            .ok_or_else(|| {
                UnifyError::ParseError(format!("Page {:?} has no usable MediaBox", id))
            })?;
        let rotation = self
            .resolved_attribute(id, b"Rotate")
            .and_then(|obj| obj.as_i64().ok())
            .unwrap_or(0);
        Ok(Page {
            id,
            media_box,
            rotation,
        })
    }

    pub fn page_id(&self, index: usize) -> Result<ObjectId> {
        let ids = self.page_ids();
        ids.get(index).copied().ok_or_else(|| {
            UnifyError::InputError(format!(
                "Page index {} out of range (container has {} pages)",
                index,
                ids.len()
            ))
        })
    }

    /// Serialize to a self-contained PDF byte stream.
    pub fn serialize(&mut self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| UnifyError::SerializationError(format!("Failed to save PDF: {}", e)))?;
        Ok(buffer)
    }

    pub fn compress(&mut self) {
        self.doc.compress();
    }

    /// Drop every page but the last one, along with objects only they used.
    pub fn retain_last_page(&mut self) {
        let count = self.page_count() as u32;
        if count <= 1 {
            return;
        }
        let doomed: Vec<u32> = (1..count).collect();
        self.doc.delete_pages(&doomed);
        self.doc.prune_objects();
    }

    pub(crate) fn pages_root_id(&self) -> Result<ObjectId> {
        let catalog_id = self
            .doc
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(|_| UnifyError::ParseError("No Root in trailer".into()))?;

        self.doc
            .get_dictionary(catalog_id)
            .map_err(|_| UnifyError::ParseError("Catalog not found".into()))?
            .get(b"Pages")
            .and_then(Object::as_reference)
            .map_err(|_| UnifyError::ParseError("No Pages in catalog".into()))
    }

    /// Hook `page_id` under the page tree root as its last kid.
    pub(crate) fn append_page(&mut self, page_id: ObjectId) -> Result<()> {
        let pages_id = self.pages_root_id()?;

        self.doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|_| UnifyError::ParseError(format!("Page {:?} is not a dictionary", page_id)))?
            .set("Parent", Object::Reference(pages_id));

        let pages = self
            .doc
            .get_object_mut(pages_id)
            .and_then(Object::as_dict_mut)
            .map_err(|_| UnifyError::ParseError("Invalid pages dictionary".into()))?;

        let count = pages.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
        match pages.get_mut(b"Kids").and_then(Object::as_array_mut) {
            Ok(kids) => kids.push(Object::Reference(page_id)),
            Err(_) => pages.set("Kids", Object::Array(vec![Object::Reference(page_id)])),
        }
        pages.set("Count", Object::Integer(count + 1));
        Ok(())
    }

    /// Copy of the page dictionary with inherited attributes written in
    /// place and the `/Parent` back-link removed.
    pub(crate) fn detached_page_dictionary(&self, page_id: ObjectId) -> Result<Dictionary> {
        let mut dict = self
            .doc
            .get_dictionary(page_id)
            .map_err(|_| UnifyError::ParseError(format!("Page {:?} not found", page_id)))?
            .clone();

        for key in INHERITABLE_KEYS {
            if dict.has(key) {
                continue;
            }
            if let Some(value) = self.inherited_attribute(page_id, key) {
                dict.set(key.to_vec(), value.clone());
            }
        }
        dict.remove(b"Parent");
        Ok(dict)
    }

    /// Look `key` up on the page, then up the `/Parent` chain. The value is
    /// returned as stored, references included.
    pub(crate) fn inherited_attribute(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut seen = BTreeSet::new();
        let mut current = page_id;
        loop {
            if !seen.insert(current) {
                return None;
            }
            let dict = self.doc.get_dictionary(current).ok()?;
            if let Ok(value) = dict.get(key) {
                return Some(value);
            }
            current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
        }
    }

    /// Like [`Self::inherited_attribute`] but follows a top-level reference.
    pub(crate) fn resolved_attribute(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        match self.inherited_attribute(page_id, key)? {
            Object::Reference(id) => self.doc.get_object(*id).ok(),
            other => Some(other),
        }
    }

    fn validate(&self) -> Result<()> {
        self.pages_root_id()?;

        let mut visited = BTreeSet::new();
        for page_id in self.page_ids() {
            self.page_by_id(page_id)?;
            let page = self.detached_page_dictionary(page_id)?;

            let mut pending = Vec::new();
            collect_references(&Object::Dictionary(page), &mut pending);
            while let Some(id) = pending.pop() {
                if !visited.insert(id) {
                    continue;
                }
                let obj = self.doc.objects.get(&id).ok_or_else(|| {
                    UnifyError::ParseError(format!(
                        "Page {:?} references missing object {:?}",
                        page_id, id
                    ))
                })?;
                collect_references(obj, &mut pending);
            }
        }
        Ok(())
    }
}

/// Push every reference held directly inside `obj` (not following them).
pub(crate) fn collect_references(obj: &Object, out: &mut Vec<ObjectId>) {
    match obj {
        Object::Reference(id) => out.push(*id),
        Object::Array(arr) => arr.iter().for_each(|o| collect_references(o, out)),
        Object::Dictionary(dict) => dict.iter().for_each(|(_, o)| collect_references(o, out)),
        Object::Stream(stream) => stream
            .dict
            .iter()
            .for_each(|(_, o)| collect_references(o, out)),
        _ => {}
    }
}
