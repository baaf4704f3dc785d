//! PDF Merge algorithm
//!
//! Copies pages, together with everything they reference, from one container
//! into another.

use crate::container::Container;
use crate::error::{Result, UnifyError};
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;
use tracing::debug;

/// Append page `page_index` of `source` to the end of `dest`.
///
/// The algorithm:
/// 1. Detach the source page (inherited attributes inlined, `/Parent` dropped)
/// 2. Walk every object reachable from it, allocating a fresh destination id
///    for each source id the first time it is seen
/// 3. Rewrite every reference in the copies through that id map
/// 4. Commit the copies to `dest` and hook the page into its page tree
///
/// Nothing is shared with earlier merges: merging the same page twice yields
/// two independent copies. If a reference cannot be resolved in `source`,
/// `dest` is left untouched.
pub fn merge_page(dest: &mut Container, source: &Container, page_index: usize) -> Result<ObjectId> {
    merge_page_by_id(dest, source, source.page_id(page_index)?)
}

/// Merge every page of `source` into `dest`, keeping source page order.
pub fn merge_all(dest: &mut Container, source: &Container) -> Result<usize> {
    let page_ids = source.page_ids();
    for &page_id in &page_ids {
        merge_page_by_id(dest, source, page_id)?;
    }
    Ok(page_ids.len())
}

fn merge_page_by_id(
    dest: &mut Container,
    source: &Container,
    source_page_id: ObjectId,
) -> Result<ObjectId> {
    let page = source.detached_page_dictionary(source_page_id)?;

    let mut copier = GraphCopier::new(source.document(), dest.document().max_id);
    let new_page_id = copier.copy_from(source_page_id, Object::Dictionary(page))?;
    let copied = copier.copied.len();
    copier.commit(dest.document_mut());
    dest.append_page(new_page_id)?;

    debug!(
        source_page = ?source_page_id,
        dest_page = ?new_page_id,
        objects = copied,
        "merged page"
    );
    Ok(new_page_id)
}

/// Staged copy of one page's object closure.
struct GraphCopier<'a> {
    source: &'a Document,
    /// Source id -> destination id. Doubles as the visited set.
    remap: BTreeMap<ObjectId, ObjectId>,
    /// Source ids still to copy, with the source object that referenced them.
    pending: Vec<(ObjectId, ObjectId)>,
    /// Copies keyed by destination id.
    copied: BTreeMap<ObjectId, Object>,
    max_id: u32,
}

impl<'a> GraphCopier<'a> {
    fn new(source: &'a Document, dest_max_id: u32) -> Self {
        Self {
            source,
            remap: BTreeMap::new(),
            pending: Vec::new(),
            copied: BTreeMap::new(),
            max_id: dest_max_id,
        }
    }

    /// Copy `root` (standing in for source object `root_id`) and its closure.
    fn copy_from(&mut self, root_id: ObjectId, root: Object) -> Result<ObjectId> {
        let new_root_id = self.allocate(root_id);
        let root = self.rewrite(root, root_id);
        self.copied.insert(new_root_id, root);

        while let Some((source_id, referenced_by)) = self.pending.pop() {
            let object = self.source.objects.get(&source_id).cloned().ok_or(
                UnifyError::GraphIntegrityError {
                    missing: source_id,
                    referenced_by,
                },
            )?;
            let copy = self.rewrite(object, source_id);
            self.copied.insert(self.remap[&source_id], copy);
        }
        Ok(new_root_id)
    }

    fn allocate(&mut self, source_id: ObjectId) -> ObjectId {
        self.max_id += 1;
        let new_id = (self.max_id, 0);
        self.remap.insert(source_id, new_id);
        new_id
    }

    /// Destination id for `source_id`, scheduling it for copy on first sight.
    fn target(&mut self, source_id: ObjectId, referenced_by: ObjectId) -> ObjectId {
        if let Some(id) = self.remap.get(&source_id) {
            return *id;
        }
        self.pending.push((source_id, referenced_by));
        self.allocate(source_id)
    }

    fn rewrite(&mut self, obj: Object, owner: ObjectId) -> Object {
        match obj {
            Object::Reference(id) => Object::Reference(self.target(id, owner)),
            Object::Array(arr) => {
                Object::Array(arr.into_iter().map(|o| self.rewrite(o, owner)).collect())
            }
            Object::Dictionary(mut dict) => {
                for (_, value) in dict.iter_mut() {
                    let taken = std::mem::replace(value, Object::Null);
                    *value = self.rewrite(taken, owner);
                }
                Object::Dictionary(dict)
            }
            Object::Stream(mut stream) => {
                for (_, value) in stream.dict.iter_mut() {
                    let taken = std::mem::replace(value, Object::Null);
                    *value = self.rewrite(taken, owner);
                }
                Object::Stream(stream)
            }
            other => other,
        }
    }

    fn commit(self, dest: &mut Document) {
        dest.objects.extend(self.copied);
        dest.max_id = dest.max_id.max(self.max_id);
    }
}
