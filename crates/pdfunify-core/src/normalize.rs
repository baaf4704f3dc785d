//! Page geometry normalization.
//!
//! Every page is scaled isotropically so its MediaBox width matches a target
//! width. Drawing instructions are left alone; the page content is wrapped in
//! a `q … cm … Q` pair carrying the scale instead.

use crate::container::Container;
use crate::error::{Result, UnifyError};
use crate::geometry::{as_f64, Matrix, Rect};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, warn};

/// Scale factors closer to 1 than this leave the page untouched. Page boxes
/// are stored as `f32`, so a page written at the target width reads back a
/// few ulps away from it.
pub const SCALE_EPSILON: f64 = 1e-6;

const PAGE_BOXES: [&[u8]; 5] = [b"MediaBox", b"CropBox", b"BleedBox", b"TrimBox", b"ArtBox"];

/// Rescale every page of `container` to `target_width`, preserving aspect.
///
/// All pages are checked before any is modified, so a degenerate page leaves
/// the container as it was.
pub fn normalize(container: &mut Container, target_width: f64) -> Result<()> {
    if !(target_width.is_finite() && target_width > 0.0) {
        return Err(UnifyError::PreconditionError(format!(
            "Target width must be positive, got {}",
            target_width
        )));
    }

    let page_ids = container.page_ids();
    let mut plan = Vec::with_capacity(page_ids.len());
    for (index, page_id) in page_ids.into_iter().enumerate() {
        let width = container.page_by_id(page_id)?.width();
        if !(width.is_finite() && width > 0.0) {
            return Err(UnifyError::PreconditionError(format!(
                "Page {} has non-positive width {}",
                index + 1,
                width
            )));
        }
        plan.push((page_id, target_width / width));
    }

    for (page_id, scale) in plan {
        scale_page(container, page_id, scale)?;
    }
    Ok(())
}

/// Scale one page uniformly by `scale` about the origin of its user space.
pub fn scale_page(container: &mut Container, page_id: ObjectId, scale: f64) -> Result<()> {
    let matrix = Matrix::scale(scale, scale);
    if matrix.is_identity(SCALE_EPSILON) {
        debug!(page = ?page_id, "page already at target width");
        return Ok(());
    }

    let boxes: Vec<(&[u8], Rect)> = PAGE_BOXES
        .iter()
        .filter_map(|key| {
            container
                .resolved_attribute(page_id, key)
                .and_then(Rect::from_object)
                .map(|rect| (*key, rect.transform(&matrix)))
        })
        .collect();

    let doc = container.document_mut();
    let page = page_dict_mut(doc, page_id)?;
    for (key, rect) in &boxes {
        page.set(key.to_vec(), rect.to_object());
    }

    wrap_contents(doc, page_id, &matrix)?;
    scale_annotations(doc, page_id, &matrix);

    debug!(page = ?page_id, scale, "scaled page");
    Ok(())
}

/// Surround the existing content streams with `q <m> cm` and `Q`.
fn wrap_contents(doc: &mut Document, page_id: ObjectId, matrix: &Matrix) -> Result<()> {
    let prologue = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("cm", matrix.to_operands()),
        ],
    };
    let epilogue = Content {
        operations: vec![Operation::new("Q", vec![])],
    };
    let encode = |content: Content| {
        content
            .encode()
            .map_err(|e| UnifyError::SerializationError(format!("Content encoding failed: {}", e)))
    };
    // Readers join the Contents array without a separator, and `encode`
    // leaves no trailing whitespace.
    let mut prologue_bytes = encode(prologue)?;
    prologue_bytes.push(b'\n');
    let mut epilogue_bytes = b"\n".to_vec();
    epilogue_bytes.extend(encode(epilogue)?);

    let prologue_id = doc.add_object(Stream::new(Dictionary::new(), prologue_bytes));
    let epilogue_id = doc.add_object(Stream::new(Dictionary::new(), epilogue_bytes));

    let existing = match doc.get_dictionary(page_id).and_then(|d| d.get(b"Contents")) {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(arr)) => arr.clone(),
        _ => Vec::new(),
    };

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(prologue_id));
    contents.extend(existing);
    contents.push(Object::Reference(epilogue_id));

    page_dict_mut(doc, page_id)?.set("Contents", Object::Array(contents));
    Ok(())
}

/// Annotation keys holding flat `x y x y …` coordinate lists. `RD` holds
/// margins rather than points, which a scale about the origin maps the same way.
const ANNOT_COORDINATE_KEYS: [&[u8]; 5] = [b"QuadPoints", b"Vertices", b"L", b"RD", b"CL"];

/// Keep annotation geometry aligned with the scaled content.
fn scale_annotations(doc: &mut Document, page_id: ObjectId, matrix: &Matrix) {
    let annots = match doc.get_dictionary(page_id).and_then(|d| d.get(b"Annots")) {
        Ok(Object::Reference(id)) => doc.get_object(*id).and_then(Object::as_array).cloned(),
        Ok(Object::Array(arr)) => Ok(arr.clone()),
        _ => return,
    };
    let Ok(annots) = annots else {
        return;
    };

    for annot in annots {
        let Ok(annot_id) = annot.as_reference() else {
            continue;
        };
        scale_annotation(doc, annot_id, matrix);
    }
}

fn scale_annotation(doc: &mut Document, annot_id: ObjectId, matrix: &Matrix) {
    let Ok(dict) = doc.get_dictionary(annot_id).cloned() else {
        return;
    };

    if let Ok(value) = dict.get(b"Rect") {
        let scaled = scale_in_place(doc, annot_id, b"Rect", value, |obj| {
            Rect::from_object(obj).map(|rect| rect.transform(matrix).to_object())
        });
        if !scaled {
            warn!(annot = ?annot_id, "annotation Rect is not a readable box, left unscaled");
        }
    }

    for key in ANNOT_COORDINATE_KEYS {
        if let Ok(value) = dict.get(key) {
            scale_in_place(doc, annot_id, key, value, |obj| scale_coordinates(obj, matrix));
        }
    }

    if let Ok(value) = dict.get(b"InkList") {
        scale_ink_list(doc, annot_id, value, matrix);
    }
}

/// Replace `annot[key]` with `f(value)`, writing through to the referenced
/// object when the value is indirect. Returns false when `f` rejects it.
fn scale_in_place(
    doc: &mut Document,
    annot_id: ObjectId,
    key: &[u8],
    value: &Object,
    f: impl Fn(&Object) -> Option<Object>,
) -> bool {
    match value {
        Object::Reference(target) => {
            let Some(scaled) = doc.get_object(*target).ok().and_then(&f) else {
                return false;
            };
            doc.objects.insert(*target, scaled);
            true
        }
        direct => {
            let Some(scaled) = f(direct) else {
                return false;
            };
            match doc.get_object_mut(annot_id).and_then(Object::as_dict_mut) {
                Ok(dict) => {
                    dict.set(key.to_vec(), scaled);
                    true
                }
                Err(_) => false,
            }
        }
    }
}

/// `InkList` is an array of paths, each a flat coordinate list that may
/// itself be indirect.
fn scale_ink_list(doc: &mut Document, annot_id: ObjectId, value: &Object, matrix: &Matrix) {
    let paths = match value {
        Object::Reference(id) => doc.get_object(*id).and_then(Object::as_array).cloned(),
        Object::Array(arr) => Ok(arr.clone()),
        _ => return,
    };
    let Ok(paths) = paths else {
        return;
    };

    let mut scaled_paths = Vec::with_capacity(paths.len());
    for path in paths {
        match path {
            Object::Reference(id) => {
                if let Some(scaled) = doc
                    .get_object(id)
                    .ok()
                    .and_then(|obj| scale_coordinates(obj, matrix))
                {
                    doc.objects.insert(id, scaled);
                }
                scaled_paths.push(Object::Reference(id));
            }
            direct => scaled_paths.push(scale_coordinates(&direct, matrix).unwrap_or(direct)),
        }
    }

    let scaled = Object::Array(scaled_paths);
    match value {
        Object::Reference(id) => {
            doc.objects.insert(*id, scaled);
        }
        _ => {
            if let Ok(dict) = doc.get_object_mut(annot_id).and_then(Object::as_dict_mut) {
                dict.set("InkList", scaled);
            }
        }
    }
}

/// Map an even-length number array through `matrix` pairwise.
fn scale_coordinates(obj: &Object, matrix: &Matrix) -> Option<Object> {
    let arr = obj.as_array().ok()?;
    if arr.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(arr.len());
    for pair in arr.chunks_exact(2) {
        let (x, y) = matrix.transform_point(as_f64(&pair[0])?, as_f64(&pair[1])?);
        out.push(Object::Real(x as f32));
        out.push(Object::Real(y as f32));
    }
    Some(Object::Array(out))
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> Result<&mut Dictionary> {
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|_| UnifyError::ParseError(format!("Page {:?} is not a dictionary", page_id)))
}
