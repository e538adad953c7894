//! Ordered concatenation of single-document PDFs.
//!
//! The merge is CPU-bound and synchronous; callers run it on the blocking
//! pool (see [`crate::pipeline::aggregate`]).

use crate::error::MergeError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Counters from one merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeStats {
    pub documents: usize,
    pub pages: usize,
    pub bytes: u64,
}

/// Concatenates PDFs in the given order into `output`.
pub trait PdfMerger: Send + Sync {
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<MergeStats, MergeError>;
}

/// [`PdfMerger`] backed by `lopdf`.
///
/// Every input's objects are renumbered into one id space, all pages are
/// re-parented under a single page tree in input order, and the result is
/// written to a temporary sibling of `output` before being renamed over it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfMerger;

impl PdfMerger for LopdfMerger {
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<MergeStats, MergeError> {
        if inputs.is_empty() {
            return Err(MergeError::NoPages);
        }

        let mut max_id = 1;
        let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
        let mut objects: Vec<(ObjectId, Object)> = Vec::new();

        for path in inputs {
            let mut doc = Document::load(path).map_err(|e| MergeError::Load {
                path: path.clone(),
                detail: e.to_string(),
            })?;
            doc.renumber_objects_with(max_id);
            max_id = doc.max_id + 1;

            let before = pages.len();
            for (_, page_id) in doc.get_pages() {
                let mut page = doc
                    .get_dictionary(page_id)
                    .map_err(|e| MergeError::Load {
                        path: path.clone(),
                        detail: format!("page object {page_id:?}: {e}"),
                    })?
                    .clone();
                inherit_attributes(&doc, &mut page);
                pages.push((page_id, page));
            }
            debug!(
                "loaded {} ({} pages)",
                path.display(),
                pages.len() - before
            );
            objects.extend(doc.objects);
        }

        if pages.is_empty() {
            return Err(MergeError::Structure("inputs contain no pages".into()));
        }

        let mut merged = Document::with_version("1.5");
        let mut catalog: Option<(ObjectId, Dictionary)> = None;
        let mut root_pages: Option<(ObjectId, Dictionary)> = None;

        for (id, object) in objects {
            match type_of(&object) {
                Some(b"Catalog") => {
                    if catalog.is_none() {
                        if let Ok(dict) = object.as_dict() {
                            catalog = Some((id, dict.clone()));
                        }
                    }
                }
                Some(b"Pages") => {
                    if let Ok(dict) = object.as_dict() {
                        match root_pages.as_mut() {
                            Some((_, kept)) => kept.extend(dict),
                            None => root_pages = Some((id, dict.clone())),
                        }
                    }
                }
                Some(b"Page") | Some(b"Outlines") | Some(b"Outline") => {}
                _ => {
                    merged.objects.insert(id, object);
                }
            }
        }

        let (catalog_id, mut catalog) =
            catalog.ok_or_else(|| MergeError::Structure("no document catalog".into()))?;
        let (pages_id, mut root) =
            root_pages.ok_or_else(|| MergeError::Structure("no page tree root".into()))?;

        let page_count = pages.len();
        let mut kids = Vec::with_capacity(page_count);
        for (id, mut page) in pages {
            page.set("Parent", pages_id);
            merged.objects.insert(id, Object::Dictionary(page));
            kids.push(Object::Reference(id));
        }

        root.remove(b"Parent");
        for key in INHERITABLE {
            root.remove(key);
        }
        root.set("Count", page_count as i64);
        root.set("Kids", kids);
        merged.objects.insert(pages_id, Object::Dictionary(root));

        catalog.set("Pages", pages_id);
        catalog.remove(b"Outlines");
        merged.objects.insert(catalog_id, Object::Dictionary(catalog));
        merged.trailer.set("Root", catalog_id);

        merged.max_id = merged.objects.keys().map(|(id, _)| *id).max().unwrap_or(0);
        merged.renumber_objects();
        merged.compress();

        let bytes = save_atomically(&mut merged, output)?;
        Ok(MergeStats {
            documents: inputs.len(),
            pages: page_count,
            bytes,
        })
    }
}

fn type_of(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()?
        .get(b"Type")
        .and_then(Object::as_name)
        .ok()
}

/// Copy attributes the page inherits from its ancestors onto the page itself,
/// since the merged tree drops intermediate nodes.
fn inherit_attributes(doc: &Document, page: &mut Dictionary) {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(id) = parent {
        if depth > 64 {
            break;
        }
        let Ok(node) = doc.get_dictionary(id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }
}

fn save_atomically(doc: &mut Document, output: &Path) -> Result<u64, MergeError> {
    let write_err = |detail: String| MergeError::Write {
        path: output.to_path_buf(),
        detail,
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }

    let tmp_path = output.with_extension("pdf.tmp");
    doc.save(&tmp_path).map_err(|e| write_err(e.to_string()))?;
    if let Err(e) = std::fs::rename(&tmp_path, output) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(write_err(e.to_string()));
    }
    std::fs::metadata(output)
        .map(|m| m.len())
        .map_err(|e| write_err(e.to_string()))
}
