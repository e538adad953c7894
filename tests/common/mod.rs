//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;

/// Write a PDF with one page per label.
///
/// Each page carries its label under a private `Label` key so a merged
/// document's page order can be read back. `MediaBox` and `Resources` live
/// on the page tree root, as renderers often emit them, so merging must
/// copy them down to the pages.
pub fn write_labelled_pdf(path: &Path, labels: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::with_capacity(labels.len());
    for label in labels {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Label" => Object::string_literal(*label),
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// Page labels of a PDF, in page order.
pub fn page_labels(path: &Path) -> Vec<String> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).unwrap();
            match page.get(b"Label") {
                Ok(Object::String(bytes, _)) => String::from_utf8_lossy(bytes).to_string(),
                other => panic!("page {id:?} has no label: {other:?}"),
            }
        })
        .collect()
}
