//! `LopdfMerger` against real (if tiny) PDFs.

mod common;

use common::{page_labels, write_labelled_pdf};
use lopdf::{Document, Object};
use std::path::PathBuf;
use webpage2pdf::{LopdfMerger, MergeError, PdfMerger};

#[test]
fn pages_follow_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("page_00001.pdf");
    let b = dir.path().join("page_00002.pdf");
    let c = dir.path().join("page_00003.pdf");
    write_labelled_pdf(&a, &["a1", "a2"]);
    write_labelled_pdf(&b, &["b1"]);
    write_labelled_pdf(&c, &["c1", "c2", "c3"]);
    let out = dir.path().join("merged.pdf");

    let stats = LopdfMerger
        .merge(&[c.clone(), a.clone(), b.clone()], &out)
        .unwrap();

    assert_eq!(stats.documents, 3);
    assert_eq!(stats.pages, 6);
    assert_eq!(stats.bytes, std::fs::metadata(&out).unwrap().len());
    assert_eq!(
        page_labels(&out),
        vec!["c1", "c2", "c3", "a1", "a2", "b1"]
    );
}

#[test]
fn single_input_round_trips_its_pages() {
    let dir = tempfile::tempdir().unwrap();
    let only = dir.path().join("only.pdf");
    write_labelled_pdf(&only, &["x", "y"]);
    let out = dir.path().join("out.pdf");

    let stats = LopdfMerger.merge(&[only], &out).unwrap();

    assert_eq!(stats.pages, 2);
    assert_eq!(page_labels(&out), vec!["x", "y"]);
}

#[test]
fn inherited_attributes_move_onto_pages() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.pdf");
    let b = dir.path().join("b.pdf");
    write_labelled_pdf(&a, &["a"]);
    write_labelled_pdf(&b, &["b"]);
    let out = dir.path().join("merged.pdf");

    LopdfMerger.merge(&[a, b], &out).unwrap();

    let doc = Document::load(&out).unwrap();
    let pages = doc.get_pages();
    assert_eq!(pages.len(), 2);
    for id in pages.values() {
        let page = doc.get_dictionary(*id).unwrap();
        let media_box = page.get(b"MediaBox").and_then(Object::as_array).unwrap();
        assert_eq!(media_box.len(), 4);
        assert!(page.has(b"Resources"), "page {id:?} lost its resources");
    }
}

#[test]
fn output_replaces_existing_file_without_leaving_temp() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.pdf");
    write_labelled_pdf(&a, &["fresh"]);
    let out = dir.path().join("merged.pdf");
    std::fs::write(&out, b"stale").unwrap();

    LopdfMerger.merge(&[a], &out).unwrap();

    assert_eq!(page_labels(&out), vec!["fresh"]);
    assert!(!dir.path().join("merged.pdf.tmp").exists());
}

#[test]
fn output_parent_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.pdf");
    write_labelled_pdf(&a, &["p"]);
    let out = dir.path().join("nested").join("deeper").join("merged.pdf");

    LopdfMerger.merge(&[a], &out).unwrap();

    assert!(out.exists());
}

#[test]
fn one_bad_input_fails_the_whole_merge() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.pdf");
    write_labelled_pdf(&good, &["ok"]);
    let missing: PathBuf = dir.path().join("missing.pdf");
    let out = dir.path().join("merged.pdf");

    let err = LopdfMerger
        .merge(&[good, missing.clone()], &out)
        .unwrap_err();

    assert!(matches!(err, MergeError::Load { ref path, .. } if *path == missing));
    assert!(!out.exists());
}
