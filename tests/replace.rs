mod common;

use arbor::{Cp, LoopbackRouter, MergeTree, Segment};
use common::{assert_doc, doc_text, fox_tree};

#[test]
fn basic_fetch() {
    let doc = fox_tree();

    assert_eq!(doc.fetch(Cp::new(0)), "The ");
    assert_eq!(doc.fetch(Cp::new(4)), "quick");
    assert_eq!(doc.fetch(Cp::new(9)), " ");
    assert_eq!(doc.fetch(Cp::new(10)), "brown ");
    assert_eq!(doc.fetch(Cp::new(16)), "fox");

    assert_doc(&doc, "The quick brown fox");
    doc.check_invariants();
}

/// The replaced run stays in the tree as a tombstone, in traversal order.
#[test]
fn replaced_run_is_tombstoned_in_place() {
    let doc = fox_tree();

    let runs = doc.leaf_runs();
    let expected = [
        ("The ", true),
        ("slow", false),
        ("quick", true),
        (" ", true),
        ("brown ", true),
        ("fox", true),
    ];

    assert_eq!(runs.len(), expected.len());
    for (run, &(text, visible)) in runs.iter().zip(expected.iter()) {
        assert_eq!(run.0, text);
        assert_eq!(run.1, visible);
    }
}

#[test]
fn segments_iterator_matches_fetch_walk() {
    let doc = fox_tree();

    let from_segments: String = doc.segments().collect();
    assert_eq!(from_segments, doc_text(&doc));
}

#[test]
fn insert_into_empty_tree() {
    let mut doc = MergeTree::new(LoopbackRouter::new());

    assert_eq!(doc.cp_mac(), Cp::new(0));

    doc.replace(Cp::new(0), 0, "hello");

    assert_doc(&doc, "hello");
    doc.check_invariants();
}

#[test]
fn append_many() {
    let mut doc = MergeTree::new(LoopbackRouter::new());

    for _ in 0..500 {
        doc.replace(doc.cp_mac(), 0, "a");
    }

    assert_doc(&doc, &"a".repeat(500));
    doc.check_invariants();

    let (depth_min, depth_max) = doc.root_depths();
    assert!(depth_max - depth_min <= 2);
}

#[test]
fn pure_deletion() {
    let doc = {
        let mut doc = MergeTree::new(LoopbackRouter::new());
        doc.reload_from_segments(vec![Segment::text("The quick brown fox")]);
        doc.replace(Cp::new(4), 6, "");
        doc
    };

    assert_doc(&doc, "The brown fox");
    doc.check_invariants();
}

#[test]
fn replace_across_segment_boundaries() {
    let mut doc = MergeTree::new(LoopbackRouter::new());
    doc.reload_from_segments(vec![
        Segment::text("The "),
        Segment::text("quick "),
        Segment::text("brown "),
        Segment::text("fox"),
    ]);

    // Spans the tail of "quick ", all of "brown ", and all of "fox".
    doc.replace(Cp::new(7), 12, "et brown dog");

    assert_doc(&doc, "The quiet brown dog");
    doc.check_invariants();
}

/// After settled edits have aged out, the tree is observationally
/// indistinguishable from a fresh bulk load of the same visible text.
#[test]
fn settled_tree_matches_reloaded_tree() {
    let mut edited = fox_tree();

    // One more edit settles everything before it through the loopback's
    // minimum sequence number.
    edited.replace(edited.cp_mac(), 0, "!");

    let mut reloaded = MergeTree::new(LoopbackRouter::new());
    reloaded.reload_from_segments(vec![Segment::text(doc_text(&edited))]);

    assert_eq!(doc_text(&edited), doc_text(&reloaded));

    edited.replace(Cp::new(4), 5, "lazy ");
    reloaded.replace(Cp::new(4), 5, "lazy ");

    assert_eq!(doc_text(&edited), doc_text(&reloaded));
    edited.check_invariants();
    reloaded.check_invariants();
}
