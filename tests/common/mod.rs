#![allow(dead_code)]

use arbor::{Cp, Endpoint, LoopbackRouter, MergeTree, Segment};

/// Reconstructs the whole document by walking `fetch` runs from zero to
/// `cp_mac`.
pub fn doc_text<E: Endpoint>(doc: &MergeTree<E>) -> String {
    let mut text = String::new();
    let mut cp = Cp::new(0);

    while cp < doc.cp_mac() {
        let run = doc.fetch(cp);
        text.push_str(run);
        cp = cp + run.len() as i32;
    }

    text
}

pub fn assert_doc<E: Endpoint>(doc: &MergeTree<E>, expected: &str) {
    assert_eq!(doc_text(doc), expected);
}

/// A small document with some editing history:
///
/// ```text
/// The fox
/// The slow fox
/// The slow brown fox
/// The quick brown fox
/// ```
pub fn fox_tree() -> MergeTree<LoopbackRouter> {
    let mut doc = MergeTree::new(LoopbackRouter::new());
    doc.reload_from_segments(vec![Segment::text("The fox")]);

    doc.replace(Cp::new(4), 0, "slow ");
    doc.replace(Cp::new(9), 0, "brown ");
    doc.replace(Cp::new(4), 4, "quick");

    doc
}
