mod common;

use arbor::{Cp, LoopbackRouter, MergeTree, Segment};
use common::{assert_doc, doc_text, fox_tree};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[test]
fn reaps_dead_segments() {
    let mut doc = fox_tree();

    // One trailing edit pushes the loopback's minimum sequence number past
    // the replacement, settling it: "slow" goes from tombstoned to dead.
    doc.replace(doc.cp_mac(), 0, "!");
    assert!(doc.dead_segment_count() > 0);

    let mut budget = 32;
    doc.run_maintenance(|| {
        budget -= 1;
        budget > 0
    });

    assert_eq!(doc.dead_segment_count(), 0);
    assert_doc(&doc, "The quick brown fox!");
    doc.check_invariants();

    // The tombstone is physically gone, not just invisible.
    assert!(doc.leaf_runs().iter().all(|(_, visible)| *visible));
}

#[test]
fn zero_budget_does_nothing() {
    let mut doc = fox_tree();
    doc.replace(doc.cp_mac(), 0, "!");

    let dead = doc.dead_segment_count();
    assert!(dead > 0);

    doc.run_maintenance(|| false);

    assert_eq!(doc.dead_segment_count(), dead);
    assert_doc(&doc, "The quick brown fox!");
    doc.check_invariants();
}

#[test]
fn rebuild_preserves_document() {
    let mut doc = MergeTree::new(LoopbackRouter::new());

    for i in 0..3000u32 {
        let ch = [b'a' + (i % 26) as u8];
        doc.replace(doc.cp_mac(), 0, std::str::from_utf8(&ch).unwrap());
    }

    let before = doc_text(&doc);
    let (depth_min, depth_max) = doc.root_depths();
    assert!(depth_max - depth_min > 2);

    let mut budget = 4;
    doc.run_maintenance(|| {
        budget -= 1;
        budget > 0
    });

    assert_eq!(doc_text(&doc), before);
    doc.check_invariants();
}

/// Sweeps a generated corpus replacing "the" with "teh", mirroring every
/// edit on a shadow string, then checks that a full maintenance sweep
/// leaves no dead segment behind.
#[test]
fn find_replace_sweep() {
    let seed = rand::random::<u64>();
    println!("seed: {seed}");
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let words =
        ["the", "quick", "brown", "fox", "jumps", "over", "a", "lazy", "dog"];

    let mut corpus = String::new();
    for _ in 0..800 {
        let len = rng.gen_range(3..10);
        for i in 0..len {
            if i > 0 {
                corpus.push(' ');
            }
            corpus.push_str(words[rng.gen_range(0..words.len())]);
        }
        corpus.push('\n');
    }

    let mut doc = MergeTree::new(LoopbackRouter::new());
    doc.reload_from_segments(
        corpus.split_inclusive('\n').map(Segment::text).collect(),
    );

    let mut shadow = corpus;

    let mut cp = Cp::new(0);
    while cp < doc.cp_mac() {
        let run = doc.fetch(cp).to_owned();
        if let Some(pos) = run.find("the") {
            let at = cp + pos as i32;
            doc.replace(at, 3, "teh");
            let start = at.as_i32() as usize;
            shadow.replace_range(start..start + 3, "teh");
            cp = at + 3;
        } else {
            cp = cp + run.len() as i32;
        }
    }

    assert_eq!(doc_text(&doc), shadow);
    doc.check_invariants();

    // Settle the last replacement, then reap everything.
    doc.replace(doc.cp_mac(), 0, "\n");
    shadow.push('\n');

    let mut budget = 512;
    doc.run_maintenance(|| {
        budget -= 1;
        budget > 0
    });

    assert_eq!(doc.dead_segment_count(), 0);
    assert_eq!(doc_text(&doc), shadow);
    doc.check_invariants();
}

#[test]
fn external_segments_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corpus.txt");
    let contents = "The quick brown fox\njumps over\nthe lazy dog\n";
    std::fs::write(&path, contents).unwrap();

    let mut doc = MergeTree::new(LoopbackRouter::new());
    let file = doc.files_mut().open(&path).unwrap();

    let mut segments = Vec::new();
    let mut offset = 0u32;
    for line in contents.split_inclusive('\n') {
        segments.push(Segment::external(file, offset, line.len() as u32));
        offset += line.len() as u32;
    }
    doc.reload_from_segments(segments);

    assert_doc(&doc, contents);
    doc.check_invariants();

    // Splitting an external segment only narrows its window.
    doc.replace(Cp::new(4), 5, "slow!");

    assert_doc(&doc, "The slow! brown fox\njumps over\nthe lazy dog\n");
    doc.check_invariants();
}
