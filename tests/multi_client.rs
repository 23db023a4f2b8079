mod common;

use arbor::{Cp, MergeTree, MultiClientRouter, RouterEndpoint};
use common::{assert_doc, doc_text};

fn setup(
    clients: usize,
) -> (MultiClientRouter, Vec<MergeTree<RouterEndpoint>>) {
    let mut router = MultiClientRouter::new();
    let docs =
        (0..clients).map(|_| MergeTree::new(router.endpoint())).collect();
    (router, docs)
}

fn pump(
    router: &mut MultiClientRouter,
    docs: &mut Vec<MergeTree<RouterEndpoint>>,
) {
    router.pump_messages();
    for doc in docs.iter_mut() {
        doc.poll_messages();
    }
}

#[test]
fn single_edit() {
    let (mut router, mut docs) = setup(3);

    docs[0].replace(Cp::new(0), 0, "test");
    pump(&mut router, &mut docs);

    for doc in &docs {
        assert_doc(doc, "test");
        doc.check_invariants();
    }
}

#[test]
fn concurrent_edits_no_overlap() {
    let (mut router, mut docs) = setup(4);

    docs[0].replace(Cp::new(0), 0, "The quick brown fox");
    pump(&mut router, &mut docs);

    docs[1].replace(Cp::new(4), 5, "slow");
    docs[2].replace(Cp::new(10), 5, "grey");

    // Before the pump each client only sees its own concurrent edit.
    assert_doc(&docs[0], "The quick brown fox");
    assert_doc(&docs[1], "The slow brown fox");
    assert_doc(&docs[2], "The quick grey fox");

    pump(&mut router, &mut docs);

    for doc in &docs {
        assert_doc(doc, "The slow grey fox");
        doc.check_invariants();
    }
}

#[test]
fn concurrent_edits_same_position() {
    let (mut router, mut docs) = setup(5);

    for (i, letter) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        docs[i].replace(Cp::new(0), 0, letter);
    }

    pump(&mut router, &mut docs);

    // The router's sequence order resolves the conflict identically
    // everywhere.
    for doc in &docs {
        assert_doc(doc, "abcde");
        doc.check_invariants();
    }
}

#[test]
fn concurrent_deletion_and_insert() {
    let (mut router, mut docs) = setup(2);

    docs[0].replace(Cp::new(0), 0, "The quick brown fox");
    pump(&mut router, &mut docs);

    // Client 0 deletes "quick " while client 1 concurrently edits after
    // it; both converge once the deletion is sequenced.
    docs[0].replace(Cp::new(4), 6, "");
    docs[1].replace(Cp::new(16), 3, "dog");

    pump(&mut router, &mut docs);

    assert_eq!(doc_text(&docs[0]), doc_text(&docs[1]));
    assert_doc(&docs[0], "The brown dog");
    for doc in &docs {
        doc.check_invariants();
    }
}

#[test]
fn interleaved_rounds_converge() {
    let (mut router, mut docs) = setup(3);

    docs[0].replace(Cp::new(0), 0, "base");
    pump(&mut router, &mut docs);

    for round in 0..10 {
        let writer = round % 3;
        let cp = Cp::new((round % 4) as i32);
        docs[writer].replace(cp, 1, "xy");
        pump(&mut router, &mut docs);

        let expected = doc_text(&docs[0]);
        for doc in &docs[1..] {
            assert_eq!(doc_text(doc), expected);
        }
    }

    for doc in &docs {
        doc.check_invariants();
    }
}
