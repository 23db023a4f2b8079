use crate::block::{Node, SegmentIdx, BLOCK_SIZE};
use crate::block_tree::BlockTree;
use crate::edit::{EditId, EditLog};
use crate::file_table::FileTable;
use crate::iter::Segments;
use crate::message::{Contents, Insert, Message, Remove, SequencedMessage};
use crate::position::{Adjustment, Cp, Stick};
use crate::router::Endpoint;
use crate::segment::Segment;
use crate::seq::{ClientId, Seq};

/// A position resolved to its segment and the residual offset within it;
/// `segment` is `None` past the last character.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) struct CharacterIterator {
    pub(crate) segment: Option<SegmentIdx>,
    pub(crate) offset: u32,
}

impl CharacterIterator {
    fn end() -> Self {
        Self { segment: None, offset: 0 }
    }
}

/// The reconciliation core of a collaboratively edited text document.
///
/// A `MergeTree` indexes the current text as a shallow, high-fanout tree
/// of segments and keeps it converged with every other client editing the
/// same document through a shared router:
///
/// * local mutations enter through [`replace`](Self::replace), which
///   records an edit in the pending queue, mutates the tree, and sends
///   the operation through the endpoint;
///
/// * inbound sequenced messages are drained from the endpoint in total
///   order. Acknowledgements of local edits move them to the acknowledged
///   backlog; remote operations have their positions translated through
///   every intervening edit (the "tardis") before they are applied, after
///   which pending local edits are rebased over them.
///
/// When every client has processed the same prefix of the router's total
/// order, all trees decode to the same character sequence.
///
/// Each message also carries the router's minimum sequence number, below
/// which no operation can ever reference. Edits older than that floor are
/// settled: their insertions become universal and their removals are
/// marked dead, to be physically pruned by
/// [`run_maintenance`](Self::run_maintenance) on an idle tick.
pub struct MergeTree<E: Endpoint> {
    tree: BlockTree,
    edits: EditLog,
    client_seq_next: Seq,
    client_local: ClientId,
    last_delivered: Option<Seq>,
    files: FileTable,
    router: E,
}

impl<E: Endpoint> MergeTree<E> {
    /// Opens an empty document on the given router endpoint.
    pub fn new(router: E) -> Self {
        Self {
            tree: BlockTree::new(),
            edits: EditLog::new(),
            client_seq_next: Seq::new(1000),
            client_local: router.local_client_id(),
            last_delivered: None,
            files: FileTable::new(),
            router,
        }
    }

    /// The position just past the last visible character.
    #[inline]
    pub fn cp_mac(&self) -> Cp {
        Cp::new(self.tree.total_len() as i32)
    }

    /// The run of characters from `cp` to the end of its segment. Walking
    /// runs from zero to [`cp_mac`](Self::cp_mac) reproduces the document.
    ///
    /// # Panics
    ///
    /// Panics if `cp` is out of bounds.
    pub fn fetch(&self, cp: Cp) -> &str {
        assert!(
            cp >= Cp::new(0) && cp < self.cp_mac(),
            "fetch position out of bounds",
        );

        let it = self.find(cp);
        let segment = it.segment.expect("cp is before cp_mac");
        &self.tree.seg(segment).content(&self.files)[it.offset as usize..]
    }

    /// Replaces the range `[cp, cp + dcp)` with `text`, either of which
    /// may be empty. The operation is recorded as a pending local edit and
    /// sent through the router.
    ///
    /// # Panics
    ///
    /// Panics if `dcp` is negative or the range is out of bounds.
    pub fn replace(&mut self, cp: Cp, dcp: i32, text: &str) {
        assert!(dcp >= 0, "dcp must be non-negative");
        assert!(
            cp >= Cp::new(0) && cp + dcp <= self.cp_mac(),
            "replace range out of bounds",
        );

        if dcp == 0 && text.is_empty() {
            return;
        }

        let seq = self.client_seq_next;
        self.client_seq_next = seq.next();
        let edit = self.edits.begin_local(seq, self.client_local);

        self.replace_with_edit(cp, dcp, text, edit);
        self.send_replace_op(cp, dcp, text, edit);
        self.poll_messages();
    }

    /// Bulk initial load: replaces the document with the given segments,
    /// packed bottom-up into a fresh tree. Any edit history is dropped.
    pub fn reload_from_segments(&mut self, segments: Vec<Segment>) {
        self.tree.clear();
        self.edits.clear();

        let mut nodes = Vec::with_capacity(segments.len());
        for segment in segments {
            nodes.push(Node::Segment(self.tree.alloc_segment(segment)));
        }

        let root = self.tree.root;
        self.tree.reload_from_nodes(root, nodes);

        if cfg!(debug_assertions) {
            self.check_invariants();
        }
    }

    /// One idle-time maintenance run; see the arborist. `keep_going` is
    /// consulted between rebuild points and owns termination.
    pub fn run_maintenance(&mut self, keep_going: impl FnMut() -> bool) {
        self.tree.run_arborist(keep_going);
    }

    /// Drains and applies every sequenced message the endpoint has ready.
    pub fn poll_messages(&mut self) {
        while let Some(smsg) = self.router.poll() {
            self.on_message_received(smsg);
        }
    }

    /// Applies one inbound sequenced message. Messages must arrive in
    /// strictly increasing sequence order.
    pub fn on_message_received(&mut self, smsg: SequencedMessage) {
        let seq = smsg.sequence_number;
        if let Some(last) = self.last_delivered {
            assert!(seq > last, "inbound messages must arrive in order");
        }
        self.last_delivered = Some(seq);

        let min_seq = smsg.minimum_sequence_number;
        let client = smsg.client_id;
        let ref_seq = smsg.message.reference_sequence_number;

        if client == self.client_local {
            self.edits.ack_front(smsg.message.client_sequence_number, seq);
        } else {
            match smsg.message.contents {
                Contents::Insert(insert) => {
                    let pos2 = if insert.pos2 == Cp::INVALID {
                        insert.pos1
                    } else {
                        insert.pos2
                    };
                    self.apply_remote(
                        insert.pos1,
                        pos2,
                        &insert.text,
                        seq,
                        client,
                        ref_seq,
                    );
                },
                Contents::Remove(remove) => {
                    self.apply_remote(
                        remove.pos1,
                        remove.pos2,
                        "",
                        seq,
                        client,
                        ref_seq,
                    );
                },
                Contents::Group(_) => {
                    unimplemented!("nested group operations");
                },
            }
        }

        self.clear_old_sequence_numbers(min_seq);
    }

    /// The visible runs of the document, in order.
    pub fn segments(&self) -> Segments<'_> {
        Segments::new(&self.tree, &self.files)
    }

    /// The file table backing this tree's external segments.
    pub fn files(&self) -> &FileTable {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FileTable {
        &mut self.files
    }

    /// Validates the whole tree and the edit log. Debug oracle; every
    /// failure here is a bug in the engine.
    pub fn check_invariants(&self) {
        self.tree.check_invariants();
        debug_assert!(self
            .edits
            .acked
            .iter()
            .zip(self.edits.acked.iter().skip(1))
            .all(|(a, b)| a.seq < b.seq));
    }

    #[doc(hidden)]
    pub fn leaf_runs(&self) -> Vec<(String, bool)> {
        let mut runs = Vec::new();
        let mut current = self.tree.first_raw_segment();
        while let Some(idx) = current {
            let segment = self.tree.seg(idx);
            runs.push((
                segment.content(&self.files).to_owned(),
                segment.is_visible(),
            ));
            current = self.tree.next_raw_segment(idx);
        }
        runs
    }

    #[doc(hidden)]
    pub fn root_depths(&self) -> (u8, u8) {
        let stats = self.tree.block(self.tree.root).stats;
        (stats.depth_min, stats.depth_max)
    }

    #[doc(hidden)]
    pub fn dead_segment_count(&self) -> u32 {
        self.tree.block(self.tree.root).stats.dead_segments
    }

    /// Resolves `cp` to its segment and offset; end-of-document resolves
    /// to the end iterator.
    pub(crate) fn find(&self, cp: Cp) -> CharacterIterator {
        debug_assert!(cp >= Cp::new(0) && cp <= self.cp_mac());

        if cp == self.cp_mac() {
            return CharacterIterator::end();
        }

        let (segment, offset) = self.tree.find_leaf(cp.as_u32());
        CharacterIterator { segment: Some(segment), offset }
    }

    /// Ensures a segment boundary at `cp` and returns the segment starting
    /// there (`None` past the last character).
    fn find_and_split(&mut self, cp: Cp) -> Option<SegmentIdx> {
        let it = self.find(cp);
        let segment = it.segment?;

        if it.offset == 0 {
            return Some(segment);
        }

        debug_assert!(it.offset < self.tree.seg(segment).length);

        let parent = self.tree.seg(segment).parent.expect("segment is in the tree");
        self.tree.ensure_extra_capacity(parent, 1);

        let right = self.split_segment(segment, it.offset);

        // Re-read: growing capacity can have reseated the segment.
        let parent = self.tree.seg(segment).parent.expect("segment is in the tree");
        let index = self.tree.seg(segment).index as usize;
        self.tree.adopt(parent, Node::Segment(right), index + 1, true);

        Some(right)
    }

    /// Splits a segment in place, registering the right half with any edit
    /// that still references the left one so settlement keeps finding it.
    fn split_segment(&mut self, segment: SegmentIdx, offset: u32) -> SegmentIdx {
        let right = self.tree.seg_mut(segment).split_at(offset);
        let added_by = right.added_by;
        let removed_by = right.removed_by;

        let right = self.tree.alloc_segment(right);

        if let Some(edit) = added_by {
            self.edits.get_mut(edit).segments_added.push(right);
        }
        if let Some(edit) = removed_by {
            self.edits.get_mut(edit).segments_removed.push(right);
        }

        right
    }

    fn replace_with_edit(&mut self, cp: Cp, dcp: i32, text: &str, edit: EditId) {
        debug_assert!(dcp >= 0);

        let it_end = self.find_and_split(cp + dcp);

        if dcp > 0 {
            let it_begin = self.find_and_split(cp);

            let mut doomed = Vec::new();
            let mut current = it_begin;
            while current != it_end {
                let idx = current.expect("removal range ends inside the tree");
                doomed.push(idx);
                current = self.tree.next_visible_segment(idx);
            }

            for idx in doomed {
                let segment = self.tree.seg_mut(idx);
                debug_assert!(segment.is_visible());
                segment.removed_by = Some(edit);
                let length = segment.length;
                self.tree
                    .update_parent_lengths(Node::Segment(idx), -(length as i32));
                self.edits.get_mut(edit).segments_removed.push(idx);
            }
        }

        if !text.is_empty() {
            let mut segment = Segment::text(text);
            segment.added_by = Some(edit);
            let new_idx = self.tree.alloc_segment(segment);
            self.edits.get_mut(edit).segments_added.push(new_idx);

            match it_end {
                None => {
                    // Append past the last segment: descend to the
                    // rightmost leaf-bearing block.
                    let mut parent = self.tree.rightmost_leaf_block();
                    if self.tree.block(parent).child_count() == BLOCK_SIZE {
                        // Track the adoptive parent through the split via
                        // its last child, since the split may reseat it.
                        let last_child =
                            self.tree.block(parent).child(BLOCK_SIZE - 1);
                        self.tree.ensure_extra_capacity(parent, 1);
                        parent = self
                            .tree
                            .node_parent(last_child)
                            .expect("child is in the tree");
                    }
                    let at = self.tree.block(parent).child_count();
                    self.tree.adopt(parent, Node::Segment(new_idx), at, false);
                },
                Some(end_segment) => {
                    let parent = self
                        .tree
                        .seg(end_segment)
                        .parent
                        .expect("segment is in the tree");
                    self.tree.ensure_extra_capacity(parent, 1);

                    let parent = self
                        .tree
                        .seg(end_segment)
                        .parent
                        .expect("segment is in the tree");
                    let at = self.tree.seg(end_segment).index as usize;
                    self.tree.adopt(parent, Node::Segment(new_idx), at, false);
                },
            }
        }

        let edit = self.edits.get_mut(edit);
        debug_assert_eq!(edit.adjustment.cp, Cp::INVALID);
        edit.adjustment = Adjustment::new(cp, text.len() as i32 - dcp);
    }

    fn send_replace_op(&mut self, cp: Cp, dcp: i32, text: &str, edit: EditId) {
        let edit = self.edits.get(edit);

        let contents = if !edit.segments_added.is_empty() {
            Contents::Insert(Insert {
                pos1: cp,
                pos2: cp + dcp,
                text: text.to_owned(),
            })
        } else {
            debug_assert!(!edit.segments_removed.is_empty());
            Contents::Remove(Remove { pos1: cp, pos2: cp + dcp })
        };

        self.router.send(Message {
            client_sequence_number: edit.seq,
            reference_sequence_number: self
                .edits
                .last_acked_seq()
                .unwrap_or(Seq::UNIVERSAL),
            contents,
        });
    }

    fn apply_remote(
        &mut self,
        pos1: Cp,
        pos2: Cp,
        text: &str,
        seq: Seq,
        client: ClientId,
        ref_seq: Seq,
    ) {
        let mut cps = [pos1, pos2];
        self.tardis_range_to_server_tip(&mut cps, ref_seq, client);
        self.tardis_server_range_to_local(&mut cps);

        let edit = self.edits.push_acked(seq, client);

        let dcp = cps[1].as_i32() - cps[0].as_i32();
        self.replace_with_edit(cps[0], dcp, text, edit);
        self.rebase_local_edits(cps[1], dcp + text.len() as i32);
    }

    /// The sender composed its positions against the server state at
    /// `ref_seq`; shift them through every acknowledged edit it had not
    /// seen. Edits by the same client are skipped: the sender had already
    /// accounted for its own operations.
    fn tardis_range_to_server_tip(
        &self,
        cps: &mut [Cp; 2],
        ref_seq: Seq,
        client: ClientId,
    ) {
        let acked = &self.edits.acked;
        if acked.is_empty() {
            return;
        }

        let start = acked.partition_point(|edit| edit.seq <= ref_seq);
        debug_assert!(
            start == acked.len() || acked[start].seq == ref_seq.next(),
        );

        for edit in acked.range(start..) {
            if edit.client == client {
                continue;
            }
            cps[0] = edit.adjustment.apply(cps[0], Stick::Right);
            cps[1] = edit.adjustment.apply(cps[1], Stick::Right);
        }
    }

    /// Our own speculative edits were never seen by the sender; apply them
    /// with Left stickiness so the remote positions land before our local
    /// insertions.
    fn tardis_server_range_to_local(&self, cps: &mut [Cp; 2]) {
        for edit in &self.edits.local {
            cps[0] = edit.adjustment.apply(cps[0], Stick::Left);
            cps[1] = edit.adjustment.apply(cps[1], Stick::Left);
        }
    }

    /// Shifts the recorded position of every pending local edit over a
    /// remote edit that was just applied at `[cp0, cp)` inserting
    /// `dcp - (cp - cp0)` characters.
    fn rebase_local_edits(&mut self, cp: Cp, dcp: i32) {
        let adjustment = Adjustment::new(cp, dcp);
        for edit in &mut self.edits.local {
            edit.adjustment.cp =
                adjustment.apply(edit.adjustment.cp, Stick::Right);
        }
    }

    /// Settles every acknowledged edit below the collection floor: its
    /// insertions become universal, its removals become dead and bump the
    /// dead count on every ancestor block.
    fn clear_old_sequence_numbers(&mut self, min_seq: Seq) {
        while self.edits.acked.front().map_or(false, |edit| min_seq > edit.seq)
        {
            let edit = self.edits.acked.pop_front().expect("checked non-empty");

            for idx in edit.segments_added {
                let segment = self.tree.seg_mut(idx);
                debug_assert_eq!(segment.added_by, Some(edit.id));
                segment.added_by = None;
            }

            for idx in edit.segments_removed {
                let segment = self.tree.seg_mut(idx);
                debug_assert_eq!(segment.removed_by, Some(edit.id));
                segment.removed_by = None;
                segment.is_dead = true;

                let mut parent = segment.parent;
                while let Some(block) = parent {
                    self.tree.block_mut(block).stats.dead_segments += 1;
                    parent = self.tree.block(block).parent;
                }
            }
        }
    }
}
