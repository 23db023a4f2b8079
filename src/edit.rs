use std::collections::VecDeque;

use crate::block::SegmentIdx;
use crate::position::Adjustment;
use crate::seq::{ClientId, Seq};

/// A stable identity for an [`Edit`], unique within one tree.
///
/// Edits are looked up through their id rather than their sequence number
/// because a local edit's `seq` is overwritten with the router-assigned
/// value when the acknowledgement arrives.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub(crate) struct EditId(u64);

#[cfg(test)]
impl EditId {
    pub(crate) fn first() -> Self {
        EditId(0)
    }
}

/// One logical mutation of the document: the segments it added and
/// tombstoned, and the position adjustment it implies for concurrent
/// operations.
///
/// The segment lists are the "weak" halves of the segment/edit links:
/// they hold arena indices, and settlement clears the matching back
/// references on the segments before the edit is dropped.
#[derive(Debug)]
pub(crate) struct Edit {
    pub(crate) id: EditId,
    pub(crate) seq: Seq,
    pub(crate) client: ClientId,
    pub(crate) segments_added: Vec<SegmentIdx>,
    pub(crate) segments_removed: Vec<SegmentIdx>,
    pub(crate) adjustment: Adjustment,
}

impl Edit {
    fn new(id: EditId, seq: Seq, client: ClientId) -> Self {
        Self {
            id,
            seq,
            client,
            segments_added: Vec::new(),
            segments_removed: Vec::new(),
            adjustment: Adjustment::default(),
        }
    }
}

/// The per-document edit log: pending local edits (labelled with
/// client-sequence numbers, not yet assigned by the router) and the
/// acknowledged backlog, ordered by assigned sequence number.
#[derive(Debug, Default)]
pub(crate) struct EditLog {
    pub(crate) local: VecDeque<Edit>,
    pub(crate) acked: VecDeque<Edit>,
    next_id: u64,
}

impl EditLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin_local(&mut self, seq: Seq, client: ClientId) -> EditId {
        let id = self.mint_id();
        self.local.push_back(Edit::new(id, seq, client));
        id
    }

    pub(crate) fn push_acked(&mut self, seq: Seq, client: ClientId) -> EditId {
        debug_assert!(self.acked.back().map_or(true, |ed| ed.seq < seq));
        let id = self.mint_id();
        self.acked.push_back(Edit::new(id, seq, client));
        id
    }

    /// Moves the oldest pending local edit to the acknowledged queue,
    /// stamping it with its router-assigned sequence number.
    ///
    /// # Panics
    ///
    /// Panics if there is no pending local edit or if the acknowledgement
    /// doesn't match the head of the queue; per-client acknowledgements
    /// arrive in first-in-first-out order.
    pub(crate) fn ack_front(&mut self, client_seq: Seq, server_seq: Seq) {
        let mut edit = self
            .local
            .pop_front()
            .expect("acknowledgement without a pending local edit");
        assert_eq!(
            edit.seq, client_seq,
            "acknowledgement does not match the oldest pending local edit",
        );
        edit.seq = server_seq;
        self.acked.push_back(edit);
    }

    pub(crate) fn get(&self, id: EditId) -> &Edit {
        self.local
            .iter()
            .chain(self.acked.iter())
            .find(|ed| ed.id == id)
            .expect("referenced edit is still live")
    }

    pub(crate) fn get_mut(&mut self, id: EditId) -> &mut Edit {
        self.local
            .iter_mut()
            .chain(self.acked.iter_mut())
            .find(|ed| ed.id == id)
            .expect("referenced edit is still live")
    }

    pub(crate) fn last_acked_seq(&self) -> Option<Seq> {
        self.acked.back().map(|ed| ed.seq)
    }

    pub(crate) fn clear(&mut self) {
        self.local.clear();
        self.acked.clear();
    }

    fn mint_id(&mut self) -> EditId {
        let id = EditId(self.next_id);
        self.next_id += 1;
        id
    }
}
