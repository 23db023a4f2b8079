use crate::block::{BlockIdx, Node};
use crate::block_tree::BlockTree;

// There are three things worth tidying up during idle time: rebalancing
// the tree, physically removing dead segments, and merging adjacent
// compatible segments. The arborist does the first two.
//
// TODO: merge adjacent segments with identical provenance during rebuild.
impl BlockTree {
    /// One idle-time maintenance run. Each iteration locates the smallest
    /// subtree that is unbalanced or holds dead segments, flattens it,
    /// prunes the dead, and repacks it in place; `keep_going` is consulted
    /// between iterations and owns termination.
    ///
    /// Subtrees holding dead segments are visited first, so any positive
    /// budget reaps all garbage before compaction work starts.
    pub(crate) fn run_arborist(
        &mut self,
        mut keep_going: impl FnMut() -> bool,
    ) {
        while self.needs_maintenance(self.root) && keep_going() {
            let block = self.find_maintenance_point(self.root);

            let nodes = self.extract_segments(block);
            let mut kept = Vec::with_capacity(nodes.len());
            for node in nodes {
                let Node::Segment(idx) = node else {
                    unreachable!("extract_segments only yields segments");
                };
                let segment = self.seg(idx);
                // A dead segment stays put until the edit that inserted it
                // has settled too; its slot must not be recycled while an
                // edit still points at it.
                if segment.is_dead && segment.added_by.is_none() {
                    self.free_segment(idx);
                } else {
                    kept.push(node);
                }
            }

            self.reload_from_nodes(block, kept);

            let parent = self.block(block).parent;
            self.refresh_stats_upward(parent);
        }
    }

    fn needs_maintenance(&self, block: BlockIdx) -> bool {
        let block = self.block(block);
        block.is_unbalanced() || block.stats.dead_segments > 0
    }

    /// Descends to the smallest subtree that still needs work, so each
    /// pass rewrites as little of the tree as possible while making
    /// progress.
    fn find_maintenance_point(&self, idx: BlockIdx) -> BlockIdx {
        debug_assert!(self.needs_maintenance(idx));

        let block = self.block(idx);

        match block.children[0] {
            None | Some(Node::Segment(_)) => return idx,
            Some(Node::Block(_)) => {},
        }

        if block.stats.dead_segments > 0 {
            for child in block.occupied() {
                let Node::Block(child_idx) = child else {
                    unreachable!("mixed child kinds");
                };
                if self.block(child_idx).stats.dead_segments > 0 {
                    return self.find_maintenance_point(child_idx);
                }
            }
            unreachable!("dead segments aggregate from some child");
        }

        for child in block.occupied() {
            let Node::Block(child_idx) = child else {
                unreachable!("mixed child kinds");
            };
            if self.block(child_idx).is_unbalanced() {
                return self.find_maintenance_point(child_idx);
            }
        }

        idx
    }
}
