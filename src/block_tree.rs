use crate::block::{
    BlockIdx, MergeBlock, Node, SegmentIdx, Stats, BLOCK_SIZE,
    IDEAL_BLOCK_SIZE,
};
use crate::partial_lengths::PartialLengths;
use crate::segment::Segment;

/// The structural half of the merge tree: an index arena of blocks and
/// segments, plus the operations that keep the child arrays, prefix sums
/// and subtree stats consistent while nodes are adopted, split and
/// rebuilt.
///
/// Nodes address each other by arena index instead of by pointer, so the
/// parent back-links required by the structure don't form ownership
/// cycles. Freed slots are recycled through per-arena free lists.
#[derive(Debug)]
pub(crate) struct BlockTree {
    blocks: Vec<MergeBlock>,
    segments: Vec<Segment>,
    free_blocks: Vec<BlockIdx>,
    free_segments: Vec<SegmentIdx>,
    pub(crate) root: BlockIdx,
}

impl BlockTree {
    pub(crate) fn new() -> Self {
        Self {
            blocks: vec![MergeBlock::new()],
            segments: Vec::new(),
            free_blocks: Vec::new(),
            free_segments: Vec::new(),
            root: BlockIdx(0),
        }
    }

    /// Resets the tree to a single empty root, dropping every node.
    pub(crate) fn clear(&mut self) {
        self.blocks.clear();
        self.segments.clear();
        self.free_blocks.clear();
        self.free_segments.clear();
        self.blocks.push(MergeBlock::new());
        self.root = BlockIdx(0);
    }

    #[inline]
    pub(crate) fn block(&self, idx: BlockIdx) -> &MergeBlock {
        &self.blocks[idx.0]
    }

    #[inline]
    pub(crate) fn block_mut(&mut self, idx: BlockIdx) -> &mut MergeBlock {
        &mut self.blocks[idx.0]
    }

    #[inline]
    pub(crate) fn seg(&self, idx: SegmentIdx) -> &Segment {
        &self.segments[idx.0]
    }

    #[inline]
    pub(crate) fn seg_mut(&mut self, idx: SegmentIdx) -> &mut Segment {
        &mut self.segments[idx.0]
    }

    fn alloc_block(&mut self) -> BlockIdx {
        if let Some(idx) = self.free_blocks.pop() {
            idx
        } else {
            self.blocks.push(MergeBlock::new());
            BlockIdx(self.blocks.len() - 1)
        }
    }

    fn free_block(&mut self, idx: BlockIdx) {
        *self.block_mut(idx) = MergeBlock::new();
        self.free_blocks.push(idx);
    }

    pub(crate) fn alloc_segment(&mut self, segment: Segment) -> SegmentIdx {
        if let Some(idx) = self.free_segments.pop() {
            self.segments[idx.0] = segment;
            idx
        } else {
            self.segments.push(segment);
            SegmentIdx(self.segments.len() - 1)
        }
    }

    pub(crate) fn free_segment(&mut self, idx: SegmentIdx) {
        self.segments[idx.0] = Segment::text("");
        self.free_segments.push(idx);
    }

    /// The visible length of the whole document.
    #[inline]
    pub(crate) fn total_len(&self) -> u32 {
        self.block(self.root).lengths.total()
    }

    /// Descends from the root to the segment containing `offset`, returning
    /// it together with the residual offset inside it.
    pub(crate) fn find_leaf(&self, offset: u32) -> (SegmentIdx, u32) {
        debug_assert!(offset < self.total_len());

        let mut node = Node::Block(self.root);
        let mut offset = offset;

        loop {
            match node {
                Node::Block(idx) => {
                    let block = self.block(idx);
                    debug_assert!(block.child_count() > 0);
                    let res = block.lengths.find(offset);
                    node = block.child(res.index);
                    offset = res.offset;
                },
                Node::Segment(idx) => return (idx, offset),
            }
        }
    }

    #[inline]
    pub(crate) fn node_parent(&self, node: Node) -> Option<BlockIdx> {
        match node {
            Node::Block(idx) => self.block(idx).parent,
            Node::Segment(idx) => self.seg(idx).parent,
        }
    }

    #[inline]
    pub(crate) fn node_index(&self, node: Node) -> u8 {
        match node {
            Node::Block(idx) => self.block(idx).index,
            Node::Segment(idx) => self.seg(idx).index,
        }
    }

    fn place(&mut self, node: Node, parent: BlockIdx, index: u8) {
        match node {
            Node::Block(idx) => {
                let block = self.block_mut(idx);
                block.parent = Some(parent);
                block.index = index;
            },
            Node::Segment(idx) => {
                let seg = self.seg_mut(idx);
                seg.parent = Some(parent);
                seg.index = index;
            },
        }
    }

    fn node_visible_len(&self, node: Node) -> u32 {
        match node {
            Node::Block(idx) => self.block(idx).lengths.total(),
            Node::Segment(idx) => self.seg(idx).visible_len(),
        }
    }

    /// Propagates a visible-length change up the ancestor chain of `node`.
    pub(crate) fn update_parent_lengths(&mut self, node: Node, delta: i32) {
        let mut node = node;
        while let Some(parent) = self.node_parent(node) {
            let index = self.node_index(node) as usize;
            self.block_mut(parent).lengths.update(index, delta);
            node = Node::Block(parent);
        }
    }

    /// Plants `node` at `child_index` of `block`, shifting later children
    /// right.
    ///
    /// `was_split` distinguishes a fresh insertion (the subtree's total
    /// length grows and ancestors must hear about it) from adopting one
    /// half of a child that just split in two (the total is unchanged and
    /// only the local column bookkeeping moves).
    pub(crate) fn adopt(
        &mut self,
        block: BlockIdx,
        node: Node,
        child_index: usize,
        was_split: bool,
    ) {
        let old_count = self.block(block).child_count();
        assert!(child_index <= old_count);
        assert!(old_count < BLOCK_SIZE);

        for i in (child_index..old_count).rev() {
            let moved = self.block_mut(block).children[i]
                .take()
                .expect("occupied child slot");
            self.block_mut(block).children[i + 1] = Some(moved);
            self.place(moved, block, (i + 1) as u8);
        }

        debug_assert!(self.block(block).children[child_index].is_none());
        self.place(node, block, child_index as u8);
        self.block_mut(block).children[child_index] = Some(node);

        if !was_split {
            match node {
                Node::Segment(idx) => {
                    let length = self.seg(idx).length;
                    let lengths = &mut self.block_mut(block).lengths;
                    lengths.insert_column(child_index);
                    lengths.update(child_index, length as i32);
                    self.update_parent_lengths(
                        Node::Block(block),
                        length as i32,
                    );
                },
                Node::Block(_) => {
                    // Adopting a whole block without a split only happens
                    // when the root moves its contents into a new child.
                    debug_assert!(self.block(block).parent.is_none());
                    let lengths = self.recompute_lengths(block);
                    self.block_mut(block).lengths = lengths;
                },
            }
        } else {
            assert!(child_index > 0);
            match node {
                Node::Segment(idx) => {
                    let length = self.seg(idx).length;
                    self.block_mut(block)
                        .lengths
                        .split_column(child_index - 1, length);
                },
                Node::Block(_) => {
                    let lengths = self.recompute_lengths(block);
                    self.block_mut(block).lengths = lengths;
                },
            }
        }

        let stats = self.recompute_stats(block);
        self.block_mut(block).stats = stats;
        self.debug_check_block(block);

        let parent = self.block(block).parent;
        self.refresh_stats_upward(parent);
    }

    /// Moves the upper half of a full block into a new sibling adopted by
    /// the parent, which must have a free slot.
    pub(crate) fn split_block(&mut self, block: BlockIdx) {
        let parent = self.block(block).parent.expect("the root never splits");
        assert!(!self.block(parent).is_full());
        debug_assert!(self.block(block).is_full());

        const SPLIT: usize = BLOCK_SIZE / 2;

        let upper = self.alloc_block();
        for i in SPLIT..BLOCK_SIZE {
            let child = self.block_mut(block).children[i]
                .take()
                .expect("full block");
            self.block_mut(upper).children[i - SPLIT] = Some(child);
            self.place(child, upper, (i - SPLIT) as u8);
        }

        let upper_lengths = self.block_mut(block).lengths.split();
        self.block_mut(upper).lengths = upper_lengths;

        let stats = self.recompute_stats(block);
        self.block_mut(block).stats = stats;
        let stats = self.recompute_stats(upper);
        self.block_mut(upper).stats = stats;

        self.debug_check_block(block);
        self.debug_check_block(upper);

        let index = self.block(block).index as usize;
        self.adopt(parent, Node::Block(upper), index + 1, true);
    }

    /// Makes room for `extra` more children in `block`, splitting it (and
    /// transitively its ancestors) or growing the tree by a level at the
    /// root.
    ///
    /// Splitting can reseat `block` under a new parent, so callers must
    /// re-read parent links afterwards.
    pub(crate) fn ensure_extra_capacity(
        &mut self,
        block: BlockIdx,
        extra: usize,
    ) {
        assert!(extra <= BLOCK_SIZE / 2);

        if extra + self.block(block).child_count() <= BLOCK_SIZE {
            return;
        }

        match self.block(block).parent {
            None => {
                // The root grows the tree by one level: move its contents
                // into a single new child, then split that child.
                let inner = self.alloc_block();
                let count = self.block(block).child_count();
                for i in 0..count {
                    let child = self.block_mut(block).children[i]
                        .take()
                        .expect("occupied child slot");
                    self.block_mut(inner).children[i] = Some(child);
                    self.place(child, inner, i as u8);
                }

                let lengths = self.recompute_lengths(inner);
                self.block_mut(inner).lengths = lengths;
                let stats = self.recompute_stats(inner);
                self.block_mut(inner).stats = stats;

                self.block_mut(block).lengths = PartialLengths::new();
                self.block_mut(block).stats = Stats::default();

                self.adopt(block, Node::Block(inner), 0, false);
                self.split_block(inner);
                self.debug_check_block(block);
            },
            Some(parent) => {
                self.ensure_extra_capacity(parent, 1);
                self.split_block(block);
            },
        }
    }

    /// The deepest block on the rightmost spine that holds (or may hold)
    /// segments; appends past the end of the document land here.
    pub(crate) fn rightmost_leaf_block(&self) -> BlockIdx {
        let mut idx = self.root;
        loop {
            let block = self.block(idx);
            if block.child_count() == 0 || block.child(0).is_leaf() {
                return idx;
            }
            match block.child(block.child_count() - 1) {
                Node::Block(last) => idx = last,
                Node::Segment(_) => unreachable!("mixed child kinds"),
            }
        }
    }

    pub(crate) fn recompute_lengths(
        &self,
        block: BlockIdx,
    ) -> PartialLengths<BLOCK_SIZE> {
        PartialLengths::from_child_lengths(
            self.block(block)
                .occupied()
                .map(|child| self.node_visible_len(child)),
        )
    }

    pub(crate) fn recompute_stats(&self, block: BlockIdx) -> Stats {
        let block = self.block(block);
        let mut stats = Stats::default();
        let mut count = 0;

        match block.children[0] {
            None => {},
            Some(Node::Segment(_)) => {
                stats.depth_min = 1;
                stats.depth_max = 1;
                for child in block.occupied() {
                    count += 1;
                    let Node::Segment(idx) = child else {
                        unreachable!("mixed child kinds");
                    };
                    if self.seg(idx).is_dead {
                        stats.dead_segments += 1;
                    }
                }
            },
            Some(Node::Block(_)) => {
                stats.depth_min = u8::MAX;
                for child in block.occupied() {
                    count += 1;
                    let Node::Block(idx) = child else {
                        unreachable!("mixed child kinds");
                    };
                    let child_stats = self.block(idx).stats;
                    stats.depth_min =
                        stats.depth_min.min(child_stats.depth_min + 1);
                    stats.depth_max =
                        stats.depth_max.max(child_stats.depth_max + 1);
                    stats.dead_segments += child_stats.dead_segments;
                }
            },
        }

        if count < IDEAL_BLOCK_SIZE {
            stats.depth_min = 0;
        }

        stats
    }

    /// Recomputes stats up the ancestor chain, stopping at the first block
    /// whose stats come out unchanged.
    pub(crate) fn refresh_stats_upward(&mut self, from: Option<BlockIdx>) {
        let mut current = from;
        while let Some(idx) = current {
            let stats = self.recompute_stats(idx);
            if stats == self.block(idx).stats {
                break;
            }
            self.block_mut(idx).stats = stats;
            current = self.block(idx).parent;
        }
    }

    /// Overwrites `block`'s children with `nodes`, recomputing its lengths
    /// and stats from scratch. The block's own parent link is untouched.
    pub(crate) fn fill_block(&mut self, block: BlockIdx, nodes: &[Node]) {
        assert!(nodes.len() <= BLOCK_SIZE);

        self.block_mut(block).children = [None; BLOCK_SIZE];
        for (i, &node) in nodes.iter().enumerate() {
            if i > 0 {
                debug_assert_eq!(node.is_leaf(), nodes[i - 1].is_leaf());
            }
            self.block_mut(block).children[i] = Some(node);
            self.place(node, block, i as u8);
        }

        let lengths = self.recompute_lengths(block);
        self.block_mut(block).lengths = lengths;
        let stats = self.recompute_stats(block);
        self.block_mut(block).stats = stats;

        self.debug_check_block(block);
    }

    /// Bottom-up bulk rebuild: packs `nodes` into blocks of [`BLOCK_SIZE`]
    /// and those into parent blocks until everything fits under `target`.
    pub(crate) fn reload_from_nodes(
        &mut self,
        target: BlockIdx,
        mut nodes: Vec<Node>,
    ) {
        while nodes.len() > BLOCK_SIZE {
            let mut packed = Vec::with_capacity(nodes.len() / BLOCK_SIZE + 1);
            for chunk in nodes.chunks(BLOCK_SIZE) {
                let block = self.alloc_block();
                self.fill_block(block, chunk);
                packed.push(Node::Block(block));
            }
            nodes = packed;
        }

        self.fill_block(target, &nodes);
    }

    /// Validates every reachable block: slot occupancy, parent/index back
    /// links, uniform child kinds, and prefix sums and stats against a
    /// from-scratch recomputation.
    pub(crate) fn check_invariants(&self) {
        assert!(self.block(self.root).parent.is_none());

        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            self.check_block(idx);
            for child in self.block(idx).occupied() {
                if let Node::Block(child_idx) = child {
                    stack.push(child_idx);
                }
            }
        }
    }

    fn check_block(&self, idx: BlockIdx) {
        let block = self.block(idx);
        let count = block.child_count();

        for i in 0..count {
            let child = block.children[i].expect("occupied child slot");
            assert_eq!(self.node_parent(child), Some(idx));
            assert_eq!(self.node_index(child) as usize, i);
            if i > 0 {
                assert_eq!(child.is_leaf(), block.child(i - 1).is_leaf());
            }
        }

        for slot in &block.children[count..] {
            assert!(slot.is_none());
        }

        block.lengths.check_invariants();
        assert_eq!(block.lengths, self.recompute_lengths(idx));
        assert_eq!(block.stats, self.recompute_stats(idx));
        assert!(block.stats.depth_max >= block.stats.depth_min);
    }

    #[inline]
    pub(crate) fn debug_check_block(&self, idx: BlockIdx) {
        if cfg!(debug_assertions) {
            self.check_block(idx);
        }
    }

    /// Flattens every segment out of `block`'s subtree in order, freeing
    /// the interior blocks below it and leaving `block` itself empty.
    pub(crate) fn extract_segments(&mut self, block: BlockIdx) -> Vec<Node> {
        fn collect(
            tree: &BlockTree,
            block: BlockIdx,
            segments: &mut Vec<Node>,
            interior: &mut Vec<BlockIdx>,
        ) {
            for child in tree.block(block).occupied() {
                match child {
                    Node::Segment(_) => segments.push(child),
                    Node::Block(idx) => {
                        collect(tree, idx, segments, interior);
                        interior.push(idx);
                    },
                }
            }
        }

        let mut segments = Vec::new();
        let mut interior = Vec::new();
        collect(self, block, &mut segments, &mut interior);

        for idx in interior {
            self.free_block(idx);
        }

        let block = self.block_mut(block);
        block.children = [None; BLOCK_SIZE];
        block.lengths = PartialLengths::new();
        block.stats = Stats::default();

        segments
    }
}
