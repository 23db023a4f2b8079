//! The core of a collaborative text-sequence engine.
//!
//! A [`MergeTree`] indexes a long sequence of characters as a shallow,
//! high-fanout tree of contiguous segments, answering
//! position-to-segment lookups in logarithmic time through incremental
//! prefix sums. Edits never move text around: insertions splice new
//! segments in, removals tombstone existing ones, and a maintenance pass
//! rebalances the tree and reclaims segments once every client has
//! observed their removal.
//!
//! Concurrency is reconciled with operational-transform semantics over a
//! totally ordered log. Clients exchange operations through a router (any
//! implementor of [`Endpoint`]) that assigns sequence numbers; on arrival
//! each remote operation's positions are translated through every edit
//! the sender hadn't observed, so all clients that have processed the
//! same prefix of the log converge on the same text.
//!
//! Two in-process routers are provided for tests and benchmarks:
//! [`LoopbackRouter`] (one client, immediate echo) and
//! [`MultiClientRouter`] (several clients, explicitly pumped).
//!
//! ```
//! use arbor::{Cp, LoopbackRouter, MergeTree, Segment};
//!
//! let mut doc = MergeTree::new(LoopbackRouter::new());
//! doc.reload_from_segments(vec![Segment::text("The fox")]);
//!
//! doc.replace(Cp::new(4), 0, "quick brown ");
//!
//! let text: String = doc.segments().collect();
//! assert_eq!(text, "The quick brown fox");
//! ```

#![deny(rustdoc::broken_intra_doc_links)]

mod arborist;
mod block;
mod block_tree;
mod edit;
mod file_table;
mod iter;
mod message;
mod partial_lengths;
mod position;
mod router;
mod segment;
mod seq;
mod tree;

pub use file_table::{FileNo, FileTable};
pub use iter::Segments;
pub use message::{Contents, Group, Insert, Message, Remove, SequencedMessage};
pub use position::Cp;
pub use router::{Endpoint, LoopbackRouter, MultiClientRouter, RouterEndpoint};
pub use segment::Segment;
pub use seq::{ClientId, Seq};
pub use tree::MergeTree;
