use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::message::{Message, SequencedMessage};
use crate::seq::{ClientId, Seq};

/// A client's handle to the wire: the boundary between the merge tree and
/// whatever transport assigns the total order.
///
/// Delivery is pull-based: the router never calls back into the tree.
/// [`MergeTree`](crate::MergeTree) drains [`poll`](Endpoint::poll) after
/// sending and whenever [`poll_messages`](crate::MergeTree::poll_messages)
/// is called, and requires the polled stream to be in strictly increasing
/// sequence order.
pub trait Endpoint {
    /// The identity the router assigned to this client.
    fn local_client_id(&self) -> ClientId;

    /// Hands a message to the router for sequencing.
    fn send(&mut self, msg: Message);

    /// The next sequenced message ready for delivery, if any.
    fn poll(&mut self) -> Option<SequencedMessage>;
}

/// A single-client router for tests and benchmarks: every sent message is
/// sequenced immediately and echoed back, optionally after a configurable
/// queue length.
///
/// The minimum sequence number tracks the assigned sequence, so each
/// acknowledgement settles everything before it.
#[derive(Debug)]
pub struct LoopbackRouter {
    seq: Seq,
    max_queue_len: usize,
    queue: VecDeque<SequencedMessage>,
}

impl LoopbackRouter {
    pub fn new() -> Self {
        Self::buffering(0)
    }

    /// A loopback that holds up to `max_queue_len` messages before
    /// delivering.
    pub fn buffering(max_queue_len: usize) -> Self {
        Self { seq: Seq::new(0), max_queue_len, queue: VecDeque::new() }
    }
}

impl Default for LoopbackRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Endpoint for LoopbackRouter {
    fn local_client_id(&self) -> ClientId {
        ClientId::new(7)
    }

    fn send(&mut self, msg: Message) {
        let smsg = SequencedMessage {
            sequence_number: self.seq,
            minimum_sequence_number: self.seq,
            client_id: self.local_client_id(),
            message: msg,
        };
        self.seq = self.seq.next();
        self.queue.push_back(smsg);
    }

    fn poll(&mut self) -> Option<SequencedMessage> {
        if self.queue.len() > self.max_queue_len {
            self.queue.pop_front()
        } else {
            None
        }
    }
}

#[derive(Debug)]
struct Bus {
    seq: Seq,
    pending: Vec<SequencedMessage>,
    inboxes: Vec<VecDeque<SequencedMessage>>,
}

/// An in-process router connecting several clients to one monotonic
/// sequence.
///
/// Sent messages buffer on a shared bus until
/// [`pump_messages`](MultiClientRouter::pump_messages) flushes them, at
/// which point every buffered message becomes visible to every endpoint
/// (including the sender's) in order.
#[derive(Debug)]
pub struct MultiClientRouter {
    bus: Rc<RefCell<Bus>>,
}

impl MultiClientRouter {
    pub fn new() -> Self {
        Self {
            bus: Rc::new(RefCell::new(Bus {
                seq: Seq::new(1),
                pending: Vec::new(),
                inboxes: Vec::new(),
            })),
        }
    }

    /// Registers a new client and returns its endpoint.
    pub fn endpoint(&mut self) -> RouterEndpoint {
        let mut bus = self.bus.borrow_mut();
        let slot = bus.inboxes.len();
        bus.inboxes.push(VecDeque::new());
        RouterEndpoint {
            client: ClientId::new(10 + slot as u32),
            slot,
            bus: Rc::clone(&self.bus),
        }
    }

    /// Flushes every buffered message to every endpoint's mailbox.
    pub fn pump_messages(&mut self) {
        let mut bus = self.bus.borrow_mut();
        let pending = std::mem::take(&mut bus.pending);
        for msg in pending {
            for inbox in bus.inboxes.iter_mut() {
                inbox.push_back(msg.clone());
            }
        }
    }
}

impl Default for MultiClientRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// One client's endpoint on a [`MultiClientRouter`].
#[derive(Debug)]
pub struct RouterEndpoint {
    client: ClientId,
    slot: usize,
    bus: Rc<RefCell<Bus>>,
}

impl Endpoint for RouterEndpoint {
    fn local_client_id(&self) -> ClientId {
        self.client
    }

    fn send(&mut self, msg: Message) {
        let mut bus = self.bus.borrow_mut();
        let smsg = SequencedMessage {
            sequence_number: bus.seq,
            minimum_sequence_number: Seq::UNIVERSAL,
            client_id: self.client,
            message: msg,
        };
        bus.seq = bus.seq.next();
        bus.pending.push(smsg);
    }

    fn poll(&mut self) -> Option<SequencedMessage> {
        self.bus.borrow_mut().inboxes[self.slot].pop_front()
    }
}
