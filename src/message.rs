use crate::position::Cp;
use crate::seq::{ClientId, Seq};

/// An insertion, optionally replacing the range `[pos1, pos2)` first.
/// `pos2 == Cp::INVALID` is treated as `pos2 == pos1` (pure insert).
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Insert {
    pub pos1: Cp,
    pub pos2: Cp,
    pub text: String,
}

/// Removal of the range `[pos1, pos2)`.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Remove {
    pub pos1: Cp,
    pub pos2: Cp,
}

/// A nested batch of operations. Reserved: clients don't produce groups
/// yet and the core rejects them on arrival.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Group {
    pub ops: Vec<Message>,
}

/// The payload of a [`Message`].
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Contents {
    Insert(Insert),
    Remove(Remove),
    Group(Group),
}

/// What a client hands to the router: its own operation label, the last
/// server sequence number it had observed when composing the operation,
/// and the operation itself.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    pub client_sequence_number: Seq,
    pub reference_sequence_number: Seq,
    pub contents: Contents,
}

/// What the router broadcasts to every client, in one total order:
/// the original message stamped with its assigned sequence number, the
/// collection floor, and the sender's identity.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SequencedMessage {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub message: Message,
    pub sequence_number: Seq,
    pub minimum_sequence_number: Seq,
    pub client_id: ClientId,
}
