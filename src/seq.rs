use core::fmt;

/// A sequence number assigned by the router's total order. You can also
/// think of it as a version number.
///
/// The `u32` space is carved into three regions:
///
/// * [`Seq::UNIVERSAL`] marks state that every client has observed;
///
/// * the acknowledged range `[1, LOCAL_FIRST)` is assigned by the router
///   and shared by all clients;
///
/// * the local-speculative range `[LOCAL_FIRST, MAX]` is reserved for
///   edits the router has not acknowledged yet.
///
/// For a local change the lifecycle is: local seq -> sent to the router ->
/// acknowledged seq -> observed by all clients -> universal. Remote changes
/// skip the first hop.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Seq(u32);

impl Seq {
    /// The sequence number of state observed by every client.
    pub const UNIVERSAL: Seq = Seq(0);

    /// The first sequence number the router will never assign.
    pub const LOCAL_FIRST: Seq = Seq(1 << 31);

    /// The largest assignable sequence number.
    pub const MAX: Seq = Seq(u32::MAX - 1);

    /// The distinguished invalid sequence number.
    pub const INVALID: Seq = Seq(u32::MAX);

    #[inline]
    pub const fn new(seq: u32) -> Self {
        Self(seq)
    }

    /// Returns `true` if this sequence number has been assigned by the
    /// router, i.e. if it's below the local-speculative boundary.
    #[inline]
    pub fn is_acked(self) -> bool {
        self < Self::LOCAL_FIRST
    }

    #[inline]
    pub fn next(self) -> Seq {
        Seq(self.0 + 1)
    }
}

impl fmt::Debug for Seq {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if *self == Self::UNIVERSAL {
            write!(f, "Seq(universal)")
        } else if *self == Self::INVALID {
            write!(f, "Seq(invalid)")
        } else {
            write!(f, "Seq({})", self.0)
        }
    }
}

/// An opaque identifier of an editing peer, assigned by the router.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientId(u32);

impl ClientId {
    /// The distinguished "no client" identity.
    pub const NIL: ClientId = ClientId(u32::MAX);

    /// The identity of the local client before the router assigns one.
    pub const LOCAL: ClientId = ClientId(0);

    #[inline]
    pub const fn new(client: u32) -> Self {
        Self(client)
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if *self == Self::NIL {
            write!(f, "ClientId(nil)")
        } else {
            write!(f, "ClientId({})", self.0)
        }
    }
}
