//! Room registry for membership tracking and fan-out.
//!
//! Maps each room identifier to the peers currently in it. A room entry is
//! created by its first join and is never removed; an empty room is still a
//! valid entry and the next join reports it as existing.
//!
//! The registry performs no I/O. Each [`Peer`] carries the sending half of
//! its connection's bounded outbound queue, and [`RoomRegistry::broadcast`]
//! only enqueues. A full or closed queue is logged and skipped, so one slow
//! or dead peer cannot stall delivery to the rest of the room.

use std::{collections::HashMap, fmt, net::SocketAddr};

use bytes::Bytes;
use parley_proto::{Envelope, RoomId};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Server-assigned connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    /// Wrap a raw identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// A connected member of a room.
#[derive(Debug, Clone)]
pub struct Peer {
    /// Connection identifier
    pub id: PeerId,
    /// Remote socket address
    pub addr: SocketAddr,
    /// Display name from the peer's `CONNECT`
    pub sender: String,
    outbound: mpsc::Sender<Bytes>,
}

impl Peer {
    /// Create a peer that delivers through `outbound`.
    pub fn new(
        id: PeerId,
        addr: SocketAddr,
        sender: impl Into<String>,
        outbound: mpsc::Sender<Bytes>,
    ) -> Self {
        Self { id, addr, sender: sender.into(), outbound }
    }

    /// Enqueue an encoded envelope without waiting.
    ///
    /// # Errors
    ///
    /// - `TrySendError::Full` if the peer's queue is at capacity
    /// - `TrySendError::Closed` if the peer's writer has exited
    pub fn try_deliver(&self, payload: Bytes) -> Result<(), TrySendError<Bytes>> {
        self.outbound.try_send(payload)
    }
}

/// Result of [`RoomRegistry::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Members in the room after the join, including the joiner
    pub members: usize,
    /// Whether this join created the room entry
    pub created: bool,
}

/// Result of [`RoomRegistry::broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers the envelope was enqueued for
    pub delivered: usize,
    /// Peers skipped because their queue was full or closed
    pub failed: usize,
}

/// Room identifier to member list.
///
/// Not internally synchronized. The server shares one instance behind a
/// single `tokio::sync::Mutex`, which serializes every join, leave and
/// broadcast and so fixes per-room delivery order.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Vec<Peer>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `peer` to `room`, creating the room entry if absent.
    ///
    /// A peer whose id is already a member is not added twice.
    pub fn join(&mut self, room: RoomId, peer: Peer) -> JoinOutcome {
        let created = !self.rooms.contains_key(&room);
        let members = self.rooms.entry(room).or_default();

        if !members.iter().any(|m| m.id == peer.id) {
            members.push(peer);
        }

        JoinOutcome { members: members.len(), created }
    }

    /// Remove `peer` from `room`.
    ///
    /// Returns `true` if a member was removed. Leaving a room one is not in,
    /// or a room that does not exist, is a no-op.
    pub fn leave(&mut self, room: &RoomId, peer: PeerId) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };

        let before = members.len();
        members.retain(|m| m.id != peer);
        members.len() != before
    }

    /// Enqueue `envelope` for every member of `room` except `exclude`.
    ///
    /// The envelope is encoded once and the same bytes are shared by every
    /// recipient.
    pub fn broadcast(
        &self,
        room: &RoomId,
        envelope: &Envelope,
        exclude: Option<PeerId>,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let Some(members) = self.rooms.get(room) else {
            return report;
        };

        let payload = envelope.encode();
        for peer in members.iter().filter(|m| Some(m.id) != exclude) {
            match peer.try_deliver(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        peer = %peer.id,
                        addr = %peer.addr,
                        room = room.short(),
                        "outbound queue full, dropping {}",
                        envelope.type_tag()
                    );
                    report.failed += 1;
                },
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        peer = %peer.id,
                        room = room.short(),
                        "outbound queue closed, skipping"
                    );
                    report.failed += 1;
                },
            }
        }

        report
    }

    /// Members currently in `room`. Zero for unknown rooms.
    pub fn member_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map_or(0, Vec::len)
    }

    /// Members of `room`, in join order.
    pub fn members(&self, room: &RoomId) -> impl Iterator<Item = &Peer> + '_ {
        self.rooms.get(room).into_iter().flatten()
    }

    /// Number of room entries, including empty ones.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Whether `room` has an entry.
    pub fn has_room(&self, room: &RoomId) -> bool {
        self.rooms.contains_key(room)
    }

    /// Members across every room.
    pub fn total_members(&self) -> usize {
        self.rooms.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:5190".parse().unwrap()
    }

    fn peer(id: u64, name: &str) -> (Peer, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(8);
        (Peer::new(PeerId::new(id), addr(), name, tx), rx)
    }

    fn room(name: &str) -> RoomId {
        RoomId::from(name)
    }

    #[test]
    fn join_creates_room_then_appends() {
        let mut registry = RoomRegistry::new();
        let (a, _ra) = peer(1, "a");
        let (b, _rb) = peer(2, "b");

        assert_eq!(registry.join(room("r"), a), JoinOutcome { members: 1, created: true });
        assert_eq!(registry.join(room("r"), b), JoinOutcome { members: 2, created: false });
        assert_eq!(registry.member_count(&room("r")), 2);
        assert_eq!(registry.total_members(), 2);
    }

    #[test]
    fn join_does_not_duplicate_a_peer() {
        let mut registry = RoomRegistry::new();
        let (a, _ra) = peer(1, "a");

        registry.join(room("r"), a.clone());
        assert_eq!(registry.join(room("r"), a).members, 1);
    }

    #[test]
    fn leave_keeps_empty_room_entry() {
        let mut registry = RoomRegistry::new();
        let (a, _ra) = peer(1, "a");
        registry.join(room("r"), a);

        assert!(registry.leave(&room("r"), PeerId::new(1)));
        assert!(registry.has_room(&room("r")));
        assert_eq!(registry.member_count(&room("r")), 0);
        assert_eq!(registry.room_count(), 1);

        let (b, _rb) = peer(2, "b");
        assert_eq!(registry.join(room("r"), b), JoinOutcome { members: 1, created: false });
    }

    #[test]
    fn leave_is_idempotent() {
        let mut registry = RoomRegistry::new();
        let (a, _ra) = peer(1, "a");
        let (b, _rb) = peer(2, "b");
        registry.join(room("r"), a);
        registry.join(room("r"), b);

        assert!(registry.leave(&room("r"), PeerId::new(1)));
        assert!(!registry.leave(&room("r"), PeerId::new(1)));
        assert!(!registry.leave(&room("missing"), PeerId::new(1)));
        assert_eq!(registry.member_count(&room("r")), 1);
        assert!(!registry.has_room(&room("missing")));
    }

    #[test]
    fn broadcast_excludes_sender() {
        let mut registry = RoomRegistry::new();
        let (a, mut ra) = peer(1, "a");
        let (b, mut rb) = peer(2, "b");
        let (c, mut rc) = peer(3, "c");
        for p in [a, b, c] {
            registry.join(room("r"), p);
        }

        let envelope = Envelope::chat("a", room("r"), "token");
        let report = registry.broadcast(&room("r"), &envelope, Some(PeerId::new(1)));

        assert_eq!(report, BroadcastReport { delivered: 2, failed: 0 });
        assert!(ra.try_recv().is_err());
        assert_eq!(Envelope::decode(&rb.try_recv().unwrap()).unwrap(), envelope);
        assert_eq!(Envelope::decode(&rc.try_recv().unwrap()).unwrap(), envelope);
    }

    #[test]
    fn broadcast_stays_inside_the_room() {
        let mut registry = RoomRegistry::new();
        let (a, _ra) = peer(1, "a");
        let (b, mut rb) = peer(2, "b");
        registry.join(room("one"), a);
        registry.join(room("two"), b);

        let report =
            registry.broadcast(&room("one"), &Envelope::chat("a", room("one"), "x"), None);

        assert_eq!(report.delivered, 1);
        assert!(rb.try_recv().is_err());
    }

    #[test]
    fn broadcast_skips_full_and_closed_queues() {
        let mut registry = RoomRegistry::new();
        let (tx_full, _rx_full) = mpsc::channel(1);
        tx_full.try_send(Bytes::from_static(b"backlog")).unwrap();
        let full = Peer::new(PeerId::new(1), addr(), "slow", tx_full);

        let (closed, rx_closed) = peer(2, "gone");
        drop(rx_closed);

        let (live, mut rx_live) = peer(3, "live");

        for p in [full, closed, live] {
            registry.join(room("r"), p);
        }

        let report = registry.broadcast(&room("r"), &Envelope::connect("x", room("r")), None);

        assert_eq!(report, BroadcastReport { delivered: 1, failed: 2 });
        assert!(rx_live.try_recv().is_ok());
    }

    #[test]
    fn broadcast_to_unknown_room_is_empty() {
        let registry = RoomRegistry::new();
        let report = registry.broadcast(&room("r"), &Envelope::connect("x", room("r")), None);

        assert_eq!(report, BroadcastReport::default());
    }

    #[test]
    fn members_preserve_join_order() {
        let mut registry = RoomRegistry::new();
        let (a, _ra) = peer(1, "a");
        let (b, _rb) = peer(2, "b");
        registry.join(room("r"), a);
        registry.join(room("r"), b);

        let names: Vec<_> = registry.members(&room("r")).map(|p| p.sender.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }
}
