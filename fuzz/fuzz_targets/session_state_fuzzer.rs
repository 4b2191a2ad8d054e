//! Fuzz target for the server connection session
//!
//! Prevent a hostile client from reaching an inconsistent membership state
//!
//! # Strategy
//!
//! - Envelope sequences mixing CONNECT, MESSAGE, DISCONNECT and JOINED
//! - Room identifiers drawn from a small pool so mismatches are common
//! - Random aborts (read failures) between envelopes
//!
//! # Invariants
//!
//! - `Join` is emitted at most once per session
//! - `Forward` and `Leave` only ever target the joined room
//! - Every `Join` is matched by exactly one `Leave` once the session closes
//! - A closed session emits no further actions
//! - A violation never changes the session state

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parley_proto::{Envelope, JoinAck, JoinStatus, RoomId};
use parley_server::{ConnectionSession, PeerId, SessionAction};

#[derive(Debug, Clone, Arbitrary)]
enum Step {
    Connect { room: u8 },
    Chat { room: u8, contents: String },
    Disconnect { room: u8 },
    Joined { room: u8 },
    Abort,
}

fn room(id: u8) -> RoomId {
    RoomId::new(format!("room-{}", id % 3))
}

fuzz_target!(|steps: Vec<Step>| {
    let mut session = ConnectionSession::new(PeerId::new(1));
    let mut joined: Option<RoomId> = None;
    let mut joins = 0usize;
    let mut leaves = 0usize;

    for step in steps {
        let was_closed = session.is_closed();
        let before = session.state().clone();

        let actions = match step {
            Step::Abort => session.abort("fuzz"),
            step => {
                let envelope = match step {
                    Step::Connect { room: r } => Envelope::connect("p", room(r)),
                    Step::Chat { room: r, contents } => Envelope::chat("p", room(r), contents),
                    Step::Disconnect { room: r } => Envelope::disconnect("p", room(r)),
                    Step::Joined { room: r } => Envelope::Joined(JoinAck {
                        chat_id: room(r),
                        participants: 1,
                        total_online: 1,
                        status: JoinStatus::Created,
                    }),
                    Step::Abort => unreachable!(),
                };
                match session.handle(envelope) {
                    Ok(actions) => actions,
                    Err(_) => {
                        assert_eq!(session.state(), &before);
                        Vec::new()
                    },
                }
            },
        };

        if was_closed {
            assert!(actions.is_empty());
        }

        for action in actions {
            match action {
                SessionAction::Join { room, .. } => {
                    joins += 1;
                    assert!(joined.is_none());
                    joined = Some(room);
                },
                SessionAction::Forward { room, envelope } => {
                    assert_eq!(Some(&room), joined.as_ref());
                    assert_eq!(envelope.chat_id(), &room);
                },
                SessionAction::Leave { room } => {
                    leaves += 1;
                    assert_eq!(Some(&room), joined.as_ref());
                },
                SessionAction::Close { .. } => assert!(session.is_closed()),
            }
        }
    }

    assert!(joins <= 1);
    if session.is_closed() {
        assert_eq!(joins, leaves);
    }
});
