//! Presence notifications. Keeps room members informed of who is there.
//!
//! Every function here mutates the registry and enqueues the resulting
//! events in one call. The hub runs them under its write lock, so members
//! observe joins and leaves in the order they were processed.

use chrono::Utc;

use crate::connection::ConnectionId;
use crate::protocol::{ScreenShare, ServerEvent};
use crate::registry::{Departure, JoinOutcome, Participant, RoomId, RoomRegistry};

/// Join a room and notify everyone involved.
///
/// The newcomer receives `current-participants` listing every *other*
/// member; the others then receive `participant-joined`. A re-join of the
/// same room only refreshes the newcomer's list.
pub fn announce_join(
    registry: &mut RoomRegistry,
    room_id: RoomId,
    participant: Participant,
) -> JoinOutcome {
    let connection = participant.connection;
    let outcome = registry.join(room_id.clone(), participant);

    if let JoinOutcome::Joined {
        moved_from: Some(departure),
    } = &outcome
    {
        notify_departure(registry, departure);
    }

    let Some(room) = registry.room(&room_id) else {
        return outcome;
    };
    let Some(newcomer) = room.get(connection) else {
        return outcome;
    };

    let others: Vec<_> = room.others(connection).map(Participant::info).collect();
    newcomer
        .outbox
        .deliver(ServerEvent::CurrentParticipants(others));

    if matches!(outcome, JoinOutcome::Joined { .. }) {
        let joined = ServerEvent::ParticipantJoined(newcomer.info());
        for member in room.others(connection) {
            member.outbox.deliver(joined.clone());
        }

        tracing::info!(
            room = %room_id,
            connection = %connection,
            user = %newcomer.user_id,
            members = room.len(),
            "Participant joined video room"
        );
    }

    outcome
}

/// Remove a connection from its room and tell the remaining members.
///
/// Idempotent: a connection that is not in any room produces no events.
pub fn announce_leave(registry: &mut RoomRegistry, connection: ConnectionId) -> Option<Departure> {
    let departure = registry.leave(connection)?;
    notify_departure(registry, &departure);
    Some(departure)
}

fn notify_departure(registry: &RoomRegistry, departure: &Departure) {
    tracing::info!(
        room = %departure.room_id,
        connection = %departure.participant.connection,
        user = %departure.participant.user_id,
        room_closed = departure.room_closed,
        stayed_secs = (Utc::now() - departure.participant.joined_at).num_seconds(),
        "Participant left video room"
    );

    let Some(room) = registry.room(&departure.room_id) else {
        return;
    };
    let left = ServerEvent::ParticipantLeft(departure.participant.info());
    for member in room.participants() {
        member.outbox.deliver(left.clone());
    }
}

/// Record a screen-share state change and tell everyone else in the room.
///
/// Returns `false` if the connection is not in `room_id`.
pub fn announce_screen_share(
    registry: &mut RoomRegistry,
    connection: ConnectionId,
    room_id: &RoomId,
    sharing: bool,
) -> bool {
    if registry.room_of(connection) != Some(room_id) {
        return false;
    }
    if let Some(participant) = registry.participant_mut(connection) {
        participant.screen_sharing = sharing;
    }

    let Some(room) = registry.room(room_id) else {
        return false;
    };
    let notice = ScreenShare { from: connection };
    let event = if sharing {
        ServerEvent::ScreenShareStarted(notice)
    } else {
        ServerEvent::ScreenShareStopped(notice)
    };
    for member in room.others(connection) {
        member.outbox.deliver(event.clone());
    }

    tracing::debug!(room = %room_id, connection = %connection, sharing, "Screen share changed");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::{participant, room};
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn newcomer_gets_others_and_never_its_own_join() {
        let mut registry = RoomRegistry::new();
        let (a, mut ra) = participant("a");
        let (b, mut rb) = participant("b");
        let (a_info, b_info) = (a.info(), b.info());

        announce_join(&mut registry, room("42"), a);
        assert_eq!(drain(&mut ra), vec![ServerEvent::CurrentParticipants(vec![])]);

        announce_join(&mut registry, room("42"), b);
        assert_eq!(drain(&mut ra), vec![ServerEvent::ParticipantJoined(b_info.clone())]);
        assert_eq!(
            drain(&mut rb),
            vec![ServerEvent::CurrentParticipants(vec![a_info])]
        );
    }

    #[test]
    fn rejoin_does_not_rebroadcast() {
        let mut registry = RoomRegistry::new();
        let (a, mut ra) = participant("a");
        let (b, mut rb) = participant("b");
        let b_outbox = b.outbox.clone();
        announce_join(&mut registry, room("1"), a);
        announce_join(&mut registry, room("1"), b);
        drain(&mut ra);
        drain(&mut rb);

        let again = Participant::new("user-b".into(), "b".into(), b_outbox);
        let outcome = announce_join(&mut registry, room("1"), again);

        assert!(matches!(outcome, JoinOutcome::Rejoined));
        assert!(drain(&mut ra).is_empty());
        let events = drain(&mut rb);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ServerEvent::CurrentParticipants(list) if list.len() == 1));
    }

    #[test]
    fn leave_notifies_remaining_members_once() {
        let mut registry = RoomRegistry::new();
        let (a, mut ra) = participant("a");
        let (b, mut rb) = participant("b");
        let (b_id, b_info) = (b.connection, b.info());
        announce_join(&mut registry, room("1"), a);
        announce_join(&mut registry, room("1"), b);
        drain(&mut ra);

        assert!(announce_leave(&mut registry, b_id).is_some());
        assert_eq!(drain(&mut ra), vec![ServerEvent::ParticipantLeft(b_info)]);

        assert!(announce_leave(&mut registry, b_id).is_none());
        assert!(drain(&mut ra).is_empty());
        // The leaver hears nothing about its own departure
        assert!(drain(&mut rb).iter().all(|e| !matches!(e, ServerEvent::ParticipantLeft(_))));
    }

    #[test]
    fn moving_rooms_notifies_the_old_room() {
        let mut registry = RoomRegistry::new();
        let (a, mut ra) = participant("a");
        let (b, mut rb) = participant("b");
        let b_outbox = b.outbox.clone();
        let b_info = b.info();
        announce_join(&mut registry, room("1"), a);
        announce_join(&mut registry, room("1"), b);
        drain(&mut ra);
        drain(&mut rb);

        let moved = Participant::new("user-b".into(), "b".into(), b_outbox);
        announce_join(&mut registry, room("2"), moved);

        assert_eq!(drain(&mut ra), vec![ServerEvent::ParticipantLeft(b_info)]);
        assert_eq!(drain(&mut rb), vec![ServerEvent::CurrentParticipants(vec![])]);
    }

    #[test]
    fn screen_share_reaches_others_and_sticks_for_newcomers() {
        let mut registry = RoomRegistry::new();
        let (a, mut ra) = participant("a");
        let (b, mut rb) = participant("b");
        let a_id = a.connection;
        announce_join(&mut registry, room("1"), a);
        announce_join(&mut registry, room("1"), b);
        drain(&mut ra);
        drain(&mut rb);

        assert!(announce_screen_share(&mut registry, a_id, &room("1"), true));
        assert!(drain(&mut ra).is_empty());
        assert_eq!(
            drain(&mut rb),
            vec![ServerEvent::ScreenShareStarted(ScreenShare { from: a_id })]
        );

        let (c, mut rc) = participant("c");
        announce_join(&mut registry, room("1"), c);
        let events = drain(&mut rc);
        let ServerEvent::CurrentParticipants(list) = &events[0] else {
            panic!("expected participant list");
        };
        assert!(list.iter().any(|p| p.socket_id == a_id && p.screen_sharing));
        assert_eq!(registry.stats().screen_sharing, 1);
    }

    #[test]
    fn screen_share_outside_own_room_is_refused() {
        let mut registry = RoomRegistry::new();
        let (a, _ra) = participant("a");
        let a_id = a.connection;
        announce_join(&mut registry, room("1"), a);
        assert!(!announce_screen_share(&mut registry, a_id, &room("2"), true));
        assert!(!announce_screen_share(&mut registry, crate::connection::ConnectionId::new(), &room("1"), true));
    }
}
