//! Room registry: tracks which connections are in which video room.
//!
//! Two indexes for fast lookups, mirroring each other:
//! - `rooms`: room_id → Room (quick "who's in this room?")
//! - `by_connection`: connection_id → room_id (quick "where is this connection?")
//!
//! A connection is in at most one room, and a room exists only while it has
//! participants. The registry itself is plain data with no locking; the hub
//! owns it behind a single lock so a mutation and its notifications happen
//! as one step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::connection::{ConnectionId, Outbox};
use crate::protocol::ParticipantInfo;

/// Room identifier: a fixed prefix plus the project id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn for_project(prefix: &str, project_id: &str) -> Self {
        Self(format!("{prefix}{project_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One connection's presence in a room.
#[derive(Debug, Clone)]
pub struct Participant {
    pub connection: ConnectionId,
    pub user_id: String,
    pub user_name: String,
    pub screen_sharing: bool,
    pub joined_at: DateTime<Utc>,
    pub outbox: Outbox,
    /// Registry-wide join counter, used to list participants in join order.
    seq: u64,
}

impl Participant {
    pub fn new(user_id: String, user_name: String, outbox: Outbox) -> Self {
        Self {
            connection: outbox.connection(),
            user_id,
            user_name,
            screen_sharing: false,
            joined_at: Utc::now(),
            outbox,
            seq: 0,
        }
    }

    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            socket_id: self.connection,
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            screen_sharing: self.screen_sharing,
        }
    }
}

/// A video room corresponding to one project.
#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    pub created_at: DateTime<Utc>,
    participants: HashMap<ConnectionId, Participant>,
}

impl Room {
    fn new(id: RoomId) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            participants: HashMap::new(),
        }
    }

    /// Participants in join order.
    pub fn participants(&self) -> Vec<&Participant> {
        let mut members: Vec<&Participant> = self.participants.values().collect();
        members.sort_by_key(|p| p.seq);
        members
    }

    /// Everyone except `connection`, in join order.
    pub fn others(&self, connection: ConnectionId) -> impl Iterator<Item = &Participant> {
        self.participants()
            .into_iter()
            .filter(move |p| p.connection != connection)
    }

    pub fn get(&self, connection: ConnectionId) -> Option<&Participant> {
        self.participants.get(&connection)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

/// A connection removed from a room.
#[derive(Debug, Clone)]
pub struct Departure {
    pub room_id: RoomId,
    pub participant: Participant,
    /// The room became empty and was pruned.
    pub room_closed: bool,
}

#[derive(Debug, Clone)]
pub enum JoinOutcome {
    /// Newly added to the room. `moved_from` is set when the connection had
    /// to leave another room first.
    Joined { moved_from: Option<Departure> },
    /// Already in this room; metadata was refreshed.
    Rejoined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub active_rooms: usize,
    pub total_participants: usize,
    pub screen_sharing: usize,
}

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    by_connection: HashMap<ConnectionId, RoomId>,
    next_seq: u64,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant to a room, creating the room if needed.
    ///
    /// A connection already in a different room is moved out of it first.
    pub fn join(&mut self, room_id: RoomId, mut participant: Participant) -> JoinOutcome {
        let connection = participant.connection;

        if self.by_connection.get(&connection) == Some(&room_id) {
            if let Some(existing) = self
                .rooms
                .get_mut(&room_id)
                .and_then(|room| room.participants.get_mut(&connection))
            {
                existing.user_id = participant.user_id;
                existing.user_name = participant.user_name;
                existing.outbox = participant.outbox;
                return JoinOutcome::Rejoined;
            }
        }

        let moved_from = self.leave(connection);

        self.next_seq += 1;
        participant.seq = self.next_seq;

        let room = self.rooms.entry(room_id.clone()).or_insert_with(|| {
            tracing::debug!(room = %room_id, "Room created");
            Room::new(room_id.clone())
        });
        room.participants.insert(connection, participant);
        self.by_connection.insert(connection, room_id);

        JoinOutcome::Joined { moved_from }
    }

    /// Remove a connection from whatever room it is in. Unknown connections
    /// are a no-op.
    pub fn leave(&mut self, connection: ConnectionId) -> Option<Departure> {
        let room_id = self.by_connection.remove(&connection)?;
        let room = self.rooms.get_mut(&room_id)?;
        let participant = room.participants.remove(&connection)?;

        let room_closed = room.is_empty();
        if room_closed {
            let lifetime_secs = (Utc::now() - room.created_at).num_seconds();
            self.rooms.remove(&room_id);
            tracing::debug!(room = %room_id, lifetime_secs, "Room closed");
        }

        Some(Departure {
            room_id,
            participant,
            room_closed,
        })
    }

    /// Snapshot of a room's members in join order; empty if the room does not exist.
    pub fn list_participants(&self, room_id: &RoomId) -> Vec<ParticipantInfo> {
        self.rooms
            .get(room_id)
            .map(|room| room.participants().into_iter().map(Participant::info).collect())
            .unwrap_or_default()
    }

    pub fn room(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_of(&self, connection: ConnectionId) -> Option<&RoomId> {
        self.by_connection.get(&connection)
    }

    pub fn participant(&self, connection: ConnectionId) -> Option<&Participant> {
        let room_id = self.by_connection.get(&connection)?;
        self.rooms.get(room_id)?.get(connection)
    }

    pub fn participant_mut(&mut self, connection: ConnectionId) -> Option<&mut Participant> {
        let room_id = self.by_connection.get(&connection)?;
        self.rooms.get_mut(room_id)?.participants.get_mut(&connection)
    }

    pub fn contains_room(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn participant_count(&self) -> usize {
        self.by_connection.len()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_rooms: self.rooms.len(),
            total_participants: self.by_connection.len(),
            screen_sharing: self
                .rooms
                .values()
                .flat_map(|room| room.participants.values())
                .filter(|p| p.screen_sharing)
                .count(),
        }
    }
}
