//! In-room text chat. Messages are stamped, broadcast and forgotten.

use chrono::{DateTime, Utc};

use crate::protocol::{ChatMessage, ServerEvent};
use crate::registry::{RoomId, RoomRegistry};

/// Send a chat message to every current member of `room_id`, sender included.
///
/// Membership is resolved at call time. Returns how many members accepted
/// the message; a missing or empty room yields zero.
pub fn broadcast_chat(
    registry: &RoomRegistry,
    room_id: &RoomId,
    message: String,
    user_name: String,
    timestamp: DateTime<Utc>,
) -> usize {
    let Some(room) = registry.room(room_id) else {
        return 0;
    };

    let event = ServerEvent::NewChatMessage(ChatMessage {
        message,
        user_name,
        timestamp,
    });
    room.participants()
        .into_iter()
        .filter(|member| member.outbox.deliver(event.clone()))
        .count()
}
