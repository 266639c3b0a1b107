//! Signaling relay. Forwards WebRTC negotiation between two connections.
//!
//! Payloads are opaque: the relay never looks inside an offer, answer or ICE
//! candidate. Signals only travel between members of the same room. Delivery
//! is fire-and-forget. If the target is gone or sits in another room the
//! signal is dropped without telling the sender; the browser's WebRTC stack
//! renegotiates on its own when a peer connection fails to come up.

use crate::connection::ConnectionId;
use crate::protocol::{RelayedAnswer, RelayedIceCandidate, RelayedOffer, ServerEvent};
use crate::registry::RoomRegistry;

/// One negotiation message on its way to a peer.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Offer(serde_json::Value),
    Answer(serde_json::Value),
    IceCandidate(serde_json::Value),
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
        }
    }

    pub fn body(&self) -> &serde_json::Value {
        match self {
            Self::Offer(body) | Self::Answer(body) | Self::IceCandidate(body) => body,
        }
    }

    /// Serialized size of the body, as it will travel on the wire.
    pub fn encoded_len(&self) -> usize {
        serde_json::to_string(self.body()).map_or(0, |s| s.len())
    }

    fn into_event(self, from: ConnectionId) -> ServerEvent {
        match self {
            Self::Offer(offer) => ServerEvent::Offer(RelayedOffer { offer, from }),
            Self::Answer(answer) => ServerEvent::Answer(RelayedAnswer { answer, from }),
            Self::IceCandidate(candidate) => {
                ServerEvent::IceCandidate(RelayedIceCandidate { candidate, from })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    /// Target unknown, gone, or its queue could not take the message.
    Dropped,
}

/// Forward `signal` from `from` to `target`, tagging it with the sender.
///
/// Both ends must be in the same room.
pub fn relay(
    registry: &RoomRegistry,
    from: ConnectionId,
    target: ConnectionId,
    signal: Signal,
) -> RelayOutcome {
    let kind = signal.kind();
    let Some(peer) = registry.participant(target) else {
        tracing::debug!(from = %from, target = %target, kind, "Relay target not connected, dropping");
        return RelayOutcome::Dropped;
    };
    let Some(room) = registry.room_of(from) else {
        tracing::debug!(from = %from, target = %target, kind, "Relay sender not in a room, dropping");
        return RelayOutcome::Dropped;
    };
    if registry.room_of(target) != Some(room) {
        tracing::debug!(from = %from, target = %target, room = %room, kind, "Relay target in another room, dropping");
        return RelayOutcome::Dropped;
    }

    if peer.outbox.deliver(signal.into_event(from)) {
        tracing::trace!(from = %from, target = %target, kind, "Signal relayed");
        RelayOutcome::Delivered
    } else {
        RelayOutcome::Dropped
    }
}
