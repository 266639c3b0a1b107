//! Wire protocol for the signaling WebSocket.
//!
//! Every text frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Event names and payload fields match what the browser client already
//! speaks (`join-video-room`, `targetId`, `userName`, ...). Frames are parsed
//! once, here, into typed events; anything that does not parse is answered
//! with an `error` event and never reaches the hub.

use chrono::{DateTime, Utc};
use huddle_common::validation::validate_identifier;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::connection::ConnectionId;
use crate::error::SignalError;

/// Client → server events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinVideoRoom(JoinRoom),
    /// Leave the current room but keep the connection open.
    LeaveVideoRoom,
    Offer(OfferRequest),
    Answer(AnswerRequest),
    IceCandidate(IceCandidateRequest),
    StartScreenShare(ScreenShareRequest),
    StopScreenShare(ScreenShareRequest),
    SendChatMessage(ChatRequest),
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self, SignalError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    #[validate(
        length(max = 128, message = "must be at most 128 characters"),
        custom(function = "validate_identifier")
    )]
    pub project_id: String,
    #[validate(
        length(max = 128, message = "must be at most 128 characters"),
        custom(function = "validate_identifier")
    )]
    pub user_id: String,
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub user_name: String,
    /// Session token; required only when identity verification is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRequest {
    pub target_id: ConnectionId,
    pub offer: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub target_id: ConnectionId,
    pub answer: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateRequest {
    pub target_id: ConnectionId,
    pub candidate: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenShareRequest {
    pub project_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub project_id: String,
    pub message: String,
    pub user_name: String,
}

/// Server → client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// First frame on every connection: the client's own handle.
    Connected(Welcome),
    /// Everyone else already in the room, in join order.
    CurrentParticipants(Vec<ParticipantInfo>),
    ParticipantJoined(ParticipantInfo),
    ParticipantLeft(ParticipantInfo),
    Offer(RelayedOffer),
    Answer(RelayedAnswer),
    IceCandidate(RelayedIceCandidate),
    ScreenShareStarted(ScreenShare),
    ScreenShareStopped(ScreenShare),
    NewChatMessage(ChatMessage),
    Error(ErrorPayload),
}

impl ServerEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::CurrentParticipants(_) => "current-participants",
            Self::ParticipantJoined(_) => "participant-joined",
            Self::ParticipantLeft(_) => "participant-left",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::ScreenShareStarted(_) => "screen-share-started",
            Self::ScreenShareStopped(_) => "screen-share-stopped",
            Self::NewChatMessage(_) => "new-chat-message",
            Self::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub socket_id: ConnectionId,
}

/// Public view of a participant; never includes the outbound handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub socket_id: ConnectionId,
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub screen_sharing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedOffer {
    pub offer: serde_json::Value,
    pub from: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedAnswer {
    pub answer: serde_json::Value,
    pub from: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayedIceCandidate {
    pub candidate: serde_json::Value,
    pub from: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenShare {
    pub from: ConnectionId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub message: String,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: u32,
    pub message: String,
}
