//! Signal hub, the single owner of the room registry.
//!
//! Every connection task holds a clone of the hub and hands it parsed client
//! events. The registry sits behind one lock. Anything that mutates a room or
//! fans out to more than one member (join, leave, screen share, chat) takes
//! it for writing, so every member of a room sees those events in the same
//! order. Relays go to a single target and only need a read. Fan-out only
//! enqueues (it never awaits a socket), so one slow client cannot stall a
//! room.

use chrono::Utc;
use huddle_common::auth::verify_identity;
use huddle_common::config::AppConfig;
use huddle_common::validation::validate_request;
use huddle_common::HuddleError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::chat::broadcast_chat;
use crate::connection::{ConnectionId, ConnectionState, Outbox};
use crate::error::SignalError;
use crate::presence::{announce_join, announce_leave, announce_screen_share};
use crate::protocol::{ChatRequest, ClientEvent, JoinRoom, ParticipantInfo, ServerEvent};
use crate::registry::{Departure, Participant, RegistryStats, RoomId, RoomRegistry};
use crate::relay::{relay, RelayOutcome, Signal};

/// Tunables for the signaling layer, derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct SignalSettings {
    pub room_prefix: String,
    pub outbox_capacity: usize,
    pub heartbeat_interval: Duration,
    pub idle_timeout: Duration,
    pub max_frame_bytes: usize,
    pub max_signal_bytes: usize,
    pub max_chat_length: usize,
    /// Zero disables the cap.
    pub max_participants_per_room: usize,
    /// When set, joins must present a session token for the asserted user.
    pub jwt_secret: Option<String>,
}

impl SignalSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            room_prefix: config.signaling.room_prefix.clone(),
            outbox_capacity: config.signaling.outbox_capacity,
            heartbeat_interval: Duration::from_secs(config.signaling.heartbeat_interval_secs),
            idle_timeout: Duration::from_secs(config.signaling.idle_timeout_secs),
            max_frame_bytes: config.signaling.max_frame_bytes,
            max_signal_bytes: config.limits.max_signal_bytes,
            max_chat_length: config.limits.max_chat_length,
            max_participants_per_room: config.limits.max_participants_per_room,
            jwt_secret: config
                .auth
                .jwt_secret
                .clone()
                .filter(|secret| !secret.is_empty()),
        }
    }
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            room_prefix: "video-room-".into(),
            outbox_capacity: 256,
            heartbeat_interval: Duration::from_secs(25),
            idle_timeout: Duration::from_secs(60),
            max_frame_bytes: 64 * 1024,
            max_signal_bytes: 32 * 1024,
            max_chat_length: 2000,
            max_participants_per_room: 50,
            jwt_secret: None,
        }
    }
}

#[derive(Clone)]
pub struct SignalHub {
    registry: Arc<RwLock<RoomRegistry>>,
    settings: Arc<SignalSettings>,
}

impl SignalHub {
    pub fn new(settings: SignalSettings) -> Self {
        Self {
            registry: Arc::new(RwLock::new(RoomRegistry::new())),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &SignalSettings {
        &self.settings
    }

    pub fn room_for_project(&self, project_id: &str) -> RoomId {
        RoomId::for_project(&self.settings.room_prefix, project_id)
    }

    /// Outbound queue for a freshly accepted connection.
    pub fn open_outbox(&self, connection: ConnectionId) -> (Outbox, mpsc::Receiver<ServerEvent>) {
        Outbox::channel(connection, self.settings.outbox_capacity)
    }

    /// Route one parsed client event. Returns the connection's state afterwards.
    pub async fn dispatch(
        &self,
        outbox: &Outbox,
        event: ClientEvent,
    ) -> Result<ConnectionState, SignalError> {
        let connection = outbox.connection();
        match event {
            ClientEvent::JoinVideoRoom(request) => {
                self.join(outbox.clone(), request).await?;
            }
            ClientEvent::LeaveVideoRoom => {
                self.leave(connection).await;
            }
            ClientEvent::Offer(request) => {
                self.relay(connection, request.target_id, Signal::Offer(request.offer))
                    .await?;
            }
            ClientEvent::Answer(request) => {
                self.relay(connection, request.target_id, Signal::Answer(request.answer))
                    .await?;
            }
            ClientEvent::IceCandidate(request) => {
                self.relay(
                    connection,
                    request.target_id,
                    Signal::IceCandidate(request.candidate),
                )
                .await?;
            }
            ClientEvent::StartScreenShare(request) => {
                self.screen_share(connection, &request.project_id, true).await?;
            }
            ClientEvent::StopScreenShare(request) => {
                self.screen_share(connection, &request.project_id, false).await?;
            }
            ClientEvent::SendChatMessage(request) => {
                self.chat(connection, request).await?;
            }
        }
        Ok(self.state_of(connection).await)
    }

    /// Join the room for `request.project_id`.
    pub async fn join(&self, outbox: Outbox, request: JoinRoom) -> Result<RoomId, SignalError> {
        validate_request(&request)?;
        if let Some(secret) = &self.settings.jwt_secret {
            verify_identity(request.token.as_deref(), secret, &request.user_id)?;
        }

        let room_id = self.room_for_project(&request.project_id);
        let limit = self.settings.max_participants_per_room;

        let mut registry = self.registry.write().await;
        if let Some(room) = registry.room(&room_id) {
            let already_member = room.get(outbox.connection()).is_some();
            if limit > 0 && !already_member && room.len() >= limit {
                return Err(HuddleError::LimitReached {
                    message: format!("Room {room_id} is full ({limit} participants)"),
                }
                .into());
            }
        }

        let participant = Participant::new(request.user_id, request.user_name, outbox);
        announce_join(&mut registry, room_id.clone(), participant);
        Ok(room_id)
    }

    /// Leave the current room, if any. Safe to call repeatedly.
    pub async fn leave(&self, connection: ConnectionId) -> Option<Departure> {
        let mut registry = self.registry.write().await;
        announce_leave(&mut registry, connection)
    }

    /// Transport closed: always clean up, whatever state the connection was in.
    pub async fn disconnect(&self, connection: ConnectionId) -> Option<Departure> {
        let departure = self.leave(connection).await;
        tracing::debug!(
            connection = %connection,
            room = ?departure.as_ref().map(|d| d.room_id.as_str()),
            "Connection cleaned up"
        );
        departure
    }

    pub async fn relay(
        &self,
        from: ConnectionId,
        target: ConnectionId,
        signal: Signal,
    ) -> Result<RelayOutcome, SignalError> {
        let size = signal.encoded_len();
        if size > self.settings.max_signal_bytes {
            return Err(SignalError::PayloadTooLarge {
                size,
                limit: self.settings.max_signal_bytes,
            });
        }

        let registry = self.registry.read().await;
        if registry.room_of(from).is_none() {
            return Err(SignalError::NotInRoom);
        }
        Ok(relay(&registry, from, target, signal))
    }

    pub async fn screen_share(
        &self,
        from: ConnectionId,
        project_id: &str,
        sharing: bool,
    ) -> Result<(), SignalError> {
        let room_id = self.room_for_project(project_id);
        let mut registry = self.registry.write().await;
        if announce_screen_share(&mut registry, from, &room_id, sharing) {
            Ok(())
        } else {
            Err(SignalError::NotInRoom)
        }
    }

    /// Broadcast a chat message; returns the number of deliveries.
    pub async fn chat(&self, from: ConnectionId, request: ChatRequest) -> Result<usize, SignalError> {
        if request.message.trim().is_empty() {
            return Err(HuddleError::Validation {
                message: "message must not be empty".into(),
            }
            .into());
        }
        let limit = self.settings.max_chat_length;
        if request.message.chars().count() > limit {
            return Err(HuddleError::Validation {
                message: format!("message must be at most {limit} characters"),
            }
            .into());
        }

        let room_id = self.room_for_project(&request.project_id);
        let registry = self.registry.write().await;
        if registry.room_of(from) != Some(&room_id) {
            return Err(SignalError::NotInRoom);
        }
        // A verified sender chats under the name it joined with
        let user_name = match (&self.settings.jwt_secret, registry.participant(from)) {
            (Some(_), Some(sender)) => sender.user_name.clone(),
            _ => request.user_name,
        };
        Ok(broadcast_chat(
            &registry,
            &room_id,
            request.message,
            user_name,
            Utc::now(),
        ))
    }

    pub async fn list_participants(&self, room_id: &RoomId) -> Vec<ParticipantInfo> {
        self.registry.read().await.list_participants(room_id)
    }

    pub async fn contains_room(&self, room_id: &RoomId) -> bool {
        self.registry.read().await.contains_room(room_id)
    }

    pub async fn state_of(&self, connection: ConnectionId) -> ConnectionState {
        match self.registry.read().await.room_of(connection) {
            Some(room_id) => ConnectionState::InRoom(room_id.clone()),
            None => ConnectionState::Connected,
        }
    }

    pub async fn stats(&self) -> RegistryStats {
        self.registry.read().await.stats()
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new(SignalSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{OfferRequest, ScreenShareRequest};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    struct Client {
        outbox: Outbox,
        rx: mpsc::Receiver<ServerEvent>,
    }

    impl Client {
        fn new(hub: &SignalHub) -> Self {
            let (outbox, rx) = hub.open_outbox(ConnectionId::new());
            Self { outbox, rx }
        }

        fn id(&self) -> ConnectionId {
            self.outbox.connection()
        }

        fn drain(&mut self) -> Vec<ServerEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.rx.try_recv() {
                events.push(event);
            }
            events
        }
    }

    fn join_request(project: &str, user: &str) -> ClientEvent {
        ClientEvent::JoinVideoRoom(JoinRoom {
            project_id: project.into(),
            user_id: format!("id-{user}"),
            user_name: user.into(),
            token: None,
        })
    }

    fn token_for(secret: &str, id: &str) -> String {
        let now = Utc::now().timestamp();
        encode(
            &Header::default(),
            &huddle_common::auth::Claims {
                id: id.into(),
                iat: now,
                exp: now + 600,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn info(client: &Client, user: &str) -> ParticipantInfo {
        ParticipantInfo {
            socket_id: client.id(),
            user_id: format!("id-{user}"),
            user_name: user.into(),
            screen_sharing: false,
        }
    }

    #[tokio::test]
    async fn two_clients_join_then_one_disconnects() {
        let hub = SignalHub::default();
        let room = hub.room_for_project("42");
        assert_eq!(room.as_str(), "video-room-42");

        let mut a = Client::new(&hub);
        let state = hub.dispatch(&a.outbox, join_request("42", "alice")).await.unwrap();
        assert_eq!(state, ConnectionState::InRoom(room.clone()));
        assert_eq!(a.drain(), vec![ServerEvent::CurrentParticipants(vec![])]);

        let mut b = Client::new(&hub);
        hub.dispatch(&b.outbox, join_request("42", "bob")).await.unwrap();
        assert_eq!(a.drain(), vec![ServerEvent::ParticipantJoined(info(&b, "bob"))]);
        assert_eq!(
            b.drain(),
            vec![ServerEvent::CurrentParticipants(vec![info(&a, "alice")])]
        );

        hub.disconnect(b.id()).await;
        assert_eq!(a.drain(), vec![ServerEvent::ParticipantLeft(info(&b, "bob"))]);
        assert_eq!(hub.list_participants(&room).await, vec![info(&a, "alice")]);

        // Second cleanup for the same connection is silent
        assert!(hub.disconnect(b.id()).await.is_none());
        assert!(a.drain().is_empty());

        hub.disconnect(a.id()).await;
        assert!(!hub.contains_room(&room).await);
    }

    #[tokio::test]
    async fn malformed_join_is_rejected_without_creating_a_room() {
        let hub = SignalHub::default();
        let a = Client::new(&hub);
        let err = hub.dispatch(&a.outbox, join_request("", "alice")).await.unwrap_err();
        assert_eq!(err.code(), 4001);
        assert_eq!(hub.stats().await.active_rooms, 0);
        assert_eq!(hub.state_of(a.id()).await, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn explicit_leave_returns_to_connected() {
        let hub = SignalHub::default();
        let a = Client::new(&hub);
        hub.dispatch(&a.outbox, join_request("7", "alice")).await.unwrap();
        let state = hub.dispatch(&a.outbox, ClientEvent::LeaveVideoRoom).await.unwrap();
        assert_eq!(state, ConnectionState::Connected);
        assert_eq!(hub.stats().await.total_participants, 0);
    }

    #[tokio::test]
    async fn relay_requires_sender_in_room_and_respects_size_limit() {
        let hub = SignalHub::new(SignalSettings {
            max_signal_bytes: 16,
            ..SignalSettings::default()
        });
        let mut a = Client::new(&hub);
        let mut b = Client::new(&hub);

        let offer = ClientEvent::Offer(OfferRequest {
            target_id: b.id(),
            offer: json!({"sdp": "x"}),
        });
        let err = hub.dispatch(&a.outbox, offer.clone()).await.unwrap_err();
        assert!(matches!(err, SignalError::NotInRoom));

        hub.dispatch(&a.outbox, join_request("1", "alice")).await.unwrap();
        hub.dispatch(&b.outbox, join_request("1", "bob")).await.unwrap();
        a.drain();
        b.drain();

        hub.dispatch(&a.outbox, offer).await.unwrap();
        assert!(matches!(&b.drain()[..], [ServerEvent::Offer(o)] if o.from == a.id()));

        let oversized = ClientEvent::Offer(OfferRequest {
            target_id: b.id(),
            offer: json!({"sdp": "this body is far too long"}),
        });
        let err = hub.dispatch(&a.outbox, oversized).await.unwrap_err();
        assert_eq!(err.code(), 4013);
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn relay_to_unknown_target_is_not_an_error() {
        let hub = SignalHub::default();
        let a = Client::new(&hub);
        hub.dispatch(&a.outbox, join_request("1", "alice")).await.unwrap();
        let outcome = hub
            .relay(a.id(), ConnectionId::new(), Signal::Answer(json!({})))
            .await
            .unwrap();
        assert_eq!(outcome, RelayOutcome::Dropped);
    }

    #[tokio::test]
    async fn relay_does_not_cross_rooms() {
        let hub = SignalHub::default();
        let a = Client::new(&hub);
        let mut b = Client::new(&hub);
        hub.dispatch(&a.outbox, join_request("1", "alice")).await.unwrap();
        hub.dispatch(&b.outbox, join_request("2", "bob")).await.unwrap();
        b.drain();

        let offer = ClientEvent::Offer(OfferRequest {
            target_id: b.id(),
            offer: json!({"sdp": "x"}),
        });
        hub.dispatch(&a.outbox, offer).await.unwrap();
        assert!(b.drain().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_chat_reaches_every_member_in_one_order() {
        const SENDERS: usize = 8;
        const PER_SENDER: usize = 50;
        let hub = SignalHub::new(SignalSettings {
            outbox_capacity: SENDERS * PER_SENDER + 16,
            ..SignalSettings::default()
        });

        let mut members: Vec<Client> = (0..20).map(|_| Client::new(&hub)).collect();
        for (i, member) in members.iter().enumerate() {
            hub.dispatch(&member.outbox, join_request("1", &format!("user{i}")))
                .await
                .unwrap();
        }
        for member in &mut members {
            member.drain();
        }

        let senders: Vec<ConnectionId> = members[..SENDERS].iter().map(Client::id).collect();
        let tasks: Vec<_> = senders
            .into_iter()
            .enumerate()
            .map(|(s, id)| {
                let hub = hub.clone();
                tokio::spawn(async move {
                    for n in 0..PER_SENDER {
                        let request = ChatRequest {
                            project_id: "1".into(),
                            message: format!("{s}-{n}"),
                            user_name: format!("user{s}"),
                        };
                        hub.chat(id, request).await.unwrap();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let sequences: Vec<Vec<String>> = members
            .iter_mut()
            .map(|member| {
                member
                    .drain()
                    .into_iter()
                    .filter_map(|event| match event {
                        ServerEvent::NewChatMessage(msg) => Some(msg.message),
                        _ => None,
                    })
                    .collect()
            })
            .collect();
        assert_eq!(sequences[0].len(), SENDERS * PER_SENDER);
        assert!(sequences.iter().all(|seq| seq == &sequences[0]));
    }

    #[tokio::test]
    async fn verified_sender_chats_under_joined_name() {
        let secret = "shared-secret";
        let hub = SignalHub::new(SignalSettings {
            jwt_secret: Some(secret.into()),
            ..SignalSettings::default()
        });
        let mut a = Client::new(&hub);
        let join = JoinRoom {
            project_id: "1".into(),
            user_id: "id-alice".into(),
            user_name: "alice".into(),
            token: Some(token_for(secret, "id-alice")),
        };
        hub.join(a.outbox.clone(), join).await.unwrap();
        a.drain();

        let request = ChatRequest {
            project_id: "1".into(),
            message: "hi".into(),
            user_name: "mallory".into(),
        };
        hub.chat(a.id(), request).await.unwrap();
        assert!(matches!(&a.drain()[..], [ServerEvent::NewChatMessage(m)] if m.user_name == "alice"));
    }

    #[tokio::test]
    async fn chat_goes_to_members_including_sender() {
        let hub = SignalHub::default();
        let mut a = Client::new(&hub);
        let mut b = Client::new(&hub);
        let mut outsider = Client::new(&hub);
        hub.dispatch(&a.outbox, join_request("1", "alice")).await.unwrap();
        hub.dispatch(&b.outbox, join_request("1", "bob")).await.unwrap();
        a.drain();
        b.drain();

        let request = ChatRequest {
            project_id: "1".into(),
            message: "standup in 5".into(),
            user_name: "alice".into(),
        };
        assert_eq!(hub.chat(a.id(), request.clone()).await.unwrap(), 2);
        assert!(matches!(&a.drain()[..], [ServerEvent::NewChatMessage(m)] if m.message == "standup in 5"));
        assert!(matches!(&b.drain()[..], [ServerEvent::NewChatMessage(m)] if m.user_name == "alice"));

        let err = hub.chat(outsider.id(), request).await.unwrap_err();
        assert!(matches!(err, SignalError::NotInRoom));
        assert!(outsider.drain().is_empty());
    }

    #[tokio::test]
    async fn chat_rejects_blank_and_oversized_messages() {
        let hub = SignalHub::new(SignalSettings {
            max_chat_length: 4,
            ..SignalSettings::default()
        });
        let a = Client::new(&hub);
        hub.dispatch(&a.outbox, join_request("1", "alice")).await.unwrap();

        for message in ["   ", "hello"] {
            let request = ChatRequest {
                project_id: "1".into(),
                message: message.into(),
                user_name: "alice".into(),
            };
            assert_eq!(hub.chat(a.id(), request).await.unwrap_err().code(), 4001);
        }
    }

    #[tokio::test]
    async fn screen_share_requires_membership() {
        let hub = SignalHub::default();
        let mut a = Client::new(&hub);
        let mut b = Client::new(&hub);
        hub.dispatch(&a.outbox, join_request("1", "alice")).await.unwrap();
        hub.dispatch(&b.outbox, join_request("1", "bob")).await.unwrap();
        a.drain();
        b.drain();

        let start = ClientEvent::StartScreenShare(ScreenShareRequest {
            project_id: "1".into(),
        });
        hub.dispatch(&a.outbox, start).await.unwrap();
        assert!(matches!(&b.drain()[..], [ServerEvent::ScreenShareStarted(s)] if s.from == a.id()));

        let elsewhere = ClientEvent::StopScreenShare(ScreenShareRequest {
            project_id: "2".into(),
        });
        assert!(matches!(
            hub.dispatch(&a.outbox, elsewhere).await,
            Err(SignalError::NotInRoom)
        ));
    }

    #[tokio::test]
    async fn full_room_refuses_newcomers_but_not_members() {
        let hub = SignalHub::new(SignalSettings {
            max_participants_per_room: 1,
            ..SignalSettings::default()
        });
        let a = Client::new(&hub);
        let b = Client::new(&hub);
        hub.dispatch(&a.outbox, join_request("1", "alice")).await.unwrap();

        let err = hub.dispatch(&b.outbox, join_request("1", "bob")).await.unwrap_err();
        assert_eq!(err.code(), 4029);

        // Re-joining is not a capacity change
        hub.dispatch(&a.outbox, join_request("1", "alice")).await.unwrap();
        assert_eq!(hub.stats().await.total_participants, 1);
    }

    #[tokio::test]
    async fn identity_is_checked_when_a_secret_is_configured() {
        let secret = "shared-secret";
        let hub = SignalHub::new(SignalSettings {
            jwt_secret: Some(secret.into()),
            ..SignalSettings::default()
        });
        let token = token_for(secret, "id-alice");

        let a = Client::new(&hub);
        let unauthenticated = hub.dispatch(&a.outbox, join_request("1", "alice")).await;
        assert_eq!(unauthenticated.unwrap_err().code(), 4004);

        let mut join = JoinRoom {
            project_id: "1".into(),
            user_id: "id-alice".into(),
            user_name: "alice".into(),
            token: Some(token),
        };
        hub.join(a.outbox.clone(), join.clone()).await.unwrap();

        // Same token, someone else's id
        join.user_id = "id-mallory".into();
        let b = Client::new(&hub);
        assert_eq!(hub.join(b.outbox.clone(), join).await.unwrap_err().code(), 4004);
    }
}
