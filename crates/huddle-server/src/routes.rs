//! Plain HTTP routes served next to the signaling socket: health checks for
//! load balancers and read-only room inspection.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    routing::get,
    Json, Router,
};
use huddle_common::auth::validate_token;
use huddle_common::{HuddleError, HuddleResult};
use huddle_signal::protocol::ParticipantInfo;
use huddle_signal::{RegistryStats, SignalHub};
use serde::Serialize;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub hub: SignalHub,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(hub: SignalHub) -> Self {
        Self {
            hub,
            started_at: Instant::now(),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

#[derive(Serialize)]
struct RoomResponse {
    room_id: String,
    participants: Vec<RoomMember>,
}

/// HTTP view of a participant. Connection handles stay on the socket.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomMember {
    user_id: String,
    user_name: String,
    screen_sharing: bool,
}

impl From<ParticipantInfo> for RoomMember {
    fn from(info: ParticipantInfo) -> Self {
        Self {
            user_id: info.user_id,
            user_name: info.user_name,
            screen_sharing: info.screen_sharing,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .route("/rooms/{project_id}", get(room))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn stats(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.hub.stats().await)
}

/// Require `Authorization: Bearer <token>` when identity verification is on.
fn authorize(headers: &HeaderMap, secret: Option<&str>) -> HuddleResult<()> {
    let Some(secret) = secret else {
        return Ok(());
    };
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(HuddleError::Unauthorized)?;
    validate_token(token, secret).map_err(|_| HuddleError::InvalidToken)?;
    Ok(())
}

async fn room(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> HuddleResult<Json<RoomResponse>> {
    authorize(&headers, state.hub.settings().jwt_secret.as_deref())?;

    let room_id = state.hub.room_for_project(&project_id);
    let participants = state.hub.list_participants(&room_id).await;
    if participants.is_empty() {
        return Err(HuddleError::NotFound {
            resource: "Room".into(),
        });
    }
    Ok(Json(RoomResponse {
        room_id: room_id.to_string(),
        participants: participants.into_iter().map(RoomMember::from).collect(),
    }))
}
