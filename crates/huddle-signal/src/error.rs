//! Errors raised while handling a client's signaling frame.
//!
//! None of these leave the connection they happened on: each one becomes an
//! `error` event sent back to the offending client.

use huddle_common::HuddleError;
use thiserror::Error;

use crate::protocol::{ErrorPayload, ServerEvent};

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    #[error("Binary frames are not supported")]
    UnsupportedFrame,

    #[error("Not in a video room")]
    NotInRoom,

    #[error("Payload too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Rejected(#[from] HuddleError),
}

impl SignalError {
    /// Numeric code carried in the `error` event.
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidMessage(_) => 4000,
            Self::NotInRoom => 4003,
            Self::PayloadTooLarge { .. } => 4013,
            Self::UnsupportedFrame => 4015,
            Self::Rejected(err) => match err {
                HuddleError::Validation { .. } => 4001,
                HuddleError::InvalidToken | HuddleError::Unauthorized => 4004,
                HuddleError::NotFound { .. } => 4040,
                HuddleError::LimitReached { .. } => 4029,
                HuddleError::Config(_) | HuddleError::Internal(_) => 5000,
            },
        }
    }

    pub fn to_event(&self) -> ServerEvent {
        let message = match self {
            Self::Rejected(err) => err.public_message(),
            other => other.to_string(),
        };
        ServerEvent::Error(ErrorPayload {
            code: self.code(),
            message,
        })
    }
}
