//! JWT identity verification for room joins.
//!
//! Tokens are issued by the platform's REST API (HS256, `{ id, iat, exp }`).
//! The signaling server never issues tokens; it only checks that the user id
//! a client asserts when joining a room is the one its session token was
//! issued for.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::HuddleError;

/// JWT claims embedded in session tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id the token was issued for
    pub id: String,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Validate and decode a JWT token.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Check that `token` is valid and was issued for `user_id`.
pub fn verify_identity(
    token: Option<&str>,
    secret: &str,
    user_id: &str,
) -> Result<Claims, HuddleError> {
    let token = token.ok_or(HuddleError::Unauthorized)?;
    let claims = validate_token(token, secret).map_err(|e| {
        tracing::debug!(error = %e, "Rejected session token");
        HuddleError::InvalidToken
    })?;

    if claims.id != user_id {
        return Err(HuddleError::Unauthorized);
    }
    Ok(claims)
}
