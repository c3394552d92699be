//! Error types for the admission layer.

use duelhub_protocol::UserId;

/// Reasons a connection is refused before it can join matchmaking.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The upgrade URL is missing a parameter or carries a bad value.
    #[error("invalid connect parameters: {0}")]
    InvalidParams(String),

    /// The identity verifier rejected the bearer token.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The user cannot cover the stake they queued for.
    #[error("user {user_id} cannot cover a stake of {stake} {currency}")]
    InsufficientBalance {
        user_id: UserId,
        stake: u64,
        currency: String,
    },

    /// A collaborator (identity verifier, wallet) could not answer.
    #[error("admission service unavailable: {0}")]
    Unavailable(String),
}

impl SessionError {
    /// WebSocket close code sent to the client when admission fails.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::InvalidParams(_) => 4400,
            Self::AuthFailed(_) => 4401,
            Self::InsufficientBalance { .. } => 4402,
            Self::Unavailable(_) => 4503,
        }
    }

    /// Short close-frame reason. Close reasons are capped at 123 bytes, so
    /// the full message stays in the logs.
    pub fn close_reason(&self) -> &'static str {
        match self {
            Self::InvalidParams(_) => "bad request",
            Self::AuthFailed(_) => "unauthorized",
            Self::InsufficientBalance { .. } => "insufficient balance",
            Self::Unavailable(_) => "try again later",
        }
    }
}
