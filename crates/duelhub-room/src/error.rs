//! Error types for the room layer.

use duelhub_protocol::RoomId;

use crate::ClientId;

/// Errors that can occur during matchmaking and room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist (already torn down or reaped).
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room's loop has exited, so its channels are closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),

    /// The room did not accept a Register within the deadline.
    #[error("room {0} did not accept registration in time")]
    RegisterTimeout(RoomId),

    /// The client's outbound queue is closed or stayed full past the deadline.
    #[error("client {0} is not accepting messages")]
    ClientGone(ClientId),
}
