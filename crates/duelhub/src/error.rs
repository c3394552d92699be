//! Unified error type for the duelhub server.

use duelhub_protocol::ProtocolError;
use duelhub_room::RoomError;
use duelhub_session::SessionError;
use duelhub_transport::TransportError;

/// Top-level error wrapping every layer's error.
///
/// `#[from]` on each variant lets `?` lift sub-crate errors directly.
#[derive(Debug, thiserror::Error)]
pub enum DuelhubError {
    /// Socket accept, send or receive failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The connection was not admitted.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Matchmaking or room delivery failed.
    #[error(transparent)]
    Room(#[from] RoomError),
}
