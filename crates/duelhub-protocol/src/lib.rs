//! Wire protocol for duelhub.
//!
//! - **Types** ([`ClientEnvelope`], [`ServerMessage`], [`WaitingKey`], ...):
//!   the frames that travel on the wire and the identifiers used to route
//!   them.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how frames become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (frames) → Room (game moves)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientEnvelope, ErrorPayload, GameVariant, InboundKind, MatchedPayload, Outcome,
    ReadyPayload, ResultPayload, RoomId, ServerMessage, StartPayload, UserId, WaitingKey,
};
