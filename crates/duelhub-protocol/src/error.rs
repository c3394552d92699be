//! Error types for the protocol layer.

/// Errors that can occur while encoding, decoding, or interpreting frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes were not a well-formed frame of the expected shape.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame decoded, but its content violates protocol rules
    /// (unknown message type, unknown game variant, ...).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
