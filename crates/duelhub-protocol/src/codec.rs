//! Codec trait and implementations for serializing/deserializing frames.
//!
//! The client pumps don't care how frames are serialized, they just need
//! something that implements [`Codec`]. [`JsonCodec`] is the only one
//! shipped, since browsers consume the frames directly.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use duelhub_protocol::{ClientEnvelope, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let env: ClientEnvelope = codec.decode(br#"{"type":"move","value":"rock"}"#).unwrap();
/// assert_eq!(env.kind, "move");
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientEnvelope, ServerMessage};

    #[test]
    fn test_json_codec_encodes_server_message() {
        let bytes = JsonCodec.encode(&ServerMessage::error("nope")).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, r#"{"type":"error","payload":{"message":"nope"}}"#);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let result: Result<ClientEnvelope, _> = JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_rejects_missing_type() {
        let result: Result<ClientEnvelope, _> = JsonCodec.decode(br#"{"value": 3}"#);
        assert!(result.is_err());
    }
}
