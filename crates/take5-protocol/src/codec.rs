//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The rest of the server never calls `serde_json` directly: it encodes
//! outbound [`ServerMessage`](crate::ServerMessage)s and decodes inbound
//! [`Action`](crate::Action)s through a [`Codec`], so the wire format can be
//! swapped without touching game code.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a single codec instance is shared by
/// every connection task through the server state.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// The browser client speaks plain JSON, so this is the codec the server
/// runs with. It is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use take5_protocol::{Action, ActionKind, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let action: Action = codec
///     .decode(br#"{"type":"play_card","value":42}"#)
///     .unwrap();
///
/// assert_eq!(action.kind, ActionKind::PlayCard);
/// assert_eq!(action.value, 42);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Action, ServerMessage};

    #[test]
    fn test_json_codec_encodes_info_message() {
        let bytes = JsonCodec
            .encode(&ServerMessage::Info("hello".into()))
            .unwrap();
        assert_eq!(bytes, br#"{"type":"info","payload":"hello"}"#);
    }

    #[test]
    fn test_json_codec_decode_garbage_is_decode_error() {
        let result: Result<Action, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
