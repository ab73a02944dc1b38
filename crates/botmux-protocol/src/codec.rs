//! Codec trait and the JSON implementation used on the gateway link.
//!
//! The connection layer only needs *something* that turns values into
//! bytes and back; [`JsonCodec`] is what OneBot-style gateways speak.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because the codec lives inside the connection
/// driver task and is shared with every session task that issues requests.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use botmux_protocol::{Codec, GroupId, JsonCodec, Segment, SendGroupMessage};
///
/// let codec = JsonCodec;
/// let params = SendGroupMessage {
///     group_id: GroupId(123456),
///     message: vec![Segment::text("hi")],
/// };
///
/// let bytes = codec.encode(&params).unwrap();
/// let decoded: SendGroupMessage = codec.decode(&bytes).unwrap();
/// assert_eq!(params, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
