//! Error types for the protocol layer.
//!
//! Each botmux crate defines its own error enum. A `ProtocolError` always
//! means the bytes on the wire did not match the gateway format; it never
//! says anything about the network or about session logic.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or a field
    /// with the wrong type.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame parsed, but violates the gateway's rules, e.g. a group
    /// message event without a `group_id`.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
