//! JSON encode/decode for push-channel frames.

use crate::message::PushMessage;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame is not valid JSON or does not match the envelope shape.
    #[error("malformed push frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A binary frame was not valid UTF-8.
    #[error("push frame is not UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
}

/// Decodes a text frame into a [`PushMessage`].
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if the text is not a valid envelope,
/// including envelopes with an unknown `action`.
pub fn decode(text: &str) -> Result<PushMessage, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Decodes a binary frame holding UTF-8 JSON into a [`PushMessage`].
///
/// # Errors
///
/// Returns [`CodecError::NotUtf8`] for non-UTF-8 input, otherwise the same
/// errors as [`decode`].
pub fn decode_bytes(bytes: &[u8]) -> Result<PushMessage, CodecError> {
    decode(std::str::from_utf8(bytes)?)
}

/// Encodes a [`PushMessage`] as a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if serialization fails.
pub fn encode(message: &PushMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}
