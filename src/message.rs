//! Inbound and outbound message representation.
//!
//! An [`MqttMessage`] is an immutable topic/payload pair. The payload keeps
//! whichever form it was built from and materializes the other one on first
//! access, so a binary-built message only pays for UTF-8 decoding when some
//! consumer actually asks for text.

use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors surfaced by payload views.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The payload bytes are not valid UTF-8. Raised by the text view only;
    /// never treated as a connection-level failure.
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// One MQTT message, immutable after construction.
///
/// Exactly one of the two payload representations is seeded by the
/// constructor; the other is computed and cached on first demand. Both views
/// are pure functions of the seeded form, so repeated calls are idempotent.
#[derive(Debug, Clone, Default)]
pub struct MqttMessage {
    topic: String,
    bytes: OnceLock<Vec<u8>>,
    text: OnceLock<String>,
}

impl MqttMessage {
    /// Builds a message from a binary payload.
    pub fn from_bytes(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        let message = Self {
            topic: topic.into(),
            ..Self::default()
        };
        let _ = message.bytes.set(payload);
        message
    }

    /// Builds a message from a text payload.
    pub fn from_text(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        let message = Self {
            topic: topic.into(),
            ..Self::default()
        };
        let _ = message.text.set(payload.into());
        message
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Binary view of the payload. Encodes the text form on first access if
    /// the message was built from text.
    pub fn bytes(&self) -> &[u8] {
        self.bytes.get_or_init(|| {
            self.text
                .get()
                .map(|text| text.as_bytes().to_vec())
                .unwrap_or_default()
        })
    }

    /// Text view of the payload. Decodes the binary form on first access if
    /// the message was built from bytes; decoding failures are reported to
    /// the caller and nothing is cached, so a later call fails the same way.
    pub fn text(&self) -> Result<&str, MessageError> {
        if let Some(text) = self.text.get() {
            return Ok(text);
        }
        let bytes = self.bytes.get().map(Vec::as_slice).unwrap_or_default();
        let decoded = std::str::from_utf8(bytes)?;
        Ok(self.text.get_or_init(|| decoded.to_owned()))
    }
}

impl fmt::Display for MqttMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.topic, self.bytes().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_view_decodes_binary_payload() {
        let message = MqttMessage::from_bytes("sensors/temp", b"21.5".to_vec());
        assert_eq!(message.text().unwrap(), "21.5");
        // Second access hits the cache and agrees with the first.
        assert_eq!(message.text().unwrap(), "21.5");
        assert_eq!(message.bytes(), b"21.5");
    }

    #[test]
    fn binary_view_encodes_text_payload() {
        let message = MqttMessage::from_text("sensors/temp", "21.5");
        assert_eq!(message.bytes(), b"21.5");
        assert_eq!(message.text().unwrap(), "21.5");
    }

    #[test]
    fn invalid_utf8_surfaces_as_decode_error() {
        let message = MqttMessage::from_bytes("camera/frame", vec![0xff, 0xfe, 0x00]);
        assert!(message.text().is_err());
        // The failure is stable, not cached away.
        assert!(message.text().is_err());
        assert_eq!(message.bytes(), &[0xff, 0xfe, 0x00]);
    }

    #[test]
    fn empty_payload_is_valid_in_both_views() {
        let message = MqttMessage::from_bytes("ping", Vec::new());
        assert_eq!(message.text().unwrap(), "");
        assert!(message.bytes().is_empty());
    }
}
