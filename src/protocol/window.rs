//! Envelope for packets exchanged over the page window.
//!
//! The content script and the injected script share the page's `window`
//! with arbitrary page code, so every frame carries a fixed marker and the
//! sender's identity.
//!
//! # Format
//!
//! ```json
//! {
//!   "socketExtensionValidationKey": "SOCKET_EXTENSION_VALIDATION_KEY",
//!   "messageSource": "CONTENT_SCRIPT",
//!   "packet": { "type": "ConnectorReadyPacket" }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

use super::Packet;

// ============================================================================
// Types
// ============================================================================

/// Marker value that identifies bridge frames among page messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValidationKey {
    /// The only accepted value.
    #[default]
    #[serde(rename = "SOCKET_EXTENSION_VALIDATION_KEY")]
    SocketExtension,
}

/// Which side of the window bridge sent a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowScriptName {
    /// The isolated-world content script.
    ContentScript,
    /// The script injected into the page's main world.
    InjectedScript,
}

/// One bridge frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowMessage {
    /// Always [`ValidationKey::SocketExtension`].
    pub socket_extension_validation_key: ValidationKey,
    /// Sender identity, used for echo suppression.
    pub message_source: WindowScriptName,
    /// The carried packet.
    pub packet: Packet,
}

impl WindowMessage {
    /// Wraps a packet sent from `source`.
    #[inline]
    #[must_use]
    pub fn new(source: WindowScriptName, packet: Packet) -> Self {
        Self {
            socket_extension_validation_key: ValidationKey::SocketExtension,
            message_source: source,
            packet,
        }
    }

    /// Decodes a window frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the marker or sender is missing, or
    /// [`Error::InvalidPacket`] if the carried packet is malformed.
    pub fn decode(value: &Value) -> Result<Self> {
        let marker_ok = value
            .get("socketExtensionValidationKey")
            .and_then(Value::as_str)
            .is_some_and(|key| key == "SOCKET_EXTENSION_VALIDATION_KEY");
        if !marker_ok {
            return Err(Error::protocol("not a bridge frame"));
        }

        let source = value
            .get("messageSource")
            .ok_or_else(|| Error::protocol("bridge frame without messageSource"))?;
        let message_source = WindowScriptName::deserialize(source)
            .map_err(|e| Error::protocol(format!("unknown messageSource: {e}")))?;

        let packet = value
            .get("packet")
            .ok_or_else(|| Error::invalid_packet("bridge frame without packet"))?;

        Ok(Self {
            socket_extension_validation_key: ValidationKey::SocketExtension,
            message_source,
            packet: Packet::decode(packet)?,
        })
    }

    /// Encodes the frame as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let frame = WindowMessage::new(WindowScriptName::ContentScript, Packet::connector_ready());
        assert_eq!(
            frame.encode().expect("encode"),
            json!({
                "socketExtensionValidationKey": "SOCKET_EXTENSION_VALIDATION_KEY",
                "messageSource": "CONTENT_SCRIPT",
                "packet": { "type": "ConnectorReadyPacket" }
            })
        );
    }

    #[test]
    fn test_decode_rejects_foreign_messages() {
        assert!(WindowMessage::decode(&json!({ "hello": "page" })).is_err());
        assert!(WindowMessage::decode(&json!("string message")).is_err());
        assert!(
            WindowMessage::decode(&json!({
                "socketExtensionValidationKey": "WRONG",
                "messageSource": "CONTENT_SCRIPT",
                "packet": { "type": "ConnectorReadyPacket" }
            }))
            .is_err()
        );
    }

    #[test]
    fn test_decode_rejects_invalid_packet() {
        let err = WindowMessage::decode(&json!({
            "socketExtensionValidationKey": "SOCKET_EXTENSION_VALIDATION_KEY",
            "messageSource": "INJECTED_SCRIPT",
            "packet": { "type": "Nope" }
        }))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPacket { .. }));
    }

    #[test]
    fn test_decode_valid_frame() {
        let frame = WindowMessage::decode(&json!({
            "socketExtensionValidationKey": "SOCKET_EXTENSION_VALIDATION_KEY",
            "messageSource": "INJECTED_SCRIPT",
            "packet": { "type": "DebuggingPacket", "payload": { "message": "hi" } }
        }))
        .expect("decode");
        assert_eq!(frame.message_source, WindowScriptName::InjectedScript);
        assert_eq!(frame.packet, Packet::debug("hi"));
    }
}
