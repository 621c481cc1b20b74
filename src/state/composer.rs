//! Message composer validation.
//!
//! Turns the composer form into a [`Packet::UserInjectedSocketMessage`].
//! Failures are user-input errors: they come back as human-readable strings
//! for the form, never as [`crate::Error`] values and never as packets.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::protocol::{InjectDestination, Packet, SocketStatus};

use super::queries::query_selected_socket_details;
use super::reducer::SocketState;

// ============================================================================
// Form Data
// ============================================================================

/// How the composer payload should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadType {
    /// Sent as-is (minus a leading BOM).
    Raw,
    /// Must parse as JSON; sent compacted.
    #[default]
    Json,
}

/// Contents of the message composer form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageComposerFormData {
    /// Delivery direction.
    pub destination: InjectDestination,
    /// Payload interpretation.
    pub payload_type: PayloadType,
    /// Payload as typed by the user.
    pub payload: String,
}

impl Default for MessageComposerFormData {
    fn default() -> Self {
        Self {
            destination: InjectDestination::Client,
            payload_type: PayloadType::Json,
            payload: String::new(),
        }
    }
}

// ============================================================================
// Error Messages
// ============================================================================

const EMPTY_PAYLOAD: &str = "Payload must not be empty";
const INVALID_JSON: &str = "Payload must be valid JSON";
const SOCKET_CONNECTING: &str = "Wait for server to connect before sending message";
const SOCKET_CLOSED: &str = "Cannot send a message on a closed socket";
const NO_SOCKET_SELECTED: &str = "No socket selected";

// ============================================================================
// Payload Processors
// ============================================================================

const BOM: char = '\u{FEFF}';

/// Returns `true` if `payload` holds nothing but whitespace and BOMs.
#[inline]
fn is_blank(payload: &str) -> bool {
    payload.trim_matches(|c: char| c.is_whitespace() || c == BOM).is_empty()
}

/// Validates a JSON payload and re-serializes it compactly.
///
/// # Errors
///
/// Returns a user-facing message if the payload is blank or not JSON.
pub fn process_json_payload(payload: &str) -> Result<String, String> {
    if is_blank(payload) {
        return Err(EMPTY_PAYLOAD.to_string());
    }

    serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|parsed| serde_json::to_string(&parsed).ok())
        .ok_or_else(|| INVALID_JSON.to_string())
}

/// Validates a text payload, stripping a leading byte-order mark.
///
/// # Errors
///
/// Returns a user-facing message if the payload is blank.
pub fn process_text_payload(payload: &str) -> Result<String, String> {
    if is_blank(payload) {
        return Err(EMPTY_PAYLOAD.to_string());
    }

    Ok(payload.strip_prefix(BOM).unwrap_or(payload).to_string())
}

// ============================================================================
// Composer
// ============================================================================

/// Builds the injected-message packet for the selected socket.
///
/// # Errors
///
/// Returns a user-facing message if no known socket is selected, the socket
/// is not open, or the payload fails validation.
pub fn compose_message(state: &SocketState, form: &MessageComposerFormData) -> Result<Packet, String> {
    let socket = query_selected_socket_details(state).ok_or_else(|| NO_SOCKET_SELECTED.to_string())?;

    match socket.status {
        SocketStatus::Connecting => return Err(SOCKET_CONNECTING.to_string()),
        SocketStatus::Closed => return Err(SOCKET_CLOSED.to_string()),
        SocketStatus::Open => {}
    }

    let payload = match form.payload_type {
        PayloadType::Json => process_json_payload(&form.payload)?,
        PayloadType::Raw => process_text_payload(&form.payload)?,
    };

    Ok(Packet::user_injected(socket.id.clone(), form.destination, payload))
}

// ============================================================================
// Tests
// ============================================================================
