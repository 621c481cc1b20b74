//! Packet model shared by every extension context.
//!
//! # Format
//!
//! ```json
//! {
//!   "type": "SocketMessagePacket",
//!   "payload": { "socket": { ... }, "message": { ... } }
//! }
//! ```
//!
//! Packets without data (`ClearDevtoolsStatePacket`, `ConnectorReadyPacket`)
//! carry only the `type` tag. Decoding is strict: unknown tags, unknown
//! fields and malformed payloads are rejected.

// ============================================================================
// Imports
// ============================================================================

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{MessageId, SocketId};

// ============================================================================
// SocketStatus
// ============================================================================

/// Lifecycle state of a captured socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SocketStatus {
    /// Handshake not yet complete.
    Connecting,
    /// Handshake complete, frames flowing.
    Open,
    /// Closed by either side.
    Closed,
}

// ============================================================================
// SocketDetails
// ============================================================================

/// Metadata of one captured socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SocketDetails {
    /// Unique per socket, generated at capture time.
    pub id: SocketId,
    /// URL the socket was opened against.
    pub url: String,
    /// Current lifecycle state.
    pub status: SocketStatus,
    /// Whether frame delivery is paused by the user.
    pub is_paused: bool,
}

impl SocketDetails {
    /// Creates details for a freshly constructed socket (`CONNECTING`).
    #[must_use]
    pub fn connecting(url: impl Into<String>) -> Self {
        Self {
            id: SocketId::generate(),
            url: url.into(),
            status: SocketStatus::Connecting,
            is_paused: false,
        }
    }

    /// Returns a copy with a different status.
    #[inline]
    #[must_use]
    pub fn with_status(&self, status: SocketStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

// ============================================================================
// SocketMessage
// ============================================================================

/// Party on either side of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// The host page.
    Client,
    /// The remote WebSocket server.
    Server,
    /// The devtools panel (user-injected frames).
    ChromeExtension,
}

/// Source and destination of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Endpoints {
    /// Who produced the frame.
    pub source: Endpoint,
    /// Who the frame was delivered to.
    pub destination: Endpoint,
}

/// One captured frame. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SocketMessage {
    /// Unique per frame.
    pub id: MessageId,
    /// ISO-8601 capture time.
    pub timestamp: String,
    /// Direction of the frame.
    pub endpoints: Endpoints,
    /// Frame payload as text.
    pub payload: String,
    /// Snapshot of the socket at capture time.
    pub socket_details: SocketDetails,
}

impl SocketMessage {
    /// Captures a frame now, with a fresh id and an RFC 3339 timestamp.
    #[must_use]
    pub fn capture(
        socket: &SocketDetails,
        source: Endpoint,
        destination: Endpoint,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            endpoints: Endpoints {
                source,
                destination,
            },
            payload: payload.into(),
            socket_details: socket.clone(),
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Payload of [`Packet::SocketDetails`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SocketDetailsPayload {
    /// Upserted socket.
    pub socket: SocketDetails,
}

/// Payload of [`Packet::SocketMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SocketMessagePayload {
    /// Socket the frame belongs to.
    pub socket: SocketDetails,
    /// The frame.
    pub message: SocketMessage,
}

/// Where a user-composed frame should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectDestination {
    /// Deliver to the page as if the server sent it.
    Client,
    /// Deliver to the server as if the page sent it.
    Server,
}

/// A user-composed frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InjectedMessage {
    /// Target socket.
    pub socket_id: SocketId,
    /// Delivery direction.
    pub destination: InjectDestination,
    /// Frame payload, relayed verbatim.
    pub payload: String,
}

/// Payload of [`Packet::UserInjectedSocketMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserInjectedPayload {
    /// The composed frame.
    pub message: InjectedMessage,
}

/// Payload of [`Packet::Debugging`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebuggingPayload {
    /// Free-form diagnostic text.
    pub message: String,
}

// ============================================================================
// Packet
// ============================================================================

/// Tagged-union message exchanged between extension contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", deny_unknown_fields)]
pub enum Packet {
    /// Upsert of a socket's metadata.
    #[serde(rename = "SocketDetailsPacket")]
    SocketDetails(SocketDetailsPayload),

    /// One captured frame.
    #[serde(rename = "SocketMessagePacket")]
    SocketMessage(SocketMessagePayload),

    /// Reset viewer state (page navigation).
    #[serde(rename = "ClearDevtoolsStatePacket")]
    ClearDevtoolsState,

    /// User-composed outbound frame.
    #[serde(rename = "UserInjectedSocketMessagePacket")]
    UserInjectedSocketMessage(UserInjectedPayload),

    /// Peer is ready to receive.
    #[serde(rename = "ConnectorReadyPacket")]
    ConnectorReady,

    /// Diagnostic passthrough.
    #[serde(rename = "DebuggingPacket")]
    Debugging(DebuggingPayload),
}

// ============================================================================
// Packet - Factories
// ============================================================================

impl Packet {
    /// Creates a socket details packet.
    #[inline]
    #[must_use]
    pub fn socket_details(socket: SocketDetails) -> Self {
        Self::SocketDetails(SocketDetailsPayload { socket })
    }

    /// Creates a socket message packet.
    #[inline]
    #[must_use]
    pub fn socket_message(socket: SocketDetails, message: SocketMessage) -> Self {
        Self::SocketMessage(SocketMessagePayload { socket, message })
    }

    /// Creates a clear devtools state packet.
    #[inline]
    #[must_use]
    pub const fn clear_devtools_state() -> Self {
        Self::ClearDevtoolsState
    }

    /// Creates a connector ready packet.
    #[inline]
    #[must_use]
    pub const fn connector_ready() -> Self {
        Self::ConnectorReady
    }

    /// Creates a user-injected message packet.
    #[inline]
    #[must_use]
    pub fn user_injected(
        socket_id: SocketId,
        destination: InjectDestination,
        payload: impl Into<String>,
    ) -> Self {
        Self::UserInjectedSocketMessage(UserInjectedPayload {
            message: InjectedMessage {
                socket_id,
                destination,
                payload: payload.into(),
            },
        })
    }

    /// Creates a debugging packet.
    #[inline]
    #[must_use]
    pub fn debug(message: impl Into<String>) -> Self {
        Self::Debugging(DebuggingPayload {
            message: message.into(),
        })
    }
}

// ============================================================================
// Packet - Codec
// ============================================================================

impl Packet {
    /// Decodes a packet from an untrusted JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPacket`] if the value matches no variant.
    pub fn decode(value: &Value) -> Result<Self> {
        Self::deserialize(value).map_err(|e| Error::invalid_packet(e.to_string()))
    }

    /// Encodes the packet as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Returns the wire tag of this packet.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SocketDetails(_) => "SocketDetailsPacket",
            Self::SocketMessage(_) => "SocketMessagePacket",
            Self::ClearDevtoolsState => "ClearDevtoolsStatePacket",
            Self::UserInjectedSocketMessage(_) => "UserInjectedSocketMessagePacket",
            Self::ConnectorReady => "ConnectorReadyPacket",
            Self::Debugging(_) => "DebuggingPacket",
        }
    }
}

/// Returns `true` if `value` decodes as exactly one known packet variant.
#[inline]
#[must_use]
pub fn is_packet(value: &Value) -> bool {
    Packet::decode(value).is_ok()
}

// ============================================================================
// Tests
// ============================================================================
