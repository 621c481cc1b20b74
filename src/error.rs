//! Error types for the WebSocket devtools relay.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use websocket_devtools::{Action, Result};
//!
//! fn select(panel: &DevtoolsPanel, socket_id: SocketId) -> Result<()> {
//!     panel.dispatch(Action::SelectSocket { selected_socket_id: socket_id })?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Protocol | [`Error::InvalidPacket`], [`Error::InvalidChannelName`], [`Error::Protocol`] |
//! | Transport | [`Error::PortDisconnected`], [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | State | [`Error::NoSocketSelected`] |
//! | Configuration | [`Error::Config`], [`Error::Settings`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::PortId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Transport errors are normally contained inside the connector and relay;
/// only reducer invariant violations and configuration problems reach callers.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Value does not match any known packet variant.
    ///
    /// Returned by [`Packet::decode`](crate::protocol::Packet::decode).
    #[error("Invalid packet: {message}")]
    InvalidPacket {
        /// Why decoding failed.
        message: String,
    },

    /// Port name is neither the content-script channel nor a devtools channel.
    #[error("Invalid channel name: {name}")]
    InvalidChannelName {
        /// The rejected port name.
        name: String,
    },

    /// Protocol violation on a transport boundary.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Write attempted on a port whose peer is gone.
    #[error("Port {port_id} is disconnected")]
    PortDisconnected {
        /// The port the write was attempted on.
        port_id: PortId,
    },

    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Peer did not complete the hello handshake in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // State Errors
    // ========================================================================
    /// Reducer action requires a selected socket but none is selected.
    ///
    /// This is a wiring bug in the caller, never a user error.
    #[error("Tried to call {action} when no socket is selected")]
    NoSocketSelected {
        /// Name of the offending action.
        action: &'static str,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Settings store could not be read or written.
    #[error("Settings error: {message}")]
    Settings {
        /// Description of the storage failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid packet error.
    #[inline]
    pub fn invalid_packet(message: impl Into<String>) -> Self {
        Self::InvalidPacket {
            message: message.into(),
        }
    }

    /// Creates an invalid channel name error.
    #[inline]
    pub fn invalid_channel_name(name: impl Into<String>) -> Self {
        Self::InvalidChannelName { name: name.into() }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a port disconnected error.
    #[inline]
    pub fn port_disconnected(port_id: PortId) -> Self {
        Self::PortDisconnected { port_id }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a no socket selected error.
    #[inline]
    pub fn no_socket_selected(action: &'static str) -> Self {
        Self::NoSocketSelected { action }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a settings error.
    #[inline]
    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a transport-level error.
    ///
    /// Transport errors are recovered or swallowed by the connector.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::PortDisconnected { .. }
                | Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error signals a reducer invariant violation.
    #[inline]
    #[must_use]
    pub fn is_state_error(&self) -> bool {
        matches!(self, Self::NoSocketSelected { .. })
    }

    /// Returns `true` if this error came from validating inbound data.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPacket { .. } | Self::InvalidChannelName { .. } | Self::Protocol { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
