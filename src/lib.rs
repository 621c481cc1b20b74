//! WebSocket DevTools - capture relay core for a WebSocket inspector
//! browser extension.
//!
//! Captured WebSocket traffic travels from the inspected page to a devtools
//! panel across isolated contexts that share no memory and whose channels
//! can drop at any time. This crate provides the pieces that keep packets
//! flowing between them.
//!
//! # Architecture
//!
//! ```text
//! injected script ─► window bridge ─► content script ─► relay hub ─► devtools panel ─► reducer
//! ```
//!
//! Key design principles:
//!
//! - Every hop is a named duplex port; ports are expected to disconnect
//! - Connectors buffer until subscribed and reconnect automatically
//! - A loop detector stops runaway reconnect storms
//! - Relays are per tab; the hub owns them and evicts empty ones
//! - The panel state is an immutable snapshot produced by a pure reducer
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use websocket_devtools::{
//!     ChannelName, DevtoolsPanel, Packet, PortConnector, RelayHub, SocketDetails, TabId,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = RelayHub::new();
//!     let tab = TabId::new(1);
//!
//!     // The panel subscribes to its tab's relay
//!     let panel = DevtoolsPanel::open(Arc::new(hub.transport(None)), tab);
//!
//!     // The content script of that tab forwards captured sockets
//!     let content = PortConnector::new(Arc::new(hub.transport(Some(tab))), ChannelName::ContentScript);
//!     content.connect();
//!     content.send_packet(Packet::socket_details(SocketDetails::connecting("wss://example.com/")));
//!
//!     tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//!     println!("{} socket(s) captured", panel.state().sockets.len());
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Content script, devtools panel and settings wiring |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Packet model and channel naming |
//! | [`state`] | Reducer, store and composer |
//! | [`transport`] | Ports, connectors, relays, window bridge, WebSocket server |

// ============================================================================
// Modules
// ============================================================================

/// Per-context wiring.
///
/// - [`ContentScript`] - forwards between page and relay
/// - [`DevtoolsPanel`] - folds relay packets into panel state
pub mod context;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for tabs, sockets, messages and ports.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Packet model shared by every context.
pub mod protocol;

/// Devtools view-model.
pub mod state;

/// Channels between contexts.
pub mod transport;

#[cfg(test)]
mod test_support;

// ============================================================================
// Re-exports
// ============================================================================

// Context types
pub use context::{ContentScript, DevtoolsPanel, FileSettings, MemorySettings, SettingsStore};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{MessageId, PortId, SocketId, TabId};

// Protocol types
pub use protocol::{
    ChannelName, Endpoint, InjectDestination, Packet, SocketDetails, SocketMessage, SocketStatus,
    WindowMessage,
};

// State types
pub use state::{Action, MessageComposerFormData, SocketState, SocketStore};

// Transport types
pub use transport::{
    Connect, InjectedScriptWindowConnector, Port, PortConnector, ReconnectPolicy, RelayHub,
    RelayServer, WebSocketTransport, WindowBus, WindowConnector,
};
