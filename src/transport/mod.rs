//! Channels between extension contexts.
//!
//! Every hop of the pipeline is a named duplex [`Port`]. Ports can drop at
//! any time; the types here keep packets flowing anyway.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  window   ┌────────────────┐   port    ┌────────────┐   port    ┌────────────────┐
//! │ Injected script│◄─────────►│ Content script │◄─────────►│  RelayHub  │◄─────────►│ Devtools panel │
//! │ WindowConnector│ WindowBus │ PortConnector  │           │ Relay(tab) │           │ PortConnector  │
//! └────────────────┘           └────────────────┘           └────────────┘           └────────────────┘
//! ```
//!
//! Contexts in-process reach the hub through [`LocalTransport`]; contexts in
//! another process dial a [`RelayServer`] through [`WebSocketTransport`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `port` | In-memory duplex port and the [`Connect`] trait |
//! | `connector` | Buffering, auto-reconnecting [`PortConnector`] |
//! | `loop_detector` | Reconnect storm detection |
//! | `relay` | Per-tab [`Relay`] and its owning [`RelayTable`] |
//! | `hub` | Relay event loop, [`LocalTransport`] |
//! | `window` | Content-script ↔ injected-script bridge |
//! | `bridge` | Port over WebSocket, hello frame |
//! | `server` | WebSocket front door of the hub |
//! | `client` | WebSocket [`Connect`] implementation |

// ============================================================================
// Submodules
// ============================================================================

/// Port over WebSocket.
pub mod bridge;

/// WebSocket client transport.
pub mod client;

/// Reconnecting port connector.
pub mod connector;

/// Relay event loop.
pub mod hub;

/// Reconnect storm detection.
pub mod loop_detector;

/// Duplex named ports.
pub mod port;

/// Per-tab relay.
pub mod relay;

/// WebSocket server for remote contexts.
pub mod server;

/// Window bridge.
pub mod window;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::Hello;
pub use client::WebSocketTransport;
pub use connector::{ConnectorStatus, PacketHandler, PortConnector};
pub use hub::{LocalTransport, RelayHub, RelayHubOptions};
pub use loop_detector::{LoopDetector, ReconnectPolicy};
pub use port::{Connect, Port, PortEnd, PortEvent, PortEvents};
pub use relay::{Relay, RelayTable};
pub use server::{HELLO_TIMEOUT, RelayServer};
pub use window::{InjectedScriptWindowConnector, WindowBus, WindowConnector, WindowEvent};
