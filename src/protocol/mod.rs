//! Wire types shared by every extension context.
//!
//! # Protocol Overview
//!
//! | Message | Hop | Purpose |
//! |---------|-----|---------|
//! | [`Packet`] | every hop | tagged-union payload |
//! | [`WindowMessage`] | content script ↔ injected script | marker + sender envelope |
//! | [`ChannelName`] | port connect | routes ports to a tab's relay |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `packet` | Packet variants, socket/message records, strict decoding |
//! | `channel` | Port naming convention |
//! | `window` | Window bridge envelope |

// ============================================================================
// Submodules
// ============================================================================

/// Port naming convention.
pub mod channel;

/// Packet variants and decoding.
pub mod packet;

/// Window bridge envelope.
pub mod window;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{CONTENT_SCRIPT_CHANNEL, ChannelName, DEVTOOLS_CHANNEL_PREFIX};
pub use packet::{
    DebuggingPayload, Endpoint, Endpoints, InjectDestination, InjectedMessage, Packet,
    SocketDetails, SocketDetailsPayload, SocketMessage, SocketMessagePayload, SocketStatus,
    UserInjectedPayload, is_packet,
};
pub use window::{ValidationKey, WindowMessage, WindowScriptName};
