//! Devtools view-model.
//!
//! Packets from the relay and actions from the UI are folded into a
//! [`SocketState`] by a pure reducer. The [`SocketStore`] holds the current
//! snapshot.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `reducer` | [`SocketState`], [`Action`], [`reduce`] |
//! | `queries` | Selection lookups |
//! | `composer` | Message composer validation |
//! | `history` | Debug log of reducer steps |
//! | `store` | Single state container |

// ============================================================================
// Submodules
// ============================================================================

/// Message composer validation.
pub mod composer;

/// Reducer step log.
pub mod history;

/// Selection lookups.
pub mod queries;

/// Pure reducer.
pub mod reducer;

/// State container.
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use composer::{
    MessageComposerFormData, PayloadType, compose_message, process_json_payload,
    process_text_payload,
};
pub use history::{ReducerHistory, ReducerHistoryItem};
pub use queries::{query_selected_socket_details, query_selected_socket_messages};
pub use reducer::{
    Action, SelectedSocket, SocketMessages, SocketState, initial_state, reduce,
};
pub use store::SocketStore;
