//! Pure state machine folding packets and UI actions into [`SocketState`].
//!
//! The reducer never mutates its input. Every transition returns a new
//! [`Arc<SocketState>`]; no-op transitions return the input `Arc` itself, so
//! callers can detect them with [`Arc::ptr_eq`].
//!
//! # Transitions
//!
//! | Action | Effect |
//! |--------|--------|
//! | `SocketDetailsPacket` | upsert socket by id, order preserved |
//! | `SocketMessagePacket` | append message, idempotent by message id |
//! | `ClearDevtoolsStatePacket` | reset to initial state |
//! | `SELECT_SOCKET` | replace selection |
//! | `SELECT_SOCKET_MESSAGE` | set selected message (requires selection) |
//! | `CLEAR_SELECTED_MESSAGE_ID` | clear selected message |
//! | `CLEAR_SELECTED_SOCKET_MESSAGES` | empty selected socket's list (requires selection) |
//! | `PREFILL_MESSAGE_COMPOSER` | set composer prefill (requires selection) |
//! | `CLEAR_MESSAGE_COMPOSER_PREFILL` | clear composer prefill (requires selection) |
//! | `CLEAR_UNSEEN_CUSTOM_MESSAGE_ID` | clear autoscroll hint |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::identifiers::{MessageId, SocketId};
use crate::protocol::{Endpoint, Packet, SocketDetails, SocketMessage, SocketMessagePayload};

use super::composer::MessageComposerFormData;

// ============================================================================
// SocketState
// ============================================================================

/// Messages recorded per socket.
///
/// Lists are shared between snapshots; only the list that changes is copied.
pub type SocketMessages = FxHashMap<SocketId, Arc<Vec<SocketMessage>>>;

/// View-model consumed by the devtools UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocketState {
    /// Known sockets in order of first appearance, unique by id.
    pub sockets: Vec<SocketDetails>,
    /// Messages by socket id. May contain sockets absent from `sockets`.
    pub socket_messages: SocketMessages,
    /// Current UI selection.
    pub selected_socket: Option<SelectedSocket>,
}

/// The socket currently selected in the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedSocket {
    /// Selected socket id.
    pub id: SocketId,
    /// Message opened in the detail view.
    pub selected_message_id: Option<MessageId>,
    /// Values to load into the message composer.
    pub composer_prefill: Option<MessageComposerFormData>,
    /// Last user-injected message not yet scrolled into view.
    pub unseen_custom_message_id: Option<MessageId>,
}

impl SelectedSocket {
    /// Creates a bare selection.
    #[inline]
    #[must_use]
    pub fn new(id: SocketId) -> Self {
        Self {
            id,
            selected_message_id: None,
            composer_prefill: None,
            unseen_custom_message_id: None,
        }
    }
}

/// Returns the initial, empty state.
#[inline]
#[must_use]
pub fn initial_state() -> Arc<SocketState> {
    Arc::new(SocketState::default())
}

// ============================================================================
// Action
// ============================================================================

/// Input to the reducer: a packet or a UI-origin control action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Packet received from the relay.
    Packet(Packet),
    /// `SELECT_SOCKET`
    SelectSocket {
        /// Socket to select.
        selected_socket_id: SocketId,
    },
    /// `SELECT_SOCKET_MESSAGE`
    SelectSocketMessage {
        /// Message to open.
        selected_message_id: MessageId,
    },
    /// `CLEAR_SELECTED_MESSAGE_ID`
    ClearSelectedMessageId,
    /// `CLEAR_SELECTED_SOCKET_MESSAGES`
    ClearSelectedSocketMessages,
    /// `PREFILL_MESSAGE_COMPOSER`
    PrefillMessageComposer {
        /// Values to load into the composer.
        composer_prefill: MessageComposerFormData,
    },
    /// `CLEAR_MESSAGE_COMPOSER_PREFILL`
    ClearMessageComposerPrefill,
    /// `CLEAR_UNSEEN_CUSTOM_MESSAGE_ID`
    ClearUnseenCustomMessageId,
}

impl Action {
    /// Returns the action's type name as used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Packet(packet) => packet.kind(),
            Self::SelectSocket { .. } => "SELECT_SOCKET",
            Self::SelectSocketMessage { .. } => "SELECT_SOCKET_MESSAGE",
            Self::ClearSelectedMessageId => "CLEAR_SELECTED_MESSAGE_ID",
            Self::ClearSelectedSocketMessages => "CLEAR_SELECTED_SOCKET_MESSAGES",
            Self::PrefillMessageComposer { .. } => "PREFILL_MESSAGE_COMPOSER",
            Self::ClearMessageComposerPrefill => "CLEAR_MESSAGE_COMPOSER_PREFILL",
            Self::ClearUnseenCustomMessageId => "CLEAR_UNSEEN_CUSTOM_MESSAGE_ID",
        }
    }
}

impl From<Packet> for Action {
    #[inline]
    fn from(packet: Packet) -> Self {
        Self::Packet(packet)
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Applies `action` to `prev`.
///
/// # Errors
///
/// Returns [`Error::NoSocketSelected`] for actions that require a selected
/// socket when none is selected. These indicate a UI wiring bug.
pub fn reduce(prev: &Arc<SocketState>, action: Action) -> Result<Arc<SocketState>> {
    let action_name = action.name();

    match action {
        Action::Packet(Packet::SocketDetails(payload)) => {
            Ok(apply_socket_details(prev, payload.socket))
        }
        Action::Packet(Packet::SocketMessage(payload)) => Ok(apply_socket_message(prev, payload)),
        Action::Packet(Packet::ClearDevtoolsState) => Ok(initial_state()),
        Action::Packet(_) => Ok(Arc::clone(prev)),

        Action::SelectSocket { selected_socket_id } => Ok(Arc::new(SocketState {
            selected_socket: Some(SelectedSocket::new(selected_socket_id)),
            ..SocketState::clone(prev)
        })),

        Action::SelectSocketMessage {
            selected_message_id,
        } => {
            let selected = require_selection(prev, action_name)?;
            Ok(with_selection(
                prev,
                SelectedSocket {
                    selected_message_id: Some(selected_message_id),
                    ..SelectedSocket::new(selected.id.clone())
                },
            ))
        }

        Action::ClearSelectedMessageId => match &prev.selected_socket {
            None => Ok(Arc::clone(prev)),
            Some(selected) => Ok(with_selection(
                prev,
                SelectedSocket {
                    selected_message_id: None,
                    ..selected.clone()
                },
            )),
        },

        Action::ClearSelectedSocketMessages => {
            let selected = require_selection(prev, action_name)?;
            let mut next = SocketState::clone(prev);
            next.socket_messages
                .insert(selected.id.clone(), Arc::new(Vec::new()));
            next.selected_socket = Some(SelectedSocket {
                selected_message_id: None,
                ..selected.clone()
            });
            Ok(Arc::new(next))
        }

        Action::PrefillMessageComposer { composer_prefill } => {
            let selected = require_selection(prev, action_name)?;
            Ok(with_selection(
                prev,
                SelectedSocket {
                    composer_prefill: Some(composer_prefill),
                    ..selected.clone()
                },
            ))
        }

        Action::ClearMessageComposerPrefill => {
            let selected = require_selection(prev, action_name)?;
            Ok(with_selection(
                prev,
                SelectedSocket {
                    composer_prefill: None,
                    ..selected.clone()
                },
            ))
        }

        Action::ClearUnseenCustomMessageId => match &prev.selected_socket {
            None => Ok(Arc::clone(prev)),
            Some(selected) => Ok(with_selection(
                prev,
                SelectedSocket {
                    unseen_custom_message_id: None,
                    ..selected.clone()
                },
            )),
        },
    }
}

// ============================================================================
// Transitions
// ============================================================================

fn apply_socket_details(prev: &Arc<SocketState>, socket: SocketDetails) -> Arc<SocketState> {
    let mut next = SocketState::clone(prev);

    match next.sockets.iter_mut().find(|s| s.id == socket.id) {
        Some(existing) => *existing = socket,
        None => next.sockets.push(socket),
    }

    Arc::new(next)
}

fn apply_socket_message(prev: &Arc<SocketState>, payload: SocketMessagePayload) -> Arc<SocketState> {
    let SocketMessagePayload { socket, message } = payload;

    let is_duplicate = prev
        .socket_messages
        .get(&socket.id)
        .is_some_and(|messages| messages.iter().any(|m| m.id == message.id));
    if is_duplicate {
        return Arc::clone(prev);
    }

    let mut next = SocketState::clone(prev);

    let custom_message_on_selected_socket = message.endpoints.source == Endpoint::ChromeExtension
        && next
            .selected_socket
            .as_ref()
            .is_some_and(|selected| selected.id == socket.id);

    // Autoscroll hint so the user sees the message they just injected.
    if custom_message_on_selected_socket && let Some(selected) = next.selected_socket.as_mut() {
        selected.unseen_custom_message_id = Some(message.id.clone());
    }

    let messages = next.socket_messages.entry(socket.id).or_default();
    Arc::make_mut(messages).push(message);

    Arc::new(next)
}

// ============================================================================
// Helpers
// ============================================================================

fn require_selection<'a>(
    state: &'a SocketState,
    action_name: &'static str,
) -> Result<&'a SelectedSocket> {
    state
        .selected_socket
        .as_ref()
        .ok_or_else(|| Error::no_socket_selected(action_name))
}

fn with_selection(prev: &Arc<SocketState>, selected: SelectedSocket) -> Arc<SocketState> {
    Arc::new(SocketState {
        selected_socket: Some(selected),
        ..SocketState::clone(prev)
    })
}

// ============================================================================
// Tests
// ============================================================================
