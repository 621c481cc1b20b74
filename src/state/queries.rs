//! Read-time queries over [`SocketState`].

// ============================================================================
// Imports
// ============================================================================

use crate::protocol::{SocketDetails, SocketMessage, SocketStatus};

use super::reducer::SocketState;

// ============================================================================
// Queries
// ============================================================================

/// Returns the details of the selected socket, if it is known.
#[must_use]
pub fn query_selected_socket_details(state: &SocketState) -> Option<&SocketDetails> {
    let selected = state.selected_socket.as_ref()?;
    state.sockets.iter().find(|s| s.id == selected.id)
}

/// Returns the messages to show for the selected socket.
///
/// Empty while the socket is `CONNECTING`: a mocked socket reports itself
/// open to the page before the server handshake finishes and queues frames
/// until then, so nothing is shown until the frames are really sent. This
/// filter is read-time only; the messages stay in the state.
#[must_use]
pub fn query_selected_socket_messages(state: &SocketState) -> &[SocketMessage] {
    let Some(details) = query_selected_socket_details(state) else {
        return &[];
    };

    if details.status == SocketStatus::Connecting {
        return &[];
    }

    state
        .socket_messages
        .get(&details.id)
        .map(|messages| messages.as_slice())
        .unwrap_or(&[])
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::identifiers::{MessageId, SocketId};
    use crate::protocol::{Endpoint, Endpoints};
    use crate::state::reducer::SelectedSocket;

    fn state(status: SocketStatus, selected: Option<&str>) -> SocketState {
        let socket = SocketDetails {
            id: SocketId::from("s1"),
            url: "ws://localhost/".to_string(),
            status,
            is_paused: false,
        };
        let messages: Vec<_> = (0..3)
            .map(|i| SocketMessage {
                id: MessageId::new(format!("m{i}")),
                timestamp: "2025-01-01T00:00:00.000Z".to_string(),
                endpoints: Endpoints {
                    source: Endpoint::Client,
                    destination: Endpoint::Server,
                },
                payload: "x".to_string(),
                socket_details: socket.clone(),
            })
            .collect();

        let mut state = SocketState {
            sockets: vec![socket],
            selected_socket: selected.map(|id| SelectedSocket::new(SocketId::from(id))),
            ..SocketState::default()
        };
        state
            .socket_messages
            .insert(SocketId::from("s1"), Arc::new(messages));
        state
    }

    #[test]
    fn test_messages_hidden_while_connecting() {
        let s = state(SocketStatus::Connecting, Some("s1"));
        assert!(query_selected_socket_messages(&s).is_empty());
        assert_eq!(s.socket_messages[&SocketId::from("s1")].len(), 3);
    }

    #[test]
    fn test_messages_visible_when_open_or_closed() {
        assert_eq!(query_selected_socket_messages(&state(SocketStatus::Open, Some("s1"))).len(), 3);
        assert_eq!(query_selected_socket_messages(&state(SocketStatus::Closed, Some("s1"))).len(), 3);
    }

    #[test]
    fn test_no_selection_or_unknown_socket() {
        assert!(query_selected_socket_messages(&state(SocketStatus::Open, None)).is_empty());
        assert!(query_selected_socket_messages(&state(SocketStatus::Open, Some("other"))).is_empty());
        assert!(query_selected_socket_details(&state(SocketStatus::Open, Some("other"))).is_none());
    }
}
