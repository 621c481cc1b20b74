//! Single state container of the devtools panel.
//!
//! [`SocketStore`] holds the current [`SocketState`] and only ever changes
//! it through the reducer. Readers take cheap `Arc` snapshots or watch for
//! changes; no-op actions do not wake watchers.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

use crate::error::Result;

use super::history::{ReducerHistory, ReducerHistoryItem};
use super::reducer::{Action, SocketState, initial_state, reduce};

// ============================================================================
// SocketStore
// ============================================================================

/// Reducer-driven state container.
#[derive(Debug)]
pub struct SocketStore {
    state: watch::Sender<Arc<SocketState>>,
    history: Option<Mutex<ReducerHistory>>,
}

impl Default for SocketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketStore {
    /// Creates a store at the initial state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(initial_state()),
            history: None,
        }
    }

    /// Creates a store that records every step in a [`ReducerHistory`].
    ///
    /// The history is unbounded and keeps every snapshot; use it for
    /// debugging sessions only.
    #[must_use]
    pub fn with_history() -> Self {
        Self {
            history: Some(Mutex::new(ReducerHistory::new())),
            ..Self::new()
        }
    }

    /// Applies an action.
    ///
    /// Actions are applied one at a time, in call order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSocketSelected`](crate::Error::NoSocketSelected)
    /// when an action needs a selected socket and none is selected. The
    /// state is left unchanged.
    pub fn dispatch(&self, action: impl Into<Action>) -> Result<()> {
        let action = action.into();
        let mut outcome = Ok(());

        self.state.send_if_modified(|state| {
            let name = action.name();
            let next = match self.apply(state, action) {
                Ok(next) => next,
                Err(e) => {
                    outcome = Err(e);
                    return false;
                }
            };

            if Arc::ptr_eq(state, &next) {
                trace!(action = name, "No-op action");
                return false;
            }

            *state = next;
            true
        });

        outcome
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> Arc<SocketState> {
        Arc::clone(&self.state.borrow())
    }

    /// Returns a receiver notified on every state change.
    #[inline]
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Arc<SocketState>> {
        self.state.subscribe()
    }

    /// Returns a copy of the recorded history, if recording is enabled.
    #[must_use]
    pub fn history(&self) -> Option<Vec<ReducerHistoryItem>> {
        self.history
            .as_ref()
            .map(|history| history.lock().items().to_vec())
    }

    fn apply(&self, state: &Arc<SocketState>, action: Action) -> Result<Arc<SocketState>> {
        match &self.history {
            Some(history) => history.lock().reduce(state, action),
            None => reduce(state, action),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;
    use crate::identifiers::SocketId;
    use crate::protocol::{Packet, SocketDetails};

    #[test]
    fn test_dispatch_updates_state() {
        let store = SocketStore::new();
        let socket = SocketDetails::connecting("ws://localhost/");

        store
            .dispatch(Packet::socket_details(socket.clone()))
            .expect("dispatch");

        assert_eq!(store.state().sockets, vec![socket]);
    }

    #[test]
    fn test_failed_dispatch_leaves_state() {
        let store = SocketStore::new();
        let before = store.state();

        let err = store
            .dispatch(Action::ClearSelectedSocketMessages)
            .unwrap_err();

        assert!(matches!(err, Error::NoSocketSelected { .. }));
        assert!(Arc::ptr_eq(&before, &store.state()));
    }

    #[tokio::test]
    async fn test_watchers_only_see_real_changes() {
        let store = SocketStore::new();
        let mut watcher = store.watch();

        store.dispatch(Packet::debug("noop")).expect("dispatch");
        assert!(!watcher.has_changed().expect("open"));

        store
            .dispatch(Action::SelectSocket {
                selected_socket_id: SocketId::from("a"),
            })
            .expect("dispatch");
        assert!(watcher.has_changed().expect("open"));
        assert!(watcher.borrow_and_update().selected_socket.is_some());
    }

    #[test]
    fn test_history_recording() {
        let store = SocketStore::with_history();
        assert_eq!(store.history().map(|h| h.len()), Some(1));

        store.dispatch(Packet::clear_devtools_state()).expect("dispatch");
        assert_eq!(store.history().map(|h| h.len()), Some(2));

        // Every step is kept, no-ops included.
        for _ in 0..50 {
            store.dispatch(Packet::debug("noop")).expect("dispatch");
        }
        assert_eq!(store.history().map(|h| h.len()), Some(52));

        assert!(SocketStore::new().history().is_none());
    }
}
