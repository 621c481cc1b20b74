//! Reducer history for debugging.
//!
//! Records every action with the state it produced, starting from the
//! initial state, and logs each step at `debug` level.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;

use super::reducer::{Action, SocketState, initial_state, reduce};

// ============================================================================
// ReducerHistory
// ============================================================================

/// One recorded reducer step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducerHistoryItem {
    /// Action applied; `None` for the initial entry.
    pub action: Option<Action>,
    /// State after the action.
    pub result: Arc<SocketState>,
}

/// Append-only log of reducer steps. Unbounded; meant for debugging.
#[derive(Debug, Clone)]
pub struct ReducerHistory {
    items: Vec<ReducerHistoryItem>,
}

impl Default for ReducerHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ReducerHistory {
    /// Creates a history holding only the initial state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: vec![ReducerHistoryItem {
                action: None,
                result: initial_state(),
            }],
        }
    }

    /// Reduces and records the step.
    ///
    /// Failed actions are not recorded.
    ///
    /// # Errors
    ///
    /// Propagates the reducer's error.
    pub fn reduce(&mut self, prev: &Arc<SocketState>, action: Action) -> Result<Arc<SocketState>> {
        let next = reduce(prev, action.clone())?;

        debug!(
            step = self.items.len(),
            action = action.name(),
            changed = !Arc::ptr_eq(prev, &next),
            sockets = next.sockets.len(),
            message_lists = next.socket_messages.len(),
            "Reducer step"
        );

        self.items.push(ReducerHistoryItem {
            action: Some(action),
            result: Arc::clone(&next),
        });
        Ok(next)
    }

    /// Returns every recorded step, oldest first.
    #[inline]
    #[must_use]
    pub fn items(&self) -> &[ReducerHistoryItem] {
        &self.items
    }

    /// Returns the number of recorded steps, initial entry included.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always `false`: the initial entry is never removed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::SocketId;
    use crate::protocol::Packet;

    #[test]
    fn test_records_steps_from_initial_state() {
        let mut history = ReducerHistory::new();
        assert_eq!(history.len(), 1);
        assert_eq!(history.items()[0].action, None);

        let state = initial_state();
        let select = Action::SelectSocket {
            selected_socket_id: SocketId::from("a"),
        };
        let state = history.reduce(&state, select.clone()).expect("reduce");
        let _ = history
            .reduce(&state, Packet::debug("noop").into())
            .expect("reduce");

        assert_eq!(history.len(), 3);
        assert_eq!(history.items()[1].action, Some(select));
        assert!(Arc::ptr_eq(&history.items()[1].result, &history.items()[2].result));
    }

    #[test]
    fn test_failed_action_not_recorded() {
        let mut history = ReducerHistory::new();
        let result = history.reduce(&initial_state(), Action::ClearSelectedSocketMessages);

        assert!(result.is_err());
        assert_eq!(history.len(), 1);
    }
}
