//! Devtools-panel wiring.
//!
//! [`DevtoolsPanel`] connects to its tab's relay and folds every inbound
//! packet into a [`SocketStore`]. The UI reads [`state`](DevtoolsPanel::state),
//! changes the selection through [`dispatch`](DevtoolsPanel::dispatch) and
//! talks back to the page through [`send_packet`](DevtoolsPanel::send_packet).

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::Result;
use crate::identifiers::TabId;
use crate::protocol::{ChannelName, Packet};
use crate::state::{Action, MessageComposerFormData, SocketState, SocketStore, compose_message};
use crate::transport::{Connect, PortConnector, ReconnectPolicy};

// ============================================================================
// DevtoolsPanel
// ============================================================================

/// The devtools panel of one inspected tab.
///
/// Dropping it stops the relay connector.
#[derive(Debug)]
pub struct DevtoolsPanel {
    tab_id: TabId,
    relay: PortConnector,
    store: Arc<SocketStore>,
}

impl DevtoolsPanel {
    /// Opens the panel for `tab_id` with the default reconnect policy.
    #[must_use]
    pub fn open(transport: Arc<dyn Connect>, tab_id: TabId) -> Self {
        Self::open_with(transport, tab_id, ReconnectPolicy::default(), SocketStore::new())
    }

    /// Opens the panel with a custom policy and store.
    #[must_use]
    pub fn open_with(
        transport: Arc<dyn Connect>,
        tab_id: TabId,
        policy: ReconnectPolicy,
        store: SocketStore,
    ) -> Self {
        let store = Arc::new(store);
        let relay = PortConnector::with_policy(transport, ChannelName::devtools(tab_id), policy);

        let sink = Arc::clone(&store);
        relay.connect().subscribe(move |packet| {
            if let Err(e) = sink.dispatch(packet) {
                warn!(error = %e, "Dropping packet the reducer rejected");
            }
        });

        debug!(%tab_id, "Devtools panel opened");
        Self {
            tab_id,
            relay,
            store,
        }
    }

    /// Returns the inspected tab.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// Returns the current state snapshot.
    #[inline]
    #[must_use]
    pub fn state(&self) -> Arc<SocketState> {
        self.store.state()
    }

    /// Returns a receiver notified on every state change.
    #[inline]
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Arc<SocketState>> {
        self.store.watch()
    }

    /// Returns the underlying store.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &SocketStore {
        &self.store
    }

    /// Applies a UI action or packet to the panel state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSocketSelected`](crate::Error::NoSocketSelected)
    /// when the action needs a selected socket and none is selected.
    pub fn dispatch(&self, action: impl Into<Action>) -> Result<()> {
        self.store.dispatch(action)
    }

    /// Sends a packet toward the inspected page.
    pub fn send_packet(&self, packet: Packet) {
        self.relay.send_packet(packet);
    }

    /// Validates the composer form and sends the resulting packet.
    ///
    /// # Errors
    ///
    /// Returns the user-facing message to show next to the form.
    pub fn submit_composer(&self, form: &MessageComposerFormData) -> std::result::Result<(), String> {
        let packet = compose_message(&self.state(), form)?;
        self.send_packet(packet);
        Ok(())
    }

    /// Returns the relay connector.
    #[inline]
    #[must_use]
    pub fn relay(&self) -> &PortConnector {
        &self.relay
    }
}

impl Drop for DevtoolsPanel {
    fn drop(&mut self) {
        self.relay.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================
