//! Coordinating-process event loop over the relay table.
//!
//! The [`RelayHub`] is the counterpart of `runtime.onConnect`: every port
//! opened by a content script or a devtools panel is handed to
//! [`RelayHub::on_connect`], routed to its tab's [`Relay`](super::Relay),
//! and listened to until it disconnects.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  RelayHub                    │
//! │         (one task, owns RelayTable)          │
//! │  ┌─────────────────────────────────────────┐ │
//! │  │ TabId=1 → Relay { content*, devtools? } │ │
//! │  │ TabId=2 → Relay { content*, devtools? } │ │
//! │  └─────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Routing
//!
//! | Port name | Tab |
//! |-----------|-----|
//! | `CONTENT_SCRIPT_CHANNEL` | mock tab id if configured, else the sender tab |
//! | `DEVTOOLS_CHANNEL:<tabId>` | parsed from the name |
//! | anything else | port disconnected |

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{PortId, TabId};
use crate::protocol::ChannelName;

use super::port::{Connect, Port, PortEnd, PortEvent, forward_events};
use super::relay::RelayTable;

// ============================================================================
// RelayHubOptions
// ============================================================================

/// Configuration for a [`RelayHub`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayHubOptions {
    /// Routes every content-script port to this tab, ignoring the sender.
    ///
    /// Used by end-to-end setups where the content script has no real tab.
    pub mock_tab_id: Option<TabId>,
}

impl RelayHubOptions {
    /// Creates default options.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { mock_tab_id: None }
    }

    /// Sets the mock tab id.
    #[inline]
    #[must_use]
    pub const fn with_mock_tab_id(mut self, tab_id: TabId) -> Self {
        self.mock_tab_id = Some(tab_id);
        self
    }
}

// ============================================================================
// Commands and Events
// ============================================================================

/// Commands sent from the handle to the event loop.
enum HubCommand {
    /// Route a newly opened port.
    Connect(PortEnd),
    /// Report the tabs with a live relay.
    Tabs(oneshot::Sender<Vec<TabId>>),
    /// Stop the event loop.
    Shutdown,
}

/// Which side of a relay a port belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Content,
    Devtools,
}

/// Port event tagged with its route.
struct HubEvent {
    tab_id: TabId,
    role: Role,
    port_id: PortId,
    event: PortEvent,
}

// ============================================================================
// RelayHub
// ============================================================================

/// Handle to the relay event loop.
///
/// # Example
///
/// ```ignore
/// let hub = RelayHub::new();
/// let devtools = PortConnector::new(
///     Arc::new(hub.transport(None)),
///     ChannelName::devtools(TabId::new(1)),
/// );
/// ```
#[derive(Debug, Clone)]
pub struct RelayHub {
    command_tx: mpsc::UnboundedSender<HubCommand>,
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayHub {
    /// Starts a hub with default options.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(RelayHubOptions::default())
    }

    /// Starts a hub with custom options.
    #[must_use]
    pub fn with_options(options: RelayHubOptions) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let actor = HubActor {
            options,
            table: RelayTable::new(),
            pumps: FxHashMap::default(),
            events_tx,
        };
        tokio::spawn(actor.run(command_rx, events_rx));

        Self { command_tx }
    }

    /// Hands a newly opened port to the hub.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the hub has stopped; the port
    /// is disconnected in that case.
    pub fn on_connect(&self, end: PortEnd) -> Result<()> {
        if let Err(SendError(command)) = self.command_tx.send(HubCommand::Connect(end)) {
            if let HubCommand::Connect(end) = command {
                end.port.disconnect();
            }
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    /// Returns the tabs that currently have a relay, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the hub has stopped.
    pub async fn tabs(&self) -> Result<Vec<TabId>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(HubCommand::Tabs(tx))
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Returns an in-process transport whose ports land on this hub.
    #[inline]
    #[must_use]
    pub fn transport(&self, sender_tab: Option<TabId>) -> LocalTransport {
        LocalTransport {
            hub: self.clone(),
            sender_tab,
        }
    }

    /// Stops the event loop and disconnects every port.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(HubCommand::Shutdown);
    }
}

// ============================================================================
// HubActor
// ============================================================================

struct HubActor {
    options: RelayHubOptions,
    table: RelayTable,
    /// Event pumps of every routed port, with the port itself.
    pumps: FxHashMap<PortId, (Port, JoinHandle<()>)>,
    events_tx: mpsc::UnboundedSender<HubEvent>,
}

impl HubActor {
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<HubCommand>,
        mut events_rx: mpsc::UnboundedReceiver<HubEvent>,
    ) {
        debug!("Relay hub started");

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(HubCommand::Connect(end)) => self.on_connect(end),
                        Some(HubCommand::Tabs(tx)) => {
                            let mut tabs: Vec<_> = self.table.tab_ids().collect();
                            tabs.sort_unstable();
                            let _ = tx.send(tabs);
                        }
                        Some(HubCommand::Shutdown) | None => break,
                    }
                }

                Some(event) = events_rx.recv() => self.on_event(event),
            }
        }

        for (_, (port, pump)) in self.pumps.drain() {
            pump.abort();
            port.disconnect();
        }
        debug!("Relay hub terminated");
    }

    fn on_connect(&mut self, end: PortEnd) {
        let PortEnd { port, events } = end;

        let (tab_id, role) = match port.name().parse::<ChannelName>() {
            Ok(ChannelName::Devtools(tab_id)) => (tab_id, Role::Devtools),
            Ok(ChannelName::ContentScript) => {
                match self.options.mock_tab_id.or(port.sender_tab()) {
                    Some(tab_id) => (tab_id, Role::Content),
                    None => {
                        warn!(port_id = %port.id(), "Content port without sender tab, rejected");
                        port.disconnect();
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(port_id = %port.id(), error = %e, "Unknown channel, port rejected");
                port.disconnect();
                return;
            }
        };

        let port_id = port.id();
        let pump = tokio::spawn(forward_events(events, self.events_tx.clone(), move |event| {
            HubEvent {
                tab_id,
                role,
                port_id,
                event,
            }
        }));
        self.pumps.insert(port_id, (port.clone(), pump));

        let relay = self.table.get_or_create(tab_id);
        match role {
            Role::Content => relay.connect_content_port(port),
            Role::Devtools => relay.connect_devtools_port(port),
        }
    }

    fn on_event(&mut self, event: HubEvent) {
        let HubEvent {
            tab_id,
            role,
            port_id,
            event,
        } = event;

        match event {
            PortEvent::Message(message) => {
                let Some(relay) = self.table.get(tab_id) else {
                    trace!(%tab_id, %port_id, "Message for evicted relay ignored");
                    return;
                };
                let delivered = match role {
                    Role::Content => relay.on_content_message(&message),
                    Role::Devtools => relay.on_devtools_message(port_id, &message),
                };
                trace!(%tab_id, %port_id, ?role, delivered, "Message relayed");
            }

            PortEvent::Disconnected => {
                self.pumps.remove(&port_id);

                let Some(relay) = self.table.get_mut(tab_id) else {
                    return;
                };
                let empty = match role {
                    Role::Content => relay.disconnect_content_port(port_id),
                    Role::Devtools => relay.disconnect_devtools_port(port_id),
                };
                if empty {
                    self.table.evict(tab_id);
                }
            }
        }
    }
}

// ============================================================================
// LocalTransport
// ============================================================================

/// In-process [`Connect`] implementation backed by a [`RelayHub`].
///
/// Every port it opens reports `sender_tab` as its sender, the way the
/// browser stamps content-script ports with their tab.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    hub: RelayHub,
    sender_tab: Option<TabId>,
}

impl Connect for LocalTransport {
    fn connect(&self, channel: ChannelName) -> PortEnd {
        let (local, remote) = Port::pair_for(channel, self.sender_tab);
        if let Err(e) = self.hub.on_connect(remote) {
            debug!(%channel, error = %e, "Relay hub unavailable");
        }
        local
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::Value;

    use crate::protocol::Packet;
    use crate::test_support::{init_tracing, settle};

    fn packet(message: &str) -> Value {
        Packet::debug(message).encode().expect("encode")
    }

    fn open(hub: &RelayHub, channel: ChannelName, sender_tab: Option<TabId>) -> PortEnd {
        hub.transport(sender_tab).connect(channel)
    }

    fn drain(end: &mut PortEnd) -> Vec<PortEvent> {
        std::iter::from_fn(|| end.events.try_recv().ok()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_first_then_devtools() {
        init_tracing();
        let hub = RelayHub::new();
        let tab = TabId::new(1234);

        let content = open(&hub, ChannelName::ContentScript, Some(tab));
        settle().await;
        content.port.post_message(packet("dropped")).expect("post");
        settle().await;

        let mut devtools = open(&hub, ChannelName::devtools(tab), None);
        settle().await;
        content.port.post_message(packet("delivered")).expect("post");
        settle().await;

        assert_eq!(drain(&mut devtools), vec![PortEvent::Message(packet("delivered"))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_devtools_broadcasts_to_content_ports() {
        let hub = RelayHub::new();
        let tab = TabId::new(9);

        let devtools = open(&hub, ChannelName::devtools(tab), None);
        let mut first = open(&hub, ChannelName::ContentScript, Some(tab));
        let mut second = open(&hub, ChannelName::ContentScript, Some(tab));
        settle().await;

        devtools.port.post_message(packet("down")).expect("post");
        settle().await;

        assert_eq!(drain(&mut first), vec![PortEvent::Message(packet("down"))]);
        assert_eq!(drain(&mut second), vec![PortEvent::Message(packet("down"))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tabs_are_isolated() {
        let hub = RelayHub::new();
        let (tab_a, tab_b) = (TabId::new(1), TabId::new(2));

        let content_a = open(&hub, ChannelName::ContentScript, Some(tab_a));
        let mut devtools_a = open(&hub, ChannelName::devtools(tab_a), None);
        let _content_b = open(&hub, ChannelName::ContentScript, Some(tab_b));
        let mut devtools_b = open(&hub, ChannelName::devtools(tab_b), None);
        settle().await;

        content_a.port.post_message(packet("a")).expect("post");
        settle().await;

        assert_eq!(drain(&mut devtools_a), vec![PortEvent::Message(packet("a"))]);
        assert!(drain(&mut devtools_b).is_empty());
        assert_eq!(hub.tabs().await.expect("tabs"), vec![tab_a, tab_b]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_evicted_when_empty_and_recreated() {
        let hub = RelayHub::new();
        let tab = TabId::new(5);

        let content = open(&hub, ChannelName::ContentScript, Some(tab));
        let devtools = open(&hub, ChannelName::devtools(tab), None);
        settle().await;
        assert_eq!(hub.tabs().await.expect("tabs"), vec![tab]);

        content.port.disconnect();
        settle().await;
        assert_eq!(hub.tabs().await.expect("tabs"), vec![tab]);

        devtools.port.disconnect();
        settle().await;
        assert!(hub.tabs().await.expect("tabs").is_empty());

        let _again = open(&hub, ChannelName::devtools(tab), None);
        settle().await;
        assert_eq!(hub.tabs().await.expect("tabs"), vec![tab]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_port_counts_as_disconnect() {
        let hub = RelayHub::new();
        let tab = TabId::new(6);

        let content = open(&hub, ChannelName::ContentScript, Some(tab));
        settle().await;
        drop(content);
        settle().await;

        assert!(hub.tabs().await.expect("tabs").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_channel_rejected() {
        let hub = RelayHub::new();
        let (mut local, remote) = Port::pair("SOMETHING_ELSE", Some(TabId::new(1)));

        hub.on_connect(remote).expect("hub running");
        settle().await;

        assert_eq!(drain(&mut local), vec![PortEvent::Disconnected]);
        assert!(hub.tabs().await.expect("tabs").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_content_port_without_tab_rejected() {
        let hub = RelayHub::new();

        let mut content = open(&hub, ChannelName::ContentScript, None);
        settle().await;

        assert_eq!(drain(&mut content), vec![PortEvent::Disconnected]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_tab_id_overrides_sender() {
        let mock = TabId::new(42);
        let hub = RelayHub::with_options(RelayHubOptions::new().with_mock_tab_id(mock));

        let content = open(&hub, ChannelName::ContentScript, Some(TabId::new(1)));
        let mut devtools = open(&hub, ChannelName::devtools(mock), None);
        settle().await;

        content.port.post_message(packet("mocked")).expect("post");
        settle().await;

        assert_eq!(drain(&mut devtools), vec![PortEvent::Message(packet("mocked"))]);
        assert_eq!(hub.tabs().await.expect("tabs"), vec![mock]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_hub_disconnects_new_ports() {
        let hub = RelayHub::new();
        hub.shutdown();
        settle().await;

        let mut devtools = open(&hub, ChannelName::devtools(TabId::new(1)), None);
        assert_eq!(drain(&mut devtools), vec![PortEvent::Disconnected]);
        assert!(hub.tabs().await.is_err());
    }
}
