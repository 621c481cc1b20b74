//! Per-tab packet relay and the table that owns relays.
//!
//! A [`Relay`] joins the devtools panel of one tab to every content script
//! injected in that tab:
//!
//! ```text
//!  content port ─┐
//!  content port ─┼──► Relay(tab) ◄──► devtools port
//!  content port ─┘
//! ```
//!
//! Content packets go to the devtools port; devtools packets are broadcast
//! to every content port. Nothing is buffered: a packet with no one on the
//! other side is dropped.
//!
//! Relays are owned by a [`RelayTable`], which creates them on the first
//! port for a tab and evicts them once both sides are empty.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::identifiers::{PortId, TabId};
use crate::protocol::is_packet;

use super::port::Port;

// ============================================================================
// Relay
// ============================================================================

/// Multiplexer between one devtools port and the content ports of a tab.
#[derive(Debug)]
pub struct Relay {
    tab_id: TabId,
    content_ports: FxHashMap<PortId, Port>,
    devtools_port: Option<Port>,
}

impl Relay {
    /// Creates an empty relay for `tab_id`.
    #[inline]
    #[must_use]
    pub fn new(tab_id: TabId) -> Self {
        Self {
            tab_id,
            content_ports: FxHashMap::default(),
            devtools_port: None,
        }
    }

    /// Returns the tab this relay serves.
    #[inline]
    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// Returns the number of registered content ports.
    #[inline]
    #[must_use]
    pub fn content_port_count(&self) -> usize {
        self.content_ports.len()
    }

    /// Returns the id of the current devtools port.
    #[inline]
    #[must_use]
    pub fn devtools_port_id(&self) -> Option<PortId> {
        self.devtools_port.as_ref().map(Port::id)
    }

    /// Returns `true` when no port of either side is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devtools_port.is_none() && self.content_ports.is_empty()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Adds a content-script port.
    pub fn connect_content_port(&mut self, port: Port) {
        debug!(tab_id = %self.tab_id, port_id = %port.id(), "Content port connected");
        self.content_ports.insert(port.id(), port);
    }

    /// Makes `port` the devtools port, replacing the previous one.
    ///
    /// The replaced port is not disconnected; its messages and its
    /// disconnect are ignored from now on.
    pub fn connect_devtools_port(&mut self, port: Port) {
        debug!(tab_id = %self.tab_id, port_id = %port.id(), "Devtools port connected");
        self.devtools_port = Some(port);
    }

    /// Removes a content port. Returns `true` if the relay is now empty.
    #[must_use]
    pub fn disconnect_content_port(&mut self, port_id: PortId) -> bool {
        self.content_ports.remove(&port_id);
        debug!(tab_id = %self.tab_id, %port_id, "Content port disconnected");
        self.is_empty()
    }

    /// Clears the devtools slot if `port_id` is the current devtools port.
    ///
    /// Returns `true` if the relay is now empty. A replaced devtools port
    /// disconnecting changes nothing and returns `false`.
    #[must_use]
    pub fn disconnect_devtools_port(&mut self, port_id: PortId) -> bool {
        if self.devtools_port_id() != Some(port_id) {
            trace!(tab_id = %self.tab_id, %port_id, "Replaced devtools port disconnected");
            return false;
        }
        self.devtools_port = None;
        debug!(tab_id = %self.tab_id, %port_id, "Devtools port disconnected");
        self.is_empty()
    }

    // ========================================================================
    // Forwarding
    // ========================================================================

    /// Forwards a content-script message to the devtools port.
    ///
    /// Returns the number of ports the message was delivered to.
    pub fn on_content_message(&self, message: &Value) -> usize {
        if !is_packet(message) {
            trace!(tab_id = %self.tab_id, "Dropping invalid content message");
            return 0;
        }

        let Some(devtools) = &self.devtools_port else {
            trace!(tab_id = %self.tab_id, "No devtools port, content packet dropped");
            return 0;
        };

        match devtools.post_message(message.clone()) {
            Ok(()) => 1,
            Err(e) => {
                warn!(tab_id = %self.tab_id, error = %e, "Failed to forward to devtools");
                0
            }
        }
    }

    /// Broadcasts a devtools message to every content port.
    ///
    /// Messages from a replaced devtools port are ignored. Returns the
    /// number of ports the message was delivered to.
    pub fn on_devtools_message(&self, port_id: PortId, message: &Value) -> usize {
        if !is_packet(message) {
            trace!(tab_id = %self.tab_id, "Dropping invalid devtools message");
            return 0;
        }

        if self.devtools_port_id() != Some(port_id) {
            trace!(tab_id = %self.tab_id, %port_id, "Message from replaced devtools port ignored");
            return 0;
        }

        if self.content_ports.is_empty() {
            trace!(tab_id = %self.tab_id, "No content ports, devtools packet dropped");
            return 0;
        }

        self.content_ports
            .values()
            .filter(|port| match port.post_message(message.clone()) {
                Ok(()) => true,
                Err(e) => {
                    warn!(tab_id = %self.tab_id, port_id = %port.id(), error = %e, "Failed to forward to content script");
                    false
                }
            })
            .count()
    }
}

// ============================================================================
// RelayTable
// ============================================================================

/// Owner of every live relay, keyed by tab.
#[derive(Debug, Default)]
pub struct RelayTable {
    relays: FxHashMap<TabId, Relay>,
}

impl RelayTable {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the relay for `tab_id`, creating it on first use.
    pub fn get_or_create(&mut self, tab_id: TabId) -> &mut Relay {
        self.relays.entry(tab_id).or_insert_with(|| {
            debug!(%tab_id, "Relay created");
            Relay::new(tab_id)
        })
    }

    /// Returns the relay for `tab_id`, if any.
    #[inline]
    #[must_use]
    pub fn get(&self, tab_id: TabId) -> Option<&Relay> {
        self.relays.get(&tab_id)
    }

    /// Returns the relay for `tab_id` mutably, if any.
    #[inline]
    pub fn get_mut(&mut self, tab_id: TabId) -> Option<&mut Relay> {
        self.relays.get_mut(&tab_id)
    }

    /// Removes the relay for `tab_id`.
    pub fn evict(&mut self, tab_id: TabId) -> Option<Relay> {
        let relay = self.relays.remove(&tab_id);
        if relay.is_some() {
            debug!(%tab_id, "Relay evicted");
        }
        relay
    }

    /// Returns `true` if a relay exists for `tab_id`.
    #[inline]
    #[must_use]
    pub fn contains(&self, tab_id: TabId) -> bool {
        self.relays.contains_key(&tab_id)
    }

    /// Returns the tabs that have a live relay, in no particular order.
    pub fn tab_ids(&self) -> impl Iterator<Item = TabId> + '_ {
        self.relays.keys().copied()
    }

    /// Returns the number of live relays.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.relays.len()
    }

    /// Returns `true` if no relay is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::{ChannelName, Packet};
    use crate::transport::port::{PortEnd, PortEvent};

    const TAB: TabId = TabId::new(1234);

    /// Returns (relay-side port, context-side end).
    fn port(channel: ChannelName) -> (Port, PortEnd) {
        let (context, relay_side) = Port::pair_for(channel, Some(TAB));
        (relay_side.port, context)
    }

    fn packet(message: &str) -> Value {
        Packet::debug(message).encode().expect("encode")
    }

    #[test]
    fn test_content_packet_dropped_until_devtools_connects() {
        let mut relay = Relay::new(TAB);
        let (content, _content_end) = port(ChannelName::ContentScript);
        relay.connect_content_port(content);

        assert_eq!(relay.on_content_message(&packet("early")), 0);

        let (devtools, mut devtools_end) = port(ChannelName::devtools(TAB));
        relay.connect_devtools_port(devtools);

        assert_eq!(relay.on_content_message(&packet("late")), 1);
        assert_eq!(devtools_end.events.try_recv().ok(), Some(PortEvent::Message(packet("late"))));
        assert!(devtools_end.events.try_recv().is_err());
    }

    #[test]
    fn test_devtools_packet_broadcast_to_all_content_ports() {
        let mut relay = Relay::new(TAB);
        let (devtools, _devtools_end) = port(ChannelName::devtools(TAB));
        relay.connect_devtools_port(devtools.clone());

        assert_eq!(relay.on_devtools_message(devtools.id(), &packet("none")), 0);

        let (first, mut first_end) = port(ChannelName::ContentScript);
        let (second, mut second_end) = port(ChannelName::ContentScript);
        relay.connect_content_port(first);
        relay.connect_content_port(second);

        assert_eq!(relay.on_devtools_message(devtools.id(), &packet("hi")), 2);
        assert_eq!(first_end.events.try_recv().ok(), Some(PortEvent::Message(packet("hi"))));
        assert_eq!(second_end.events.try_recv().ok(), Some(PortEvent::Message(packet("hi"))));
    }

    #[test]
    fn test_replaced_devtools_port_is_ignored() {
        let mut relay = Relay::new(TAB);
        let (content, mut content_end) = port(ChannelName::ContentScript);
        let (old, _old_end) = port(ChannelName::devtools(TAB));
        let (new, mut new_end) = port(ChannelName::devtools(TAB));
        relay.connect_content_port(content);
        relay.connect_devtools_port(old.clone());
        relay.connect_devtools_port(new.clone());

        assert_eq!(relay.on_devtools_message(old.id(), &packet("stale")), 0);
        assert!(content_end.events.try_recv().is_err());

        assert_eq!(relay.on_content_message(&packet("up")), 1);
        assert_eq!(new_end.events.try_recv().ok(), Some(PortEvent::Message(packet("up"))));

        assert!(!relay.disconnect_devtools_port(old.id()));
        assert_eq!(relay.devtools_port_id(), Some(new.id()));
    }

    #[test]
    fn test_invalid_messages_not_forwarded() {
        let mut relay = Relay::new(TAB);
        let (content, _content_end) = port(ChannelName::ContentScript);
        let (devtools, mut devtools_end) = port(ChannelName::devtools(TAB));
        relay.connect_content_port(content);
        relay.connect_devtools_port(devtools.clone());

        assert_eq!(relay.on_content_message(&json!({ "foo": "bar" })), 0);
        assert_eq!(relay.on_devtools_message(devtools.id(), &json!(null)), 0);
        assert!(devtools_end.events.try_recv().is_err());
    }

    #[test]
    fn test_empty_after_all_ports_disconnect() {
        let mut relay = Relay::new(TAB);
        let (content, _content_end) = port(ChannelName::ContentScript);
        let (devtools, _devtools_end) = port(ChannelName::devtools(TAB));
        let content_id = content.id();
        relay.connect_content_port(content);
        relay.connect_devtools_port(devtools.clone());

        assert!(!relay.disconnect_devtools_port(devtools.id()));
        assert!(relay.disconnect_content_port(content_id));
        assert!(relay.is_empty());
    }

    #[test]
    fn test_table_lifecycle() {
        let mut table = RelayTable::new();
        assert!(table.is_empty());

        table.get_or_create(TAB);
        table.get_or_create(TAB);
        table.get_or_create(TabId::new(7));
        assert_eq!(table.len(), 2);

        assert!(table.evict(TAB).is_some());
        assert!(table.evict(TAB).is_none());
        assert!(!table.contains(TAB));
        assert!(table.get(TabId::new(7)).is_some());
    }
}
