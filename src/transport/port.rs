//! Duplex named port between two contexts.
//!
//! A [`Port`] is one end of a channel. Writing on it delivers a
//! [`PortEvent::Message`] to the other end's [`PortEvents`] stream;
//! disconnecting it delivers [`PortEvent::Disconnected`] to the other end
//! only, and makes every later write on either end fail.
//!
//! # Lifecycle
//!
//! ```text
//!  connect(name) ──► (PortEnd local, PortEnd remote)
//!                      │                    │
//!                      │  post_message ───► │ PortEvent::Message
//!                      │ ◄─── post_message  │
//!                      │  disconnect() ───► │ PortEvent::Disconnected
//! ```
//!
//! Dropping every handle of one end closes the other end's event stream,
//! which listeners treat as a disconnect.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::{PortId, TabId};
use crate::protocol::{ChannelName, Packet};

// ============================================================================
// Types
// ============================================================================

/// Event observed on one end of a port.
#[derive(Debug, Clone, PartialEq)]
pub enum PortEvent {
    /// The other end posted a message.
    Message(Value),
    /// The other end disconnected, or went away.
    Disconnected,
}

/// Stream of events delivered to one end of a port.
pub type PortEvents = mpsc::UnboundedReceiver<PortEvent>;

/// State shared by both ends of a channel.
#[derive(Debug, Default)]
struct PortShared {
    disconnected: AtomicBool,
}

// ============================================================================
// Port
// ============================================================================

/// Writable handle to one end of a channel.
///
/// Cloning yields another handle to the same end (same [`PortId`]).
#[derive(Clone)]
pub struct Port {
    /// Identity of this end.
    id: PortId,
    /// Name the channel was opened with.
    name: String,
    /// Tab of the context that opened the channel, if any.
    sender_tab: Option<TabId>,
    /// Other end's event inbox.
    outgoing: mpsc::UnboundedSender<PortEvent>,
    /// Disconnect flag shared by both ends.
    shared: Arc<PortShared>,
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("sender_tab", &self.sender_tab)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// One end of a channel: its writable handle plus its event stream.
#[derive(Debug)]
pub struct PortEnd {
    /// Writable handle.
    pub port: Port,
    /// Events sent by the other end.
    pub events: PortEvents,
}

impl PortEnd {
    /// Splits into handle and event stream.
    #[inline]
    #[must_use]
    pub fn into_parts(self) -> (Port, PortEvents) {
        (self.port, self.events)
    }
}

impl Port {
    /// Opens a channel and returns both ends.
    ///
    /// The first end belongs to the context that called `connect`, the
    /// second is handed to the listening context.
    #[must_use]
    pub fn pair(name: impl Into<String>, sender_tab: Option<TabId>) -> (PortEnd, PortEnd) {
        let name = name.into();
        let shared = Arc::new(PortShared::default());
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let (remote_tx, remote_rx) = mpsc::unbounded_channel();

        let local = Port {
            id: PortId::next(),
            name: name.clone(),
            sender_tab,
            outgoing: remote_tx,
            shared: Arc::clone(&shared),
        };
        let remote = Port {
            id: PortId::next(),
            name,
            sender_tab,
            outgoing: local_tx,
            shared,
        };

        trace!(local = %local.id, remote = %remote.id, name = %local.name, "Port pair opened");

        (
            PortEnd {
                port: local,
                events: local_rx,
            },
            PortEnd {
                port: remote,
                events: remote_rx,
            },
        )
    }

    /// Opens a channel named after `channel`.
    #[inline]
    #[must_use]
    pub fn pair_for(channel: ChannelName, sender_tab: Option<TabId>) -> (PortEnd, PortEnd) {
        Self::pair(channel.to_string(), sender_tab)
    }

    /// Returns this end's identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Returns the name the channel was opened with.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tab of the context that opened the channel.
    #[inline]
    #[must_use]
    pub fn sender_tab(&self) -> Option<TabId> {
        self.sender_tab
    }

    /// Returns `true` until either end disconnects or the other end is dropped.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.shared.disconnected.load(Ordering::Acquire) && !self.outgoing.is_closed()
    }

    /// Posts a raw JSON message to the other end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortDisconnected`] if the channel is gone.
    pub fn post_message(&self, message: Value) -> Result<()> {
        if self.shared.disconnected.load(Ordering::Acquire) {
            return Err(Error::port_disconnected(self.id));
        }

        self.outgoing
            .send(PortEvent::Message(message))
            .map_err(|_| Error::port_disconnected(self.id))
    }

    /// Encodes and posts a packet to the other end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PortDisconnected`] if the channel is gone, or
    /// [`Error::Json`] if the packet cannot be encoded.
    pub fn post_packet(&self, packet: &Packet) -> Result<()> {
        self.post_message(packet.encode()?)
    }

    /// Disconnects the channel.
    ///
    /// Only the other end is notified. Idempotent.
    pub fn disconnect(&self) {
        if self.shared.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.outgoing.send(PortEvent::Disconnected);
        trace!(port_id = %self.id, name = %self.name, "Port disconnected");
    }
}

impl PartialEq for Port {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Port {}

// ============================================================================
// Event Forwarding
// ============================================================================

/// Forwards every event of one port end into an event loop's queue.
///
/// `wrap` tags each event with whatever the loop needs to route it. A
/// closed stream is forwarded as [`PortEvent::Disconnected`]. Stops after
/// the first disconnect or once `sink` is closed.
pub(crate) async fn forward_events<T, F>(
    mut events: PortEvents,
    sink: mpsc::UnboundedSender<T>,
    wrap: F,
) where
    T: Send + 'static,
    F: Fn(PortEvent) -> T + Send + 'static,
{
    loop {
        let event = events.recv().await.unwrap_or(PortEvent::Disconnected);
        let disconnected = matches!(event, PortEvent::Disconnected);
        if sink.send(wrap(event)).is_err() || disconnected {
            return;
        }
    }
}

// ============================================================================
// Connect
// ============================================================================

/// Opens channels to the coordinating process.
///
/// The Rust counterpart of `runtime.connect`: it never fails synchronously.
/// A peer that cannot be reached shows up as an immediate
/// [`PortEvent::Disconnected`] on the returned end.
pub trait Connect: Send + Sync + 'static {
    /// Opens a channel named after `channel` and returns the caller's end.
    fn connect(&self, channel: ChannelName) -> PortEnd;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[tokio::test]
    async fn test_message_reaches_other_end() {
        let (local, mut remote) = Port::pair("TEST", None);

        local.port.post_message(json!({ "n": 1 })).expect("post");
        assert_eq!(remote.events.recv().await, Some(PortEvent::Message(json!({ "n": 1 }))));
    }

    #[tokio::test]
    async fn test_disconnect_notifies_only_other_end() {
        let (mut local, mut remote) = Port::pair("TEST", Some(TabId::new(3)));

        local.port.disconnect();
        local.port.disconnect();

        assert_eq!(remote.events.recv().await, Some(PortEvent::Disconnected));
        assert!(remote.events.try_recv().is_err());
        assert!(local.events.try_recv().is_err());
        assert_eq!(remote.port.sender_tab(), Some(TabId::new(3)));
    }

    #[tokio::test]
    async fn test_writes_fail_after_disconnect_on_both_ends() {
        let (local, remote) = Port::pair("TEST", None);

        local.port.disconnect();

        assert!(local.port.post_message(json!(1)).is_err());
        assert!(remote.port.post_message(json!(1)).is_err());
        assert!(!remote.port.is_connected());
    }

    #[tokio::test]
    async fn test_dropped_peer_closes_stream_and_fails_writes() {
        let (local, remote) = Port::pair("TEST", None);
        let (port, mut events) = local.into_parts();

        drop(remote);

        assert!(port.post_message(json!(1)).is_err());
        assert_eq!(events.recv().await, None);
    }
}
