//! Bridge between the content script and the page-injected script.
//!
//! Both scripts live in the same page and talk by posting messages on the
//! page window, which every other script on the page can read and write.
//! [`WindowBus`] models that window as a broadcast channel where every event
//! carries the origin it was posted from.
//!
//! A [`WindowConnector`] only accepts events that:
//!
//! 1. come from the bus's own origin,
//! 2. decode as a [`WindowMessage`] (marker, sender, valid packet),
//! 3. were sent by the other side (echo suppression).
//!
//! [`InjectedScriptWindowConnector`] adds the readiness handshake used by
//! the content script: nothing is posted until the injected script announces
//! itself with a `ConnectorReadyPacket`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::protocol::{Packet, WindowMessage, WindowScriptName};

use super::connector::PacketHandler;

// ============================================================================
// Constants
// ============================================================================

/// Events a slow listener may fall behind before it starts losing them.
const WINDOW_BUS_CAPACITY: usize = 1024;

// ============================================================================
// WindowBus
// ============================================================================

/// One `message` event as seen by window listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowEvent {
    /// Origin of the posting document.
    pub origin: String,
    /// Posted data.
    pub data: Value,
}

/// Same-window message broadcast shared by every script on a page.
#[derive(Debug, Clone)]
pub struct WindowBus {
    origin: String,
    tx: broadcast::Sender<WindowEvent>,
}

impl WindowBus {
    /// Creates the window of a page loaded from `origin`.
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(WINDOW_BUS_CAPACITY);
        Self {
            origin: origin.into(),
            tx,
        }
    }

    /// Returns the page origin.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Posts `data` from this page's origin.
    pub fn post_message(&self, data: Value) {
        self.post_message_from(self.origin.clone(), data);
    }

    /// Posts `data` as if sent from another origin, e.g. a cross-origin frame.
    pub fn post_message_from(&self, origin: impl Into<String>, data: Value) {
        let event = WindowEvent {
            origin: origin.into(),
            data,
        };
        if self.tx.send(event).is_err() {
            trace!("Window message posted with no listeners");
        }
    }

    /// Starts listening for events posted from now on.
    #[inline]
    #[must_use]
    pub fn listen(&self) -> broadcast::Receiver<WindowEvent> {
        self.tx.subscribe()
    }
}

// ============================================================================
// WindowConnector
// ============================================================================

/// One side of the window bridge.
///
/// Packets that arrive while no handler is installed are dropped.
pub struct WindowConnector {
    bus: WindowBus,
    location: WindowScriptName,
    handler: Arc<Mutex<Option<PacketHandler>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for WindowConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowConnector")
            .field("origin", &self.bus.origin())
            .field("location", &self.location)
            .field("listening", &self.listener.lock().is_some())
            .finish()
    }
}

impl WindowConnector {
    /// Creates a connector for the script at `location`.
    #[must_use]
    pub fn new(bus: WindowBus, location: WindowScriptName) -> Self {
        Self {
            bus,
            location,
            handler: Arc::new(Mutex::new(None)),
            listener: Mutex::new(None),
        }
    }

    /// Returns which script this connector speaks for.
    #[inline]
    #[must_use]
    pub fn location(&self) -> WindowScriptName {
        self.location
    }

    /// Starts listening on the window. Idempotent.
    ///
    /// Must be called inside a tokio runtime.
    pub fn connect(&self) -> &Self {
        let mut listener = self.listener.lock();
        if listener.is_none() {
            let events = self.bus.listen();
            let origin = self.bus.origin().to_string();
            *listener = Some(tokio::spawn(listen(
                events,
                origin,
                self.location,
                Arc::clone(&self.handler),
            )));
            debug!(location = ?self.location, "Window connector listening");
        }
        self
    }

    /// Installs the packet consumer, replacing any previous one.
    pub fn subscribe<F>(&self, handler: F) -> &Self
    where
        F: FnMut(Packet) + Send + 'static,
    {
        *self.handler.lock() = Some(Box::new(handler));
        self
    }

    /// Posts a packet to the other side.
    pub fn send_packet(&self, packet: Packet) {
        match WindowMessage::new(self.location, packet).encode() {
            Ok(frame) => self.bus.post_message(frame),
            Err(e) => warn!(error = %e, "Failed to encode window message"),
        }
    }

    /// Posts a [`Packet::Debugging`] with `message`.
    pub fn send_debug_packet(&self, message: impl Into<String>) {
        self.send_packet(Packet::debug(message));
    }
}

impl Drop for WindowConnector {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

/// Window listener loop of one connector.
async fn listen(
    mut events: broadcast::Receiver<WindowEvent>,
    origin: String,
    location: WindowScriptName,
    handler: Arc<Mutex<Option<PacketHandler>>>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(?location, skipped, "Window listener fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if event.origin != origin {
            trace!(?location, origin = %event.origin, "Ignoring cross-origin message");
            continue;
        }

        let Ok(message) = WindowMessage::decode(&event.data) else {
            trace!(?location, "Ignoring non-bridge window message");
            continue;
        };

        if message.message_source == location {
            continue;
        }

        if let Some(handler) = handler.lock().as_mut() {
            handler(message.packet);
        }
    }

    debug!(?location, "Window listener terminated");
}

// ============================================================================
// InjectedScriptWindowConnector
// ============================================================================

/// Readiness state shared between the send path and the listener.
#[derive(Debug, Default)]
struct ReadyGate {
    ready: bool,
    buffer: Vec<Packet>,
}

/// Content-script side of the bridge, gated on the injected script's
/// `ConnectorReadyPacket`.
#[derive(Debug)]
pub struct InjectedScriptWindowConnector {
    connector: Arc<WindowConnector>,
    gate: Arc<Mutex<ReadyGate>>,
}

impl InjectedScriptWindowConnector {
    /// Creates the content-script connector on `bus`.
    #[must_use]
    pub fn new(bus: WindowBus) -> Self {
        Self {
            connector: Arc::new(WindowConnector::new(bus, WindowScriptName::ContentScript)),
            gate: Arc::new(Mutex::new(ReadyGate::default())),
        }
    }

    /// Starts listening on the window.
    pub fn connect(&self) -> &Self {
        self.connector.connect();
        self
    }

    /// Installs the packet consumer.
    ///
    /// `ConnectorReadyPacket` is consumed here: it opens the gate and
    /// flushes buffered packets in order, and never reaches `handler`.
    pub fn subscribe<F>(&self, mut handler: F) -> &Self
    where
        F: FnMut(Packet) + Send + 'static,
    {
        let gate = Arc::clone(&self.gate);
        let connector = Arc::downgrade(&self.connector);

        self.connector.subscribe(move |packet| {
            if !matches!(packet, Packet::ConnectorReady) {
                handler(packet);
                return;
            }

            let mut gate = gate.lock();
            gate.ready = true;
            let buffered = std::mem::take(&mut gate.buffer);
            if let Some(connector) = connector.upgrade() {
                debug!(count = buffered.len(), "Injected script ready, flushing");
                for packet in buffered {
                    connector.send_packet(packet);
                }
            }
        });
        self
    }

    /// Posts a packet to the injected script, or buffers it until ready.
    pub fn send_packet(&self, packet: Packet) {
        let mut gate = self.gate.lock();
        if gate.ready {
            self.connector.send_packet(packet);
        } else {
            gate.buffer.push(packet);
        }
    }

    /// Posts a [`Packet::Debugging`] with `message`.
    pub fn send_debug_packet(&self, message: impl Into<String>) {
        self.send_packet(Packet::debug(message));
    }

    /// Returns `true` once the injected script has announced itself.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.gate.lock().ready
    }

    /// Returns the number of packets waiting for the injected script.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.gate.lock().buffer.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::test_support::{init_tracing, settle};

    const ORIGIN: &str = "https://example.com";

    fn collector() -> (Arc<Mutex<Vec<Packet>>>, impl FnMut(Packet) + Send + 'static) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        (received, move |packet| sink.lock().push(packet))
    }

    fn frame(source: WindowScriptName, packet: Packet) -> Value {
        WindowMessage::new(source, packet).encode().expect("encode")
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_frames_from_other_side() {
        let bus = WindowBus::new(ORIGIN);
        let content = WindowConnector::new(bus.clone(), WindowScriptName::ContentScript);
        let injected = WindowConnector::new(bus.clone(), WindowScriptName::InjectedScript);
        let (received, handler) = collector();
        content.connect().subscribe(handler);
        injected.connect();

        injected.send_debug_packet("hello");
        settle().await;

        assert_eq!(*received.lock(), vec![Packet::debug("hello")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_echo_foreign_origin_and_unmarked() {
        init_tracing();
        let bus = WindowBus::new(ORIGIN);
        let content = WindowConnector::new(bus.clone(), WindowScriptName::ContentScript);
        let (received, handler) = collector();
        content.connect().subscribe(handler);

        content.send_debug_packet("echo");
        bus.post_message_from(
            "https://evil.example",
            frame(WindowScriptName::InjectedScript, Packet::debug("foreign")),
        );
        bus.post_message(json!({ "type": "DebuggingPacket", "payload": { "message": "bare" } }));
        bus.post_message(json!({
            "socketExtensionValidationKey": "SOCKET_EXTENSION_VALIDATION_KEY",
            "messageSource": "INJECTED_SCRIPT",
            "packet": { "type": "Nope" }
        }));
        bus.post_message(frame(WindowScriptName::InjectedScript, Packet::debug("ok")));
        settle().await;

        assert_eq!(*received.lock(), vec![Packet::debug("ok")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_handler_drops_packets() {
        let bus = WindowBus::new(ORIGIN);
        let content = WindowConnector::new(bus.clone(), WindowScriptName::ContentScript);
        content.connect();

        bus.post_message(frame(WindowScriptName::InjectedScript, Packet::debug("lost")));
        settle().await;

        let (received, handler) = collector();
        content.subscribe(handler);
        settle().await;
        assert!(received.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffers_until_injected_script_ready() {
        init_tracing();
        let bus = WindowBus::new(ORIGIN);
        let content = InjectedScriptWindowConnector::new(bus.clone());
        let (to_content, content_handler) = collector();
        content.connect().subscribe(content_handler);

        let injected = WindowConnector::new(bus.clone(), WindowScriptName::InjectedScript);
        let (to_injected, injected_handler) = collector();
        injected.connect().subscribe(injected_handler);

        content.send_packet(Packet::debug("one"));
        content.send_packet(Packet::debug("two"));
        settle().await;
        assert!(to_injected.lock().is_empty());
        assert_eq!(content.buffered(), 2);

        injected.send_packet(Packet::connector_ready());
        settle().await;
        assert!(content.is_ready());
        assert_eq!(*to_injected.lock(), vec![Packet::debug("one"), Packet::debug("two")]);

        content.send_packet(Packet::debug("three"));
        settle().await;
        assert_eq!(to_injected.lock().len(), 3);
        assert_eq!(content.buffered(), 0);
        assert!(to_content.lock().is_empty());
    }
}
