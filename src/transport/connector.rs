//! Self-healing connector over a named port.
//!
//! A [`PortConnector`] keeps a logical channel to the coordinating process
//! open across disconnects. It is a cheap, cloneable handle to an actor task
//! that owns all connector state, so every port callback sees that state
//! fresh and runs to completion before the next one.
//!
//! # Event Loop
//!
//! The actor task handles:
//!
//! - Commands from the handle (`connect`, `subscribe`, `send_packet`)
//! - Messages and disconnects from every port it still listens to
//! - Its own scheduled reconnect
//!
//! Commands are drained before port events.
//!
//! # Guarantees
//!
//! | Situation | Behavior |
//! |-----------|----------|
//! | Packet arrives before `subscribe` | buffered, flushed in order on `subscribe` |
//! | Send with no active port | dropped |
//! | Send fails | one reconnect, one retry, then dropped |
//! | Active port disconnects | one reconnect scheduled, coalesced |
//! | Reconnect storm | loop detector trips, connector left without a port |
//! | Message from a stale port | ignored, stale port disconnected |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::PortId;
use crate::protocol::{ChannelName, Packet};

use super::loop_detector::{LoopDetector, ReconnectPolicy};
use super::port::{Connect, Port, PortEnd, PortEvent, forward_events};

// ============================================================================
// Types
// ============================================================================

/// Packet consumer installed with [`PortConnector::subscribe`].
pub type PacketHandler = Box<dyn FnMut(Packet) + Send>;

/// Snapshot of a connector's internal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorStatus {
    /// Port currently used for sending, if any.
    pub active_port: Option<PortId>,
    /// Packets waiting for a subscriber.
    pub buffered: usize,
    /// Whether a consumer is installed.
    pub subscribed: bool,
    /// Whether a reconnect is pending.
    pub reconnect_scheduled: bool,
    /// Number of ports opened so far.
    pub connects: u64,
}

// ============================================================================
// Commands and Events
// ============================================================================

/// Commands sent from the handle to the event loop.
enum ConnectorCommand {
    /// Open a fresh port.
    Connect,
    /// Install the packet consumer.
    Subscribe(PacketHandler),
    /// Send a packet on the active port.
    Send(Packet),
    /// Report internal state.
    Status(oneshot::Sender<ConnectorStatus>),
    /// Stop the event loop.
    Shutdown,
}

/// Events the event loop posts to itself.
enum InternalEvent {
    /// Event observed on one of the listened ports.
    Port { port_id: PortId, event: PortEvent },
    /// Deferred reconnect.
    Reconnect,
}

// ============================================================================
// PortConnector
// ============================================================================

/// Buffering, auto-reconnecting channel to one named peer.
///
/// # Example
///
/// ```ignore
/// let connector = PortConnector::new(transport, ChannelName::ContentScript);
/// connector.connect().subscribe(|packet| println!("{}", packet.kind()));
/// connector.send_packet(Packet::clear_devtools_state());
/// ```
///
/// The event loop stops on [`shutdown`](Self::shutdown) or once every
/// handle is dropped.
#[derive(Clone)]
pub struct PortConnector {
    /// Channel this connector opens.
    channel: ChannelName,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectorCommand>,
}

impl fmt::Debug for PortConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortConnector")
            .field("channel", &self.channel)
            .field("running", &!self.command_tx.is_closed())
            .finish()
    }
}

impl PortConnector {
    /// Creates a connector with the default reconnect policy.
    ///
    /// Spawns the event loop task; must be called inside a tokio runtime.
    /// No port is opened until [`connect`](Self::connect).
    #[must_use]
    pub fn new(transport: Arc<dyn Connect>, channel: ChannelName) -> Self {
        Self::with_policy(transport, channel, ReconnectPolicy::default())
    }

    /// Creates a connector with a custom reconnect policy.
    #[must_use]
    pub fn with_policy(
        transport: Arc<dyn Connect>,
        channel: ChannelName,
        policy: ReconnectPolicy,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let actor = ConnectorActor {
            channel,
            transport,
            active: None,
            listeners: FxHashMap::default(),
            handler: None,
            buffer: Vec::new(),
            detector: LoopDetector::new(policy),
            reconnect_scheduled: false,
            connects: 0,
            events_tx,
        };

        tokio::spawn(actor.run(command_rx, events_rx));

        Self {
            channel,
            command_tx,
        }
    }

    /// Returns the channel this connector opens.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> ChannelName {
        self.channel
    }

    /// Opens a port, replacing the active one if any.
    pub fn connect(&self) -> &Self {
        self.command(ConnectorCommand::Connect);
        self
    }

    /// Installs the packet consumer, replacing any previous one.
    ///
    /// Packets buffered so far are delivered first, in arrival order.
    pub fn subscribe<F>(&self, handler: F) -> &Self
    where
        F: FnMut(Packet) + Send + 'static,
    {
        self.command(ConnectorCommand::Subscribe(Box::new(handler)));
        self
    }

    /// Sends a packet to the peer. Never fails; see the module docs for
    /// when packets are dropped.
    pub fn send_packet(&self, packet: Packet) {
        self.command(ConnectorCommand::Send(packet));
    }

    /// Sends a [`Packet::Debugging`] with `message`.
    pub fn send_debug_packet(&self, message: impl Into<String>) {
        self.send_packet(Packet::debug(message));
    }

    /// Returns a snapshot of the connector's state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the event loop has stopped.
    pub async fn status(&self) -> Result<ConnectorStatus> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(ConnectorCommand::Status(tx))
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)
    }

    /// Stops the event loop and disconnects the active port.
    pub fn shutdown(&self) {
        self.command(ConnectorCommand::Shutdown);
    }

    fn command(&self, command: ConnectorCommand) {
        if self.command_tx.send(command).is_err() {
            trace!(channel = %self.channel, "Connector stopped, command ignored");
        }
    }
}

// ============================================================================
// ConnectorActor
// ============================================================================

/// State owned by the event loop.
struct ConnectorActor {
    channel: ChannelName,
    transport: Arc<dyn Connect>,
    /// Port used for sending.
    active: Option<Port>,
    /// Ports still listened to, with their event pumps.
    listeners: FxHashMap<PortId, (Port, JoinHandle<()>)>,
    handler: Option<PacketHandler>,
    /// Packets received before a handler was installed.
    buffer: Vec<Packet>,
    detector: LoopDetector,
    reconnect_scheduled: bool,
    connects: u64,
    events_tx: mpsc::UnboundedSender<InternalEvent>,
}

impl ConnectorActor {
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<ConnectorCommand>,
        mut events_rx: mpsc::UnboundedReceiver<InternalEvent>,
    ) {
        loop {
            tokio::select! {
                biased;

                command = command_rx.recv() => {
                    match command {
                        Some(ConnectorCommand::Shutdown) => {
                            debug!(channel = %self.channel, "Shutdown command received");
                            break;
                        }
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!(channel = %self.channel, "Command channel closed");
                            break;
                        }
                    }
                }

                Some(event) = events_rx.recv() => self.handle_event(event),
            }
        }

        self.teardown();
        debug!(channel = %self.channel, "Connector event loop terminated");
    }

    fn handle_command(&mut self, command: ConnectorCommand) {
        match command {
            ConnectorCommand::Connect => self.internal_connect(),
            ConnectorCommand::Subscribe(handler) => self.subscribe(handler),
            ConnectorCommand::Send(packet) => self.send(packet),
            ConnectorCommand::Status(tx) => {
                let _ = tx.send(self.status());
            }
            ConnectorCommand::Shutdown => {}
        }
    }

    fn handle_event(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::Port {
                port_id,
                event: PortEvent::Message(message),
            } => self.on_port_message(port_id, message),

            InternalEvent::Port {
                port_id,
                event: PortEvent::Disconnected,
            } => self.on_port_disconnect(port_id),

            InternalEvent::Reconnect => {
                self.reconnect_scheduled = false;
                self.internal_connect();
            }
        }
    }

    fn internal_connect(&mut self) {
        let PortEnd { port, events } = self.transport.connect(self.channel);
        let port_id = port.id();
        self.connects += 1;

        let pump = tokio::spawn(forward_events(
            events,
            self.events_tx.clone(),
            move |event| InternalEvent::Port { port_id, event },
        ));
        self.listeners.insert(port_id, (port.clone(), pump));
        self.active = Some(port);

        debug!(channel = %self.channel, %port_id, connects = self.connects, "Port connected");
    }

    fn subscribe(&mut self, mut handler: PacketHandler) {
        if !self.buffer.is_empty() {
            trace!(channel = %self.channel, count = self.buffer.len(), "Flushing buffered packets");
            for packet in self.buffer.drain(..) {
                handler(packet);
            }
        }
        self.handler = Some(handler);
    }

    fn send(&mut self, packet: Packet) {
        let message = match packet.encode() {
            Ok(message) => message,
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "Failed to encode packet");
                return;
            }
        };

        let Some(port) = &self.active else {
            trace!(channel = %self.channel, kind = packet.kind(), "No active port, packet dropped");
            return;
        };

        if let Err(e) = port.post_message(message.clone()) {
            debug!(channel = %self.channel, error = %e, "Send failed, reconnecting");
            self.internal_connect();

            if let Some(port) = &self.active
                && let Err(e) = port.post_message(message)
            {
                warn!(channel = %self.channel, error = %e, kind = packet.kind(), "Retry failed, packet dropped");
            }
        }
    }

    fn on_port_message(&mut self, port_id: PortId, message: Value) {
        if !self.is_active(port_id) {
            if let Some((port, pump)) = self.listeners.remove(&port_id) {
                debug!(channel = %self.channel, %port_id, "Message on stale port, disconnecting it");
                port.disconnect();
                pump.abort();
            }
            return;
        }

        let packet = match Packet::decode(&message) {
            Ok(packet) => packet,
            Err(e) => {
                trace!(channel = %self.channel, error = %e, "Dropping invalid message");
                return;
            }
        };

        match self.handler.as_mut() {
            Some(handler) => handler(packet),
            None => self.buffer.push(packet),
        }
    }

    fn on_port_disconnect(&mut self, port_id: PortId) {
        if let Some((_, pump)) = self.listeners.remove(&port_id) {
            pump.abort();
        }

        if !self.is_active(port_id) {
            trace!(channel = %self.channel, %port_id, "Stale port disconnected");
            return;
        }

        if self.detector.track_iteration() {
            warn!(
                channel = %self.channel,
                iterations = self.detector.iterations(),
                window_ms = self.detector.window_duration().as_millis() as u64,
                "Reconnect loop detected, giving up"
            );
            self.active = None;
            return;
        }

        if self.reconnect_scheduled {
            return;
        }

        self.reconnect_scheduled = true;
        let _ = self.events_tx.send(InternalEvent::Reconnect);
        debug!(channel = %self.channel, %port_id, "Active port disconnected, reconnect scheduled");
    }

    #[inline]
    fn is_active(&self, port_id: PortId) -> bool {
        self.active.as_ref().is_some_and(|port| port.id() == port_id)
    }

    fn status(&self) -> ConnectorStatus {
        ConnectorStatus {
            active_port: self.active.as_ref().map(Port::id),
            buffered: self.buffer.len(),
            subscribed: self.handler.is_some(),
            reconnect_scheduled: self.reconnect_scheduled,
            connects: self.connects,
        }
    }

    fn teardown(&mut self) {
        for (_, (_, pump)) in self.listeners.drain() {
            pump.abort();
        }
        if let Some(port) = self.active.take() {
            port.disconnect();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
