//! WebSocket front door of the relay hub.
//!
//! Lets contexts running in other processes open ports on a [`RelayHub`].
//!
//! # Connection Flow
//!
//! 1. `RelayServer::bind` binds to `ip:port` (port 0 = random)
//! 2. A context dials `ws_url()` and upgrades to WebSocket
//! 3. The context sends its hello frame within [`HELLO_TIMEOUT`]
//! 4. The socket is bridged to a port handed to the hub

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

use super::bridge::{Hello, bridge};
use super::hub::RelayHub;
use super::port::Port;

// ============================================================================
// Constants
// ============================================================================

/// Default bind address (localhost).
const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Time a new connection has to send its hello frame.
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept poll interval, bounds how long shutdown takes to notice.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// RelayServer
// ============================================================================

/// WebSocket server routing every accepted socket into a [`RelayHub`].
///
/// # Example
///
/// ```ignore
/// let hub = RelayHub::new();
/// let server = RelayServer::start(hub.clone()).await?;
/// println!("Relay listening on {}", server.ws_url());
/// ```
#[derive(Debug)]
pub struct RelayServer {
    /// Address the listener is bound to.
    addr: SocketAddr,
    /// Hub receiving the bridged ports.
    hub: RelayHub,
    /// Shutdown flag.
    shutdown: AtomicBool,
}

impl RelayServer {
    /// Binds to `localhost:0` and starts accepting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn start(hub: RelayHub) -> Result<Arc<Self>> {
        Self::bind(DEFAULT_BIND_IP, 0, hub).await
    }

    /// Binds to `ip:port` and starts accepting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16, hub: RelayHub) -> Result<Arc<Self>> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let addr = listener.local_addr()?;

        let server = Arc::new(Self {
            addr,
            hub,
            shutdown: AtomicBool::new(false),
        });

        let server_clone = Arc::clone(&server);
        tokio::spawn(async move {
            server_clone.accept_loop(listener).await;
        });

        info!(%addr, "Relay server started");

        Ok(server)
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Returns the bound socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the WebSocket URL for this server.
    ///
    /// Format: `ws://{ip}:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Stops accepting new connections. Bridged sockets stay up.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        info!(addr = %self.addr, "Relay server shutting down");
    }

    /// Background task that accepts new connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
                Ok(Ok((stream, addr))) => {
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, addr).await {
                            warn!(error = %e, %addr, "Connection handling failed");
                        }
                    });
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Accept failed");
                }
                Err(_) => continue,
            }
        }

        debug!("Accept loop terminated");
    }

    /// Upgrades, reads the hello and bridges one connection.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let mut ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let hello = match timeout(HELLO_TIMEOUT, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => Hello::parse(&text)?,
            Ok(Some(Ok(_))) => return Err(Error::protocol("expected text hello frame")),
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => return Err(Error::ConnectionClosed),
            Err(_) => return Err(Error::connection_timeout(HELLO_TIMEOUT.as_millis() as u64)),
        };

        debug!(%addr, name = %hello.name, tab_id = ?hello.tab_id, "Hello received");

        let (local, remote) = Port::pair(hello.name, hello.tab_id);
        self.hub.on_connect(remote)?;
        bridge(ws, local).await;

        debug!(%addr, "Connection closed");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
