//! WebSocket [`Connect`] implementation for contexts in another process.

// ============================================================================
// Imports
// ============================================================================

use futures_util::SinkExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::protocol::ChannelName;

use super::bridge::{Hello, bridge};
use super::port::{Connect, Port, PortEnd};

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Opens ports on a remote [`RelayServer`](super::RelayServer).
///
/// `connect` returns at once; dialing happens in the background. A failed
/// dial or a dropped socket surfaces as an ordinary port disconnect, which
/// a [`PortConnector`](super::PortConnector) answers by reconnecting.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
    sender_tab: Option<TabId>,
}

impl WebSocketTransport {
    /// Creates a transport dialing `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `url` is not a `ws://` or `wss://` URL.
    pub fn new(url: &str, sender_tab: Option<TabId>) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::config(format!("invalid relay url {url:?}: {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "relay url must use ws:// or wss://, got {}://",
                url.scheme()
            )));
        }

        Ok(Self { url, sender_tab })
    }

    /// Returns the relay URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Connect for WebSocketTransport {
    fn connect(&self, channel: ChannelName) -> PortEnd {
        let (local, remote) = Port::pair_for(channel, self.sender_tab);
        let url = self.url.clone();
        let hello = Hello {
            name: channel.to_string(),
            tab_id: self.sender_tab,
        };

        tokio::spawn(async move {
            if let Err(e) = dial(url, hello, remote).await {
                warn!(%channel, error = %e, "Relay dial failed");
            }
        });

        local
    }
}

/// Dials, sends the hello and bridges. Disconnects `end` on failure.
async fn dial(url: Url, hello: Hello, end: PortEnd) -> Result<()> {
    let hello = match hello.to_text() {
        Ok(text) => text,
        Err(e) => {
            end.port.disconnect();
            return Err(e);
        }
    };

    let mut ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            end.port.disconnect();
            return Err(e.into());
        }
    };

    if let Err(e) = ws.send(Message::Text(hello.into())).await {
        end.port.disconnect();
        return Err(e.into());
    }

    debug!(%url, port_id = %end.port.id(), "Relay connected");
    bridge(ws, end).await;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
