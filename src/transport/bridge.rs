//! Carries a port over a WebSocket.
//!
//! # Handshake
//!
//! The dialing side sends one text frame before anything else:
//!
//! ```json
//! { "name": "CONTENT_SCRIPT_CHANNEL", "tabId": 1234 }
//! ```
//!
//! `name` is the port name; `tabId` is the sender tab and may be omitted
//! (devtools panels are not inside a tab). After the hello, every text
//! frame is one JSON message of the port, in both directions.

// ============================================================================
// Imports
// ============================================================================

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::TabId;

use super::port::{PortEnd, PortEvent};

// ============================================================================
// Hello
// ============================================================================

/// First frame sent by a dialing context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Hello {
    /// Port name to open.
    pub name: String,
    /// Sender tab, if the context lives in one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabId>,
}

impl Hello {
    /// Parses a hello frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the frame is not a valid hello.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::protocol(format!("invalid hello frame: {e}")))
    }

    /// Encodes the hello as frame text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// Pumps frames between `ws` and `end` until either side goes away.
///
/// A closed or failed socket disconnects the port; a disconnected port
/// closes the socket. Non-JSON text frames are dropped.
pub(crate) async fn bridge<S>(ws: WebSocketStream<S>, end: PortEnd)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_write, mut ws_read) = ws.split();
    let PortEnd { port, mut events } = end;

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<Value>(&text) {
                        Ok(value) => {
                            if let Err(e) = port.post_message(value) {
                                debug!(port_id = %port.id(), error = %e, "Port gone, closing socket");
                                let _ = ws_write.close().await;
                                break;
                            }
                        }
                        Err(e) => warn!(port_id = %port.id(), error = %e, "Dropping non-JSON frame"),
                    },

                    Some(Ok(Message::Close(_))) | None => {
                        debug!(port_id = %port.id(), "WebSocket closed by remote");
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(port_id = %port.id(), error = %e, "WebSocket error");
                        break;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            event = events.recv() => {
                match event {
                    Some(PortEvent::Message(value)) => {
                        trace!(port_id = %port.id(), "Frame out");
                        if let Err(e) = ws_write.send(Message::Text(value.to_string().into())).await {
                            warn!(port_id = %port.id(), error = %e, "Failed to send frame");
                            break;
                        }
                    }

                    Some(PortEvent::Disconnected) | None => {
                        debug!(port_id = %port.id(), "Port disconnected, closing socket");
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    port.disconnect();
}

// ============================================================================
// Tests
// ============================================================================
