//! Content-script wiring.
//!
//! Joins the relay connection and the window bridge so packets flow both
//! ways between the page and the devtools panel.
//!
//! ```text
//! injected script ──window──► InjectedScriptWindowConnector ──► PortConnector ──► relay
//! injected script ◄──window── InjectedScriptWindowConnector ◄── PortConnector ◄── relay
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{debug, info};

use crate::protocol::{ChannelName, Packet};
use crate::transport::{
    Connect, InjectedScriptWindowConnector, PortConnector, ReconnectPolicy, WindowBus,
};

use super::settings::{SettingsStore, extension_enabled};

// ============================================================================
// ContentScript
// ============================================================================

/// A running content script for one page.
///
/// Dropping it stops the relay connector.
#[derive(Debug)]
pub struct ContentScript {
    relay: PortConnector,
    page: Arc<InjectedScriptWindowConnector>,
}

impl ContentScript {
    /// Starts the content script with the default reconnect policy.
    ///
    /// Returns `None` when the extension is disabled.
    #[must_use]
    pub fn start(
        settings: &dyn SettingsStore,
        transport: Arc<dyn Connect>,
        bus: WindowBus,
    ) -> Option<Self> {
        Self::start_with_policy(settings, transport, bus, ReconnectPolicy::default())
    }

    /// Starts the content script with a custom reconnect policy.
    ///
    /// Returns `None` when the extension is disabled.
    #[must_use]
    pub fn start_with_policy(
        settings: &dyn SettingsStore,
        transport: Arc<dyn Connect>,
        bus: WindowBus,
        policy: ReconnectPolicy,
    ) -> Option<Self> {
        if !extension_enabled(settings) {
            info!("Extension disabled, content script idle");
            return None;
        }

        let relay = PortConnector::with_policy(transport, ChannelName::ContentScript, policy);
        relay.connect();
        // Clears the panel on navigation and reload.
        relay.send_packet(Packet::clear_devtools_state());

        let page = Arc::new(InjectedScriptWindowConnector::new(bus));
        page.connect();

        let to_page = Arc::clone(&page);
        relay.subscribe(move |packet| to_page.send_packet(packet));

        let to_relay = relay.clone();
        page.subscribe(move |packet| to_relay.send_packet(packet));

        debug!("Content script started");
        Some(Self { relay, page })
    }

    /// Handles the page's `pageshow` event.
    ///
    /// A page restored from the back/forward cache gets a fresh relay
    /// connection and a cleared panel.
    pub fn page_show(&self, persisted: bool) {
        if !persisted {
            return;
        }

        debug!("Page restored from cache, reconnecting");
        self.relay.connect();
        self.relay.send_packet(Packet::clear_devtools_state());
    }

    /// Returns the relay connector.
    #[inline]
    #[must_use]
    pub fn relay(&self) -> &PortConnector {
        &self.relay
    }

    /// Returns the injected-script side of the window bridge.
    #[inline]
    #[must_use]
    pub fn page(&self) -> &InjectedScriptWindowConnector {
        &self.page
    }
}

impl Drop for ContentScript {
    fn drop(&mut self) {
        self.relay.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::Value;

    use crate::context::settings::{MemorySettings, set_extension_enabled};
    use crate::identifiers::TabId;
    use crate::protocol::{InjectDestination, WindowMessage, WindowScriptName};
    use crate::test_support::{TestTransport, init_tracing, settle};
    use crate::transport::{PortEnd, PortEvent, WindowConnector};

    const ORIGIN: &str = "https://example.com";

    fn decode_all(end: &mut PortEnd) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Ok(event) = end.events.try_recv() {
            if let PortEvent::Message(value) = event {
                packets.push(Packet::decode(&value).expect("packet"));
            }
        }
        packets
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_extension_does_nothing() {
        let settings = MemorySettings::new();
        set_extension_enabled(&settings, false);
        let transport = Arc::new(TestTransport::new());

        let script = ContentScript::start(&settings, transport.clone(), WindowBus::new(ORIGIN));
        settle().await;

        assert!(script.is_none());
        assert_eq!(transport.connects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_connects_and_clears_panel() {
        init_tracing();
        let transport = Arc::new(TestTransport::with_sender_tab(TabId::new(1)));

        let _script =
            ContentScript::start(&MemorySettings::new(), transport.clone(), WindowBus::new(ORIGIN))
                .expect("enabled");
        settle().await;

        let mut remote = transport.take_remote().expect("port opened");
        assert_eq!(remote.port.name(), "CONTENT_SCRIPT_CHANNEL");
        assert_eq!(decode_all(&mut remote), vec![Packet::clear_devtools_state()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_packets_cross_both_ways() {
        let transport = Arc::new(TestTransport::new());
        let bus = WindowBus::new(ORIGIN);

        let injected = WindowConnector::new(bus.clone(), WindowScriptName::InjectedScript);
        let from_relay = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&from_relay);
        injected.connect().subscribe(move |packet| sink.lock().push(packet));

        let script = ContentScript::start(&MemorySettings::new(), transport.clone(), bus)
            .expect("enabled");
        settle().await;
        let mut remote = transport.take_remote().expect("port opened");
        let _ = decode_all(&mut remote);

        // Relay → page waits for the injected script to announce itself.
        let inject = Packet::user_injected("s1".into(), InjectDestination::Server, "hi");
        remote.port.post_packet(&inject).expect("post");
        settle().await;
        assert!(from_relay.lock().is_empty());
        assert_eq!(script.page().buffered(), 1);

        injected.send_packet(Packet::connector_ready());
        settle().await;
        assert_eq!(*from_relay.lock(), vec![inject]);

        // Page → relay.
        injected.send_debug_packet("from page");
        settle().await;
        assert_eq!(decode_all(&mut remote), vec![Packet::debug("from page")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_show_from_cache_reconnects() {
        let transport = Arc::new(TestTransport::new());
        let script =
            ContentScript::start(&MemorySettings::new(), transport.clone(), WindowBus::new(ORIGIN))
                .expect("enabled");
        settle().await;
        let _first = transport.take_remote().expect("first port");

        script.page_show(false);
        settle().await;
        assert_eq!(transport.connects(), 1);

        script.page_show(true);
        settle().await;
        assert_eq!(transport.connects(), 2);

        let mut second = transport.take_remote().expect("second port");
        assert_eq!(decode_all(&mut second), vec![Packet::clear_devtools_state()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_window_frames_ignored() {
        let transport = Arc::new(TestTransport::new());
        let bus = WindowBus::new(ORIGIN);
        let _script = ContentScript::start(&MemorySettings::new(), transport.clone(), bus.clone())
            .expect("enabled");
        settle().await;
        let mut remote = transport.take_remote().expect("port opened");
        let _ = decode_all(&mut remote);

        let frame = WindowMessage::new(WindowScriptName::InjectedScript, Packet::debug("x"))
            .encode()
            .expect("encode");
        bus.post_message_from("https://evil.example", frame);
        bus.post_message(Value::String("unrelated".to_string()));
        settle().await;

        assert!(decode_all(&mut remote).is_empty());
    }
}
