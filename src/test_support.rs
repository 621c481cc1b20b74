//! Shared helpers for in-crate tests.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use crate::identifiers::TabId;
use crate::protocol::ChannelName;
use crate::transport::{Connect, Port, PortEnd};

// ============================================================================
// Tracing
// ============================================================================

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Lets every spawned task run until the runtime is idle.
///
/// Meant for `start_paused` tests, where the sleep only completes once no
/// task can make progress.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

// ============================================================================
// TestTransport
// ============================================================================

/// Scriptable [`Connect`] implementation.
///
/// Every `connect` opens a fresh pair and keeps the far end for the test to
/// inspect, unless a dead port was scripted or the transport refuses
/// connections (far end dropped at once).
#[derive(Debug, Default)]
pub(crate) struct TestTransport {
    sender_tab: Option<TabId>,
    refuse: AtomicBool,
    connects: AtomicUsize,
    dead: Mutex<VecDeque<PortEnd>>,
    remotes: Mutex<VecDeque<PortEnd>>,
}

impl TestTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_sender_tab(tab_id: TabId) -> Self {
        Self {
            sender_tab: Some(tab_id),
            ..Self::default()
        }
    }

    /// Every connection is dropped by the peer immediately.
    pub(crate) fn refusing() -> Self {
        let transport = Self::default();
        transport.refuse.store(true, Ordering::Release);
        transport
    }

    /// The next `connect` returns a port whose peer is already gone.
    pub(crate) fn script_dead_port(&self, channel: ChannelName) {
        let (local, remote) = Port::pair_for(channel, self.sender_tab);
        drop(remote);
        self.dead.lock().push_back(local);
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::Acquire)
    }

    /// Removes the oldest far end not yet taken.
    pub(crate) fn take_remote(&self) -> Option<PortEnd> {
        self.remotes.lock().pop_front()
    }
}

impl Connect for TestTransport {
    fn connect(&self, channel: ChannelName) -> PortEnd {
        self.connects.fetch_add(1, Ordering::AcqRel);

        if let Some(local) = self.dead.lock().pop_front() {
            return local;
        }

        let (local, remote) = Port::pair_for(channel, self.sender_tab);
        if !self.refuse.load(Ordering::Acquire) {
            self.remotes.lock().push_back(remote);
        }
        local
    }
}
