//! Extension-enabled setting.
//!
//! The flag is read before the content script wires anything. Reads fail
//! open: a missing key or a broken store both mean "enabled".
//!
//! | Store | Backing |
//! |-------|---------|
//! | [`MemorySettings`] | in-process map |
//! | [`FileSettings`] | JSON object on disk |

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Storage key of the extension-enabled flag.
pub const EXTENSION_ENABLED_KEY: &str = "local:EXTENSION_ENABLED";

/// Buffered change notifications per subscriber.
const CHANGE_CAPACITY: usize = 64;

// ============================================================================
// SettingsStore
// ============================================================================

/// A change to one stored key. `value` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingChange {
    /// Changed key.
    pub key: String,
    /// New value.
    pub value: Option<bool>,
}

/// Key-value store for boolean settings.
pub trait SettingsStore: Send + Sync {
    /// Reads `key`. `Ok(None)` means the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] if the store cannot be read.
    fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Writes `key` and notifies subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] if the store cannot be written.
    fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Removes `key` and notifies subscribers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] if the store cannot be written.
    fn remove(&self, key: &str) -> Result<()>;

    /// Returns a receiver of subsequent changes.
    fn subscribe(&self) -> broadcast::Receiver<SettingChange>;
}

// ============================================================================
// Extension Enabled
// ============================================================================

/// Returns whether the extension is enabled.
///
/// An absent key or a failing store both read as `true`.
#[must_use]
pub fn extension_enabled(store: &dyn SettingsStore) -> bool {
    match store.get_bool(EXTENSION_ENABLED_KEY) {
        Ok(value) => value.unwrap_or(true),
        Err(e) => {
            debug!(error = %e, "Settings read failed, assuming enabled");
            true
        }
    }
}

/// Stores the extension-enabled flag. Store errors are logged and dropped.
pub fn set_extension_enabled(store: &dyn SettingsStore, enabled: bool) {
    if let Err(e) = store.set_bool(EXTENSION_ENABLED_KEY, enabled) {
        warn!(error = %e, enabled, "Failed to store extension-enabled flag");
    }
}

/// Calls `on_change` whenever the flag changes, with removal read as `true`.
///
/// Runs until the store is dropped or the returned task is aborted.
pub fn watch_extension_enabled<F>(store: &dyn SettingsStore, mut on_change: F) -> JoinHandle<()>
where
    F: FnMut(bool) + Send + 'static,
{
    let mut changes = store.subscribe();

    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) if change.key == EXTENSION_ENABLED_KEY => {
                    on_change(change.value.unwrap_or(true));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Settings watcher fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// ============================================================================
// MemorySettings
// ============================================================================

/// In-memory settings store.
#[derive(Debug)]
pub struct MemorySettings {
    values: Mutex<FxHashMap<String, bool>>,
    changes: broadcast::Sender<SettingChange>,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySettings {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: Mutex::new(FxHashMap::default()),
            changes: broadcast::Sender::new(CHANGE_CAPACITY),
        }
    }

    fn notify(&self, key: &str, value: Option<bool>) {
        let _ = self.changes.send(SettingChange {
            key: key.to_string(),
            value,
        });
    }
}

impl SettingsStore for MemorySettings {
    fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        Ok(self.values.lock().get(key).copied())
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.values.lock().insert(key.to_string(), value);
        self.notify(key, Some(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        if self.values.lock().remove(key).is_some() {
            self.notify(key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingChange> {
        self.changes.subscribe()
    }
}

// ============================================================================
// FileSettings
// ============================================================================

/// Settings persisted as a flat JSON object.
///
/// A missing file is an empty store. Writes rewrite the whole file.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    lock: Mutex<()>,
    changes: broadcast::Sender<SettingChange>,
}

impl FileSettings {
    /// Opens the store at `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            changes: broadcast::Sender::new(CHANGE_CAPACITY),
        }
    }

    /// Returns the backing file path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(Error::settings(format!("{}: {e}", self.path.display()))),
        };

        match serde_json::from_str(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(Error::settings(format!(
                "{}: expected a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(Error::settings(format!("{}: {e}", self.path.display()))),
        }
    }

    fn store(&self, map: &Map<String, Value>) -> Result<()> {
        let text = serde_json::to_string_pretty(map)?;
        fs::write(&self.path, text)
            .map_err(|e| Error::settings(format!("{}: {e}", self.path.display())))
    }

    fn update(&self, key: &str, value: Option<bool>) -> Result<()> {
        {
            let _guard = self.lock.lock();
            let mut map = self.load()?;
            match value {
                Some(value) => {
                    map.insert(key.to_string(), Value::Bool(value));
                }
                None => {
                    if map.remove(key).is_none() {
                        return Ok(());
                    }
                }
            }
            self.store(&map)?;
        }

        let _ = self.changes.send(SettingChange {
            key: key.to_string(),
            value,
        });
        Ok(())
    }
}

impl SettingsStore for FileSettings {
    fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        let _guard = self.lock.lock();
        match self.load()?.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(value)) => Ok(Some(*value)),
            Some(other) => Err(Error::settings(format!("{key}: expected a boolean, got {other}"))),
        }
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.update(key, Some(value))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(key, None)
    }

    fn subscribe(&self) -> broadcast::Receiver<SettingChange> {
        self.changes.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::test_support::settle;

    /// Store whose every operation fails.
    struct BrokenSettings {
        changes: broadcast::Sender<SettingChange>,
    }

    impl BrokenSettings {
        fn new() -> Self {
            Self {
                changes: broadcast::Sender::new(CHANGE_CAPACITY),
            }
        }
    }

    impl SettingsStore for BrokenSettings {
        fn get_bool(&self, _key: &str) -> Result<Option<bool>> {
            Err(Error::settings("unavailable"))
        }

        fn set_bool(&self, _key: &str, _value: bool) -> Result<()> {
            Err(Error::settings("unavailable"))
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Err(Error::settings("unavailable"))
        }

        fn subscribe(&self) -> broadcast::Receiver<SettingChange> {
            self.changes.subscribe()
        }
    }

    #[test]
    fn test_absent_key_reads_enabled() {
        assert!(extension_enabled(&MemorySettings::new()));
    }

    #[test]
    fn test_store_failure_reads_enabled() {
        let store = BrokenSettings::new();
        assert!(extension_enabled(&store));

        set_extension_enabled(&store, false);
        assert!(extension_enabled(&store));
    }

    #[test]
    fn test_memory_round_trip() {
        let store = MemorySettings::new();

        set_extension_enabled(&store, false);
        assert!(!extension_enabled(&store));

        store.remove(EXTENSION_ENABLED_KEY).expect("remove");
        assert!(extension_enabled(&store));
    }

    #[test]
    fn test_file_store_persists() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");

        let store = FileSettings::new(&path);
        assert!(extension_enabled(&store));
        set_extension_enabled(&store, false);

        let reopened = FileSettings::new(&path);
        assert!(!extension_enabled(&reopened));
        assert_eq!(reopened.get_bool("other")?, None);
        Ok(())
    }

    #[test]
    fn test_file_store_corrupt_file_fails_open() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json")?;

        let store = FileSettings::new(&path);
        assert!(store.get_bool(EXTENSION_ENABLED_KEY).is_err());
        assert!(extension_enabled(&store));
        Ok(())
    }

    #[test]
    fn test_file_store_rejects_non_boolean() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"local:EXTENSION_ENABLED": "no"}"#)?;

        let err = FileSettings::new(&path)
            .get_bool(EXTENSION_ENABLED_KEY)
            .unwrap_err();
        assert!(matches!(err, Error::Settings { .. }));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_maps_removal_to_enabled() {
        let store = MemorySettings::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let watcher = watch_extension_enabled(&store, move |enabled| sink.lock().push(enabled));

        set_extension_enabled(&store, false);
        store.set_bool("unrelated", false).expect("set");
        store.remove(EXTENSION_ENABLED_KEY).expect("remove");
        settle().await;

        assert_eq!(*seen.lock(), vec![false, true]);
        watcher.abort();
    }
}
