//! Per-context wiring.
//!
//! Each extension context owns a small amount of glue around the transport
//! and state layers.
//!
//! | Module | Context |
//! |--------|---------|
//! | `settings` | Extension-enabled flag, read by the content script |
//! | `content_script` | Page ↔ relay forwarding |
//! | `devtools` | Panel state fed from the relay |

// ============================================================================
// Submodules
// ============================================================================

/// Content-script wiring.
pub mod content_script;

/// Devtools-panel wiring.
pub mod devtools;

/// Extension-enabled setting.
pub mod settings;

// ============================================================================
// Re-exports
// ============================================================================

pub use content_script::ContentScript;
pub use devtools::DevtoolsPanel;
pub use settings::{
    EXTENSION_ENABLED_KEY, FileSettings, MemorySettings, SettingChange, SettingsStore,
    extension_enabled, set_extension_enabled, watch_extension_enabled,
};
