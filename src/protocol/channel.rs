//! Channel naming convention for extension ports.
//!
//! | Channel | Port name |
//! |---------|-----------|
//! | Content script | `CONTENT_SCRIPT_CHANNEL` |
//! | Devtools panel | `DEVTOOLS_CHANNEL:<tabId>` |
//!
//! Content-script ports are routed by the sender's tab; devtools ports carry
//! the tab id in their name because the panel is not itself inside the tab.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::identifiers::TabId;

// ============================================================================
// Constants
// ============================================================================

/// Port name used by content scripts.
pub const CONTENT_SCRIPT_CHANNEL: &str = "CONTENT_SCRIPT_CHANNEL";

/// Port name prefix used by devtools panels.
pub const DEVTOOLS_CHANNEL_PREFIX: &str = "DEVTOOLS_CHANNEL";

// ============================================================================
// ChannelName
// ============================================================================

/// Parsed port name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelName {
    /// A content script's channel.
    ContentScript,
    /// A devtools panel's channel for the given tab.
    Devtools(TabId),
}

impl ChannelName {
    /// Returns the devtools channel for a tab.
    #[inline]
    #[must_use]
    pub const fn devtools(tab_id: TabId) -> Self {
        Self::Devtools(tab_id)
    }

    /// Returns `true` for the content-script channel.
    #[inline]
    #[must_use]
    pub const fn is_content_script(&self) -> bool {
        matches!(self, Self::ContentScript)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentScript => f.write_str(CONTENT_SCRIPT_CHANNEL),
            Self::Devtools(tab_id) => write!(f, "{DEVTOOLS_CHANNEL_PREFIX}:{tab_id}"),
        }
    }
}

impl FromStr for ChannelName {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        if name == CONTENT_SCRIPT_CHANNEL {
            return Ok(Self::ContentScript);
        }

        match name.split_once(':') {
            Some((DEVTOOLS_CHANNEL_PREFIX, suffix)) => suffix
                .parse::<TabId>()
                .map(Self::Devtools)
                .map_err(|_| Error::invalid_channel_name(name)),
            _ => Err(Error::invalid_channel_name(name)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devtools_name_round_trip() {
        let name = ChannelName::devtools(TabId::new(1234));
        assert_eq!(name.to_string(), "DEVTOOLS_CHANNEL:1234");
        assert_eq!("DEVTOOLS_CHANNEL:1234".parse::<ChannelName>().ok(), Some(name));
    }

    #[test]
    fn test_content_script_name() {
        let name: ChannelName = CONTENT_SCRIPT_CHANNEL.parse().expect("parse");
        assert!(name.is_content_script());
    }

    #[test]
    fn test_rejects_unknown_names() {
        assert!("DEVTOOLS_CHANNEL".parse::<ChannelName>().is_err());
        assert!("DEVTOOLS_CHANNEL:abc".parse::<ChannelName>().is_err());
        assert!("OTHER:12".parse::<ChannelName>().is_err());
        assert!("content_script_channel".parse::<ChannelName>().is_err());
    }
}
