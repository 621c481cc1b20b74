//! Type-safe identifiers for relay entities.
//!
//! Newtype wrappers prevent mixing a socket id with a message id, or a tab id
//! with a port id, at compile time.
//!
//! | Type | Origin | Wire format |
//! |------|--------|-------------|
//! | [`TabId`] | Browser tab | integer |
//! | [`SocketId`] | Capture source, one per `WebSocket` | UUID string |
//! | [`MessageId`] | Capture source, one per frame | UUID string |
//! | [`PortId`] | Local, one per port instance | not serialized |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// TabId
// ============================================================================

/// Browser tab identifier.
///
/// Addresses a tab's relay and appears as the suffix of its devtools
/// channel name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(u32);

impl TabId {
    /// Creates a tab id from its numeric value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TabId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|e| Error::protocol(format!("invalid tab id {s:?}: {e}")))
    }
}

impl From<u32> for TabId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

// ============================================================================
// String Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from an existing string.
            #[inline]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generates a fresh random (UUID v4) identifier.
            #[inline]
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id! {
    /// Identifier of one captured `WebSocket`.
    ///
    /// Generated at capture time; two sockets on the same URL get
    /// different ids.
    SocketId
}

string_id! {
    /// Identifier of one captured frame.
    MessageId
}

// ============================================================================
// PortId
// ============================================================================

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-local identity of one port instance.
///
/// Used to tell the active port apart from stale ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(u64);

impl PortId {
    /// Allocates the next unused port id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the numeric value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_id_parse() {
        let tab_id: TabId = "1234".parse().expect("valid tab id");
        assert_eq!(tab_id, TabId::new(1234));
        assert!("abc".parse::<TabId>().is_err());
        assert!("-1".parse::<TabId>().is_err());
    }

    #[test]
    fn test_socket_id_generate_is_unique() {
        let a = SocketId::generate();
        let b = SocketId::generate();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn test_string_id_serde_transparent() {
        let id = MessageId::from("msg-1");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"msg-1\"");
    }

    #[test]
    fn test_port_id_monotonic() {
        let a = PortId::next();
        let b = PortId::next();
        assert!(b > a);
        assert!(a.to_string().starts_with("port-"));
    }
}
