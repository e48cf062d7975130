// netwatch-event: Bounded interface name
// Kernel interface names are at most 15 bytes plus a NUL (IFNAMSIZ)

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum interface name length including the trailing NUL
pub const IFNAMSIZ: usize = 16;

/// Interface name errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IfNameError {
    #[error("interface name too long: {0} bytes (max {max})", max = IFNAMSIZ - 1)]
    TooLong(usize),

    #[error("interface name contains interior NUL")]
    InteriorNul,
}

/// Fixed-size interface name, NUL-padded
///
/// Stores up to 15 bytes of name in a 16-byte array, matching the
/// kernel's IFNAMSIZ layout so decoded names copy without allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IfName {
    bytes: [u8; IFNAMSIZ],
    len: u8,
}

impl IfName {
    /// Empty interface name
    pub const fn empty() -> Self {
        Self {
            bytes: [0; IFNAMSIZ],
            len: 0,
        }
    }

    /// Build from a string slice, rejecting oversize or NUL-bearing input
    pub fn new(name: &str) -> Result<Self, IfNameError> {
        let raw = name.as_bytes();
        if raw.len() > IFNAMSIZ - 1 {
            return Err(IfNameError::TooLong(raw.len()));
        }
        if raw.contains(&0) {
            return Err(IfNameError::InteriorNul);
        }
        let mut bytes = [0u8; IFNAMSIZ];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            bytes,
            len: raw.len() as u8,
        })
    }

    /// Build from a raw NUL-padded kernel buffer, truncating at the
    /// first NUL and at the first non-UTF-8 byte
    pub fn from_raw(raw: &[u8; IFNAMSIZ]) -> Self {
        let nul = raw.iter().position(|&b| b == 0).unwrap_or(IFNAMSIZ - 1);
        let len = match std::str::from_utf8(&raw[..nul]) {
            Ok(_) => nul,
            Err(error) => error.valid_up_to(),
        };
        let mut bytes = [0u8; IFNAMSIZ];
        bytes[..len].copy_from_slice(&raw[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    /// Name as a string slice
    pub fn as_str(&self) -> &str {
        // Construction only stores validated UTF-8 prefixes
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }

    /// Name length in bytes
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True when no name is set
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for IfName {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for IfName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IfName {
    type Err = IfNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl PartialEq<str> for IfName {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for IfName {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl Serialize for IfName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IfName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        IfName::new(&s).map_err(serde::de::Error::custom)
    }
}
