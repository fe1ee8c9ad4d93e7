//! Bluetooth device address used to pick the target thermo-hygrometer.
//!
//! Scanning stacks print addresses differently (`AA:BB:...` on Linux,
//! `aa-bb-...` from some Windows tools), so parsing accepts either separator
//! and either case. Matching is always on the six raw bytes.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth MAC address stored as a compact 6-byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Errors returned when parsing a MAC address string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseMacError {
    #[error("invalid MAC address: expected 6 parts, got {0}")]
    InvalidLength(usize),
    #[error("invalid MAC address: part {0} has wrong length")]
    InvalidPartLength(usize),
    #[error("invalid MAC address: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let separator = if s.contains('-') { '-' } else { ':' };
        let parts: Vec<&str> = s.split(separator).collect();
        if parts.len() != 6 {
            return Err(ParseMacError::InvalidLength(parts.len()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseMacError::InvalidPartLength(i));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseMacError::InvalidHex(part.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}
