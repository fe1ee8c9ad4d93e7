//! Decoder for SwitchBot thermo-hygrometer manufacturer data.
//!
//! The advertisement is read as a lowercase hex string (two characters per
//! byte). Scanning stacks disagree on how many leading bytes they keep in the
//! manufacturer data, so a configurable number of hex characters is skipped
//! first. The remaining 16-character window has this layout:
//!
//! | Window chars | Meaning                                                   |
//! |--------------|-----------------------------------------------------------|
//! | 0..11        | unused by this decoder                                    |
//! | 11           | temperature tenths (one hex digit, divided by 10)         |
//! | 12..14       | temperature integer byte, sign-magnitude biased by 128    |
//! | 14..16       | humidity byte; the high bit is an unrelated flag          |
//!
//! An integer byte below 128 marks a negative reading: both the integer part
//! and the tenths are negated before they are added. Otherwise the bias is
//! subtracted from the integer part and the tenths stay positive.

use crate::reading::SensorReading;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use thiserror::Error;

/// Number of hex characters the decoder reads after the offset.
pub const WINDOW_HEX_LEN: usize = 16;

/// Offset used by the Windows bleak stack the gateway was first deployed on.
pub const DEFAULT_OFFSET: usize = 6;

const TEMPERATURE_TENTHS: usize = 11;
const TEMPERATURE_INTEGER: usize = 12;
const HUMIDITY: usize = 14;

/// Integer bytes at or above this value are non-negative readings.
const SIGN_BIAS: u8 = 128;

/// Error types for decoding thermo-hygrometer data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload ends before the 16-character window after the offset
    #[error("Truncated payload: need {required} hex characters, got {available}")]
    TruncatedPayload { required: usize, available: usize },
}

/// Number of hex characters skipped before the decode window starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodeOffset(pub usize);

impl Default for DecodeOffset {
    fn default() -> Self {
        Self(DEFAULT_OFFSET)
    }
}

impl fmt::Display for DecodeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DecodeOffset {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(DecodeOffset)
    }
}

/// Hex digit at position `index` of the hex-encoded payload.
///
/// Even positions are the high nibble of a byte, odd positions the low one.
/// Callers must have checked `index < data.len() * 2`.
#[inline]
fn nibble(data: &[u8], index: usize) -> u8 {
    let byte = data[index / 2];
    if index % 2 == 0 { byte >> 4 } else { byte & 0x0f }
}

/// Two hex digits starting at position `index`, read as one unsigned byte.
#[inline]
fn hex_byte(data: &[u8], index: usize) -> u8 {
    (nibble(data, index) << 4) | nibble(data, index + 1)
}

/// Decode SwitchBot manufacturer data into a [`SensorReading`].
///
/// `offset` counts hex characters, not bytes, so odd offsets are allowed.
///
/// # Errors
/// Returns [`DecodeError::TruncatedPayload`] when fewer than
/// `offset + 16` hex characters are available.
pub fn decode(data: &[u8], offset: DecodeOffset) -> Result<SensorReading, DecodeError> {
    let available = data.len() * 2;
    let required = offset.0.saturating_add(WINDOW_HEX_LEN);
    if available < required {
        return Err(DecodeError::TruncatedPayload {
            required,
            available,
        });
    }

    let start = offset.0;
    let tenths = f64::from(nibble(data, start + TEMPERATURE_TENTHS)) / 10.0;
    let integer = hex_byte(data, start + TEMPERATURE_INTEGER);
    let humidity = hex_byte(data, start + HUMIDITY) % 128;

    let (tenths, integer) = if integer < SIGN_BIAS {
        (-tenths, -f64::from(integer))
    } else {
        (tenths, f64::from(integer - SIGN_BIAS))
    };

    Ok(SensorReading {
        temperature: tenths + integer,
        humidity,
    })
}
