//! Decoded thermo-hygrometer reading.

/// A reading decoded from one SwitchBot thermo-hygrometer advertisement.
///
/// - Temperature in Celsius, one decimal digit of precision
/// - Relative humidity in whole percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Temperature in Celsius (negative below zero)
    pub temperature: f64,
    /// Relative humidity in percent, with the flag bit masked off
    pub humidity: u8,
}
