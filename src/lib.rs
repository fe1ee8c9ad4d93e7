//! `switchbot-gateway` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup and
//! process exit codes. The decoder and the scan-and-forward loop live here so
//! they can be tested deterministically with an injected scanner and sink.

pub mod app;
pub mod config;
pub mod decoder;
pub mod mac_address;
pub mod reading;
pub mod scanner;
pub mod sink;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use app::{Mode, Pipeline, RunError, WindowSummary, send_once};
pub use config::{Config, ConfigError, Options, parse_duration, parse_period};
pub use decoder::{DecodeError, DecodeOffset, decode};
pub use mac_address::MacAddress;
pub use reading::SensorReading;
pub use scanner::{Advertisement, ScanError, Scanner};
pub use sink::{DataType, Forwarder, SinkDestination, SinkError, TelemetrySink};
