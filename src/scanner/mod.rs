//! BLE scanner abstraction for SwitchBot thermo-hygrometers.
//!
//! A scanner runs discovery for one window at a time and delivers every
//! advertisement it sees through a channel. The channel closes once the window
//! has elapsed and discovery has been stopped, which is how the pipeline knows
//! to start its cooldown.

#[cfg(feature = "bluer")]
pub mod bluer;

use crate::mac_address::MacAddress;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Channel buffer size for advertisements within one scan window.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Devices remembered by [`ReplayFilter`] before it starts over.
const REPLAY_FILTER_CAPACITY: usize = 1024;

/// One detection event: the device address and its manufacturer data,
/// keyed by Bluetooth SIG company identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub address: MacAddress,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
}

/// Drops advertisements whose manufacturer data is unchanged since the last
/// one delivered for the same address.
///
/// BlueZ re-reports cached devices at the start of every discovery session and
/// on unrelated property changes (RSSI), with the old manufacturer data. An
/// unchanged payload carries no new reading.
#[derive(Debug, Default)]
pub struct ReplayFilter {
    last: HashMap<MacAddress, HashMap<u16, Vec<u8>>>,
}

impl ReplayFilter {
    /// Record `advertisement` and return whether its data is new.
    pub fn is_fresh(&mut self, advertisement: &Advertisement) -> bool {
        if self.last.get(&advertisement.address) == Some(&advertisement.manufacturer_data) {
            return false;
        }
        self.remember(advertisement);
        true
    }

    /// Record `advertisement` as already delivered.
    pub fn remember(&mut self, advertisement: &Advertisement) {
        if self.last.len() >= REPLAY_FILTER_CAPACITY
            && !self.last.contains_key(&advertisement.address)
        {
            self.last.clear();
        }
        self.last.insert(
            advertisement.address,
            advertisement.manufacturer_data.clone(),
        );
    }
}

/// Hand `advertisement` to the window's consumer without waiting.
///
/// A full channel drops the advertisement so a slow consumer cannot stretch
/// the window. Returns `false` once the consumer is gone.
pub(crate) fn offer(tx: &mpsc::Sender<Advertisement>, advertisement: Advertisement) -> bool {
    match tx.try_send(advertisement) {
        Ok(()) => true,
        Err(TrySendError::Full(dropped)) => {
            warn!(address = %dropped.address, "advertisement channel full, dropping");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Scanner abstraction to enable deterministic tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    /// Start discovery for `window` and return the advertisements seen in it.
    ///
    /// Implementations stop discovery and drop the sender when the window
    /// elapses, closing the channel.
    fn scan_window(
        &self,
        window: Duration,
    ) -> BoxFuture<'_, Result<mpsc::Receiver<Advertisement>, ScanError>>;
}

/// Open the compiled-in scanner backend on the default adapter.
///
/// This is the only place a missing or unusable adapter is fatal.
pub async fn open_default() -> Result<Box<dyn Scanner>, ScanError> {
    #[cfg(feature = "bluer")]
    let scanner = bluer::BluerScanner::new()
        .await
        .map(|s| Box::new(s) as Box<dyn Scanner>);
    #[cfg(not(feature = "bluer"))]
    let scanner = Err(ScanError::BackendNotAvailable("bluer".to_string()));
    scanner
}
