//! BlueZ D-Bus backend for thermo-hygrometer scanning.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{
    ADVERTISEMENT_CHANNEL_BUFFER_SIZE, Advertisement, ReplayFilter, ScanError, Scanner, offer,
};
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::StreamExt;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Scanner bound to the default BlueZ adapter.
///
/// The session is kept alive for as long as the scanner exists. The replay
/// filter outlives single windows so cached data re-reported by BlueZ at the
/// start of a window is not delivered again.
pub struct BluerScanner {
    _session: Session,
    adapter: Adapter,
    replays: Arc<Mutex<ReplayFilter>>,
}

impl BluerScanner {
    /// Connect to BlueZ and power on the default adapter.
    pub async fn new() -> Result<Self, ScanError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        info!(adapter = adapter.name(), "Bluetooth adapter ready");

        // Data BlueZ cached before startup is not a reading from this run
        let mut replays = ReplayFilter::default();
        for address in adapter.device_addresses().await? {
            if let Ok(Some(adv)) = read_advertisement(&adapter, address).await {
                replays.remember(&adv);
            }
        }

        Ok(Self {
            _session: session,
            adapter,
            replays: Arc::new(Mutex::new(replays)),
        })
    }

    async fn open_window(
        &self,
        window: Duration,
    ) -> Result<mpsc::Receiver<Advertisement>, ScanError> {
        // Duplicate data must be reported: the meter re-advertises with new values
        let filter = DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        };
        if let Err(e) = self.adapter.set_discovery_filter(filter).await {
            warn!(error = %e, "failed to set discovery filter");
        }

        let events = self.adapter.discover_devices_with_changes().await?;
        let adapter = self.adapter.clone();
        let replays = Arc::clone(&self.replays);
        let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

        // The task owns the discovery stream; dropping it stops discovery
        tokio::spawn(async move {
            let deadline = tokio::time::sleep(window);
            tokio::pin!(deadline);
            tokio::pin!(events);

            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    event = events.next() => match event {
                        Some(AdapterEvent::DeviceAdded(address)) => {
                            let adv = match read_advertisement(&adapter, address).await {
                                Ok(Some(adv)) => adv,
                                Ok(None) => continue,
                                Err(e) => {
                                    debug!(%address, error = %e, "skipping device");
                                    continue;
                                }
                            };
                            if deadline.is_elapsed() {
                                break;
                            }

                            let fresh = replays
                                .lock()
                                .map(|mut filter| filter.is_fresh(&adv))
                                .unwrap_or(true);
                            if !fresh {
                                continue;
                            }

                            if !offer(&tx, adv) {
                                break;
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            debug!("discovery window closed");
        });

        Ok(rx)
    }
}

impl Scanner for BluerScanner {
    fn scan_window(
        &self,
        window: Duration,
    ) -> BoxFuture<'_, Result<mpsc::Receiver<Advertisement>, ScanError>> {
        Box::pin(self.open_window(window))
    }
}

/// Read the current manufacturer data of a discovered device.
///
/// Devices without manufacturer data yield `None`.
async fn read_advertisement(
    adapter: &Adapter,
    address: Address,
) -> Result<Option<Advertisement>, ScanError> {
    let device = adapter.device(address)?;
    let Some(manufacturer_data) = device.manufacturer_data().await? else {
        return Ok(None);
    };

    Ok(Some(Advertisement {
        address: address.into(),
        manufacturer_data,
    }))
}
