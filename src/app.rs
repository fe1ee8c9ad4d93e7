//! Scan-and-forward pipeline for `switchbot-gateway`.
//!
//! This module is decoupled from CLI parsing, logging setup and process exit
//! codes so it can be tested deterministically with an injected scanner,
//! forwarder and output stream.

use crate::config::{Config, ConfigError, Options};
use crate::decoder::{DecodeOffset, decode};
use crate::mac_address::MacAddress;
use crate::scanner::{Advertisement, ScanError, Scanner};
use crate::sink::{Forwarded, Forwarder, SinkError};
use std::io::{self, Write};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// What the process does after startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Forward a value given on the command line once, without Bluetooth
    Direct(f64),
    /// Scan for the target device until the process is terminated
    Daemon,
}

impl Mode {
    pub fn from_options(options: &Options) -> Self {
        match options.value {
            Some(value) => Mode::Direct(value),
            None => Mode::Daemon,
        }
    }
}

/// Errors returned by the pipeline.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("value was not delivered to the sink")]
    NotDelivered,
}

/// Counters for one scan window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WindowSummary {
    /// Advertisements delivered by the scanner
    pub detections: usize,
    /// Advertisements from the target address
    pub matched: usize,
    /// Readings handed to the forwarder (sent or reported locally)
    pub forwarded: usize,
    /// Readings lost to decode errors or sink failures
    pub dropped: usize,
}

/// Forward `value` once (direct-send mode).
///
/// Unlike the daemon loop, a dropped value is an error here so the exit
/// status tells the caller the send failed.
pub async fn send_once(
    forwarder: &Forwarder,
    value: f64,
    out: &mut dyn Write,
) -> Result<Forwarded, RunError> {
    match forwarder.forward(value, out).await? {
        Forwarded::Dropped => Err(RunError::NotDelivered),
        forwarded => Ok(forwarded),
    }
}

/// The daemon-mode loop: scan window, cooldown, repeat.
pub struct Pipeline<'a> {
    target: MacAddress,
    offset: DecodeOffset,
    scan_window: Duration,
    cooldown: Duration,
    scanner: &'a dyn Scanner,
    forwarder: &'a Forwarder,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &Config,
        target: MacAddress,
        scanner: &'a dyn Scanner,
        forwarder: &'a Forwarder,
    ) -> Self {
        Self {
            target,
            offset: config.offset,
            scan_window: config.scan_window,
            cooldown: config.cooldown,
            scanner,
            forwarder,
        }
    }

    /// Run scan windows separated by cooldowns until an output write fails.
    ///
    /// A window that cannot be opened is logged and retried after the
    /// cooldown; decode and sink failures never end the loop.
    pub async fn run(&self, out: &mut dyn Write) -> Result<(), RunError> {
        info!(address = %self.target, "Waiting for detection...");

        loop {
            match self.scan_once(out).await {
                Ok(summary) => debug!(?summary, "scan window finished"),
                Err(RunError::Scan(e)) => warn!(error = %e, "scan window failed"),
                Err(e) => return Err(e),
            }

            tokio::time::sleep(self.cooldown).await;
        }
    }

    /// Run a single scan window and process everything it delivers, in order.
    pub async fn scan_once(&self, out: &mut dyn Write) -> Result<WindowSummary, RunError> {
        let mut advertisements = self.scanner.scan_window(self.scan_window).await?;
        let mut summary = WindowSummary::default();

        while let Some(advertisement) = advertisements.recv().await {
            summary.detections += 1;
            self.handle_advertisement(&advertisement, out, &mut summary)
                .await?;
        }

        Ok(summary)
    }

    async fn handle_advertisement(
        &self,
        advertisement: &Advertisement,
        out: &mut dyn Write,
        summary: &mut WindowSummary,
    ) -> io::Result<()> {
        if advertisement.address != self.target {
            trace!(address = %advertisement.address, "ignoring device");
            return Ok(());
        }
        summary.matched += 1;

        let mut company_ids: Vec<u16> = advertisement.manufacturer_data.keys().copied().collect();
        company_ids.sort_unstable();

        for company_id in company_ids {
            let data = &advertisement.manufacturer_data[&company_id];
            let reading = match decode(data, self.offset) {
                Ok(reading) => reading,
                Err(e) => {
                    warn!(company_id, error = %e, "dropping advertisement");
                    summary.dropped += 1;
                    continue;
                }
            };

            debug!(
                company_id,
                temperature = reading.temperature,
                humidity = reading.humidity,
                "decoded reading"
            );

            match self.forwarder.forward(reading.temperature, out).await? {
                Forwarded::Sent | Forwarded::Local => summary.forwarded += 1,
                Forwarded::Dropped => summary.dropped += 1,
            }
        }

        Ok(())
    }
}
