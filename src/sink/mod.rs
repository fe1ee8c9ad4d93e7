//! Forwarding of decoded readings to the telemetry sink.
//!
//! A [`Forwarder`] either hands each value to a [`TelemetrySink`] or, when the
//! sink destination is not configured, only reports the value locally. The
//! local mode is a valid deployment (bench testing a meter without cloud
//! credentials), not an error.

#[cfg(feature = "aws")]
pub mod aws;
pub mod sitewise;

pub use sitewise::{DataType, HttpSink, PropertyValueEntry};

use futures::future::BoxFuture;
use std::io::{self, Write};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors reported by a telemetry sink. Never retried.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Sink rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Sink rejected {count} entries: {message}")]
    EntriesRejected { count: usize, message: String },
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("AWS SDK error: {0}")]
    Aws(String),
    #[error("Sink backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Sink abstraction to enable tests without network access.
pub trait TelemetrySink: Send + Sync {
    fn put_entries(&self, entries: Vec<PropertyValueEntry>)
    -> BoxFuture<'_, Result<(), SinkError>>;
}

/// Where readings are sent: asset, property and value-type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkDestination {
    pub asset_id: String,
    pub property_id: String,
    pub data_type: DataType,
}

impl SinkDestination {
    /// Build a destination if both identifiers are configured.
    ///
    /// Identifiers of at most one character (empty, or the `-` placeholder)
    /// count as unset.
    pub fn from_ids(asset_id: &str, property_id: &str, data_type: DataType) -> Option<Self> {
        if !is_configured(asset_id) || !is_configured(property_id) {
            return None;
        }
        Some(Self {
            asset_id: asset_id.trim().to_string(),
            property_id: property_id.trim().to_string(),
            data_type,
        })
    }
}

#[cfg(feature = "aws")]
async fn aws_sink(region: &str) -> Result<Box<dyn TelemetrySink>, SinkError> {
    Ok(Box::new(aws::AwsSink::new(region).await))
}

#[cfg(not(feature = "aws"))]
async fn aws_sink(_region: &str) -> Result<Box<dyn TelemetrySink>, SinkError> {
    Err(SinkError::BackendNotAvailable("aws".to_string()))
}

fn is_configured(id: &str) -> bool {
    id.trim().chars().count() > 1
}

/// Outcome of one forward call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forwarded {
    /// No destination configured; the value was only reported locally
    Local,
    /// The sink accepted the entry
    Sent,
    /// The sink call failed and the value was dropped
    Dropped,
}

enum Route {
    Local,
    Sink {
        destination: SinkDestination,
        sink: Box<dyn TelemetrySink>,
    },
}

/// Sends each reading to the sink, or reports it locally in degraded mode.
pub struct Forwarder {
    route: Route,
}

impl Forwarder {
    /// Forwarder without a sink: every value is only reported.
    pub fn local() -> Self {
        Self {
            route: Route::Local,
        }
    }

    /// Forwarder that uses `sink` when `destination` is present.
    pub fn new(destination: Option<SinkDestination>, sink: Box<dyn TelemetrySink>) -> Self {
        match destination {
            Some(destination) => Self {
                route: Route::Sink { destination, sink },
            },
            None => Self::local(),
        }
    }

    /// Forwarder for the configured destination.
    ///
    /// An explicit `endpoint` selects the unsigned HTTP sink; otherwise the
    /// AWS SDK sink for `region` is used. No client is built when the
    /// destination is absent, so the endpoint only matters once identifiers
    /// are configured.
    pub async fn connect(
        destination: Option<SinkDestination>,
        endpoint: Option<&str>,
        region: &str,
    ) -> Result<Self, SinkError> {
        let Some(destination) = destination else {
            return Ok(Self::local());
        };

        let sink: Box<dyn TelemetrySink> = match endpoint {
            Some(endpoint) => Box::new(HttpSink::new(endpoint)?),
            None => aws_sink(region).await?,
        };
        Ok(Self::new(Some(destination), sink))
    }

    /// Forward one value, writing a status line to `out`.
    ///
    /// Sink failures are logged and the value is dropped; only a failed write
    /// to `out` is returned as an error.
    pub async fn forward(&self, value: f64, out: &mut dyn Write) -> io::Result<Forwarded> {
        let (destination, sink) = match &self.route {
            Route::Local => {
                writeln!(out, "No Config :: {value:?}")?;
                return Ok(Forwarded::Local);
            }
            Route::Sink { destination, sink } => (destination, sink),
        };

        let entry = PropertyValueEntry::new(destination, value, SystemTime::now());
        debug!(entry_id = %entry.entry_id, value, "sending reading");

        match sink.put_entries(vec![entry]).await {
            Ok(()) => {
                writeln!(out, "Send :: {value:?}")?;
                Ok(Forwarded::Sent)
            }
            Err(e) => {
                warn!(error = %e, value, "dropping reading");
                Ok(Forwarded::Dropped)
            }
        }
    }
}
