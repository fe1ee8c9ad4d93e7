//! IoT SiteWise sink backed by the AWS SDK.
//!
//! Credentials come from the standard AWS provider chain (environment,
//! shared profile, instance role), and requests are SigV4 signed by the SDK.

use super::sitewise::{self, PropertyValueEntry};
use super::{SinkError, TelemetrySink};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_iotsitewise::Client;
use aws_sdk_iotsitewise::error::{BuildError, DisplayErrorContext};
use aws_sdk_iotsitewise::types::{
    AssetPropertyValue, PutAssetPropertyValueEntry, Quality, TimeInNanos, Variant,
};
use futures::future::BoxFuture;
use tracing::debug;

impl From<BuildError> for SinkError {
    fn from(err: BuildError) -> Self {
        SinkError::Aws(err.to_string())
    }
}

/// Sink calling `BatchPutAssetPropertyValue` through the SDK client.
#[derive(Debug, Clone)]
pub struct AwsSink {
    client: Client,
}

impl AwsSink {
    /// Load the shared AWS configuration for `region` and build a client.
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        debug!(region, "loaded AWS configuration");

        Self {
            client: Client::new(&config),
        }
    }

    async fn put(&self, entries: Vec<PropertyValueEntry>) -> Result<(), SinkError> {
        let entries = entries
            .iter()
            .map(to_sdk_entry)
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .batch_put_asset_property_value()
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| SinkError::Aws(DisplayErrorContext(&e).to_string()))?;

        let rejected = output.error_entries();
        if rejected.is_empty() {
            return Ok(());
        }

        let message = rejected
            .iter()
            .flat_map(|entry| {
                entry.errors().iter().map(move |error| {
                    format!(
                        "{}: {} ({})",
                        entry.entry_id(),
                        error.error_message(),
                        error.error_code().as_str()
                    )
                })
            })
            .collect::<Vec<_>>()
            .join("; ");

        Err(SinkError::EntriesRejected {
            count: rejected.len(),
            message,
        })
    }
}

impl TelemetrySink for AwsSink {
    fn put_entries(&self, entries: Vec<PropertyValueEntry>) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(self.put(entries))
    }
}

fn to_sdk_variant(value: &sitewise::Variant) -> Variant {
    let builder = Variant::builder();
    match value {
        sitewise::Variant::DoubleValue(v) => builder.double_value(*v),
        sitewise::Variant::IntegerValue(v) => builder.integer_value(clamp_i32(*v)),
        sitewise::Variant::StringValue(v) => builder.string_value(v.clone()),
        sitewise::Variant::BooleanValue(v) => builder.boolean_value(*v),
    }
    .build()
}

/// SiteWise integers are 32-bit.
fn clamp_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

fn to_sdk_entry(entry: &PropertyValueEntry) -> Result<PutAssetPropertyValueEntry, SinkError> {
    let values = entry
        .property_values
        .iter()
        .map(|value| {
            let timestamp = TimeInNanos::builder()
                .time_in_seconds(i64::try_from(value.timestamp.time_in_seconds).unwrap_or(i64::MAX))
                .offset_in_nanos(value.timestamp.offset_in_nanos as i32)
                .build()?;
            let quality = match value.quality {
                sitewise::Quality::Good => Quality::Good,
            };
            Ok(AssetPropertyValue::builder()
                .value(to_sdk_variant(&value.value))
                .timestamp(timestamp)
                .quality(quality)
                .build())
        })
        .collect::<Result<Vec<_>, BuildError>>()?;

    Ok(PutAssetPropertyValueEntry::builder()
        .entry_id(&entry.entry_id)
        .asset_id(&entry.asset_id)
        .property_id(&entry.property_id)
        .set_property_values(Some(values))
        .build()?)
}
