//! IoT SiteWise `BatchPutAssetPropertyValue` entries and an HTTP sink for them.

use super::{SinkDestination, SinkError, TelemetrySink};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Value-type tag of the target property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    #[default]
    Double,
    Integer,
    String,
    Boolean,
}

impl DataType {
    /// Wrap a reading in the variant matching this tag.
    pub fn variant(self, value: f64) -> Variant {
        match self {
            DataType::Double => Variant::DoubleValue(value),
            DataType::Integer => Variant::IntegerValue(value.round() as i64),
            DataType::String => Variant::StringValue(format!("{value:?}")),
            DataType::Boolean => Variant::BooleanValue(value != 0.0),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            DataType::Double => "doubleValue",
            DataType::Integer => "integerValue",
            DataType::String => "stringValue",
            DataType::Boolean => "booleanValue",
        };
        write!(f, "{tag}")
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "doublevalue" | "double" => Ok(DataType::Double),
            "integervalue" | "integer" => Ok(DataType::Integer),
            "stringvalue" | "string" => Ok(DataType::String),
            "booleanvalue" | "boolean" => Ok(DataType::Boolean),
            _ => Err(format!("Unknown data type: {}", s)),
        }
    }
}

/// Property value, serialised as `{"<dataType>": value}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Variant {
    DoubleValue(f64),
    IntegerValue(i64),
    StringValue(String),
    BooleanValue(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Quality {
    Good,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeInNanos {
    pub time_in_seconds: u64,
    pub offset_in_nanos: u32,
}

impl TimeInNanos {
    /// Whole-second timestamp; the nanosecond offset is always zero.
    pub fn from_system_time(time: SystemTime) -> Self {
        let time_in_seconds = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            time_in_seconds,
            offset_in_nanos: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPropertyValue {
    pub value: Variant,
    pub timestamp: TimeInNanos,
    pub quality: Quality,
}

/// One entry of a `BatchPutAssetPropertyValue` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyValueEntry {
    pub entry_id: String,
    pub asset_id: String,
    pub property_id: String,
    pub property_values: Vec<AssetPropertyValue>,
}

impl PropertyValueEntry {
    /// A single good-quality value with a fresh entry id.
    pub fn new(destination: &SinkDestination, value: f64, timestamp: SystemTime) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            asset_id: destination.asset_id.clone(),
            property_id: destination.property_id.clone(),
            property_values: vec![AssetPropertyValue {
                value: destination.data_type.variant(value),
                timestamp: TimeInNanos::from_system_time(timestamp),
                quality: Quality::Good,
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchPutRequest<'a> {
    entries: &'a [PropertyValueEntry],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchPutResponse {
    #[serde(default)]
    error_entries: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEntry {
    entry_id: String,
    #[serde(default)]
    errors: Vec<EntryError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryError {
    error_code: String,
    error_message: String,
}

/// Sink posting entries to `{endpoint}/properties` as JSON.
///
/// Requests are not SigV4 signed, so this is only used for an explicitly
/// configured endpoint (a signing gateway or a SiteWise edge gateway).
/// Direct AWS access goes through [`super::aws::AwsSink`].
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: Client,
    url: String,
}

impl HttpSink {
    pub fn new(endpoint: &str) -> Result<Self, SinkError> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(SinkError::InvalidEndpoint(endpoint.to_string()));
        }

        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: format!("{endpoint}/properties"),
        })
    }

    async fn post(&self, entries: Vec<PropertyValueEntry>) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(&BatchPutRequest { entries: &entries })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                message: body,
            });
        }

        check_error_entries(&body)
    }
}

/// SiteWise answers 200 even when single entries fail; those are listed in
/// `errorEntries`. Bodies that are empty or not JSON count as accepted.
fn check_error_entries(body: &str) -> Result<(), SinkError> {
    if body.trim().is_empty() {
        return Ok(());
    }

    let response: BatchPutResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, "ignoring unparseable sink response");
            return Ok(());
        }
    };

    let messages: Vec<String> = response
        .error_entries
        .iter()
        .flat_map(|entry| {
            entry.errors.iter().map(move |error| {
                format!(
                    "{}: {} ({})",
                    entry.entry_id, error.error_message, error.error_code
                )
            })
        })
        .collect();

    if response.error_entries.is_empty() {
        Ok(())
    } else {
        Err(SinkError::EntriesRejected {
            count: response.error_entries.len(),
            message: messages.join("; "),
        })
    }
}

impl TelemetrySink for HttpSink {
    fn put_entries(&self, entries: Vec<PropertyValueEntry>) -> BoxFuture<'_, Result<(), SinkError>> {
        Box::pin(self.post(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn destination(data_type: DataType) -> SinkDestination {
        SinkDestination {
            asset_id: "a1b2c3d4-asset".to_string(),
            property_id: "e5f6-temperature".to_string(),
            data_type,
        }
    }

    #[test]
    fn test_entry_json_shape() {
        let timestamp = UNIX_EPOCH + Duration::from_millis(1_700_000_000_900);
        let entry = PropertyValueEntry::new(&destination(DataType::Double), 22.5, timestamp);

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({
                "entryId": entry.entry_id,
                "assetId": "a1b2c3d4-asset",
                "propertyId": "e5f6-temperature",
                "propertyValues": [{
                    "value": { "doubleValue": 22.5 },
                    "timestamp": { "timeInSeconds": 1_700_000_000u64, "offsetInNanos": 0 },
                    "quality": "GOOD",
                }],
            })
        );
    }

    #[test]
    fn test_entry_ids_are_unique_uuids() {
        let dest = destination(DataType::Double);
        let first = PropertyValueEntry::new(&dest, 1.0, SystemTime::now());
        let second = PropertyValueEntry::new(&dest, 1.0, SystemTime::now());
        assert_ne!(first.entry_id, second.entry_id);
        assert!(Uuid::parse_str(&first.entry_id).is_ok());
    }

    #[test]
    fn test_data_type_selects_variant() {
        assert_eq!(DataType::Double.variant(-3.4), Variant::DoubleValue(-3.4));
        assert_eq!(DataType::Integer.variant(-3.6), Variant::IntegerValue(-4));
        assert_eq!(
            DataType::String.variant(21.0),
            Variant::StringValue("21.0".to_string())
        );
        assert_eq!(DataType::Boolean.variant(0.0), Variant::BooleanValue(false));

        let json = serde_json::to_value(DataType::Integer.variant(5.0)).unwrap();
        assert_eq!(json, json!({ "integerValue": 5 }));
    }

    #[test]
    fn test_data_type_from_str_and_display() {
        assert_eq!("doubleValue".parse::<DataType>().unwrap(), DataType::Double);
        assert_eq!("INTEGERVALUE".parse::<DataType>().unwrap(), DataType::Integer);
        assert_eq!("boolean".parse::<DataType>().unwrap(), DataType::Boolean);
        assert!("floatValue".parse::<DataType>().is_err());

        for data_type in [
            DataType::Double,
            DataType::Integer,
            DataType::String,
            DataType::Boolean,
        ] {
            assert_eq!(data_type.to_string().parse::<DataType>().unwrap(), data_type);
        }
    }

    #[test]
    fn test_pre_epoch_timestamp_clamps_to_zero() {
        let before = UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(TimeInNanos::from_system_time(before).time_in_seconds, 0);
    }

    #[test]
    fn test_http_sink_url() {
        let sink = HttpSink::new(" http://localhost:8080/ ").unwrap();
        assert_eq!(sink.url, "http://localhost:8080/properties");
    }

    #[test]
    fn test_http_sink_rejects_non_http_endpoint() {
        assert!(matches!(
            HttpSink::new("data.iotsitewise.us-east-1.amazonaws.com"),
            Err(SinkError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_check_error_entries() {
        assert!(check_error_entries("").is_ok());
        assert!(check_error_entries("not json").is_ok());
        assert!(check_error_entries(r#"{"errorEntries":[]}"#).is_ok());

        let body = r#"{"errorEntries":[{"entryId":"e1","errors":[
            {"errorCode":"InvalidRequestException","errorMessage":"bad asset","timestamps":[]}
        ]}]}"#;
        match check_error_entries(body) {
            Err(SinkError::EntriesRejected { count, message }) => {
                assert_eq!(count, 1);
                assert_eq!(message, "e1: bad asset (InvalidRequestException)");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
