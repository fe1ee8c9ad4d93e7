//! Command-line options and the configuration resolved from them.
//!
//! Every option can also come from the environment, and a `.env` file in the
//! working directory is loaded before parsing, so a deployment only needs an
//! `.env` with `MAC_ADDRESS`, `ASSET_ID` and `PROPERTY_ID`.

use crate::decoder::DecodeOffset;
use crate::mac_address::{MacAddress, ParseMacError};
use crate::sink::SinkDestination;
use crate::sink::sitewise::{DEFAULT_REGION, DataType};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Gateway options.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Send this value once and exit instead of scanning.
    #[arg(short = 'v', long, allow_negative_numbers = true)]
    pub value: Option<f64>,

    /// Address of the thermo-hygrometer to listen to.
    /// Format: AA:BB:CC:DD:EE:FF
    #[arg(long, env = "MAC_ADDRESS")]
    pub mac_address: Option<String>,

    /// SiteWise asset id. Leave unset to only print readings.
    #[arg(long, env = "ASSET_ID", default_value = "-")]
    pub asset_id: String,

    /// SiteWise property id of the temperature measurement.
    #[arg(long, env = "PROPERTY_ID", default_value = "-")]
    pub property_id: String,

    /// Hex characters to skip before the sensor fields.
    /// Depends on how the Bluetooth stack reports manufacturer data.
    #[arg(long, env = "SYSTEM_OFFSET", default_value_t = DecodeOffset::default())]
    pub system_offset: DecodeOffset,

    /// Length of each scan window.
    /// Accepts duration with suffix: 5s, 1m, 500ms, 2h, or fractional seconds.
    #[arg(long, env = "LOOP_TIME_SECONDS", default_value = "5", value_parser = parse_period)]
    pub loop_time: Duration,

    /// Pause between scan windows. Defaults to the scan window length.
    #[arg(long, env = "COOLDOWN_SECONDS", value_parser = parse_period)]
    pub cooldown: Option<Duration>,

    /// Value type of the SiteWise property.
    #[arg(long, env = "DATA_TYPE", default_value_t = DataType::Double)]
    pub data_type: DataType,

    /// AWS region of the SiteWise service.
    #[arg(long, env = "REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// Post unsigned requests to this endpoint instead of calling AWS
    /// (e.g. a signing gateway or a SiteWise edge gateway).
    #[arg(long, env = "SITEWISE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Verbose logging
    #[arg(long)]
    pub verbose: bool,
}

/// Errors in the resolved configuration. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("MAC_ADDRESS is required when scanning")]
    MissingTargetAddress,
    #[error("invalid MAC_ADDRESS '{value}': {source}")]
    InvalidTargetAddress {
        value: String,
        #[source]
        source: ParseMacError,
    },
}

/// Configuration shared read-only by the pipeline and the forwarder.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub mac_address: Option<String>,
    pub offset: DecodeOffset,
    pub scan_window: Duration,
    pub cooldown: Duration,
    pub destination: Option<SinkDestination>,
    pub region: String,
    pub endpoint: Option<String>,
}

impl Config {
    pub fn from_options(options: &Options) -> Self {
        let destination =
            SinkDestination::from_ids(&options.asset_id, &options.property_id, options.data_type);
        let endpoint = options
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);

        Config {
            mac_address: options.mac_address.clone(),
            offset: options.system_offset,
            scan_window: options.loop_time,
            cooldown: options.cooldown.unwrap_or(options.loop_time),
            destination,
            region: options.region.trim().to_string(),
            endpoint,
        }
    }

    /// The device to accept advertisements from.
    ///
    /// Only needed when scanning, so it is resolved on demand.
    pub fn target(&self) -> Result<MacAddress, ConfigError> {
        let value = self
            .mac_address
            .as_deref()
            .ok_or(ConfigError::MissingTargetAddress)?;
        value
            .parse()
            .map_err(|source| ConfigError::InvalidTargetAddress {
                value: value.to_string(),
                source,
            })
    }
}

/// Load `.env` from the working directory (or a parent) into the environment.
///
/// Returns the file that was loaded, if any. Variables already set win.
pub fn load_env_file() -> Option<PathBuf> {
    dotenv::dotenv().ok()
}

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds, fractions allowed (`5.0`, `0.5s`)
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
///
/// # Examples
/// ```
/// use switchbot_gateway::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5.0").unwrap(), Duration::from_secs(5));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    if let Some(num) = src.strip_suffix("ms") {
        let millis: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid milliseconds: {}", num))?;
        return Ok(Duration::from_millis(millis));
    }

    if let Some(num) = src.strip_suffix('h') {
        let hours: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid hours: {}", num))?;
        return hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration too large: {}", src));
    }

    if let Some(num) = src.strip_suffix('m') {
        let minutes: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid minutes: {}", num))?;
        return minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration too large: {}", src));
    }

    let num = src.strip_suffix('s').unwrap_or(src).trim();
    let secs: f64 = num
        .parse()
        .map_err(|_| format!("invalid duration: {}", src))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("invalid duration: {}", src))
}

/// [`parse_duration`] for scan windows and cooldowns, which must not be zero.
pub fn parse_period(src: &str) -> Result<Duration, String> {
    let period = parse_duration(src)?;
    if period.is_zero() {
        return Err(format!("duration must be greater than zero: {}", src.trim()));
    }
    Ok(period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TEST_MAC;

    /// Options as clap would build them with no flags and an empty
    /// environment. Built directly so exported variables cannot leak in.
    fn options() -> Options {
        Options {
            value: None,
            mac_address: Some("AA:BB:CC:DD:EE:FF".to_string()),
            asset_id: "-".to_string(),
            property_id: "-".to_string(),
            system_offset: DecodeOffset::default(),
            loop_time: Duration::from_secs(5),
            cooldown: None,
            data_type: DataType::Double,
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            verbose: false,
        }
    }

    /// Parse `args` with every environment-backed option given explicitly.
    fn parse(args: &[&str]) -> Options {
        let mut argv = vec![
            "switchbot-gateway",
            "--mac-address",
            "AA:BB:CC:DD:EE:FF",
            "--asset-id",
            "-",
            "--property-id",
            "-",
            "--system-offset",
            "6",
            "--loop-time",
            "5",
            "--data-type",
            "doubleValue",
            "--region",
            "us-east-1",
        ];
        argv.extend_from_slice(args);
        Options::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_value_selects_direct_send() {
        let options = parse(&["--value", "21.5"]);
        assert_eq!(options.value, Some(21.5));

        let options = parse(&["-v", "-4.2"]);
        assert_eq!(options.value, Some(-4.2));
    }

    #[test]
    fn test_non_numeric_value_is_an_error() {
        let result = Options::try_parse_from(["switchbot-gateway", "--value", "warm"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_flag_is_an_error() {
        let result = Options::try_parse_from(["switchbot-gateway", "--daemon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_periods_are_rejected() {
        let result = Options::try_parse_from(["switchbot-gateway", "--loop-time", "0"]);
        assert!(result.is_err());

        let result = Options::try_parse_from(["switchbot-gateway", "--cooldown", "0ms"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_flags() {
        let options = parse(&[
            "--mac-address",
            "aa:bb:cc:dd:ee:ff",
            "--asset-id",
            "asset-1234",
            "--property-id",
            "property-5678",
            "--system-offset",
            "0",
            "--loop-time",
            "2.5",
            "--cooldown",
            "1m",
            "--data-type",
            "integerValue",
            "--region",
            "ap-northeast-1",
            "--endpoint",
            "http://localhost:8080",
        ]);
        let config = Config::from_options(&options);

        assert_eq!(config.target().unwrap(), TEST_MAC);
        assert_eq!(config.offset, DecodeOffset(0));
        assert_eq!(config.scan_window, Duration::from_millis(2500));
        assert_eq!(config.cooldown, Duration::from_secs(60));
        assert_eq!(config.region, "ap-northeast-1");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:8080"));

        let destination = config.destination.unwrap();
        assert_eq!(destination.asset_id, "asset-1234");
        assert_eq!(destination.property_id, "property-5678");
        assert_eq!(destination.data_type, DataType::Integer);
    }

    #[test]
    fn test_cooldown_defaults_to_scan_window() {
        let mut options = options();
        options.loop_time = Duration::from_secs(7);

        let config = Config::from_options(&options);
        assert_eq!(config.scan_window, Duration::from_secs(7));
        assert_eq!(config.cooldown, Duration::from_secs(7));
    }

    #[test]
    fn test_placeholder_ids_select_local_mode() {
        let config = Config::from_options(&options());
        assert!(config.destination.is_none());
    }

    #[test]
    fn test_endpoint_defaults_to_aws() {
        let config = Config::from_options(&options());
        assert_eq!(config.endpoint, None);
        assert_eq!(config.region, "us-east-1");

        let mut options = options();
        options.endpoint = Some("  ".to_string());
        assert_eq!(Config::from_options(&options).endpoint, None);
    }

    #[test]
    fn test_target_errors() {
        let mut config = Config::from_options(&options());

        config.mac_address = None;
        assert!(matches!(
            config.target(),
            Err(ConfigError::MissingTargetAddress)
        ));

        config.mac_address = Some("xx:xx:xx:xx:xx:xx".to_string());
        let err = config.target().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTargetAddress { .. }));
        assert_eq!(
            err.to_string(),
            "invalid MAC_ADDRESS 'xx:xx:xx:xx:xx:xx': invalid MAC address: 'xx' is not valid hex"
        );
    }

    #[test]
    fn test_parse_duration_seconds() {
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("0.5s").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_duration_fractional_without_suffix() {
        assert_eq!(parse_duration("5.0").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("1.25").unwrap(), Duration::from_millis(1250));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_duration_other_units() {
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_duration_with_whitespace() {
        assert_eq!(parse_duration(" 3s ").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("3 s").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("-0.5").is_err());
        assert!(parse_duration("NaN").is_err());
        assert!(parse_duration("1.5m").is_err());
    }

    #[test]
    fn test_parse_duration_overflow_is_an_error() {
        assert!(parse_duration("6000000000000000h").is_err());
        assert!(parse_duration("400000000000000000m").is_err());
        assert!(parse_duration("1e300").is_err());
    }

    #[test]
    fn test_parse_period_rejects_zero() {
        assert!(parse_period("0").is_err());
        assert!(parse_period("0m").is_err());
        assert!(parse_period("0.0s").is_err());
        assert_eq!(parse_period("5").unwrap(), Duration::from_secs(5));
    }
}
