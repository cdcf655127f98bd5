//! Configuration constants and validation functions for the ingest service.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{IngestError, Result};

/// Base URL of the NDW open data portal.
pub const NDW_HOST: &str = "https://opendata.ndw.nu";

/// Current flow and speed measurements, refreshed every minute.
pub const MEASUREMENT_FEED: &str = "trafficspeed.xml.gz";

/// Measurement site table: lane and vehicle class per measured value index.
pub const SITE_TABLE_FEED: &str = "measurement_current.xml.gz";

/// Static location table of variable message signs.
pub const SIGN_TABLE_FEED: &str = "LocatietabelDRIPS.xml.gz";

/// Dynamic display state of variable message signs.
pub const SIGN_STATUS_FEED: &str = "DRIPS.xml.gz";

/// HTTP timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Delay after the feed's `Last-Modified` before a new version is expected.
pub const PUBLICATION_DELAY_SECS: i64 = 65;

/// Feed refresh period, also used as retry delay after a failed cycle.
pub const REFRESH_INTERVAL_SECS: i64 = 60;

/// Default reload interval for the reference tables.
pub const REFERENCE_RELOAD_SECS: u64 = 3600;

/// Capacity of each subscriber's notification queue.
pub const NOTIFY_QUEUE_CAPACITY: usize = 4;

/// How long a health check waits for the scheduler thread to answer.
pub const HEALTH_PING_TIMEOUT: Duration = Duration::from_secs(3);

/// Runtime configuration of the ingest service.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Base URL of the feed file server.
    pub host: String,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Measured data publication file.
    pub measurement_feed: String,
    /// Measurement site table file.
    pub site_table_feed: String,
    /// Sign unit location table file.
    pub sign_table_feed: String,
    /// Sign unit status file.
    pub sign_status_feed: String,
    /// How often the site and sign tables are reloaded.
    pub reference_reload_interval: Duration,
    /// File with the site ids to keep; all sites when unset.
    pub site_filter_path: Option<PathBuf>,
    /// Notices each subscriber queue holds.
    pub notify_queue_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            host: NDW_HOST.to_string(),
            timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            measurement_feed: MEASUREMENT_FEED.to_string(),
            site_table_feed: SITE_TABLE_FEED.to_string(),
            sign_table_feed: SIGN_TABLE_FEED.to_string(),
            sign_status_feed: SIGN_STATUS_FEED.to_string(),
            reference_reload_interval: Duration::from_secs(REFERENCE_RELOAD_SECS),
            site_filter_path: None,
            notify_queue_capacity: NOTIFY_QUEUE_CAPACITY,
        }
    }
}

impl IngestConfig {
    /// Read configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let host = std::env::var("NDW_HOST").unwrap_or(defaults.host);

        let timeout_secs: u64 = match std::env::var("NDW_TIMEOUT_SECS") {
            Ok(v) => v
                .parse()
                .map_err(|_| IngestError::Config(format!("NDW_TIMEOUT_SECS is not a number: {v}")))?,
            Err(_) => HTTP_TIMEOUT_SECS,
        };

        let reload_secs: u64 = match std::env::var("REFERENCE_RELOAD_SECS") {
            Ok(v) => v.parse().map_err(|_| {
                IngestError::Config(format!("REFERENCE_RELOAD_SECS is not a number: {v}"))
            })?,
            Err(_) => REFERENCE_RELOAD_SECS,
        };

        let notify_queue_capacity = std::env::var("NOTIFY_QUEUE_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(NOTIFY_QUEUE_CAPACITY);

        let config = Self {
            host,
            timeout: Duration::from_secs(timeout_secs),
            measurement_feed: std::env::var("NDW_MEASUREMENT_FEED")
                .unwrap_or(defaults.measurement_feed),
            site_table_feed: std::env::var("NDW_SITE_TABLE_FEED")
                .unwrap_or(defaults.site_table_feed),
            sign_table_feed: std::env::var("NDW_SIGN_TABLE_FEED")
                .unwrap_or(defaults.sign_table_feed),
            sign_status_feed: std::env::var("NDW_SIGN_STATUS_FEED")
                .unwrap_or(defaults.sign_status_feed),
            reference_reload_interval: Duration::from_secs(reload_secs),
            site_filter_path: std::env::var("SITE_FILTER_PATH").ok().map(PathBuf::from),
            notify_queue_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the NDW host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the reference table reload interval.
    #[must_use]
    pub fn with_reference_reload_interval(mut self, interval: Duration) -> Self {
        self.reference_reload_interval = interval;
        self
    }

    /// Set the file with site ids to retain in the reference table.
    #[must_use]
    pub fn with_site_filter_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.site_filter_path = Some(path.into());
        self
    }

    /// Check that all values are usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.host.starts_with("http://") || self.host.starts_with("https://")) {
            return Err(IngestError::Config(format!(
                "host must be an http(s) URL: {}",
                self.host
            )));
        }
        for feed in [
            &self.measurement_feed,
            &self.site_table_feed,
            &self.sign_table_feed,
            &self.sign_status_feed,
        ] {
            validate_feed_name(feed)?;
        }
        if self.notify_queue_capacity == 0 {
            return Err(IngestError::Config(
                "notify queue capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validate a feed file name.
///
/// # Examples
/// ```
/// use trafficflow_ingest::config::validate_feed_name;
///
/// assert!(validate_feed_name("trafficspeed.xml.gz").is_ok());
/// assert!(validate_feed_name("../secret").is_err());
/// ```
pub fn validate_feed_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        Err(IngestError::InvalidFeedName(name.to_string()))
    } else {
        Ok(())
    }
}

/// Build the download URL of a feed file.
///
/// # Examples
/// ```
/// use trafficflow_ingest::config::feed_url;
///
/// assert_eq!(
///     feed_url("https://opendata.ndw.nu/", "trafficspeed.xml.gz"),
///     "https://opendata.ndw.nu/trafficspeed.xml.gz"
/// );
/// ```
pub fn feed_url(host: &str, name: &str) -> String {
    format!("{}/{name}", host.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_feed_name_valid() {
        assert!(validate_feed_name("trafficspeed.xml.gz").is_ok());
        assert!(validate_feed_name("measurement_current.xml.gz").is_ok());
        assert!(validate_feed_name("DRIPS.xml.gz").is_ok());
    }

    #[test]
    fn test_validate_feed_name_invalid() {
        assert!(validate_feed_name("").is_err());
        assert!(validate_feed_name("a/b.xml").is_err());
        assert!(validate_feed_name("..").is_err());
        assert!(validate_feed_name("dir\\file.xml").is_err());
    }

    #[test]
    fn test_feed_url() {
        assert_eq!(
            feed_url("https://opendata.ndw.nu", MEASUREMENT_FEED),
            "https://opendata.ndw.nu/trafficspeed.xml.gz"
        );
        assert_eq!(
            feed_url("http://localhost:8080/", "x.xml"),
            "http://localhost:8080/x.xml"
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(IngestConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_host() {
        let config = IngestConfig::default().with_host("ftp://example.com");
        assert!(matches!(config.validate(), Err(IngestError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = IngestConfig::default();
        config.notify_queue_capacity = 0;
        assert!(config.validate().is_err());
    }
}
