//! Feed source for the NDW open data portal.

use reqwest::blocking::Client;

use crate::config::{feed_url, validate_feed_name, IngestConfig};
use crate::error::Result;
use crate::http::{create_client, download_file, Conditional, FileResponse};

/// Something that can hand out feed files by name.
pub trait FeedSource: Send + Sync {
    /// Fetch `name`, sending the validators in `conditional`.
    fn fetch(&self, name: &str, conditional: &Conditional) -> Result<FileResponse>;
}

/// Downloads feed files from an NDW-style HTTP file server.
#[derive(Debug, Clone)]
pub struct NdwClient {
    client: Client,
    host: String,
}

impl NdwClient {
    /// Create a client for the host and timeout in `config`.
    pub fn new(config: &IngestConfig) -> Result<Self> {
        tracing::info!(host = %config.host, timeout = ?config.timeout, "Creating NDW client");
        Ok(Self {
            client: create_client(config.timeout)?,
            host: config.host.clone(),
        })
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl FeedSource for NdwClient {
    fn fetch(&self, name: &str, conditional: &Conditional) -> Result<FileResponse> {
        validate_feed_name(name)?;
        let url = feed_url(&self.host, name);
        let response = download_file(&self.client, &url, name, conditional)?;
        tracing::debug!(
            feed = name,
            status = response.status,
            bytes = response.body.len(),
            etag = response.etag.as_deref().unwrap_or(""),
            "Fetched feed file"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;

    #[test]
    fn test_rejects_path_like_names() {
        let client = NdwClient::new(&IngestConfig::default()).unwrap();
        let result = client.fetch("../etc/passwd", &Conditional::none());
        assert!(matches!(result, Err(IngestError::InvalidFeedName(_))));
    }

    #[test]
    fn test_host_from_config() {
        let config = IngestConfig::default().with_host("http://localhost:9999");
        let client = NdwClient::new(&config).unwrap();
        assert_eq!(client.host(), "http://localhost:9999");
    }
}
