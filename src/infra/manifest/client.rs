use async_trait::async_trait;
use tracing::debug;

use crate::archive::{FeedDescriptor, parse_manifest};
use crate::error::Result;
use crate::fetch::{BasicClient, HttpClient, fetch_bytes};
use crate::services::manifest_source::ManifestSource;

pub const MBTA_MANIFEST_URL: &str = "https://cdn.mbta.com/archive/archived_feeds.txt";

/// Reads the manifest from an `http(s)` URL or, for any other location, a local file.
pub struct ManifestClient {
    location: String,
    http: Box<dyn HttpClient>,
}

impl ManifestClient {
    pub fn new(location: impl Into<String>) -> Result<Self> {
        Ok(Self::with_client(location, Box::new(BasicClient::new()?)))
    }

    pub fn with_client(location: impl Into<String>, http: Box<dyn HttpClient>) -> Self {
        Self {
            location: location.into(),
            http,
        }
    }

    async fn read_location(&self) -> Result<String> {
        if self.location.starts_with("http") {
            let bytes = fetch_bytes(self.http.as_ref(), &self.location).await?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Ok(tokio::fs::read_to_string(&self.location).await?)
        }
    }
}

#[async_trait]
impl ManifestSource for ManifestClient {
    async fn fetch_manifest(&self) -> Result<Vec<FeedDescriptor>> {
        let text = self.read_location().await?;
        let feeds = parse_manifest(&text)?;
        debug!(location = %self.location, feeds = feeds.len(), "Fetched manifest");
        Ok(feeds)
    }
}
