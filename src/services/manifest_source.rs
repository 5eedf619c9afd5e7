//! Trait for the source of the archived-feeds manifest.

use crate::archive::FeedDescriptor;
use crate::error::Result;

/// Abstraction over where the manifest comes from (CDN, local file, test fixture).
#[async_trait::async_trait]
pub trait ManifestSource: Send + Sync {
    /// Returns every feed version the manifest lists, in manifest order.
    async fn fetch_manifest(&self) -> Result<Vec<FeedDescriptor>>;
}
