//! Trait for the remote object store that mirrors built feed artifacts.

use std::path::Path;

use crate::error::Result;

/// Objects are addressed as `{feed_key}/{artifact_name}`.
///
/// Implementations report network and service failures as
/// [`crate::error::FeedError::TransientTransportFailure`].
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Keys of every object whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Writes the object at `key` to `path`, replacing any existing file.
    async fn get_to_file(&self, key: &str, path: &Path) -> Result<()>;

    async fn put_file(&self, key: &str, path: &Path) -> Result<()>;
}
