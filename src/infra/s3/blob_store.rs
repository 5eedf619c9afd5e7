use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{FeedError, Result};
use crate::fetch::part_path;
use crate::services::blob_store::BlobStore;

/// Feed artifacts mirrored in one S3 bucket.
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    /// Uses the ambient AWS configuration already loaded by `aws_config::load_from_env`.
    pub fn new(config: &aws_config::SdkConfig, bucket: impl Into<String>) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(config),
            bucket: bucket.into(),
        }
    }

    async fn download(&self, key: &str, partial: &Path) -> Result<u64> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| FeedError::transport(DisplayErrorContext(e)))?;

        let mut body = resp.body;
        let mut file = tokio::fs::File::create(partial).await?;
        let mut written = 0u64;
        while let Some(chunk) = body.try_next().await.map_err(FeedError::transport)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| FeedError::transport(DisplayErrorContext(e)))?;
            keys.extend(resp.contents().iter().filter_map(|o| o.key().map(str::to_string)));
            match resp.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }
        debug!(bucket = %self.bucket, prefix, objects = keys.len(), "Listed objects");
        Ok(keys)
    }

    #[tracing::instrument(skip(self, path), fields(bucket = %self.bucket, path = %path.display()))]
    async fn get_to_file(&self, key: &str, path: &Path) -> Result<()> {
        let partial = part_path(path);
        match self.download(key, &partial).await {
            Ok(bytes) => {
                tokio::fs::rename(&partial, path).await?;
                info!(bytes, "Fetched object");
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    #[tracing::instrument(skip(self, path), fields(bucket = %self.bucket, path = %path.display()))]
    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| FeedError::Io(std::io::Error::other(e)))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| FeedError::transport(DisplayErrorContext(e)))?;
        info!("Stored object");
        Ok(())
    }
}
