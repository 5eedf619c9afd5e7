mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{FeedError, Result};

const PROGRESS_INTERVAL: u64 = 16 * 1024 * 1024;

fn get_request(url: &str) -> Result<reqwest::Request> {
    let url = reqwest::Url::parse(url)
        .map_err(|e| FeedError::malformed("url", url, e.to_string()))?;
    Ok(reqwest::Request::new(reqwest::Method::GET, url))
}

pub async fn fetch_bytes(client: &dyn HttpClient, url: &str) -> Result<Vec<u8>> {
    let resp = client.execute(get_request(url)?).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

/// Sibling path a transfer writes to before it is renamed into place.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// Streams `url` into `path`, returning the number of bytes written.
///
/// The body lands in a `.part` file first; `path` only appears once the
/// transfer completes.
#[tracing::instrument(skip(client, path), fields(path = %path.display()))]
pub async fn download_to_file(client: &dyn HttpClient, url: &str, path: &Path) -> Result<u64> {
    let partial = part_path(path);
    match stream_to_file(client, url, &partial).await {
        Ok(bytes) => {
            tokio::fs::rename(&partial, path).await?;
            info!(bytes, "Downloaded");
            Ok(bytes)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(e)
        }
    }
}

async fn stream_to_file(client: &dyn HttpClient, url: &str, partial: &Path) -> Result<u64> {
    let mut resp = client.execute(get_request(url)?).await?.error_for_status()?;
    let total = resp.content_length();
    let mut file = tokio::fs::File::create(partial).await?;

    let mut written = 0u64;
    let mut next_report = PROGRESS_INTERVAL;
    while let Some(chunk) = resp.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        if written >= next_report {
            debug!(bytes = written, total = ?total, "Download progress");
            next_report += PROGRESS_INTERVAL;
        }
    }
    file.flush().await?;
    Ok(written)
}
