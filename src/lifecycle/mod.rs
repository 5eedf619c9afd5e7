//! Per-feed lifecycle: download, extract, ingest, compact, and mirror to remote storage.
//!
//! Every step checks for its output artifact first and does nothing if it is
//! already there, so an interrupted build resumes where it stopped. Steps that
//! fail partway remove what they wrote before returning the error.
//!
//! Builds of the same feed key must be serialized by the caller; two
//! controllers writing the same store file are not coordinated here.

pub mod artifacts;
pub mod batch;
pub mod extract;
pub mod state;

use md5::{Digest, Md5};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::archive::FeedDescriptor;
use crate::compact::make_compact_store;
use crate::error::{FeedError, Result};
use crate::fetch::{HttpClient, download_to_file};
use crate::ingest::{FeedProvenance, IngestOptions, ingest_feed};
use crate::reader::GtfsReader;
use crate::services::blob_store::BlobStore;
use crate::store::FeedStore;
use artifacts::{Artifact, FeedArtifacts};
use extract::extract_archive;
use state::FeedState;

#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerOptions {
    /// Keep only the compact store once it is built.
    pub compact_only: bool,
    pub ingest: IngestOptions,
}

/// Which stores [`FeedController::build_locally`] regenerates even if present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rebuild {
    pub db: bool,
    pub compact: bool,
}

impl Rebuild {
    pub const fn all() -> Self {
        Self { db: true, compact: true }
    }

    /// Only build what is absent.
    pub const fn missing() -> Self {
        Self {
            db: false,
            compact: false,
        }
    }
}

impl Default for Rebuild {
    fn default() -> Self {
        Self::all()
    }
}

pub struct FeedController {
    feed: FeedDescriptor,
    artifacts: FeedArtifacts,
    options: ControllerOptions,
    http: Arc<dyn HttpClient>,
    remote: Option<Arc<dyn BlobStore>>,
    checksum: Option<String>,
    failed: bool,
}

impl FeedController {
    pub fn new(
        feed: FeedDescriptor,
        root: &Path,
        options: ControllerOptions,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        let artifacts = FeedArtifacts::new(root, feed.key());
        Self {
            feed,
            artifacts,
            options,
            http,
            remote: None,
            checksum: None,
            failed: false,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn BlobStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn feed(&self) -> &FeedDescriptor {
        &self.feed
    }

    pub fn key(&self) -> &str {
        self.feed.key()
    }

    pub fn artifacts(&self) -> &FeedArtifacts {
        &self.artifacts
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.artifacts.path(artifact)
    }

    fn required(&self) -> &'static [Artifact] {
        Artifact::required(self.options.compact_only)
    }

    pub fn state(&self) -> FeedState {
        if self.failed {
            return FeedState::Failed;
        }
        FeedState::observe(&self.artifacts, self.options.compact_only)
    }

    pub fn exists_locally(&self) -> bool {
        self.required().iter().all(|a| self.artifacts.exists(*a))
    }

    /// False when no remote store is configured.
    pub async fn exists_remotely(&self) -> Result<bool> {
        let Some(remote) = &self.remote else {
            return Ok(false);
        };
        let listed = remote.list(&self.artifacts.remote_prefix()).await?;
        Ok(self
            .required()
            .iter()
            .all(|a| listed.contains(&self.artifacts.remote_key(*a))))
    }

    fn remote(&self) -> Result<&Arc<dyn BlobStore>> {
        self.remote.as_ref().ok_or_else(|| {
            FeedError::PreconditionFailed(format!(
                "feed {}: no remote store configured",
                self.key()
            ))
        })
    }

    /// Local artifacts if present, else a remote copy, else a build from source.
    #[tracing::instrument(skip(self), fields(feed_key = %self.feed.key()))]
    pub async fn download_or_build(&mut self) -> Result<()> {
        if self.exists_locally() {
            debug!("Feed already built locally");
            return Ok(());
        }
        if self.exists_remotely().await? {
            info!("Fetching built feed from remote store");
            return self.download().await;
        }
        self.build_locally(Rebuild::missing()).await
    }

    #[tracing::instrument(skip(self), fields(feed_key = %self.feed.key()))]
    pub async fn build_locally(&mut self, rebuild: Rebuild) -> Result<()> {
        let result = self.run_build(rebuild).await;
        self.failed = result.is_err();
        match &result {
            Ok(()) => info!(state = %self.state(), "Feed built"),
            Err(e) => warn!(error = %e, "Feed build failed"),
        }
        result
    }

    async fn run_build(&mut self, rebuild: Rebuild) -> Result<()> {
        fs::create_dir_all(self.artifacts.dir())?;
        self.ensure_archive().await?;
        self.ensure_extracted().await?;

        let primary = self.path(Artifact::PrimaryStore);
        let compact = self.path(Artifact::CompactStore);
        let mut need_compact = rebuild.compact || !compact.exists();
        let need_db = rebuild.db
            || (!primary.exists() && (need_compact || !self.options.compact_only));

        if need_db {
            let provenance = FeedProvenance {
                url: self.feed.url().to_string(),
                zip_md5_checksum: self.checksum().await?,
            };
            self.ingest(provenance).await?;
            need_compact = true;
        }

        if need_compact {
            remove_if_present(&compact)?;
            let (source, target) = (primary.clone(), compact.clone());
            run_blocking(move || make_compact_store(&source, &target)).await?;
        }

        if self.options.compact_only && primary.exists() {
            fs::remove_file(&primary)?;
            debug!("Removed primary store in compact-only mode");
        }
        Ok(())
    }

    async fn ensure_archive(&mut self) -> Result<()> {
        let archive = self.path(Artifact::Archive);
        if archive.exists() {
            return Ok(());
        }
        self.checksum = None;
        info!(url = %self.feed.url(), "Downloading feed archive");
        download_to_file(self.http.as_ref(), self.feed.url(), &archive).await?;
        Ok(())
    }

    /// A corrupt archive is deleted so the next build downloads it again.
    async fn ensure_extracted(&mut self) -> Result<()> {
        let target = self.path(Artifact::Extracted);
        if target.exists() {
            return Ok(());
        }
        let archive = self.path(Artifact::Archive);
        let source = archive.clone();
        let result = run_blocking(move || extract_archive(&source, &target)).await;
        if let Err(FeedError::CorruptArchive { .. }) = &result {
            remove_if_present(&archive)?;
            self.checksum = None;
        }
        result
    }

    /// MD5 of the archive as lowercase hex, computed once per download.
    async fn checksum(&mut self) -> Result<String> {
        if let Some(checksum) = &self.checksum {
            return Ok(checksum.clone());
        }
        let archive = self.path(Artifact::Archive);
        let checksum = run_blocking(move || md5_hex(&archive)).await?;
        self.checksum = Some(checksum.clone());
        Ok(checksum)
    }

    /// Ingests into a fresh primary store, removing it again on failure.
    async fn ingest(&self, provenance: FeedProvenance) -> Result<()> {
        let primary = self.path(Artifact::PrimaryStore);
        remove_if_present(&primary)?;
        let reader = GtfsReader::new(self.path(Artifact::Extracted));
        let options = self.options.ingest;

        run_blocking(move || {
            let result = FeedStore::open(&primary)
                .and_then(|mut store| ingest_feed(&mut store, &reader, &provenance, options));
            match result {
                Ok(summary) => {
                    debug!(rows = ?summary.rows, "Ingest summary");
                    Ok(())
                }
                Err(e) => {
                    if let Err(rm) = remove_if_present(&primary) {
                        warn!(error = %rm, "Could not remove partial primary store");
                    }
                    Err(e)
                }
            }
        })
        .await
    }

    /// Copies the required artifacts to the remote store.
    #[tracing::instrument(skip(self), fields(feed_key = %self.feed.key()))]
    pub async fn upload(&self) -> Result<()> {
        let remote = self.remote()?;
        if !self.exists_locally() {
            return Err(FeedError::PreconditionFailed(format!(
                "feed {} is not built locally",
                self.key()
            )));
        }
        for artifact in self.required() {
            let key = self.artifacts.remote_key(*artifact);
            remote.put_file(&key, &self.path(*artifact)).await?;
        }
        info!("Uploaded feed");
        Ok(())
    }

    /// Copies the required artifacts from the remote store.
    #[tracing::instrument(skip(self), fields(feed_key = %self.feed.key()))]
    pub async fn download(&self) -> Result<()> {
        let remote = self.remote()?;
        if !self.exists_remotely().await? {
            return Err(FeedError::PreconditionFailed(format!(
                "feed {} is not in the remote store",
                self.key()
            )));
        }
        fs::create_dir_all(self.artifacts.dir())?;
        for artifact in self.required() {
            let key = self.artifacts.remote_key(*artifact);
            remote.get_to_file(&key, &self.path(*artifact)).await?;
        }
        info!("Downloaded feed from remote store");
        Ok(())
    }

    /// Removes the required artifacts, then the feed directory if nothing else is left in it.
    #[tracing::instrument(skip(self), fields(feed_key = %self.feed.key()))]
    pub fn delete_locally(&mut self) -> Result<()> {
        for artifact in self.required() {
            remove_if_present(&self.path(*artifact))?;
        }
        self.failed = false;
        if let Err(e) = fs::remove_dir(self.artifacts.dir()) {
            debug!(error = %e, "Feed directory kept");
        }
        Ok(())
    }

    /// Removes every artifact including the archive and the extracted tables.
    #[tracing::instrument(skip(self), fields(feed_key = %self.feed.key()))]
    pub fn purge_locally(&mut self) -> Result<()> {
        for artifact in Artifact::ALL {
            let path = self.path(artifact);
            if artifact == Artifact::Extracted && path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                remove_if_present(&path)?;
            }
        }
        self.checksum = None;
        self.delete_locally()
    }

    /// Read-only handle to the compact store, or the primary store if there is no compact one.
    pub fn open_store(&self) -> Result<FeedStore> {
        let compact = self.path(Artifact::CompactStore);
        if compact.exists() {
            return FeedStore::open_read_only(compact);
        }
        self.open_primary_store()
    }

    pub fn open_primary_store(&self) -> Result<FeedStore> {
        let primary = self.path(Artifact::PrimaryStore);
        if !primary.exists() {
            return Err(FeedError::PreconditionFailed(format!(
                "feed {} has no primary store",
                self.key()
            )));
        }
        FeedStore::open_read_only(primary)
    }
}

/// Runs blocking work on the blocking pool inside the caller's span.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(work)).await?
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn md5_hex(path: &Path) -> Result<String> {
    let mut hasher = Md5::new();
    let mut file = fs::File::open(path)?;
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}
