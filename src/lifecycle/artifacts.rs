//! On-disk and remote names of the files that make up one feed.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    /// The downloaded zip.
    Archive,
    /// Directory holding the extracted table files.
    Extracted,
    PrimaryStore,
    CompactStore,
}

impl Artifact {
    pub const ALL: [Artifact; 4] = [
        Artifact::Archive,
        Artifact::Extracted,
        Artifact::PrimaryStore,
        Artifact::CompactStore,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::Archive => "data.zip",
            Artifact::Extracted => "feed",
            Artifact::PrimaryStore => "gtfs.sqlite3",
            Artifact::CompactStore => "gtfs_compact.sqlite3",
        }
    }

    /// Artifacts whose presence means the feed is built, locally or remotely.
    pub fn required(compact_only: bool) -> &'static [Artifact] {
        if compact_only {
            &[Artifact::CompactStore]
        } else {
            &[Artifact::PrimaryStore, Artifact::CompactStore]
        }
    }
}

/// Paths of one feed's artifacts under `<root>/<feed_key>/`.
#[derive(Debug, Clone)]
pub struct FeedArtifacts {
    key: String,
    dir: PathBuf,
}

impl FeedArtifacts {
    pub fn new(root: &Path, key: &str) -> Self {
        Self {
            key: key.to_string(),
            dir: root.join(key),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    pub fn exists(&self, artifact: Artifact) -> bool {
        self.path(artifact).exists()
    }

    /// Object key of `artifact` in the remote store.
    pub fn remote_key(&self, artifact: Artifact) -> String {
        format!("{}/{}", self.key, artifact.file_name())
    }

    pub fn remote_prefix(&self) -> String {
        format!("{}/", self.key)
    }
}
