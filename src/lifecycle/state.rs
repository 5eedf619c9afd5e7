use serde::Serialize;

use super::artifacts::{Artifact, FeedArtifacts};

/// How far a feed has progressed through download, extract, ingest and compact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    Absent,
    Downloaded,
    Extracted,
    Ingested,
    Compacted,
    /// The last build attempt failed. Cleared by the next successful build.
    Failed,
}

impl FeedState {
    /// Reads the state from the artifacts present on disk.
    ///
    /// In compact-only mode the primary store is removed after compaction, so
    /// the compact store alone counts as compacted.
    pub fn observe(artifacts: &FeedArtifacts, compact_only: bool) -> Self {
        let primary = artifacts.exists(Artifact::PrimaryStore);
        if artifacts.exists(Artifact::CompactStore) && (primary || compact_only) {
            FeedState::Compacted
        } else if primary {
            FeedState::Ingested
        } else if artifacts.exists(Artifact::Extracted) {
            FeedState::Extracted
        } else if artifacts.exists(Artifact::Archive) {
            FeedState::Downloaded
        } else {
            FeedState::Absent
        }
    }
}

impl std::fmt::Display for FeedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FeedState::Absent => "absent",
            FeedState::Downloaded => "downloaded",
            FeedState::Extracted => "extracted",
            FeedState::Ingested => "ingested",
            FeedState::Compacted => "compacted",
            FeedState::Failed => "failed",
        };
        f.write_str(name)
    }
}
