//! Builds the compact store: a copy of the primary store without its volume tables.

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::GtfsTable;
use crate::store::FeedStore;

/// Tables that dominate the row count but are not needed for summary queries.
pub const VOLUME_TABLES: [GtfsTable; 2] = [GtfsTable::StopTimes, GtfsTable::Shapes];

/// Copies `source` to `target`, empties the volume tables of the copy and vacuums it.
///
/// `source` is never opened for writing. On failure `target` is removed.
#[tracing::instrument(skip_all, fields(source = %source.display(), target = %target.display()))]
pub fn make_compact_store(source: &Path, target: &Path) -> Result<u64> {
    match compact_copy(source, target) {
        Ok(size) => {
            info!(bytes = size, "Compacted store");
            Ok(size)
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(target) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %rm, "Could not remove partial compact store");
                }
            }
            Err(e)
        }
    }
}

fn compact_copy(source: &Path, target: &Path) -> Result<u64> {
    fs::copy(source, target)?;
    {
        let mut store = FeedStore::open(target)?;
        for table in VOLUME_TABLES {
            let deleted = store.delete_all(table)?;
            debug!(table = %table, rows = deleted, "Dropped volume table rows");
        }
        store.vacuum()?;
    }
    Ok(fs::metadata(target)?.len())
}
