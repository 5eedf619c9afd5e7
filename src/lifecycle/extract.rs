//! Unpacking of a feed archive into its table directory.

use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{FeedError, Result};
use crate::fetch::part_path;

/// Extracts `archive` into `target`, which must not exist yet.
///
/// Files land in a `.part` sibling that is renamed to `target` once complete.
/// An archive that wraps everything in one top-level directory is flattened
/// so the table files sit directly under `target`.
#[tracing::instrument(skip_all, fields(archive = %archive.display()))]
pub fn extract_archive(archive: &Path, target: &Path) -> Result<()> {
    let partial = part_path(target);
    if partial.exists() {
        fs::remove_dir_all(&partial)?;
    }
    let result = unpack(archive, &partial).and_then(|()| hoist_single_directory(&partial));
    match result {
        Ok(()) => {
            fs::rename(&partial, target)?;
            info!(target = %target.display(), "Extracted archive");
            Ok(())
        }
        Err(e) => {
            if let Err(rm) = fs::remove_dir_all(&partial) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %rm, "Could not remove partial extraction");
                }
            }
            Err(e)
        }
    }
}

fn unpack(archive: &Path, into: &Path) -> Result<()> {
    let corrupt = |source: ZipError| match source {
        ZipError::Io(e) if e.kind() != std::io::ErrorKind::UnexpectedEof => FeedError::Io(e),
        source => FeedError::CorruptArchive {
            path: archive.to_path_buf(),
            source,
        },
    };
    let mut zip = ZipArchive::new(File::open(archive)?).map_err(corrupt)?;
    debug!(entries = zip.len(), "Opened archive");
    fs::create_dir_all(into)?;
    zip.extract(into).map_err(corrupt)
}

/// Moves the children of a lone top-level directory up into `root`.
pub fn hoist_single_directory(root: &Path) -> Result<()> {
    let entries = fs::read_dir(root)?.collect::<std::io::Result<Vec<_>>>()?;
    let [wrapper] = entries.as_slice() else {
        return Ok(());
    };
    if !wrapper.file_type()?.is_dir() {
        return Ok(());
    }

    // A child may share the wrapper's name, so move the wrapper aside first.
    let staging = root.join(".hoisting");
    fs::rename(wrapper.path(), &staging)?;
    for child in fs::read_dir(&staging)? {
        let child = child?;
        fs::rename(child.path(), root.join(child.file_name()))?;
    }
    fs::remove_dir(&staging)?;
    debug!(wrapper = ?wrapper.file_name(), "Hoisted wrapper directory");
    Ok(())
}
