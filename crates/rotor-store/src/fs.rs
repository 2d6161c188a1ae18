use std::{fs, io::Write, path::Path};

use crate::error::StoreError;

/// Replace `target` with `data` so readers see either the old or the new content.
///
/// The bytes go to a temp file in the same directory, are fsynced, then renamed over the target.
/// The parent directory is created when missing.
pub fn atomic_write(target: &Path, data: &[u8]) -> Result<(), StoreError> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;

    if fs::symlink_metadata(target).is_ok_and(|m| m.is_dir()) {
        return Err(StoreError::malformed(target, "target path is a directory"));
    }

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| StoreError::io(parent, e))?;
    temp.write_all(data)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| StoreError::io(temp.path(), e))?;
    temp.persist(target)
        .map_err(|e| StoreError::io(target, e.error))?;

    sync_dir(parent);
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        tracing::debug!(target: "rotor.store", dir = %dir.display(), err = %e, "directory fsync failed");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
