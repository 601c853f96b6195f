//! Atomic file replacement
//!
//! Content is written to a temp file next to the destination, synced, then
//! renamed over it. Readers see either the old file or the new one, never a
//! partial write.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Replaces `dest` with `contents`
pub(crate) fn write_atomic(dest: &Path, contents: &[u8]) -> io::Result<()> {
    replace_with(dest, |temp| {
        let mut file = File::create(temp)?;
        file.write_all(contents)?;
        file.sync_all()
    })
}

/// Replaces `dest` with a copy of `src`, returning the bytes copied
pub(crate) fn copy_atomic(src: &Path, dest: &Path) -> io::Result<u64> {
    let mut copied = 0;
    replace_with(dest, |temp| {
        copied = fs::copy(src, temp)?;
        File::open(temp)?.sync_all()
    })?;
    Ok(copied)
}

fn replace_with<F>(dest: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let temp = temp_path(dest)?;

    let result = fill(&temp).and_then(|_| fs::rename(&temp, dest));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// Hidden temp file in the destination directory, so the rename stays on one
/// filesystem
fn temp_path(dest: &Path) -> io::Result<PathBuf> {
    let file_name = dest.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", dest.display()),
        )
    })?;

    Ok(dest.with_file_name(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        Uuid::new_v4().simple()
    )))
}
