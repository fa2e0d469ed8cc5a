//! Durable file writes.
//!
//! Part files must survive a crash at any point: a file either exists
//! with its full contents or does not exist at all. `write_sync`
//! fsyncs the file and its parent directory; `write_atomic` adds a
//! unique temp file plus rename so the destination is never observed
//! half-written.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::error::{PartError, Result};

/// Monotonic suffix for temp file names; distinguishes concurrent
/// writers within one process.
static TMP_FILE_SEQ: AtomicU64 = AtomicU64::new(0);

fn storage_err(path: &Path, source: std::io::Error) -> PartError {
    PartError::Storage {
        path: path.to_path_buf(),
        source,
    }
}

/// Fsyncs the directory containing `path` so a new directory entry is
/// durable.
fn sync_parent_dir(path: &Path) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let dir = File::open(parent).map_err(|e| storage_err(parent, e))?;
    dir.sync_all().map_err(|e| storage_err(parent, e))?;
    Ok(())
}

/// Writes `data` to `path`, fsyncing the file and its parent
/// directory. Fails if the file already exists.
pub fn write_sync(path: &Path, data: &[u8]) -> Result<()> {
    let mut f = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| storage_err(path, e))?;
    f.write_all(data).map_err(|e| storage_err(path, e))?;
    f.sync_all().map_err(|e| storage_err(path, e))?;
    drop(f);
    sync_parent_dir(path)?;
    debug!(path = %path.display(), len = data.len(), "wrote file");
    Ok(())
}

/// Atomically replaces `path` with `data`.
///
/// The data is written and fsynced under a temp name in the same
/// directory, then renamed over the destination. On failure the temp
/// file is removed and the destination is left untouched.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let seq = TMP_FILE_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(format!(".tmp.{}.{seq}", std::process::id()));
    let tmp_path = path.with_file_name(tmp_name);

    let result = write_sync(&tmp_path, data)
        .and_then(|()| fs::rename(&tmp_path, path).map_err(|e| storage_err(path, e)))
        .and_then(|()| sync_parent_dir(path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
