//! Per-file exclusive sections for cross-thread and cross-process appends.
//!
//! The lock lives on a `<file>.lock` side file and is taken with the kernel's
//! advisory lock (`flock` / `LockFileEx`), so it is released when the holder
//! exits for any reason. The side file itself is left in place; its presence
//! means nothing.
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::StoreError;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
/// Holds the exclusive section for one target path until dropped.
pub struct PathLockGuard {
    file: File,
    path: PathBuf,
}

impl PathLockGuard {
    pub fn lock_path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathLockGuard {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            tracing::debug!(path = %self.path.display(), %error, "failed to unlock");
        }
    }
}

/// Side file that carries the lock for `target`.
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut file_name = target
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    file_name.push(".lock");
    target.with_file_name(file_name)
}

/// Enters the exclusive section keyed by `target`, waiting up to `timeout`.
pub fn acquire_path_lock(target: &Path, timeout: Duration) -> Result<PathLockGuard, StoreError> {
    let path = lock_path_for(target);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|error| StoreError::io("create lock directory", parent, error))?;
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&path)
        .map_err(|source| StoreError::Lock {
            path: path.clone(),
            source,
        })?;

    let start = Instant::now();
    loop {
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                record_holder(&mut file);
                return Ok(PathLockGuard { file, path });
            }
            Err(error) if is_contended(&error) => {
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    return Err(StoreError::LockTimeout {
                        path,
                        waited_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    });
                }
                thread::sleep(LOCK_POLL_INTERVAL.min(timeout - elapsed));
            }
            Err(source) => return Err(StoreError::Lock { path, source }),
        }
    }
}

fn is_contended(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn record_holder(file: &mut File) {
    let pid = std::process::id();
    let _ = file.set_len(0).and_then(|()| writeln!(file, "{pid}"));
}
