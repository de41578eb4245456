use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Append one newline-terminated line to `path` and force it to stable storage.
///
/// The line is written with a single `write_all` so a concurrent lock-free
/// reader observes either nothing or a prefix of this line, never an
/// interleaving with another writer holding the same lock. A file whose last
/// line was cut short by a crash is newline-terminated first so the torn
/// fragment stays on its own line. When the file or any of its parent
/// directories is created here, the new directory entries are synced too.
pub fn append_line_durable(path: &Path, line: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    if path.is_dir() {
        bail!("destination path '{}' is a directory", path.display());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all_durable(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let existed = path.exists();
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut buffer = String::with_capacity(line.len().saturating_add(2));
    if has_unterminated_tail(&mut file)
        .with_context(|| format!("failed to inspect {}", path.display()))?
    {
        buffer.push('\n');
    }
    buffer.push_str(line);
    buffer.push('\n');
    file.write_all(buffer.as_bytes())
        .with_context(|| format!("failed to append {}", path.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    file.sync_data()
        .with_context(|| format!("failed to sync {}", path.display()))?;
    if !existed {
        sync_parent_dir(path)
            .with_context(|| format!("failed to sync parent of {}", path.display()))?;
    }
    Ok(())
}

/// `create_dir_all` that syncs the parent of every directory it creates.
pub fn create_dir_all_durable(dir: &Path) -> std::io::Result<()> {
    let mut missing = Vec::new();
    let mut cursor = Some(dir);
    while let Some(current) = cursor {
        if current.as_os_str().is_empty() || current.is_dir() {
            break;
        }
        missing.push(current);
        cursor = current.parent();
    }
    for created in missing.into_iter().rev() {
        match std::fs::create_dir(created) {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::AlreadyExists && created.is_dir() => {}
            Err(error) => return Err(error),
        }
        sync_parent_dir(created)?;
    }
    Ok(())
}

/// Flushes the directory entry of `path` by syncing its parent directory.
#[cfg(unix)]
pub fn sync_parent_dir(path: &Path) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::File::open(parent)?.sync_all()
}

/// Directory handles cannot be synced here; file data is still synced.
#[cfg(not(unix))]
pub fn sync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn has_unterminated_tail(file: &mut std::fs::File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0_u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
