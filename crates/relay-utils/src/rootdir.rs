//! Path helpers under the server's `-ROOTDIR`.
//!
//! Unlike `flux-utils::directories`, which resolves an OS-convention base
//! directory via the `directories` crate, the relay's root is always an
//! explicit CLI flag, so these are plain joins with a logged fallback.

use std::path::{Path, PathBuf};

pub fn log_dir(root: &Path) -> PathBuf {
    root.join("log")
}

pub fn status_dir(root: &Path) -> PathBuf {
    root.join("status")
}

pub fn log_file(root: &Path, name: &str) -> PathBuf {
    log_dir(root).join(format!("{name}.log"))
}

/// Path of the `n`th status file candidate, `status/<name>.<n>`. Existence of
/// this path says nothing about whether the index is free: a status file
/// left behind by a dead process still exists on disk but holds no lock, so
/// callers must probe by attempting to lock each candidate in turn rather
/// than by checking `exists()`.
pub fn status_file_candidate(root: &Path, name: &str, n: u32) -> PathBuf {
    status_dir(root).join(format!("{name}.{n}"))
}

pub fn ensure_layout(root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(log_dir(root))?;
    std::fs::create_dir_all(status_dir(root))?;
    Ok(())
}
