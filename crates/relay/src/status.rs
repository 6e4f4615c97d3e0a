use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Holds an exclusive lock on this instance's status file for as long as
/// the process runs; operators and supervisors use the file's presence
/// (and which index it is) to tell which instance number is running from a
/// given root directory.
pub struct StatusFile {
    _file: File,
}

impl StatusFile {
    /// Tries candidate status files `<name>.0`, `<name>.1`, ... in order,
    /// opening (creating if needed) and attempting to lock each one. A
    /// candidate that exists but is unlocked belonged to a process that has
    /// since exited, and is reused rather than skipped; only a lock held by
    /// a still-running process advances the search to the next index.
    pub fn acquire(root: &Path, name: &str) -> io::Result<Self> {
        for n in 0.. {
            let path = relay_utils::rootdir::status_file_candidate(root, name, n);
            let file = OpenOptions::new().create(true).write(true).open(&path)?;
            match lock_exclusive(&file) {
                Ok(()) => return Ok(Self { _file: file }),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                Err(err) => return Err(err),
            }
        }
        unreachable!("status file search space is unbounded")
    }
}

fn lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::fd::AsRawFd;
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquires_the_first_free_status_index() {
        let dir = tempfile::tempdir().unwrap();
        relay_utils::rootdir::ensure_layout(dir.path()).unwrap();
        let status = StatusFile::acquire(dir.path(), "nd-relay").unwrap();
        assert!(relay_utils::rootdir::status_dir(dir.path()).join("nd-relay.0").exists());
        drop(status);
    }

    #[test]
    fn reuses_a_stale_index_left_behind_by_a_dead_process() {
        let dir = tempfile::tempdir().unwrap();
        relay_utils::rootdir::ensure_layout(dir.path()).unwrap();
        // Simulate a prior process that created index 0 but is no longer
        // running: the file exists, but nothing holds its lock.
        let candidate = relay_utils::rootdir::status_file_candidate(dir.path(), "nd-relay", 0);
        std::fs::write(&candidate, b"").unwrap();

        let status = StatusFile::acquire(dir.path(), "nd-relay").unwrap();
        assert!(candidate.exists());
        drop(status);
    }

    #[test]
    fn skips_an_index_genuinely_locked_by_another_process() {
        let dir = tempfile::tempdir().unwrap();
        relay_utils::rootdir::ensure_layout(dir.path()).unwrap();
        let held = StatusFile::acquire(dir.path(), "nd-relay").unwrap();

        let second = StatusFile::acquire(dir.path(), "nd-relay").unwrap();
        assert!(relay_utils::rootdir::status_dir(dir.path()).join("nd-relay.1").exists());

        drop(held);
        drop(second);
    }
}
