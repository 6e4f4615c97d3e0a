//! POSIX daemonization: detaches the process from its controlling terminal,
//! mirroring the reference implementation's `pblProcessDetach`.
//!
//! Must run before any other thread is spawned — `fork` only duplicates the
//! calling thread, so forking after the signal watcher thread starts would
//! leave the child without it.

use std::io;
use std::os::fd::AsRawFd;

/// Double-forks and starts a new session so the resulting process has no
/// controlling terminal: first fork backgrounds the process and lets the
/// original parent exit; `setsid` makes the child a session leader; the
/// second fork gives up the session-leader slot so the grandchild can never
/// reacquire a controlling terminal by opening one.
pub fn detach() -> io::Result<()> {
    fork_and_exit_parent()?;
    if unsafe { libc::setsid() } == -1 {
        return Err(io::Error::last_os_error());
    }
    fork_and_exit_parent()?;
    drop_controlling_terminal();
    redirect_standard_fds()
}

fn fork_and_exit_parent() -> io::Result<()> {
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => Ok(()),
        _ => std::process::exit(0),
    }
}

fn drop_controlling_terminal() {
    if let Ok(tty) = std::fs::OpenOptions::new().read(true).write(true).open("/dev/tty") {
        unsafe {
            libc::ioctl(tty.as_raw_fd(), libc::TIOCNOTTY as _);
        }
    }
}

fn redirect_standard_fds() -> io::Result<()> {
    let dev_null = std::fs::OpenOptions::new().read(true).write(true).open("/dev/null")?;
    let fd = dev_null.as_raw_fd();
    unsafe {
        libc::dup2(fd, libc::STDIN_FILENO);
        libc::dup2(fd, libc::STDOUT_FILENO);
        libc::dup2(fd, libc::STDERR_FILENO);
    }
    Ok(())
}
