use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGHUP, SIGINT, SIGPIPE, SIGTERM, SIGUSR2};

/// Flags flipped directly from signal context. Handlers only touch atomics
/// (the only thing guaranteed safe to do in a signal handler); the actual
/// work — reopening the log file, toggling the filter — happens on
/// [`watch`]'s background thread instead.
#[derive(Clone)]
pub struct SignalFlags {
    pub running: Arc<AtomicBool>,
    pub reopen_log: Arc<AtomicBool>,
    pub toggle_trace: Arc<AtomicBool>,
}

impl SignalFlags {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            reopen_log: Arc::new(AtomicBool::new(false)),
            toggle_trace: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for SignalFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers the server's POSIX signal handlers:
/// - `SIGTERM`/`SIGINT` clear `running` so the event loop exits its tick
///   loop and tears down cleanly.
/// - `SIGHUP` requests a log file reopen, picked up by the watcher thread,
///   so external log rotation works.
/// - `SIGUSR2` requests a trace-level toggle.
/// - `SIGPIPE` is ignored; a broken pipe is instead observed as an I/O
///   error on the specific socket that triggered it, closing only that
///   connection.
pub fn install(flags: &SignalFlags) -> Result<(), std::io::Error> {
    unsafe {
        let running = flags.running.clone();
        signal_hook::low_level::register(SIGTERM, move || {
            running.store(false, Ordering::Relaxed);
        })?;
        let running = flags.running.clone();
        signal_hook::low_level::register(SIGINT, move || {
            running.store(false, Ordering::Relaxed);
        })?;
        let reopen_log = flags.reopen_log.clone();
        signal_hook::low_level::register(SIGHUP, move || {
            reopen_log.store(true, Ordering::Relaxed);
        })?;
        let toggle_trace = flags.toggle_trace.clone();
        signal_hook::low_level::register(SIGUSR2, move || {
            toggle_trace.store(true, Ordering::Relaxed);
        })?;
        signal_hook::low_level::register(SIGPIPE, || {})?;
    }
    Ok(())
}

/// Spawns the background thread that turns `reopen_log`/`toggle_trace`
/// requests into actual work, and runs until `running` clears.
pub fn watch(flags: SignalFlags, logging: Arc<crate::logging::LoggingHandles>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while flags.running.load(Ordering::Relaxed) {
            if flags.reopen_log.swap(false, Ordering::Relaxed) {
                logging.reopen_log_file();
            }
            if flags.toggle_trace.swap(false, Ordering::Relaxed) {
                logging.toggle_trace();
            }
            std::thread::sleep(std::time::Duration::from_millis(200));
        }
    })
}
