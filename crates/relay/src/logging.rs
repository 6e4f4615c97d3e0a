use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{fmt, reload, EnvFilter};

/// A log file handle that can be closed and reopened in place, so external
/// log rotation (the conventional `logrotate` + `SIGHUP` dance) works
/// without restarting the process.
#[derive(Clone)]
struct ReopenableFile {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl ReopenableFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    fn reopen(&self) -> io::Result<()> {
        let fresh = open_append(&self.path)?;
        *self.file.lock().unwrap() = fresh;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl Write for ReopenableFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().unwrap().flush()
    }
}

impl<'a> fmt::MakeWriter<'a> for ReopenableFile {
    type Writer = ReopenableFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Handles kept by `main` to react to `SIGHUP` (reopen the log file) and
/// `SIGUSR2` (toggle trace-level logging) without tearing down the
/// subscriber.
pub struct LoggingHandles {
    log_file: Option<ReopenableFile>,
    filter_handle: reload::Handle<EnvFilter, tracing_subscriber::Registry>,
    trace_on: std::sync::atomic::AtomicBool,
}

impl LoggingHandles {
    pub fn reopen_log_file(&self) {
        if let Some(file) = &self.log_file {
            if let Err(err) = file.reopen() {
                tracing::error!(%err, "failed to reopen log file");
            }
        }
    }

    pub fn toggle_trace(&self) {
        use std::sync::atomic::Ordering;
        let now_trace = !self.trace_on.load(Ordering::Relaxed);
        self.trace_on.store(now_trace, Ordering::Relaxed);
        let directive = if now_trace { "trace" } else { "info" };
        let _ = self.filter_handle.modify(|filter| {
            *filter = EnvFilter::new(directive);
        });
        tracing::info!(trace_on = now_trace, "trace logging toggled");
    }
}

/// Initialises the global subscriber: `RUST_LOG`-driven if set, otherwise
/// `trace` when `-TRACE` was passed or `info` by default. Logs to stdout in
/// `-D`/`--debug` mode, and additionally to `<ROOTDIR>/log/<name>.log`
/// otherwise.
pub fn init(log_path: Option<&Path>, trace: bool) -> LoggingHandles {
    let default_directive = if trace { "trace" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let (filter, filter_handle) = reload::Layer::new(filter);

    let log_file = log_path.and_then(|path| match ReopenableFile::open(path.to_path_buf()) {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!("failed to open log file {}: {err}", path.display());
            None
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    match &log_file {
        Some(file) => {
            registry.with(fmt::layer().with_writer(file.clone())).init();
        }
        None => {
            registry.with(fmt::layer()).init();
        }
    }

    LoggingHandles {
        log_file,
        filter_handle,
        trace_on: std::sync::atomic::AtomicBool::new(trace),
    }
}
