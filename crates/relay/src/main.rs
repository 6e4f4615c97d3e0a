mod cli;
mod config;
mod daemon;
mod exit_code;
mod logging;
mod signals;
mod status;

use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;

use clap::Parser;
use relay_core::EventLoop;

use cli::Cli;
use config::Config;
use exit_code::ExitCode;
use signals::SignalFlags;

fn main() -> ProcessExitCode {
    let cli = Cli::parse();
    let config = match Config::resolve(cli) {
        Ok(config) => config,
        Err(code) => {
            eprintln!("nd-relay: {code:?}");
            return ProcessExitCode::from(code.code() as u8);
        }
    };

    let log_path = if config.debug {
        None
    } else {
        Some(relay_utils::rootdir::log_file(&config.root_dir, &config.name))
    };

    if !config.debug {
        if let Err(err) = daemon::detach() {
            eprintln!("nd-relay: failed to detach from controlling terminal: {err}");
            return ProcessExitCode::from(ExitCode::InitFailure.code() as u8);
        }
    }

    let logging = Arc::new(logging::init(log_path.as_deref(), config.trace));

    let _status = match status::StatusFile::acquire(&config.root_dir, &config.name) {
        Ok(status) => status,
        Err(err) => {
            tracing::error!(%err, "failed to acquire status file lock");
            return ProcessExitCode::from(ExitCode::InitFailure.code() as u8);
        }
    };

    let flags = SignalFlags::new();
    if let Err(err) = signals::install(&flags) {
        tracing::error!(%err, "failed to install signal handlers");
        return ProcessExitCode::from(ExitCode::InitFailure.code() as u8);
    }
    let watcher = signals::watch(flags.clone(), logging.clone());

    tracing::info!(addr = %config.listen_addr, "starting nd-relay");
    let mut event_loop = match EventLoop::bind(config.listen_addr) {
        Ok(event_loop) => event_loop,
        Err(err) => {
            tracing::error!(%err, "failed to bind listen socket");
            flags.running.store(false, std::sync::atomic::Ordering::Relaxed);
            let _ = watcher.join();
            return ProcessExitCode::from(ExitCode::ListenBindFailure.code() as u8);
        }
    };

    let result = event_loop.run(&flags.running);
    flags.running.store(false, std::sync::atomic::Ordering::Relaxed);
    let _ = watcher.join();

    match result {
        Ok(()) => {
            tracing::info!("nd-relay shut down cleanly");
            ProcessExitCode::from(ExitCode::Ok.code() as u8)
        }
        Err(err) => {
            tracing::error!(%err, "event loop exited with an error");
            ProcessExitCode::from(ExitCode::NetworkInitFailure.code() as u8)
        }
    }
}
