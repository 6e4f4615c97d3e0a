use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::Parser;

/// net-distribution relay server
///
/// Flag spelling follows clap's conventional long-option style rather than
/// the historical single-dash `-ROOTDIR`/`-TRACE` forms; the behavior they
/// select is unchanged.
#[derive(Parser, Debug)]
#[command(name = "nd-relay", version, about)]
pub struct Cli {
    /// TCP port to listen on. Required; validated after parsing (rather than
    /// via clap's own `required`) so a missing port maps to this server's
    /// own exit code instead of clap's generic usage-error exit.
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Address to bind the listen socket to.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Root directory containing `log/` and `status/`.
    #[arg(long = "rootdir")]
    pub root_dir: Option<PathBuf>,

    /// Enable verbose trace-level logging from startup.
    #[arg(long)]
    pub trace: bool,

    /// Stay attached to the terminal instead of running as a daemon.
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Base name used for the log file and status-file lock.
    #[arg(long, default_value = "nd-relay")]
    pub name: String,
}

impl Cli {
    pub fn bind_addr(&self, port: u16) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.bind, port)
    }

    pub fn root_dir(&self) -> PathBuf {
        self.root_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("/tmp/{}", self.name)))
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            port: None,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            root_dir: None,
            trace: false,
            debug: false,
            name: "nd-relay".to_string(),
        }
    }
}
