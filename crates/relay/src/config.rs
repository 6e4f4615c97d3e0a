use std::net::SocketAddr;
use std::path::PathBuf;

use crate::cli::Cli;
use crate::exit_code::ExitCode;

/// A validated, immutable run configuration resolved once from [`Cli`] and
/// threaded through the rest of the process, rather than re-reading flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub root_dir: PathBuf,
    pub trace: bool,
    pub debug: bool,
    pub name: String,
}

impl Config {
    pub fn resolve(cli: Cli) -> Result<Self, ExitCode> {
        let port = cli.port.ok_or(ExitCode::NoPort)?;
        let root_dir = cli.root_dir();
        relay_utils::rootdir::ensure_layout(&root_dir).map_err(|_| ExitCode::InitFailure)?;

        Ok(Self {
            listen_addr: cli.bind_addr(port),
            root_dir,
            trace: cli.trace,
            debug: cli.debug,
            name: cli.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_port_resolves_to_no_port_exit_code() {
        let cli = Cli::default();
        let err = Config::resolve(cli).unwrap_err();
        assert!(matches!(err, ExitCode::NoPort));
    }

    #[test]
    fn valid_cli_resolves_to_a_listen_address() {
        let dir = tempfile::tempdir().unwrap();
        let mut cli = Cli::default();
        cli.port = Some(9100);
        cli.root_dir = Some(dir.path().to_path_buf());
        let config = Config::resolve(cli).unwrap();
        assert_eq!(config.listen_addr.port(), 9100);
    }
}
