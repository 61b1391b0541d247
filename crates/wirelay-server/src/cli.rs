//! Server CLI implementation.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use wirelay_core::constants::{
    DEFAULT_HOST_KEY_FILE, DEFAULT_IDENTITY_DB_FILE, DEFAULT_SSH_PORT, DEFAULT_STATUS_ADDR,
};

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for wirelay_core::LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => wirelay_core::LogFormat::Text,
            CliLogFormat::Json => wirelay_core::LogFormat::Json,
        }
    }
}

/// wirelay relay hub - SSH endpoint for chat and file transfer.
#[derive(Debug, Parser)]
#[command(
    name = "wirelay-server",
    version,
    about = "wirelay relay hub - SSH endpoint for chat and file transfer"
)]
pub struct Cli {
    /// Address to listen on
    #[arg(short = 'b', long = "bind", default_value = "0.0.0.0")]
    pub bind_addr: IpAddr,

    /// SSH port to listen on
    #[arg(short = 'p', long = "port", default_value_t = DEFAULT_SSH_PORT)]
    pub port: u16,

    /// Address of the status HTTP listener
    #[arg(long = "status-addr", default_value = DEFAULT_STATUS_ADDR)]
    pub status_addr: SocketAddr,

    /// Path to the host private key
    #[arg(long = "host-key", value_name = "PATH", default_value = DEFAULT_HOST_KEY_FILE)]
    pub host_key: PathBuf,

    /// Path to the nickname database
    #[arg(long = "identity-db", value_name = "PATH", default_value = DEFAULT_IDENTITY_DB_FILE)]
    pub identity_db: PathBuf,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Log to file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: CliLogFormat,
}

impl Cli {
    /// The SSH socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::net::Ipv4Addr;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn default_values() {
        let cli = Cli::try_parse_from(["wirelay-server"]).unwrap();
        assert_eq!(cli.bind_addr, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(cli.port, DEFAULT_SSH_PORT);
        assert_eq!(cli.status_addr, DEFAULT_STATUS_ADDR.parse().unwrap());
        assert_eq!(cli.host_key, PathBuf::from(DEFAULT_HOST_KEY_FILE));
        assert_eq!(cli.identity_db, PathBuf::from(DEFAULT_IDENTITY_DB_FILE));
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.log_format, CliLogFormat::Text);
    }

    #[test]
    fn parse_bind_and_port() {
        let cli = Cli::try_parse_from(["wirelay-server", "-b", "127.0.0.1", "-p", "2299"]).unwrap();
        assert_eq!(
            cli.socket_addr(),
            "127.0.0.1:2299".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn parse_status_addr() {
        let cli =
            Cli::try_parse_from(["wirelay-server", "--status-addr", "0.0.0.0:9090"]).unwrap();
        assert_eq!(cli.status_addr, "0.0.0.0:9090".parse().unwrap());
    }

    #[test]
    fn parse_invalid_status_addr() {
        assert!(Cli::try_parse_from(["wirelay-server", "--status-addr", "not-an-addr"]).is_err());
    }

    #[test]
    fn parse_key_and_db_paths() {
        let cli = Cli::try_parse_from([
            "wirelay-server",
            "--host-key",
            "/etc/wirelay/host_key",
            "--identity-db",
            "/var/lib/wirelay/nicks.db",
        ])
        .unwrap();
        assert_eq!(cli.host_key, PathBuf::from("/etc/wirelay/host_key"));
        assert_eq!(cli.identity_db, PathBuf::from("/var/lib/wirelay/nicks.db"));
    }

    #[test]
    fn parse_verbosity() {
        let cli = Cli::try_parse_from(["wirelay-server", "-vvv"]).unwrap();
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn parse_log_format() {
        let cli = Cli::try_parse_from(["wirelay-server", "--log-format", "json"]).unwrap();
        assert_eq!(cli.log_format, CliLogFormat::Json);
    }
}
