//! Process configuration: CLI parsing (§4.10/§6) and the immutable
//! [`Config`] built from it and handed to every worker task.

use crate::error::ServerError;
use clap::Parser;
use std::net::IpAddr;

/// MicroSocks-style SOCKS5 proxy: a small multi-connection SOCKS5 server
/// with optional reverse and bridge relay modes.
#[derive(Parser, Debug)]
#[command(name = "microsocks5", about)]
pub struct Cli {
    /// Listen IP.
    #[arg(short = 'i', default_value = "0.0.0.0")]
    pub listen_ip: String,

    /// Listen port.
    #[arg(short = 'p', default_value_t = 1080)]
    pub port: u16,

    /// Username for authentication.
    #[arg(short = 'u')]
    pub username: Option<String>,

    /// Password for authentication.
    #[arg(short = 'P')]
    pub password: Option<String>,

    /// Source IP for outbound connections.
    #[arg(short = 'b')]
    pub bind_ip: Option<IpAddr>,

    /// Comma-separated static whitelist of client IPs allowed without auth.
    #[arg(short = 'w')]
    pub whitelist: Option<String>,

    /// Auth-once: add successfully authenticated IPs to the allowlist.
    #[arg(short = '1')]
    pub auth_once: bool,

    /// Suppress logging.
    #[arg(short = 'q')]
    pub quiet: bool,

    /// Reverse mode: dial this host instead of listening.
    #[arg(short = 'c')]
    pub connect_ip: Option<String>,

    /// Bridge mode: pair inbound connections with accepted connections on
    /// this secondary port.
    #[arg(short = 'C')]
    pub bridge_port: Option<u16>,

    /// Increase log verbosity (repeatable). Ambient addition, not part of
    /// the wire protocol.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Immutable, `Arc`-shared configuration every worker task reads from.
pub struct Config {
    pub listen_ip: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bind_ip: Option<IpAddr>,
    pub auth_once: bool,
    pub quiet: bool,
    pub connect_host: Option<String>,
    pub bridge_port: Option<u16>,
    pub initial_whitelist: Vec<IpAddr>,
}

impl Config {
    /// Builds and validates a `Config` from parsed CLI arguments.
    ///
    /// Validation (§6): `-u`/`-P` must both be present or both absent;
    /// `-1`/`-w` require credentials; `-c` requires `-C` (the reverse-mode
    /// handshake ambiguity is resolved by requiring the pairing rather than
    /// replicating the original's undefined behavior, see DESIGN.md).
    pub fn from_cli(cli: Cli) -> Result<Self, ServerError> {
        if cli.username.is_some() != cli.password.is_some() {
            return Err(ServerError::InvalidConfig(
                "-u and -P must be used together".into(),
            ));
        }

        let has_credentials = cli.username.is_some();
        if (cli.auth_once || cli.whitelist.is_some()) && !has_credentials {
            return Err(ServerError::InvalidConfig(
                "-1/-w require -u/-P to be set".into(),
            ));
        }

        if cli.connect_ip.is_some() && cli.bridge_port.is_none() {
            return Err(ServerError::InvalidConfig(
                "-c requires -C to be set (reverse mode always pairs with bridge mode)".into(),
            ));
        }

        let mut initial_whitelist = Vec::new();
        if let Some(csv) = &cli.whitelist {
            for entry in csv.split(',') {
                let ip: IpAddr = entry
                    .trim()
                    .parse()
                    .map_err(|_| ServerError::InvalidConfig(format!("invalid -w entry: {entry}")))?;
                initial_whitelist.push(ip);
            }
        }

        Ok(Self {
            listen_ip: cli.listen_ip,
            port: cli.port,
            username: cli.username,
            password: cli.password,
            bind_ip: cli.bind_ip,
            auth_once: cli.auth_once,
            quiet: cli.quiet,
            connect_host: cli.connect_ip,
            bridge_port: cli.bridge_port,
            initial_whitelist,
        })
    }

    /// Whether the allowlist gate in §4.6 (S1) is active at all (i.e.
    /// whether auth-once or a static whitelist was configured).
    pub fn uses_allowlist(&self) -> bool {
        self.auth_once || !self.initial_whitelist.is_empty()
    }
}
