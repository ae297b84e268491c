//! Per-connection task dispatch and the three relay disciplines (§4.2,
//! §4.8): normal (accept + SOCKS5 handshake), reverse (dial a control
//! endpoint instead of listening), and bridge (pair two independently
//! accepted connections with no SOCKS framing at all).
//!
//! One `tokio::task` stands in for "one worker thread" from the original
//! design; a [`Worker`]'s `done` flag is just its [`tokio::task::JoinHandle`]
//! reporting [`JoinHandle::is_finished`], so the worker list never needs its
//! own atomic completion flag.

use crate::authip::AuthIpSet;
use crate::config::Config;
use crate::handshake::{self, AuthPolicy};
use crate::dialer;
use crate::listener;
use crate::relay::{self, Counters};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Sleep applied after a failed `accept`/dial/spawn before retrying, so a
/// transient resource exhaustion (e.g. `EMFILE`) doesn't spin the loop.
const FAILURE_BACKOFF: Duration = Duration::from_micros(64);

/// Reverse-mode dial back-off bounds (§4.8): starts at one second, doubles
/// on each consecutive failure, capped at 60 seconds once a connection has
/// succeeded at least once, or 300 seconds before the first success.
const RECONNECT_MIN: Duration = Duration::from_secs(1);
const RECONNECT_MAX_STEADY: Duration = Duration::from_secs(60);
const RECONNECT_MAX_BOOTSTRAP: Duration = Duration::from_secs(300);

/// A single in-flight connection-handling task plus bookkeeping the main
/// loop uses to reap it.
pub struct Worker {
    handle: JoinHandle<()>,
}

impl Worker {
    /// Whether this worker's task has finished, lock-free (§5).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// The set of currently in-flight workers. The main loop reaps finished
/// entries before each accept/dial iteration rather than running a
/// separate background sweep.
#[derive(Default)]
pub struct WorkerList {
    workers: Vec<Worker>,
}

impl WorkerList {
    pub fn push(&mut self, worker: Worker) {
        self.workers.push(worker);
    }

    /// Drops every worker whose task has already completed.
    pub fn reap(&mut self) {
        self.workers.retain(|w| !w.is_finished());
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

/// Shared state every spawned connection task needs a handle to.
pub struct Shared {
    pub config: Config,
    pub authip: AuthIpSet,
    pub counters: Arc<Counters>,
}

impl Shared {
    pub fn new(config: Config) -> Self {
        let authip = AuthIpSet::with_entries(config.initial_whitelist.clone());
        Self { config, authip, counters: Arc::new(Counters::default()) }
    }

    fn policy(&self) -> AuthPolicy<'_> {
        AuthPolicy {
            username: self.config.username.as_deref(),
            password: self.config.password.as_deref(),
            auth_once: self.config.auth_once,
            bind_ip: self.config.bind_ip,
        }
    }
}

/// Normal mode: accept connections on a listening socket and drive each
/// through the SOCKS5 handshake and relay in its own task.
pub async fn run_normal(shared: Arc<Shared>) -> Result<(), crate::error::ServerError> {
    let server = listener::listen_on(&shared.config.listen_ip, shared.config.port).await?;
    info!(addr = %server.addr, "accepting SOCKS5 connections");

    let mut workers = WorkerList::default();
    loop {
        workers.reap();

        match listener::accept_one(&server).await {
            Ok((stream, peer)) => {
                let shared = Arc::clone(&shared);
                let handle = tokio::spawn(async move {
                    handle_socks_connection(shared, stream, peer.ip()).await;
                });
                workers.push(Worker { handle });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(FAILURE_BACKOFF).await;
            }
        }
    }
}

/// Reverse mode (`-c`), always paired with bridge mode (`-C`, enforced by
/// `Config::from_cli`): instead of accepting SOCKS5 clients, repeatedly
/// dials `host:port` and pairs each successful dial with one connection
/// accepted on the bridge listener, relaying raw bytes between the two —
/// no SOCKS handshake runs on either side of this pairing.
pub async fn run_reverse(
    shared: Arc<Shared>,
    host: String,
) -> Result<(), crate::error::ServerError> {
    let port = shared.config.port;
    let bridge_port = shared
        .config
        .bridge_port
        .expect("Config::from_cli requires -C whenever -c is set");
    let bridge = Arc::new(listener::listen_on(&shared.config.listen_ip, bridge_port).await?);
    info!(%host, port, bridge = %bridge.addr, "reverse mode: dialing control endpoint, pairing with bridge accepts");

    let mut workers = WorkerList::default();
    let mut backoff = RECONNECT_MIN;
    let mut ever_connected = false;

    loop {
        workers.reap();

        match dialer::dial(&host, port).await {
            Ok(dialed) => {
                ever_connected = true;
                backoff = RECONNECT_MIN;

                let shared = Arc::clone(&shared);
                let bridge = Arc::clone(&bridge);
                let handle = tokio::spawn(async move {
                    match listener::accept_one(&bridge).await {
                        Ok((bridge_stream, peer)) => {
                            if let Err(e) = relay::relay(dialed, bridge_stream, &shared.counters).await {
                                warn!(%peer, error = %e, "reverse relay ended with error");
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "bridge-side accept failed after reverse dial");
                        }
                    }
                });
                workers.push(Worker { handle });
            }
            Err(e) => {
                warn!(error = %e, %host, port, "reverse dial failed, backing off");
                tokio::time::sleep(backoff).await;
                let cap = if ever_connected { RECONNECT_MAX_STEADY } else { RECONNECT_MAX_BOOTSTRAP };
                backoff = (backoff * 2).min(cap);
            }
        }
    }
}

/// Bridge mode (`-C`): a second listener on the secondary port. Each
/// connection accepted on the primary listener is handed to a worker that
/// itself accepts one connection on the bridge listener (rather than
/// running the SOCKS handshake) and relays raw bytes between the two —
/// no SOCKS framing on either side.
pub async fn run_bridge(
    shared: Arc<Shared>,
    bridge_port: u16,
) -> Result<(), crate::error::ServerError> {
    let primary = listener::listen_on(&shared.config.listen_ip, shared.config.port).await?;
    let bridge = Arc::new(listener::listen_on(&shared.config.listen_ip, bridge_port).await?);
    info!(primary = %primary.addr, bridge = %bridge.addr, "bridging connections");

    let mut workers = WorkerList::default();
    loop {
        workers.reap();

        match listener::accept_one(&primary).await {
            Ok((primary_stream, peer)) => {
                let shared = Arc::clone(&shared);
                let bridge = Arc::clone(&bridge);
                let handle = tokio::spawn(async move {
                    match listener::accept_one(&bridge).await {
                        Ok((bridge_stream, _)) => {
                            if let Err(e) = relay::relay(primary_stream, bridge_stream, &shared.counters).await {
                                warn!(%peer, error = %e, "bridge relay ended with error");
                            }
                        }
                        Err(e) => {
                            warn!(%peer, error = %e, "bridge-side accept failed");
                        }
                    }
                });
                workers.push(Worker { handle });
            }
            Err(e) => {
                warn!(error = %e, "primary accept failed");
                tokio::time::sleep(FAILURE_BACKOFF).await;
            }
        }
    }
}

/// Drives one accepted or dialed connection through the SOCKS5 handshake
/// and, on success, the relay loop. Any error (protocol violation, auth
/// failure, connect failure) ends the connection without propagating past
/// this task — a single bad client must never bring down the server.
async fn handle_socks_connection(shared: Arc<Shared>, stream: TcpStream, peer_ip: std::net::IpAddr) {
    let policy = shared.policy();
    match handshake::run(stream, peer_ip, &policy, &shared.authip).await {
        Ok((client, target)) => {
            if let Err(e) = relay::relay(client, target, &shared.counters).await {
                warn!(%peer_ip, error = %e, "relay ended with error");
            }
        }
        Err(e) => {
            warn!(%peer_ip, error = %e, "handshake failed");
        }
    }
}
