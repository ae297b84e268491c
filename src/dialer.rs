//! Outbound connection helper (§4.4): resolve, iterate candidates, tune,
//! connect. Used both for CONNECT targets and for reverse-mode dialing.

use crate::addr::resolve;
use crate::socket;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::net::{TcpSocket, TcpStream};

/// Resolves `host:port` and attempts to connect to each candidate in
/// order; the first successful connection wins. Returns the last error
/// encountered if every candidate fails.
pub async fn dial(host: &str, port: u16) -> io::Result<TcpStream> {
    let candidates = resolve(host, port).await?;
    let mut last_err = None;
    for addr in candidates {
        match connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::other(format!("no addresses for {host}:{port}"))))
}

/// Connects directly to an already-resolved address, applying the fixed
/// tuning profile first (matching microsocks, which tunes the socket
/// before calling `connect`).
pub async fn connect(addr: SocketAddr) -> io::Result<TcpStream> {
    connect_bound(addr, None).await
}

/// Connects to `addr`, optionally binding the outbound socket to
/// `bind_addr` first. Per §4.1/§4.6, the bind is applied only when its
/// family matches `addr`'s family; a mismatched `bind_addr` is silently
/// ignored rather than rejected (the caller, via [`crate::addr::choose`],
/// is expected to have already picked a family-matching candidate).
pub async fn connect_bound(addr: SocketAddr, bind_addr: Option<IpAddr>) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv6() { TcpSocket::new_v6()? } else { TcpSocket::new_v4()? };
    socket::tune(&socket);
    if let Some(bind_addr) = bind_addr {
        if bind_addr.is_ipv6() == addr.is_ipv6() {
            socket.bind(SocketAddr::new(bind_addr, 0))?;
        }
    }
    socket.connect(addr).await
}
