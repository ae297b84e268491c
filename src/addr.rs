//! Name resolution and outbound-bind address selection.
//!
//! `resolve`/`resolve_one` stand in for the reference implementation's
//! `getaddrinfo(host, port, {AF_UNSPEC, SOCK_STREAM})`; `choose` is the
//! direct translation of its `addr_choose`.

use std::net::{IpAddr, SocketAddr};

/// Resolves `host:port` to every candidate socket address tokio's DNS
/// resolver returns, in the order it returns them.
pub async fn resolve(host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
    tokio::net::lookup_host((host, port)).await.map(Iterator::collect)
}

/// Resolves `host:port` and returns only the first candidate.
pub async fn resolve_one(host: &str, port: u16) -> std::io::Result<Option<SocketAddr>> {
    Ok(resolve(host, port).await?.into_iter().next())
}

/// Picks the candidate whose address family matches `bind_addr`'s family.
/// If `bind_addr` is `None`, or none of the candidates match its family,
/// falls back to the first candidate. Mirrors microsocks's `addr_choose`:
/// the outbound socket family must be compatible with the configured
/// source address, or the bind is simply skipped.
pub fn choose(candidates: &[SocketAddr], bind_addr: Option<IpAddr>) -> Option<SocketAddr> {
    if let Some(bind_addr) = bind_addr {
        let want_v6 = bind_addr.is_ipv6();
        if let Some(&matched) = candidates.iter().find(|c| c.is_ipv6() == want_v6) {
            return Some(matched);
        }
    }
    candidates.first().copied()
}
