//! The SOCKS5 connection state machine (§4.6): Connected → NeedAuth → Authed.
//!
//! Drives a single accepted client through method negotiation, optional
//! RFC 1929 sub-negotiation, and the CONNECT request, returning the
//! connected target stream on success so the caller can hand both sides to
//! [`crate::relay`].

use crate::auth::reply::{AuthReply, AuthStatus};
use crate::auth::request::AuthRequest;
use crate::authip::AuthIpSet;
use crate::conn::reply::{ConnReply, Rep};
use crate::conn::request::{Cmd, ConnRequest};
use crate::dialer;
use crate::error::SocksError;
use crate::msg::message::{MethodSelection, VersionMessage};
use crate::msg::method::{FixedMethod, Method};
use crate::parse::AddrPort;
use std::net::IpAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Immutable per-connection view of the fields the handshake needs out of
/// [`crate::config::Config`]; avoids threading the whole config struct
/// through every function signature.
pub struct AuthPolicy<'a> {
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub auth_once: bool,
    pub bind_ip: Option<IpAddr>,
}

/// Runs the state machine for one accepted connection. On success, returns
/// the client stream (handshake complete, positioned right after the
/// CONNECT reply was written) and the connected target stream.
pub async fn run(
    mut client: TcpStream,
    peer_ip: IpAddr,
    policy: &AuthPolicy<'_>,
    authip: &AuthIpSet,
) -> Result<(TcpStream, TcpStream), SocksError> {
    let method = negotiate_method(&mut client, peer_ip, policy, authip).await?;

    match method {
        Method::Fixed(FixedMethod::NoAuth) => {}
        Method::Fixed(FixedMethod::UsePass) => {
            sub_negotiate(&mut client, peer_ip, policy, authip).await?;
        }
        _ => unreachable!("negotiate_method only ever selects NoAuth or UsePass"),
    }

    let request = match read_conn_request(&mut client).await {
        Ok(request) => request,
        Err(e @ SocksError::InvalidAddressType(_)) => {
            reply_and_close(&mut client, Rep::AddressTypeNotSupported).await;
            return Err(e);
        }
        Err(e @ SocksError::UnsupportedCommand(_)) => {
            reply_and_close(&mut client, Rep::CommandNotSupported).await;
            return Err(e);
        }
        Err(e) => return Err(e),
    };
    debug!(%peer_ip, request = %request, "connect request");

    if request.rsv != 0 {
        reply_and_close(&mut client, Rep::GeneralFailure).await;
        return Err(SocksError::ReservedByteNonZero);
    }

    if request.cmd != Cmd::Connect {
        reply_and_close(&mut client, Rep::CommandNotSupported).await;
        return Err(SocksError::UnsupportedCommand(request.cmd as u8));
    }

    match connect_target(&request.dst, policy.bind_ip).await {
        Ok(target) => {
            let reply = ConnReply::new(Rep::Succeeded);
            client.write_all(&reply.to_bytes()).await?;
            Ok((client, target))
        }
        Err(rep) => {
            reply_and_close(&mut client, rep).await;
            Err(SocksError::UpstreamUnreachable(rep))
        }
    }
}

/// Reads the client's version message and selects a method.
///
/// Selection rules (§4.6, S1): if no credentials are configured, the only
/// acceptable method is `NO_AUTH`. If credentials are configured, a peer
/// already present in the allowlist (static `-w` entries or a prior
/// auth-once success) may still use `NO_AUTH`; any other peer must offer
/// `USERNAME/PASSWORD`. If nothing offered by the client is acceptable,
/// `NO_ACCEPTABLE_METHODS` is sent and the connection is rejected.
async fn negotiate_method(
    client: &mut TcpStream,
    peer_ip: IpAddr,
    policy: &AuthPolicy<'_>,
    authip: &AuthIpSet,
) -> Result<Method, SocksError> {
    let version_message = match read_version_message(client).await {
        Ok(m) => m,
        Err(e) => {
            let _ = client
                .write_all(&MethodSelection::new(Method::Fixed(FixedMethod::NoAcceptable)).to_bytes())
                .await;
            return Err(e);
        }
    };

    let has_credentials = policy.username.is_some();
    let allowlisted = has_credentials && authip.contains(peer_ip);

    let offers = |m: FixedMethod| version_message.methods.contains(&Method::Fixed(m));

    let selected = if !has_credentials && offers(FixedMethod::NoAuth) {
        Some(Method::Fixed(FixedMethod::NoAuth))
    } else if allowlisted && offers(FixedMethod::NoAuth) {
        Some(Method::Fixed(FixedMethod::NoAuth))
    } else if has_credentials && offers(FixedMethod::UsePass) {
        Some(Method::Fixed(FixedMethod::UsePass))
    } else {
        None
    };

    let method = selected.unwrap_or(Method::Fixed(FixedMethod::NoAcceptable));
    client.write_all(&MethodSelection::new(method).to_bytes()).await?;

    if method == Method::Fixed(FixedMethod::NoAcceptable) {
        return Err(SocksError::NoAcceptableMethod);
    }

    Ok(method)
}

/// Runs RFC 1929 §2 sub-negotiation (§4.6, S2). On success, registers the
/// peer in the allowlist if auth-once is configured.
async fn sub_negotiate(
    client: &mut TcpStream,
    peer_ip: IpAddr,
    policy: &AuthPolicy<'_>,
    authip: &AuthIpSet,
) -> Result<(), SocksError> {
    let request = read_auth_request(client).await?;

    let ok = policy.username == Some(request.uname.as_str())
        && policy.password == Some(request.passwd.as_str());

    if !ok {
        client.write_all(&AuthReply::new(AuthStatus::Failure).to_bytes()).await?;
        warn!(%peer_ip, "authentication failed");
        return Err(SocksError::AuthRejected);
    }

    client.write_all(&AuthReply::new(AuthStatus::Success).to_bytes()).await?;

    if policy.auth_once && authip.add(peer_ip) {
        debug!(%peer_ip, "added to allowlist after successful auth");
    }

    Ok(())
}

/// Resolves and connects to a CONNECT request's destination, applying the
/// configured outbound bind address. Domain targets are resolved via DNS;
/// IP targets are used directly. I/O failures are mapped to the closest
/// matching SOCKS reply code.
async fn connect_target(dst: &AddrPort, bind_ip: Option<IpAddr>) -> Result<TcpStream, Rep> {
    let candidates = match dst {
        AddrPort::V4(ip, port) => vec![std::net::SocketAddr::new(IpAddr::V4(*ip), *port)],
        AddrPort::V6(ip, port) => vec![std::net::SocketAddr::new(IpAddr::V6(*ip), *port)],
        AddrPort::Domain(host, port) => crate::addr::resolve(host, *port)
            .await
            .map_err(|_| Rep::GeneralFailure)?,
    };

    if candidates.is_empty() {
        return Err(Rep::GeneralFailure);
    }

    let addr = crate::addr::choose(&candidates, bind_ip).ok_or(Rep::HostUnreachable)?;

    dialer::connect_bound(addr, bind_ip).await.map_err(|e| io_error_to_rep(&e))
}

/// Best-effort translation from a connect-phase I/O error to a SOCKS reply
/// code; anything not recognized falls back to `GeneralFailure`.
fn io_error_to_rep(e: &std::io::Error) -> Rep {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => Rep::ConnectionRefused,
        std::io::ErrorKind::TimedOut => Rep::TTLExpired,
        std::io::ErrorKind::NotFound => Rep::HostUnreachable,
        _ => Rep::GeneralFailure,
    }
}

async fn reply_and_close(client: &mut TcpStream, rep: Rep) {
    let _ = client.write_all(&ConnReply::new(rep).to_bytes()).await;
    let _ = client.shutdown().await;
}

async fn read_version_message(client: &mut TcpStream) -> Result<VersionMessage, SocksError> {
    let mut header = [0u8; 2];
    client.read_exact(&mut header).await?;
    let nmethods = header[1] as usize;
    let mut buf = vec![0u8; 2 + nmethods];
    buf[..2].copy_from_slice(&header);
    client.read_exact(&mut buf[2..]).await?;
    VersionMessage::try_from(&buf[..])
}

async fn read_auth_request(client: &mut TcpStream) -> Result<AuthRequest, SocksError> {
    let mut header = [0u8; 2];
    client.read_exact(&mut header).await?;
    let ulen = header[1] as usize;

    let mut buf = vec![0u8; 2 + ulen + 1];
    buf[..2].copy_from_slice(&header);
    client.read_exact(&mut buf[2..2 + ulen + 1]).await?;

    let plen = buf[2 + ulen] as usize;
    let mut full = buf;
    full.resize(full.len() + plen, 0);
    let tail_start = full.len() - plen;
    client.read_exact(&mut full[tail_start..]).await?;

    AuthRequest::try_from(&full[..])
}

async fn read_conn_request(client: &mut TcpStream) -> Result<ConnRequest, SocksError> {
    let mut header = [0u8; 4];
    client.read_exact(&mut header).await?;
    let atyp = header[3];

    let mut full = header.to_vec();
    match atyp {
        0x01 => full.resize(full.len() + 6, 0),
        0x04 => full.resize(full.len() + 18, 0),
        0x03 => {
            let mut len_byte = [0u8; 1];
            client.read_exact(&mut len_byte).await?;
            full.push(len_byte[0]);
            full.resize(full.len() + len_byte[0] as usize + 2, 0);
        }
        other => return Err(SocksError::InvalidAddressType(other)),
    }

    let header_len = if atyp == 0x03 { 5 } else { 4 };
    client.read_exact(&mut full[header_len..]).await?;

    ConnRequest::try_from(&full[..])
}
