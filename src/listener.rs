//! Listening-socket setup (§4.3): resolve, bind with address reuse, tune,
//! listen with the OS maximum backlog.

use crate::addr::resolve;
use crate::error::ServerError;
use crate::socket;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::debug;

/// A bound, listening socket plus the address it was asked to listen on.
pub struct Server {
    pub listener: TcpListener,
    pub addr: std::net::SocketAddr,
}

/// Resolves `host:port`, binds a listening socket with `SO_REUSEADDR`,
/// applies the fixed tuning profile, and starts listening.
pub async fn listen_on(host: &str, port: u16) -> Result<Server, ServerError> {
    let candidates = resolve(host, port).await.map_err(|source| ServerError::Resolve {
        host: host.to_owned(),
        port,
        source,
    })?;
    let addr = *candidates
        .first()
        .ok_or_else(|| ServerError::NoAddresses(host.to_owned(), port))?;

    let socket = if addr.is_ipv6() {
        TcpSocket::new_v6()
    } else {
        TcpSocket::new_v4()
    }
    .map_err(|source| ServerError::Bind { addr, source })?;

    socket.set_reuseaddr(true).map_err(|source| ServerError::Bind { addr, source })?;
    socket.bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
    socket::tune(&socket);

    let listener = socket.listen(1024).map_err(ServerError::Listen)?;
    debug!(%addr, "listening");
    Ok(Server { listener, addr })
}

/// Accepts one client connection. On failure the caller applies the
/// accept-failure back-off (§4.8).
pub async fn accept_one(server: &Server) -> std::io::Result<(TcpStream, std::net::SocketAddr)> {
    let (stream, peer) = server.listener.accept().await?;
    socket::tune(&stream);
    Ok((stream, peer))
}
