//! Fixed socket tuning profile applied to every listening and data socket.
//!
//! Mirrors microsocks's `set_socket_options`: large send/receive buffers,
//! TCP keepalive, and `TCP_NODELAY`. `socket2` is used because tokio's own
//! `TcpStream`/`TcpSocket` types don't expose keepalive-interval/retry
//! knobs directly.

use socket2::{SockRef, TcpKeepalive};
use std::time::Duration;
use tracing::warn;

const BUF_SIZE: usize = 4 * 1024 * 1024;
const KEEPALIVE_IDLE: Duration = Duration::from_secs(60);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);
const KEEPALIVE_RETRIES: u32 = 3;

/// Applies the fixed tuning profile to any socket-like value `socket2` can
/// borrow a reference to (listening socket or accepted/dialed data
/// socket). Buffer-size failures are logged and ignored, matching
/// microsocks's `perror`-and-continue behavior; they are not fatal because
/// the kernel default is still a usable (if smaller) buffer.
pub fn tune<S: std::os::fd::AsRawFd>(socket: &S) {
    let sock = SockRef::from(socket);

    if let Err(e) = sock.set_send_buffer_size(BUF_SIZE) {
        warn!(error = %e, "setsockopt SO_SNDBUF failed");
    }
    if let Err(e) = sock.set_recv_buffer_size(BUF_SIZE) {
        warn!(error = %e, "setsockopt SO_RCVBUF failed");
    }

    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_IDLE)
        .with_interval(KEEPALIVE_INTERVAL)
        .with_retries(KEEPALIVE_RETRIES);
    if let Err(e) = sock.set_tcp_keepalive(&keepalive) {
        warn!(error = %e, "setsockopt SO_KEEPALIVE failed");
    }

    if let Err(e) = sock.set_nodelay(true) {
        warn!(error = %e, "setsockopt TCP_NODELAY failed");
    }
}
