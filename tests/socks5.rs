//! End-to-end tests driving the handshake and relay over real loopback
//! sockets, covering the Testable Properties: NO_AUTH/USERNAME gating,
//! auth-once idempotency, CONNECT success/failure shapes, domain
//! resolution, and idle timeout.

use microsocks5::authip::AuthIpSet;
use microsocks5::handshake::{self, AuthPolicy};
use microsocks5::relay::{self, Counters, IDLE_TIMEOUT};
use microsocks5::{config, worker};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn target_echo_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

fn connect_request_ipv4(addr: SocketAddr) -> Vec<u8> {
    let SocketAddr::V4(v4) = addr else { panic!("expected IPv4") };
    let mut buf = vec![0x05, 0x01, 0x00, 0x01];
    buf.extend_from_slice(&v4.ip().octets());
    buf.extend_from_slice(&v4.port().to_be_bytes());
    buf
}

fn connect_request_domain(host: &str, port: u16) -> Vec<u8> {
    let mut buf = vec![0x05, 0x01, 0x00, 0x03, host.len() as u8];
    buf.extend_from_slice(host.as_bytes());
    buf.extend_from_slice(&port.to_be_bytes());
    buf
}

/// Spawns the server side of the handshake over one accepted connection on
/// `proxy`, running it to completion and sending the outcome (and, on
/// success, the paired streams) back over `tx`.
fn spawn_server_side(
    proxy: TcpListener,
    policy: AuthPolicy<'static>,
    authip: Arc<AuthIpSet>,
) -> tokio::sync::oneshot::Receiver<Result<(TcpStream, TcpStream), String>> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (stream, peer) = proxy.accept().await.unwrap();
        let result = handshake::run(stream, peer.ip(), &policy, &authip)
            .await
            .map_err(|e| e.to_string());
        let _ = tx.send(result);
    });
    rx
}

#[tokio::test]
async fn scenario_a_no_auth_ipv4_connect() {
    let (target, target_addr) = target_echo_listener().await;
    tokio::spawn(async move {
        let _ = target.accept().await;
    });

    let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy.local_addr().unwrap();
    let policy = AuthPolicy { username: None, password: None, auth_once: false, bind_ip: None };
    let rx = spawn_server_side(proxy, policy, Arc::new(AuthIpSet::default()));

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut method_reply = [0u8; 2];
    client.read_exact(&mut method_reply).await.unwrap();
    assert_eq!(method_reply, [0x05, 0x00]);

    client.write_all(&connect_request_ipv4(target_addr)).await.unwrap();
    let mut conn_reply = [0u8; 10];
    client.read_exact(&mut conn_reply).await.unwrap();
    assert_eq!(conn_reply, [5, 0, 0, 1, 0, 0, 0, 0, 0, 0]);

    assert!(rx.await.unwrap().is_ok());
}

#[tokio::test]
async fn scenario_b_username_auth_success() {
    let (target, target_addr) = target_echo_listener().await;
    tokio::spawn(async move {
        let _ = target.accept().await;
    });

    let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy.local_addr().unwrap();
    let policy = AuthPolicy {
        username: Some("alice"),
        password: Some("s3cret"),
        auth_once: false,
        bind_ip: None,
    };
    let rx = spawn_server_side(proxy, policy, Arc::new(AuthIpSet::default()));

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(&[0x05, 0x02, 0x00, 0x02]).await.unwrap();
    let mut method_reply = [0u8; 2];
    client.read_exact(&mut method_reply).await.unwrap();
    assert_eq!(method_reply, [0x05, 0x02]);

    let mut auth_req = vec![0x01, 5];
    auth_req.extend_from_slice(b"alice");
    auth_req.push(6);
    auth_req.extend_from_slice(b"s3cret");
    client.write_all(&auth_req).await.unwrap();
    let mut auth_reply = [0u8; 2];
    client.read_exact(&mut auth_reply).await.unwrap();
    assert_eq!(auth_reply, [0x01, 0x00]);

    client.write_all(&connect_request_ipv4(target_addr)).await.unwrap();
    let mut conn_reply = [0u8; 10];
    client.read_exact(&mut conn_reply).await.unwrap();
    assert_eq!(conn_reply[..2], [5, 0]);

    assert!(rx.await.unwrap().is_ok());
}

#[tokio::test]
async fn scenario_c_auth_failure_closes_connection() {
    let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy.local_addr().unwrap();
    let policy = AuthPolicy {
        username: Some("alice"),
        password: Some("s3cret"),
        auth_once: false,
        bind_ip: None,
    };
    let rx = spawn_server_side(proxy, policy, Arc::new(AuthIpSet::default()));

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(&[0x05, 0x02, 0x00, 0x02]).await.unwrap();
    let mut method_reply = [0u8; 2];
    client.read_exact(&mut method_reply).await.unwrap();
    assert_eq!(method_reply, [0x05, 0x02]);

    let mut auth_req = vec![0x01, 5];
    auth_req.extend_from_slice(b"alice");
    auth_req.push(5);
    auth_req.extend_from_slice(b"wrong");
    client.write_all(&auth_req).await.unwrap();
    let mut auth_reply = [0u8; 2];
    client.read_exact(&mut auth_reply).await.unwrap();
    assert_eq!(auth_reply, [0x01, 0x02]);

    assert!(rx.await.unwrap().is_err());
}

#[tokio::test]
async fn scenario_d_domain_connect() {
    let (target, target_addr) = target_echo_listener().await;
    tokio::spawn(async move {
        let _ = target.accept().await;
    });

    let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy.local_addr().unwrap();
    let policy = AuthPolicy { username: None, password: None, auth_once: false, bind_ip: None };
    let rx = spawn_server_side(proxy, policy, Arc::new(AuthIpSet::default()));

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut method_reply = [0u8; 2];
    client.read_exact(&mut method_reply).await.unwrap();
    assert_eq!(method_reply, [0x05, 0x00]);

    client.write_all(&connect_request_domain("localhost", target_addr.port())).await.unwrap();
    let mut conn_reply = [0u8; 10];
    client.read_exact(&mut conn_reply).await.unwrap();
    assert_eq!(conn_reply[..2], [5, 0]);

    assert!(rx.await.unwrap().is_ok());
}

#[tokio::test]
async fn no_auth_gating_rejects_unlisted_peer_offering_only_no_auth() {
    let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy.local_addr().unwrap();
    let policy = AuthPolicy {
        username: Some("alice"),
        password: Some("s3cret"),
        auth_once: false,
        bind_ip: None,
    };
    let rx = spawn_server_side(proxy, policy, Arc::new(AuthIpSet::default()));

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut method_reply = [0u8; 2];
    client.read_exact(&mut method_reply).await.unwrap();
    assert_eq!(method_reply, [0x05, 0xFF]);

    assert!(rx.await.unwrap().is_err());
}

#[tokio::test]
async fn auth_once_allows_subsequent_no_auth_from_same_peer() {
    let (target, target_addr) = target_echo_listener().await;
    tokio::spawn(async move {
        loop {
            if target.accept().await.is_err() {
                break;
            }
        }
    });

    let authip = Arc::new(AuthIpSet::default());

    // First connection: authenticates with username/password, auth-once on.
    {
        let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = proxy.local_addr().unwrap();
        let policy = AuthPolicy {
            username: Some("alice"),
            password: Some("s3cret"),
            auth_once: true,
            bind_ip: None,
        };
        let rx = spawn_server_side(proxy, policy, Arc::clone(&authip));

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        client.write_all(&[0x05, 0x02, 0x00, 0x02]).await.unwrap();
        let mut method_reply = [0u8; 2];
        client.read_exact(&mut method_reply).await.unwrap();
        assert_eq!(method_reply, [0x05, 0x02]);

        let mut auth_req = vec![0x01, 5];
        auth_req.extend_from_slice(b"alice");
        auth_req.push(6);
        auth_req.extend_from_slice(b"s3cret");
        client.write_all(&auth_req).await.unwrap();
        let mut auth_reply = [0u8; 2];
        client.read_exact(&mut auth_reply).await.unwrap();
        assert_eq!(auth_reply, [0x01, 0x00]);

        client.write_all(&connect_request_ipv4(target_addr)).await.unwrap();
        let mut conn_reply = [0u8; 10];
        client.read_exact(&mut conn_reply).await.unwrap();
        assert_eq!(conn_reply[..2], [5, 0]);
        assert!(rx.await.unwrap().is_ok());
    }

    // Second connection from the same peer IP: offers only NO_AUTH, which
    // now succeeds because auth-once registered it in the allowlist.
    {
        let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = proxy.local_addr().unwrap();
        let policy = AuthPolicy {
            username: Some("alice"),
            password: Some("s3cret"),
            auth_once: true,
            bind_ip: None,
        };
        let rx = spawn_server_side(proxy, policy, Arc::clone(&authip));

        let mut client = TcpStream::connect(proxy_addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut method_reply = [0u8; 2];
        client.read_exact(&mut method_reply).await.unwrap();
        assert_eq!(method_reply, [0x05, 0x00]);

        client.write_all(&connect_request_ipv4(target_addr)).await.unwrap();
        let mut conn_reply = [0u8; 10];
        client.read_exact(&mut conn_reply).await.unwrap();
        assert_eq!(conn_reply[..2], [5, 0]);
        assert!(rx.await.unwrap().is_ok());
    }
}

#[tokio::test]
async fn command_not_supported_is_rejected() {
    let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy.local_addr().unwrap();
    let policy = AuthPolicy { username: None, password: None, auth_once: false, bind_ip: None };
    let rx = spawn_server_side(proxy, policy, Arc::new(AuthIpSet::default()));

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut method_reply = [0u8; 2];
    client.read_exact(&mut method_reply).await.unwrap();
    assert_eq!(method_reply, [0x05, 0x00]);

    // BIND (0x02) instead of CONNECT.
    let req = [0x05, 0x02, 0x00, 0x01, 127, 0, 0, 1, 0, 80];
    client.write_all(&req).await.unwrap();
    let mut conn_reply = [0u8; 10];
    client.read_exact(&mut conn_reply).await.unwrap();
    assert_eq!(conn_reply, [5, 7, 0, 1, 0, 0, 0, 0, 0, 0]);

    assert!(rx.await.unwrap().is_err());
}

async fn connected_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (connect_res, accept_res) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (connect_res.unwrap(), accept_res.unwrap().0)
}

#[tokio::test(start_paused = true)]
async fn scenario_f_idle_timeout_closes_both_sides() {
    let (_client_keepalive, a) = connected_pair().await;
    let (_target_keepalive, b) = connected_pair().await;

    let counters = Counters::default();
    let relay_fut = relay::relay(a, b, &counters);
    tokio::pin!(relay_fut);

    tokio::time::advance(IDLE_TIMEOUT + std::time::Duration::from_secs(5)).await;
    let result = relay_fut.await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn invalid_address_type_gets_general_failure_shape_before_close() {
    let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy.local_addr().unwrap();
    let policy = AuthPolicy { username: None, password: None, auth_once: false, bind_ip: None };
    let rx = spawn_server_side(proxy, policy, Arc::new(AuthIpSet::default()));

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut method_reply = [0u8; 2];
    client.read_exact(&mut method_reply).await.unwrap();
    assert_eq!(method_reply, [0x05, 0x00]);

    // ATYP byte 0x7f is not one of IPv4/domain/IPv6.
    let req = [0x05, 0x01, 0x00, 0x7f, 0, 0, 0, 0, 0, 0];
    client.write_all(&req).await.unwrap();
    let mut conn_reply = [0u8; 10];
    client.read_exact(&mut conn_reply).await.unwrap();
    assert_eq!(conn_reply, [5, 8, 0, 1, 0, 0, 0, 0, 0, 0]);

    assert!(rx.await.unwrap().is_err());
}

#[tokio::test]
async fn unsupported_version_gets_no_acceptable_method_reply_before_close() {
    let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy.local_addr().unwrap();
    let policy = AuthPolicy { username: None, password: None, auth_once: false, bind_ip: None };
    let rx = spawn_server_side(proxy, policy, Arc::new(AuthIpSet::default()));

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    // VER = 0x04 instead of 0x05.
    client.write_all(&[0x04, 0x01, 0x00]).await.unwrap();
    let mut method_reply = [0u8; 2];
    client.read_exact(&mut method_reply).await.unwrap();
    assert_eq!(method_reply, [0x05, 0xFF]);

    assert!(rx.await.unwrap().is_err());
}

#[tokio::test]
async fn domain_resolution_failure_gets_general_failure_not_host_unreachable() {
    let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy.local_addr().unwrap();
    let policy = AuthPolicy { username: None, password: None, auth_once: false, bind_ip: None };
    let rx = spawn_server_side(proxy, policy, Arc::new(AuthIpSet::default()));

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut method_reply = [0u8; 2];
    client.read_exact(&mut method_reply).await.unwrap();
    assert_eq!(method_reply, [0x05, 0x00]);

    // A name that will not resolve anywhere.
    client
        .write_all(&connect_request_domain("this-host-does-not-resolve.invalid", 80))
        .await
        .unwrap();
    let mut conn_reply = [0u8; 10];
    client.read_exact(&mut conn_reply).await.unwrap();
    assert_eq!(conn_reply[..2], [5, 1]);

    assert!(rx.await.unwrap().is_err());
}

#[tokio::test]
async fn scenario_e_bridge_mode_relays_raw_bytes_with_no_socks_framing() {
    let primary_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let primary_addr = primary_listener.local_addr().unwrap();
    let bridge_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let bridge_addr = bridge_listener.local_addr().unwrap();

    let counters = Counters::default();
    let relay_task = tokio::spawn(async move {
        let (primary, _) = primary_listener.accept().await.unwrap();
        let (bridge, _) = bridge_listener.accept().await.unwrap();
        relay::relay(primary, bridge, &counters).await.unwrap();
        counters
    });

    let mut primary_side = TcpStream::connect(primary_addr).await.unwrap();
    let mut bridge_side = TcpStream::connect(bridge_addr).await.unwrap();

    primary_side.write_all(b"no socks framing here").await.unwrap();
    let mut buf = vec![0u8; b"no socks framing here".len()];
    bridge_side.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"no socks framing here");

    bridge_side.write_all(b"reply").await.unwrap();
    let mut reply = [0u8; 5];
    primary_side.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"reply");

    primary_side.shutdown().await.unwrap();
    bridge_side.shutdown().await.unwrap();

    let counters = relay_task.await.unwrap();
    // bytes_in counts target->client (the "reply"), bytes_out counts
    // client->target (the framing-free payload).
    assert_eq!(counters.take(), (5, 21));
}

/// Finds a currently-free loopback port by binding to port 0 and releasing
/// it immediately. Used only to hand `run_reverse` a concrete bridge port
/// up front, since `Config` takes one rather than reporting back whatever
/// the OS assigned.
async fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap().port()
}

/// Builds a `Config` for the combined reverse+bridge (`-c`+`-C`) path:
/// dials `connect_to` and bridges with accepts on `bridge_port`.
fn reverse_bridge_config(connect_to: SocketAddr, bridge_port: u16) -> config::Config {
    let cli = config::Cli {
        listen_ip: "127.0.0.1".into(),
        port: connect_to.port(),
        username: None,
        password: None,
        bind_ip: None,
        whitelist: None,
        auth_once: false,
        quiet: true,
        connect_ip: Some(connect_to.ip().to_string()),
        bridge_port: Some(bridge_port),
        verbose: 0,
    };
    config::Config::from_cli(cli).unwrap()
}

#[tokio::test]
async fn combined_reverse_and_bridge_mode_dials_and_pairs_with_no_handshake() {
    // The "control endpoint" reverse mode dials into.
    let dial_target = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dial_target_addr = dial_target.local_addr().unwrap();
    let bridge_port = free_port().await;

    let config = reverse_bridge_config(dial_target_addr, bridge_port);
    let shared = Arc::new(worker::Shared::new(config));
    let host = shared.config.connect_host.clone().unwrap();

    tokio::spawn(async move {
        let _ = worker::run_reverse(shared, host).await;
    });

    // Reverse mode dials `dial_target`; accept that connection here,
    // playing the role of the control endpoint it would normally run the
    // rest of this proxy's logic over.
    let (mut dialed_side, _) = dial_target.accept().await.unwrap();

    // run_reverse binds its bridge listener before its first dial attempt,
    // but the exact moment it starts accepting is not otherwise observable
    // from here, so retry the connect briefly.
    let mut bridge_side = loop {
        match TcpStream::connect(("127.0.0.1", bridge_port)).await {
            Ok(s) => break s,
            Err(_) => tokio::time::sleep(std::time::Duration::from_millis(5)).await,
        }
    };

    // No SOCKS framing on either side: raw bytes dialed-side -> bridge-side.
    dialed_side.write_all(b"raw bytes, no socks framing").await.unwrap();
    let mut buf = vec![0u8; b"raw bytes, no socks framing".len()];
    bridge_side.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"raw bytes, no socks framing");

    // And bridge-side -> dialed-side.
    bridge_side.write_all(b"ack").await.unwrap();
    let mut ack = [0u8; 3];
    dialed_side.read_exact(&mut ack).await.unwrap();
    assert_eq!(&ack, b"ack");
}
