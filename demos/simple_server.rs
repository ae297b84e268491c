//! Minimal standalone example: a SOCKS5 proxy with no authentication,
//! listening on 127.0.0.1:1080. Run with `cargo run --bin demo-simple-server`
//! after pointing a `[[bin]]` entry at this file, or copy it into a
//! scratch crate.

use microsocks5::authip::AuthIpSet;
use microsocks5::handshake::{self, AuthPolicy};
use microsocks5::listener;
use microsocks5::relay::{self, Counters};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let server = listener::listen_on("127.0.0.1", 1080).await?;
    println!("SOCKS5 proxy listening on {}", server.addr);

    let authip = Arc::new(AuthIpSet::default());
    let counters = Arc::new(Counters::default());

    loop {
        let (stream, peer) = listener::accept_one(&server).await?;
        let authip = Arc::clone(&authip);
        let counters = Arc::clone(&counters);

        tokio::spawn(async move {
            let policy = AuthPolicy { username: None, password: None, auth_once: false, bind_ip: None };
            match handshake::run(stream, peer.ip(), &policy, &authip).await {
                Ok((client, target)) => {
                    if let Err(e) = relay::relay(client, target, &counters).await {
                        eprintln!("relay error with {peer}: {e}");
                    }
                }
                Err(e) => eprintln!("handshake error with {peer}: {e}"),
            }
        });
    }
}
