//! A small SOCKS5 proxy server (RFC 1928, RFC 1929 username/password
//! sub-negotiation) with optional reverse-dial and bridge relay modes.
//!
//! Only the `CONNECT` command is supported; `BIND` and `UDP ASSOCIATE` are
//! explicit non-goals and are rejected with `COMMAND_NOT_SUPPORTED`. One
//! `tokio::task` is spawned per connection in place of the one-thread-per-
//! client model this server's design is otherwise drawn from; see
//! [`worker`] for the dispatch loops and [`relay`] for the data-path.

pub mod addr;
pub mod auth;
pub mod authip;
pub mod config;
pub mod conn;
pub mod dialer;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod msg;
pub mod parse;
pub mod relay;
pub mod socket;
pub mod stats;
pub mod worker;
