//! Error types used across the SOCKS5 implementation.
//!
//! Errors are grouped by phase:
//! - [`SocksError`] covers wire-level parsing and protocol violations
//!   encountered while driving a single connection through the state
//!   machine (RFC 1928 §3-6, RFC 1929 §2).
//! - [`ServerError`] covers startup/runtime failures: resolving a listen
//!   or dial address, binding, listening, and invalid CLI configuration.

use thiserror::Error;

/// Errors that can occur while driving a single client through the SOCKS5
/// state machine.
#[derive(Debug, Error)]
pub enum SocksError {
    /// The client requested an unsupported SOCKS protocol version.
    #[error("unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// The client's version message was too short to contain mandatory fields.
    #[error("version message too short")]
    VersionMessageTooShort,

    /// The client's version message was truncated and missing method bytes.
    #[error("incomplete version message")]
    IncompleteVersionMessage,

    /// No method offered by the client was acceptable given the current
    /// configuration (credentials, allowlist).
    #[error("no acceptable authentication method")]
    NoAcceptableMethod,

    /// The client used an unsupported authentication sub-negotiation version.
    #[error("authentication version not supported: {0}")]
    UnsupportedAuthVersion(u8),

    /// The authentication message from the client was too short or truncated.
    #[error("authentication message malformed")]
    AuthMessageMalformed,

    /// Username/password did not match the configured credentials.
    #[error("invalid credentials")]
    AuthRejected,

    /// The client specified an invalid or unsupported address type.
    #[error("invalid address type: {0}")]
    InvalidAddressType(u8),

    /// The connection request from the client was too short or malformed.
    #[error("connection request malformed")]
    ConnRequestMalformed,

    /// The client requested a command other than CONNECT (BIND, UDP
    /// ASSOCIATE are explicit non-goals).
    #[error("unsupported command: {0}")]
    UnsupportedCommand(u8),

    /// `RSV` was not zero.
    #[error("reserved byte was not zero")]
    ReservedByteNonZero,

    /// Resolving or connecting to the requested target failed; carries the
    /// SOCKS reply code already mapped from the underlying I/O error.
    #[error("upstream connect failed: {0:?}")]
    UpstreamUnreachable(crate::conn::reply::Rep),

    /// A general I/O error occurred on the client socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while setting up listeners, dialers, or parsing
/// the process configuration.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Resolving the configured host failed.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Binding the listening socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Calling `listen` on the bound socket failed.
    #[error("failed to listen: {0}")]
    Listen(#[source] std::io::Error),

    /// No candidate address was returned by resolution.
    #[error("no addresses found for {0}:{1}")]
    NoAddresses(String, u16),

    /// The CLI configuration is internally inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
