//! SOCKS5 handshake messages (RFC 1928 §3).
//!
//! - [`VersionMessage`] → sent by the client to advertise supported
//!   authentication methods.
//! - [`MethodSelection`] → sent by the server to choose one method.

use super::method::*;
use crate::error::SocksError;

/// Client's version/methods message.
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    /// The SOCKS protocol version (must be `0x05`).
    pub ver: u8,
    /// The list of authentication methods supported by the client.
    pub methods: Vec<Method>,
}

impl TryFrom<&[u8]> for VersionMessage {
    type Error = SocksError;

    /// Parses a [`VersionMessage`] from raw bytes.
    ///
    /// Returns an error if the buffer is shorter than 2 bytes, the version
    /// is not `0x05`, or the buffer is truncated before `NMETHODS` bytes of
    /// methods.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < 2 {
            return Err(SocksError::VersionMessageTooShort);
        }

        let ver = bytes[0];
        if ver != 0x05 {
            return Err(SocksError::UnsupportedVersion(ver));
        }

        let nmethods = bytes[1] as usize;
        if bytes.len() < 2 + nmethods {
            return Err(SocksError::IncompleteVersionMessage);
        }

        let methods = bytes[2..2 + nmethods].iter().copied().map(Method::from_u8).collect();

        Ok(Self { ver, methods })
    }
}

/// Server's method selection message.
///
/// ```text
/// +----+--------+
/// |VER | METHOD |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSelection {
    /// The SOCKS protocol version (must be `0x05`).
    pub ver: u8,
    /// The authentication method selected by the server.
    pub method: Method,
}

impl MethodSelection {
    /// Creates a new [`MethodSelection`] with the given method.
    pub fn new(method: Method) -> Self {
        Self { ver: 0x05, method }
    }

    /// Serializes this [`MethodSelection`] into a 2-byte array.
    pub fn to_bytes(&self) -> [u8; 2] {
        [self.ver, self.method.to_u8()]
    }
}
