//! SOCKS5 client connection request (RFC 1928 §4).
//!
//! ```text
//! +----+-----+-------+------+----------+----------+
//! |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
//! +----+-----+-------+------+----------+----------+
//! | 1  |  1  | X'00' |  1   | Variable |    2     |
//! +----+-----+-------+------+----------+----------+
//! ```
//!
//! Only `CMD = CONNECT` is handled past parsing; BIND and UDP ASSOCIATE are
//! explicit non-goals and are rejected by the handshake state machine with
//! `COMMAND_NOT_SUPPORTED`, not by this parser.

use crate::error::SocksError;
use crate::parse::{AddrPort, Parse};
use std::fmt;

/// The command (`CMD`) of a SOCKS5 request (RFC 1928 §4).
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cmd {
    /// CONNECT (0x01): establish a TCP connection to the target host.
    Connect = 0x01,
    /// BIND (0x02): inbound connection relay. Non-goal; parsed but rejected.
    Bind = 0x02,
    /// UDP ASSOCIATE (0x03): UDP relay. Non-goal; parsed but rejected.
    UdpAssociate = 0x03,
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cmd::Connect => write!(f, "CONNECT"),
            Cmd::Bind => write!(f, "BIND"),
            Cmd::UdpAssociate => write!(f, "UDP_ASSOCIATE"),
        }
    }
}

/// A parsed SOCKS5 connection request (RFC 1928 §4).
#[derive(Debug)]
pub struct ConnRequest {
    /// Protocol version (`VER`), must be 0x05.
    pub ver: u8,
    /// Requested command.
    pub cmd: Cmd,
    /// Reserved byte (`RSV`); the handshake rejects non-zero values.
    pub rsv: u8,
    /// Destination address and port (`DST.ADDR`, `DST.PORT`).
    pub dst: AddrPort,
}

impl fmt::Display for ConnRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.cmd, self.dst)
    }
}

impl TryFrom<&[u8]> for ConnRequest {
    type Error = SocksError;

    fn try_from(buf: &[u8]) -> Result<Self, Self::Error> {
        if buf.len() < 4 {
            return Err(SocksError::ConnRequestMalformed);
        }

        let ver = buf[0];

        let cmd = match buf[1] {
            0x01 => Cmd::Connect,
            0x02 => Cmd::Bind,
            0x03 => Cmd::UdpAssociate,
            other => return Err(SocksError::UnsupportedCommand(other)),
        };

        let rsv = buf[2];
        let atyp = buf[3];

        let (dst, _) =
            Parse::parse_atyp(&buf[4..], atyp).ok_or(SocksError::InvalidAddressType(atyp))?;

        Ok(ConnRequest { ver, cmd, rsv, dst })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4_connect() {
        let buf = [0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0, 80];
        let req = ConnRequest::try_from(&buf[..]).unwrap();
        assert_eq!(req.cmd, Cmd::Connect);
        assert_eq!(req.dst.to_string(), "127.0.0.1:80");
    }

    #[test]
    fn parses_domain_connect() {
        let mut buf = vec![0x05, 0x01, 0x00, 0x03, 11];
        buf.extend_from_slice(b"example.com");
        buf.extend_from_slice(&443u16.to_be_bytes());
        let req = ConnRequest::try_from(&buf[..]).unwrap();
        assert_eq!(req.dst.to_string(), "example.com:443");
    }

    #[test]
    fn rejects_unknown_command() {
        let buf = [0x05, 0x09, 0x00, 0x01, 127, 0, 0, 1, 0, 80];
        assert!(matches!(
            ConnRequest::try_from(&buf[..]),
            Err(SocksError::UnsupportedCommand(0x09))
        ));
    }

    #[test]
    fn rejects_unknown_atyp() {
        let buf = [0x05, 0x01, 0x00, 0x02, 0, 0];
        assert!(matches!(
            ConnRequest::try_from(&buf[..]),
            Err(SocksError::InvalidAddressType(0x02))
        ));
    }
}
