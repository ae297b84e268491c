//! RFC 1929 §2 username/password authentication request.
//!
//! ```text
//! +----+------+----------+------+----------+
//! |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
//! +----+------+----------+------+----------+
//! |  1 |  1   | 1-255    |  1   | 1-255    |
//! +----+------+----------+------+----------+
//! ```

use crate::error::SocksError;

/// A parsed username/password authentication request (RFC 1929 §2).
pub struct AuthRequest {
    /// Subnegotiation version (`VER`), always `0x01`.
    pub ver: u8,
    pub uname: String,
    pub passwd: String,
}

impl TryFrom<&[u8]> for AuthRequest {
    type Error = SocksError;

    /// Parses an `AuthRequest` from raw bytes. Username/password bytes are
    /// compared against configured credentials as plain strings, so
    /// malformed UTF-8 is lossily decoded here rather than treated as a
    /// distinct protocol error — it will simply fail credential comparison.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < 2 {
            return Err(SocksError::AuthMessageMalformed);
        }

        let ver = bytes[0];
        if ver != 0x01 {
            return Err(SocksError::UnsupportedAuthVersion(ver));
        }

        let ulen = bytes[1] as usize;
        if bytes.len() < 2 + ulen + 1 {
            return Err(SocksError::AuthMessageMalformed);
        }
        let uname = String::from_utf8_lossy(&bytes[2..2 + ulen]).into_owned();

        let plen_index = 2 + ulen;
        let plen = bytes[plen_index] as usize;
        if bytes.len() < plen_index + 1 + plen {
            return Err(SocksError::AuthMessageMalformed);
        }
        let passwd =
            String::from_utf8_lossy(&bytes[plen_index + 1..plen_index + 1 + plen]).into_owned();

        Ok(Self { ver, uname, passwd })
    }
}
