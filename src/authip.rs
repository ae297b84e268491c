//! Authenticated-IP allowlist (§4.5), shared across worker tasks under a
//! reader/writer lock. Entries are never removed during process lifetime.

use std::net::IpAddr;
use std::sync::RwLock;

/// An append-only set of client IP addresses. Membership is compared by IP
/// bytes alone; the client's source port varies per connection and is
/// never part of the comparison.
#[derive(Default)]
pub struct AuthIpSet {
    entries: RwLock<Vec<IpAddr>>,
}

impl AuthIpSet {
    /// Builds a set pre-populated with `-w`'s static whitelist.
    pub fn with_entries(entries: Vec<IpAddr>) -> Self {
        Self { entries: RwLock::new(entries) }
    }

    /// Acquires the reader lock and checks membership.
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.entries.read().expect("auth ip set lock poisoned").contains(&addr)
    }

    /// Acquires the writer lock, re-checks membership under it, and
    /// appends `addr` iff absent. Returns whether it was newly inserted.
    /// The contains-then-insert check happens under a single write lock
    /// acquisition so a second authenticating connection from the same IP
    /// can never race its way into a duplicate entry.
    pub fn add(&self, addr: IpAddr) -> bool {
        let mut entries = self.entries.write().expect("auth ip set lock poisoned");
        if entries.contains(&addr) {
            return false;
        }
        entries.push(addr);
        true
    }
}
