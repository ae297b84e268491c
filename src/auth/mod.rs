//! RFC 1929 username/password sub-negotiation wire types.

pub mod reply;
pub mod request;
