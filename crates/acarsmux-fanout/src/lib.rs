//! acarsmux-fanout: shares one upstream Hoppie mailbox between many local
//! logons.
//!
//! Every poll for a callsign funnels into a single in-flight upstream fetch;
//! fetched messages are buffered per callsign and each registered logon
//! consumes them through its own cursor, so every logon sees every message
//! exactly once.

pub mod engine;
pub mod passthrough;
pub mod send_dedup;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod upstream;

pub use acarsmux_core::types;
