//! acarsmux-relay: the HTTP client side of the proxy.
//!
//! Talks to the real Hoppie-compatible upstream with the shared account
//! logon, so local logons never leave the process.

pub mod http;

pub use http::{DEFAULT_UPSTREAM, HttpUpstream, RelayBuildError};
