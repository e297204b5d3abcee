//! acarsmux-core: shared vocabulary for the ACARS multiplexer.
//!
//! Holds the Hoppie wire codec, the error taxonomy every request is rendered
//! through, the logon allow-list gate, and the message types buffered by the
//! fan-out engine.

pub mod error;
pub mod logon_gate;
pub mod types;
pub mod wire;
