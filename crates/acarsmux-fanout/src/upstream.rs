//! Seam between the fan-out engine and the real upstream service.

use std::future::Future;

use acarsmux_core::error::AcarsError;
use acarsmux_core::wire::HoppieRequest;

/// An upstream Hoppie-compatible mailbox reached with the shared credential.
///
/// Implementations must bound every call with a timeout; a call that never
/// resolves would hold the callsign's session guard.
pub trait Upstream: Send + Sync + 'static {
    /// Fetch, and thereby consume upstream, the pending records for
    /// `callsign`. Returns braced records in delivery order.
    fn poll(&self, callsign: &str) -> impl Future<Output = Result<Vec<String>, AcarsError>> + Send;

    /// Send a non-poll request with the logon rewritten to the shared
    /// credential. Returns the reply body verbatim.
    fn forward(
        &self,
        request: &HoppieRequest,
    ) -> impl Future<Output = Result<String, AcarsError>> + Send;
}
