//! Request validation and routing: polls go through the fan-out engine,
//! everything else through the passthrough.

use std::sync::Arc;

use acarsmux_core::error::AcarsError;
use acarsmux_core::wire::{HoppieRequest, PacketType};
use acarsmux_fanout::upstream::Upstream;

use crate::server::AppState;

/// Handle one `connect.html` request and produce the reply body.
///
/// Never fails: every error is rendered in upstream wire format.
pub async fn handle<U: Upstream>(state: &AppState<U>, request: HoppieRequest) -> String {
    let request = request.normalized();
    tracing::debug!(
        from = ?request.from,
        to = ?request.to,
        packet_type = ?request.packet_type,
        "request received"
    );

    match route(state, &request).await {
        Ok(reply) => reply,
        Err(err) => {
            match &err {
                AcarsError::UnauthorizedLogon => {
                    tracing::warn!(from = ?request.from, "rejected request with unknown logon");
                }
                AcarsError::MalformedRequest(reason) => {
                    tracing::debug!(reason = %reason, "malformed request");
                }
                other => {
                    tracing::warn!(kind = other.kind(), error = %other, "request failed upstream");
                }
            }
            err.to_reply()
        }
    }
}

async fn route<U: Upstream>(
    state: &AppState<U>,
    request: &HoppieRequest,
) -> Result<String, AcarsError> {
    if request.is_empty() {
        return Err(AcarsError::malformed("no parameters given"));
    }
    let Some(logon) = request.logon.as_deref() else {
        return Err(AcarsError::malformed("no logon given"));
    };
    state.gate.authorize(logon)?;
    let Some(kind) = request.kind() else {
        return Err(AcarsError::malformed("no packet type given"));
    };

    match kind {
        PacketType::Poll => {
            let Some(callsign) = request.from.as_deref() else {
                return Err(AcarsError::malformed("from callsign required for polling"));
            };
            poll(state, callsign, logon).await
        }
        PacketType::Telex | PacketType::Cpdlc => {
            if request.from.is_none() || request.to.is_none() || request.packet.is_none() {
                return Err(AcarsError::malformed(
                    "from/to callsigns and packet payload required for sending cpdlc/telex",
                ));
            }
            relay(state, request).await
        }
        PacketType::Other(_) => relay(state, request).await,
    }
}

async fn poll<U: Upstream>(
    state: &AppState<U>,
    callsign: &str,
    logon: &str,
) -> Result<String, AcarsError> {
    let engine = Arc::clone(&state.engine);
    let (callsign, logon) = (callsign.to_owned(), logon.to_owned());
    // Detached from the connection: a client hanging up mid-fetch must not
    // drop a batch upstream has already handed out.
    let delivery = tokio::spawn(async move { engine.poll(&callsign, &logon).await })
        .await
        .map_err(|e| AcarsError::unreachable(format!("poll task failed: {e}")))??;
    Ok(delivery.to_reply())
}

async fn relay<U: Upstream>(
    state: &AppState<U>,
    request: &HoppieRequest,
) -> Result<String, AcarsError> {
    let passthrough = Arc::clone(&state.passthrough);
    let request = request.clone();
    // Detached for the same reason as polls: once upstream accepted a send,
    // its reply must reach the dedup cache even if the client is gone.
    tokio::spawn(async move { passthrough.relay(&request).await })
        .await
        .map_err(|e| AcarsError::unreachable(format!("send task failed: {e}")))?
}
