//! Per-request failure taxonomy.
//!
//! Every variant is recoverable: the runtime renders it into the upstream
//! reply format instead of failing the HTTP exchange, because Hoppie clients
//! only ever inspect the response body.

use thiserror::Error;

use crate::wire;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcarsError {
    /// Local logon is not in the configured allow-list.
    #[error("invalid logon code")]
    UnauthorizedLogon,
    /// Network failure, timeout, non-200 status or an unparseable reply.
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),
    /// Upstream answered with its own `error {...}` reply (kept verbatim).
    #[error("{0}")]
    UpstreamError(String),
    /// Required request fields are missing.
    #[error("{0}")]
    MalformedRequest(String),
}

impl AcarsError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRequest(reason.into())
    }

    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::UpstreamUnreachable(reason.into())
    }

    /// Short machine-friendly label, used in logs and the status snapshot.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnauthorizedLogon => "unauthorized_logon",
            Self::UpstreamUnreachable(_) => "upstream_unreachable",
            Self::UpstreamError(_) => "upstream_error",
            Self::MalformedRequest(_) => "malformed_request",
        }
    }

    /// Render this error as a reply body a Hoppie client understands.
    ///
    /// Upstream protocol errors pass through untouched; everything else is
    /// wrapped as `error {reason}`.
    pub fn to_reply(&self) -> String {
        match self {
            Self::UpstreamError(text) => text.clone(),
            other => wire::error_reply(&other.to_string()),
        }
    }
}
