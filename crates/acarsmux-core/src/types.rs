use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AcarsError;

// ─── Message ─────────────────────────────────────────────────────────

/// One upstream-delivered record, buffered for fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// 1-based position in the callsign's log; never reused.
    pub seq: u64,
    /// Braced upstream record, e.g. `{KLM12 telex {HELLO}}`.
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

// ─── Fetch outcome ───────────────────────────────────────────────────

/// Result of the most recent upstream poll for a callsign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    Delivered { count: usize },
    Unreachable { reason: String },
    Rejected { reply: String },
}

impl FetchOutcome {
    pub fn from_error(err: &AcarsError) -> Self {
        match err {
            AcarsError::UpstreamError(reply) => Self::Rejected {
                reply: reply.clone(),
            },
            AcarsError::UpstreamUnreachable(reason) => Self::Unreachable {
                reason: reason.clone(),
            },
            other => Self::Unreachable {
                reason: other.to_string(),
            },
        }
    }

    /// The failure to surface when a poll has nothing else to deliver.
    pub fn as_error(&self) -> Option<AcarsError> {
        match self {
            Self::Delivered { .. } => None,
            Self::Unreachable { reason } => Some(AcarsError::UpstreamUnreachable(reason.clone())),
            Self::Rejected { reply } => Some(AcarsError::UpstreamError(reply.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_round_trips_through_errors() {
        let err = AcarsError::unreachable("timed out");
        let outcome = FetchOutcome::from_error(&err);
        assert_eq!(
            outcome,
            FetchOutcome::Unreachable {
                reason: "timed out".into()
            }
        );
        assert_eq!(outcome.as_error(), Some(err));

        let rejected = FetchOutcome::from_error(&AcarsError::UpstreamError("error {x}".into()));
        assert_eq!(
            rejected.as_error(),
            Some(AcarsError::UpstreamError("error {x}".into()))
        );
        assert!(FetchOutcome::Delivered { count: 2 }.as_error().is_none());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(FetchOutcome::Delivered { count: 3 }).expect("serialize");
        assert_eq!(json["status"], "delivered");
        assert_eq!(json["count"], 3);
    }
}
