//! Fan-out engine: serves mailbox polls for many local logons from one
//! upstream mailbox.
//!
//! # Poll algorithm
//!
//! 1. Authorize the logon (no session is created for rejected logons).
//! 2. Look up or create the callsign session.
//! 3. Read the session's fetch generation, then take the session lock.
//!    If the generation moved while waiting, another poller's fetch
//!    completed in the meantime and its result is reused.
//! 4. Otherwise fetch upstream when the coalescing window has elapsed,
//!    appending the batch whole or recording the failure.
//! 5. Register the logon at the base of the serving fetch if it is new.
//! 6. Deliver everything past the logon's cursor and advance the cursor,
//!    all before the lock is released.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use acarsmux_core::error::AcarsError;
use acarsmux_core::logon_gate::LogonGate;
use acarsmux_core::types::{FetchOutcome, Message};
use acarsmux_core::wire;

use crate::session::{SessionSnapshot, SessionTable};
use crate::upstream::Upstream;

/// Default upper bound on a single upstream fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum time between upstream fetches for one callsign. Zero means
    /// every poll fetches unless a fetch is already in flight.
    pub coalesce_window: TimeDelta,
    /// Hard bound on a fetch, on top of whatever the upstream enforces.
    pub fetch_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            coalesce_window: TimeDelta::zero(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

// ─── Poll result ─────────────────────────────────────────────────────

/// Messages handed to one logon by one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollDelivery {
    pub messages: Vec<Message>,
    /// Set when the fetch serving this poll failed. Buffered messages are
    /// still delivered; the failure only shows when there is nothing else.
    pub degraded: Option<AcarsError>,
}

impl PollDelivery {
    pub fn payloads(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.payload.as_str()).collect()
    }

    /// Render in upstream wire format.
    pub fn to_reply(&self) -> String {
        match (&self.degraded, self.messages.is_empty()) {
            (Some(err), true) => err.to_reply(),
            _ => wire::render_poll_reply(&self.payloads()),
        }
    }
}

// ─── Engine ──────────────────────────────────────────────────────────

pub struct FanoutEngine<U> {
    gate: Arc<LogonGate>,
    upstream: Arc<U>,
    sessions: SessionTable,
    config: EngineConfig,
}

impl<U: Upstream> FanoutEngine<U> {
    pub fn new(gate: Arc<LogonGate>, upstream: Arc<U>, config: EngineConfig) -> Self {
        Self {
            gate,
            upstream,
            sessions: SessionTable::new(),
            config,
        }
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub async fn snapshot(&self) -> Vec<SessionSnapshot> {
        self.sessions.snapshot().await
    }

    /// Poll the mailbox of `callsign` on behalf of `logon`.
    ///
    /// Only an unauthorized logon fails; upstream trouble degrades the
    /// delivery instead.
    pub async fn poll(&self, callsign: &str, logon: &str) -> Result<PollDelivery, AcarsError> {
        self.poll_at(callsign, logon, Utc::now()).await
    }

    /// [`Self::poll`] with an explicit clock, for deterministic tests.
    pub async fn poll_at(
        &self,
        callsign: &str,
        logon: &str,
        now: DateTime<Utc>,
    ) -> Result<PollDelivery, AcarsError> {
        self.gate.authorize(logon)?;

        let session = self.sessions.get_or_create(callsign).await;
        let seen_generation = session.generation();
        let mut log = session.lock().await;

        if session.generation() != seen_generation {
            tracing::debug!(callsign = %callsign, "reusing concurrent upstream fetch");
        } else if log.fetch_due(now, self.config.coalesce_window) {
            log.begin_fetch();
            match self.fetch(callsign).await {
                Ok(batch) => {
                    let count = log.append_batch(batch, now);
                    if count > 0 {
                        tracing::info!(callsign = %callsign, count, "buffered upstream messages");
                    }
                }
                Err(err) => {
                    tracing::warn!(callsign = %callsign, kind = err.kind(), error = %err, "upstream poll failed");
                    log.record_failure(FetchOutcome::from_error(&err), now);
                }
            }
            session.complete_fetch();
        }

        if log.register(logon) {
            tracing::info!(callsign = %callsign, logons = log.logon_count(), "registered new logon");
        }
        let messages = log.take_unseen(logon);
        let degraded = log.last_outcome().and_then(FetchOutcome::as_error);
        let trimmed = log.trim();
        if trimmed > 0 {
            tracing::debug!(callsign = %callsign, trimmed, "trimmed consumed messages");
        }
        drop(log);

        Ok(PollDelivery { messages, degraded })
    }

    async fn fetch(&self, callsign: &str) -> Result<Vec<String>, AcarsError> {
        match tokio::time::timeout(self.config.fetch_timeout, self.upstream.poll(callsign)).await {
            Ok(result) => result,
            Err(_) => Err(AcarsError::unreachable(format!(
                "poll timed out after {}ms",
                self.config.fetch_timeout.as_millis()
            ))),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
