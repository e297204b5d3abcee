//! Callsign session table: per-callsign message log plus one delivery
//! cursor per local logon.
//!
//! Sequence numbers are absolute: trimming the front of the log bumps
//! `compact_offset` instead of renumbering, so cursors stay valid.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use acarsmux_core::types::{FetchOutcome, Message};

// ─── Session log ─────────────────────────────────────────────────────

/// Mutable state of one callsign. Only ever touched under the session lock.
#[derive(Debug, Default)]
pub struct SessionLog {
    /// Buffered messages; `messages[i].seq == compact_offset + i + 1`.
    messages: Vec<Message>,
    /// Number of messages trimmed from the front.
    compact_offset: u64,
    /// Last-delivered sequence number per logon.
    cursors: HashMap<String, u64>,
    /// Time of the last upstream fetch attempt (successful or not).
    last_fetch: Option<DateTime<Utc>>,
    /// Log length when the most recent fetch started. Logons first seen
    /// while that fetch's result is being served register here.
    fetch_base: u64,
    last_outcome: Option<FetchOutcome>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sequence number ever appended (0 when nothing was fetched).
    pub fn len(&self) -> u64 {
        self.compact_offset + self.messages.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages still held in memory.
    pub fn buffered(&self) -> usize {
        self.messages.len()
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.last_fetch
    }

    pub fn last_outcome(&self) -> Option<&FetchOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn cursor(&self, logon: &str) -> Option<u64> {
        self.cursors.get(logon).copied()
    }

    pub fn logon_count(&self) -> usize {
        self.cursors.len()
    }

    // ── Fetching ─────────────────────────────────────────────────────

    /// Whether the coalescing window since the last fetch has elapsed.
    pub fn fetch_due(&self, now: DateTime<Utc>, window: TimeDelta) -> bool {
        match self.last_fetch {
            None => true,
            Some(last) => now - last >= window,
        }
    }

    /// Mark the start of an upstream fetch.
    pub fn begin_fetch(&mut self) {
        self.fetch_base = self.len();
    }

    /// Append one fetched batch and record the fetch. The batch is applied
    /// whole; a failed fetch goes through [`Self::record_failure`] instead.
    pub fn append_batch(&mut self, payloads: Vec<String>, now: DateTime<Utc>) -> usize {
        let count = payloads.len();
        let start = self.len();
        self.messages
            .extend(payloads.into_iter().enumerate().map(|(i, payload)| Message {
                seq: start + i as u64 + 1,
                payload,
                received_at: now,
            }));
        self.last_fetch = Some(now);
        self.last_outcome = Some(FetchOutcome::Delivered { count });
        count
    }

    /// Record a failed fetch without touching the log.
    pub fn record_failure(&mut self, outcome: FetchOutcome, now: DateTime<Utc>) {
        self.last_fetch = Some(now);
        self.last_outcome = Some(outcome);
    }

    // ── Delivery ─────────────────────────────────────────────────────

    /// Register `logon` if unseen. Returns `true` on first registration.
    ///
    /// New logons start at the base of the fetch currently being served:
    /// they see that fetch's messages, never older history.
    pub fn register(&mut self, logon: &str) -> bool {
        if self.cursors.contains_key(logon) {
            return false;
        }
        self.cursors.insert(logon.to_owned(), self.fetch_base);
        true
    }

    /// Hand out everything past the logon's cursor and advance the cursor
    /// to the end of the log. Unregistered logons receive nothing.
    pub fn take_unseen(&mut self, logon: &str) -> Vec<Message> {
        let len = self.len();
        let Some(cursor) = self.cursors.get_mut(logon) else {
            return Vec::new();
        };
        debug_assert!(*cursor >= self.compact_offset, "cursor points into trimmed range");
        debug_assert!(*cursor <= len, "cursor ahead of log");

        let local_start = cursor.saturating_sub(self.compact_offset) as usize;
        let unseen = self
            .messages
            .get(local_start..)
            .map(<[Message]>::to_vec)
            .unwrap_or_default();
        *cursor = len;
        unseen
    }

    // ── Retention ────────────────────────────────────────────────────

    /// Drop messages every known logon has consumed and that no future
    /// registration can still claim. Returns the number dropped.
    pub fn trim(&mut self) -> usize {
        let consumed = self.cursors.values().copied().min().unwrap_or(0);
        let watermark = consumed.min(self.fetch_base);
        let drain = watermark.saturating_sub(self.compact_offset) as usize;
        let drain = drain.min(self.messages.len());
        if drain > 0 {
            self.messages.drain(..drain);
            self.compact_offset += drain as u64;
        }
        drain
    }

    pub fn snapshot(&self, callsign: &str) -> SessionSnapshot {
        SessionSnapshot {
            callsign: callsign.to_owned(),
            buffered: self.messages.len(),
            next_seq: self.len() + 1,
            logons: self.cursors.len(),
            lagging_logons: self.cursors.values().filter(|&&c| c < self.len()).count(),
            last_fetch: self.last_fetch,
            last_outcome: self.last_outcome.clone(),
        }
    }
}

/// Read-only view for the status endpoint. Logon names are credentials and
/// are never included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub callsign: String,
    pub buffered: usize,
    pub next_seq: u64,
    pub logons: usize,
    /// Logons with messages waiting.
    pub lagging_logons: usize,
    pub last_fetch: Option<DateTime<Utc>>,
    pub last_outcome: Option<FetchOutcome>,
}

// ─── Callsign session ────────────────────────────────────────────────

/// One callsign: its log behind an async lock, plus a fetch generation
/// counter used for single-flight detection.
#[derive(Debug, Default)]
pub struct CallsignSession {
    generation: AtomicU64,
    log: Mutex<SessionLog>,
}

impl CallsignSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of upstream fetches completed so far. A poller that observes a
    /// different value after acquiring the lock shared someone else's fetch.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Publish completion of a fetch. Call while still holding the lock.
    pub fn complete_fetch(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub async fn lock(&self) -> MutexGuard<'_, SessionLog> {
        self.log.lock().await
    }
}

// ─── Session table ───────────────────────────────────────────────────

/// Process-wide callsign → session map.
///
/// The table lock only covers lookup and insertion; all per-callsign work
/// happens under that session's own lock, so callsigns never contend.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: Mutex<HashMap<String, Arc<CallsignSession>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, callsign: &str) -> Arc<CallsignSession> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(callsign) {
            return Arc::clone(session);
        }
        tracing::debug!(callsign = %callsign, "creating callsign session");
        let session = Arc::new(CallsignSession::new());
        sessions.insert(callsign.to_owned(), Arc::clone(&session));
        session
    }

    pub async fn get(&self, callsign: &str) -> Option<Arc<CallsignSession>> {
        self.sessions.lock().await.get(callsign).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Snapshot all sessions, sorted by callsign for deterministic output.
    pub async fn snapshot(&self) -> Vec<SessionSnapshot> {
        let sessions: Vec<(String, Arc<CallsignSession>)> = self
            .sessions
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();

        let mut result = Vec::with_capacity(sessions.len());
        for (callsign, session) in sessions {
            result.push(session.lock().await.snapshot(&callsign));
        }
        result.sort_by(|a, b| a.callsign.cmp(&b.callsign));
        result
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
