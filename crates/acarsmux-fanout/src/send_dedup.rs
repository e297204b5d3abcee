//! Duplicate suppression for outgoing `telex`/`cpdlc` sends.
//!
//! Synchronized clients flying the same aircraft each emit the same
//! outgoing packet. Only the first is forwarded; the rest get the cached
//! upstream reply.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use acarsmux_core::wire::HoppieRequest;

pub const DEFAULT_CAPACITY: usize = 20;
pub const DEFAULT_WINDOW_SECS: i64 = 60;

/// Identity of an outgoing send, independent of which logon sent it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SendKey {
    pub from: String,
    pub to: String,
    pub packet_type: String,
    pub packet: String,
}

impl SendKey {
    /// Key for a request; `None` when any identifying field is missing.
    pub fn from_request(request: &HoppieRequest) -> Option<Self> {
        Some(Self {
            from: request.from.clone()?,
            to: request.to.clone()?,
            packet_type: request.packet_type.clone()?,
            packet: request.packet.clone()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub key: SendKey,
    pub logon: String,
    pub reply: String,
    pub sent_at: DateTime<Utc>,
}

/// What a lookup found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupHit<'a> {
    /// Same logon sent the same packet again.
    SameLogon(&'a SentPacket),
    /// A different (synchronized) logon sent the same packet.
    OtherLogon(&'a SentPacket),
}

impl DedupHit<'_> {
    pub fn reply(&self) -> &str {
        match self {
            Self::SameLogon(sent) | Self::OtherLogon(sent) => &sent.reply,
        }
    }
}

#[derive(Debug)]
pub struct SendDedup {
    capacity: usize,
    window: TimeDelta,
    recent: VecDeque<SentPacket>,
}

impl SendDedup {
    pub fn new(capacity: usize, window: TimeDelta) -> Self {
        Self {
            capacity: capacity.max(1),
            window,
            recent: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Find a remembered send of `key` younger than the window.
    pub fn lookup(&mut self, key: &SendKey, logon: &str, now: DateTime<Utc>) -> Option<DedupHit<'_>> {
        self.expire(now);
        self.recent.iter().find(|s| &s.key == key).map(|sent| {
            if sent.logon == logon {
                DedupHit::SameLogon(sent)
            } else {
                DedupHit::OtherLogon(sent)
            }
        })
    }

    /// Remember a successful forward, evicting the oldest beyond capacity.
    pub fn remember(&mut self, key: SendKey, logon: &str, reply: &str, now: DateTime<Utc>) {
        self.recent.push_back(SentPacket {
            key,
            logon: logon.to_owned(),
            reply: reply.to_owned(),
            sent_at: now,
        });
        while self.recent.len() > self.capacity {
            self.recent.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    fn expire(&mut self, now: DateTime<Utc>) {
        while self
            .recent
            .front()
            .is_some_and(|s| now - s.sent_at >= self.window)
        {
            self.recent.pop_front();
        }
    }
}

impl Default for SendDedup {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, TimeDelta::seconds(DEFAULT_WINDOW_SECS))
    }
}

// ─── In-flight sends ─────────────────────────────────────────────────

/// Per-key serialization of sends that are on their way upstream.
///
/// Identical sends queue behind each other so the second one finds the
/// first one's reply in the cache; different keys never wait.
#[derive(Debug, Default)]
pub struct InFlightSends {
    slots: Mutex<HashMap<SendKey, Arc<AsyncMutex<()>>>>,
}

impl InFlightSends {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other send of `key` is in flight, then claim it.
    pub async fn acquire(&self, key: &SendKey) -> InFlightGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let guard = slot.lock_owned().await;
        InFlightGuard {
            slots: &self.slots,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// Keys currently claimed or waited on.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases the claim on drop, including when the owning future is
/// cancelled, and removes the slot once nobody else waits on it.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    slots: &'a Mutex<HashMap<SendKey, Arc<AsyncMutex<()>>>>,
    key: SendKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(&self.key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&self.key);
        }
    }
}
