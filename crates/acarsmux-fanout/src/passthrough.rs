//! Passthrough for non-poll requests (`telex`, `cpdlc`, `ping`, ...).
//!
//! These are fire-and-forget writes, not consume-once reads, so they skip
//! the session table and go straight upstream under the shared credential.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use acarsmux_core::error::AcarsError;
use acarsmux_core::logon_gate::LogonGate;
use acarsmux_core::wire::HoppieRequest;

use crate::send_dedup::{DedupHit, InFlightSends, SendDedup, SendKey};
use crate::upstream::Upstream;

/// Default upper bound on a single forwarded request.
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Recent-send cache plus the per-key claims on sends still in flight.
/// The cache lock is never held across an upstream call.
struct Dedup {
    cache: Mutex<SendDedup>,
    in_flight: InFlightSends,
}

pub struct Passthrough<U> {
    gate: Arc<LogonGate>,
    upstream: Arc<U>,
    /// `None` disables duplicate suppression.
    dedup: Option<Dedup>,
    timeout: Duration,
}

impl<U: Upstream> Passthrough<U> {
    pub fn new(gate: Arc<LogonGate>, upstream: Arc<U>) -> Self {
        Self {
            gate,
            upstream,
            dedup: None,
            timeout: DEFAULT_RELAY_TIMEOUT,
        }
    }

    pub fn with_dedup(mut self, dedup: SendDedup) -> Self {
        self.dedup = Some(Dedup {
            cache: Mutex::new(dedup),
            in_flight: InFlightSends::new(),
        });
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Authorize and forward `request`, returning upstream's reply verbatim.
    pub async fn relay(&self, request: &HoppieRequest) -> Result<String, AcarsError> {
        self.relay_at(request, Utc::now()).await
    }

    pub async fn relay_at(
        &self,
        request: &HoppieRequest,
        now: DateTime<Utc>,
    ) -> Result<String, AcarsError> {
        let logon = request
            .logon
            .as_deref()
            .ok_or_else(|| AcarsError::malformed("no logon given"))?;
        self.gate.authorize(logon)?;

        let send_key = request
            .kind()
            .filter(|k| k.is_message_send())
            .and_then(|_| SendKey::from_request(request));

        let (Some(dedup), Some(key)) = (&self.dedup, send_key) else {
            return self.forward(request).await;
        };

        // Identical sends queue here so a synchronized duplicate waits for
        // the first reply instead of going upstream too.
        let _claim = dedup.in_flight.acquire(&key).await;
        if let Some(reply) = cached_reply(&dedup.cache, &key, logon, now) {
            return Ok(reply);
        }

        let reply = self.forward(request).await?;
        dedup
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remember(key, logon, &reply, now);
        Ok(reply)
    }

    async fn forward(&self, request: &HoppieRequest) -> Result<String, AcarsError> {
        let kind = request.packet_type.as_deref().unwrap_or("");
        tracing::debug!(packet_type = %kind, from = ?request.from, to = ?request.to, "relaying upstream");
        match tokio::time::timeout(self.timeout, self.upstream.forward(request)).await {
            Ok(result) => result,
            Err(_) => Err(AcarsError::unreachable(format!(
                "{kind} timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

fn cached_reply(
    cache: &Mutex<SendDedup>,
    key: &SendKey,
    logon: &str,
    now: DateTime<Utc>,
) -> Option<String> {
    let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
    let hit = cache.lookup(key, logon, now)?;
    match hit {
        DedupHit::SameLogon(_) => {
            tracing::info!(from = %key.from, to = %key.to, "same station resent packet, replaying cached reply");
        }
        DedupHit::OtherLogon(_) => {
            tracing::info!(from = %key.from, to = %key.to, "duplicate from synchronized client, skipping upstream");
        }
    }
    Some(hit.reply().to_owned())
}
