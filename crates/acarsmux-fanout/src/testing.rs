//! In-memory upstream with scripted replies, for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use acarsmux_core::error::AcarsError;
use acarsmux_core::wire::HoppieRequest;

use crate::upstream::Upstream;

/// Replays queued poll batches and forward replies in order.
///
/// An exhausted poll queue behaves like an empty mailbox (`Ok(vec![])`); an
/// exhausted forward queue answers `ok`.
#[derive(Debug, Default)]
pub struct ScriptedUpstream {
    polls: Mutex<VecDeque<Result<Vec<String>, AcarsError>>>,
    forwards: Mutex<VecDeque<Result<String, AcarsError>>>,
    forwarded: Mutex<Vec<HoppieRequest>>,
    poll_calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn push_batch(&self, records: &[&str]) {
        self.push_poll(Ok(records.iter().map(|r| r.to_string()).collect()));
    }

    pub fn push_poll(&self, result: Result<Vec<String>, AcarsError>) {
        self.polls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }

    pub fn push_forward(&self, result: Result<String, AcarsError>) {
        self.forwards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    /// Requests seen by `forward`, in call order.
    pub fn forwarded(&self) -> Vec<HoppieRequest> {
        self.forwarded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Upstream for ScriptedUpstream {
    async fn poll(&self, _callsign: &str) -> Result<Vec<String>, AcarsError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.polls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn forward(&self, request: &HoppieRequest) -> Result<String, AcarsError> {
        self.forwarded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.forwards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_owned()))
    }
}
