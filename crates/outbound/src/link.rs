//! Per-link scheduling state.
//!
//! One link pairs one peer with its pending heap, in-flight counter, rate
//! limiter, and per-kind suspension windows. Links live in the queue's
//! concurrent map; every method here runs under that map's shard lock.

use spool_policy::{DequeueRule, RateLimit};
use spool_types::{MessageKind, NodeClass, Precedence};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// An admitted send waiting for dispatch.
#[derive(Debug, Clone)]
pub(crate) struct PendingEntry {
    pub precedence: Precedence,
    /// Submission counter; breaks precedence ties FIFO.
    pub seq: u64,
    pub kind: MessageKind,
    pub payload: Arc<[u8]>,
}

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.precedence == other.precedence && self.seq == other.seq
    }
}

impl Eq for PendingEntry {}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEntry {
    // Max-heap: highest precedence first, then lowest seq (FIFO).
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence
            .cmp(&other.precedence)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Token bucket with capacity of one second's worth of sends.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    /// Tokens added per second; `None` disables limiting.
    rate: Option<u32>,
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    pub fn new(limit: RateLimit, now: Instant) -> Self {
        let rate = match limit {
            RateLimit::Unlimited => None,
            RateLimit::MaxPerSec(n) => Some(n),
        };
        Self {
            rate,
            // Start full so a fresh link can burst up to its cap.
            tokens: rate.map_or(0.0, f64::from),
            refilled_at: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        if let Some(rate) = self.rate {
            let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
            self.tokens = (self.tokens + elapsed * f64::from(rate)).min(f64::from(rate));
            self.refilled_at = now;
        }
    }

    pub fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        match self.rate {
            None => true,
            Some(_) if self.tokens >= 1.0 => {
                self.tokens -= 1.0;
                true
            }
            Some(_) => false,
        }
    }

    /// Time until a token becomes available, without consuming one.
    /// `None` for unlimited links.
    pub fn next_token_in(&self, now: Instant) -> Option<Duration> {
        let rate = self.rate?;
        let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        let tokens = (self.tokens + elapsed * f64::from(rate)).min(f64::from(rate));
        if tokens >= 1.0 {
            Some(Duration::ZERO)
        } else {
            Some(Duration::from_secs_f64((1.0 - tokens) / f64::from(rate)))
        }
    }
}

/// Scheduling state for one peer.
#[derive(Debug)]
pub(crate) struct LinkState {
    pub class: NodeClass,
    max_in_flight: usize,
    pub pending: BinaryHeap<PendingEntry>,
    pub in_flight: usize,
    bucket: TokenBucket,
    suspended: HashMap<MessageKind, Instant>,
}

impl LinkState {
    pub fn new(class: NodeClass, rule: DequeueRule, now: Instant) -> Self {
        Self {
            class,
            max_in_flight: rule.max_in_flight,
            pending: BinaryHeap::new(),
            in_flight: 0,
            bucket: TokenBucket::new(rule.rate_limit, now),
            suspended: HashMap::new(),
        }
    }

    /// Whether `kind` is inside its post-failure cooldown window.
    pub fn is_suspended(&self, kind: MessageKind, now: Instant) -> bool {
        self.suspended.get(&kind).is_some_and(|until| *until > now)
    }

    pub fn suspend(&mut self, kind: MessageKind, until: Instant) {
        self.suspended.insert(kind, until);
    }

    /// Pending entries with precedence strictly above `precedence`.
    pub fn higher_precedence_pending(&self, precedence: Precedence) -> usize {
        self.pending
            .iter()
            .filter(|entry| entry.precedence > precedence)
            .count()
    }

    /// Admission arithmetic: would a new entry at `precedence` be admitted
    /// under `max_ahead`? Strictly-greater on both counts: the entry is
    /// refused only when *more than* `max_ahead` strictly-higher entries
    /// are already pending.
    pub fn admits(&self, precedence: Precedence, max_ahead: usize) -> bool {
        self.higher_precedence_pending(precedence) <= max_ahead
    }

    pub fn push(&mut self, entry: PendingEntry) {
        self.pending.push(entry);
    }

    /// Pop the next dispatchable entry, consuming capacity and a token.
    ///
    /// Returns `None` when the link is saturated, rate-limited, or idle.
    pub fn try_dispatch(&mut self, now: Instant) -> Option<PendingEntry> {
        if self.in_flight >= self.max_in_flight || self.pending.is_empty() {
            return None;
        }
        if !self.bucket.try_take(now) {
            return None;
        }
        let entry = self.pending.pop()?;
        self.in_flight += 1;
        Some(entry)
    }

    /// Why this link cannot dispatch right now, for the dispatcher's timed
    /// wakeup: time until a token frees up, if that is the only blocker.
    pub fn throttled_for(&self, now: Instant) -> Option<Duration> {
        if self.pending.is_empty() || self.in_flight >= self.max_in_flight {
            return None;
        }
        match self.bucket.next_token_in(now) {
            Some(wait) if wait > Duration::ZERO => Some(wait),
            _ => None,
        }
    }

    /// Count of (kind → until) windows still in the future.
    pub fn active_suspensions(&self, now: Instant) -> usize {
        self.suspended.values().filter(|until| **until > now).count()
    }
}
