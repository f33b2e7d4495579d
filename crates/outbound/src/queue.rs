//! The outbound queue: admission, per-link scheduling, failure isolation.

use crate::link::{LinkState, PendingEntry};
use crate::peers::PeerModel;
use crate::traits::{SendOutcome, Transport};
use crossbeam::channel::{self, Receiver, Sender};
use dashmap::DashMap;
use spool_metrics as metrics;
use spool_policy::{EnqueueRule, PolicyModel};
use spool_types::{
    classify, MessageKind, OutboundMessage, Peer, PeerId, PeerTiers, Precedence,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Outcome of one `enqueue` call.
///
/// An empty `accepted` set is a normal report, not an error: every viable
/// recipient may be suspended, excluded, or over its admission limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueReport {
    /// Links an entry was pushed onto.
    pub accepted: Vec<PeerId>,
    /// Links refused by admission arithmetic.
    pub denied: Vec<PeerId>,
    /// Indices of alternative groups whose every member was unavailable
    /// (`EnqueueOne` passes only).
    pub no_route: Vec<usize>,
}

impl EnqueueReport {
    pub fn accepted_any(&self) -> bool {
        !self.accepted.is_empty()
    }
}

/// A pending entry dropped because its peer was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledEntry {
    pub kind: MessageKind,
    pub precedence: Precedence,
}

/// Point-in-time snapshot of queue state, for monitoring.
#[derive(Debug, Clone, Default)]
pub struct OutboundStats {
    pub links: usize,
    pub pending_total: usize,
    pub in_flight_total: usize,
    /// (peer, kind) cooldown windows currently in force.
    pub suspended_pairs: usize,
    pub submissions: u64,
    pub accepted: u64,
    pub denied: u64,
    pub no_route: u64,
    pub dispatched: u64,
    pub delivered: u64,
    pub failed: u64,
    pub cancelled: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submissions: AtomicU64,
    accepted: AtomicU64,
    denied: AtomicU64,
    no_route: AtomicU64,
    dispatched: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

enum Offer {
    Accepted,
    Denied,
    Unavailable,
}

/// The cross-traffic scheduler.
///
/// Owns the peer model, one [`LinkState`] per peer, and the policy tables.
/// `enqueue` is callable from any thread and never blocks on I/O: it takes
/// short per-link locks for admission arithmetic and returns. `tick` is the
/// sole place transport submissions are issued; completions come back
/// through the callback handed to the transport and are serialized per
/// link by the transport contract.
pub struct OutboundQueue {
    policy: Arc<PolicyModel>,
    peers: PeerModel,
    links: DashMap<PeerId, LinkState>,
    transport: Arc<dyn Transport>,
    /// Monotonic submission counter; FIFO tie-break among equal precedence.
    seq: AtomicU64,
    /// Back-reference captured by completion callbacks, so a transport
    /// holding callbacks past shutdown cannot keep the queue alive.
    self_ref: Weak<OutboundQueue>,
    wake_tx: Sender<()>,
    wake_rx: Mutex<Option<Receiver<()>>>,
    counters: Counters,
}

impl OutboundQueue {
    pub fn new(policy: Arc<PolicyModel>, transport: Arc<dyn Transport>) -> Arc<Self> {
        Self::with_peers(policy, transport, PeerTiers::new())
    }

    /// Build a queue pre-seeded with the tiers a topology projection
    /// produced.
    pub fn with_peers(
        policy: Arc<PolicyModel>,
        transport: Arc<dyn Transport>,
        initial: PeerTiers,
    ) -> Arc<Self> {
        // Capacity 1: wakes coalesce, the dispatcher drains everything per
        // pass anyway.
        let (wake_tx, wake_rx) = channel::bounded(1);
        let queue = Arc::new_cyclic(|self_ref| Self {
            policy,
            peers: PeerModel::default(),
            links: DashMap::new(),
            transport,
            seq: AtomicU64::new(0),
            self_ref: self_ref.clone(),
            wake_tx,
            wake_rx: Mutex::new(Some(wake_rx)),
            counters: Counters::default(),
        });
        queue.add_known_peers(initial);
        queue
    }

    pub fn policy(&self) -> &PolicyModel {
        &self.policy
    }

    pub fn peers(&self) -> &PeerModel {
        &self.peers
    }

    // ── Submission ───────────────────────────────────────────────────

    /// Fan a message out into per-link entries under the enqueue policy.
    ///
    /// Admission decisions happen here, once: an admitted entry is later
    /// delivered or explicitly failed, never silently dropped. A later
    /// high-precedence arrival does not displace an already admitted entry.
    pub fn enqueue(&self, msg: &OutboundMessage) -> EnqueueReport {
        let classified = classify(msg);
        let rules = self.policy.enqueue_rules(classified.class);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let tiers = self.peers.snapshot();
        let now = Instant::now();
        let mut report = EnqueueReport::default();

        for rule in rules {
            match rule {
                EnqueueRule::All {
                    class,
                    max_ahead,
                    precedence,
                } => {
                    for peer in tiers.peers().filter(|p| p.class == *class) {
                        if classified.exclude.as_ref() == Some(&peer.id) {
                            continue;
                        }
                        match self.offer(peer, msg, *precedence, *max_ahead, seq, now) {
                            Offer::Accepted => report.accepted.push(peer.id.clone()),
                            Offer::Denied => report.denied.push(peer.id.clone()),
                            Offer::Unavailable => {}
                        }
                    }
                }
                EnqueueRule::One {
                    classes,
                    max_ahead,
                    precedence,
                } => {
                    let mut group_index = 0;
                    for group in tiers.groups() {
                        let Some(primary) = group.primary() else { continue };
                        if !classes.contains(&primary.class) {
                            continue;
                        }
                        let mut placed = false;
                        for peer in group.members() {
                            if classified.exclude.as_ref() == Some(&peer.id) {
                                continue;
                            }
                            match self.offer(peer, msg, *precedence, *max_ahead, seq, now) {
                                Offer::Accepted => {
                                    report.accepted.push(peer.id.clone());
                                    placed = true;
                                    break;
                                }
                                Offer::Denied => report.denied.push(peer.id.clone()),
                                Offer::Unavailable => {}
                            }
                        }
                        if !placed {
                            report.no_route.push(group_index);
                        }
                        group_index += 1;
                    }
                }
            }
        }

        self.counters.submissions.fetch_add(1, Ordering::Relaxed);
        self.counters
            .accepted
            .fetch_add(report.accepted.len() as u64, Ordering::Relaxed);
        self.counters
            .denied
            .fetch_add(report.denied.len() as u64, Ordering::Relaxed);
        self.counters
            .no_route
            .fetch_add(report.no_route.len() as u64, Ordering::Relaxed);
        metrics::record_enqueue_accepted(report.accepted.len());
        metrics::record_enqueue_denied(report.denied.len());
        metrics::record_enqueue_no_route(report.no_route.len());

        trace!(
            kind = msg.kind().as_str(),
            seq,
            accepted = report.accepted.len(),
            denied = report.denied.len(),
            no_route = report.no_route.len(),
            "message enqueued"
        );
        if report.accepted_any() {
            self.wake();
        }
        report
    }

    fn offer(
        &self,
        peer: &Peer,
        msg: &OutboundMessage,
        precedence: Precedence,
        max_ahead: usize,
        seq: u64,
        now: Instant,
    ) -> Offer {
        let kind = msg.kind();
        let mut link = self.links.entry(peer.id.clone()).or_insert_with(|| {
            LinkState::new(peer.class, self.policy.dequeue_rule(peer.class), now)
        });
        if link.is_suspended(kind, now) {
            trace!(peer = %peer.id, kind = kind.as_str(), "peer suspended for kind, skipped");
            return Offer::Unavailable;
        }
        if !link.admits(precedence, max_ahead) {
            trace!(
                peer = %peer.id,
                kind = kind.as_str(),
                precedence = %precedence,
                max_ahead,
                "admission denied"
            );
            return Offer::Denied;
        }
        link.push(PendingEntry {
            precedence,
            seq,
            kind,
            payload: Arc::clone(msg.payload()),
        });
        Offer::Accepted
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Walk every link and hand dispatchable entries to the transport.
    ///
    /// Entries are popped in (precedence desc, submission order asc) order
    /// while the link has in-flight capacity and a rate-limit token.
    /// Transport calls are issued after the link lock is released, so a
    /// synchronously completing transport cannot deadlock the queue.
    /// Returns the number of entries dispatched.
    pub fn tick(&self) -> usize {
        let now = Instant::now();
        let mut dispatches: Vec<(PeerId, PendingEntry)> = Vec::new();
        let mut pending_total = 0;
        let mut in_flight_total = 0;
        for mut link in self.links.iter_mut() {
            while let Some(entry) = link.try_dispatch(now) {
                dispatches.push((link.key().clone(), entry));
            }
            pending_total += link.pending.len();
            in_flight_total += link.in_flight;
        }
        metrics::set_pending_total(pending_total);
        metrics::set_in_flight_total(in_flight_total);

        let count = dispatches.len();
        for (peer, entry) in dispatches {
            trace!(
                peer = %peer,
                kind = entry.kind.as_str(),
                precedence = %entry.precedence,
                seq = entry.seq,
                "dispatching"
            );
            metrics::record_dispatch(entry.kind.as_str());
            self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

            let weak = self.self_ref.clone();
            let kind = entry.kind;
            let completion_peer = peer.clone();
            self.transport.submit(
                &peer,
                entry.payload,
                Box::new(move |outcome| {
                    if let Some(queue) = weak.upgrade() {
                        queue.on_send_complete(&completion_peer, kind, outcome);
                    }
                }),
            );
        }
        count
    }

    fn on_send_complete(&self, peer: &PeerId, kind: MessageKind, outcome: SendOutcome) {
        match self.links.get_mut(peer) {
            None => {
                // Peer removed while the send was in flight; its link state
                // is gone and the outcome has nothing to land on.
                debug!(peer = %peer, kind = kind.as_str(), "completion for removed peer discarded");
            }
            Some(mut link) => {
                link.in_flight = link.in_flight.saturating_sub(1);
                match outcome {
                    SendOutcome::Delivered => {
                        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                        metrics::record_delivered();
                    }
                    SendOutcome::Failed(error) => {
                        self.counters.failed.fetch_add(1, Ordering::Relaxed);
                        let delay = self.policy.failure_delay(link.class, kind);
                        link.suspend(kind, Instant::now() + delay);
                        metrics::record_send_failed(kind.as_str());
                        metrics::record_peer_suspended(kind.as_str());
                        debug!(
                            peer = %peer,
                            kind = kind.as_str(),
                            %error,
                            suspend_secs = delay.as_secs_f64(),
                            "send failed, kind suspended on link"
                        );
                    }
                }
            }
        }
        self.wake();
    }

    // ── Peer management ──────────────────────────────────────────────

    /// Extend the peer model; new peers get an empty link. Returns the
    /// newly added ids.
    pub fn add_known_peers(&self, tiers: PeerTiers) -> Vec<PeerId> {
        let added = self.peers.add_known_peers(tiers);
        let now = Instant::now();
        for id in &added {
            if let Some(class) = self.peers.classify(id) {
                self.links.entry(id.clone()).or_insert_with(|| {
                    LinkState::new(class, self.policy.dequeue_rule(class), now)
                });
            }
        }
        metrics::set_link_count(self.links.len());
        if !added.is_empty() {
            self.wake();
        }
        added
    }

    /// Drop a peer. Its pending entries are drained and reported as
    /// cancelled, highest precedence first; in-flight sends complete
    /// against thin air and are discarded.
    pub fn remove_peer(&self, id: &PeerId) -> Vec<CancelledEntry> {
        self.peers.remove_peer(id);
        let mut cancelled = Vec::new();
        if let Some((_, link)) = self.links.remove(id) {
            for entry in link.pending.into_sorted_vec().into_iter().rev() {
                debug!(
                    peer = %id,
                    kind = entry.kind.as_str(),
                    precedence = %entry.precedence,
                    "pending entry cancelled by peer removal"
                );
                cancelled.push(CancelledEntry {
                    kind: entry.kind,
                    precedence: entry.precedence,
                });
            }
        }
        self.counters
            .cancelled
            .fetch_add(cancelled.len() as u64, Ordering::Relaxed);
        metrics::record_entries_cancelled(cancelled.len());
        metrics::set_link_count(self.links.len());
        cancelled
    }

    // ── Introspection ────────────────────────────────────────────────

    pub fn stats(&self) -> OutboundStats {
        let now = Instant::now();
        let mut pending_total = 0;
        let mut in_flight_total = 0;
        let mut suspended_pairs = 0;
        for link in self.links.iter() {
            pending_total += link.pending.len();
            in_flight_total += link.in_flight;
            suspended_pairs += link.active_suspensions(now);
        }
        OutboundStats {
            links: self.links.len(),
            pending_total,
            in_flight_total,
            suspended_pairs,
            submissions: self.counters.submissions.load(Ordering::Relaxed),
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            denied: self.counters.denied.load(Ordering::Relaxed),
            no_route: self.counters.no_route.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Shortest wait until a rate-limited link with queued traffic frees a
    /// token. `None` when nothing is waiting on a timer.
    pub fn next_wakeup(&self) -> Option<Duration> {
        let now = Instant::now();
        self.links
            .iter()
            .filter_map(|link| link.throttled_for(now))
            .min()
    }

    pub(crate) fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    pub(crate) fn take_wake_receiver(&self) -> Option<Receiver<()>> {
        self.wake_rx
            .lock()
            .expect("wake receiver lock poisoned")
            .take()
    }
}
