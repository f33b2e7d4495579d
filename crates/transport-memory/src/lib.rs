//! Deterministic in-memory transport for tests.
//!
//! Implements the outbound queue's [`Transport`] seam without any I/O:
//!
//! - every submission is recorded for inspection;
//! - per-peer failures can be scripted (always, or the next N sends);
//! - in *held* mode completions are parked until the test releases them,
//!   which is how in-flight windows are made observable.

use spool_outbound::{CompletionCallback, SendOutcome, Transport, TransportError};
use spool_types::PeerId;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::trace;

/// One recorded submission.
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub peer: PeerId,
    pub payload: Arc<[u8]>,
}

#[derive(Debug, Clone, Copy)]
enum FailMode {
    Always,
    /// Fail this many more sends, then succeed again.
    Remaining(u32),
}

struct HeldSend {
    peer: PeerId,
    on_complete: CompletionCallback,
}

#[derive(Default)]
struct Inner {
    sent: Vec<SentRecord>,
    failing: HashMap<PeerId, FailMode>,
    hold: bool,
    held: VecDeque<HeldSend>,
}

/// In-memory [`Transport`] backend.
#[derive(Default)]
pub struct MemoryTransport {
    inner: Mutex<Inner>,
}

impl MemoryTransport {
    /// Immediate mode: every submission completes synchronously inside
    /// `submit`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Held mode: completions are parked until [`complete_next`] /
    /// [`complete_all`] release them.
    ///
    /// [`complete_next`]: MemoryTransport::complete_next
    /// [`complete_all`]: MemoryTransport::complete_all
    pub fn held() -> Arc<Self> {
        let transport = Self::default();
        transport
            .inner
            .lock()
            .expect("memory transport lock poisoned")
            .hold = true;
        Arc::new(transport)
    }

    // ── Scripting ────────────────────────────────────────────────────

    /// Make every send to `peer` fail until [`heal_peer`] is called.
    ///
    /// [`heal_peer`]: MemoryTransport::heal_peer
    pub fn fail_peer(&self, peer: PeerId) {
        self.inner
            .lock()
            .expect("memory transport lock poisoned")
            .failing
            .insert(peer, FailMode::Always);
    }

    /// Make the next `times` sends to `peer` fail.
    pub fn fail_peer_times(&self, peer: PeerId, times: u32) {
        self.inner
            .lock()
            .expect("memory transport lock poisoned")
            .failing
            .insert(peer, FailMode::Remaining(times));
    }

    pub fn heal_peer(&self, peer: &PeerId) {
        self.inner
            .lock()
            .expect("memory transport lock poisoned")
            .failing
            .remove(peer);
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub fn sent(&self) -> Vec<SentRecord> {
        self.inner
            .lock()
            .expect("memory transport lock poisoned")
            .sent
            .clone()
    }

    pub fn sent_to(&self, peer: &PeerId) -> usize {
        self.inner
            .lock()
            .expect("memory transport lock poisoned")
            .sent
            .iter()
            .filter(|record| &record.peer == peer)
            .count()
    }

    pub fn total_sent(&self) -> usize {
        self.inner
            .lock()
            .expect("memory transport lock poisoned")
            .sent
            .len()
    }

    /// Completions currently parked (held mode).
    pub fn held_count(&self) -> usize {
        self.inner
            .lock()
            .expect("memory transport lock poisoned")
            .held
            .len()
    }

    // ── Manual completion ────────────────────────────────────────────

    /// Release the oldest parked completion. Returns `false` when nothing
    /// is parked.
    pub fn complete_next(&self) -> bool {
        let (held, outcome) = {
            let mut inner = self.inner.lock().expect("memory transport lock poisoned");
            let Some(held) = inner.held.pop_front() else {
                return false;
            };
            let outcome = inner.outcome_for(&held.peer);
            (held, outcome)
        };
        // The callback re-enters the queue; never invoke it under the lock.
        (held.on_complete)(outcome);
        true
    }

    /// Release every parked completion in submission order. Returns how
    /// many were released.
    pub fn complete_all(&self) -> usize {
        let mut released = 0;
        while self.complete_next() {
            released += 1;
        }
        released
    }
}

impl Inner {
    fn outcome_for(&mut self, peer: &PeerId) -> SendOutcome {
        match self.failing.get_mut(peer) {
            None => SendOutcome::Delivered,
            Some(FailMode::Always) => {
                SendOutcome::Failed(TransportError::PeerUnreachable(peer.clone()))
            }
            Some(FailMode::Remaining(n)) => {
                *n -= 1;
                if *n == 0 {
                    self.failing.remove(peer);
                }
                SendOutcome::Failed(TransportError::PeerUnreachable(peer.clone()))
            }
        }
    }
}

impl Transport for MemoryTransport {
    fn submit(&self, peer: &PeerId, payload: Arc<[u8]>, on_complete: CompletionCallback) {
        let completion = {
            let mut inner = self.inner.lock().expect("memory transport lock poisoned");
            inner.sent.push(SentRecord {
                peer: peer.clone(),
                payload,
            });
            trace!(peer = %peer, total = inner.sent.len(), "memory transport send");
            if inner.hold {
                inner.held.push_back(HeldSend {
                    peer: peer.clone(),
                    on_complete,
                });
                None
            } else {
                Some((on_complete, inner.outcome_for(peer)))
            }
        };
        if let Some((on_complete, outcome)) = completion {
            on_complete(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(host: &str) -> PeerId {
        PeerId::new(host, 3000)
    }

    fn capture() -> (CompletionCallback, Arc<Mutex<Vec<bool>>>) {
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        let callback: CompletionCallback =
            Box::new(move |outcome| sink.lock().unwrap().push(outcome.is_delivered()));
        (callback, outcomes)
    }

    #[test]
    fn immediate_mode_completes_inside_submit() {
        let transport = MemoryTransport::new();
        let (callback, outcomes) = capture();
        transport.submit(&id("a"), Arc::from(vec![1u8]), callback);
        assert_eq!(outcomes.lock().unwrap().as_slice(), &[true]);
        assert_eq!(transport.sent_to(&id("a")), 1);
    }

    #[test]
    fn scripted_failures_count_down() {
        let transport = MemoryTransport::new();
        transport.fail_peer_times(id("a"), 2);

        let outcomes = Arc::new(Mutex::new(Vec::new()));
        for payload in 1u8..=3 {
            let sink = Arc::clone(&outcomes);
            transport.submit(
                &id("a"),
                Arc::from(vec![payload]),
                Box::new(move |outcome| sink.lock().unwrap().push(outcome.is_delivered())),
            );
        }

        assert_eq!(
            outcomes.lock().unwrap().as_slice(),
            &[false, false, true],
            "two scripted failures, then healthy again"
        );
    }

    #[test]
    fn held_mode_parks_and_releases_in_order() {
        let transport = MemoryTransport::held();
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        for host in ["a", "b"] {
            let sink = Arc::clone(&outcomes);
            let peer = id(host);
            transport.submit(
                &peer.clone(),
                Arc::from(vec![0u8]),
                Box::new(move |outcome| {
                    sink.lock().unwrap().push((peer.clone(), outcome.is_delivered()))
                }),
            );
        }
        assert_eq!(transport.held_count(), 2);
        assert!(outcomes.lock().unwrap().is_empty(), "nothing completes until released");

        assert!(transport.complete_next());
        assert_eq!(outcomes.lock().unwrap()[0].0, id("a"), "FIFO release");
        assert_eq!(transport.complete_all(), 1);
        assert!(!transport.complete_next());
    }
}
