//! Metrics facade for the outbound queue.
//!
//! Provides a [`MetricsRecorder`] trait with default no-op implementations.
//! A global singleton recorder is accessed via [`recorder()`], and
//! convenience free functions delegate to it.
//!
//! Callers record metrics via the free functions:
//! ```ignore
//! spool_metrics::record_dispatch("transaction");
//! spool_metrics::set_pending_total(depth);
//! ```
//!
//! At startup, a host process may install a backend with [`install`];
//! without one, everything is a no-op.

use std::sync::OnceLock;

/// Domain-specific metrics recording trait.
///
/// All methods have default no-op implementations so backends only need
/// to override the metrics they care about.
#[allow(unused_variables)]
pub trait MetricsRecorder: Send + Sync + 'static {
    // ── Enqueue ──────────────────────────────────────────────────────

    /// Record entries accepted by one submission.
    fn record_enqueue_accepted(&self, count: usize) {}

    /// Record per-link admission denials from one submission.
    fn record_enqueue_denied(&self, count: usize) {}

    /// Record alternative groups left without a viable member.
    fn record_enqueue_no_route(&self, count: usize) {}

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Record an entry handed to the transport.
    fn record_dispatch(&self, kind: &str) {}

    /// Record a delivery confirmation.
    fn record_delivered(&self) {}

    /// Record a send failure.
    fn record_send_failed(&self, kind: &str) {}

    /// Record a (peer, kind) pair entering its cooldown window.
    fn record_peer_suspended(&self, kind: &str) {}

    /// Record pending entries drained by a peer removal.
    fn record_entries_cancelled(&self, count: usize) {}

    // ── Gauges ───────────────────────────────────────────────────────

    /// Set the current number of links.
    fn set_link_count(&self, count: usize) {}

    /// Set the total pending depth across all links.
    fn set_pending_total(&self, depth: usize) {}

    /// Set the total in-flight count across all links.
    fn set_in_flight_total(&self, count: usize) {}
}

/// Built-in recorder that drops everything.
struct NoopRecorder;

impl MetricsRecorder for NoopRecorder {}

static RECORDER: OnceLock<Box<dyn MetricsRecorder>> = OnceLock::new();

/// Install a metrics backend. May be called at most once; later calls are
/// ignored (first install wins).
pub fn install(recorder: impl MetricsRecorder) {
    let _ = RECORDER.set(Box::new(recorder));
}

/// The active recorder, or the built-in no-op.
pub fn recorder() -> &'static dyn MetricsRecorder {
    static NOOP: NoopRecorder = NoopRecorder;
    match RECORDER.get() {
        Some(backend) => backend.as_ref(),
        None => &NOOP,
    }
}

// ── Free functions ───────────────────────────────────────────────────

pub fn record_enqueue_accepted(count: usize) {
    recorder().record_enqueue_accepted(count);
}

pub fn record_enqueue_denied(count: usize) {
    recorder().record_enqueue_denied(count);
}

pub fn record_enqueue_no_route(count: usize) {
    recorder().record_enqueue_no_route(count);
}

pub fn record_dispatch(kind: &str) {
    recorder().record_dispatch(kind);
}

pub fn record_delivered() {
    recorder().record_delivered();
}

pub fn record_send_failed(kind: &str) {
    recorder().record_send_failed(kind);
}

pub fn record_peer_suspended(kind: &str) {
    recorder().record_peer_suspended(kind);
}

pub fn record_entries_cancelled(count: usize) {
    recorder().record_entries_cancelled(count);
}

pub fn set_link_count(count: usize) {
    recorder().set_link_count(count);
}

pub fn set_pending_total(depth: usize) {
    recorder().set_pending_total(depth);
}

pub fn set_in_flight_total(count: usize) {
    recorder().set_in_flight_total(count);
}
