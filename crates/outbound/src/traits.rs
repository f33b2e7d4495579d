//! Transport seam for the outbound queue.
//!
//! Defines the `Transport` interface implemented by both the production
//! wire transport and the in-memory test backend (`spool-transport-memory`).

use spool_types::PeerId;
use std::sync::Arc;

/// Error returned when a send fails.
///
/// Constructing a transport is the only fatal failure of this layer and is
/// surfaced by the transport's own constructor; everything here is a
/// per-send outcome folded into the failure policy.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("send timed out")]
    Timeout,
    #[error("peer unreachable: {0}")]
    PeerUnreachable(PeerId),
    #[error("peer returned error: {0}")]
    PeerError(String),
    #[error("transport shutting down")]
    Shutdown,
}

/// How one send ended.
#[derive(Debug)]
pub enum SendOutcome {
    Delivered,
    Failed(TransportError),
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered)
    }
}

/// Callback invoked by the transport when a send finishes.
pub type CompletionCallback = Box<dyn FnOnce(SendOutcome) + Send>;

/// One-message-to-one-peer submission primitive.
///
/// `submit` must not block on network completion: it hands the payload to
/// the transport and returns. The outcome, including timeouts (which the
/// transport owns), arrives later through the callback. Callbacks for one
/// peer are invoked serially.
pub trait Transport: Send + Sync {
    fn submit(&self, peer: &PeerId, payload: Arc<[u8]>, on_complete: CompletionCallback);
}
