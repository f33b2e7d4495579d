//! The outbound message queue: the node's cross-traffic scheduler.
//!
//! - [`traits`]: the transport seam the queue submits through
//! - [`peers`]: the mutable peer model (routing tiers + class index)
//! - [`link`]: per-link scheduling state (heap, token bucket, suspensions)
//! - [`queue`]: the [`OutboundQueue`] itself (enqueue, tick, completions)
//! - [`dispatcher`]: the thread that drives `tick`
//!
//! No async runtime dependency. The queue is a deterministic state machine:
//! tests (and alternative runners) call [`OutboundQueue::tick`] directly,
//! while production spawns a [`Dispatcher`] thread that is woken by
//! enqueues, completions, and peer changes.

pub mod dispatcher;
pub mod link;
pub mod peers;
pub mod queue;
pub mod traits;

pub use dispatcher::Dispatcher;
pub use peers::PeerModel;
pub use queue::{CancelledEntry, EnqueueReport, OutboundQueue, OutboundStats};
pub use traits::{CompletionCallback, SendOutcome, Transport, TransportError};
