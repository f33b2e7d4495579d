//! The runner thread that drives [`OutboundQueue::tick`].
//!
//! The queue itself is deterministic and runtime-free; this thread is the
//! production scheduler. It sleeps until woken by an enqueue, a completion,
//! or a peer change, with a timed wakeup when a rate-limited link is
//! waiting on a token.

use crate::queue::OutboundQueue;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

/// Fallback poll interval when no timed wakeup is due.
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Handle to the dispatcher thread. Dropping it stops the thread.
pub struct Dispatcher {
    queue: Arc<OutboundQueue>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn the dispatcher for a queue.
    ///
    /// At most one dispatcher may drive a queue; a second spawn panics.
    pub fn spawn(queue: Arc<OutboundQueue>) -> Self {
        let wake = queue
            .take_wake_receiver()
            .expect("dispatcher already spawned for this queue");
        let stop = Arc::new(AtomicBool::new(false));
        let handle = thread::Builder::new()
            .name("outbound-dispatcher".into())
            .spawn({
                let queue = Arc::clone(&queue);
                let stop = Arc::clone(&stop);
                move || run(queue, wake, stop)
            })
            .expect("spawn outbound dispatcher thread");
        Self {
            queue,
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the thread and join it. Pending entries stay queued.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop.store(true, Ordering::Relaxed);
            self.queue.wake();
            let _ = handle.join();
            debug!("outbound dispatcher stopped");
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn run(queue: Arc<OutboundQueue>, wake: Receiver<()>, stop: Arc<AtomicBool>) {
    debug!("outbound dispatcher running");
    while !stop.load(Ordering::Relaxed) {
        let dispatched = queue.tick();
        if dispatched > 0 {
            trace!(dispatched, "dispatcher tick");
        }
        let wait = queue.next_wakeup().unwrap_or(IDLE_WAIT);
        match wake.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
