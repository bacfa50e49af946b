//! Worker drain loop.
//!
//! One loop body, parameterized by the drain mode bound at spawn time.
//! Both modes are blocking, single-purpose loops with no internal retry:
//! a dequeue error terminates that worker only.

use std::sync::Arc;

use cqpool_core::error::Result;
use cqpool_core::event::CompletionEvent;
use cqpool_core::kinfo;
use cqpool_core::queue::{CompletionQueue, Deadline};

/// Handler invoked with every dequeued event, shutdown-tagged ones included.
pub type EventHandler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// The shape of a worker's consume loop, fixed when the worker is spawned.
pub enum DrainMode<Q: CompletionQueue> {
    /// Combined dequeue+dispatch: the queue runs the dispatch work bound to
    /// the event internally and the worker sees only the tag.
    Dispatch,
    /// Dequeue with infinite wait, then invoke the external handler with
    /// the event before releasing it.
    Handler(EventHandler<Q::Event>),
}

impl<Q: CompletionQueue> DrainMode<Q> {
    /// Thread name for diagnostics; mode-distinct like the strategies are.
    pub(crate) fn thread_name(&self, index: usize) -> String {
        match self {
            DrainMode::Dispatch => format!("cqpool-drain-{}", index),
            DrainMode::Handler(_) => format!("cqpool-handler-{}", index),
        }
    }
}

impl<Q: CompletionQueue> Clone for DrainMode<Q> {
    fn clone(&self) -> Self {
        match self {
            DrainMode::Dispatch => DrainMode::Dispatch,
            DrainMode::Handler(handler) => DrainMode::Handler(Arc::clone(handler)),
        }
    }
}

/// Body of one polling worker. Runs until the shutdown sentinel is observed.
///
/// Process-then-check ordering: in handler mode the shutdown-tagged event is
/// still delivered to the handler before the loop exits. The event is
/// released on scope exit, so a panicking handler releases it via unwind.
pub(crate) fn drain_loop<Q: CompletionQueue>(
    cq: &Q,
    mode: &DrainMode<Q>,
    worker: usize,
) -> Result<()> {
    loop {
        let tag = match mode {
            DrainMode::Dispatch => cq.next_with_dispatch()?,
            DrainMode::Handler(handler) => {
                let event = cq.next(Deadline::Infinite)?;
                let tag = event.tag();
                handler(&event);
                tag
                // event dropped here — released exactly once per dequeue
            }
        };
        if tag.is_shutdown() {
            kinfo!("completion queue has shut down, worker {} exiting", worker);
            return Ok(());
        }
    }
}
