//! Completion-queue and engine abstractions.
//!
//! The queue is the shared resource all pool workers block on. The pool
//! creates it once (through a [`CompletionEngine`]), shares it with N
//! workers, and disposes it only after every worker has been joined.

use std::time::Duration;

use crate::error::Result;
use crate::event::CompletionEvent;
use crate::tag::CompletionTag;

/// How long a blocking dequeue may wait.
#[derive(Debug, Clone, Copy)]
pub enum Deadline {
    /// Wait forever. The pool's handler loop always uses this.
    Infinite,
    /// Wait at most this long; expiry yields a `Timeout`-tagged event.
    After(Duration),
}

/// A queue of completion events consumed by pool workers.
///
/// **Contract:**
/// - Each event is delivered to exactly one consumer; delivery order across
///   concurrent consumers is unspecified.
/// - After `request_shutdown()`, every currently blocked dequeue and every
///   later dequeue must eventually report the shutdown sentinel — one
///   distinct shutdown result per consumer, not just the first. The pool's
///   termination protocol depends on this.
/// - `dispose()` may only be called once no consumer is still blocked on
///   the queue; the pool guarantees this by joining all workers first.
pub trait CompletionQueue: Send + Sync + 'static {
    type Event: CompletionEvent;

    /// Blocking combined dequeue+dispatch: runs the dispatch work bound to
    /// the next event internally and returns only its tag. Never
    /// materializes an event value for the caller.
    fn next_with_dispatch(&self) -> Result<CompletionTag>;

    /// Blocking dequeue of the next event, waiting up to `deadline`.
    fn next(&self, deadline: Deadline) -> Result<Self::Event>;

    /// Signal all current and future dequeue calls to report shutdown.
    fn request_shutdown(&self);

    /// Release the queue's resources. Caller must guarantee no consumer is
    /// still blocked on it.
    fn dispose(&self) -> Result<()>;
}

/// Creates completion queues. The pool calls `create_queue` exactly once
/// per pool instance, inside `start()`.
pub trait CompletionEngine: Send + Sync + 'static {
    type Queue: CompletionQueue;

    fn create_queue(&self) -> Self::Queue;
}
