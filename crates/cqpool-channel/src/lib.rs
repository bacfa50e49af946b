//! `ChannelEngine` — default in-process completion-queue engine.
//!
//! Events live in a bounded lock-free queue. Consumers poll with a short
//! park between attempts; a shutdown flag is checked only after the queue
//! is observed empty, so pending events drain before any consumer sees the
//! sentinel — and once the flag is set, every blocked and every later
//! dequeue reports shutdown. That per-consumer sentinel delivery is what
//! the pool's termination protocol requires.
//!
//! Dequeued events return their storage accounting on `Drop`; `dispose`
//! refuses to run while any are still live.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_queue::ArrayQueue;

use cqpool_core::error::{DrainError, Result};
use cqpool_core::event::CompletionEvent;
use cqpool_core::queue::{CompletionEngine, CompletionQueue, Deadline};
use cqpool_core::tag::CompletionTag;

/// Consumer re-poll interval. Producers do no wake bookkeeping.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Creates [`ChannelQueue`]s of a fixed capacity.
#[derive(Debug, Clone)]
pub struct ChannelEngine {
    capacity: usize,
}

impl ChannelEngine {
    /// Engine producing queues holding at most `capacity` pending events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }
}

impl Default for ChannelEngine {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl CompletionEngine for ChannelEngine {
    type Queue = ChannelQueue;

    fn create_queue(&self) -> ChannelQueue {
        ChannelQueue::with_capacity(self.capacity)
    }
}

/// A queued completion: tag, engine payload, and the dispatch work the
/// combined strategy runs in place of handing out the event.
struct EventSlot {
    tag: CompletionTag,
    payload: u64,
    dispatch: Option<Box<dyn FnOnce() + Send>>,
}

struct QueueInner {
    slots: ArrayQueue<EventSlot>,
    shutdown: AtomicBool,
    disposed: AtomicBool,
    /// Events dequeued but not yet released.
    outstanding: AtomicUsize,
}

impl QueueInner {
    fn make_event(self: &Arc<Self>, tag: CompletionTag, payload: u64) -> ChannelEvent {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        ChannelEvent {
            tag,
            payload,
            inner: Arc::clone(self),
        }
    }
}

enum PollOutcome {
    Popped(EventSlot),
    Shutdown,
    TimedOut,
}

/// Bounded in-process completion queue.
pub struct ChannelQueue {
    inner: Arc<QueueInner>,
}

impl ChannelQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                slots: ArrayQueue::new(capacity.max(1)),
                shutdown: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Post a plain completion carrying `payload`.
    pub fn post(&self, payload: u64) -> Result<()> {
        self.push_slot(EventSlot {
            tag: CompletionTag::OpComplete,
            payload,
            dispatch: None,
        })
    }

    /// Post a completion whose `dispatch` thunk is run by the combined
    /// strategy at dequeue time.
    pub fn post_with_dispatch(
        &self,
        payload: u64,
        dispatch: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        self.push_slot(EventSlot {
            tag: CompletionTag::OpComplete,
            payload,
            dispatch: Some(Box::new(dispatch)),
        })
    }

    /// Number of pending (not yet dequeued) events.
    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    fn push_slot(&self, slot: EventSlot) -> Result<()> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(DrainError::QueueShutdown);
        }
        self.inner
            .slots
            .push(slot)
            .map_err(|_| DrainError::QueueFull)
    }

    /// Blocking poll shared by both dequeue forms. Pop is attempted before
    /// the shutdown check so pending events drain first.
    fn poll_slot(&self, deadline: Deadline) -> PollOutcome {
        debug_assert!(!self.inner.disposed.load(Ordering::Acquire));
        let start = Instant::now();
        loop {
            if let Some(slot) = self.inner.slots.pop() {
                return PollOutcome::Popped(slot);
            }
            if self.inner.shutdown.load(Ordering::Acquire) {
                return PollOutcome::Shutdown;
            }
            if let Deadline::After(limit) = deadline {
                if start.elapsed() >= limit {
                    return PollOutcome::TimedOut;
                }
            }
            thread::park_timeout(POLL_INTERVAL);
        }
    }
}

impl CompletionQueue for ChannelQueue {
    type Event = ChannelEvent;

    fn next_with_dispatch(&self) -> Result<CompletionTag> {
        match self.poll_slot(Deadline::Infinite) {
            PollOutcome::Popped(slot) => {
                if let Some(dispatch) = slot.dispatch {
                    dispatch();
                }
                Ok(slot.tag)
            }
            PollOutcome::Shutdown => Ok(CompletionTag::Shutdown),
            PollOutcome::TimedOut => Ok(CompletionTag::Timeout),
        }
    }

    fn next(&self, deadline: Deadline) -> Result<ChannelEvent> {
        match self.poll_slot(deadline) {
            // Handler mode delivers the event itself; the dispatch thunk,
            // if any, is dropped unused.
            PollOutcome::Popped(slot) => Ok(self.inner.make_event(slot.tag, slot.payload)),
            PollOutcome::Shutdown => Ok(self.inner.make_event(CompletionTag::Shutdown, 0)),
            PollOutcome::TimedOut => Ok(self.inner.make_event(CompletionTag::Timeout, 0)),
        }
    }

    fn request_shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
    }

    fn dispose(&self) -> Result<()> {
        let outstanding = self.inner.outstanding.load(Ordering::SeqCst);
        if outstanding != 0 {
            return Err(DrainError::DisposeFailed { outstanding });
        }
        self.inner.disposed.store(true, Ordering::Release);
        // Undelivered slots are dropped with the queue itself.
        Ok(())
    }
}

/// Single-use event handle; returns its accounting on `Drop`.
pub struct ChannelEvent {
    tag: CompletionTag,
    payload: u64,
    inner: Arc<QueueInner>,
}

impl ChannelEvent {
    /// Engine payload carried by the completion.
    #[inline]
    pub fn payload(&self) -> u64 {
        self.payload
    }
}

impl CompletionEvent for ChannelEvent {
    fn tag(&self) -> CompletionTag {
        self.tag
    }
}

impl Drop for ChannelEvent {
    fn drop(&mut self) {
        self.inner.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}
