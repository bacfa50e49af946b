//! Worker pool controller.
//!
//! Owns the shared completion queue's lifecycle and orchestrates worker
//! spawn/join under a single lifecycle mutex. The lifecycle is an explicit
//! three-state machine:
//!
//! ```text
//! NotStarted --start()--> Started --stop()--> Stopped (terminal)
//! ```
//!
//! Invalid transitions are rejected with typed errors. Workers never touch
//! the lifecycle mutex — they only consume from the queue.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_queue::ArrayQueue;

use cqpool_core::env::env_get;
use cqpool_core::error::{DrainError, Result};
use cqpool_core::queue::{CompletionEngine, CompletionQueue};
use cqpool_core::{kerror, kinfo, kwarn};

use crate::drain::{drain_loop, DrainMode, EventHandler};

/// Pool construction parameters.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of polling workers. Fixed for the pool's lifetime.
    pub pool_size: usize,
}

impl PoolConfig {
    /// A pool of `pool_size` workers, clamped to at least 1.
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size: pool_size.max(1),
        }
    }

    /// Pool size from `CQP_WORKERS`, falling back to the auto default.
    pub fn from_env() -> Self {
        Self::new(env_get("CQP_WORKERS", Self::default().pool_size))
    }
}

impl Default for PoolConfig {
    /// Auto sizing: (nproc/2) clamped to 2..=8.
    fn default() -> Self {
        let cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new((cpus / 2).clamp(2, 8))
    }
}

/// A fault recorded by a worker whose dequeue call failed.
///
/// The reference behavior would lose the worker silently; here the fault is
/// pushed onto a bounded channel the controller can drain via
/// [`WorkerPool::take_faults`].
#[derive(Debug)]
pub struct WorkerFault {
    pub worker: usize,
    pub error: DrainError,
}

/// Lifecycle state, kept behind the pool's single mutex.
enum Lifecycle<Q: CompletionQueue> {
    NotStarted,
    Started {
        cq: Arc<Q>,
        workers: Vec<JoinHandle<()>>,
    },
    Stopped,
}

/// Pool of threads polling on the same completion queue.
pub struct WorkerPool<E: CompletionEngine> {
    engine: E,
    pool_size: usize,
    mode: DrainMode<E::Queue>,
    state: Mutex<Lifecycle<E::Queue>>,
    faults: Arc<ArrayQueue<WorkerFault>>,
}

impl<E: CompletionEngine> WorkerPool<E> {
    /// Pool using the combined dequeue+dispatch strategy.
    pub fn new(engine: E, config: PoolConfig) -> Self {
        Self::with_mode(engine, config, DrainMode::Dispatch)
    }

    /// Pool using the handler strategy: every dequeued event is passed to
    /// `handler` before release, the shutdown-tagged one included.
    pub fn with_handler(
        engine: E,
        config: PoolConfig,
        handler: impl Fn(&<E::Queue as CompletionQueue>::Event) + Send + Sync + 'static,
    ) -> Self {
        let handler: EventHandler<<E::Queue as CompletionQueue>::Event> = Arc::new(handler);
        Self::with_mode(engine, config, DrainMode::Handler(handler))
    }

    fn with_mode(engine: E, config: PoolConfig, mode: DrainMode<E::Queue>) -> Self {
        Self {
            engine,
            pool_size: config.pool_size,
            mode,
            state: Mutex::new(Lifecycle::NotStarted),
            faults: Arc::new(ArrayQueue::new(config.pool_size)),
        }
    }

    /// Create the shared queue (exactly once per pool instance) and spawn
    /// the workers.
    ///
    /// Fails with `AlreadyStarted` in any state but `NotStarted`, making no
    /// changes; the check and the creation are atomic under the lifecycle
    /// mutex, so concurrent callers race to one queue.
    pub fn start(&self) -> Result<()> {
        let mut state = self.lifecycle();
        if !matches!(&*state, Lifecycle::NotStarted) {
            return Err(DrainError::AlreadyStarted);
        }

        let cq = Arc::new(self.engine.create_queue());
        let mut workers = Vec::with_capacity(self.pool_size);
        for index in 0..self.pool_size {
            let cq = Arc::clone(&cq);
            let mode = self.mode.clone();
            let faults = Arc::clone(&self.faults);
            let handle = thread::Builder::new()
                .name(self.mode.thread_name(index))
                .spawn(move || {
                    if let Err(error) = drain_loop(&*cq, &mode, index) {
                        kerror!("worker {} faulted: {}", index, error);
                        let _ = faults.push(WorkerFault { worker: index, error });
                    }
                })
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }

        kinfo!("started {} polling workers", self.pool_size);
        *state = Lifecycle::Started { cq, workers };
        Ok(())
    }

    /// Signal queue shutdown, join every worker, then dispose the queue.
    ///
    /// Does not return until all workers have exited. A panicked worker
    /// surfaces as `WorkerPanic` and is propagated without disposing the
    /// queue — the pool stays `Stopped` (terminal) either way. Calling
    /// `stop()` again on a stopped pool is a no-op; before `start()` it
    /// fails fast with `NotStarted`.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.lifecycle();
        let (cq, workers) = match std::mem::replace(&mut *state, Lifecycle::Stopped) {
            Lifecycle::Started { cq, workers } => (cq, workers),
            Lifecycle::NotStarted => {
                *state = Lifecycle::NotStarted;
                return Err(DrainError::NotStarted);
            }
            Lifecycle::Stopped => return Ok(()),
        };

        cq.request_shutdown();
        kinfo!("waiting for {} workers to finish", workers.len());
        for (index, handle) in workers.into_iter().enumerate() {
            handle.join().map_err(|_| DrainError::WorkerPanic(index))?;
        }

        if !self.faults.is_empty() {
            kwarn!(
                "{} worker fault(s) recorded; drain with take_faults()",
                self.faults.len()
            );
        }

        cq.dispose()?;
        kinfo!("completion queue disposed");
        Ok(())
    }

    /// The live queue handle, for collaborators that enqueue against it.
    /// Valid only while the pool is started.
    pub fn completion_queue(&self) -> Result<Arc<E::Queue>> {
        match &*self.lifecycle() {
            Lifecycle::Started { cq, .. } => Ok(Arc::clone(cq)),
            _ => Err(DrainError::NotStarted),
        }
    }

    /// Configured pool size.
    #[inline]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of spawned workers; equals the pool size once started.
    pub fn worker_count(&self) -> usize {
        match &*self.lifecycle() {
            Lifecycle::Started { workers, .. } => workers.len(),
            _ => 0,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(&*self.lifecycle(), Lifecycle::Started { .. })
    }

    /// Drain all recorded worker faults.
    pub fn take_faults(&self) -> Vec<WorkerFault> {
        let mut out = Vec::new();
        while let Some(fault) = self.faults.pop() {
            out.push(fault);
        }
        out
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle<E::Queue>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<E: CompletionEngine> Drop for WorkerPool<E> {
    fn drop(&mut self) {
        if let Lifecycle::Started { cq, .. } = &*self.lifecycle() {
            // Workers are detached from here on. Call stop() for an ordered
            // teardown that joins and disposes.
            kwarn!("pool dropped while started; requesting queue shutdown without join");
            cq.request_shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqpool_core::event::CompletionEvent;
    use cqpool_core::queue::Deadline;
    use cqpool_core::tag::CompletionTag;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeEvent {
        tag: CompletionTag,
        payload: u64,
        releases: Arc<AtomicUsize>,
    }

    impl CompletionEvent for FakeEvent {
        fn tag(&self) -> CompletionTag {
            self.tag
        }
    }

    impl Drop for FakeEvent {
        fn drop(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    thread_local! {
        static CALLS: Cell<usize> = const { Cell::new(0) };
    }

    /// Scripted combined-strategy queue: each consumer thread sees
    /// `rounds - 1` OpComplete tags followed by one Shutdown.
    struct ScriptedQueue {
        rounds: usize,
        dispatch_calls: Arc<AtomicUsize>,
        event_dequeues: Arc<AtomicUsize>,
        disposed: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
    }

    impl cqpool_core::queue::CompletionQueue for ScriptedQueue {
        type Event = FakeEvent;

        fn next_with_dispatch(&self) -> Result<CompletionTag> {
            self.dispatch_calls.fetch_add(1, Ordering::SeqCst);
            let n = CALLS.with(|c| {
                let v = c.get() + 1;
                c.set(v);
                v
            });
            if n >= self.rounds {
                Ok(CompletionTag::Shutdown)
            } else {
                Ok(CompletionTag::OpComplete)
            }
        }

        fn next(&self, _deadline: Deadline) -> Result<FakeEvent> {
            self.event_dequeues.fetch_add(1, Ordering::SeqCst);
            Ok(FakeEvent {
                tag: CompletionTag::Shutdown,
                payload: 0,
                releases: Arc::clone(&self.releases),
            })
        }

        fn request_shutdown(&self) {}

        fn dispose(&self) -> Result<()> {
            self.disposed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Clone)]
    struct ScriptedEngine {
        rounds: usize,
        created: Arc<AtomicUsize>,
        dispatch_calls: Arc<AtomicUsize>,
        event_dequeues: Arc<AtomicUsize>,
        disposed: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
    }

    impl ScriptedEngine {
        fn new(rounds: usize) -> Self {
            Self {
                rounds,
                created: Arc::new(AtomicUsize::new(0)),
                dispatch_calls: Arc::new(AtomicUsize::new(0)),
                event_dequeues: Arc::new(AtomicUsize::new(0)),
                disposed: Arc::new(AtomicUsize::new(0)),
                releases: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl CompletionEngine for ScriptedEngine {
        type Queue = ScriptedQueue;

        fn create_queue(&self) -> ScriptedQueue {
            self.created.fetch_add(1, Ordering::SeqCst);
            ScriptedQueue {
                rounds: self.rounds,
                dispatch_calls: Arc::clone(&self.dispatch_calls),
                event_dequeues: Arc::clone(&self.event_dequeues),
                disposed: Arc::clone(&self.disposed),
                releases: Arc::clone(&self.releases),
            }
        }
    }

    /// Handler-strategy queue: pops scripted payloads, then blocks until
    /// shutdown is requested; every consumer gets its own shutdown event.
    struct HandlerQueue {
        payloads: Mutex<VecDeque<u64>>,
        shutdown: AtomicBool,
        releases: Arc<AtomicUsize>,
    }

    impl cqpool_core::queue::CompletionQueue for HandlerQueue {
        type Event = FakeEvent;

        fn next_with_dispatch(&self) -> Result<CompletionTag> {
            unreachable!("handler pools never use the combined strategy")
        }

        fn next(&self, _deadline: Deadline) -> Result<FakeEvent> {
            loop {
                let popped = {
                    let mut payloads = match self.payloads.lock() {
                        Ok(g) => g,
                        Err(p) => p.into_inner(),
                    };
                    payloads.pop_front()
                };
                if let Some(payload) = popped {
                    return Ok(FakeEvent {
                        tag: CompletionTag::OpComplete,
                        payload,
                        releases: Arc::clone(&self.releases),
                    });
                }
                if self.shutdown.load(Ordering::Acquire) {
                    return Ok(FakeEvent {
                        tag: CompletionTag::Shutdown,
                        payload: 0,
                        releases: Arc::clone(&self.releases),
                    });
                }
                thread::park_timeout(Duration::from_millis(1));
            }
        }

        fn request_shutdown(&self) {
            self.shutdown.store(true, Ordering::Release);
        }

        fn dispose(&self) -> Result<()> {
            Ok(())
        }
    }

    struct HandlerEngine {
        payloads: Vec<u64>,
        releases: Arc<AtomicUsize>,
    }

    impl CompletionEngine for HandlerEngine {
        type Queue = HandlerQueue;

        fn create_queue(&self) -> HandlerQueue {
            HandlerQueue {
                payloads: Mutex::new(self.payloads.iter().copied().collect()),
                shutdown: AtomicBool::new(false),
                releases: Arc::clone(&self.releases),
            }
        }
    }

    /// Queue whose dequeue always fails — exercises the fault channel.
    struct FaultyQueue;

    impl cqpool_core::queue::CompletionQueue for FaultyQueue {
        type Event = FakeEvent;

        fn next_with_dispatch(&self) -> Result<CompletionTag> {
            Err(DrainError::QueueShutdown)
        }

        fn next(&self, _deadline: Deadline) -> Result<FakeEvent> {
            Err(DrainError::QueueShutdown)
        }

        fn request_shutdown(&self) {}

        fn dispose(&self) -> Result<()> {
            Ok(())
        }
    }

    struct FaultyEngine;

    impl CompletionEngine for FaultyEngine {
        type Queue = FaultyQueue;

        fn create_queue(&self) -> FaultyQueue {
            FaultyQueue
        }
    }

    #[test]
    fn test_start_spawns_pool_size_workers() {
        let engine = ScriptedEngine::new(1);
        let pool = WorkerPool::new(engine.clone(), PoolConfig::new(3));
        assert_eq!(pool.worker_count(), 0);
        pool.start().unwrap();
        assert_eq!(pool.worker_count(), 3);
        assert!(pool.completion_queue().is_ok());
        assert_eq!(engine.created.load(Ordering::SeqCst), 1);
        pool.stop().unwrap();
        assert_eq!(engine.disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_double_start_rejected_without_mutation() {
        let engine = ScriptedEngine::new(1);
        let pool = WorkerPool::new(engine.clone(), PoolConfig::new(2));
        pool.start().unwrap();
        assert!(matches!(pool.start(), Err(DrainError::AlreadyStarted)));
        assert_eq!(pool.worker_count(), 2);
        assert_eq!(engine.created.load(Ordering::SeqCst), 1);
        pool.stop().unwrap();
    }

    #[test]
    fn test_stop_before_start_fails_fast() {
        let pool = WorkerPool::new(ScriptedEngine::new(1), PoolConfig::new(2));
        assert!(matches!(pool.stop(), Err(DrainError::NotStarted)));
        // Still startable after the rejected stop
        pool.start().unwrap();
        pool.stop().unwrap();
    }

    #[test]
    fn test_stop_is_idempotent_once_stopped() {
        let engine = ScriptedEngine::new(1);
        let pool = WorkerPool::new(engine.clone(), PoolConfig::new(2));
        pool.start().unwrap();
        pool.stop().unwrap();
        pool.stop().unwrap();
        assert_eq!(engine.disposed.load(Ordering::SeqCst), 1);
        assert!(matches!(pool.start(), Err(DrainError::AlreadyStarted)));
    }

    #[test]
    fn test_queue_accessor_only_while_started() {
        let pool = WorkerPool::new(ScriptedEngine::new(1), PoolConfig::new(1));
        assert!(matches!(
            pool.completion_queue(),
            Err(DrainError::NotStarted)
        ));
        pool.start().unwrap();
        assert!(pool.completion_queue().is_ok());
        pool.stop().unwrap();
        assert!(matches!(
            pool.completion_queue(),
            Err(DrainError::NotStarted)
        ));
    }

    #[test]
    fn test_concurrent_start_creates_one_queue() {
        let engine = ScriptedEngine::new(1);
        let pool = WorkerPool::new(engine.clone(), PoolConfig::new(3));
        let outcomes: Vec<Result<()>> = thread::scope(|s| {
            let handles: Vec<_> = (0..2).map(|_| s.spawn(|| pool.start())).collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("starter thread panicked"))
                .collect()
        });
        let ok = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(DrainError::AlreadyStarted))));
        assert_eq!(engine.created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.worker_count(), 3);
        pool.stop().unwrap();
    }

    #[test]
    fn test_each_worker_drains_exact_rounds() {
        // 3 workers, 3 dequeues each (2 ops + shutdown) = 9 total calls
        let engine = ScriptedEngine::new(3);
        let pool = WorkerPool::new(engine.clone(), PoolConfig::new(3));
        pool.start().unwrap();
        pool.stop().unwrap();
        assert_eq!(engine.dispatch_calls.load(Ordering::SeqCst), 9);
        assert_eq!(engine.disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_combined_strategy_never_materializes_events() {
        let engine = ScriptedEngine::new(4);
        let pool = WorkerPool::new(engine.clone(), PoolConfig::new(2));
        pool.start().unwrap();
        pool.stop().unwrap();
        assert_eq!(engine.event_dequeues.load(Ordering::SeqCst), 0);
        assert_eq!(engine.releases.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_sees_every_event_then_release() {
        let releases = Arc::new(AtomicUsize::new(0));
        let engine = HandlerEngine {
            payloads: vec![1, 2, 3],
            releases: Arc::clone(&releases),
        };
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_handler = Arc::clone(&seen);
        let pool = WorkerPool::with_handler(engine, PoolConfig::new(1), move |event| {
            seen_in_handler
                .lock()
                .unwrap()
                .push((event.tag(), event.payload));
        });
        pool.start().unwrap();
        pool.stop().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            &seen[..3],
            &[
                (CompletionTag::OpComplete, 1),
                (CompletionTag::OpComplete, 2),
                (CompletionTag::OpComplete, 3),
            ]
        );
        // Process-then-check: the shutdown event is still handled
        assert_eq!(seen.last(), Some(&(CompletionTag::Shutdown, 0)));
        // Every dequeued event released exactly once (3 ops + 1 shutdown)
        assert_eq!(releases.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_panicking_handler_still_releases_event() {
        let releases = Arc::new(AtomicUsize::new(0));
        let engine = HandlerEngine {
            payloads: vec![7],
            releases: Arc::clone(&releases),
        };
        let pool = WorkerPool::with_handler(engine, PoolConfig::new(1), |event| {
            if event.payload == 7 {
                panic!("handler rejects payload 7");
            }
        });
        pool.start().unwrap();
        // The worker panicked; join surfaces it from stop()
        assert!(matches!(pool.stop(), Err(DrainError::WorkerPanic(0))));
        // The unwind still dropped (released) the event exactly once
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_worker_faults_land_on_the_channel() {
        let pool = WorkerPool::new(FaultyEngine, PoolConfig::new(2));
        pool.start().unwrap();
        pool.stop().unwrap();
        let faults = pool.take_faults();
        assert_eq!(faults.len(), 2);
        for fault in faults {
            assert!(matches!(fault.error, DrainError::QueueShutdown));
        }
    }

    #[test]
    fn test_pool_config_clamps_to_one() {
        assert_eq!(PoolConfig::new(0).pool_size, 1);
        assert_eq!(PoolConfig::new(5).pool_size, 5);
        let auto = PoolConfig::default().pool_size;
        assert!((2..=8).contains(&auto));
    }
}
