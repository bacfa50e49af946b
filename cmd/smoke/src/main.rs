//! cqpool End-to-End Smoke Test
//!
//! Exercises the full stack over the in-process channel engine:
//!   Part A — Lifecycle: start/stop state machine, accessor, typed errors
//!   Part B — Combined strategy: dequeue+dispatch drain
//!   Part C — Handler strategy: event delivery and release accounting
//!   Part D — Channel queue edges: capacity, shutdown, timeout
//!
//! Run: ./target/release/cqpool-smoke

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cqpool::{CompletionEvent, CompletionQueue, CompletionTag, Deadline, DrainError};
use cqpool::{PoolConfig, WorkerPool};
use cqpool_channel::{ChannelEngine, ChannelEvent, ChannelQueue};

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        self.total += 1;
        if ok {
            self.passed += 1;
            println!("  [{:2}] {:<52} PASS", self.total, name);
        } else {
            self.failed += 1;
            println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
        }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

// ════════════════════════════════════════════════════════════
// Part A: Lifecycle
// ════════════════════════════════════════════════════════════

fn test_lifecycle(t: &mut TestRunner) {
    t.section("Part A: Lifecycle state machine");

    let pool = WorkerPool::new(ChannelEngine::default(), PoolConfig::new(3));

    t.check(
        "stop() before start() -> NotStarted",
        matches!(pool.stop(), Err(DrainError::NotStarted)),
        "expected NotStarted",
    );
    t.check(
        "accessor before start() -> NotStarted",
        matches!(pool.completion_queue(), Err(DrainError::NotStarted)),
        "expected NotStarted",
    );

    t.check("start()", pool.start().is_ok(), "start failed");
    t.check(
        "worker count == pool size",
        pool.worker_count() == 3,
        &format!("got {}", pool.worker_count()),
    );
    t.check(
        "queue handle available",
        pool.completion_queue().is_ok(),
        "accessor failed",
    );
    t.check(
        "second start() -> AlreadyStarted",
        matches!(pool.start(), Err(DrainError::AlreadyStarted)),
        "expected AlreadyStarted",
    );
    t.check(
        "worker count unchanged after rejected start",
        pool.worker_count() == 3,
        &format!("got {}", pool.worker_count()),
    );

    t.check("stop()", pool.stop().is_ok(), "stop failed");
    t.check("stop() again is a no-op", pool.stop().is_ok(), "second stop failed");
    t.check(
        "start() after stop() -> AlreadyStarted",
        matches!(pool.start(), Err(DrainError::AlreadyStarted)),
        "expected AlreadyStarted",
    );
}

// ════════════════════════════════════════════════════════════
// Part B: Combined strategy
// ════════════════════════════════════════════════════════════

fn test_combined(t: &mut TestRunner) {
    t.section("Part B: Combined dequeue+dispatch strategy");

    let pool = WorkerPool::new(ChannelEngine::new(256), PoolConfig::new(3));
    pool.start().expect("start");
    let cq = pool.completion_queue().expect("queue handle");

    let dispatched = Arc::new(AtomicUsize::new(0));
    let mut posted = 0usize;
    for i in 0..100u64 {
        let dispatched = Arc::clone(&dispatched);
        if cq
            .post_with_dispatch(i, move || {
                dispatched.fetch_add(1, Ordering::SeqCst);
            })
            .is_ok()
        {
            posted += 1;
        }
    }
    t.check("posted 100 dispatch events", posted == 100, &format!("posted {}", posted));

    drop(cq);
    t.check("stop() drains then joins", pool.stop().is_ok(), "stop failed");
    let n = dispatched.load(Ordering::SeqCst);
    t.check("all events dispatched exactly once", n == 100, &format!("got {}", n));
}

// ════════════════════════════════════════════════════════════
// Part C: Handler strategy
// ════════════════════════════════════════════════════════════

fn test_handler(t: &mut TestRunner) {
    t.section("Part C: Handler strategy");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let shutdowns = Arc::new(AtomicUsize::new(0));

    let seen_in_handler = Arc::clone(&seen);
    let shutdowns_in_handler = Arc::clone(&shutdowns);
    let pool = WorkerPool::with_handler(
        ChannelEngine::new(256),
        PoolConfig::new(2),
        move |event: &ChannelEvent| match event.tag() {
            CompletionTag::Shutdown => {
                shutdowns_in_handler.fetch_add(1, Ordering::SeqCst);
            }
            _ => seen_in_handler.lock().unwrap().push(event.payload()),
        },
    );
    pool.start().expect("start");
    let cq = pool.completion_queue().expect("queue handle");

    for i in 1..=50u64 {
        cq.post(i).expect("post");
    }
    drop(cq);
    pool.stop().expect("stop");

    let mut payloads = seen.lock().unwrap().clone();
    payloads.sort_unstable();
    t.check(
        "handler saw all 50 payloads",
        payloads == (1..=50).collect::<Vec<u64>>(),
        &format!("saw {}", payloads.len()),
    );
    let sd = shutdowns.load(Ordering::SeqCst);
    t.check(
        "one shutdown event delivered per worker",
        sd == 2,
        &format!("got {}", sd),
    );
}

// ════════════════════════════════════════════════════════════
// Part D: Channel queue edges
// ════════════════════════════════════════════════════════════

fn test_queue_edges(t: &mut TestRunner) {
    t.section("Part D: Channel queue edges");

    let cq = ChannelQueue::with_capacity(2);
    t.check("post within capacity", cq.post(1).is_ok() && cq.post(2).is_ok(), "post failed");
    t.check(
        "post over capacity -> QueueFull",
        matches!(cq.post(3), Err(DrainError::QueueFull)),
        "expected QueueFull",
    );

    let first = cq.next(Deadline::Infinite).expect("dequeue");
    t.check(
        "dequeue returns first event",
        first.tag() == CompletionTag::OpComplete && first.payload() == 1,
        "wrong event",
    );
    t.check(
        "dispose with live event -> DisposeFailed",
        matches!(cq.dispose(), Err(DrainError::DisposeFailed { outstanding: 1 })),
        "expected DisposeFailed",
    );
    drop(first);

    cq.request_shutdown();
    t.check(
        "post after shutdown -> QueueShutdown",
        matches!(cq.post(4), Err(DrainError::QueueShutdown)),
        "expected QueueShutdown",
    );
    let pending = cq.next(Deadline::Infinite).expect("dequeue");
    t.check(
        "pending event drained before sentinel",
        pending.payload() == 2,
        "wrong order",
    );
    let sentinel = cq.next(Deadline::Infinite).expect("dequeue");
    t.check(
        "sentinel after drain",
        sentinel.tag().is_shutdown(),
        "expected shutdown tag",
    );
    drop(pending);
    drop(sentinel);
    t.check("dispose once quiesced", cq.dispose().is_ok(), "dispose failed");

    let empty = ChannelQueue::with_capacity(2);
    let timed = empty
        .next(Deadline::After(Duration::from_millis(10)))
        .expect("dequeue");
    t.check(
        "bounded dequeue on empty queue -> Timeout tag",
        timed.tag() == CompletionTag::Timeout,
        "expected Timeout",
    );
}

// ════════════════════════════════════════════════════════════

fn main() {
    println!("=== cqpool End-to-End Smoke Test ===");
    cqpool_core::kprint::init();

    let mut t = TestRunner::new();

    test_lifecycle(&mut t);
    test_combined(&mut t);
    test_handler(&mut t);
    test_queue_edges(&mut t);

    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
