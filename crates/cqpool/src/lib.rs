//! # cqpool - Completion-Queue Worker Pool
//!
//! A fixed-size pool of OS threads polling on the same completion queue.
//!
//! The pool owns the queue's lifecycle: `start()` creates it once and spawns
//! N workers against it; `stop()` signals queue shutdown, joins every worker,
//! then disposes the queue. Workers drain cooperatively — each one polls
//! until it observes the shutdown sentinel, so the queue engine must deliver
//! one shutdown result per blocked consumer.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cqpool::{PoolConfig, WorkerPool};
//! use cqpool_channel::ChannelEngine;
//!
//! let pool = WorkerPool::new(ChannelEngine::new(1024), PoolConfig::new(4));
//! pool.start()?;
//!
//! // Collaborators enqueue against the live queue handle
//! let cq = pool.completion_queue()?;
//! cq.post(1)?;
//!
//! pool.stop()?;
//! ```
//!
//! ## Drain strategies
//!
//! One loop, two modes (see [`drain::DrainMode`]):
//! - **Dispatch**: combined dequeue+dispatch, tag-only, never materializes
//!   an event. Used when no handler is supplied.
//! - **Handler**: blocking dequeue with infinite deadline, event passed to
//!   the supplied handler, released on scope exit — including when the
//!   handler panics.

pub mod drain;
pub mod pool;

pub use drain::{DrainMode, EventHandler};
pub use pool::{PoolConfig, WorkerFault, WorkerPool};

pub use cqpool_core::error::{DrainError, Result};
pub use cqpool_core::event::CompletionEvent;
pub use cqpool_core::queue::{CompletionEngine, CompletionQueue, Deadline};
pub use cqpool_core::tag::CompletionTag;
