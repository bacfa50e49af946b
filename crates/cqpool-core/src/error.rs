//! cqpool error types.

use std::fmt;

#[derive(Debug)]
pub enum DrainError {
    /// start() called when the queue already exists (or after stop()).
    AlreadyStarted,
    /// stop() or an accessor called before start().
    NotStarted,
    /// The queue cannot accept another event (bounded capacity reached).
    QueueFull,
    /// An event was posted after shutdown was requested.
    QueueShutdown,
    /// A worker thread panicked; observed at join time.
    WorkerPanic(usize),
    /// dispose() called while dequeued events are still unreleased.
    DisposeFailed { outstanding: usize },
}

impl fmt::Display for DrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "pool already started"),
            Self::NotStarted => write!(f, "pool not started"),
            Self::QueueFull => write!(f, "completion queue full"),
            Self::QueueShutdown => write!(f, "completion queue shut down"),
            Self::WorkerPanic(i) => write!(f, "worker {} panicked", i),
            Self::DisposeFailed { outstanding } => {
                write!(f, "dispose with {} events outstanding", outstanding)
            }
        }
    }
}

impl std::error::Error for DrainError {}

pub type Result<T> = std::result::Result<T, DrainError>;
