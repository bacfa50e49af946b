//! Completion-type tags.

use core::fmt;

/// Kind of result a dequeue operation reported.
///
/// The engine may define further kinds; the pool only ever inspects whether
/// a tag is the shutdown sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompletionTag {
    /// A unit of asynchronous work completed.
    OpComplete = 0,

    /// A deadline-bounded dequeue expired before an event arrived.
    Timeout = 1,

    /// The queue is shutting down; the consumer must stop polling.
    ///
    /// Delivered once to every concurrently blocked consumer and to every
    /// later dequeue call.
    Shutdown = 2,
}

impl CompletionTag {
    /// True for the shutdown sentinel — the worker loop's only exit tag.
    #[inline]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, CompletionTag::Shutdown)
    }
}

impl From<u8> for CompletionTag {
    fn from(v: u8) -> Self {
        match v {
            0 => CompletionTag::OpComplete,
            1 => CompletionTag::Timeout,
            2 => CompletionTag::Shutdown,
            _ => CompletionTag::OpComplete, // Default for invalid values
        }
    }
}

impl From<CompletionTag> for u8 {
    fn from(tag: CompletionTag) -> u8 {
        tag as u8
    }
}

impl fmt::Display for CompletionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionTag::OpComplete => write!(f, "OP_COMPLETE"),
            CompletionTag::Timeout => write!(f, "TIMEOUT"),
            CompletionTag::Shutdown => write!(f, "SHUTDOWN"),
        }
    }
}
