//! Completion-event abstraction.
//!
//! An event is a scoped, single-use handle produced by one dequeue call.
//! Release is `Drop`: it runs exactly once on every exit path, including
//! unwinding out of a panicking handler. Engines that must return storage
//! to the underlying queue (leaked events starve it) do so in their event
//! type's `Drop` impl.

use crate::tag::CompletionTag;

/// One unit of completed asynchronous work, tagged with a completion type.
///
/// **Contract:**
/// - Single-use: produced by exactly one dequeue call, never re-delivered.
/// - Released exactly once, via `Drop`.
/// - `tag()` is stable for the lifetime of the event.
pub trait CompletionEvent: Send {
    /// The completion-type tag this event carries.
    fn tag(&self) -> CompletionTag;
}
