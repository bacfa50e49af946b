//! # cqpool-core — Trait definitions for cqpool
//!
//! This crate defines the trait boundary between the worker pool and the
//! completion-queue engine it drains. The pool owns the queue's lifecycle
//! (create once, shut down, dispose); the engine owns everything about what
//! a completion event *is* and how it is retrieved.
//!
//! ## Design principle
//!
//! > "Program to the interface. The pool never depends on a concrete
//! >  queue — swapping engines is a type-parameter change."
//!
//! The pool in the `cqpool` crate is generic over [`queue::CompletionEngine`];
//! the default in-process engine lives in `cqpool-channel`, and tests use
//! scripted fakes implementing the same traits.

pub mod env;
pub mod error;
pub mod event;
pub mod kprint;
pub mod queue;
pub mod tag;
