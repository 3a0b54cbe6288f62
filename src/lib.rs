//! # rsfsm
//!
//! A finite state machine engine.
//!
//! This crate provides:
//! - Programmatic machine construction (states and transition rules in code)
//! - Declarative machine loading from JSON documents
//! - Transition logic compiled from source text
//! - Mealy-style stepping via [`Machine::next`]
//! - Synchronous transition-event broadcasting

pub mod channel;
pub mod document;
pub mod error;
pub mod machine;
pub mod program;
pub mod store;

pub use channel::{EventChannel, Subscription, TransitionEvent};
pub use document::{LoadReport, LoadStatus};
pub use error::EngineError;
pub use machine::{Machine, StepResult, NO_STATE};
pub use program::TransitionProgram;
pub use store::{StateStore, TransitionOutcome, TransitionRule};
