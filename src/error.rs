//! Engine error types.

use thiserror::Error;

/// Errors from transition-program compilation and invocation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid transition program: {reason}")]
    InvalidProgram { reason: String },

    #[error("transition program failed: {reason}")]
    ProgramFailed { reason: String },
}
