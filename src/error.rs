//! Error types for Sluice.

use thiserror::Error;

use crate::state::State;

/// Result type alias using Sluice's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Sluice operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The engine could not allocate a new graph.
    #[error("graph allocation failed: {0}")]
    Allocation(String),

    /// A launch description failed the structural pre-flight check.
    #[error("invalid launch description: {0}")]
    Validation(String),

    /// The engine's launch parser rejected a description. Carries the
    /// parser diagnostic verbatim.
    #[error("parse error: {0}")]
    Parse(String),

    /// A requested state transition was rejected or failed.
    #[error("state change to {target} failed: {reason}")]
    StateChange {
        /// The state that was requested.
        target: State,
        /// Engine-reported reason.
        reason: String,
    },
}
