//! Error types for the Tickgate command bridge.
//!
//! [`BridgeError`] is the single taxonomy every producer sees, whether a
//! command was rejected synchronously at submission, failed inside the
//! executor, or was abandoned by the producer's own timeout.
//! [`SimulationError`] is what the simulation collaborator reports back
//! to the executor.

use thiserror::Error;

use crate::id::Address;

/// Errors observable by a producer of commands.
///
/// `QueueFull`, `InvalidArgument`, and a `PermissionDenied` for a
/// statically read-only region are returned from `submit` without the
/// command entering the queue. `PreconditionUnmet`, `Internal`, and a
/// `PermissionDenied` that depends on session state arrive through the
/// command's result future. `Timeout` is produced by the producer's own
/// wait.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The command queue is at capacity. Retry later.
    #[error("command queue full")]
    QueueFull,
    /// The request is malformed: bad channel, bad hold duration, range
    /// out of bounds, oversized batch, unknown button name.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// A write targeted an address whose region does not permit it.
    #[error("permission denied: address {address} is not writable")]
    PermissionDenied {
        /// The first offending address.
        address: Address,
    },
    /// The session is not in a state where the command can run.
    #[error("precondition unmet: {reason}")]
    PreconditionUnmet {
        /// What the session is missing.
        reason: String,
    },
    /// The producer gave up waiting before a result arrived.
    ///
    /// The command may still execute on a later tick.
    #[error("timed out waiting for command result")]
    Timeout,
    /// A handler failed unexpectedly (including a caught panic).
    #[error("internal error: {reason}")]
    Internal {
        /// Description of the failure.
        reason: String,
    },
    /// The bridge has shut down; the command was never executed.
    #[error("bridge is shut down")]
    Shutdown,
}

impl BridgeError {
    /// Shorthand for [`BridgeError::InvalidArgument`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`BridgeError::PreconditionUnmet`].
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::PreconditionUnmet {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`BridgeError::Internal`].
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Whether a retry of the same command could succeed without the
    /// caller changing anything.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::QueueFull | Self::Timeout)
    }
}

/// Errors reported by a [`Simulation`](crate::Simulation) implementation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// Advancing one step failed. The executor logs this and keeps ticking.
    #[error("step failed: {reason}")]
    StepFailed {
        /// Description of the failure.
        reason: String,
    },
    /// No snapshot is stored in the requested save slot.
    #[error("save slot {slot} is empty")]
    EmptySlot {
        /// The requested slot.
        slot: u8,
    },
    /// The simulation does not implement the requested capability.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// Name of the missing capability.
        operation: &'static str,
    },
    /// Any other failure inside the simulation.
    #[error("{reason}")]
    Other {
        /// Description of the failure.
        reason: String,
    },
}

impl From<SimulationError> for BridgeError {
    fn from(err: SimulationError) -> Self {
        match err {
            SimulationError::EmptySlot { .. } => BridgeError::precondition(err.to_string()),
            SimulationError::Unsupported { .. } => BridgeError::precondition(err.to_string()),
            SimulationError::StepFailed { .. } | SimulationError::Other { .. } => {
                BridgeError::internal(err.to_string())
            }
        }
    }
}
