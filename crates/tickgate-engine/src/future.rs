//! Single-assignment result slots linking a producer to the executor.
//!
//! [`completion_pair`] creates a [`Completer`] (kept with the queued
//! command, used once by the executor) and a [`ResultFuture`] (handed
//! back to the producer). The pair communicates over a one-slot
//! crossbeam channel, so the producer's wait is a plain
//! `recv_timeout` and no lock is shared with the tick thread.
//!
//! The first `fulfill` or `fail` wins. Later attempts are rejected with
//! [`CompletionError::AlreadyCompleted`] and logged; they never
//! overwrite the stored outcome. A producer that timed out has dropped
//! its receiver, and the executor's late result is discarded.

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use thiserror::Error;
use tracing::{trace, warn};

use tickgate_core::{BridgeError, CommandId};

type Outcome<T> = Result<T, BridgeError>;

/// Terminal state of a completer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FutureState {
    /// No outcome yet.
    Pending,
    /// A value was delivered.
    Fulfilled,
    /// An error was delivered.
    Failed,
}

impl fmt::Display for FutureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Fulfilled => f.write_str("fulfilled"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// A second completion attempt on an already-completed future.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// The future already holds an outcome.
    #[error("command {id} already {state}")]
    AlreadyCompleted {
        /// The command whose future was completed twice.
        id: CommandId,
        /// The state set by the first completion.
        state: FutureState,
    },
}

/// Create a linked completer and future for command `id`.
pub fn completion_pair<T>(id: CommandId) -> (Completer<T>, ResultFuture<T>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (
        Completer {
            id,
            tx: Some(tx),
            state: FutureState::Pending,
        },
        ResultFuture {
            id,
            rx,
            taken: false,
        },
    )
}

// ── Completer ──────────────────────────────────────────────────

/// The executor's half: delivers exactly one outcome.
///
/// Dropping a completer that was never used fails its future with
/// [`BridgeError::Internal`], so a producer never waits on a command
/// that can no longer complete.
pub struct Completer<T> {
    id: CommandId,
    tx: Option<Sender<Outcome<T>>>,
    state: FutureState,
}

impl<T> Completer<T> {
    /// The command this completer belongs to.
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> FutureState {
        self.state
    }

    /// Deliver a value.
    pub fn fulfill(&mut self, value: T) -> Result<(), CompletionError> {
        self.complete(Ok(value))
    }

    /// Deliver an error.
    pub fn fail(&mut self, error: BridgeError) -> Result<(), CompletionError> {
        self.complete(Err(error))
    }

    /// Deliver `outcome`, whichever variant it is.
    pub fn complete(&mut self, outcome: Outcome<T>) -> Result<(), CompletionError> {
        let Some(tx) = self.tx.take() else {
            warn!(
                command = %self.id,
                state = %self.state,
                "ignoring second completion of command"
            );
            return Err(CompletionError::AlreadyCompleted {
                id: self.id,
                state: self.state,
            });
        };

        self.state = if outcome.is_ok() {
            FutureState::Fulfilled
        } else {
            FutureState::Failed
        };

        if tx.send(outcome).is_err() {
            // Producer gave up (timeout or dropped future).
            trace!(command = %self.id, "result discarded, producer no longer waiting");
        }
        Ok(())
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!(command = %self.id, "command dropped without a result");
            let _ = tx.send(Err(BridgeError::internal("command dropped without a result")));
        }
    }
}

impl<T> fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

// ── ResultFuture ───────────────────────────────────────────────

/// The producer's half: a handle to wait on one command's outcome.
pub struct ResultFuture<T> {
    id: CommandId,
    rx: Receiver<Outcome<T>>,
    /// Set once `try_get` has handed out the outcome.
    taken: bool,
}

impl<T> ResultFuture<T> {
    /// The command this future belongs to.
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Whether an outcome is available without blocking. False again
    /// once [`try_get`](Self::try_get) has taken it.
    pub fn is_ready(&self) -> bool {
        !self.taken && !self.rx.is_empty()
    }

    /// Block up to `timeout` for the outcome.
    ///
    /// Returns [`BridgeError::Timeout`] if nothing arrives in time. The
    /// future is consumed either way; the command may still run on a
    /// later tick and its result is then discarded.
    pub fn wait(self, timeout: Duration) -> Result<T, BridgeError> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(BridgeError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(abandoned()),
        }
    }

    /// Block until the outcome arrives.
    ///
    /// Only safe when something is guaranteed to drive the executor,
    /// e.g. a running realtime bridge.
    pub fn wait_blocking(self) -> Result<T, BridgeError> {
        self.rx.recv().unwrap_or_else(|_| Err(abandoned()))
    }

    /// Take the outcome if it is available, without blocking.
    ///
    /// Returns `None` while the command is pending, and on every call
    /// after the one that returned the outcome.
    pub fn try_get(&mut self) -> Option<Result<T, BridgeError>> {
        if self.taken {
            return None;
        }
        match self.rx.try_recv() {
            Ok(outcome) => {
                self.taken = true;
                Some(outcome)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.taken = true;
                Some(Err(abandoned()))
            }
        }
    }
}

impl<T> fmt::Debug for ResultFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultFuture")
            .field("id", &self.id)
            .field("ready", &self.is_ready())
            .finish()
    }
}

fn abandoned() -> BridgeError {
    BridgeError::internal("completer dropped without a result")
}
