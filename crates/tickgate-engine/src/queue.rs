//! Bounded multi-producer command queue.
//!
//! Producers on any thread call [`CommandQueue::submit`]; the executor
//! calls [`CommandQueue::drain`] once per tick. Acceptance order is the
//! order in which submits take the queue lock, and the queue stamps each
//! command with a [`CommandId`] under that same lock, so identifiers
//! increase in FIFO order.
//!
//! The queue never blocks a producer on capacity and never drops an
//! accepted command: a full queue rejects with
//! [`BridgeError::QueueFull`], and commands beyond the executor's
//! per-tick budget stay queued for the next tick.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::debug;

use tickgate_core::{BridgeError, Command, CommandId, CommandPayload, Reply, TickId};

use crate::future::{completion_pair, Completer, ResultFuture};

/// A queued command with the completer for its future.
#[derive(Debug)]
pub struct PendingCommand {
    command: Command,
    completer: Completer<Reply>,
}

impl PendingCommand {
    /// The queued command.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Split into the command and its completer.
    pub fn into_parts(self) -> (Command, Completer<Reply>) {
        (self.command, self.completer)
    }
}

struct QueueState {
    entries: VecDeque<PendingCommand>,
    next_id: u64,
    closed: bool,
}

/// Bounded FIFO of commands awaiting execution.
pub struct CommandQueue {
    state: Mutex<QueueState>,
    capacity: usize,
}

impl CommandQueue {
    /// Create a queue holding at most `capacity` commands.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be at least 1");
        Self {
            state: Mutex::new(QueueState {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                next_id: 0,
                closed: false,
            }),
            capacity,
        }
    }

    /// Accept a command and return the future for its result.
    ///
    /// `submitted_at` is the executor's tick as the producer last saw it.
    /// Fails with [`BridgeError::QueueFull`] at capacity and
    /// [`BridgeError::Shutdown`] after [`close()`](Self::close); in both
    /// cases nothing is enqueued.
    pub fn submit(
        &self,
        payload: CommandPayload,
        submitted_at: TickId,
    ) -> Result<ResultFuture<Reply>, BridgeError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BridgeError::Shutdown);
        }
        if state.entries.len() >= self.capacity {
            return Err(BridgeError::QueueFull);
        }

        let id = CommandId(state.next_id);
        state.next_id += 1;
        let (completer, future) = completion_pair(id);
        state.entries.push_back(PendingCommand {
            command: Command {
                id,
                payload,
                submitted_at,
            },
            completer,
        });
        Ok(future)
    }

    /// Remove up to `max` commands from the front, in acceptance order.
    pub fn drain(&self, max: usize) -> Vec<PendingCommand> {
        let mut state = self.state.lock();
        let n = max.min(state.entries.len());
        state.entries.drain(..n).collect()
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Maximum number of queued commands.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether [`close()`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Stop accepting commands and fail everything still queued with
    /// [`BridgeError::Shutdown`]. Returns the number of cancelled commands.
    pub fn close(&self) -> usize {
        let cancelled: Vec<PendingCommand> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.entries.drain(..).collect()
        };

        let count = cancelled.len();
        for pending in cancelled {
            let (_, mut completer) = pending.into_parts();
            let _ = completer.fail(BridgeError::Shutdown);
        }
        if count > 0 {
            debug!(count, "cancelled queued commands on close");
        }
        count
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
