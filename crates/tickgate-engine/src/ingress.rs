//! Producer-side submission: synchronous validation, then enqueue.
//!
//! A [`Submitter`] is the only thing request handlers need. It is cheap
//! to clone and shares nothing with the tick thread except the
//! [`CommandQueue`] and a few atomics. Malformed requests and writes to
//! statically read-only memory are rejected here, before they can occupy
//! queue capacity; everything that depends on session state is decided
//! later by the executor.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use tickgate_core::{
    BatchOp, BridgeError, ChannelId, CommandPayload, Hold, Reply, TickId, MAX_BATCH_OPS,
    SAVE_SLOT_COUNT,
};

use crate::future::ResultFuture;
use crate::guard::{check_range, RegionTable};
use crate::metrics::{BridgeMetrics, MetricsRecorder};
use crate::queue::CommandQueue;

/// State published by the executor for producers to read.
#[derive(Debug)]
pub(crate) struct SharedStatus {
    pub tick: AtomicU64,
    pub consumer_alive: AtomicBool,
    pub metrics: MetricsRecorder,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self {
            tick: AtomicU64::new(0),
            consumer_alive: AtomicBool::new(true),
            metrics: MetricsRecorder::default(),
        }
    }

    pub fn current_tick(&self) -> TickId {
        TickId(self.tick.load(Ordering::Acquire))
    }
}

/// Bridge health as seen by a producer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeStatus {
    /// Commands waiting in the queue.
    pub queue_depth: usize,
    /// Queue capacity.
    pub queue_capacity: usize,
    /// The executor's tick as last published.
    pub current_tick: TickId,
    /// Whether something is still draining the queue.
    pub consumer_alive: bool,
    /// Counters.
    pub metrics: BridgeMetrics,
}

/// Cloneable producer handle.
#[derive(Clone, Debug)]
pub struct Submitter {
    queue: Arc<CommandQueue>,
    regions: Arc<RegionTable>,
    shared: Arc<SharedStatus>,
    channel_count: u8,
}

impl Submitter {
    pub(crate) fn new(
        queue: Arc<CommandQueue>,
        regions: Arc<RegionTable>,
        shared: Arc<SharedStatus>,
        channel_count: u8,
    ) -> Self {
        Self {
            queue,
            regions,
            shared,
            channel_count,
        }
    }

    /// Validate and enqueue a command.
    ///
    /// Returns immediately. Errors from validation, a full queue, or a
    /// closed bridge mean the command was not enqueued.
    pub fn submit(&self, payload: CommandPayload) -> Result<ResultFuture<Reply>, BridgeError> {
        if let Err(err) = self.validate(&payload) {
            self.shared.metrics.record_invalid();
            debug!(kind = %payload.kind(), error = %err, "rejected command at submit");
            return Err(err);
        }

        let kind = payload.kind();
        match self.queue.submit(payload, self.shared.current_tick()) {
            Ok(future) => Ok(future),
            Err(BridgeError::QueueFull) => {
                self.shared.metrics.record_queue_full();
                debug!(%kind, capacity = self.queue.capacity(), "command queue full");
                Err(BridgeError::QueueFull)
            }
            Err(err) => Err(err),
        }
    }

    /// Current queue depth, tick, liveness and counters.
    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            queue_depth: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            current_tick: self.shared.current_tick(),
            consumer_alive: self.shared.consumer_alive.load(Ordering::Acquire),
            metrics: self.shared.metrics.snapshot(),
        }
    }

    /// Checks that need no session state.
    pub fn validate(&self, payload: &CommandPayload) -> Result<(), BridgeError> {
        match payload {
            CommandPayload::ReadByte { .. } => Ok(()),
            CommandPayload::ReadRange { start, len } => check_range(*start, *len),
            CommandPayload::WriteByte { address, .. } => self.regions.check_static(*address, 1),
            CommandPayload::WriteRange { start, data } => {
                self.regions.check_static(*start, data.len())
            }
            CommandPayload::Batch { ops } => {
                if ops.is_empty() {
                    return Err(BridgeError::invalid("batch must contain at least one operation"));
                }
                if ops.len() > MAX_BATCH_OPS {
                    return Err(BridgeError::invalid(format!(
                        "batch of {} operations exceeds maximum of {MAX_BATCH_OPS}",
                        ops.len()
                    )));
                }
                ops.iter().try_for_each(|op| self.validate_op(op))
            }
            CommandPayload::SetOverlay { channel, hold, .. }
            | CommandPayload::SetState { channel, hold, .. } => {
                self.check_channel(*channel)?;
                hold.map_or(Ok(()), Hold::validate)
            }
            CommandPayload::ClearOverlay { channel, .. } => self.check_channel(*channel),
            CommandPayload::SaveState { slot } | CommandPayload::LoadState { slot } => {
                check_slot(*slot)
            }
            CommandPayload::InputStatus | CommandPayload::Control(_) | CommandPayload::Status => {
                Ok(())
            }
        }
    }

    fn validate_op(&self, op: &BatchOp) -> Result<(), BridgeError> {
        match op {
            BatchOp::Read { start, len } => check_range(*start, *len),
            BatchOp::Write { start, data } => self.regions.check_static(*start, data.len()),
        }
    }

    fn check_channel(&self, channel: ChannelId) -> Result<(), BridgeError> {
        if channel.0 < self.channel_count {
            Ok(())
        } else {
            Err(BridgeError::invalid(format!(
                "channel {channel} out of range (have {} channels)",
                self.channel_count
            )))
        }
    }
}

fn check_slot(slot: u8) -> Result<(), BridgeError> {
    if slot < SAVE_SLOT_COUNT {
        Ok(())
    } else {
        Err(BridgeError::invalid(format!(
            "save slot {slot} out of range (0..={})",
            SAVE_SLOT_COUNT - 1
        )))
    }
}
