//! Command, payload, and reply types for the command bridge.

use std::fmt;

use crate::buttons::Buttons;
use crate::error::BridgeError;
use crate::id::{Address, ChannelId, CommandId, TickId};

/// Largest number of operations a single [`CommandPayload::Batch`] may carry.
pub const MAX_BATCH_OPS: usize = 100;

/// Number of save-state slots; valid slots are `0..SAVE_SLOT_COUNT`.
pub const SAVE_SLOT_COUNT: u8 = 10;

/// A request accepted by the command queue.
///
/// Immutable once created. The queue owns it until the executor drains
/// it; the executor then owns it for the duration of its handler.
///
/// # Examples
///
/// ```
/// use tickgate_core::{Address, Command, CommandId, CommandPayload, TickId};
///
/// let cmd = Command {
///     id: CommandId(7),
///     payload: CommandPayload::ReadByte { address: Address(0x0300) },
///     submitted_at: TickId(100),
/// };
/// assert_eq!(cmd.payload.kind().name(), "read_state");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    /// Identifier stamped by the queue at acceptance.
    pub id: CommandId,
    /// The operation to perform.
    pub payload: CommandPayload,
    /// The executor's tick when the command was accepted.
    pub submitted_at: TickId,
}

/// How long an overlay or forced state should stay applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hold {
    /// A whole number of ticks. Zero is rejected.
    Ticks(u64),
    /// A wall-clock duration, converted with
    /// [`ms_to_ticks`](crate::ms_to_ticks) at the configured rate.
    /// Negative values are rejected.
    Millis(i64),
}

impl Hold {
    /// Check that the hold describes a non-empty duration.
    pub fn validate(self) -> Result<(), BridgeError> {
        match self {
            Hold::Ticks(0) => Err(BridgeError::invalid("hold must be at least one tick")),
            Hold::Millis(ms) if ms < 0 => Err(BridgeError::invalid(format!(
                "hold duration must not be negative, got {ms} ms"
            ))),
            _ => Ok(()),
        }
    }
}

/// Pause or resume the simulation's stepping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlAction {
    /// Stop stepping. Commands keep executing every tick.
    Pause,
    /// Resume stepping.
    Resume,
}

/// One operation inside a [`CommandPayload::Batch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    /// Read `len` bytes starting at `start`.
    Read {
        /// First address.
        start: Address,
        /// Byte count.
        len: usize,
    },
    /// Write `data` starting at `start`.
    Write {
        /// First address.
        start: Address,
        /// Bytes to write.
        data: Vec<u8>,
    },
}

/// The closed set of operations a producer may request.
///
/// The executor dispatches on this with an exhaustive `match`, so a new
/// variant cannot be added without a handler.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandPayload {
    /// Read one byte.
    ReadByte {
        /// The address to read.
        address: Address,
    },
    /// Read a contiguous range of bytes.
    ReadRange {
        /// First address.
        start: Address,
        /// Byte count, `1..=4096`.
        len: usize,
    },
    /// Write one byte, subject to region permissions.
    WriteByte {
        /// The address to write.
        address: Address,
        /// The new value.
        value: u8,
    },
    /// Write a contiguous range. Every address is checked before the
    /// first byte is written.
    WriteRange {
        /// First address.
        start: Address,
        /// Bytes to write, `1..=4096` of them.
        data: Vec<u8>,
    },
    /// Several reads and writes executed in one tick, in order.
    Batch {
        /// At most [`MAX_BATCH_OPS`] operations.
        ops: Vec<BatchOp>,
    },
    /// Force buttons down (`set`) and up (`clear`) on a channel for a
    /// number of ticks. Additive with existing overlays.
    SetOverlay {
        /// Target channel.
        channel: ChannelId,
        /// Buttons to force pressed.
        set: Buttons,
        /// Buttons to force released.
        clear: Buttons,
        /// Duration; one tick when absent.
        hold: Option<Hold>,
    },
    /// Release forced buttons immediately.
    ClearOverlay {
        /// Target channel.
        channel: ChannelId,
        /// Buttons to release from the forced-pressed set. `None` returns
        /// the whole channel to neutral.
        buttons: Option<Buttons>,
    },
    /// Replace a channel's forced state with exactly `buttons` pressed.
    SetState {
        /// Target channel.
        channel: ChannelId,
        /// The complete set of buttons to hold.
        buttons: Buttons,
        /// Duration; one tick when absent.
        hold: Option<Hold>,
    },
    /// Report raw and observed input for every channel.
    InputStatus,
    /// Pause or resume stepping.
    Control(ControlAction),
    /// Report session state.
    Status,
    /// Store a snapshot in a save slot.
    SaveState {
        /// Slot index, `0..=9`.
        slot: u8,
    },
    /// Restore a snapshot from a save slot.
    LoadState {
        /// Slot index, `0..=9`.
        slot: u8,
    },
}

/// Coarse classification of payloads, used for logging and metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Reads of simulation memory.
    ReadState,
    /// Writes to simulation memory.
    WriteState,
    /// A mixed batch of reads and writes.
    Batch,
    /// Additive input overlay.
    SetOverlay,
    /// Overlay release.
    ClearOverlay,
    /// Replacing forced input state.
    SetState,
    /// Input report.
    InputStatus,
    /// Pause and resume.
    Control,
    /// Session report.
    Status,
    /// Save-slot operations.
    SaveState,
    /// Load-slot operations.
    LoadState,
}

impl CommandKind {
    /// Stable lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadState => "read_state",
            Self::WriteState => "write_state",
            Self::Batch => "batch",
            Self::SetOverlay => "set_overlay",
            Self::ClearOverlay => "clear_overlay",
            Self::SetState => "set_state",
            Self::InputStatus => "input_status",
            Self::Control => "control",
            Self::Status => "status",
            Self::SaveState => "save_state",
            Self::LoadState => "load_state",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl CommandPayload {
    /// The payload's kind.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::ReadByte { .. } | Self::ReadRange { .. } => CommandKind::ReadState,
            Self::WriteByte { .. } | Self::WriteRange { .. } => CommandKind::WriteState,
            Self::Batch { .. } => CommandKind::Batch,
            Self::SetOverlay { .. } => CommandKind::SetOverlay,
            Self::ClearOverlay { .. } => CommandKind::ClearOverlay,
            Self::SetState { .. } => CommandKind::SetState,
            Self::InputStatus => CommandKind::InputStatus,
            Self::Control(_) => CommandKind::Control,
            Self::Status => CommandKind::Status,
            Self::SaveState { .. } => CommandKind::SaveState,
            Self::LoadState { .. } => CommandKind::LoadState,
        }
    }

    /// Whether the command needs a loaded session to run.
    ///
    /// Only status queries and pause/resume work without one.
    pub fn requires_session(&self) -> bool {
        !matches!(self, Self::Status | Self::Control(_))
    }
}

/// Raw and observed input for one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelInput {
    /// The channel.
    pub channel: ChannelId,
    /// Input as the simulation's own input source reports it.
    pub raw: Buttons,
    /// Input after the overlay is applied; what the next step sees.
    pub observed: Buttons,
}

/// Snapshot of session state returned by [`CommandPayload::Status`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionStatus {
    /// Whether a session (game) is loaded.
    pub loaded: bool,
    /// Whether stepping is paused.
    pub paused: bool,
    /// The executor's current tick.
    pub tick: TickId,
    /// Configured tick rate.
    pub tick_rate_hz: f64,
    /// Whether the session has battery-backed save RAM, i.e. whether
    /// writes to conditional save-RAM regions will be allowed.
    pub battery_backed: bool,
}

/// Successful result of a command.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// One byte from [`CommandPayload::ReadByte`].
    Byte(u8),
    /// Bytes from [`CommandPayload::ReadRange`].
    Bytes(Vec<u8>),
    /// Acknowledgement of a write.
    Written {
        /// First address written.
        start: Address,
        /// Number of bytes written.
        count: usize,
    },
    /// Per-operation outcomes of a batch, in submission order.
    Batch(Vec<Result<Reply, BridgeError>>),
    /// Acknowledgement of an overlay operation.
    Overlay {
        /// The affected channel.
        channel: ChannelId,
        /// The tick during which the change took effect.
        applied_at: TickId,
        /// When the change is scheduled to lapse, if it does.
        expires_at: Option<TickId>,
    },
    /// Per-channel input report.
    Input(Vec<ChannelInput>),
    /// Acknowledgement of pause/resume.
    Control {
        /// Whether the paused state actually changed.
        changed: bool,
        /// The paused state after the command.
        paused: bool,
    },
    /// Session report.
    Status(SessionStatus),
    /// Acknowledgement of a save or load.
    Slot {
        /// The slot used.
        slot: u8,
    },
}
