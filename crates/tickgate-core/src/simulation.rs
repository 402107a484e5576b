//! The simulation collaborator driven by the executor.

use smallvec::SmallVec;

use crate::buttons::Buttons;
use crate::error::SimulationError;
use crate::id::{Address, ChannelId, TickId};

/// Session-dependent capabilities that gate some writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    /// The loaded session has battery-backed save RAM.
    BatteryBacked,
}

/// Input presented to the simulation for one step.
///
/// Holds the observed (overlay-applied) state of every channel. Eight
/// inline channels cover every supported configuration without a heap
/// allocation per tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputFrame {
    /// The tick this frame is stepped at.
    pub tick: TickId,
    /// Observed buttons, indexed by channel.
    pub channels: SmallVec<[Buttons; 8]>,
}

impl InputFrame {
    /// Observed buttons for `channel`, or the empty mask when the channel
    /// is not configured.
    pub fn channel(&self, channel: ChannelId) -> Buttons {
        self.channels
            .get(channel.index())
            .copied()
            .unwrap_or_default()
    }
}

/// A frame-stepped simulation with a 16-bit byte-addressable state space.
///
/// Owned exclusively by the executor; every method runs on the tick
/// thread between steps, so implementations need no internal locking.
pub trait Simulation: Send {
    /// Whether a session is loaded. Most commands fail with
    /// `PreconditionUnmet` while this is `false`.
    fn is_loaded(&self) -> bool;

    /// Advance one step with the given observed input.
    fn step(&mut self, frame: &InputFrame) -> Result<(), SimulationError>;

    /// Input for `channel` from the simulation's own source (keyboard,
    /// movie playback), before any overlay.
    fn raw_input(&self, channel: ChannelId) -> Buttons;

    /// Read one byte. Called only while inspection is active.
    fn peek(&mut self, address: Address) -> u8;

    /// Write one byte. Called only after region permission checks pass.
    fn poke(&mut self, address: Address, value: u8);

    /// Raise or lower the flag that suppresses read side effects
    /// (register latches, open-bus updates) during inspection.
    fn set_inspection(&mut self, active: bool);

    /// Whether the loaded session has `feature`.
    fn feature_enabled(&self, feature: Feature) -> bool;

    /// Store a snapshot in `slot`.
    fn save_state(&mut self, slot: u8) -> Result<(), SimulationError> {
        let _ = slot;
        Err(SimulationError::Unsupported {
            operation: "save_state",
        })
    }

    /// Restore the snapshot stored in `slot`.
    fn load_state(&mut self, slot: u8) -> Result<(), SimulationError> {
        let _ = slot;
        Err(SimulationError::Unsupported {
            operation: "load_state",
        })
    }
}
