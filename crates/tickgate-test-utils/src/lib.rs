//! Test utilities and simulation fixtures for Tickgate development.
//!
//! [`ScriptedSimulation`] is an in-memory [`Simulation`] with a flat
//! 64 KiB address space, save slots, and builder switches for the
//! failure modes the bridge must tolerate: slow steps, failing steps,
//! and panicking reads. A [`SimulationProbe`] stays with the test after
//! the simulation moves onto the tick thread, to feed raw input and
//! inspect the frames each step received.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use tickgate_core::{
    Address, Buttons, ChannelId, Feature, InputFrame, Simulation, SimulationError, TickId,
    ADDRESS_SPACE_LEN,
};

/// Address of a status register whose top bit clears when read outside
/// inspection, like a hardware vblank latch.
pub const LATCH_REGISTER: Address = Address(0x2002);

#[derive(Default)]
struct ProbeState {
    raw: HashMap<ChannelId, Buttons>,
    frames: Vec<InputFrame>,
}

/// Shared handle into a [`ScriptedSimulation`].
#[derive(Clone, Default)]
pub struct SimulationProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl SimulationProbe {
    /// Set the raw input the simulation reports for `channel`.
    pub fn set_raw_input(&self, channel: ChannelId, buttons: Buttons) {
        self.state.lock().raw.insert(channel, buttons);
    }

    /// Every frame stepped so far, oldest first.
    pub fn frames(&self) -> Vec<InputFrame> {
        self.state.lock().frames.clone()
    }

    /// The frame stepped at `tick`, if any.
    pub fn frame_at(&self, tick: TickId) -> Option<InputFrame> {
        self.state
            .lock()
            .frames
            .iter()
            .find(|f| f.tick == tick)
            .cloned()
    }

    /// Observed buttons on `channel` for every stepped tick.
    pub fn observed(&self, channel: ChannelId) -> Vec<(TickId, Buttons)> {
        self.state
            .lock()
            .frames
            .iter()
            .map(|f| (f.tick, f.channel(channel)))
            .collect()
    }

    /// Number of frames stepped.
    pub fn step_count(&self) -> usize {
        self.state.lock().frames.len()
    }
}

/// In-memory simulation with scripted behavior.
pub struct ScriptedSimulation {
    memory: Box<[u8]>,
    loaded: bool,
    battery: bool,
    inspection: bool,
    inspected_reads: u64,
    uninspected_reads: u64,
    pokes: u64,
    steps: u64,
    slots: HashMap<u8, Box<[u8]>>,
    step_delay: Option<Duration>,
    failing_step: Option<TickId>,
    panic_on_read: Option<Address>,
    probe: SimulationProbe,
}

impl ScriptedSimulation {
    /// A loaded session with zeroed memory and no battery.
    pub fn new() -> Self {
        let mut memory = vec![0u8; ADDRESS_SPACE_LEN].into_boxed_slice();
        memory[LATCH_REGISTER.as_usize()] = 0x80;
        Self {
            memory,
            loaded: true,
            battery: false,
            inspection: false,
            inspected_reads: 0,
            uninspected_reads: 0,
            pokes: 0,
            steps: 0,
            slots: HashMap::new(),
            step_delay: None,
            failing_step: None,
            panic_on_read: None,
            probe: SimulationProbe::default(),
        }
    }

    /// No session loaded.
    pub fn unloaded() -> Self {
        Self {
            loaded: false,
            ..Self::new()
        }
    }

    /// Whether the session reports battery-backed save RAM.
    pub fn with_battery(mut self, battery: bool) -> Self {
        self.battery = battery;
        self
    }

    /// Sleep this long in every step, to stall the tick thread.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    /// Return an error from the step at `tick`.
    pub fn with_failing_step_at(mut self, tick: TickId) -> Self {
        self.failing_step = Some(tick);
        self
    }

    /// Panic when `address` is read.
    pub fn with_panic_on_read(mut self, address: Address) -> Self {
        self.panic_on_read = Some(address);
        self
    }

    /// A probe sharing this simulation's input and frame log.
    pub fn probe(&self) -> SimulationProbe {
        self.probe.clone()
    }

    pub fn set_loaded(&mut self, loaded: bool) {
        self.loaded = loaded;
    }

    /// Byte at `address`, read directly without side effects.
    pub fn memory(&self, address: Address) -> u8 {
        self.memory[address.as_usize()]
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn poke_count(&self) -> u64 {
        self.pokes
    }

    pub fn inspection_active(&self) -> bool {
        self.inspection
    }

    pub fn inspected_reads(&self) -> u64 {
        self.inspected_reads
    }

    pub fn uninspected_reads(&self) -> u64 {
        self.uninspected_reads
    }
}

impl Default for ScriptedSimulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation for ScriptedSimulation {
    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn step(&mut self, frame: &InputFrame) -> Result<(), SimulationError> {
        if let Some(delay) = self.step_delay {
            thread::sleep(delay);
        }
        self.steps += 1;
        self.probe.state.lock().frames.push(frame.clone());
        if self.failing_step == Some(frame.tick) {
            return Err(SimulationError::StepFailed {
                reason: format!("scripted failure at tick {}", frame.tick),
            });
        }
        Ok(())
    }

    fn raw_input(&self, channel: ChannelId) -> Buttons {
        self.probe
            .state
            .lock()
            .raw
            .get(&channel)
            .copied()
            .unwrap_or_default()
    }

    fn peek(&mut self, address: Address) -> u8 {
        if self.panic_on_read == Some(address) {
            panic!("scripted panic reading {address}");
        }
        let value = self.memory[address.as_usize()];
        if self.inspection {
            self.inspected_reads += 1;
        } else {
            self.uninspected_reads += 1;
            if address == LATCH_REGISTER {
                self.memory[address.as_usize()] &= 0x7F;
            }
        }
        value
    }

    fn poke(&mut self, address: Address, value: u8) {
        self.pokes += 1;
        self.memory[address.as_usize()] = value;
    }

    fn set_inspection(&mut self, active: bool) {
        self.inspection = active;
    }

    fn feature_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::BatteryBacked => self.battery,
        }
    }

    fn save_state(&mut self, slot: u8) -> Result<(), SimulationError> {
        self.slots.insert(slot, self.memory.clone());
        Ok(())
    }

    fn load_state(&mut self, slot: u8) -> Result<(), SimulationError> {
        let saved = self
            .slots
            .get(&slot)
            .ok_or(SimulationError::EmptySlot { slot })?;
        self.memory.copy_from_slice(saved);
        Ok(())
    }
}
