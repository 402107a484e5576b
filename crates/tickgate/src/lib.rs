//! Tickgate: a tick-synchronised command bridge.
//!
//! Many request-handling threads talk to one frame-stepped simulation
//! through a bounded queue. Commands run at tick boundaries with
//! exclusive access to simulation state, results come back through
//! futures with timeouts, and "hold this input for N ticks" is expressed
//! as a timed overlay the executor applies and expires on its own.
//!
//! This facade crate re-exports the public API of the sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use tickgate::prelude::*;
//!
//! // A simulation with 64 KiB of flat memory and no input of its own.
//! struct Flat(Vec<u8>);
//! impl Simulation for Flat {
//!     fn is_loaded(&self) -> bool { true }
//!     fn step(&mut self, _frame: &InputFrame) -> Result<(), SimulationError> { Ok(()) }
//!     fn raw_input(&self, _channel: ChannelId) -> Buttons { Buttons::empty() }
//!     fn peek(&mut self, address: Address) -> u8 { self.0[address.as_usize()] }
//!     fn poke(&mut self, address: Address, value: u8) { self.0[address.as_usize()] = value; }
//!     fn set_inspection(&mut self, _active: bool) {}
//!     fn feature_enabled(&self, _feature: Feature) -> bool { false }
//! }
//!
//! let mut bridge = LockstepBridge::new(Flat(vec![0; 0x10000]), BridgeConfig::default()).unwrap();
//!
//! // Hold A+Right on the first controller for 12 ticks.
//! bridge
//!     .execute(CommandPayload::SetOverlay {
//!         channel: ChannelId(0),
//!         set: Buttons::A | Buttons::RIGHT,
//!         clear: Buttons::empty(),
//!         hold: Some(Hold::Ticks(12)),
//!     })
//!     .unwrap();
//! assert_eq!(
//!     bridge.overlays().observed(ChannelId(0), Buttons::empty()),
//!     Buttons::A | Buttons::RIGHT
//! );
//!
//! // Work RAM is writable; everything outside a region is read-only.
//! let write = CommandPayload::WriteByte { address: Address(0x0300), value: 7 };
//! bridge.execute(write).unwrap();
//! let denied = bridge.submit(CommandPayload::WriteByte { address: Address(0x8000), value: 7 });
//! assert!(matches!(denied, Err(BridgeError::PermissionDenied { .. })));
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `tickgate-core` | IDs, buttons, commands, replies, errors, the `Simulation` trait |
//! | [`engine`] | `tickgate-engine` | Queue, futures, overlays, guarded memory, executor, bridges |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits, and IDs (`tickgate-core`).
///
/// Contains the closed [`types::CommandPayload`] set, [`types::Reply`],
/// the [`types::BridgeError`] taxonomy, and the [`types::Simulation`]
/// trait a host implements.
pub use tickgate_core as types;

/// Command queue, executor, and bridges (`tickgate-engine`).
///
/// [`engine::Bridge`] runs its own tick thread;
/// [`engine::LockstepBridge`] ticks when its owner calls `step()`.
pub use tickgate_engine as engine;

/// Common imports for typical Tickgate usage.
///
/// ```rust
/// use tickgate::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use tickgate_core::{
        parse_address, Address, BatchOp, Buttons, ChannelId, ChannelInput, Command,
        CommandPayload, ControlAction, Feature, Hold, InputFrame, Reply, SessionStatus,
        Simulation, TickId,
    };

    // Errors
    pub use tickgate_core::{BridgeError, SimulationError};
    pub use tickgate_engine::ConfigError;

    // Engine
    pub use tickgate_engine::{
        Bridge, BridgeConfig, BridgeMetrics, BridgeStatus, LockstepBridge, ResultFuture,
        ShutdownReport, Submitter,
    };
}
