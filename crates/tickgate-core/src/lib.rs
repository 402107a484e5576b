//! Core types and traits for the Tickgate command bridge.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! vocabulary shared by producers and the tick-bound executor: strongly
//! typed IDs, the [`Buttons`] bitmask, the closed [`CommandPayload`] set
//! and its [`Reply`] values, the [`BridgeError`] taxonomy, the
//! millisecond-to-tick converter, and the [`Simulation`] collaborator
//! trait the executor drives.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod address;
pub mod buttons;
pub mod clock;
pub mod command;
pub mod error;
pub mod id;
pub mod simulation;

pub use address::{parse_address, ADDRESS_SPACE_LEN, MAX_RANGE_LEN};
pub use buttons::Buttons;
pub use clock::ms_to_ticks;
pub use command::{
    BatchOp, ChannelInput, Command, CommandKind, CommandPayload, ControlAction, Hold, Reply,
    SessionStatus, MAX_BATCH_OPS, SAVE_SLOT_COUNT,
};
pub use error::{BridgeError, SimulationError};
pub use id::{Address, ChannelId, CommandId, TickId};
pub use simulation::{Feature, InputFrame, Simulation};
