//! Tick-bound command execution for the Tickgate bridge.
//!
//! Connects many concurrent producers to a single execution context that
//! owns a [`Simulation`](tickgate_core::Simulation) and advances it in
//! discrete ticks. Producers submit commands into a bounded
//! [`CommandQueue`] and get a [`ResultFuture`] back immediately; once per
//! tick the [`Executor`] drains the queue, runs each command with
//! exclusive access to the simulation and the [`OverlaySet`], and
//! completes the futures.
//!
//! Two drivers are provided:
//!
//! - [`Bridge`]: a dedicated tick thread paced by wall-clock time.
//! - [`LockstepBridge`]: ticks only when its owner calls `step()`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod executor;
pub mod future;
pub mod guard;
pub mod ingress;
pub mod lockstep;
pub mod metrics;
pub mod overlay;
pub mod queue;
pub mod realtime;
pub(crate) mod tick_thread;

pub use config::{BridgeConfig, ConfigError};
pub use executor::{Executor, ExecutorPhase, TickReport};
pub use future::{completion_pair, CompletionError, Completer, FutureState, ResultFuture};
pub use guard::{
    Condition, GuardedRegion, GuardedStateAccessor, InspectionGuard, Permission, RegionTable,
};
pub use ingress::{BridgeStatus, Submitter};
pub use lockstep::LockstepBridge;
pub use metrics::BridgeMetrics;
pub use overlay::{ChannelOverlay, OverlaySet};
pub use queue::{CommandQueue, PendingCommand};
pub use realtime::{Bridge, ShutdownReport};
