//! Lockstep bridge: caller-driven ticking without a background thread.
//!
//! [`LockstepBridge`] owns the [`Executor`] directly. Producers still
//! submit through the same validating [`Submitter`] and receive the same
//! futures, but nothing executes until the owner calls
//! [`step`](LockstepBridge::step). Useful for deterministic tests and for
//! embedding the bridge in a host that already has a frame loop.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tickgate_core::{BridgeError, CommandPayload, Reply, Simulation, TickId};

use crate::config::{BridgeConfig, ConfigError};
use crate::executor::{Executor, TickReport};
use crate::future::ResultFuture;
use crate::guard::RegionTable;
use crate::ingress::{BridgeStatus, SharedStatus, Submitter};
use crate::overlay::OverlaySet;
use crate::queue::CommandQueue;

/// Command bridge ticked by its owner.
///
/// Dropping the bridge closes its queue: commands still queued fail with
/// [`BridgeError::Shutdown`] and cloned submitters are rejected from then on.
pub struct LockstepBridge<S: Simulation> {
    executor: Executor<S>,
    submitter: Submitter,
    _closer: CloseOnDrop,
}

struct CloseOnDrop {
    queue: Arc<CommandQueue>,
    shared: Arc<SharedStatus>,
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.shared.consumer_alive.store(false, Ordering::Release);
        self.queue.close();
    }
}

impl<S: Simulation> LockstepBridge<S> {
    /// Validate `config` and wrap `sim`.
    pub fn new(sim: S, config: BridgeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let queue = Arc::new(CommandQueue::new(config.queue_capacity));
        let regions = Arc::new(RegionTable::new(config.regions.clone())?);
        let shared = Arc::new(SharedStatus::new());
        let executor = Executor::new(sim, &config, queue.clone(), regions.clone(), shared.clone());
        Ok(Self {
            executor,
            submitter: Submitter::new(queue.clone(), regions, shared.clone(), config.channel_count),
            _closer: CloseOnDrop { queue, shared },
        })
    }

    /// Validate and enqueue a command for the next [`step`](Self::step).
    pub fn submit(&self, payload: CommandPayload) -> Result<ResultFuture<Reply>, BridgeError> {
        self.submitter.submit(payload)
    }

    /// Submit, run one tick, and return the command's outcome.
    ///
    /// Commands already queued run first, so the result may arrive on a
    /// later tick if the per-tick budget is exhausted; this keeps
    /// stepping until it does.
    pub fn execute(&mut self, payload: CommandPayload) -> Result<Reply, BridgeError> {
        let mut future = self.submit(payload)?;
        loop {
            self.step();
            if let Some(outcome) = future.try_get() {
                return outcome;
            }
        }
    }

    /// A cloneable producer handle.
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    /// Run one tick.
    pub fn step(&mut self) -> TickReport {
        self.executor.run_tick()
    }

    /// Run `n` ticks.
    pub fn step_n(&mut self, n: u64) {
        for _ in 0..n {
            self.executor.run_tick();
        }
    }

    /// Queue depth, tick, and counters.
    pub fn status(&self) -> BridgeStatus {
        self.submitter.status()
    }

    /// The tick the next [`step`](Self::step) processes.
    pub fn current_tick(&self) -> TickId {
        self.executor.current_tick()
    }

    /// Overlay state.
    pub fn overlays(&self) -> &OverlaySet {
        self.executor.overlays()
    }

    /// The owned simulation.
    pub fn simulation(&self) -> &S {
        self.executor.simulation()
    }

    /// Mutable access to the simulation between ticks.
    pub fn simulation_mut(&mut self) -> &mut S {
        self.executor.simulation_mut()
    }

    /// Give up the simulation. Queued commands fail with `Shutdown`.
    pub fn into_simulation(self) -> S {
        self.executor.into_simulation()
    }
}

impl<S: Simulation> std::fmt::Debug for LockstepBridge<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockstepBridge")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
