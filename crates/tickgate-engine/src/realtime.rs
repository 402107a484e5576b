//! Realtime bridge: a dedicated tick thread driven by wall-clock time.
//!
//! [`Bridge`] spawns one tick thread that owns the [`Executor`] and runs
//! at `tick_rate_hz`. Producers on any thread submit commands through
//! [`Bridge::submit`] or a cloned [`Submitter`] and wait on the returned
//! futures.
//!
//! # Shutdown state machine
//!
//! ```text
//! Running ──shutdown()──► Draining ──tick thread joined──► Dropped
//! ```
//!
//! `Draining` sets the shutdown flag and unparks the tick thread, which
//! finishes its current tick and exits. `Dropped` closes the queue,
//! failing every still-queued command with [`BridgeError::Shutdown`], and
//! keeps the executor recovered from the join handle so the simulation
//! can be taken back with [`Bridge::into_simulation`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use tickgate_core::{BridgeError, CommandPayload, Reply, Simulation, TickId};

use crate::config::{BridgeConfig, ConfigError};
use crate::executor::Executor;
use crate::future::ResultFuture;
use crate::guard::RegionTable;
use crate::ingress::{BridgeStatus, SharedStatus, Submitter};
use crate::queue::CommandQueue;
use crate::tick_thread::TickThreadState;

/// Shutdown progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ShutdownState {
    Running,
    Draining,
    Dropped,
}

/// Report from [`Bridge::shutdown`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Total wall time of the shutdown.
    pub total_ms: u64,
    /// Whether the tick thread was joined cleanly.
    pub tick_joined: bool,
    /// Commands still queued and failed with `Shutdown`.
    pub cancelled_commands: usize,
    /// The tick the executor stopped at, if it was recovered.
    pub final_tick: Option<TickId>,
}

/// Command bridge with its own tick thread.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use tickgate_core::{Address, CommandPayload, Reply, Simulation};
/// use tickgate_engine::{Bridge, BridgeConfig};
///
/// fn peek<S: Simulation + 'static>(sim: S) {
///     let mut bridge = Bridge::new(sim, BridgeConfig::default()).unwrap();
///     let reply = bridge
///         .execute(CommandPayload::ReadByte { address: Address(0x0300) }, Duration::from_secs(2))
///         .unwrap();
///     assert!(matches!(reply, Reply::Byte(_)));
///     bridge.shutdown();
/// }
/// ```
pub struct Bridge<S: Simulation + 'static> {
    submitter: Submitter,
    queue: Arc<CommandQueue>,
    shutdown_flag: Arc<AtomicBool>,
    tick_thread: Option<JoinHandle<Executor<S>>>,
    recovered: Option<Executor<S>>,
    default_timeout: Duration,
    state: ShutdownState,
}

impl<S: Simulation + 'static> Bridge<S> {
    /// Validate `config` and start the tick thread.
    pub fn new(sim: S, config: BridgeConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let queue = Arc::new(CommandQueue::new(config.queue_capacity));
        let regions = Arc::new(RegionTable::new(config.regions.clone())?);
        let shared = Arc::new(SharedStatus::new());
        let shutdown_flag = Arc::new(AtomicBool::new(false));

        let executor = Executor::new(
            sim,
            &config,
            queue.clone(),
            regions.clone(),
            shared.clone(),
        );
        let state = TickThreadState::new(
            executor,
            shared.clone(),
            shutdown_flag.clone(),
            config.tick_budget(),
        );
        let tick_thread = thread::Builder::new()
            .name("tickgate-tick".into())
            .spawn(move || state.run())?;

        info!(
            tick_rate_hz = config.tick_rate_hz,
            queue_capacity = config.queue_capacity,
            max_commands_per_tick = config.max_commands_per_tick,
            "bridge started"
        );

        Ok(Self {
            submitter: Submitter::new(queue.clone(), regions, shared, config.channel_count),
            queue,
            shutdown_flag,
            tick_thread: Some(tick_thread),
            recovered: None,
            default_timeout: config.default_timeout(),
            state: ShutdownState::Running,
        })
    }

    /// Validate and enqueue a command. Never blocks.
    pub fn submit(&self, payload: CommandPayload) -> Result<ResultFuture<Reply>, BridgeError> {
        self.submitter.submit(payload)
    }

    /// Submit and wait up to `timeout` for the result.
    pub fn execute(&self, payload: CommandPayload, timeout: Duration) -> Result<Reply, BridgeError> {
        self.submit(payload)?.wait(timeout)
    }

    /// A cloneable producer handle for other threads.
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    /// Queue depth, tick, liveness, and counters.
    pub fn status(&self) -> BridgeStatus {
        self.submitter.status()
    }

    /// The configured default producer timeout.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Whether [`shutdown`](Self::shutdown) has completed.
    pub fn is_shut_down(&self) -> bool {
        self.state == ShutdownState::Dropped
    }

    /// Stop the tick thread and fail every queued command.
    ///
    /// Idempotent: later calls return an empty report.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.state == ShutdownState::Dropped {
            return ShutdownReport {
                total_ms: 0,
                tick_joined: true,
                cancelled_commands: 0,
                final_tick: self.recovered.as_ref().map(Executor::current_tick),
            };
        }

        let start = Instant::now();

        // Running → Draining
        self.state = ShutdownState::Draining;
        self.shutdown_flag.store(true, Ordering::Release);
        if let Some(handle) = &self.tick_thread {
            handle.thread().unpark();
        }

        let tick_joined = match self.tick_thread.take().map(JoinHandle::join) {
            Some(Ok(executor)) => {
                self.recovered = Some(executor);
                true
            }
            Some(Err(_)) => {
                warn!("tick thread panicked; simulation not recovered");
                false
            }
            None => true,
        };

        // Draining → Dropped
        self.state = ShutdownState::Dropped;
        let cancelled_commands = self.queue.close();

        let report = ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            tick_joined,
            cancelled_commands,
            final_tick: self.recovered.as_ref().map(Executor::current_tick),
        };
        info!(
            total_ms = report.total_ms,
            tick_joined = report.tick_joined,
            cancelled = report.cancelled_commands,
            "bridge shut down"
        );
        report
    }

    /// Shut down (if still running) and return the simulation.
    ///
    /// Returns `None` if the tick thread panicked.
    pub fn into_simulation(mut self) -> Option<S> {
        self.shutdown();
        self.recovered.take().map(Executor::into_simulation)
    }
}

impl<S: Simulation + 'static> Drop for Bridge<S> {
    fn drop(&mut self) {
        if self.state != ShutdownState::Dropped {
            self.shutdown();
        }
    }
}

impl<S: Simulation + 'static> std::fmt::Debug for Bridge<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
