//! Realtime tick loop.
//!
//! The tick thread owns the [`Executor`] exclusively (moved in via
//! `thread::spawn`). Producers reach it only through the command queue;
//! the loop runs one tick per budget and parks for whatever time is
//! left, so a shutdown `unpark()` wakes it immediately regardless of the
//! tick rate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, trace};

use tickgate_core::Simulation;

use crate::executor::Executor;
use crate::ingress::SharedStatus;

/// Marks the consumer dead when the loop exits, including by panic.
struct AliveGuard(Arc<SharedStatus>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.consumer_alive.store(false, Ordering::Release);
    }
}

/// State held by the tick thread's main loop.
pub(crate) struct TickThreadState<S: Simulation> {
    executor: Executor<S>,
    shared: Arc<SharedStatus>,
    shutdown_flag: Arc<AtomicBool>,
    tick_budget: Duration,
}

impl<S: Simulation> TickThreadState<S> {
    pub fn new(
        executor: Executor<S>,
        shared: Arc<SharedStatus>,
        shutdown_flag: Arc<AtomicBool>,
        tick_budget: Duration,
    ) -> Self {
        Self {
            executor,
            shared,
            shutdown_flag,
            tick_budget,
        }
    }

    /// Main tick loop. Runs until `shutdown_flag` is set.
    ///
    /// Consumes self and returns the executor so the owner can recover
    /// the simulation through the `JoinHandle`.
    pub fn run(mut self) -> Executor<S> {
        let _alive = AliveGuard(self.shared.clone());
        info!(budget_us = self.tick_budget.as_micros() as u64, "tick thread started");

        while !self.shutdown_requested() {
            let tick_start = Instant::now();
            let report = self.executor.run_tick();
            if report.executed + report.failed > 0 {
                trace!(
                    tick = %report.tick,
                    executed = report.executed,
                    failed = report.failed,
                    deferred = report.deferred,
                    "tick complete"
                );
            }
            self.park_until(tick_start + self.tick_budget);
        }

        info!(tick = %self.executor.current_tick(), "tick thread stopped");
        self.executor
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown_flag.load(Ordering::Acquire)
    }

    /// Park for the rest of the tick budget. Spurious wakeups park again;
    /// a shutdown request returns early.
    fn park_until(&self, deadline: Instant) {
        loop {
            if self.shutdown_requested() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::park_timeout(deadline - now);
        }
    }
}
