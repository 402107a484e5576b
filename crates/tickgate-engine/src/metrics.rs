//! Bridge counters published from the tick thread to producers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the bridge's counters.
///
/// Cumulative fields count since the bridge started. `command_processing_us`
/// and `step_us` describe the most recent tick only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BridgeMetrics {
    /// Ticks the executor has run (including paused ticks).
    pub ticks: u64,
    /// Commands whose handler produced a reply.
    pub commands_executed: u64,
    /// Commands whose handler produced an error, including caught panics.
    pub commands_failed: u64,
    /// Handler panics caught and turned into `Internal` errors.
    pub handler_panics: u64,
    /// Submissions rejected because the queue was full.
    pub queue_full_rejections: u64,
    /// Submissions rejected by synchronous validation.
    pub invalid_rejections: u64,
    /// Sum over ticks of commands left queued after the per-tick budget
    /// was used up.
    pub deferred_commands: u64,
    /// Simulation steps that returned an error or panicked.
    pub step_failures: u64,
    /// Time spent draining and executing commands in the last tick.
    pub command_processing_us: u64,
    /// Time spent in the simulation step in the last tick.
    pub step_us: u64,
}

/// Lock-free counters shared between the tick thread and producers.
#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    ticks: AtomicU64,
    commands_executed: AtomicU64,
    commands_failed: AtomicU64,
    handler_panics: AtomicU64,
    queue_full_rejections: AtomicU64,
    invalid_rejections: AtomicU64,
    deferred_commands: AtomicU64,
    step_failures: AtomicU64,
    command_processing_us: AtomicU64,
    step_us: AtomicU64,
}

impl MetricsRecorder {
    pub fn record_tick(&self, command_processing_us: u64, step_us: u64, deferred: usize) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.command_processing_us
            .store(command_processing_us, Ordering::Relaxed);
        self.step_us.store(step_us, Ordering::Relaxed);
        self.deferred_commands
            .fetch_add(deferred as u64, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, ok: bool) {
        if ok {
            self.commands_executed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.commands_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_panic(&self) {
        self.handler_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_full(&self) {
        self.queue_full_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid(&self) {
        self.invalid_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_step_failure(&self) {
        self.step_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BridgeMetrics {
        BridgeMetrics {
            ticks: self.ticks.load(Ordering::Relaxed),
            commands_executed: self.commands_executed.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            queue_full_rejections: self.queue_full_rejections.load(Ordering::Relaxed),
            invalid_rejections: self.invalid_rejections.load(Ordering::Relaxed),
            deferred_commands: self.deferred_commands.load(Ordering::Relaxed),
            step_failures: self.step_failures.load(Ordering::Relaxed),
            command_processing_us: self.command_processing_us.load(Ordering::Relaxed),
            step_us: self.step_us.load(Ordering::Relaxed),
        }
    }
}
