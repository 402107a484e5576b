//! Tick-bound command executor.
//!
//! The executor owns the simulation, the overlay state, and the tick
//! counter. [`Executor::run_tick`] is the single place where any of them
//! change:
//!
//! 1. enter [`ExecutorPhase::Processing`];
//! 2. drain up to `max_commands_per_tick` commands;
//! 3. run each handler in acceptance order, completing its future;
//! 4. step the simulation with the overlay-applied input frame;
//! 5. advance the tick and release overlays due at the new tick;
//! 6. return to [`ExecutorPhase::Idle`].
//!
//! A handler error fails only its own command, and a handler panic is
//! caught and reported as [`BridgeError::Internal`]. While the session is
//! paused, steps 4 and 5 are skipped: commands still run, but time does
//! not move.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace, warn};

use tickgate_core::{
    ms_to_ticks, BatchOp, BridgeError, ChannelId, ChannelInput, Command, CommandPayload,
    ControlAction, Feature, Hold, Reply, SessionStatus, Simulation, TickId,
};

use crate::config::BridgeConfig;
use crate::guard::{GuardedStateAccessor, RegionTable};
use crate::ingress::SharedStatus;
use crate::overlay::OverlaySet;
use crate::queue::CommandQueue;

/// Whether the executor is inside a tick's processing window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutorPhase {
    /// Between ticks.
    Idle,
    /// Draining and executing commands, or stepping.
    Processing,
}

/// What one call to [`Executor::run_tick`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    /// The tick that was processed.
    pub tick: TickId,
    /// Commands whose handler returned a reply.
    pub executed: usize,
    /// Commands whose handler returned an error or panicked.
    pub failed: usize,
    /// Commands left in the queue after the per-tick budget.
    pub deferred: usize,
    /// Whether the simulation was stepped (false while paused).
    pub stepped: bool,
    /// Whether the step reported a failure.
    pub step_failed: bool,
}

/// Single consumer of the command queue and sole owner of session state.
pub struct Executor<S: Simulation> {
    sim: S,
    overlays: OverlaySet,
    regions: Arc<RegionTable>,
    queue: Arc<CommandQueue>,
    shared: Arc<SharedStatus>,
    tick: TickId,
    phase: ExecutorPhase,
    paused: bool,
    max_per_tick: usize,
    tick_rate_hz: f64,
}

impl<S: Simulation> Executor<S> {
    pub(crate) fn new(
        sim: S,
        config: &BridgeConfig,
        queue: Arc<CommandQueue>,
        regions: Arc<RegionTable>,
        shared: Arc<SharedStatus>,
    ) -> Self {
        Self {
            sim,
            overlays: OverlaySet::new(config.channel_count),
            regions,
            queue,
            shared,
            tick: TickId(0),
            phase: ExecutorPhase::Idle,
            paused: false,
            max_per_tick: config.max_commands_per_tick,
            tick_rate_hz: config.tick_rate_hz,
        }
    }

    /// The current tick: the one the next [`run_tick`](Self::run_tick)
    /// processes.
    pub fn current_tick(&self) -> TickId {
        self.tick
    }

    /// Current phase. Always `Idle` when observed from outside `run_tick`.
    pub fn phase(&self) -> ExecutorPhase {
        self.phase
    }

    /// Whether stepping is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Overlay state.
    pub fn overlays(&self) -> &OverlaySet {
        &self.overlays
    }

    /// The owned simulation.
    pub fn simulation(&self) -> &S {
        &self.sim
    }

    /// Mutable access to the owned simulation, for setup between ticks.
    pub fn simulation_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    /// Give up ownership of the simulation.
    pub fn into_simulation(self) -> S {
        self.sim
    }

    /// Run one tick.
    pub fn run_tick(&mut self) -> TickReport {
        let tick = self.tick;
        let start = Instant::now();
        self.phase = ExecutorPhase::Processing;

        let batch = self.queue.drain(self.max_per_tick);
        let deferred = self.queue.len();
        if !batch.is_empty() {
            debug!(%tick, count = batch.len(), deferred, "executing commands");
        }

        let mut executed = 0;
        let mut failed = 0;
        for pending in batch {
            let (command, mut completer) = pending.into_parts();
            let outcome = self.execute(&command);
            if outcome.is_ok() {
                executed += 1;
            } else {
                failed += 1;
            }
            self.shared.metrics.record_outcome(outcome.is_ok());
            let _ = completer.complete(outcome);
        }
        let command_us = start.elapsed().as_micros() as u64;

        let step_start = Instant::now();
        let mut step_failed = false;
        let stepped = !self.paused;
        if stepped {
            step_failed = !self.step_simulation();
            self.tick = self.tick.next();
            self.overlays.expire(self.tick);
            self.shared.tick.store(self.tick.0, Ordering::Release);
        }
        let step_us = step_start.elapsed().as_micros() as u64;

        self.shared
            .metrics
            .record_tick(command_us, step_us, deferred);
        self.phase = ExecutorPhase::Idle;

        TickReport {
            tick,
            executed,
            failed,
            deferred,
            stepped,
            step_failed,
        }
    }

    /// Returns `false` if the step failed or panicked.
    fn step_simulation(&mut self) -> bool {
        let sim = &mut self.sim;
        let frame = self.overlays.frame(self.tick, |ch| sim.raw_input(ch));
        let result = panic::catch_unwind(AssertUnwindSafe(|| sim.step(&frame)));
        match result {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(tick = %self.tick, error = %err, "simulation step failed");
                self.shared.metrics.record_step_failure();
                false
            }
            Err(payload) => {
                warn!(
                    tick = %self.tick,
                    panic = panic_message(payload.as_ref()),
                    "simulation step panicked"
                );
                self.shared.metrics.record_step_failure();
                false
            }
        }
    }

    fn execute(&mut self, command: &Command) -> Result<Reply, BridgeError> {
        trace!(command = %command.id, kind = %command.payload.kind(), "dispatch");
        match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(&command.payload))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(
                    command = %command.id,
                    kind = %command.payload.kind(),
                    panic = message,
                    "command handler panicked"
                );
                self.shared.metrics.record_panic();
                Err(BridgeError::internal(format!("handler panicked: {message}")))
            }
        }
    }

    fn dispatch(&mut self, payload: &CommandPayload) -> Result<Reply, BridgeError> {
        if payload.requires_session() && !self.sim.is_loaded() {
            return Err(BridgeError::precondition("no session loaded"));
        }

        match payload {
            CommandPayload::ReadByte { address } => Ok(Reply::Byte(self.accessor().read(*address))),
            CommandPayload::ReadRange { start, len } => {
                self.accessor().read_range(*start, *len).map(Reply::Bytes)
            }
            CommandPayload::WriteByte { address, value } => {
                self.accessor().write(*address, *value)?;
                Ok(Reply::Written {
                    start: *address,
                    count: 1,
                })
            }
            CommandPayload::WriteRange { start, data } => {
                let count = self.accessor().write_range(*start, data)?;
                Ok(Reply::Written {
                    start: *start,
                    count,
                })
            }
            CommandPayload::Batch { ops } => Ok(Reply::Batch(
                ops.iter().map(|op| self.batch_op(op)).collect(),
            )),
            CommandPayload::SetOverlay {
                channel,
                set,
                clear,
                hold,
            } => {
                let duration = self.hold_ticks(*hold)?;
                let expires_at =
                    self.overlays
                        .set_overlay(*channel, *set, *clear, self.tick, duration)?;
                Ok(self.overlay_reply(*channel, expires_at))
            }
            CommandPayload::ClearOverlay { channel, buttons } => {
                self.overlays.clear_overlay(*channel, *buttons)?;
                let next = self
                    .overlays
                    .channel(*channel)
                    .and_then(|overlay| overlay.next_expiry());
                Ok(self.overlay_reply(*channel, next))
            }
            CommandPayload::SetState {
                channel,
                buttons,
                hold,
            } => {
                let duration = self.hold_ticks(*hold)?;
                let expires_at = self
                    .overlays
                    .set_state(*channel, *buttons, self.tick, duration)?;
                Ok(self.overlay_reply(*channel, expires_at))
            }
            CommandPayload::InputStatus => Ok(Reply::Input(self.input_status())),
            CommandPayload::Control(action) => {
                let paused = matches!(action, ControlAction::Pause);
                let changed = self.paused != paused;
                if changed {
                    debug!(tick = %self.tick, paused, "session pause state changed");
                }
                self.paused = paused;
                Ok(Reply::Control { changed, paused })
            }
            CommandPayload::Status => Ok(Reply::Status(SessionStatus {
                loaded: self.sim.is_loaded(),
                paused: self.paused,
                tick: self.tick,
                tick_rate_hz: self.tick_rate_hz,
                battery_backed: self.sim.feature_enabled(Feature::BatteryBacked),
            })),
            CommandPayload::SaveState { slot } => {
                self.sim.save_state(*slot)?;
                Ok(Reply::Slot { slot: *slot })
            }
            CommandPayload::LoadState { slot } => {
                self.sim.load_state(*slot)?;
                Ok(Reply::Slot { slot: *slot })
            }
        }
    }

    fn batch_op(&mut self, op: &BatchOp) -> Result<Reply, BridgeError> {
        match op {
            BatchOp::Read { start, len } => {
                self.accessor().read_range(*start, *len).map(Reply::Bytes)
            }
            BatchOp::Write { start, data } => {
                let count = self.accessor().write_range(*start, data)?;
                Ok(Reply::Written {
                    start: *start,
                    count,
                })
            }
        }
    }

    fn accessor(&mut self) -> GuardedStateAccessor<'_, S> {
        GuardedStateAccessor::new(&mut self.sim, &self.regions)
    }

    fn hold_ticks(&self, hold: Option<Hold>) -> Result<u64, BridgeError> {
        match hold {
            None => Ok(1),
            Some(h) => {
                h.validate()?;
                Ok(match h {
                    Hold::Ticks(n) => n,
                    Hold::Millis(ms) => ms_to_ticks(ms.unsigned_abs(), self.tick_rate_hz),
                })
            }
        }
    }

    fn overlay_reply(&self, channel: ChannelId, expires_at: Option<TickId>) -> Reply {
        Reply::Overlay {
            channel,
            applied_at: self.tick,
            expires_at,
        }
    }

    fn input_status(&self) -> Vec<ChannelInput> {
        (0..self.overlays.channel_count())
            .map(|i| {
                let channel = ChannelId(i as u8);
                let raw = self.sim.raw_input(channel);
                ChannelInput {
                    channel,
                    raw,
                    observed: self.overlays.observed(channel, raw),
                }
            })
            .collect()
    }
}

impl<S: Simulation> std::fmt::Debug for Executor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("tick", &self.tick)
            .field("phase", &self.phase)
            .field("paused", &self.paused)
            .field("max_per_tick", &self.max_per_tick)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tickgate_core::{Address, Buttons};
    use tickgate_test_utils::ScriptedSimulation;

    struct Harness {
        executor: Executor<ScriptedSimulation>,
        queue: Arc<CommandQueue>,
        shared: Arc<SharedStatus>,
    }

    fn harness_with(sim: ScriptedSimulation, config: BridgeConfig) -> Harness {
        let queue = Arc::new(CommandQueue::new(config.queue_capacity));
        let regions = Arc::new(RegionTable::new(config.regions.clone()).unwrap());
        let shared = Arc::new(SharedStatus::new());
        let executor = Executor::new(sim, &config, queue.clone(), regions, shared.clone());
        Harness {
            executor,
            queue,
            shared,
        }
    }

    fn harness() -> Harness {
        harness_with(ScriptedSimulation::new(), BridgeConfig::default())
    }

    fn submit(h: &Harness, payload: CommandPayload) -> crate::ResultFuture<Reply> {
        h.queue.submit(payload, h.executor.current_tick()).unwrap()
    }

    fn now(future: crate::ResultFuture<Reply>) -> Result<Reply, BridgeError> {
        future.wait(Duration::ZERO)
    }

    // ── dispatch tests ──────────────────────────────────────────

    #[test]
    fn write_then_read_in_same_tick() {
        let mut h = harness();
        let w = submit(
            &h,
            CommandPayload::WriteByte {
                address: Address(0x0300),
                value: 0x42,
            },
        );
        let r = submit(
            &h,
            CommandPayload::ReadByte {
                address: Address(0x0300),
            },
        );
        let report = h.executor.run_tick();
        assert_eq!(report.executed, 2);
        assert_eq!(
            now(w),
            Ok(Reply::Written {
                start: Address(0x0300),
                count: 1
            })
        );
        assert_eq!(now(r), Ok(Reply::Byte(0x42)));
    }

    #[test]
    fn unloaded_session_fails_precondition() {
        let mut h = harness_with(ScriptedSimulation::unloaded(), BridgeConfig::default());
        let r = submit(&h, CommandPayload::ReadByte { address: Address(0) });
        let s = submit(&h, CommandPayload::Status);
        h.executor.run_tick();
        assert_eq!(now(r), Err(BridgeError::precondition("no session loaded")));
        match now(s) {
            Ok(Reply::Status(status)) => assert!(!status.loaded),
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn conditional_write_fails_through_future() {
        let mut h = harness();
        let w = submit(
            &h,
            CommandPayload::WriteByte {
                address: Address(0x6000),
                value: 1,
            },
        );
        let report = h.executor.run_tick();
        assert_eq!(report.failed, 1);
        assert_eq!(
            now(w),
            Err(BridgeError::PermissionDenied {
                address: Address(0x6000)
            })
        );
    }

    #[test]
    fn batch_reports_each_operation() {
        let mut h = harness();
        let b = submit(
            &h,
            CommandPayload::Batch {
                ops: vec![
                    BatchOp::Write {
                        start: Address(0x10),
                        data: vec![7, 8],
                    },
                    BatchOp::Write {
                        start: Address(0x6000),
                        data: vec![1],
                    },
                    BatchOp::Read {
                        start: Address(0x10),
                        len: 2,
                    },
                ],
            },
        );
        h.executor.run_tick();
        match now(b) {
            Ok(Reply::Batch(results)) => {
                assert_eq!(results.len(), 3);
                assert!(results[0].is_ok());
                assert!(matches!(
                    results[1],
                    Err(BridgeError::PermissionDenied { .. })
                ));
                assert_eq!(results[2], Ok(Reply::Bytes(vec![7, 8])));
            }
            other => panic!("expected Batch, got {other:?}"),
        }
    }

    #[test]
    fn handler_panic_is_isolated() {
        let sim = ScriptedSimulation::new().with_panic_on_read(Address(0x0666));
        let mut h = harness_with(sim, BridgeConfig::default());
        let bad = submit(
            &h,
            CommandPayload::ReadByte {
                address: Address(0x0666),
            },
        );
        let good = submit(
            &h,
            CommandPayload::ReadByte {
                address: Address(0x0001),
            },
        );
        let report = h.executor.run_tick();
        assert_eq!(report.failed, 1);
        assert_eq!(report.executed, 1);
        assert!(matches!(now(bad), Err(BridgeError::Internal { .. })));
        assert_eq!(now(good), Ok(Reply::Byte(0)));
        // The guard lowered the flag during unwinding.
        assert!(!h.executor.simulation().inspection_active());
        assert_eq!(h.shared.metrics.snapshot().handler_panics, 1);
    }

    #[test]
    fn save_and_load_slots() {
        let mut h = harness();
        let save = submit(&h, CommandPayload::SaveState { slot: 2 });
        let load_empty = submit(&h, CommandPayload::LoadState { slot: 3 });
        h.executor.run_tick();
        assert_eq!(now(save), Ok(Reply::Slot { slot: 2 }));
        assert!(matches!(
            now(load_empty),
            Err(BridgeError::PreconditionUnmet { .. })
        ));
    }

    // ── tick tests ──────────────────────────────────────────────

    #[test]
    fn budget_defers_remaining_commands() {
        let config = BridgeConfig {
            max_commands_per_tick: 2,
            ..BridgeConfig::default()
        };
        let mut h = harness_with(ScriptedSimulation::new(), config);
        let futures: Vec<_> = (0..5).map(|_| submit(&h, CommandPayload::Status)).collect();

        let first = h.executor.run_tick();
        assert_eq!(first.executed, 2);
        assert_eq!(first.deferred, 3);
        assert_eq!(h.queue.len(), 3);

        h.executor.run_tick();
        h.executor.run_tick();
        assert!(h.queue.is_empty());

        let ticks: Vec<TickId> = futures
            .into_iter()
            .map(|f| match now(f) {
                Ok(Reply::Status(s)) => s.tick,
                other => panic!("expected Status, got {other:?}"),
            })
            .collect();
        assert_eq!(
            ticks,
            vec![TickId(0), TickId(0), TickId(1), TickId(1), TickId(2)]
        );
        assert_eq!(h.shared.metrics.snapshot().deferred_commands, 4);
    }

    #[test]
    fn tick_advances_and_publishes() {
        let mut h = harness();
        let report = h.executor.run_tick();
        assert_eq!(report.tick, TickId(0));
        assert!(report.stepped);
        assert_eq!(h.executor.current_tick(), TickId(1));
        assert_eq!(h.shared.current_tick(), TickId(1));
        assert_eq!(h.executor.phase(), ExecutorPhase::Idle);
        assert_eq!(h.executor.simulation().steps(), 1);
    }

    #[test]
    fn pause_stops_time_but_not_commands() {
        let mut h = harness();
        let p = submit(&h, CommandPayload::Control(ControlAction::Pause));
        h.executor.run_tick();
        assert_eq!(
            now(p),
            Ok(Reply::Control {
                changed: true,
                paused: true
            })
        );
        let tick = h.executor.current_tick();

        let o = submit(
            &h,
            CommandPayload::SetOverlay {
                channel: ChannelId(0),
                set: Buttons::A,
                clear: Buttons::empty(),
                hold: None,
            },
        );
        let again = submit(&h, CommandPayload::Control(ControlAction::Pause));
        let report = h.executor.run_tick();
        assert!(!report.stepped);
        assert!(now(o).is_ok());
        assert_eq!(
            now(again),
            Ok(Reply::Control {
                changed: false,
                paused: true
            })
        );
        assert_eq!(h.executor.current_tick(), tick);
        // Overlay is still pending since time is frozen.
        assert_eq!(
            h.executor.overlays().observed(ChannelId(0), Buttons::empty()),
            Buttons::A
        );

        submit(&h, CommandPayload::Control(ControlAction::Resume));
        let report = h.executor.run_tick();
        assert!(report.stepped);
        assert_eq!(h.executor.current_tick(), tick.next());
        assert!(h.executor.overlays().channel(ChannelId(0)).unwrap().is_neutral());
    }

    #[test]
    fn step_failure_is_counted_and_ticking_continues() {
        let sim = ScriptedSimulation::new().with_failing_step_at(TickId(1));
        let mut h = harness_with(sim, BridgeConfig::default());
        assert!(!h.executor.run_tick().step_failed);
        assert!(h.executor.run_tick().step_failed);
        assert!(!h.executor.run_tick().step_failed);
        assert_eq!(h.executor.current_tick(), TickId(3));
        assert_eq!(h.shared.metrics.snapshot().step_failures, 1);
    }

    #[test]
    fn millisecond_hold_converts_at_tick_rate() {
        let mut h = harness();
        let o = submit(
            &h,
            CommandPayload::SetOverlay {
                channel: ChannelId(1),
                set: Buttons::B,
                clear: Buttons::empty(),
                hold: Some(Hold::Millis(200)),
            },
        );
        h.executor.run_tick();
        assert_eq!(
            now(o),
            Ok(Reply::Overlay {
                channel: ChannelId(1),
                applied_at: TickId(0),
                expires_at: Some(TickId(12)),
            })
        );
    }

    #[test]
    fn empty_overlay_reports_no_expiry() {
        let mut h = harness();
        let release = submit(
            &h,
            CommandPayload::SetState {
                channel: ChannelId(0),
                buttons: Buttons::empty(),
                hold: None,
            },
        );
        let noop = submit(
            &h,
            CommandPayload::SetOverlay {
                channel: ChannelId(0),
                set: Buttons::empty(),
                clear: Buttons::empty(),
                hold: Some(Hold::Ticks(4)),
            },
        );
        h.executor.run_tick();
        for future in [release, noop] {
            assert_eq!(
                now(future),
                Ok(Reply::Overlay {
                    channel: ChannelId(0),
                    applied_at: TickId(0),
                    expires_at: None,
                })
            );
        }
        assert_eq!(h.executor.overlays().channel(ChannelId(0)).unwrap().pending(), 0);
    }

    #[test]
    fn input_status_reports_raw_and_observed() {
        let sim = ScriptedSimulation::new();
        sim.probe().set_raw_input(ChannelId(0), Buttons::B);
        let mut h = harness_with(sim, BridgeConfig::default());
        submit(
            &h,
            CommandPayload::SetOverlay {
                channel: ChannelId(0),
                set: Buttons::A,
                clear: Buttons::B,
                hold: Some(Hold::Ticks(5)),
            },
        );
        let status = submit(&h, CommandPayload::InputStatus);
        h.executor.run_tick();
        match now(status) {
            Ok(Reply::Input(channels)) => {
                assert_eq!(channels.len(), 4);
                assert_eq!(channels[0].raw, Buttons::B);
                assert_eq!(channels[0].observed, Buttons::A);
                assert_eq!(channels[1].observed, Buttons::empty());
            }
            other => panic!("expected Input, got {other:?}"),
        }
    }
}
