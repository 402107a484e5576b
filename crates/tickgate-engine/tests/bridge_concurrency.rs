//! Producer-side contracts under concurrency: FIFO acceptance order,
//! bounded capacity, the producer timeout, and shutdown cancellation.

use std::thread;
use std::time::{Duration, Instant};

use tickgate_core::{Address, BridgeError, CommandId, CommandPayload, Reply, TickId};
use tickgate_engine::{Bridge, BridgeConfig, LockstepBridge, ResultFuture};
use tickgate_test_utils::ScriptedSimulation;

const PRODUCERS: usize = 4;
const PER_PRODUCER: usize = 50;

fn status_tick(future: ResultFuture<Reply>) -> TickId {
    match future.wait(Duration::ZERO) {
        Ok(Reply::Status(status)) => status.tick,
        other => panic!("expected Status, got {other:?}"),
    }
}

#[test]
fn execution_follows_acceptance_order_across_producers() {
    // One command per tick makes each command's tick its execution position.
    let config = BridgeConfig {
        max_commands_per_tick: 1,
        ..BridgeConfig::default()
    };
    let mut bridge = LockstepBridge::new(ScriptedSimulation::new(), config).unwrap();

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let submitter = bridge.submitter();
            thread::spawn(move || {
                (0..PER_PRODUCER)
                    .map(|_| submitter.submit(CommandPayload::Status).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let per_producer: Vec<Vec<ResultFuture<Reply>>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    bridge.step_n((PRODUCERS * PER_PRODUCER) as u64);
    assert_eq!(bridge.status().queue_depth, 0);

    let mut all: Vec<(CommandId, TickId)> = Vec::new();
    for futures in per_producer {
        let ids: Vec<CommandId> = futures.iter().map(ResultFuture::id).collect();
        let ticks: Vec<TickId> = futures.into_iter().map(status_tick).collect();
        // Each producer's own submissions execute in its submission order.
        assert!(ticks.windows(2).all(|w| w[0] < w[1]));
        all.extend(ids.into_iter().zip(ticks));
    }

    // Globally, execution order is identifier (acceptance) order.
    all.sort_by_key(|(id, _)| *id);
    assert!(all.windows(2).all(|w| w[0].1 < w[1].1));
    assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
}

#[test]
fn full_queue_rejects_without_blocking() {
    let config = BridgeConfig {
        queue_capacity: 3,
        max_commands_per_tick: 2,
        ..BridgeConfig::default()
    };
    let mut bridge = LockstepBridge::new(ScriptedSimulation::new(), config).unwrap();
    let accepted: Vec<_> = (0..3)
        .map(|_| bridge.submit(CommandPayload::Status).unwrap())
        .collect();

    let start = Instant::now();
    match bridge.submit(CommandPayload::Status) {
        Err(BridgeError::QueueFull) => {}
        other => panic!("expected QueueFull, got {other:?}"),
    }
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(bridge.status().queue_depth, 3);
    assert_eq!(bridge.status().metrics.queue_full_rejections, 1);

    // One tick frees two slots; nothing accepted was dropped.
    bridge.step();
    bridge.submit(CommandPayload::Status).unwrap();
    bridge.submit(CommandPayload::Status).unwrap();
    bridge.step_n(2);
    for future in accepted {
        status_tick(future);
    }
}

/// Submit a command and wait for its reply, which arrives while the
/// executor is still inside that tick's command window. A command
/// submitted right after this returns misses the drain and waits for
/// the next tick, i.e. for the whole stalled step.
fn sync_with_tick(bridge: &Bridge<ScriptedSimulation>) {
    bridge
        .execute(CommandPayload::Status, Duration::from_secs(10))
        .unwrap();
}

#[test]
fn producer_times_out_while_tick_thread_stalls() {
    let sim = ScriptedSimulation::new().with_step_delay(Duration::from_millis(400));
    let bridge = Bridge::new(sim, BridgeConfig::default()).unwrap();
    sync_with_tick(&bridge);

    let start = Instant::now();
    let late = bridge.submit(CommandPayload::ReadByte {
        address: Address(0x0000),
    });
    let outcome = late.unwrap().wait(Duration::from_millis(50));
    let waited = start.elapsed();

    assert_eq!(outcome, Err(BridgeError::Timeout));
    assert!(waited >= Duration::from_millis(50));
    assert!(waited < Duration::from_millis(350), "waited {waited:?}");

    // The abandoned command still runs later; the bridge keeps serving.
    let reply = bridge
        .execute(CommandPayload::Status, Duration::from_secs(10))
        .unwrap();
    assert!(matches!(reply, Reply::Status(_)));
    assert!(bridge.status().metrics.commands_executed >= 3);
}

#[test]
fn shutdown_cancels_queued_commands() {
    let sim = ScriptedSimulation::new().with_step_delay(Duration::from_millis(300));
    let mut bridge = Bridge::new(sim, BridgeConfig::default()).unwrap();
    sync_with_tick(&bridge);

    let queued: Vec<_> = (0..3)
        .map(|_| bridge.submit(CommandPayload::Status).unwrap())
        .collect();
    let report = bridge.shutdown();

    assert!(report.tick_joined);
    assert_eq!(report.cancelled_commands, 3);
    for future in queued {
        assert_eq!(
            future.wait(Duration::from_millis(10)),
            Err(BridgeError::Shutdown)
        );
    }
    assert!(!bridge.status().consumer_alive);
}

#[test]
fn many_producers_against_realtime_bridge() {
    let config = BridgeConfig {
        tick_rate_hz: 240.0,
        ..BridgeConfig::default()
    };
    let bridge = Bridge::new(ScriptedSimulation::new(), config).unwrap();

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let submitter = bridge.submitter();
            thread::spawn(move || {
                let address = Address(0x0100 + p as u16);
                for value in 0..20u8 {
                    let reply = submitter
                        .submit(CommandPayload::WriteByte { address, value })
                        .unwrap()
                        .wait(Duration::from_secs(10));
                    assert!(matches!(reply, Ok(Reply::Written { count: 1, .. })));
                }
                submitter
                    .submit(CommandPayload::ReadByte { address })
                    .unwrap()
                    .wait(Duration::from_secs(10))
            })
        })
        .collect();

    for handle in handles {
        // Each producer's last write is the value it reads back.
        assert_eq!(handle.join().unwrap(), Ok(Reply::Byte(19)));
    }
    let status = bridge.status();
    assert_eq!(status.metrics.commands_executed, (PRODUCERS * 21) as u64);
    assert_eq!(status.metrics.commands_failed, 0);
}
