//! Drive a realtime bridge from a few worker threads.
//!
//! Run with `RUST_LOG=tickgate_engine=debug` to see the tick thread's
//! lifecycle and per-command logging.

use std::thread;
use std::time::Duration;

use tickgate_core::{Address, Buttons, ChannelId, CommandPayload, Hold, Reply};
use tickgate_engine::{Bridge, BridgeConfig};
use tickgate_test_utils::ScriptedSimulation;
use tracing_subscriber::EnvFilter;

const TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let sim = ScriptedSimulation::new().with_battery(true);
    let probe = sim.probe();
    let mut bridge = Bridge::new(sim, BridgeConfig::default())?;

    // Each worker owns one controller and one byte of work RAM.
    let workers: Vec<_> = (0..4u8)
        .map(|n| {
            let submitter = bridge.submitter();
            thread::spawn(move || {
                let channel = ChannelId(n);
                let address = Address(0x0100 + u16::from(n));
                let overlay = submitter
                    .submit(CommandPayload::SetOverlay {
                        channel,
                        set: Buttons::A,
                        clear: Buttons::empty(),
                        hold: Some(Hold::Millis(250)),
                    })?
                    .wait(TIMEOUT)?;
                let written = submitter
                    .submit(CommandPayload::WriteByte {
                        address,
                        value: n * 10,
                    })?
                    .wait(TIMEOUT)?;
                Ok::<_, tickgate_core::BridgeError>((overlay, written))
            })
        })
        .collect();

    for (n, worker) in workers.into_iter().enumerate() {
        match worker.join() {
            Ok(Ok((overlay, written))) => println!("worker {n}: {overlay:?}, {written:?}"),
            Ok(Err(err)) => println!("worker {n} failed: {err}"),
            Err(_) => println!("worker {n} panicked"),
        }
    }

    if let Reply::Input(inputs) = bridge.execute(CommandPayload::InputStatus, TIMEOUT)? {
        for input in inputs {
            println!(
                "{}: raw {:?}, observed {:?}",
                input.channel.index(),
                input.raw,
                input.observed
            );
        }
    }

    // Save RAM is writable because the session reports a battery.
    bridge.execute(
        CommandPayload::WriteRange {
            start: Address(0x6000),
            data: b"TICKGATE".to_vec(),
        },
        TIMEOUT,
    )?;
    if let Reply::Bytes(bytes) = bridge.execute(
        CommandPayload::ReadRange {
            start: Address(0x6000),
            len: 8,
        },
        TIMEOUT,
    )? {
        println!("save RAM: {}", String::from_utf8_lossy(&bytes));
    }

    let status = bridge.status();
    println!(
        "tick {} | {} executed | {} failed | {} frames stepped",
        status.current_tick,
        status.metrics.commands_executed,
        status.metrics.commands_failed,
        probe.step_count()
    );

    let report = bridge.shutdown();
    println!(
        "shutdown in {} ms, {} commands cancelled",
        report.total_ms, report.cancelled_commands
    );
    Ok(())
}
