//! Bridge configuration, validation, and error types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tickgate_core::Address;

use crate::guard::{Condition, GuardedRegion, Permission};

/// Largest number of input channels a bridge may be configured with.
pub const MAX_CHANNELS: u8 = 8;

// ── ConfigError ────────────────────────────────────────────────

/// Errors detected during [`BridgeConfig::validate()`] or bridge startup.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// `queue_capacity` is zero.
    #[error("queue_capacity must be at least 1")]
    QueueCapacityZero,
    /// `max_commands_per_tick` is zero.
    #[error("max_commands_per_tick must be at least 1")]
    TickBudgetZero,
    /// `tick_rate_hz` is NaN, infinite, zero, negative, or so small its
    /// reciprocal is not a representable duration.
    #[error("tick_rate_hz must be finite and positive, got {value}")]
    InvalidTickRate {
        /// The invalid value.
        value: f64,
    },
    /// `channel_count` is zero or above [`MAX_CHANNELS`].
    #[error("channel_count must be in 1..={max}, got {value}", max = MAX_CHANNELS)]
    InvalidChannelCount {
        /// The invalid value.
        value: u8,
    },
    /// `default_timeout_ms` is zero.
    #[error("default_timeout_ms must be at least 1")]
    TimeoutZero,
    /// A region's `end` precedes its `start`.
    #[error("region '{name}' ends at {end} before it starts at {start}")]
    EmptyRegion {
        /// The region's name.
        name: String,
        /// First address.
        start: Address,
        /// Last address.
        end: Address,
    },
    /// Two regions cover the same address.
    #[error("regions '{first}' and '{second}' overlap")]
    OverlappingRegions {
        /// Name of the lower region.
        first: String,
        /// Name of the region that overlaps it.
        second: String,
    },
    /// The configuration text could not be parsed.
    #[error("malformed configuration: {reason}")]
    Parse {
        /// Parser diagnostic.
        reason: String,
    },
    /// The OS refused to spawn the tick thread.
    #[error("failed to spawn thread: {reason}")]
    ThreadSpawnFailed {
        /// The OS error message.
        reason: String,
    },
}

// ── BridgeConfig ───────────────────────────────────────────────

/// Complete configuration for a [`Bridge`](crate::Bridge) or
/// [`LockstepBridge`](crate::LockstepBridge).
///
/// Missing fields take their [`Default`] values when deserialized, so a
/// request layer can load a partial JSON document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum number of commands waiting in the queue.
    pub queue_capacity: usize,
    /// Maximum number of commands executed per tick. The rest wait for
    /// the next tick in order.
    pub max_commands_per_tick: usize,
    /// Tick rate of the realtime loop, also used to convert millisecond
    /// holds to ticks.
    pub tick_rate_hz: f64,
    /// Number of input channels.
    pub channel_count: u8,
    /// Write-permission map. Addresses outside every region are read-only.
    pub regions: Vec<GuardedRegion>,
    /// Suggested producer wait, used by [`Bridge::execute`](crate::Bridge::execute)
    /// callers that do not pick their own.
    pub default_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            max_commands_per_tick: 16,
            tick_rate_hz: 60.0,
            channel_count: 4,
            regions: default_regions(),
            default_timeout_ms: 2000,
        }
    }
}

/// Work RAM read-write, battery-backed save RAM writable only when the
/// session has a battery, everything else read-only.
pub fn default_regions() -> Vec<GuardedRegion> {
    vec![
        GuardedRegion::new("ram", Address(0x0000), Address(0x07FF), Permission::ReadWrite),
        GuardedRegion::new(
            "sram",
            Address(0x6000),
            Address(0x7FFF),
            Permission::Conditional(Condition::BatteryBacked),
        ),
    ]
}

impl BridgeConfig {
    /// Parse a JSON document and validate the result.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = serde_json::from_str(text).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. Queue must hold at least one command.
        if self.queue_capacity == 0 {
            return Err(ConfigError::QueueCapacityZero);
        }
        // 2. The executor must make progress every tick.
        if self.max_commands_per_tick == 0 {
            return Err(ConfigError::TickBudgetZero);
        }
        // 3. Tick rate must be finite, positive, with a usable reciprocal.
        let hz = self.tick_rate_hz;
        if !hz.is_finite() || hz <= 0.0 || !(1.0 / hz).is_finite() {
            return Err(ConfigError::InvalidTickRate { value: hz });
        }
        if Duration::try_from_secs_f64(1.0 / hz).is_err() {
            return Err(ConfigError::InvalidTickRate { value: hz });
        }
        // 4. Channel count.
        if self.channel_count == 0 || self.channel_count > MAX_CHANNELS {
            return Err(ConfigError::InvalidChannelCount {
                value: self.channel_count,
            });
        }
        // 5. Timeout.
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::TimeoutZero);
        }
        // 6. Regions are non-empty and disjoint.
        validate_regions(&self.regions)?;

        Ok(())
    }

    /// The wall-clock budget of one tick.
    ///
    /// Only meaningful after [`validate()`](Self::validate) succeeds.
    pub fn tick_budget(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.tick_rate_hz).unwrap_or(Duration::from_secs(1))
    }

    /// [`default_timeout_ms`](Self::default_timeout_ms) as a `Duration`.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

pub(crate) fn validate_regions(regions: &[GuardedRegion]) -> Result<(), ConfigError> {
    for region in regions {
        if region.end < region.start {
            return Err(ConfigError::EmptyRegion {
                name: region.name.clone(),
                start: region.start,
                end: region.end,
            });
        }
    }

    let mut sorted: Vec<&GuardedRegion> = regions.iter().collect();
    sorted.sort_by_key(|r| r.start);
    for pair in sorted.windows(2) {
        if pair[1].start <= pair[0].end {
            return Err(ConfigError::OverlappingRegions {
                first: pair[0].name.clone(),
                second: pair[1].name.clone(),
            });
        }
    }
    Ok(())
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::ThreadSpawnFailed {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(BridgeConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_zero_capacity_fails() {
        let cfg = BridgeConfig {
            queue_capacity: 0,
            ..BridgeConfig::default()
        };
        match cfg.validate() {
            Err(ConfigError::QueueCapacityZero) => {}
            other => panic!("expected QueueCapacityZero, got {other:?}"),
        }
    }

    #[test]
    fn validate_zero_budget_fails() {
        let cfg = BridgeConfig {
            max_commands_per_tick: 0,
            ..BridgeConfig::default()
        };
        match cfg.validate() {
            Err(ConfigError::TickBudgetZero) => {}
            other => panic!("expected TickBudgetZero, got {other:?}"),
        }
    }

    #[test]
    fn validate_bad_tick_rates_fail() {
        for value in [0.0, -60.0, f64::NAN, f64::INFINITY, 1e-320] {
            let cfg = BridgeConfig {
                tick_rate_hz: value,
                ..BridgeConfig::default()
            };
            match cfg.validate() {
                Err(ConfigError::InvalidTickRate { .. }) => {}
                other => panic!("expected InvalidTickRate for {value}, got {other:?}"),
            }
        }
    }

    #[test]
    fn validate_channel_count_bounds() {
        for value in [0, MAX_CHANNELS + 1] {
            let cfg = BridgeConfig {
                channel_count: value,
                ..BridgeConfig::default()
            };
            match cfg.validate() {
                Err(ConfigError::InvalidChannelCount { value: v }) => assert_eq!(v, value),
                other => panic!("expected InvalidChannelCount, got {other:?}"),
            }
        }
        let cfg = BridgeConfig {
            channel_count: MAX_CHANNELS,
            ..BridgeConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_overlapping_regions_fail() {
        let cfg = BridgeConfig {
            regions: vec![
                GuardedRegion::new("low", Address(0x0000), Address(0x00FF), Permission::ReadWrite),
                GuardedRegion::new("high", Address(0x00FF), Address(0x01FF), Permission::ReadOnly),
            ],
            ..BridgeConfig::default()
        };
        match cfg.validate() {
            Err(ConfigError::OverlappingRegions { first, second }) => {
                assert_eq!(first, "low");
                assert_eq!(second, "high");
            }
            other => panic!("expected OverlappingRegions, got {other:?}"),
        }
    }

    #[test]
    fn validate_inverted_region_fails() {
        let cfg = BridgeConfig {
            regions: vec![GuardedRegion::new(
                "backwards",
                Address(0x0200),
                Address(0x0100),
                Permission::ReadWrite,
            )],
            ..BridgeConfig::default()
        };
        match cfg.validate() {
            Err(ConfigError::EmptyRegion { name, .. }) => assert_eq!(name, "backwards"),
            other => panic!("expected EmptyRegion, got {other:?}"),
        }
    }

    #[test]
    fn partial_json_takes_defaults() {
        let cfg = BridgeConfig::from_json_str(r#"{ "tick_rate_hz": 50.0, "channel_count": 2 }"#)
            .unwrap();
        assert_eq!(cfg.tick_rate_hz, 50.0);
        assert_eq!(cfg.channel_count, 2);
        assert_eq!(cfg.queue_capacity, 1000);
        assert_eq!(cfg.regions, default_regions());
    }

    #[test]
    fn json_regions_round_trip() {
        let cfg = BridgeConfig::default();
        let text = serde_json::to_string(&cfg).unwrap();
        assert!(text.contains("battery_backed"));
        assert_eq!(BridgeConfig::from_json_str(&text).unwrap(), cfg);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        match BridgeConfig::from_json_str("{ queue_capacity: ") {
            Err(ConfigError::Parse { .. }) => {}
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn json_is_validated() {
        match BridgeConfig::from_json_str(r#"{ "queue_capacity": 0 }"#) {
            Err(ConfigError::QueueCapacityZero) => {}
            other => panic!("expected QueueCapacityZero, got {other:?}"),
        }
    }

    #[test]
    fn tick_budget_matches_rate() {
        let cfg = BridgeConfig {
            tick_rate_hz: 50.0,
            ..BridgeConfig::default()
        };
        let budget = cfg.tick_budget().as_secs_f64();
        assert!((budget - 0.020).abs() < 1e-6, "budget was {budget}");
    }
}
