//! Timed input overlays.
//!
//! Each channel carries two masks over the raw input the simulation
//! reports:
//!
//! ```text
//! observed = (raw & force_clear) | force_set
//! ```
//!
//! Neutral is `force_clear = 0xFF, force_set = 0x00`, which leaves raw
//! input untouched. Every overlay operation records an expiration entry
//! `(tick, set_bits, clear_bits)`; when the executor advances to that
//! tick the entry's bits are released unless another pending entry still
//! holds them. A channel whose last entry expires returns to neutral.
//!
//! Overlay state is owned by the executor and mutated only on the tick
//! thread. Producers express "hold this for N ticks" as a command and
//! never touch these masks directly.

use smallvec::{smallvec, SmallVec};

use tickgate_core::{BridgeError, Buttons, ChannelId, InputFrame, TickId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Expiry {
    at: TickId,
    set: Buttons,
    clear: Buttons,
}

impl Expiry {
    fn is_empty(&self) -> bool {
        self.set.is_empty() && self.clear.is_empty()
    }
}

// ── ChannelOverlay ─────────────────────────────────────────────

/// Overlay state for one input channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelOverlay {
    force_clear: Buttons,
    force_set: Buttons,
    /// Ordered by `at`; equal ticks keep insertion order.
    expirations: SmallVec<[Expiry; 4]>,
}

impl Default for ChannelOverlay {
    fn default() -> Self {
        Self::neutral()
    }
}

impl ChannelOverlay {
    /// A channel that passes raw input through unchanged.
    pub fn neutral() -> Self {
        Self {
            force_clear: Buttons::all(),
            force_set: Buttons::empty(),
            expirations: SmallVec::new(),
        }
    }

    /// Apply the overlay to raw input.
    pub fn observed(&self, raw: Buttons) -> Buttons {
        (raw & self.force_clear) | self.force_set
    }

    /// Buttons forced pressed.
    pub fn force_set(&self) -> Buttons {
        self.force_set
    }

    /// Mask of buttons allowed through from raw input. A cleared bit
    /// forces that button released.
    pub fn force_clear(&self) -> Buttons {
        self.force_clear
    }

    /// Whether the channel passes raw input through unchanged.
    pub fn is_neutral(&self) -> bool {
        self.force_clear == Buttons::all() && self.force_set.is_empty()
    }

    /// Number of scheduled expirations.
    pub fn pending(&self) -> usize {
        self.expirations.len()
    }

    /// Earliest scheduled expiration, if any.
    pub fn next_expiry(&self) -> Option<TickId> {
        self.expirations.first().map(|e| e.at)
    }

    /// Returns whether an expiration was recorded.
    fn schedule(&mut self, entry: Expiry) -> bool {
        if entry.is_empty() {
            return false;
        }
        let pos = self.expirations.partition_point(|e| e.at <= entry.at);
        self.expirations.insert(pos, entry);
        true
    }

    fn hold(&mut self, set: Buttons, clear: Buttons, at: TickId) -> bool {
        self.force_set |= set;
        self.force_clear &= !clear;
        self.schedule(Expiry { at, set, clear })
    }

    fn release(&mut self, buttons: Option<Buttons>) {
        let Some(bits) = buttons else {
            *self = Self::neutral();
            return;
        };
        self.force_set.remove(bits);
        for entry in self.expirations.iter_mut() {
            entry.set.remove(bits);
        }
        self.expirations.retain(|e| !e.is_empty());
        if self.expirations.is_empty() {
            *self = Self::neutral();
        }
    }

    fn replace(&mut self, buttons: Buttons, at: TickId) -> bool {
        *self = Self::neutral();
        self.force_set = buttons;
        self.schedule(Expiry {
            at,
            set: buttons,
            clear: Buttons::empty(),
        })
    }

    fn expire(&mut self, now: TickId) {
        let due = self.expirations.partition_point(|e| e.at <= now);
        if due == 0 {
            return;
        }
        let expired: SmallVec<[Expiry; 4]> = self.expirations.drain(..due).collect();
        if self.expirations.is_empty() {
            *self = Self::neutral();
            return;
        }

        let (still_set, still_clear) = self
            .expirations
            .iter()
            .fold((Buttons::empty(), Buttons::empty()), |(s, c), e| {
                (s | e.set, c | e.clear)
            });
        for entry in expired {
            self.force_set.remove(entry.set - still_set);
            self.force_clear.insert(entry.clear - still_clear);
        }
    }
}

// ── OverlaySet ─────────────────────────────────────────────────

/// Overlay state for every configured channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlaySet {
    channels: SmallVec<[ChannelOverlay; 8]>,
}

impl OverlaySet {
    /// `channel_count` neutral channels.
    pub fn new(channel_count: u8) -> Self {
        Self {
            channels: smallvec![ChannelOverlay::neutral(); usize::from(channel_count)],
        }
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// State of one channel.
    pub fn channel(&self, channel: ChannelId) -> Option<&ChannelOverlay> {
        self.channels.get(channel.index())
    }

    /// Check that `channel` exists.
    pub fn check_channel(&self, channel: ChannelId) -> Result<(), BridgeError> {
        if channel.index() < self.channels.len() {
            Ok(())
        } else {
            Err(unknown_channel(channel, self.channels.len()))
        }
    }

    fn channel_mut(&mut self, channel: ChannelId) -> Result<&mut ChannelOverlay, BridgeError> {
        let count = self.channels.len();
        self.channels
            .get_mut(channel.index())
            .ok_or_else(|| unknown_channel(channel, count))
    }

    /// Add forced bits to a channel for `duration` ticks starting at `now`.
    ///
    /// Additive: bits already forced by other overlays stay forced.
    /// Returns the tick at which this overlay's bits lapse, or `None` if
    /// both masks are empty and nothing was scheduled.
    pub fn set_overlay(
        &mut self,
        channel: ChannelId,
        set: Buttons,
        clear: Buttons,
        now: TickId,
        duration: u64,
    ) -> Result<Option<TickId>, BridgeError> {
        check_duration(duration)?;
        let at = now.offset(duration);
        let scheduled = self.channel_mut(channel)?.hold(set, clear, at);
        Ok(scheduled.then_some(at))
    }

    /// Release forced-pressed bits immediately.
    ///
    /// `Some(bits)` removes `bits` from the forced-pressed mask and from
    /// every pending expiration. `None` returns the channel to neutral
    /// and cancels all its expirations.
    pub fn clear_overlay(
        &mut self,
        channel: ChannelId,
        buttons: Option<Buttons>,
    ) -> Result<(), BridgeError> {
        self.channel_mut(channel)?.release(buttons);
        Ok(())
    }

    /// Replace a channel's overlay with exactly `buttons` pressed for
    /// `duration` ticks. Cancels every earlier expiration on the channel.
    ///
    /// Empty `buttons` leaves the channel neutral and returns `None`.
    pub fn set_state(
        &mut self,
        channel: ChannelId,
        buttons: Buttons,
        now: TickId,
        duration: u64,
    ) -> Result<Option<TickId>, BridgeError> {
        check_duration(duration)?;
        let at = now.offset(duration);
        let scheduled = self.channel_mut(channel)?.replace(buttons, at);
        Ok(scheduled.then_some(at))
    }

    /// Observed input for `channel`. Unknown channels pass `raw` through.
    pub fn observed(&self, channel: ChannelId, raw: Buttons) -> Buttons {
        self.channel(channel)
            .map_or(raw, |overlay| overlay.observed(raw))
    }

    /// Process every expiration due at or before `now`.
    pub fn expire(&mut self, now: TickId) {
        for overlay in self.channels.iter_mut() {
            overlay.expire(now);
        }
    }

    /// Return every channel to neutral.
    pub fn reset(&mut self) {
        for overlay in self.channels.iter_mut() {
            *overlay = ChannelOverlay::neutral();
        }
    }

    /// Build the input frame for tick `tick` from each channel's raw input.
    pub fn frame(&self, tick: TickId, mut raw: impl FnMut(ChannelId) -> Buttons) -> InputFrame {
        let channels = self
            .channels
            .iter()
            .enumerate()
            .map(|(i, overlay)| overlay.observed(raw(ChannelId(i as u8))))
            .collect();
        InputFrame { tick, channels }
    }
}

fn check_duration(duration: u64) -> Result<(), BridgeError> {
    if duration == 0 {
        return Err(BridgeError::invalid("hold must be at least one tick"));
    }
    Ok(())
}

fn unknown_channel(channel: ChannelId, count: usize) -> BridgeError {
    BridgeError::invalid(format!(
        "channel {channel} out of range (have {count} channels)"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CH: ChannelId = ChannelId(0);

    fn b(bits: u8) -> Buttons {
        Buttons::from_bits_retain(bits)
    }

    #[test]
    fn neutral_passes_raw_through() {
        let set = OverlaySet::new(2);
        for raw in [0x00, 0x5A, 0xFF] {
            assert_eq!(set.observed(CH, b(raw)), b(raw));
        }
        assert!(set.channel(CH).unwrap().is_neutral());
    }

    #[test]
    fn set_overlay_forces_and_suppresses() {
        let mut set = OverlaySet::new(1);
        set.set_overlay(CH, Buttons::A, Buttons::B, TickId(0), 5)
            .unwrap();
        // Raw B is suppressed, A is forced.
        assert_eq!(set.observed(CH, Buttons::B), Buttons::A);
        assert_eq!(
            set.observed(CH, Buttons::START),
            Buttons::A | Buttons::START
        );
    }

    #[test]
    fn pulse_resets_at_next_tick() {
        let mut set = OverlaySet::new(1);
        let at = set
            .set_overlay(CH, Buttons::A, Buttons::empty(), TickId(10), 1)
            .unwrap();
        assert_eq!(at, Some(TickId(11)));
        assert_eq!(set.observed(CH, Buttons::empty()), Buttons::A);
        set.expire(TickId(11));
        assert_eq!(set.observed(CH, Buttons::empty()), Buttons::empty());
        assert!(set.channel(CH).unwrap().is_neutral());
    }

    #[test]
    fn overlays_are_additive() {
        let mut set = OverlaySet::new(1);
        set.set_overlay(CH, Buttons::A, Buttons::empty(), TickId(0), 2)
            .unwrap();
        set.set_overlay(CH, Buttons::RIGHT, Buttons::empty(), TickId(0), 6)
            .unwrap();
        assert_eq!(
            set.observed(CH, Buttons::empty()),
            Buttons::A | Buttons::RIGHT
        );
        set.expire(TickId(2));
        assert_eq!(set.observed(CH, Buttons::empty()), Buttons::RIGHT);
        set.expire(TickId(6));
        assert!(set.channel(CH).unwrap().is_neutral());
    }

    #[test]
    fn shared_bit_survives_earlier_expiry() {
        let mut set = OverlaySet::new(1);
        set.set_overlay(CH, Buttons::A, Buttons::B, TickId(0), 2)
            .unwrap();
        set.set_overlay(CH, Buttons::A, Buttons::B, TickId(0), 4)
            .unwrap();
        set.expire(TickId(2));
        // Still held by the second entry.
        assert_eq!(set.observed(CH, Buttons::B), Buttons::A);
        set.expire(TickId(4));
        assert_eq!(set.observed(CH, Buttons::B), Buttons::B);
    }

    #[test]
    fn clear_specific_bits_cancels_their_expiry() {
        let mut set = OverlaySet::new(1);
        set.set_overlay(CH, Buttons::A | Buttons::B, Buttons::empty(), TickId(0), 10)
            .unwrap();
        set.clear_overlay(CH, Some(Buttons::A)).unwrap();
        assert_eq!(set.observed(CH, Buttons::empty()), Buttons::B);
        assert_eq!(set.channel(CH).unwrap().pending(), 1);

        set.clear_overlay(CH, Some(Buttons::B)).unwrap();
        assert!(set.channel(CH).unwrap().is_neutral());
        assert_eq!(set.channel(CH).unwrap().pending(), 0);
    }

    #[test]
    fn clear_all_neutralizes() {
        let mut set = OverlaySet::new(1);
        set.set_overlay(CH, Buttons::A, Buttons::DOWN, TickId(0), 10)
            .unwrap();
        set.clear_overlay(CH, None).unwrap();
        assert!(set.channel(CH).unwrap().is_neutral());
        assert_eq!(set.channel(CH).unwrap().pending(), 0);
    }

    #[test]
    fn set_state_replaces_and_cancels() {
        let mut set = OverlaySet::new(1);
        set.set_overlay(CH, Buttons::A, Buttons::B, TickId(0), 12)
            .unwrap();
        set.set_state(CH, Buttons::START, TickId(5), 3).unwrap();
        let overlay = set.channel(CH).unwrap();
        assert_eq!(overlay.force_set(), Buttons::START);
        assert_eq!(overlay.force_clear(), Buttons::all());
        assert_eq!(overlay.next_expiry(), Some(TickId(8)));
        assert_eq!(overlay.pending(), 1);
        // Raw B is no longer suppressed.
        assert_eq!(set.observed(CH, Buttons::B), Buttons::B | Buttons::START);
    }

    #[test]
    fn set_state_empty_is_neutral() {
        let mut set = OverlaySet::new(1);
        set.set_overlay(CH, Buttons::A | Buttons::RIGHT, Buttons::empty(), TickId(100), 12)
            .unwrap();
        assert_eq!(set.set_state(CH, Buttons::empty(), TickId(106), 1), Ok(None));
        assert!(set.channel(CH).unwrap().is_neutral());
        assert_eq!(set.channel(CH).unwrap().pending(), 0);
    }

    #[test]
    fn empty_overlay_schedules_nothing() {
        let mut set = OverlaySet::new(1);
        assert_eq!(
            set.set_overlay(CH, Buttons::empty(), Buttons::empty(), TickId(3), 5),
            Ok(None)
        );
        assert_eq!(set.channel(CH).unwrap().pending(), 0);
        assert!(set.channel(CH).unwrap().is_neutral());
    }

    #[test]
    fn zero_duration_rejected() {
        let mut set = OverlaySet::new(1);
        assert!(set
            .set_overlay(CH, Buttons::A, Buttons::empty(), TickId(0), 0)
            .is_err());
        assert!(set.set_state(CH, Buttons::A, TickId(0), 0).is_err());
        assert!(set.channel(CH).unwrap().is_neutral());
    }

    #[test]
    fn unknown_channel_rejected() {
        let mut set = OverlaySet::new(2);
        match set.set_overlay(ChannelId(2), Buttons::A, Buttons::empty(), TickId(0), 1) {
            Err(BridgeError::InvalidArgument { reason }) => assert!(reason.contains("channel 2")),
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
        assert!(set.clear_overlay(ChannelId(9), None).is_err());
        assert!(set.check_channel(ChannelId(1)).is_ok());
        assert_eq!(set.observed(ChannelId(5), Buttons::A), Buttons::A);
    }

    #[test]
    fn frame_applies_each_channel() {
        let mut set = OverlaySet::new(2);
        set.set_overlay(ChannelId(1), Buttons::UP, Buttons::empty(), TickId(0), 1)
            .unwrap();
        let frame = set.frame(TickId(0), |ch| {
            if ch == ChannelId(0) {
                Buttons::B
            } else {
                Buttons::empty()
            }
        });
        assert_eq!(frame.channels.as_slice(), &[Buttons::B, Buttons::UP]);
        assert_eq!(frame.tick, TickId(0));
    }

    #[test]
    fn reset_neutralizes_every_channel() {
        let mut set = OverlaySet::new(3);
        for ch in 0..3 {
            set.set_overlay(ChannelId(ch), Buttons::A, Buttons::B, TickId(0), 9)
                .unwrap();
        }
        set.reset();
        assert_eq!(set, OverlaySet::new(3));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn observed_matches_algebra(
                ops in proptest::collection::vec((any::<u8>(), any::<u8>(), 1u64..8), 0..6),
                raw in any::<u8>(),
            ) {
                let mut set = OverlaySet::new(1);
                for (s, c, d) in ops {
                    set.set_overlay(CH, b(s), b(c), TickId(0), d).unwrap();
                }
                let ch = set.channel(CH).unwrap();
                let expected = (raw & ch.force_clear().bits()) | ch.force_set().bits();
                prop_assert_eq!(set.observed(CH, b(raw)).bits(), expected);
            }

            #[test]
            fn everything_lapses_by_last_expiry(
                ops in proptest::collection::vec((any::<u8>(), any::<u8>(), 1u64..20), 1..8),
                raw in any::<u8>(),
            ) {
                let mut set = OverlaySet::new(1);
                let mut last = TickId(0);
                for (s, c, d) in ops {
                    if let Some(at) = set.set_overlay(CH, b(s), b(c), TickId(0), d).unwrap() {
                        last = last.max(at);
                    }
                }
                for t in 1..=last.0 {
                    set.expire(TickId(t));
                }
                prop_assert!(set.channel(CH).unwrap().is_neutral());
                prop_assert_eq!(set.observed(CH, b(raw)), b(raw));
            }

            #[test]
            fn live_entries_keep_their_bits(
                ops in proptest::collection::vec((any::<u8>(), any::<u8>(), 1u64..20), 1..8),
                now in 0u64..20,
            ) {
                let mut set = OverlaySet::new(1);
                let mut entries = Vec::new();
                for (s, c, d) in ops {
                    if let Some(at) = set.set_overlay(CH, b(s), b(c), TickId(0), d).unwrap() {
                        entries.push((at, b(s), b(c)));
                    }
                }
                set.expire(TickId(now));
                let ch = set.channel(CH).unwrap();
                for (at, s, c) in entries {
                    if at.0 > now {
                        prop_assert!(ch.force_set().contains(s));
                        prop_assert!((ch.force_clear() & c).is_empty());
                    }
                }
            }
        }
    }
}
