//! Wall-clock to tick conversion.

/// Convert a wall-clock duration to a whole number of ticks at the given
/// rate.
///
/// Rounds half away from zero and never returns fewer than one tick, so
/// any requested hold is observable for at least one step. A rate that
/// is not a positive finite number also yields one tick.
///
/// # Examples
///
/// ```
/// use tickgate_core::ms_to_ticks;
///
/// assert_eq!(ms_to_ticks(1000, 60.0), 60);
/// assert_eq!(ms_to_ticks(200, 60.0), 12);
/// assert_eq!(ms_to_ticks(1, 60.0), 1);
/// ```
pub fn ms_to_ticks(duration_ms: u64, ticks_per_second: f64) -> u64 {
    let ticks = (duration_ms as f64 * ticks_per_second / 1000.0).round();
    if ticks.is_finite() && ticks >= 1.0 {
        // `as` saturates for values beyond u64::MAX.
        ticks as u64
    } else {
        1
    }
}
