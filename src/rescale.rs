//! Timebase rescaling.

/// Rescale `value`, expressed in `from_ts` ticks per second, into `to_ts`
/// ticks per second, rounding to the nearest tick.
///
/// Uses a 128-bit intermediate so that rescaling a large source-timescale
/// value into the 90kHz output timescale (or back) never overflows a
/// 64-bit multiply.
pub fn rescale_time(value: u64, from_ts: u32, to_ts: u32) -> u64 {
    debug_assert!(from_ts > 0, "source timescale must be nonzero");

    let numerator = value as u128 * to_ts as u128 + (from_ts as u128 / 2);
    (numerator / from_ts as u128) as u64
}
