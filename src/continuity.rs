//! Per-PID continuity counters.

use std::cell::Cell;
use std::rc::Rc;

/// A shared, mod-16 wrapping continuity counter for one PID.
///
/// Shared via `Rc` between a stream's [`crate::stream_state::StreamState`]
/// and the scratch [`crate::frame::OutputFrame`] it hands to its filter
/// chain, so the packetizer can advance it without needing a back-reference
/// into the stream array.
#[derive(Debug, Clone)]
pub struct ContinuityCounter(Rc<Cell<u8>>);

impl ContinuityCounter {
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(0)))
    }

    pub fn get(&self) -> u8 {
        self.0.get()
    }

    /// Advance the counter, wrapping 15 -> 0, and return the pre-advance
    /// value (the value the just-emitted TS packet should carry).
    pub fn next(&self) -> u8 {
        let current = self.0.get();
        self.0.set((current + 1) & 0x0F);
        current
    }

    pub fn reset(&self) {
        self.0.set(0);
    }
}

impl Default for ContinuityCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraps_at_16() {
        let cc = ContinuityCounter::new();
        for expected in 0..15u8 {
            assert_eq!(cc.next(), expected);
        }
        assert_eq!(cc.next(), 15);
        assert_eq!(cc.next(), 0);
    }

    #[test]
    fn test_independent_clones_share_state() {
        let cc = ContinuityCounter::new();
        let shared = cc.clone();
        cc.next();
        assert_eq!(shared.get(), 1);
    }

    #[test]
    fn test_reset() {
        let cc = ContinuityCounter::new();
        cc.next();
        cc.next();
        cc.reset();
        assert_eq!(cc.get(), 0);
    }
}
