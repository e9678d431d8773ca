//! Master clock and per-cube tick deadline.
//!
//! The host owns the clock and advances it uniformly; everything in the
//! emulator is stamped in CPU cycles of this clock.

use std::cell::Cell;
use std::rc::Rc;

/// CPU core clock rate, cycles per second.
pub const HZ: u64 = 16_000_000;

/// Horizon used when a deadline is re-armed with no peripheral event
/// pending. Peripherals lower it from here.
const MAX_INTERVAL: u64 = HZ / 8;

/// Monotonic cycle counter shared between the host, the CPU core and
/// every peripheral of one or more cubes.
#[derive(Debug, Default)]
pub struct VirtualClock {
    clocks: Cell<u64>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current time in CPU cycles.
    #[inline]
    pub fn now(&self) -> u64 {
        self.clocks.get()
    }

    /// Advance the clock. Only the host drives this.
    #[inline]
    pub fn advance(&self, cycles: u64) {
        self.clocks.set(self.clocks.get() + cycles);
    }
}

/// Earliest next-event clock across all peripherals of one cube.
///
/// `hardware_tick` re-arms it, each peripheral lowers it with [`set`],
/// and the CPU core polls [`has_passed`] to decide when to assert
/// `need_hardware_tick` again.
///
/// [`set`]: TickDeadline::set
/// [`has_passed`]: TickDeadline::has_passed
#[derive(Debug)]
pub struct TickDeadline {
    clock: Rc<VirtualClock>,
    at: u64,
}

impl TickDeadline {
    pub fn new(clock: Rc<VirtualClock>) -> Self {
        let at = clock.now();
        Self { clock, at }
    }

    /// Re-arm to the idle horizon. Called once per hardware tick,
    /// before any peripheral runs.
    #[inline]
    pub fn reset(&mut self) {
        self.at = self.clock.now() + MAX_INTERVAL;
    }

    /// Lower the deadline to `at` if it is earlier than the current one.
    #[inline]
    pub fn set(&mut self, at: u64) {
        self.at = self.at.min(at);
    }

    /// Clock value the next hardware tick is due at.
    #[inline]
    pub fn at(&self) -> u64 {
        self.at
    }

    #[inline]
    pub fn has_passed(&self) -> bool {
        self.clock.now() >= self.at
    }

    /// Cycles left until the deadline, zero if it already passed.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.at.saturating_sub(self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_keeps_minimum() {
        let clock = Rc::new(VirtualClock::new());
        let mut dl = TickDeadline::new(clock.clone());
        dl.reset();
        dl.set(5000);
        dl.set(9000);
        assert_eq!(dl.at(), 5000);
        assert!(!dl.has_passed());
        clock.advance(5000);
        assert!(dl.has_passed());
        assert_eq!(dl.remaining(), 0);
    }

    #[test]
    fn reset_rearms_to_horizon() {
        let clock = Rc::new(VirtualClock::new());
        let mut dl = TickDeadline::new(clock.clone());
        dl.set(1);
        dl.reset();
        assert_eq!(dl.at(), clock.now() + MAX_INTERVAL);
    }
}
