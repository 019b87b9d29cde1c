//! Hardware abstraction seams (spec §5, §9). Generalizes the teacher's
//! `Chip` trait (a thin `unsafe fn read/write` seam over a specific bus)
//! into the two seams this crate's line driver actually needs: a level
//! it can sense, a level it can drive, and a clock it can read.
//!
//! Built on `embedded-hal` 1.0's digital traits so any board support
//! package already implementing them (real GPIO, or a host-side mock for
//! tests) plugs in without an adapter layer.

use embedded_hal::digital::{InputPin, OutputPin};

/// Senses the OpenTherm line's logical level. Implemented by wrapping an
/// `embedded_hal::digital::InputPin` reading the demodulated line state
/// (the physical OpenTherm signal is a current-loop; demodulating it to a
/// digital level is the embedding board support package's job, out of
/// scope here per spec §2's line-encoding Non-goal).
pub trait LineInput {
    type Error;

    /// True if the line currently reads logical high.
    fn is_high(&mut self) -> Result<bool, Self::Error>;
}

impl<T: InputPin> LineInput for T {
    type Error = T::Error;

    fn is_high(&mut self) -> Result<bool, Self::Error> {
        InputPin::is_high(self)
    }
}

/// Drives the OpenTherm line's logical level.
pub trait LineOutput {
    type Error;

    fn set_high(&mut self) -> Result<(), Self::Error>;
    fn set_low(&mut self) -> Result<(), Self::Error>;
}

impl<T: OutputPin> LineOutput for T {
    type Error = T::Error;

    fn set_high(&mut self) -> Result<(), Self::Error> {
        OutputPin::set_high(self)
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        OutputPin::set_low(self)
    }
}

/// Monotonic microsecond timestamp source. There's no standard
/// `embedded-hal` trait for this (that crate covers delay and timer
/// peripherals, not a free-running counter read), so the crate defines
/// its own minimal seam.
pub trait Clock {
    /// Current timestamp in microseconds. Must not wrap within any single
    /// frame's receive/send window; an embedding board support package
    /// backed by a 32-bit free-running timer comfortably clears this
    /// (wraps after ~71 minutes).
    fn now_us(&mut self) -> u32;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::Clock;
    use core::cell::Cell;

    /// A `Clock` whose value the test advances explicitly.
    pub struct MockClock(Cell<u32>);

    impl MockClock {
        pub fn new() -> Self {
            Self(Cell::new(0))
        }

        pub fn advance(&self, us: u32) {
            self.0.set(self.0.get().wrapping_add(us));
        }
    }

    impl Clock for MockClock {
        fn now_us(&mut self) -> u32 {
            self.0.get()
        }
    }
}
