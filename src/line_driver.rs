//! Line-level capture and transmit (spec §5, §9).
//!
//! Receive is edge-driven: the embedding board support package calls
//! [`LineReceiver::on_edge`] from a GPIO interrupt each time the line
//! transitions, passing the new level and a timestamp. The state that
//! callback touches is a `critical_section::Mutex<RefCell<_>>` (the same
//! pattern a task-based RTOS uses to let an ISR and ordinary task code
//! share a non-`Sync` value safely) plus a pair of plain atomics for the
//! fields that don't need the `RefCell`'s interior mutability. Task-context
//! code polls [`LineReceiver::poll`] to pick up completed frames and to
//! notice an inter-frame gap that means "no frame is coming".
//!
//! Transmit has no interrupt-driven half: the sender owns the clock for
//! the whole frame, so [`send_frame`] just busy-waits between edges.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use critical_section::Mutex;

use crate::error::DecodeError;
use crate::frame::Frame;
use crate::hal::{Clock, LineInput, LineOutput};
use crate::manchester::{self, Decoder, HalfBit, Level};

/// Minimum gap, in microseconds, with no edge before a partially-received
/// frame is abandoned (spec §3's inter-frame silence).
pub const INTER_FRAME_GAP_US: u32 = 2_000;

/// How long the embedding application should let the line settle after
/// powering up a side before this crate's first `send_frame` on it (spec
/// §9's bus-stabilisation open question). This crate only documents and
/// exposes the constant; it does not block on it itself, since blocking
/// for ~1s inside a constructor would be hidden control-flow the rest of
/// this codebase avoids.
pub const BUS_STABILISATION_US: u32 = 900_000;

/// Accumulates half-bits observed on the line into complete frames.
pub struct LineReceiver {
    decoder: Mutex<RefCell<Decoder>>,
    last_edge_us: AtomicU32,
    last_level_high: AtomicBool,
    has_edge: AtomicBool,
    ready: Mutex<RefCell<Option<Result<Frame, DecodeError>>>>,
}

impl LineReceiver {
    pub const fn new() -> Self {
        Self {
            decoder: Mutex::new(RefCell::new(Decoder::new())),
            last_edge_us: AtomicU32::new(0),
            last_level_high: AtomicBool::new(false),
            has_edge: AtomicBool::new(false),
            ready: Mutex::new(RefCell::new(None)),
        }
    }

    /// Call from the line's edge interrupt with the level the line just
    /// transitioned to and the timestamp of that transition.
    pub fn on_edge(&self, new_level_high: bool, now_us: u32) {
        let had_edge = self.has_edge.swap(true, Ordering::Relaxed);
        let prev_us = self.last_edge_us.swap(now_us, Ordering::Relaxed);
        let prev_level_high = self.last_level_high.swap(new_level_high, Ordering::Relaxed);

        if !had_edge {
            // First edge of a new frame: nothing to measure yet.
            return;
        }

        let duration_us = now_us.wrapping_sub(prev_us);
        let half_bit = HalfBit {
            level: if prev_level_high { Level::High } else { Level::Low },
            duration_us,
        };

        critical_section::with(|cs| {
            let cell = self.decoder.borrow(cs);
            let pushed = cell.borrow_mut().push(half_bit);
            if pushed.is_err() {
                self.finish_with(cs, Err(DecodeError::ShortFrame));
                return;
            }
            if cell.borrow().len() == 68 {
                let finished = cell.replace(Decoder::new());
                let result = finished.finish();
                self.finish_with(cs, result);
            }
        });
    }

    fn finish_with(&self, cs: critical_section::CriticalSection, result: Result<Frame, DecodeError>) {
        *self.ready.borrow(cs).borrow_mut() = Some(result);
        *self.decoder.borrow(cs).borrow_mut() = Decoder::new();
        self.has_edge.store(false, Ordering::Relaxed);
    }

    /// True if half-bits have been captured for a frame in progress but
    /// none has completed or timed out yet. Used by the owning `Port` to
    /// distinguish "waiting for the start bit" from "mid-frame" in its own
    /// state reporting.
    pub fn has_pending(&self) -> bool {
        critical_section::with(|cs| !self.decoder.borrow(cs).borrow().is_empty())
    }

    /// Call from task context, passing the current time. Returns a
    /// completed frame (or decode error) once one is available, either
    /// because the ISR side finished collecting 68 half-bits, or because
    /// an inter-frame gap has elapsed with a partial frame pending.
    pub fn poll(&self, now_us: u32) -> Option<Result<Frame, DecodeError>> {
        critical_section::with(|cs| {
            if let Some(result) = self.ready.borrow(cs).borrow_mut().take() {
                return Some(result);
            }
            let pending = !self.decoder.borrow(cs).borrow().is_empty();
            if pending {
                let last = self.last_edge_us.load(Ordering::Relaxed);
                if now_us.wrapping_sub(last) >= INTER_FRAME_GAP_US {
                    let finished = self.decoder.borrow(cs).replace(Decoder::new());
                    self.has_edge.store(false, Ordering::Relaxed);
                    return Some(finished.finish());
                }
            }
            None
        })
    }
}

impl Default for LineReceiver {
    fn default() -> Self {
        Self::new()
    }
}

/// Busy-bit-bangs `frame` onto the line at [`manchester::HALF_BIT_US`] per
/// half-bit, blocking the caller for the duration of the transmission
/// (spec §9: the sending task owns the line for the whole frame).
pub fn send_frame<O, C>(output: &mut O, clock: &mut C, frame: Frame) -> Result<(), O::Error>
where
    O: LineOutput,
    C: Clock,
{
    let levels = manchester::encode(frame);
    for level in levels {
        match level {
            Level::High => output.set_high()?,
            Level::Low => output.set_low()?,
        }
        let start = clock.now_us();
        while clock.now_us().wrapping_sub(start) < manchester::HALF_BIT_US {
            core::hint::spin_loop();
        }
    }
    Ok(())
}

/// Polls `input` at a fixed cadence to synthesize edges for a
/// [`LineReceiver`], for board support packages without a GPIO interrupt
/// (spec §9 describes the ISR path as the expected one; this is the
/// degraded polling fallback noted alongside it).
pub fn poll_edges<I, C>(input: &mut I, clock: &mut C, receiver: &LineReceiver, last_level: &mut bool) -> Result<(), I::Error>
where
    I: LineInput,
    C: Clock,
{
    let level = input.is_high()?;
    if level != *last_level {
        receiver.on_edge(level, clock.now_us());
        *last_level = level;
    }
    Ok(())
}
