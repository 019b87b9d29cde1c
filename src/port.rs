//! A `Port` is one side of the gateway: the thermostat-facing port acts as
//! an OpenTherm slave, the boiler-facing port acts as an OpenTherm master
//! (spec §4.1, §4.2). Both share the same line-level machinery; only the
//! role and the inter-frame spacing they enforce differ.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::error::{PortError, ReceiveError};
use crate::frame::Frame;
use crate::hal::{Clock, LineOutput};
use crate::line_driver::{self, LineReceiver};

/// Which side of the thermostat/boiler conversation this Port plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Faces the thermostat; receives requests, sends responses.
    Slave,
    /// Faces the boiler; sends requests, receives responses.
    Master,
}

impl Role {
    /// Minimum spacing between frames this role initiates, per spec §3:
    /// a master-role port holds off 100ms between requests; a slave-role
    /// port must not flood its replies faster than every 20ms.
    pub const fn min_frame_spacing_us(self) -> u32 {
        match self {
            Role::Master => 100_000,
            Role::Slave => 20_000,
        }
    }
}

/// A `Port`'s own observable state (spec §5, §9's "atomic enum ... plain
/// 32-bit integer" guidance), backed by a single `AtomicU8` so a status
/// reader never has to take the same critical section the line driver
/// uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PortState {
    /// Constructed, nothing sent or received yet.
    Idle = 0,
    /// Inside the bit-bang transmission loop.
    Sending = 1,
    /// Holding off before a send to respect the role's minimum inter-frame
    /// spacing.
    InterFrameDelay = 2,
    /// Waiting for the first edge of a new frame; the decoder is empty.
    AwaitingStart = 3,
    /// Half-bits have been captured for a frame that hasn't completed.
    ReceivingBits = 4,
    /// The last poll produced a complete, structurally valid frame.
    FrameReady = 5,
    /// The last poll produced a decode error.
    FrameInvalid = 6,
}

impl PortState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => PortState::Idle,
            1 => PortState::Sending,
            2 => PortState::InterFrameDelay,
            3 => PortState::AwaitingStart,
            4 => PortState::ReceivingBits,
            5 => PortState::FrameReady,
            _ => PortState::FrameInvalid,
        }
    }
}

/// Per-port counters (spec §4.8), each independently incrementing so a
/// telemetry reader never has to pause the line driver to get a
/// consistent-enough snapshot.
#[derive(Default)]
pub struct PortStats {
    pub frames_sent: AtomicU32,
    pub frames_received: AtomicU32,
    pub decode_errors: AtomicU32,
    pub timeouts: AtomicU32,
}

impl PortStats {
    pub const fn new() -> Self {
        Self {
            frames_sent: AtomicU32::new(0),
            frames_received: AtomicU32::new(0),
            decode_errors: AtomicU32::new(0),
            timeouts: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> PortStatsSnapshot {
        PortStatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`PortStats`], cheap to hand to telemetry code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortStatsSnapshot {
    pub frames_sent: u32,
    pub frames_received: u32,
    pub decode_errors: u32,
    pub timeouts: u32,
}

/// One side of the gateway. Generic over its output pin and clock so both
/// the thermostat-facing and boiler-facing ports share this type with
/// independent concrete hardware.
pub struct Port<O, C> {
    role: Role,
    output: O,
    clock: C,
    receiver: LineReceiver,
    stats: PortStats,
    sending: bool,
    last_send_us: Option<u32>,
    state: AtomicU8,
}

impl<O, C> Port<O, C>
where
    O: LineOutput,
    C: Clock,
{
    pub fn new(role: Role, output: O, clock: C) -> Self {
        Self {
            role,
            output,
            clock,
            receiver: LineReceiver::new(),
            stats: PortStats::new(),
            sending: false,
            last_send_us: None,
            state: AtomicU8::new(PortState::Idle as u8),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// This Port's current state (spec §5's state reporting). Safe to read
    /// from a different context than the one driving send/receive.
    pub fn state(&self) -> PortState {
        PortState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: PortState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Direct access to the underlying output pin, mainly useful for a
    /// test harness inspecting what was physically driven onto the line.
    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn stats(&self) -> &PortStats {
        &self.stats
    }

    /// The receiver half, exposed so the board support package's edge
    /// interrupt (or polling loop) can feed it directly.
    pub fn receiver(&self) -> &LineReceiver {
        &self.receiver
    }

    /// Sends `frame`, enforcing this role's minimum inter-frame spacing by
    /// busy-waiting if called too soon after the previous send.
    ///
    /// Returns [`PortError::AlreadySending`] if called re-entrantly (spec
    /// §7); this implementation is otherwise synchronous so that can only
    /// happen if the caller shares one `Port` across contexts without its
    /// own mutual exclusion.
    pub fn send_frame(&mut self, frame: Frame) -> Result<(), PortError> {
        if self.sending {
            log::error!("send_frame called re-entrantly on a {:?} port", self.role);
            return Err(PortError::AlreadySending);
        }
        self.sending = true;

        if let Some(last) = self.last_send_us {
            let min_spacing = self.role.min_frame_spacing_us();
            let elapsed = self.clock.now_us().wrapping_sub(last);
            if elapsed < min_spacing {
                self.set_state(PortState::InterFrameDelay);
                let remaining = min_spacing - elapsed;
                let wait_start = self.clock.now_us();
                while self.clock.now_us().wrapping_sub(wait_start) < remaining {
                    core::hint::spin_loop();
                }
            }
        }

        self.set_state(PortState::Sending);
        let _ = line_driver::send_frame(&mut self.output, &mut self.clock, frame);
        self.last_send_us = Some(self.clock.now_us());
        self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.sending = false;
        self.set_state(PortState::Idle);
        Ok(())
    }

    /// Polls for a completed frame, returning [`nb::Error::WouldBlock`]
    /// until one is ready or `now_us` has reached `deadline_us`.
    ///
    /// Takes the caller's clock reading rather than blocking itself, so
    /// the mediator's step loop stays in control of scheduling.
    pub fn poll_frame(&mut self, now_us: u32, deadline_us: u32) -> nb::Result<Frame, ReceiveError> {
        match self.receiver.poll(now_us) {
            Some(Ok(frame)) => {
                self.stats.frames_received.fetch_add(1, Ordering::Relaxed);
                self.set_state(PortState::FrameReady);
                Ok(frame)
            }
            Some(Err(decode_err)) => {
                self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                self.set_state(PortState::FrameInvalid);
                Err(nb::Error::Other(ReceiveError::Invalid(decode_err)))
            }
            None => {
                if now_us >= deadline_us {
                    self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                    Err(nb::Error::Other(ReceiveError::Timeout))
                } else {
                    self.set_state(if self.receiver.has_pending() {
                        PortState::ReceivingBits
                    } else {
                        PortState::AwaitingStart
                    });
                    Err(nb::Error::WouldBlock)
                }
            }
        }
    }

    /// Checks once for a completed frame without a deadline, updating
    /// stats the same way [`Port::poll_frame`] does. Used by callers that
    /// manage their own waiting/timeout policy above this Port.
    pub fn try_recv(&mut self) -> Option<Result<Frame, ReceiveError>> {
        let now_us = self.clock.now_us();
        match self.receiver.poll(now_us) {
            Some(Ok(frame)) => {
                self.stats.frames_received.fetch_add(1, Ordering::Relaxed);
                self.set_state(PortState::FrameReady);
                Some(Ok(frame))
            }
            Some(Err(decode_err)) => {
                self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                self.set_state(PortState::FrameInvalid);
                Some(Err(ReceiveError::Invalid(decode_err)))
            }
            None => {
                self.set_state(if self.receiver.has_pending() {
                    PortState::ReceivingBits
                } else {
                    PortState::AwaitingStart
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{data_id, MessageType};
    use crate::hal::mock::MockClock;

    struct MockOutput {
        edges: heapless::Vec<bool, 256>,
    }

    impl crate::hal::LineOutput for MockOutput {
        type Error = core::convert::Infallible;
        fn set_high(&mut self) -> Result<(), Self::Error> {
            let _ = self.edges.push(true);
            Ok(())
        }
        fn set_low(&mut self) -> Result<(), Self::Error> {
            let _ = self.edges.push(false);
            Ok(())
        }
    }

    /// Clock that jumps forward by a fixed step every read, so a send's
    /// internal busy-wait loops terminate in test runs.
    struct SteppingClock {
        inner: MockClock,
        step_us: u32,
    }

    impl Clock for SteppingClock {
        fn now_us(&mut self) -> u32 {
            let v = self.inner.now_us();
            self.inner.advance(self.step_us);
            v
        }
    }

    #[test]
    fn first_send_does_not_wait_on_spacing() {
        let output = MockOutput { edges: heapless::Vec::new() };
        let clock = SteppingClock { inner: MockClock::new(), step_us: 500 };
        let mut port = Port::new(Role::Master, output, clock);
        let frame = crate::frame::build_request(MessageType::ReadData, data_id::STATUS, 0x0300);
        port.send_frame(frame).unwrap();
        assert_eq!(port.stats().snapshot().frames_sent, 1);
        assert!(!port.output.edges.is_empty());
    }

    #[test]
    fn poll_frame_times_out_past_deadline() {
        let output = MockOutput { edges: heapless::Vec::new() };
        let clock = MockClock::new();
        let mut port = Port::new(Role::Slave, output, clock);
        let result = port.poll_frame(100, 50);
        assert!(matches!(result, Err(nb::Error::Other(ReceiveError::Timeout))));
        assert_eq!(port.stats().snapshot().timeouts, 1);
    }

    #[test]
    fn poll_frame_would_block_before_deadline() {
        let output = MockOutput { edges: heapless::Vec::new() };
        let clock = MockClock::new();
        let mut port = Port::new(Role::Slave, output, clock);
        let result = port.poll_frame(10, 50);
        assert!(matches!(result, Err(nb::Error::WouldBlock)));
    }
}
