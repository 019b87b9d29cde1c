//! The protocol-level tracing seam (spec §6): a narrower, purpose-built
//! hook for frame-by-frame observability toward an external collaborator
//! (an MQTT bridge, a capture tool), kept distinct from the crate's
//! ambient `log`/`defmt` diagnostics. Those log the gateway's own
//! behavior; this reports the OpenTherm conversation it's forwarding.

use crate::error::DecodeError;
use crate::frame::Frame;
use crate::port::Role;

/// Which port a logged frame crossed, and which direction it travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Source {
    /// The thermostat-facing port, carrying a request inbound from the
    /// thermostat or a response outbound to it.
    Thermostat,
    /// The boiler-facing port, carrying a request outbound to the boiler
    /// or a response inbound from it.
    Boiler,
}

/// One frame crossing a port, reported after it's already been validated
/// and acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogEvent {
    pub source: Source,
    pub role: Role,
    pub frame: Frame,
    pub was_diagnostic_injection: bool,
    pub timestamp_us: u32,
}

/// Why a transaction produced nothing worth forwarding (spec §6: "every
/// dropped/invalid frame, with reason").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DropReason {
    /// Parity was fine but the message type didn't belong to the class
    /// expected on this port (a request port got a response-shaped frame,
    /// or vice versa).
    UnexpectedMessageType,
    /// The captured symbol stream failed to decode.
    Decode(DecodeError),
    /// No frame arrived before the transaction's deadline.
    Timeout,
}

/// One dropped or invalid frame, reported instead of [`LogEvent`] when
/// there's no successfully forwarded frame to describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DropEvent {
    pub source: Source,
    pub role: Role,
    pub reason: DropReason,
    pub timestamp_us: u32,
}

/// Implemented by whatever wants a copy of every frame the mediator
/// forwards or injects. The mediator calls this synchronously from its
/// step loop, so an implementation that blocks (e.g. on a full MQTT
/// outbox) holds up forwarding; implementations are expected to buffer
/// and return quickly.
pub trait LogHook {
    fn on_frame(&mut self, event: LogEvent);

    /// Called instead of `on_frame` when a transaction drops a frame or
    /// times out. Default implementation does nothing, so a hook that only
    /// cares about successful frames doesn't have to implement it.
    fn on_drop(&mut self, _event: DropEvent) {}
}

/// A `LogHook` that does nothing, for configurations that don't want
/// protocol-level tracing.
pub struct NullLogHook;

impl LogHook for NullLogHook {
    fn on_frame(&mut self, _event: LogEvent) {}
}
