//! Error taxonomy for the gateway (spec §7).
//!
//! Every fallible boundary gets its own small enum rather than one big
//! catch-all, so a caller matching on `ReceiveError` never has to think
//! about `ConfigError` variants that could never reach it.

/// Precise reason a captured frame failed structural validation.
///
/// Carried inside [`ReceiveError::Invalid`] so a logging hook or telemetry
/// write can record *why* a frame was rejected, not just that it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    #[error("fewer than 34 line bits were observed before the inter-frame gap")]
    ShortFrame,
    #[error("a half-bit duration fell outside the 300-1300us window")]
    HalfBitOutOfRange,
    #[error("a bit pair had no mid-bit transition")]
    MissingMidBitTransition,
    #[error("start bit did not decode to logical 1")]
    BadStartBit,
    #[error("stop bit did not decode to logical 1")]
    BadStopBit,
    #[error("32-bit data word does not have even parity")]
    BadParity,
}

/// Result of `Port::await_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveError {
    #[error("frame failed validation: {0}")]
    Invalid(DecodeError),
    #[error("no frame completed within the timeout")]
    Timeout,
}

/// "Structural misuse" per spec §7: calling a Port operation while another
/// one on the same Port is already in flight. Does not change Port state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortError {
    #[error("send_frame called while the Port was already sending")]
    AlreadySending,
    #[error("await_frame called while a receive was already pending")]
    AlreadyReceiving,
}

/// Construction-time misconfiguration, surfaced to the initializer (spec §7
/// "Unrecoverable": the engine never starts with nonsensical configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("intercept_rate must be at least 1")]
    InterceptRateZero,
    #[error("diagnostic_schedule must name at least one data-id")]
    EmptyDiagnosticSchedule,
    #[error("heartbeat_timeout must be nonzero")]
    ZeroHeartbeatTimeout,
}
