//! Gateway configuration (spec §6). Pin identity and polarity are owned by
//! the embedding board support package (spec §2's wiring Non-goal); what
//! lives here is the policy this crate itself enforces.

use heapless::Vec;

use crate::error::ConfigError;
use crate::frame::DataId;

/// Maximum number of data-ids a diagnostic schedule can hold.
pub const MAX_DIAGNOSTIC_SCHEDULE_LEN: usize = 16;

/// How the mediator treats frames it forwards (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatingMode {
    /// Frames cross unmodified; diagnostic injection and overrides never
    /// apply.
    Passthrough,
    /// Frames cross unmodified except for diagnostic injection.
    Proxy,
    /// Diagnostic injection applies, and a fresh override replaces the
    /// forwarded master setpoint/CH-enable fields.
    Control,
}

/// Validated construction parameters for a [`crate::mediator::Mediator`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub mode: OperatingMode,
    /// Every `intercept_rate`-th forwarded master request is replaced by
    /// a diagnostic query instead. Must be at least 1.
    pub intercept_rate: u32,
    pub diagnostic_schedule: Vec<DataId, MAX_DIAGNOSTIC_SCHEDULE_LEN>,
    /// How long an override stays valid after its last heartbeat, in
    /// microseconds. Must be nonzero.
    pub heartbeat_timeout_us: u32,
}

impl GatewayConfig {
    /// Validates the combination per spec §6: `intercept_rate` must be at
    /// least 1, the diagnostic schedule must name at least one data-id,
    /// and the heartbeat timeout must be nonzero. None of these apply to
    /// [`OperatingMode::Passthrough`] at runtime, but they're still
    /// validated unconditionally so switching modes later never hits a
    /// configuration the constructor should have rejected up front.
    pub fn new(
        mode: OperatingMode,
        intercept_rate: u32,
        diagnostic_schedule: Vec<DataId, MAX_DIAGNOSTIC_SCHEDULE_LEN>,
        heartbeat_timeout_us: u32,
    ) -> Result<Self, ConfigError> {
        if intercept_rate == 0 {
            log::warn!("rejecting gateway config: intercept_rate is 0");
            return Err(ConfigError::InterceptRateZero);
        }
        if diagnostic_schedule.is_empty() {
            log::warn!("rejecting gateway config: diagnostic_schedule is empty");
            return Err(ConfigError::EmptyDiagnosticSchedule);
        }
        if heartbeat_timeout_us == 0 {
            log::warn!("rejecting gateway config: heartbeat_timeout_us is 0");
            return Err(ConfigError::ZeroHeartbeatTimeout);
        }
        Ok(Self { mode, intercept_rate, diagnostic_schedule, heartbeat_timeout_us })
    }
}
