//! The mediator forwards OpenTherm requests from the thermostat-facing
//! port to the boiler-facing port and responses back the other way,
//! optionally substituting a diagnostic query or an override value along
//! the way (spec §4.4, §4.6), and fills otherwise-silent gaps with its own
//! diagnostic queries (spec §4.4 step 5).
//!
//! `step` is meant to be driven from whatever executor the embedding
//! firmware already runs — an RTIC task, an Embassy task, or a bare
//! `loop {}` — by calling it repeatedly with the current time. It never
//! blocks: each call either makes progress or returns immediately.

use crate::config::{GatewayConfig, OperatingMode};
use crate::diagnostic::{DiagnosticScheduler, InterceptCounter};
use crate::error::{PortError, ReceiveError};
use crate::frame::{self, data_id, Frame, MessageType};
use crate::hal::{Clock, LineOutput};
use crate::logging::{DropEvent, DropReason, LogEvent, LogHook, Source};
use crate::override_box::OverrideBox;
use crate::port::{Port, Role};
use crate::telemetry::TelemetryStore;

/// How long the mediator waits for the boiler to answer a forwarded
/// request before giving up on that exchange (OpenTherm's own master
/// response timeout, spec §4.4/§8 scenario 2).
pub const RESPONSE_TIMEOUT_US: u32 = 800_000;

/// How long the mediator waits for the thermostat to start a transaction
/// before treating it as silent and injecting a diagnostic query of its
/// own (spec §4.4 step 1's "await_frame(≈1100 ms)").
pub const THERMOSTAT_REQUEST_TIMEOUT_US: u32 = 1_100_000;

/// How long a string of boiler-side failures has to run before the
/// mediator treats the boiler as persistently unreachable and forces
/// Passthrough behaviour (spec §4.4 Failure semantics: "boiler-side
/// timeouts for > 60 s").
pub const OUTAGE_THRESHOLD_US: u32 = 60_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingThermostatRequest {
        silence_deadline_us: u32,
    },
    AwaitingBoilerResponse {
        deadline_us: u32,
        /// The thermostat's original request, if this exchange owes the
        /// thermostat a reply. `None` for a diagnostic query injected
        /// purely because the thermostat was silent (spec §4.4 step 5) —
        /// nobody is waiting on that one.
        original_request: Option<Frame>,
        /// True if what was actually sent to the boiler is a diagnostic
        /// substitution rather than the (possibly override-rewritten)
        /// original request.
        diagnostic_injection: bool,
    },
}

/// A read-only snapshot of the mediator's own health, distinct from the
/// boiler telemetry it forwards (spec §4.4 Failure semantics, §8 scenario
/// 5). Grounded in the original's `ManagerStatus`/`boiler_manager_status_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MediatorStatus {
    /// Set once boiler-side failures have persisted past
    /// [`OUTAGE_THRESHOLD_US`]; cleared on the next successful exchange.
    pub fallback_active: bool,
}

/// Ties the two ports together with the shared telemetry/override state
/// and drives the forwarding policy (spec §4.4, §4.6).
pub struct Mediator<TO, TC, BO, BC, H, const N: usize> {
    thermostat: Port<TO, TC>,
    boiler: Port<BO, BC>,
    telemetry: TelemetryStore,
    overrides: OverrideBox,
    diagnostics: DiagnosticScheduler<N>,
    intercept: InterceptCounter,
    log_hook: H,
    mode: OperatingMode,
    phase: Phase,
    fallback_active: bool,
    last_success_us: Option<u32>,
}

impl<TO, TC, BO, BC, H, const N: usize> Mediator<TO, TC, BO, BC, H, N>
where
    TO: LineOutput,
    TC: Clock,
    BO: LineOutput,
    BC: Clock,
    H: LogHook,
{
    pub fn new(
        thermostat_output: TO,
        thermostat_clock: TC,
        boiler_output: BO,
        boiler_clock: BC,
        log_hook: H,
        config: GatewayConfig,
    ) -> Self {
        let diagnostics = DiagnosticScheduler::new(
            config.diagnostic_schedule.iter().copied().collect(),
        );
        Self {
            thermostat: Port::new(Role::Slave, thermostat_output, thermostat_clock),
            boiler: Port::new(Role::Master, boiler_output, boiler_clock),
            telemetry: TelemetryStore::new(),
            overrides: OverrideBox::new(config.heartbeat_timeout_us),
            diagnostics,
            intercept: InterceptCounter::new(config.intercept_rate),
            log_hook,
            mode: config.mode,
            phase: Phase::AwaitingThermostatRequest {
                silence_deadline_us: THERMOSTAT_REQUEST_TIMEOUT_US,
            },
            fallback_active: false,
            last_success_us: None,
        }
    }

    pub fn telemetry(&self) -> &TelemetryStore {
        &self.telemetry
    }

    pub fn overrides(&self) -> &OverrideBox {
        &self.overrides
    }

    pub fn thermostat_port(&self) -> &Port<TO, TC> {
        &self.thermostat
    }

    pub fn boiler_port(&self) -> &Port<BO, BC> {
        &self.boiler
    }

    /// The mediator's own health, as opposed to the boiler telemetry it
    /// forwards (spec §8 scenario 5).
    pub fn status(&self) -> MediatorStatus {
        MediatorStatus { fallback_active: self.fallback_active }
    }

    /// Advances the mediator's internal forwarding state machine by one
    /// step. Call this repeatedly (e.g. once per executor tick) with the
    /// current time.
    pub fn step(&mut self, now_us: u32) -> Result<(), PortError> {
        match self.phase {
            Phase::AwaitingThermostatRequest { silence_deadline_us } => {
                self.poll_thermostat_request(now_us, silence_deadline_us)
            }
            Phase::AwaitingBoilerResponse { deadline_us, original_request, diagnostic_injection } => {
                self.poll_boiler_response(now_us, deadline_us, original_request, diagnostic_injection)
            }
        }
    }

    fn poll_thermostat_request(&mut self, now_us: u32, silence_deadline_us: u32) -> Result<(), PortError> {
        match self.thermostat.poll_frame(now_us, silence_deadline_us) {
            Ok(request) if request.is_valid_request() => {
                self.log_hook.on_frame(LogEvent {
                    source: Source::Thermostat,
                    role: Role::Slave,
                    frame: request,
                    was_diagnostic_injection: false,
                    timestamp_us: now_us,
                });

                let (outgoing, diagnostic_injection) = self.prepare_outgoing(request, now_us);
                self.boiler.send_frame(outgoing)?;

                self.log_hook.on_frame(LogEvent {
                    source: Source::Boiler,
                    role: Role::Master,
                    frame: outgoing,
                    was_diagnostic_injection: diagnostic_injection,
                    timestamp_us: now_us,
                });

                self.phase = Phase::AwaitingBoilerResponse {
                    deadline_us: now_us.wrapping_add(RESPONSE_TIMEOUT_US),
                    original_request: Some(request),
                    diagnostic_injection,
                };
                Ok(())
            }
            Ok(_) => {
                log::debug!("thermostat request had an unexpected message type, dropping");
                self.log_hook.on_drop(DropEvent {
                    source: Source::Thermostat,
                    role: Role::Slave,
                    reason: DropReason::UnexpectedMessageType,
                    timestamp_us: now_us,
                });
                self.restart_silence_wait(now_us);
                Ok(())
            }
            Err(nb::Error::Other(ReceiveError::Invalid(decode_err))) => {
                log::debug!("thermostat request failed to decode: {}", decode_err);
                self.log_hook.on_drop(DropEvent {
                    source: Source::Thermostat,
                    role: Role::Slave,
                    reason: DropReason::Decode(decode_err),
                    timestamp_us: now_us,
                });
                self.restart_silence_wait(now_us);
                Ok(())
            }
            Err(nb::Error::Other(ReceiveError::Timeout)) => self.inject_diagnostic_on_silence(now_us),
            Err(nb::Error::WouldBlock) => Ok(()),
        }
    }

    /// Thermostat has gone quiet past [`THERMOSTAT_REQUEST_TIMEOUT_US`]
    /// (spec §4.4 step 5, §8 scenario 6): take the opportunity to query the
    /// boiler for the next data-id in the diagnostic schedule instead of
    /// idling.
    fn inject_diagnostic_on_silence(&mut self, now_us: u32) -> Result<(), PortError> {
        let next_id = if self.diagnostics.is_empty() { None } else { self.diagnostics.next_id() };
        let Some(id) = next_id else {
            self.restart_silence_wait(now_us);
            return Ok(());
        };

        let query = frame::build_request(MessageType::ReadData, id, 0);
        self.boiler.send_frame(query)?;
        self.log_hook.on_frame(LogEvent {
            source: Source::Boiler,
            role: Role::Master,
            frame: query,
            was_diagnostic_injection: true,
            timestamp_us: now_us,
        });

        self.phase = Phase::AwaitingBoilerResponse {
            deadline_us: now_us.wrapping_add(RESPONSE_TIMEOUT_US),
            original_request: None,
            diagnostic_injection: true,
        };
        Ok(())
    }

    fn poll_boiler_response(
        &mut self,
        now_us: u32,
        deadline_us: u32,
        original_request: Option<Frame>,
        diagnostic_injection: bool,
    ) -> Result<(), PortError> {
        match self.boiler.poll_frame(now_us, deadline_us) {
            Ok(response) if response.is_valid_response() => {
                // Telemetry only ever reflects a data-id the boiler actually
                // acknowledged (spec §4.5); DataInvalid/UnknownDataId carry
                // no usable value.
                if matches!(response.message_type(), MessageType::ReadAck | MessageType::WriteAck) {
                    self.telemetry.record(response.data_id(), response.data_value(), now_us);
                }
                self.log_hook.on_frame(LogEvent {
                    source: Source::Boiler,
                    role: Role::Master,
                    frame: response,
                    was_diagnostic_injection: diagnostic_injection,
                    timestamp_us: now_us,
                });

                self.last_success_us = Some(now_us);
                self.fallback_active = false;

                if let Some(request) = original_request {
                    // A request that was rerouted into a diagnostic query
                    // (Proxy-mode intercept, spec §4.4) owes the thermostat
                    // a reply about its *own* data-id, not the boiler's
                    // answer about a different one.
                    let reply = if diagnostic_injection { fabricate_reply(request) } else { response };
                    self.thermostat.send_frame(reply)?;
                    self.log_hook.on_frame(LogEvent {
                        source: Source::Thermostat,
                        role: Role::Slave,
                        frame: reply,
                        was_diagnostic_injection: false,
                        timestamp_us: now_us,
                    });
                }
                self.restart_silence_wait(now_us);
                Ok(())
            }
            Ok(_) => {
                log::debug!("boiler response had an unexpected message type, dropping exchange");
                self.log_hook.on_drop(DropEvent {
                    source: Source::Boiler,
                    role: Role::Master,
                    reason: DropReason::UnexpectedMessageType,
                    timestamp_us: now_us,
                });
                self.fail_exchange(now_us, original_request)
            }
            Err(nb::Error::Other(ReceiveError::Invalid(decode_err))) => {
                log::debug!("boiler response failed to decode: {}", decode_err);
                self.log_hook.on_drop(DropEvent {
                    source: Source::Boiler,
                    role: Role::Master,
                    reason: DropReason::Decode(decode_err),
                    timestamp_us: now_us,
                });
                self.fail_exchange(now_us, original_request)
            }
            Err(nb::Error::Other(ReceiveError::Timeout)) => {
                log::debug!("boiler did not answer within the response timeout");
                self.log_hook.on_drop(DropEvent {
                    source: Source::Boiler,
                    role: Role::Master,
                    reason: DropReason::Timeout,
                    timestamp_us: now_us,
                });
                self.fail_exchange(now_us, original_request)
            }
            Err(nb::Error::WouldBlock) => Ok(()),
        }
    }

    /// Boiler-side timeout or decode failure (spec §4.4 step 2, §8
    /// scenarios 2/3): synthesize a DataInvalid carrying the original
    /// request's data-id back to the thermostat, so it isn't left hanging
    /// on a transaction the boiler never answered, then track whether this
    /// failure is part of a sustained outage.
    fn fail_exchange(&mut self, now_us: u32, original_request: Option<Frame>) -> Result<(), PortError> {
        if let Some(request) = original_request {
            let data_invalid = frame::build_response(MessageType::DataInvalid, request.data_id(), 0);
            self.thermostat.send_frame(data_invalid)?;
            self.log_hook.on_frame(LogEvent {
                source: Source::Thermostat,
                role: Role::Slave,
                frame: data_invalid,
                was_diagnostic_injection: false,
                timestamp_us: now_us,
            });
        }

        let outage_started_us = self.last_success_us.unwrap_or(0);
        if now_us.wrapping_sub(outage_started_us) > OUTAGE_THRESHOLD_US {
            self.fallback_active = true;
        }

        self.restart_silence_wait(now_us);
        Ok(())
    }

    fn restart_silence_wait(&mut self, now_us: u32) {
        self.phase = Phase::AwaitingThermostatRequest {
            silence_deadline_us: now_us.wrapping_add(THERMOSTAT_REQUEST_TIMEOUT_US),
        };
    }

    /// Decides what actually goes out to the boiler for a given
    /// thermostat request: the request verbatim (Passthrough, persistent
    /// outage fallback, or no injection this round), a diagnostic query in
    /// its place, or the request with override fields substituted in.
    /// Returns the frame to send and whether it was a diagnostic
    /// injection (which determines whether the eventual response gets
    /// forwarded back to the thermostat as-is or needs a fabricated
    /// stand-in, see [`fabricate_reply`]).
    fn prepare_outgoing(&mut self, request: Frame, now_us: u32) -> (Frame, bool) {
        if self.mode == OperatingMode::Passthrough || self.fallback_active {
            return (request, false);
        }

        // Spec §4.4 Proxy mode: only a status (data-id 0) request from the
        // thermostat is eligible for interception, every Nth occurrence.
        if request.data_id() == data_id::STATUS && !self.diagnostics.is_empty() && self.intercept.tick() {
            if let Some(id) = self.diagnostics.next_id() {
                return (frame::build_request(MessageType::ReadData, id, 0), true);
            }
        }

        if self.mode == OperatingMode::Control {
            if let Some(overrides) = self.overrides.read_if_fresh(now_us) {
                if request.data_id() == data_id::TSET {
                    if let Some(setpoint) = overrides.setpoint_data_value {
                        return (
                            frame::build_request(request.message_type(), data_id::TSET, setpoint),
                            false,
                        );
                    }
                }
                if request.data_id() == data_id::STATUS {
                    if let Some(ch_enable) = overrides.ch_enable {
                        let mut flags = request.status_flags_hb();
                        flags.set(frame::StatusFlags::CH_ENABLE, ch_enable);
                        let value = (flags.bits() as u16) << 8 | request.low_byte() as u16;
                        return (
                            frame::build_request(request.message_type(), data_id::STATUS, value),
                            false,
                        );
                    }
                }
            }
        }

        (request, false)
    }
}

/// Builds a synthesized reply for an original request that was actually
/// routed to the boiler as a diagnostic query instead (Proxy-mode
/// intercept, spec §4.4): the thermostat still needs a syntactically valid
/// answer about the data-id it asked for, not the boiler's answer about a
/// different one, so this echoes the request's own value back as an Ack
/// rather than leaving it unanswered.
fn fabricate_reply(original_request: Frame) -> Frame {
    let ack_type = match original_request.message_type() {
        MessageType::WriteData => MessageType::WriteAck,
        _ => MessageType::ReadAck,
    };
    frame::build_response(ack_type, original_request.data_id(), original_request.data_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::MockClock;
    use heapless::Vec;

    struct SinkOutput;
    impl LineOutput for SinkOutput {
        type Error = core::convert::Infallible;
        fn set_high(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
        fn set_low(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingHook {
        events: Vec<LogEvent, 16>,
    }
    impl LogHook for RecordingHook {
        fn on_frame(&mut self, event: LogEvent) {
            let _ = self.events.push(event);
        }
    }

    fn config() -> GatewayConfig {
        let mut schedule = Vec::new();
        schedule.push(data_id::TBOILER).unwrap();
        GatewayConfig::new(OperatingMode::Proxy, 2, schedule, 5_000).unwrap()
    }

    #[test]
    fn construction_starts_awaiting_thermostat_request() {
        let mediator = Mediator::<_, _, _, _, _, 4>::new(
            SinkOutput,
            MockClock::new(),
            SinkOutput,
            MockClock::new(),
            RecordingHook::default(),
            config(),
        );
        assert!(matches!(mediator.phase, Phase::AwaitingThermostatRequest { .. }));
    }

    #[test]
    fn step_with_no_pending_frame_is_a_no_op() {
        let mut mediator = Mediator::<_, _, _, _, _, 4>::new(
            SinkOutput,
            MockClock::new(),
            SinkOutput,
            MockClock::new(),
            RecordingHook::default(),
            config(),
        );
        mediator.step(0).unwrap();
        assert!(matches!(mediator.phase, Phase::AwaitingThermostatRequest { .. }));
    }

    #[test]
    fn prepare_outgoing_passthrough_never_injects() {
        let mut cfg = config();
        cfg.mode = OperatingMode::Passthrough;
        let mut mediator = Mediator::<_, _, _, _, _, 4>::new(
            SinkOutput,
            MockClock::new(),
            SinkOutput,
            MockClock::new(),
            RecordingHook::default(),
            cfg,
        );
        let request = frame::build_request(MessageType::ReadData, data_id::TSET, 0x1234);
        let (outgoing, was_diagnostic) = mediator.prepare_outgoing(request, 0);
        assert_eq!(outgoing, request);
        assert!(!was_diagnostic);
    }

    #[test]
    fn prepare_outgoing_only_intercepts_status_requests() {
        let mut mediator = Mediator::<_, _, _, _, _, 4>::new(
            SinkOutput,
            MockClock::new(),
            SinkOutput,
            MockClock::new(),
            RecordingHook::default(),
            config(),
        );
        // Two TSET requests: never eligible for interception, regardless
        // of the intercept counter.
        let tset = frame::build_request(MessageType::ReadData, data_id::TSET, 0x1234);
        let (first, first_diag) = mediator.prepare_outgoing(tset, 0);
        let (second, second_diag) = mediator.prepare_outgoing(tset, 0);
        assert_eq!(first, tset);
        assert_eq!(second, tset);
        assert!(!first_diag);
        assert!(!second_diag);
    }

    #[test]
    fn prepare_outgoing_injects_on_intercept_rate_for_status_requests() {
        let mut mediator = Mediator::<_, _, _, _, _, 4>::new(
            SinkOutput,
            MockClock::new(),
            SinkOutput,
            MockClock::new(),
            RecordingHook::default(),
            config(),
        );
        let request = frame::build_request(MessageType::ReadData, data_id::STATUS, 0x0300);
        let (_, first) = mediator.prepare_outgoing(request, 0);
        let (second_frame, second) = mediator.prepare_outgoing(request, 0);
        assert!(!first);
        assert!(second);
        assert_eq!(second_frame.data_id(), data_id::TBOILER);
    }

    #[test]
    fn control_mode_substitutes_fresh_override_setpoint() {
        let mut cfg = config();
        cfg.mode = OperatingMode::Control;
        cfg.intercept_rate = 1000;
        let mut mediator = Mediator::<_, _, _, _, _, 4>::new(
            SinkOutput,
            MockClock::new(),
            SinkOutput,
            MockClock::new(),
            RecordingHook::default(),
            cfg,
        );
        mediator.overrides.write(Some(0x1600), None, true, 0);
        let request = frame::build_request(MessageType::WriteData, data_id::TSET, 0x1234);
        let (outgoing, was_diagnostic) = mediator.prepare_outgoing(request, 0);
        assert!(!was_diagnostic);
        assert_eq!(outgoing.data_value(), 0x1600);
    }

    #[test]
    fn fabricate_reply_acks_the_original_requests_own_data() {
        let request = frame::build_request(MessageType::ReadData, data_id::STATUS, 0x0300);
        let reply = fabricate_reply(request);
        assert_eq!(reply.message_type(), MessageType::ReadAck);
        assert_eq!(reply.data_id(), data_id::STATUS);
        assert_eq!(reply.data_value(), 0x0300);
    }
}
