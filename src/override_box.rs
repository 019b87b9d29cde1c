//! The gateway's own control inputs (spec §4.5, §4.6): a setpoint
//! override, CH/control-mode enables, and a heartbeat the owning
//! application must refresh. These are the values an external
//! application (MQTT bridge, local UI) writes and the mediator reads when
//! it's operating in Proxy or Control mode rather than passing frames
//! through unmodified.

use core::cell::RefCell;

use critical_section::Mutex;

/// Snapshot of the override inputs at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OverrideState {
    pub setpoint_data_value: Option<u16>,
    pub ch_enable: Option<bool>,
    pub control_mode_enable: bool,
    heartbeat_at_us: u32,
}

impl Default for OverrideState {
    fn default() -> Self {
        Self { setpoint_data_value: None, ch_enable: None, control_mode_enable: false, heartbeat_at_us: 0 }
    }
}

/// Holds the override state behind a critical section and tracks
/// freshness against a caller-supplied heartbeat timeout (spec §4.6: an
/// override that's gone stale is treated as absent, not as its last
/// value, so a wedged supervisory application can't pin a boiler on).
pub struct OverrideBox {
    state: Mutex<RefCell<OverrideState>>,
    heartbeat_timeout_us: u32,
}

impl OverrideBox {
    pub const fn new(heartbeat_timeout_us: u32) -> Self {
        Self { state: Mutex::new(RefCell::new(OverrideState {
            setpoint_data_value: None,
            ch_enable: None,
            control_mode_enable: false,
            heartbeat_at_us: 0,
        })), heartbeat_timeout_us }
    }

    /// Replaces the override state wholesale and stamps the heartbeat.
    /// The owning application calls this on every control update, even
    /// one that changes nothing, purely to refresh the heartbeat.
    pub fn write(&self, setpoint_data_value: Option<u16>, ch_enable: Option<bool>, control_mode_enable: bool, now_us: u32) {
        critical_section::with(|cs| {
            *self.state.borrow(cs).borrow_mut() = OverrideState {
                setpoint_data_value,
                ch_enable,
                control_mode_enable,
                heartbeat_at_us: now_us,
            };
        });
    }

    /// Returns the current override state if its heartbeat is still
    /// within `heartbeat_timeout_us` of `now_us`, `None` if it's gone
    /// stale (or was never written).
    pub fn read_if_fresh(&self, now_us: u32) -> Option<OverrideState> {
        critical_section::with(|cs| {
            let state = *self.state.borrow(cs).borrow();
            if state.heartbeat_at_us == 0 && state.setpoint_data_value.is_none() && !state.control_mode_enable {
                return None;
            }
            if now_us.wrapping_sub(state.heartbeat_at_us) <= self.heartbeat_timeout_us {
                Some(state)
            } else {
                None
            }
        })
    }
}
