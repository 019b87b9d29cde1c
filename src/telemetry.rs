//! The gateway's shared view of the conversation it's forwarding (spec
//! §4.4, §4.5): every frame that passes through updates a per-data-id
//! slot, readable by whatever collects telemetry (an MQTT bridge, a
//! logging sink) without taking the line driver's path.
//!
//! Grounded in the same `critical_section::Mutex<RefCell<_>>` pattern used
//! in [`crate::line_driver`]: telemetry is written from the mediator's
//! forwarding step and read from unrelated contexts, so it needs the same
//! ISR-safe interior mutability even though no ISR touches it directly
//! here.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::frame::DataId;

/// How to interpret a data-id's 16-bit value, per the OpenTherm data-id
/// catalogue (spec §3). Classification only; conversion happens in
/// [`TelemetryEntry::as_f88`] etc. once the caller already knows which
/// accessor applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataKind {
    Flag8Flag8,
    U8U8,
    S8S8,
    F88,
    U16,
    S16,
}

/// Looks up the data kind for well-known ids; unknown ids default to
/// `U16` (the safest "don't reinterpret" fallback, matching `OpenTherm.h`
/// treating unrecognized ids as an opaque 16-bit word).
pub fn data_kind(id: DataId) -> DataKind {
    use crate::frame::data_id::*;
    match id {
        STATUS | MASTER_CONFIG | SLAVE_CONFIG | FAULT_FLAGS | RBP_FLAGS => DataKind::Flag8Flag8,
        REL_MOD_LEVEL | TSET | TSET_CH2 | TR | TBOILER | TDHW | TOUTSIDE | TRET | TSTORAGE
        | TCOLLECTOR | TFLOW_CH2 | TDHW2 | TEXHAUST | T_HEAT_EXCHANGER | TR_OVERRIDE | MAX_TSET
        | COOLING_CONTROL | CH_PRESSURE | DHW_FLOW_RATE => DataKind::F88,
        MAX_REL_MOD_LEVEL_SETTING => DataKind::U8U8,
        FAN_SPEED | RPM_EXHAUST | RPM_SUPPLY | CO2_EXHAUST => DataKind::U16,
        OEM_DIAGNOSTIC_CODE => DataKind::S16,
        SUCCESSFUL_BURNER_STARTS | CH_PUMP_STARTS | DHW_PUMP_VALVE_STARTS | DHW_BURNER_STARTS
        | BURNER_OPERATION_HOURS | CH_PUMP_OPERATION_HOURS | DHW_PUMP_VALVE_OPERATION_HOURS
        | DHW_BURNER_OPERATION_HOURS => DataKind::U16,
        _ => DataKind::U16,
    }
}

/// Rejects f8.8 readings outside a plausible temperature range, mirroring
/// the individual `if (floatVal > 0)`/range guards the original keeps
/// around specific data-ids (`boiler_manager.cpp`'s exhaust-temperature
/// and DHW-temperature handling). This crate has no per-id diagnostics
/// table to hang a narrower bound off of, so one shared range stands in
/// for all of them; other data kinds have no invalid region to reject.
fn is_sensible(id: DataId, data_value: u16) -> bool {
    if data_kind(id) == DataKind::F88 {
        let value = (data_value as i16) as f32 / 256.0;
        return (-40.0..500.0).contains(&value);
    }
    true
}

/// One data-id's last observed value and when it was observed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetryEntry {
    pub data_value: u16,
    pub observed_at_us: u32,
}

impl TelemetryEntry {
    pub fn as_f88(self) -> f32 {
        (self.data_value as i16) as f32 / 256.0
    }
}

const SLOT_COUNT: usize = 256;

/// Holds one [`TelemetryEntry`] per possible data-id (0-255), behind a
/// single critical section. 256 slots at a few bytes each comfortably
/// fits without an allocator.
pub struct TelemetryStore {
    slots: Mutex<RefCell<[Option<TelemetryEntry>; SLOT_COUNT]>>,
}

impl TelemetryStore {
    pub const fn new() -> Self {
        Self { slots: Mutex::new(RefCell::new([None; SLOT_COUNT])) }
    }

    /// Records a freshly observed value, overwriting whatever was there
    /// (spec §4.4: telemetry only ever reflects the most recent value).
    /// Silently drops values that are structurally valid but physically
    /// impossible for their data kind (spec §4.5's "non-sensical values ...
    /// are rejected at write time").
    pub fn record(&self, id: DataId, data_value: u16, observed_at_us: u32) {
        if !is_sensible(id, data_value) {
            log::debug!("rejecting nonsensical telemetry value for data-id {}: 0x{:04X}", id.0, data_value);
            return;
        }
        critical_section::with(|cs| {
            self.slots.borrow(cs).borrow_mut()[id.0 as usize] =
                Some(TelemetryEntry { data_value, observed_at_us });
        });
    }

    pub fn get(&self, id: DataId) -> Option<TelemetryEntry> {
        critical_section::with(|cs| self.slots.borrow(cs).borrow()[id.0 as usize])
    }

    /// Copies every currently-populated slot into `out`, returning how
    /// many entries were written. Used by a telemetry collector that
    /// wants a full sweep rather than one id at a time.
    pub fn snapshot_into(&self, out: &mut [(DataId, TelemetryEntry); SLOT_COUNT]) -> usize {
        critical_section::with(|cs| {
            let slots = self.slots.borrow(cs).borrow();
            let mut n = 0;
            for (idx, slot) in slots.iter().enumerate() {
                if let Some(entry) = slot {
                    out[n] = (DataId(idx as u8), *entry);
                    n += 1;
                }
            }
            n
        })
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::data_id;

    #[test]
    fn record_then_get_returns_latest_value() {
        let store = TelemetryStore::new();
        assert!(store.get(data_id::TBOILER).is_none());
        store.record(data_id::TBOILER, 0x1400, 1000);
        let entry = store.get(data_id::TBOILER).unwrap();
        assert_eq!(entry.data_value, 0x1400);
        assert_eq!(entry.observed_at_us, 1000);

        store.record(data_id::TBOILER, 0x1500, 2000);
        let entry = store.get(data_id::TBOILER).unwrap();
        assert_eq!(entry.data_value, 0x1500);
    }

    #[test]
    fn snapshot_into_reports_only_populated_slots() {
        let store = TelemetryStore::new();
        store.record(data_id::STATUS, 0x0300, 10);
        store.record(data_id::TBOILER, 0x1400, 20);
        let mut out = [(DataId(0), TelemetryEntry { data_value: 0, observed_at_us: 0 }); SLOT_COUNT];
        let n = store.snapshot_into(&mut out);
        assert_eq!(n, 2);
    }

    #[test]
    fn data_kind_classifies_known_ids() {
        assert_eq!(data_kind(data_id::STATUS), DataKind::Flag8Flag8);
        assert_eq!(data_kind(data_id::TBOILER), DataKind::F88);
        assert_eq!(data_kind(DataId(200)), DataKind::U16);
    }

    #[test]
    fn nonsensical_f88_reading_is_rejected() {
        let store = TelemetryStore::new();
        // -60.0C as f8.8, outside the plausible range.
        let out_of_range = (-60.0f32 * 256.0) as i16 as u16;
        store.record(data_id::TBOILER, out_of_range, 10);
        assert!(store.get(data_id::TBOILER).is_none());
    }

    #[test]
    fn non_f88_kind_has_no_rejection_range() {
        let store = TelemetryStore::new();
        store.record(data_id::STATUS, 0xFFFF, 10);
        assert!(store.get(data_id::STATUS).is_some());
    }
}
