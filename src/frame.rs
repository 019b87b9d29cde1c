//! The 32-bit OpenTherm frame and the pure codec functions over it (spec §3, §4.3).
//!
//! Layout, MSB first: parity(1) | message-type(3) | spare(4, always 0) |
//! data-id(8) | data-value(16).

use bit_field::BitField;
use bitflags::bitflags;

/// One OpenTherm message type. The low three bits of the discriminant are
/// the wire value (spec §3's 3-bit message-type field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MessageType {
    /// Master-originated.
    ReadData = 0b000,
    WriteData = 0b001,
    InvalidData = 0b010,
    Reserved = 0b011,
    /// Slave-originated.
    ReadAck = 0b100,
    WriteAck = 0b101,
    DataInvalid = 0b110,
    UnknownDataId = 0b111,
}

impl MessageType {
    /// True for the four master-originated (request) message types.
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            MessageType::ReadData | MessageType::WriteData | MessageType::InvalidData
        )
    }

    /// True for the four slave-originated (response) message types.
    ///
    /// `Reserved` is neither a valid request nor response type.
    pub const fn is_response(self) -> bool {
        matches!(
            self,
            MessageType::ReadAck | MessageType::WriteAck | MessageType::DataInvalid | MessageType::UnknownDataId
        )
    }

    const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b000 => MessageType::ReadData,
            0b001 => MessageType::WriteData,
            0b010 => MessageType::InvalidData,
            0b011 => MessageType::Reserved,
            0b100 => MessageType::ReadAck,
            0b101 => MessageType::WriteAck,
            0b110 => MessageType::DataInvalid,
            _ => MessageType::UnknownDataId,
        }
    }
}

/// 8-bit OpenTherm data-id. A thin newtype rather than a bare `u8` so call
/// sites read `DataId(25)` instead of an unannotated magic number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataId(pub u8);

/// Well-known data-ids, named per `OpenThermMessageID` in the OpenTherm
/// specification. Not exhaustive of the 0-255 space; unnamed ids are still
/// valid `DataId(n)` values, just without a constant here.
pub mod data_id {
    use super::DataId;

    pub const STATUS: DataId = DataId(0);
    pub const TSET: DataId = DataId(1);
    pub const MASTER_CONFIG: DataId = DataId(2);
    pub const SLAVE_CONFIG: DataId = DataId(3);
    pub const REMOTE_REQUEST: DataId = DataId(4);
    pub const FAULT_FLAGS: DataId = DataId(5);
    pub const RBP_FLAGS: DataId = DataId(6);
    pub const COOLING_CONTROL: DataId = DataId(7);
    pub const TSET_CH2: DataId = DataId(8);
    pub const TR_OVERRIDE: DataId = DataId(9);
    pub const TR: DataId = DataId(24);
    pub const TBOILER: DataId = DataId(25);
    pub const TDHW: DataId = DataId(26);
    pub const TOUTSIDE: DataId = DataId(27);
    pub const TRET: DataId = DataId(28);
    pub const TSTORAGE: DataId = DataId(29);
    pub const TCOLLECTOR: DataId = DataId(30);
    pub const TFLOW_CH2: DataId = DataId(31);
    pub const TDHW2: DataId = DataId(32);
    pub const TEXHAUST: DataId = DataId(33);
    pub const T_HEAT_EXCHANGER: DataId = DataId(34);
    pub const FAN_SPEED: DataId = DataId(35);
    pub const REL_MOD_LEVEL: DataId = DataId(17);
    pub const CH_PRESSURE: DataId = DataId(18);
    pub const DHW_FLOW_RATE: DataId = DataId(19);
    pub const MAX_REL_MOD_LEVEL_SETTING: DataId = DataId(14);
    pub const MAX_TSET: DataId = DataId(57);
    pub const CO2_EXHAUST: DataId = DataId(79);
    pub const RPM_EXHAUST: DataId = DataId(84);
    pub const RPM_SUPPLY: DataId = DataId(85);
    pub const OEM_DIAGNOSTIC_CODE: DataId = DataId(115);
    pub const SUCCESSFUL_BURNER_STARTS: DataId = DataId(116);
    pub const CH_PUMP_STARTS: DataId = DataId(117);
    pub const DHW_PUMP_VALVE_STARTS: DataId = DataId(118);
    pub const DHW_BURNER_STARTS: DataId = DataId(119);
    pub const BURNER_OPERATION_HOURS: DataId = DataId(120);
    pub const CH_PUMP_OPERATION_HOURS: DataId = DataId(121);
    pub const DHW_PUMP_VALVE_OPERATION_HOURS: DataId = DataId(122);
    pub const DHW_BURNER_OPERATION_HOURS: DataId = DataId(123);
}

bitflags! {
    /// Data-id 0 (Status) flag byte, shared by the master->slave HB and the
    /// slave->master LB of the same frame (they name different bits but the
    /// wire shape is identical).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        /// Master: CH enable. Slave: CH active.
        const CH_ENABLE       = 1 << 0;
        /// Master: DHW enable. Slave: DHW active.
        const DHW_ENABLE      = 1 << 1;
        /// Master: cooling enable. Slave: flame on.
        const COOLING_ENABLE  = 1 << 2;
        /// Master: OTC active. Slave: cooling active.
        const OTC_ACTIVE      = 1 << 3;
        /// Master: CH2 enable. Slave: CH2 active.
        const CH2_ENABLE      = 1 << 4;
        /// Slave only: summer/winter.
        const SUMMER_WINTER   = 1 << 5;
        /// Slave only: DHW blocking.
        const DHW_BLOCKING    = 1 << 6;
        /// Slave only: fault indication.
        const FAULT           = 1 << 7;
    }
}

/// One 32-bit OpenTherm frame. Values are copied freely (spec §3: "Frames
/// are values").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame(u32);

impl Frame {
    /// Wraps a raw 32-bit word with no validation. Used by the decoder,
    /// which validates separately so it can report *which* check failed.
    pub const fn from_raw(raw: u32) -> Self {
        Frame(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn message_type(self) -> MessageType {
        MessageType::from_bits(self.0.get_bits(28..31) as u8)
    }

    pub fn data_id(self) -> DataId {
        DataId(self.0.get_bits(16..24) as u8)
    }

    pub fn data_value(self) -> u16 {
        self.0.get_bits(0..16) as u16
    }

    pub fn high_byte(self) -> u8 {
        (self.data_value() >> 8) as u8
    }

    pub fn low_byte(self) -> u8 {
        (self.data_value() & 0xFF) as u8
    }

    /// Signed 16-bit interpretation of the data-value.
    pub fn as_s16(self) -> i16 {
        self.data_value() as i16
    }

    /// f8.8 fixed-point interpretation: signed 16-bit value / 256.
    pub fn as_f88(self) -> f32 {
        self.as_s16() as f32 / 256.0
    }

    pub fn status_flags_hb(self) -> StatusFlags {
        StatusFlags::from_bits_truncate(self.high_byte())
    }

    pub fn status_flags_lb(self) -> StatusFlags {
        StatusFlags::from_bits_truncate(self.low_byte())
    }

    /// Parity bit as transmitted (bit 31).
    pub fn parity_bit(self) -> bool {
        self.0.get_bit(31)
    }

    /// True iff the full 32-bit word has even parity (spec §3, §8).
    pub fn has_even_parity(self) -> bool {
        self.0.count_ones() % 2 == 0
    }

    /// `is_valid_request` per spec §4.3.
    pub fn is_valid_request(self) -> bool {
        self.has_even_parity() && self.message_type().is_request()
    }

    /// `is_valid_response` per spec §4.3.
    pub fn is_valid_response(self) -> bool {
        self.has_even_parity() && self.message_type().is_response()
    }
}

/// Shared layout builder for `build_request`/`build_response`: both shift
/// message-type into bits 30-28, data-id into bits 23-16, data-value into
/// bits 15-0, then set bit 31 so the whole word has even parity.
fn build(message_type: MessageType, data_id: DataId, data_value: u16) -> Frame {
    let mut raw: u32 = 0;
    raw.set_bits(28..31, message_type as u32);
    raw.set_bits(16..24, data_id.0 as u32);
    raw.set_bits(0..16, data_value as u32);
    // Bit 31 is 0 so far; set it iff the popcount of the rest is odd.
    if raw.count_ones() % 2 != 0 {
        raw.set_bit(31, true);
    }
    Frame(raw)
}

/// Builds a master-originated frame (spec §4.3).
pub fn build_request(message_type: MessageType, data_id: DataId, data_value: u16) -> Frame {
    build(message_type, data_id, data_value)
}

/// Builds a slave-originated frame (spec §4.3). Identical layout/parity
/// rule to `build_request`; kept as a separate function because the two
/// are never interchangeable at call sites (a Port's role determines which
/// one it may send).
pub fn build_response(message_type: MessageType, data_id: DataId, data_value: u16) -> Frame {
    build(message_type, data_id, data_value)
}

/// Packs a signed temperature into the f8.8 representation used by most
/// OpenTherm data-ids.
pub fn f88_to_data_value(value: f32) -> u16 {
    ((value * 256.0) as i32 as i16) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_has_even_parity_for_every_type_and_wide_sample() {
        for t in [
            MessageType::ReadData,
            MessageType::WriteData,
            MessageType::InvalidData,
            MessageType::Reserved,
            MessageType::ReadAck,
            MessageType::WriteAck,
            MessageType::DataInvalid,
            MessageType::UnknownDataId,
        ] {
            for id in (0u16..=255).step_by(17) {
                for v in (0u32..=65535).step_by(257) {
                    let f = build_request(t, DataId(id as u8), v as u16);
                    assert!(f.has_even_parity(), "{:?} {} {}", t, id, v);
                    let g = build_response(t, DataId(id as u8), v as u16);
                    assert!(g.has_even_parity());
                }
            }
        }
    }

    #[test]
    fn flipping_any_single_bit_flips_parity() {
        let f = build_request(MessageType::ReadData, data_id::TBOILER, 0x1234);
        assert!(f.has_even_parity());
        for bit in 0..32 {
            let flipped = Frame(f.raw() ^ (1 << bit));
            assert_ne!(flipped.has_even_parity(), f.has_even_parity(), "bit {bit}");
        }
    }

    #[test]
    fn round_trip_recovers_fields_exactly() {
        for t in [MessageType::ReadData, MessageType::WriteAck, MessageType::DataInvalid] {
            for id in [0u8, 1, 25, 115, 255] {
                for v in [0u16, 1, 0x0300, 0x7FFF, 0xFFFF] {
                    let f = build_request(t, DataId(id), v);
                    assert_eq!(f.message_type(), t);
                    assert_eq!(f.data_id(), DataId(id));
                    assert_eq!(f.data_value(), v);
                }
            }
        }
    }

    #[test]
    fn is_valid_request_and_response_match_message_type_class() {
        let req = build_request(MessageType::ReadData, data_id::STATUS, 0x0300);
        assert!(req.is_valid_request());
        assert!(!req.is_valid_response());

        let resp = build_response(MessageType::ReadAck, data_id::STATUS, 0x030A);
        assert!(resp.is_valid_response());
        assert!(!resp.is_valid_request());

        let reserved = build_request(MessageType::Reserved, data_id::STATUS, 0);
        assert!(!reserved.is_valid_request());
        assert!(!reserved.is_valid_response());
    }

    #[test]
    fn f88_round_trips_common_temperatures() {
        for v in [0.0f32, 21.5, 55.0, -10.25] {
            let raw = f88_to_data_value(v);
            let f = build_response(MessageType::ReadAck, data_id::TBOILER, raw);
            assert!((f.as_f88() - v).abs() < 1.0 / 256.0);
        }
    }

    #[test]
    fn status_flags_decode_high_and_low_bytes_independently() {
        let f = build_request(MessageType::ReadData, data_id::STATUS, 0x0300);
        assert!(f.status_flags_hb().contains(StatusFlags::CH_ENABLE | StatusFlags::DHW_ENABLE));
        let resp = build_response(MessageType::ReadAck, data_id::STATUS, 0x030A);
        assert!(resp.status_flags_lb().contains(StatusFlags::COOLING_ENABLE));
    }
}
