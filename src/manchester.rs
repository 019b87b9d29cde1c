//! Manchester encode/decode over the 34-bit OpenTherm transmission frame
//! (spec §3, §8): start bit, 32 data bits, stop bit, each bit split into two
//! 500us half-bits with a mandatory mid-bit transition.
//!
//! This module knows nothing about GPIO or time sources; it consumes and
//! produces plain half-bit durations so it can be exhaustively unit tested
//! on a host.

use crate::error::DecodeError;
use crate::frame::Frame;

/// Nominal half-bit duration, per spec §3.
pub const HALF_BIT_US: u32 = 500;

/// A half-bit is accepted in this window around [`HALF_BIT_US`] (spec §8's
/// "tolerant of ±50us jitter" note, widened to the documented 300-700us
/// short / 700-1300us long split used by the decoder below).
const SHORT_MIN_US: u32 = 300;
const SHORT_MAX_US: u32 = 700;
const LONG_MIN_US: u32 = 700;
const LONG_MAX_US: u32 = 1300;

/// Logical line level for one half-bit slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// One classified half-bit edge as read off the line: how long the level
/// held, and what it held at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfBit {
    pub level: Level,
    pub duration_us: u32,
}

/// Manchester symbol duration class. A `Short` half-bit pairs with another
/// `Short` to make one data bit (no transition mid-cell boundary skipped);
/// a `Long` half-bit spans a full bit cell by itself when two consecutive
/// logical bits are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    Short,
    Long,
}

fn classify(duration_us: u32) -> Option<Span> {
    if (SHORT_MIN_US..SHORT_MAX_US).contains(&duration_us) {
        Some(Span::Short)
    } else if (LONG_MIN_US..=LONG_MAX_US).contains(&duration_us) {
        Some(Span::Long)
    } else {
        None
    }
}

/// Encodes one logical bit (G.E. Thomas convention used by OpenTherm:
/// logical 1 is a low-to-high transition, logical 0 is high-to-low) as a
/// pair of half-bit levels, appending them to `out`.
fn encode_bit(bit: bool, out: &mut heapless::Vec<Level, 68>) {
    if bit {
        let _ = out.push(Level::Low);
        let _ = out.push(Level::High);
    } else {
        let _ = out.push(Level::High);
        let _ = out.push(Level::Low);
    }
}

/// Encodes a full 34-bit transmission frame (start=1, 32 data bits MSB
/// first, stop=1) into 68 half-bit levels ready to be clocked onto the
/// line at [`HALF_BIT_US`] each.
pub fn encode(frame: Frame) -> heapless::Vec<Level, 68> {
    let mut out = heapless::Vec::new();
    encode_bit(true, &mut out);
    for i in (0..32).rev() {
        encode_bit((frame.raw() >> i) & 1 == 1, &mut out);
    }
    encode_bit(true, &mut out);
    out
}

/// Accumulates half-bits and produces a [`Frame`] once a full 34-bit
/// transmission frame has been seen, or a [`DecodeError`] if the stream
/// doesn't hold one.
///
/// Owns no timing state beyond the half-bits it's given: the caller (the
/// line driver) is responsible for deciding when an inter-frame gap means
/// "no more half-bits are coming" and finalizing the decode.
#[derive(Default)]
pub struct Decoder {
    half_bits: heapless::Vec<HalfBit, 68>,
}

impl Decoder {
    pub const fn new() -> Self {
        Self { half_bits: heapless::Vec::new() }
    }

    /// Feeds one observed half-bit. Returns `Err` if the buffer is already
    /// full (68 half-bits is the maximum a valid frame ever needs); the
    /// line driver treats that as a short-frame/framing bug upstream.
    pub fn push(&mut self, half_bit: HalfBit) -> Result<(), DecodeError> {
        self.half_bits.push(half_bit).map_err(|_| DecodeError::ShortFrame)
    }

    pub fn len(&self) -> usize {
        self.half_bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.half_bits.is_empty()
    }

    /// Attempts to decode the accumulated half-bits as a complete 34-bit
    /// transmission frame. Consumes the decoder's buffer either way;
    /// the caller starts a fresh `Decoder` for the next frame.
    pub fn finish(mut self) -> Result<Frame, DecodeError> {
        let levels = expand_spans(&self.half_bits)?;
        self.half_bits.clear();

        if levels.len() != 68 {
            return Err(DecodeError::ShortFrame);
        }

        let mut bits = heapless::Vec::<bool, 34>::new();
        let mut i = 0;
        while i + 1 < levels.len() {
            let a = levels[i];
            let b = levels[i + 1];
            let bit = match (a, b) {
                (Level::Low, Level::High) => true,
                (Level::High, Level::Low) => false,
                _ => return Err(DecodeError::MissingMidBitTransition),
            };
            let _ = bits.push(bit);
            i += 2;
        }

        if bits[0] != true {
            return Err(DecodeError::BadStartBit);
        }
        if bits[33] != true {
            return Err(DecodeError::BadStopBit);
        }

        let mut raw: u32 = 0;
        for &b in &bits[1..33] {
            raw = (raw << 1) | (b as u32);
        }
        let frame = Frame::from_raw(raw);
        if !frame.has_even_parity() {
            return Err(DecodeError::BadParity);
        }
        Ok(frame)
    }
}

/// Expands 34 classified half-bit durations into exactly 68 half-bit
/// levels: a `Short` half-bit contributes its own level, a `Long` half-bit
/// (spanning two half-bit slots at the same level, i.e. two equal logical
/// bits in a row collapsing the mid-cell transition) contributes its level
/// twice.
fn expand_spans(half_bits: &[HalfBit]) -> Result<heapless::Vec<Level, 68>, DecodeError> {
    let mut out = heapless::Vec::new();
    for hb in half_bits {
        let span = classify(hb.duration_us).ok_or(DecodeError::HalfBitOutOfRange)?;
        out.push(hb.level).map_err(|_| DecodeError::ShortFrame)?;
        if span == Span::Long {
            out.push(hb.level).map_err(|_| DecodeError::ShortFrame)?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{data_id, MessageType};

    fn levels_to_half_bits(levels: &[Level]) -> heapless::Vec<HalfBit, 68> {
        levels
            .iter()
            .map(|&level| HalfBit { level, duration_us: HALF_BIT_US })
            .collect()
    }

    #[test]
    fn encode_then_decode_recovers_frame_for_sample_of_frames() {
        let samples = [
            crate::frame::build_request(MessageType::ReadData, data_id::STATUS, 0x0300),
            crate::frame::build_response(MessageType::ReadAck, data_id::TBOILER, 0x1234),
            crate::frame::build_request(MessageType::WriteData, data_id::TSET, 0x0000),
        ];
        for frame in samples {
            let levels = encode(frame);
            let half_bits = levels_to_half_bits(&levels);
            let mut decoder = Decoder::new();
            for hb in half_bits {
                decoder.push(hb).unwrap();
            }
            let decoded = decoder.finish().unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn half_bit_outside_timing_window_is_rejected() {
        let frame = crate::frame::build_request(MessageType::ReadData, data_id::STATUS, 0x0300);
        let levels = encode(frame);
        let mut half_bits = levels_to_half_bits(&levels);
        half_bits[5].duration_us = 2000;
        let mut decoder = Decoder::new();
        for hb in half_bits {
            decoder.push(hb).unwrap();
        }
        assert_eq!(decoder.finish(), Err(DecodeError::HalfBitOutOfRange));
    }

    #[test]
    fn missing_mid_bit_transition_is_rejected() {
        let mut half_bits = heapless::Vec::<HalfBit, 68>::new();
        for _ in 0..68 {
            half_bits.push(HalfBit { level: Level::Low, duration_us: HALF_BIT_US }).unwrap();
        }
        let mut decoder = Decoder::new();
        for hb in half_bits {
            decoder.push(hb).unwrap();
        }
        assert_eq!(decoder.finish(), Err(DecodeError::MissingMidBitTransition));
    }

    #[test]
    fn short_frame_is_rejected() {
        let frame = crate::frame::build_request(MessageType::ReadData, data_id::STATUS, 0x0300);
        let levels = encode(frame);
        let half_bits = levels_to_half_bits(&levels[..60]);
        let mut decoder = Decoder::new();
        for hb in half_bits {
            decoder.push(hb).unwrap();
        }
        assert_eq!(decoder.finish(), Err(DecodeError::ShortFrame));
    }

    #[test]
    fn bad_parity_word_is_rejected() {
        let frame = crate::frame::build_request(MessageType::ReadData, data_id::STATUS, 0x0300);
        let corrupted = Frame::from_raw(frame.raw() ^ 0x1);
        let levels = encode(corrupted);
        let half_bits = levels_to_half_bits(&levels);
        let mut decoder = Decoder::new();
        for hb in half_bits {
            decoder.push(hb).unwrap();
        }
        assert_eq!(decoder.finish(), Err(DecodeError::BadParity));
    }
}
