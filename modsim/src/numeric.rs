//! Numeric types, big-endian word packing, and the rounding/clamping
//! rules of spec.md §3 and §4.2.
//!
//! Packing follows the `ModbusParam`-style big-endian scheme used
//! throughout the pack's Modbus register drivers: high word first.

use serde::{Deserialize, Serialize};

/// The five numeric representations a register may be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NumericType {
    U16,
    U32,
    I16,
    I32,
    F32,
}

impl NumericType {
    /// Width in 16-bit words: 1 for the 16-bit types, 2 for the 32-bit ones.
    pub fn width(self) -> u8 {
        match self {
            NumericType::U16 | NumericType::I16 => 1,
            NumericType::U32 | NumericType::I32 | NumericType::F32 => 2,
        }
    }

    /// `[min, max]` of the type's representable range, as `f64`, used
    /// to clamp a computed raw value before encoding (spec.md §3,
    /// invariant 7).
    fn integer_range(self) -> (f64, f64) {
        match self {
            NumericType::U16 => (u16::MIN as f64, u16::MAX as f64),
            NumericType::U32 => (u32::MIN as f64, u32::MAX as f64),
            NumericType::I16 => (i16::MIN as f64, i16::MAX as f64),
            NumericType::I32 => (i32::MIN as f64, i32::MAX as f64),
            NumericType::F32 => (f32::MIN as f64, f32::MAX as f64),
        }
    }
}

/// Round-half-to-even ("banker's rounding"), used for the integer
/// numeric types so that `.5` ties don't bias upward over many ticks
/// (spec.md §4.2).
pub fn round_half_even(x: f64) -> f64 {
    let floor = x.floor();
    let diff = x - floor;
    if diff < 0.5 {
        floor
    } else if diff > 0.5 {
        floor + 1.0
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

/// Encode a scaled value into its wire words. Always returns two
/// words; callers of a width-1 register use only `[0]`. `scaled` must
/// already be finite — non-finite values are an `EvalError` the caller
/// handles before reaching this function.
pub fn encode(scaled: f64, scale: f64, ty: NumericType) -> [u16; 2] {
    let wire_value = scaled * scale;
    match ty {
        NumericType::F32 => {
            let (lo, hi) = ty.integer_range();
            let clamped = wire_value.clamp(lo, hi) as f32;
            let bits = clamped.to_bits();
            [(bits >> 16) as u16, (bits & 0xFFFF) as u16]
        }
        NumericType::U16 => {
            let (lo, hi) = ty.integer_range();
            let clamped = round_half_even(wire_value).clamp(lo, hi);
            [clamped as u16, 0]
        }
        NumericType::I16 => {
            let (lo, hi) = ty.integer_range();
            let clamped = round_half_even(wire_value).clamp(lo, hi);
            [(clamped as i16) as u16, 0]
        }
        NumericType::U32 => {
            let (lo, hi) = ty.integer_range();
            let clamped = round_half_even(wire_value).clamp(lo, hi) as u32;
            [(clamped >> 16) as u16, (clamped & 0xFFFF) as u16]
        }
        NumericType::I32 => {
            let (lo, hi) = ty.integer_range();
            let clamped = round_half_even(wire_value).clamp(lo, hi) as i32 as u32;
            [(clamped >> 16) as u16, (clamped & 0xFFFF) as u16]
        }
    }
}

/// Decode wire words back into the type's native numeric value (not
/// yet divided by `scale`). `words` must have at least `ty.width()`
/// entries.
pub fn decode_raw(words: &[u16], ty: NumericType) -> f64 {
    match ty {
        NumericType::U16 => words[0] as f64,
        NumericType::I16 => (words[0] as i16) as f64,
        NumericType::U32 => (((words[0] as u32) << 16) | words[1] as u32) as f64,
        NumericType::I32 => {
            ((((words[0] as u32) << 16) | words[1] as u32) as i32) as f64
        }
        NumericType::F32 => {
            let bits = ((words[0] as u32) << 16) | (words[1] as u32);
            f32::from_bits(bits) as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(NumericType::U16; "u16")]
    #[test_case(NumericType::U32; "u32")]
    #[test_case(NumericType::I16; "i16")]
    #[test_case(NumericType::I32; "i32")]
    #[test_case(NumericType::F32; "f32")]
    fn width_matches_word_count(ty: NumericType) {
        let words = encode(42.0, 1.0, ty);
        assert_eq!(decode_raw(&words[..ty.width() as usize], ty), 42.0);
    }

    #[test]
    fn round_half_even_ties_go_to_even_neighbor() {
        assert_eq!(round_half_even(0.5), 0.0);
        assert_eq!(round_half_even(1.5), 2.0);
        assert_eq!(round_half_even(2.5), 2.0);
        assert_eq!(round_half_even(-0.5), 0.0);
        assert_eq!(round_half_even(-1.5), -2.0);
    }

    #[test]
    fn u32_round_trips_big_endian() {
        // scenario 1 of spec.md §8: 230.0 * 5.0 = 1150.0, scale 1000
        let words = encode(1150.0, 1000.0, NumericType::U32);
        assert_eq!(words, [17, 35888]);
        let decoded = decode_raw(&words, NumericType::U32);
        assert_eq!(decoded / 1000.0, 1150.0);
    }

    #[test]
    fn i32_negative_round_trips() {
        let words = encode(-12.5, 1000.0, NumericType::I32);
        let decoded = decode_raw(&words, NumericType::I32);
        assert_eq!(decoded / 1000.0, -12.5);
    }

    #[test]
    fn u32_clamps_on_overflow() {
        let words = encode(1.0e12, 1.0, NumericType::U32);
        assert_eq!(decode_raw(&words, NumericType::U32), u32::MAX as f64);
    }

    #[test]
    fn f32_matches_ieee754_bit_pattern() {
        let words = encode(230.0, 1.0, NumericType::F32);
        let bits = ((words[0] as u32) << 16) | words[1] as u32;
        assert_eq!(f32::from_bits(bits), 230.0f32);
    }

    #[test]
    fn u16_clamps_to_type_bounds() {
        let words = encode(250.0, 1.0, NumericType::U16);
        assert_eq!(words[0], 250);
        let words = encode(-5.0, 1.0, NumericType::U16);
        assert_eq!(words[0], 0);
        let words = encode(100000.0, 1.0, NumericType::U16);
        assert_eq!(words[0], u16::MAX);
    }
}
