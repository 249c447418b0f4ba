//! The IntelliVue custom 32-bit decimal float (PIPG-40).
//!
//! Not IEEE 754: the high byte is a signed decimal exponent, the low 24
//! bits a signed mantissa, value = mantissa * 10^exponent. Because the
//! exponent is decimal there is no binary/decimal rounding slop, but the
//! same value has many encodings (32 is both `0xFD007D00` and
//! `0xFF000140`), so decode-then-encode is not an identity and no encoder
//! exists.

use crate::wire::WireError;

const MANTISSA_MASK: u32 = 0x00FF_FFFF;
const MANTISSA_NAN: u32 = 0x7F_FFFF;
const MANTISSA_NRES: u32 = 0x80_0000;
const MANTISSA_POS_INFINITY: u32 = 0x7F_FFFE;
const MANTISSA_NEG_INFINITY: u32 = 0x80_0002;

/// A decoded observation value.
///
/// The two NaN encodings are kept distinct: `NotAtThisResolution` means
/// the monitor has the measurement but cannot express it at the
/// requested resolution, which is diagnostically different from plain
/// "not a number".
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FloatValue {
    Number(f64),
    PosInfinity,
    NegInfinity,
    NotANumber,
    NotAtThisResolution,
}

impl FloatValue {
    /// Decode a 32-bit word. Infallible; the special mantissas are keyed
    /// before sign extension.
    pub fn from_bits(bits: u32) -> Self {
        match bits & MANTISSA_MASK {
            MANTISSA_NAN => return FloatValue::NotANumber,
            MANTISSA_NRES => return FloatValue::NotAtThisResolution,
            MANTISSA_POS_INFINITY => return FloatValue::PosInfinity,
            MANTISSA_NEG_INFINITY => return FloatValue::NegInfinity,
            _ => {}
        }
        // Sign-extend the 24-bit mantissa and the 8-bit exponent.
        let mantissa = ((bits << 8) as i32) >> 8;
        let exponent = (bits >> 24) as u8 as i8;
        FloatValue::Number(mantissa as f64 * 10f64.powi(exponent as i32))
    }

    /// Checked decode for inputs of unknown width.
    pub fn decode(raw: u64) -> Result<Self, WireError> {
        u32::try_from(raw)
            .map(Self::from_bits)
            .map_err(|_| WireError::DecodeOutOfRange)
    }

    /// Collapse onto IEEE semantics for arithmetic and JSON output.
    pub fn as_f64(&self) -> f64 {
        match self {
            FloatValue::Number(v) => *v,
            FloatValue::PosInfinity => f64::INFINITY,
            FloatValue::NegInfinity => f64::NEG_INFINITY,
            FloatValue::NotANumber | FloatValue::NotAtThisResolution => f64::NAN,
        }
    }
}

/// Build the wire word for a given mantissa/exponent pair.
///
/// This is a constructor for test vectors and the simulator, not an
/// encoder: it does no normalization and rejects nothing, so callers must
/// stay inside 24-bit mantissa range themselves.
pub fn to_bits(mantissa: i32, exponent: i8) -> u32 {
    ((exponent as u8 as u32) << 24) | (mantissa as u32 & MANTISSA_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_examples() {
        // PIPG-41 worked examples: two encodings each of 32 and 3200.
        assert_eq!(FloatValue::from_bits(0xFD00_7D00), FloatValue::Number(32.0));
        assert_eq!(FloatValue::from_bits(0xFF00_0140), FloatValue::Number(32.0));
        assert_eq!(FloatValue::from_bits(0x0100_0140), FloatValue::Number(3200.0));
        assert_eq!(FloatValue::from_bits(0x0200_0020), FloatValue::Number(3200.0));
    }

    #[test]
    fn special_mantissas() {
        assert_eq!(FloatValue::from_bits(0x007F_FFFF), FloatValue::NotANumber);
        assert_eq!(FloatValue::from_bits(0x0080_0000), FloatValue::NotAtThisResolution);
        assert_eq!(FloatValue::from_bits(0x007F_FFFE), FloatValue::PosInfinity);
        assert_eq!(FloatValue::from_bits(0x0080_0002), FloatValue::NegInfinity);

        // The specials key on the mantissa regardless of exponent.
        assert_eq!(FloatValue::from_bits(0x057F_FFFF), FloatValue::NotANumber);
        assert!(FloatValue::from_bits(0x007F_FFFF).as_f64().is_nan());
    }

    #[test]
    fn negative_mantissa_and_exponent() {
        // mantissa 0xFFFFFF = -1, exponent 0
        assert_eq!(FloatValue::from_bits(0x00FF_FFFF), FloatValue::Number(-1.0));
        // mantissa -2, exponent -2 -> -0.02
        assert_eq!(
            FloatValue::from_bits(to_bits(-2, -2)),
            FloatValue::Number(-0.02)
        );
    }

    #[test]
    fn sign_extension_law() {
        // decode((e << 24) | m) == sign_extend(m) * 10^sign_extend(e)
        // for a grid of non-special mantissa/exponent pairs.
        let mantissas: &[i32] = &[0, 1, -1, 98, 320, -320, 32000, 8_388_605, -8_388_606];
        let exponents: &[i8] = &[-4, -3, -1, 0, 1, 2, 4];
        for &m in mantissas {
            for &e in exponents {
                let expected = m as f64 * 10f64.powi(e as i32);
                match FloatValue::from_bits(to_bits(m, e)) {
                    FloatValue::Number(v) => assert_eq!(v, expected, "m={m} e={e}"),
                    other => panic!("m={m} e={e} decoded as {other:?}"),
                }
            }
        }
    }

    #[test]
    fn rejects_wider_than_32_bits() {
        assert_eq!(FloatValue::decode(0x1_0000_0000), Err(WireError::DecodeOutOfRange));
        assert_eq!(FloatValue::decode(1), Ok(FloatValue::Number(1.0)));
    }
}
