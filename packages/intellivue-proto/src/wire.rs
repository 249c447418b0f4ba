//! Decode/encode primitives shared by every record type.
//!
//! Decoders take a byte slice and return the parsed value together with
//! the unconsumed tail; a record's `length` field is authoritative for
//! framing, and bytes past a fully-parsed record are handed back to the
//! caller rather than consumed. All multi-byte integers are big-endian.

use bytes::BufMut;
use thiserror::Error;

/// Result of decoding one value from the front of a buffer.
pub type WireResult<'a, T> = Result<(T, &'a [u8]), WireError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// A length field or fixed-width read runs past the end of the buffer.
    #[error("truncated PDU")]
    TruncatedPdu,

    /// A count/length pair disagrees with what was actually parsed.
    #[error("bad length: declared {declared}, parsed {parsed}")]
    BadLength { declared: usize, parsed: usize },

    /// A tag field carries a value with no known dispatch entry.
    #[error("unknown {field} tag {value:#06x}")]
    UnknownTag { field: &'static str, value: u32 },

    /// Input to the float decoder does not fit in 32 bits.
    #[error("float encoding out of range")]
    DecodeOutOfRange,
}

/// Structural decode from the front of a buffer.
pub trait Decode: Sized {
    fn decode(buf: &[u8]) -> WireResult<'_, Self>;
}

/// Structural encode onto the end of a buffer.
pub trait Encode {
    fn encode(&self, out: &mut Vec<u8>);

    fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

pub fn read_u8(buf: &[u8]) -> WireResult<'_, u8> {
    match buf.split_first() {
        Some((&b, rest)) => Ok((b, rest)),
        None => Err(WireError::TruncatedPdu),
    }
}

pub fn read_u16(buf: &[u8]) -> WireResult<'_, u16> {
    if buf.len() < 2 {
        return Err(WireError::TruncatedPdu);
    }
    Ok((u16::from_be_bytes([buf[0], buf[1]]), &buf[2..]))
}

pub fn read_u32(buf: &[u8]) -> WireResult<'_, u32> {
    if buf.len() < 4 {
        return Err(WireError::TruncatedPdu);
    }
    Ok((u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]), &buf[4..]))
}

/// Split off exactly `len` bytes.
pub fn read_bytes(buf: &[u8], len: usize) -> WireResult<'_, &[u8]> {
    if buf.len() < len {
        return Err(WireError::TruncatedPdu);
    }
    Ok(buf.split_at(len))
}

/// LI length encoding used by association-control messages (PIPG-66).
///
/// Lengths up to 254 are one byte; 255..=65535 are `{0xFF, hi, lo}`.
pub fn read_li_length(buf: &[u8]) -> WireResult<'_, usize> {
    let (first, rest) = read_u8(buf)?;
    if first == 0xFF {
        let (len, rest) = read_u16(rest)?;
        Ok((len as usize, rest))
    } else {
        Ok((first as usize, rest))
    }
}

pub fn write_li_length(out: &mut Vec<u8>, len: usize) {
    debug_assert!(len <= u16::MAX as usize);
    if len <= 254 {
        out.put_u8(len as u8);
    } else {
        out.put_u8(0xFF);
        out.put_u16(len as u16);
    }
}

/// ASN.1-style length used inside the association user-info block: one
/// byte up to 127, otherwise `0x80 | n` followed by n length bytes, MSB
/// first.
pub fn read_asn_length(buf: &[u8]) -> WireResult<'_, usize> {
    let (first, mut rest) = read_u8(buf)?;
    if first & 0x80 == 0 {
        return Ok((first as usize, rest));
    }
    let n = (first & 0x7F) as usize;
    let mut len = 0usize;
    for _ in 0..n {
        let (b, r) = read_u8(rest)?;
        len = (len << 8) | b as usize;
        rest = r;
    }
    Ok((len, rest))
}

pub fn write_asn_length(out: &mut Vec<u8>, len: usize) {
    if len <= 0x7F {
        out.put_u8(len as u8);
    } else if len <= 0xFFFF {
        out.put_u8(0x82);
        out.put_u16(len as u16);
    } else {
        out.put_u8(0x84);
        out.put_u32(len as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn li_short_form() {
        let mut out = Vec::new();
        write_li_length(&mut out, 4);
        assert_eq!(out, [0x04]);
        assert_eq!(read_li_length(&out).unwrap(), (4, &[][..]));
    }

    #[test]
    fn li_boundary_is_inclusive_at_254() {
        let mut short = Vec::new();
        write_li_length(&mut short, 254);
        assert_eq!(short, [0xFE]);

        let mut long = Vec::new();
        write_li_length(&mut long, 255);
        assert_eq!(long, [0xFF, 0x00, 0xFF]);
    }

    #[test]
    fn li_long_form() {
        let mut out = Vec::new();
        write_li_length(&mut out, 300);
        assert_eq!(out, [0xFF, 0x01, 0x2C]);
        assert_eq!(read_li_length(&out).unwrap(), (300, &[][..]));
    }

    #[test]
    fn li_round_trip() {
        for len in [0usize, 1, 15, 254, 255, 256, 300, 65535] {
            let mut out = Vec::new();
            write_li_length(&mut out, len);
            let (decoded, rest) = read_li_length(&out).unwrap();
            assert_eq!(decoded, len);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn asn_short_and_long_form() {
        let mut short = Vec::new();
        write_asn_length(&mut short, 127);
        assert_eq!(short, [0x7F]);

        let mut long = Vec::new();
        write_asn_length(&mut long, 128);
        assert_eq!(long, [0x82, 0x00, 0x80]);
        assert_eq!(read_asn_length(&long).unwrap(), (128, &[][..]));
    }

    #[test]
    fn asn_round_trip() {
        for len in [0usize, 1, 127, 128, 255, 65535, 70000] {
            let mut out = Vec::new();
            write_asn_length(&mut out, len);
            let (decoded, rest) = read_asn_length(&out).unwrap();
            assert_eq!(decoded, len);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn reads_return_tail() {
        let buf = [0x12, 0x34, 0x56];
        let (v, rest) = read_u16(&buf).unwrap();
        assert_eq!(v, 0x1234);
        assert_eq!(rest, &[0x56]);
    }

    #[test]
    fn truncated_reads_fail() {
        assert_eq!(read_u16(&[0x01]).unwrap_err(), WireError::TruncatedPdu);
        assert_eq!(read_u32(&[0x01, 0x02]).unwrap_err(), WireError::TruncatedPdu);
        assert_eq!(read_bytes(&[0x01], 2).unwrap_err(), WireError::TruncatedPdu);
    }
}
