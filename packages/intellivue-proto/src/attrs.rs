//! Attribute payload types and attribute lists (PIPG-36, PIPG-75).
//!
//! An attribute is an id, a length, and a payload whose structural type
//! is selected by the id. The dispatch table is static; ids without an
//! entry keep their payload as opaque bytes, which is not an error.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use bytes::BufMut;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::float::FloatValue;
use crate::nomenclature::{
    NOM_ATTR_NET_ADDR_INFO, NOM_ATTR_NU_VAL_OBS, NOM_ATTR_TIME_STAMP_ABS,
};
use crate::wire::{read_bytes, read_u16, read_u32, Decode, Encode, WireError, WireResult};

// ── MAC address ───────────────────────────────────────────────────────────────

/// A 6-byte hardware address. This is the canonical identity of a
/// monitor; the IP address is only a routing handle and may change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for slot in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| format!("bad MAC address: {s}"))?;
            *slot = u8::from_str_radix(part, 16).map_err(|_| format!("bad MAC address: {s}"))?;
        }
        if parts.next().is_some() {
            return Err(format!("bad MAC address: {s}"));
        }
        Ok(MacAddr(bytes))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

impl Decode for MacAddr {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (raw, rest) = read_bytes(buf, 6)?;
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(raw);
        Ok((MacAddr(bytes), rest))
    }
}

impl Encode for MacAddr {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_slice(&self.0);
    }
}

// ── Time ──────────────────────────────────────────────────────────────────────

/// Wall-clock time as the monitor reports it (PIPG-36). Fields are plain
/// bytes; `sec_fractions` counts hundredths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AbsoluteTime {
    pub century: u8,
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub sec_fractions: u8,
}

impl Decode for AbsoluteTime {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (raw, rest) = read_bytes(buf, 8)?;
        Ok((
            AbsoluteTime {
                century: raw[0],
                year: raw[1],
                month: raw[2],
                day: raw[3],
                hour: raw[4],
                minute: raw[5],
                second: raw[6],
                sec_fractions: raw[7],
            },
            rest,
        ))
    }
}

impl Encode for AbsoluteTime {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_slice(&[
            self.century,
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.sec_fractions,
        ]);
    }
}

// ── Identifier scoping records ────────────────────────────────────────────────

/// Partition-qualified identifier, the wire TYPE record (PIPG-37). The
/// partition stays a raw u16 here; resolve through
/// [`crate::nomenclature::Partition`] when interpreting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NomType {
    pub partition: u16,
    pub code: u16,
}

impl Decode for NomType {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (partition, rest) = read_u16(buf)?;
        let (code, rest) = read_u16(rest)?;
        Ok((NomType { partition, code }, rest))
    }
}

impl Encode for NomType {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u16(self.partition);
        out.put_u16(self.code);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlbHandle {
    pub context_id: u16,
    pub handle: u16,
}

impl Decode for GlbHandle {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (context_id, rest) = read_u16(buf)?;
        let (handle, rest) = read_u16(rest)?;
        Ok((GlbHandle { context_id, handle }, rest))
    }
}

impl Encode for GlbHandle {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u16(self.context_id);
        out.put_u16(self.handle);
    }
}

/// Object class plus instance handle (PIPG-38).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManagedObjectId {
    pub m_obj_class: u16,
    pub m_obj_inst: GlbHandle,
}

impl ManagedObjectId {
    pub fn class(class: u16) -> Self {
        ManagedObjectId { m_obj_class: class, m_obj_inst: GlbHandle::default() }
    }
}

impl Decode for ManagedObjectId {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (m_obj_class, rest) = read_u16(buf)?;
        let (m_obj_inst, rest) = GlbHandle::decode(rest)?;
        Ok((ManagedObjectId { m_obj_class, m_obj_inst }, rest))
    }
}

impl Encode for ManagedObjectId {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u16(self.m_obj_class);
        self.m_obj_inst.encode(out);
    }
}

// ── Numeric observation ───────────────────────────────────────────────────────

/// One numeric observation (PIPG-76). `value` keeps the raw float word;
/// decode it with [`NuObsValue::float`] so the encode path never needs a
/// float encoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NuObsValue {
    pub physio_id: u16,
    pub state: u16,
    pub unit_code: u16,
    pub value: u32,
}

impl NuObsValue {
    /// PIPG-77: the measurement is valid when none of INVALID,
    /// QUESTIONABLE, UNAVAILABLE or CALIBRATION_ONGOING is flagged.
    pub fn measurement_is_valid(&self) -> bool {
        self.state < 0x1000
    }

    pub fn float(&self) -> FloatValue {
        FloatValue::from_bits(self.value)
    }
}

impl Decode for NuObsValue {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (physio_id, rest) = read_u16(buf)?;
        let (state, rest) = read_u16(rest)?;
        let (unit_code, rest) = read_u16(rest)?;
        let (value, rest) = read_u32(rest)?;
        Ok((NuObsValue { physio_id, state, unit_code, value }, rest))
    }
}

impl Encode for NuObsValue {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u16(self.physio_id);
        out.put_u16(self.state);
        out.put_u16(self.unit_code);
        out.put_u32(self.value);
    }
}

// ── Network identity ──────────────────────────────────────────────────────────

/// Carried in discovery beacons (PIPG-109); the MAC here is what the
/// gateway keys monitors on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpAddressInfo {
    pub mac_address: MacAddr,
    pub ip_address: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
}

impl Decode for IpAddressInfo {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (mac_address, rest) = MacAddr::decode(buf)?;
        let (ip, rest) = read_u32(rest)?;
        let (mask, rest) = read_u32(rest)?;
        Ok((
            IpAddressInfo {
                mac_address,
                ip_address: Ipv4Addr::from(ip),
                subnet_mask: Ipv4Addr::from(mask),
            },
            rest,
        ))
    }
}

impl Encode for IpAddressInfo {
    fn encode(&self, out: &mut Vec<u8>) {
        self.mac_address.encode(out);
        out.put_u32(u32::from(self.ip_address));
        out.put_u32(u32::from(self.subnet_mask));
    }
}

// ── Attributes ────────────────────────────────────────────────────────────────

/// Typed attribute payload, selected by the attribute id.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    NumericObservation(NuObsValue),
    Timestamp(AbsoluteTime),
    NetAddress(IpAddressInfo),
    /// Ids with no dispatch entry keep their bytes untouched.
    Unknown(Vec<u8>),
}

/// The AVAType record (PIPG-38): id, length, payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub attribute_id: u16,
    pub value: AttrValue,
}

impl Attribute {
    pub fn new(attribute_id: u16, payload: Vec<u8>) -> Self {
        Attribute { attribute_id, value: AttrValue::Unknown(payload) }
    }
}

impl Decode for Attribute {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (attribute_id, rest) = read_u16(buf)?;
        let (length, rest) = read_u16(rest)?;
        let (payload, rest) = read_bytes(rest, length as usize)?;
        let value = match attribute_id {
            NOM_ATTR_NU_VAL_OBS => AttrValue::NumericObservation(NuObsValue::decode(payload)?.0),
            NOM_ATTR_TIME_STAMP_ABS => AttrValue::Timestamp(AbsoluteTime::decode(payload)?.0),
            NOM_ATTR_NET_ADDR_INFO => AttrValue::NetAddress(IpAddressInfo::decode(payload)?.0),
            _ => AttrValue::Unknown(payload.to_vec()),
        };
        Ok((Attribute { attribute_id, value }, rest))
    }
}

impl Encode for Attribute {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        match &self.value {
            AttrValue::NumericObservation(v) => v.encode(&mut payload),
            AttrValue::Timestamp(v) => v.encode(&mut payload),
            AttrValue::NetAddress(v) => v.encode(&mut payload),
            AttrValue::Unknown(bytes) => payload.extend_from_slice(bytes),
        }
        out.put_u16(self.attribute_id);
        out.put_u16(payload.len() as u16);
        out.put_slice(&payload);
    }
}

/// Count-and-length-prefixed attribute sequence (PIPG-39). The length is
/// authoritative for framing; the count must match the number of
/// elements actually parsed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeList {
    pub attributes: Vec<Attribute>,
}

impl AttributeList {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        AttributeList { attributes }
    }

    /// First attribute carrying the given id, if present.
    pub fn get(&self, attribute_id: u16) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.attribute_id == attribute_id)
    }
}

impl Decode for AttributeList {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (count, rest) = read_u16(buf)?;
        let (length, rest) = read_u16(rest)?;
        let (mut body, rest) = read_bytes(rest, length as usize)?;

        let mut attributes = Vec::with_capacity(count as usize);
        while !body.is_empty() {
            let (attr, tail) = Attribute::decode(body)?;
            attributes.push(attr);
            body = tail;
        }
        if attributes.len() != count as usize {
            return Err(WireError::BadLength {
                declared: count as usize,
                parsed: attributes.len(),
            });
        }
        Ok((AttributeList { attributes }, rest))
    }
}

impl Encode for AttributeList {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut body = Vec::new();
        for attr in &self.attributes {
            attr.encode(&mut body);
        }
        out.put_u16(self.attributes.len() as u16);
        out.put_u16(body.len() as u16);
        out.put_slice(&body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::float::to_bits;
    use crate::nomenclature;

    #[test]
    fn mac_display_and_parse() {
        let mac = MacAddr([0x06, 0x08, 0x06, 0x08, 0x00, 0x01]);
        assert_eq!(mac.to_string(), "06:08:06:08:00:01");
        assert_eq!("06:08:06:08:00:01".parse::<MacAddr>().unwrap(), mac);
        assert!("06:08:06:08:00".parse::<MacAddr>().is_err());
        assert!("zz:08:06:08:00:01".parse::<MacAddr>().is_err());
    }

    #[test]
    fn mac_serde_as_string() {
        let mac = MacAddr([0x00, 0x09, 0xFB, 0x09, 0x77, 0xBD]);
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"00:09:fb:09:77:bd\"");
        assert_eq!(serde_json::from_str::<MacAddr>(&json).unwrap(), mac);
    }

    #[test]
    fn nu_obs_value_dispatch() {
        let nu = NuObsValue {
            physio_id: nomenclature::NOM_PULS_OXIM_SAT_O2,
            state: 0,
            unit_code: nomenclature::NOM_DIM_PERCENT,
            value: to_bits(98, 0),
        };
        let attr = Attribute {
            attribute_id: nomenclature::NOM_ATTR_NU_VAL_OBS,
            value: AttrValue::NumericObservation(nu),
        };
        let bytes = attr.to_vec();
        let (decoded, rest) = Attribute::decode(&bytes).unwrap();
        assert!(rest.is_empty());
        match decoded.value {
            AttrValue::NumericObservation(v) => {
                assert_eq!(v, nu);
                assert_eq!(v.float(), FloatValue::Number(98.0));
            }
            other => panic!("wrong dispatch: {other:?}"),
        }
    }

    #[test]
    fn validity_boundary() {
        let mut nu = NuObsValue::default();
        for state in [0x0000, 0x0080, 0x0FFF] {
            nu.state = state;
            assert!(nu.measurement_is_valid(), "state {state:#06x}");
        }
        for state in [
            nomenclature::CALIBRATION_ONGOING,
            nomenclature::UNAVAILABLE,
            nomenclature::QUESTIONABLE,
            nomenclature::INVALID,
            0x8020,
        ] {
            nu.state = state;
            assert!(!nu.measurement_is_valid(), "state {state:#06x}");
        }
    }

    #[test]
    fn unknown_attribute_stays_opaque() {
        let raw = [0x09, 0x20, 0x00, 0x04, 0xDE, 0xAD, 0xBE, 0xEF, 0xFF];
        let (attr, rest) = Attribute::decode(&raw).unwrap();
        assert_eq!(attr.attribute_id, 0x0920);
        assert_eq!(attr.value, AttrValue::Unknown(vec![0xDE, 0xAD, 0xBE, 0xEF]));
        // Trailing byte is returned, not consumed.
        assert_eq!(rest, &[0xFF]);
        assert_eq!(attr.to_vec(), &raw[..8]);
    }

    #[test]
    fn attribute_truncated_payload() {
        let raw = [0x09, 0x20, 0x00, 0x08, 0x01, 0x02];
        assert_eq!(Attribute::decode(&raw).unwrap_err(), WireError::TruncatedPdu);
    }

    #[test]
    fn attribute_list_round_trip() {
        let list = AttributeList::new(vec![
            Attribute::new(0x0921, vec![0x00, 0x01]),
            Attribute {
                attribute_id: nomenclature::NOM_ATTR_NET_ADDR_INFO,
                value: AttrValue::NetAddress(IpAddressInfo {
                    mac_address: MacAddr([0x06, 0x08, 0x06, 0x08, 0x00, 0x01]),
                    ip_address: Ipv4Addr::new(10, 13, 37, 2),
                    subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
                }),
            },
        ]);
        let bytes = list.to_vec();
        // count == len(list), length == byte length of the elements
        assert_eq!(&bytes[0..2], &[0x00, 0x02]);
        let declared_len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        assert_eq!(declared_len, bytes.len() - 4);

        let (decoded, rest) = AttributeList::decode(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, list);
    }

    #[test]
    fn attribute_list_count_mismatch() {
        // One attribute on the wire, count claims two.
        let mut bytes = AttributeList::new(vec![Attribute::new(1, vec![])]).to_vec();
        bytes[1] = 2;
        assert_eq!(
            AttributeList::decode(&bytes).unwrap_err(),
            WireError::BadLength { declared: 2, parsed: 1 }
        );
    }

    #[test]
    fn attribute_list_length_overruns_buffer() {
        let bytes = [0x00, 0x01, 0x00, 0x20, 0x00, 0x00];
        assert_eq!(AttributeList::decode(&bytes).unwrap_err(), WireError::TruncatedPdu);
    }
}
