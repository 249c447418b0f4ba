//! Association control (PIPG-65..70, PIPG-296..301).
//!
//! Association messages ride the protocol port but are not data-export
//! PDUs: a one-byte session header type, an LI-encoded length, then a
//! presentation-layer payload. The PIPG documents most of that payload
//! only by example, so the interior is carried here as verbatim byte
//! templates from the documented capture; only the MDSE user info — the
//! part that advertises what the client wants to poll — is encoded
//! structurally.

use bytes::BufMut;

use crate::attrs::{Attribute, AttributeList};
use crate::nomenclature::{NOM_ATTR_POLL_PROFILE_EXT, NOM_POLL_PROFILE_SUPPORT};
use crate::wire::{
    read_bytes, read_li_length, read_u32, read_u8, write_asn_length, write_li_length, Decode,
    Encode, WireError, WireResult,
};

// ── Session headers ───────────────────────────────────────────────────────────

/// Session header types (PIPG-67).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionHeaderKind {
    /// Session Connect: carries an Association Request.
    Connect = 0x0D,
    /// Session Accept: the association has been established.
    Accept = 0x0E,
    /// Session Refuse: an association could not be established.
    Refuse = 0x0C,
    /// Session Finish: carries a Release Request.
    Finish = 0x09,
    /// Session Disconnect: carries a Release Response.
    Disconnect = 0x0A,
    /// Session Abort: immediate termination.
    Abort = 0x19,
}

impl TryFrom<u8> for SessionHeaderKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        match value {
            0x0D => Ok(SessionHeaderKind::Connect),
            0x0E => Ok(SessionHeaderKind::Accept),
            0x0C => Ok(SessionHeaderKind::Refuse),
            0x09 => Ok(SessionHeaderKind::Finish),
            0x0A => Ok(SessionHeaderKind::Disconnect),
            0x19 => Ok(SessionHeaderKind::Abort),
            v => Err(WireError::UnknownTag { field: "session_header", value: v as u32 }),
        }
    }
}

/// An association-control message: header type, LI length, opaque
/// payload. The gateway only ever inspects the kind; the payload is
/// preserved byte-for-byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssociationMessage {
    pub kind: SessionHeaderKind,
    pub payload: Vec<u8>,
}

impl Decode for AssociationMessage {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (raw_kind, rest) = read_u8(buf)?;
        let kind = SessionHeaderKind::try_from(raw_kind)?;
        let (length, rest) = read_li_length(rest)?;
        let (payload, rest) = read_bytes(rest, length)?;
        Ok((AssociationMessage { kind, payload: payload.to_vec() }, rest))
    }
}

impl Encode for AssociationMessage {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u8(self.kind as u8);
        write_li_length(out, self.payload.len());
        out.put_slice(&self.payload);
    }
}

// ── Poll profile (PIPG-72..74) ────────────────────────────────────────────────

pub const POLL_PROFILE_REV_0: u32 = 0x8000_0000;

pub const POLL_EXT_PERIOD_NU_1SEC: u32 = 0x8000_0000;
pub const POLL_EXT_PERIOD_NU_AVG_12SEC: u32 = 0x4000_0000;
pub const POLL_EXT_PERIOD_NU_AVG_60SEC: u32 = 0x2000_0000;
pub const POLL_EXT_PERIOD_NU_AVG_300SEC: u32 = 0x1000_0000;
pub const POLL_EXT_PERIOD_RTSA: u32 = 0x0800_0000;
pub const POLL_EXT_ENUM: u32 = 0x0400_0000;
pub const POLL_EXT_NU_PRIO_LIST: u32 = 0x0200_0000;
pub const POLL_EXT_DYN_MODALITIES: u32 = 0x0100_0000;

/// Base poll profile advertised during association.
#[derive(Clone, Debug, PartialEq)]
pub struct PollProfileSupport {
    pub poll_profile_revision: u32,
    /// Minimum poll period in relative-time units (1/8000 s).
    pub min_poll_period: u32,
    pub max_mtu_rx: u32,
    pub max_mtu_tx: u32,
    pub max_bw_tx: u32,
    pub options: u32,
    pub optional_packages: AttributeList,
}

impl Decode for PollProfileSupport {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (poll_profile_revision, rest) = read_u32(buf)?;
        let (min_poll_period, rest) = read_u32(rest)?;
        let (max_mtu_rx, rest) = read_u32(rest)?;
        let (max_mtu_tx, rest) = read_u32(rest)?;
        let (max_bw_tx, rest) = read_u32(rest)?;
        let (options, rest) = read_u32(rest)?;
        let (optional_packages, rest) = AttributeList::decode(rest)?;
        Ok((
            PollProfileSupport {
                poll_profile_revision,
                min_poll_period,
                max_mtu_rx,
                max_mtu_tx,
                max_bw_tx,
                options,
                optional_packages,
            },
            rest,
        ))
    }
}

impl Encode for PollProfileSupport {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u32(self.poll_profile_revision);
        out.put_u32(self.min_poll_period);
        out.put_u32(self.max_mtu_rx);
        out.put_u32(self.max_mtu_tx);
        out.put_u32(self.max_bw_tx);
        out.put_u32(self.options);
        self.optional_packages.encode(out);
    }
}

/// Poll profile extension package.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PollProfileExt {
    pub options: u32,
    pub ext_attr: AttributeList,
}

impl Decode for PollProfileExt {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (options, rest) = read_u32(buf)?;
        let (ext_attr, rest) = AttributeList::decode(rest)?;
        Ok((PollProfileExt { options, ext_attr }, rest))
    }
}

impl Encode for PollProfileExt {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u32(self.options);
        self.ext_attr.encode(out);
    }
}

// ── MDSE user info ────────────────────────────────────────────────────────────

pub const MDDL_VERSION1: u32 = 0x8000_0000;
pub const NOMEN_VERSION: u32 = 0x4000_0000;
pub const SYST_CLIENT: u32 = 0x8000_0000;
pub const HOT_START: u32 = 0x8000_0000;

/// The MDSEUserInfoStd block inside the association request.
#[derive(Clone, Debug, PartialEq)]
pub struct MdseUserInfoStd {
    pub protocol_version: u32,
    pub nomenclature_version: u32,
    pub functional_units: u32,
    pub system_type: u32,
    pub startup_mode: u32,
    pub option_list: AttributeList,
    pub supported_aprofiles: AttributeList,
}

impl MdseUserInfoStd {
    /// The profile this gateway always requests: 1-second numerics,
    /// real-time sample arrays and enumerations enabled on top of the
    /// base poll profile.
    pub fn poll_profile_default() -> Self {
        let ext = PollProfileExt {
            options: POLL_EXT_PERIOD_NU_1SEC | POLL_EXT_PERIOD_RTSA | POLL_EXT_ENUM,
            ext_attr: AttributeList::default(),
        };
        let support = PollProfileSupport {
            poll_profile_revision: POLL_PROFILE_REV_0,
            min_poll_period: 0x0000_1900, // 800 ms
            max_mtu_rx: 1456,
            max_mtu_tx: 1456,
            max_bw_tx: 0xFFFF_FFFF,
            options: 0,
            optional_packages: AttributeList::new(vec![Attribute::new(
                NOM_ATTR_POLL_PROFILE_EXT,
                ext.to_vec(),
            )]),
        };
        MdseUserInfoStd {
            protocol_version: MDDL_VERSION1,
            nomenclature_version: NOMEN_VERSION,
            functional_units: 0,
            system_type: SYST_CLIENT,
            startup_mode: HOT_START,
            option_list: AttributeList::default(),
            supported_aprofiles: AttributeList::new(vec![Attribute::new(
                NOM_POLL_PROFILE_SUPPORT,
                support.to_vec(),
            )]),
        }
    }
}

impl Encode for MdseUserInfoStd {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u32(self.protocol_version);
        out.put_u32(self.nomenclature_version);
        out.put_u32(self.functional_units);
        out.put_u32(self.system_type);
        out.put_u32(self.startup_mode);
        self.option_list.encode(out);
        self.supported_aprofiles.encode(out);
    }
}

// ── Request builders ──────────────────────────────────────────────────────────

/// Session data block of the association request, copied from the
/// documented example (PIPG-298). No field-level definition exists in
/// the PIPG.
const ASSOC_REQ_SESSION_DATA: [u8; 14] = [
    0x05, 0x08, 0x13, 0x01, 0x00, 0x16, 0x01, 0x02, 0x80, 0x00, 0x14, 0x02, 0x00, 0x02,
];

/// Presentation-layer run from the start of the CP type up to the user
/// data, carried verbatim from the documented capture.
const ASSOC_REQ_PRESENTATION_HEADER: [u8; 102] = [
    0x31, 0x80, 0xA0, 0x80, 0x80, 0x01, 0x01, 0x00, 0x00, 0xA2, 0x80, 0xA0, 0x03, 0x00, 0x00,
    0x01, 0xA4, 0x80, 0x30, 0x80, 0x02, 0x01, 0x01, 0x06, 0x04, 0x52, 0x01, 0x00, 0x01, 0x30,
    0x80, 0x06, 0x02, 0x51, 0x01, 0x00, 0x00, 0x00, 0x00, 0x30, 0x80, 0x02, 0x01, 0x02, 0x06,
    0x04, 0x52, 0x01, 0x00, 0x02, 0x30, 0x80, 0x06, 0x02, 0x51, 0x02, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x61, 0x80, 0x30, 0x80, 0x02, 0x01, 0x01, 0xA0, 0x80, 0x60, 0x80, 0xA1, 0x80,
    0x06, 0x0C, 0x2A, 0x86, 0x48, 0xCE, 0x14, 0x02, 0x01, 0x00, 0x00, 0x00, 0x01, 0x01, 0x00,
    0x00, 0xBE, 0x80, 0x28, 0x80, 0x06, 0x0C, 0x2A, 0x86, 0x48, 0xCE, 0x14,
];

/// Continuation of the presentation header after the transfer-syntax
/// object identifier, ending at the user-info octet string.
const ASSOC_REQ_PRESENTATION_USER_DATA_TAG: [u8; 9] =
    [0x02, 0x01, 0x00, 0x00, 0x00, 0x02, 0x01, 0x02, 0x81];

/// End-of-contents trailer closing the indefinite-length constructs of
/// the presentation header.
const ASSOC_REQ_PRESENTATION_TRAILER: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00,
];

/// Build the complete association-request datagram.
pub fn association_request() -> Vec<u8> {
    let user_info = MdseUserInfoStd::poll_profile_default().to_vec();

    let mut presentation = Vec::new();
    presentation.extend_from_slice(&ASSOC_REQ_PRESENTATION_HEADER);
    presentation.extend_from_slice(&ASSOC_REQ_PRESENTATION_USER_DATA_TAG);
    write_asn_length(&mut presentation, user_info.len());
    presentation.extend_from_slice(&user_info);
    presentation.extend_from_slice(&ASSOC_REQ_PRESENTATION_TRAILER);

    let mut payload = Vec::new();
    payload.extend_from_slice(&ASSOC_REQ_SESSION_DATA);
    payload.push(0xC1); // presentation header marker
    write_li_length(&mut payload, presentation.len());
    payload.extend_from_slice(&presentation);

    AssociationMessage { kind: SessionHeaderKind::Connect, payload }.to_vec()
}

/// Fixed Release Request message (PIPG-301).
pub const RELEASE_REQUEST: [u8; 26] = [
    0x09, 0x18, 0xC1, 0x16, 0x61, 0x80, 0x30, 0x80, 0x02, 0x01, 0x01, 0xA0, 0x80, 0x62, 0x80,
    0x80, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_header_kinds() {
        assert_eq!(SessionHeaderKind::try_from(0x0E), Ok(SessionHeaderKind::Accept));
        assert_eq!(SessionHeaderKind::try_from(0x19), Ok(SessionHeaderKind::Abort));
        assert!(SessionHeaderKind::try_from(0x42).is_err());
    }

    #[test]
    fn association_message_round_trip_short() {
        let msg = AssociationMessage { kind: SessionHeaderKind::Accept, payload: vec![1, 2, 3, 4] };
        let bytes = msg.to_vec();
        assert_eq!(&bytes[..2], &[0x0E, 0x04]);
        let (decoded, rest) = AssociationMessage::decode(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn association_message_round_trip_long_li() {
        let msg = AssociationMessage { kind: SessionHeaderKind::Connect, payload: vec![0xAB; 300] };
        let bytes = msg.to_vec();
        assert_eq!(&bytes[..4], &[0x0D, 0xFF, 0x01, 0x2C]);
        let (decoded, rest) = AssociationMessage::decode(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn release_request_shape() {
        assert_eq!(RELEASE_REQUEST.len(), 26);
        let (msg, rest) = AssociationMessage::decode(&RELEASE_REQUEST).unwrap();
        assert!(rest.is_empty());
        assert_eq!(msg.kind, SessionHeaderKind::Finish);
        assert_eq!(msg.payload.len(), 0x18);
    }

    #[test]
    fn association_request_advertises_poll_profile() {
        let request = association_request();

        // Parses back as a Session Connect whose LI matches the payload.
        let (msg, rest) = AssociationMessage::decode(&request).unwrap();
        assert!(rest.is_empty());
        assert_eq!(msg.kind, SessionHeaderKind::Connect);
        assert!(msg.payload.starts_with(&ASSOC_REQ_SESSION_DATA));

        // The advertised extension options ride inside the user info.
        let ext = PollProfileExt {
            options: POLL_EXT_PERIOD_NU_1SEC | POLL_EXT_PERIOD_RTSA | POLL_EXT_ENUM,
            ext_attr: AttributeList::default(),
        };
        let needle = ext.to_vec();
        assert!(
            request.windows(needle.len()).any(|w| w == needle),
            "poll profile extension options missing from association request"
        );
    }

    #[test]
    fn poll_profile_support_round_trip() {
        let user_info = MdseUserInfoStd::poll_profile_default();
        let attr = user_info.supported_aprofiles.get(NOM_POLL_PROFILE_SUPPORT).unwrap();
        let crate::attrs::AttrValue::Unknown(bytes) = &attr.value else { panic!() };
        let (support, rest) = PollProfileSupport::decode(bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(support.poll_profile_revision, POLL_PROFILE_REV_0);

        let ext_attr = support.optional_packages.get(NOM_ATTR_POLL_PROFILE_EXT).unwrap();
        let crate::attrs::AttrValue::Unknown(ext_bytes) = &ext_attr.value else { panic!() };
        let (ext, rest) = PollProfileExt::decode(ext_bytes).unwrap();
        assert!(rest.is_empty());
        assert_ne!(ext.options & POLL_EXT_PERIOD_NU_1SEC, 0);
        assert_ne!(ext.options & POLL_EXT_PERIOD_RTSA, 0);
        assert_ne!(ext.options & POLL_EXT_ENUM, 0);
    }
}
