//! Remote-operation envelopes and command bodies (PIPG-41..62).
//!
//! A data-export datagram is `SPpdu / ROapdus / <body>`, with the body
//! selected by `ro_type`, the command body by `command_type`, the event
//! body by `event_type` and the action body by `action_type`. Discovery
//! beacons use the same remote-operation chain under a `Nomenclature`
//! record instead of an `SPpdu`. Every `length` field is computed on
//! encode and authoritative on decode; trailing bytes are returned to
//! the caller.

use bytes::BufMut;

use crate::attrs::{
    AbsoluteTime, AttributeList, AttrValue, IpAddressInfo, ManagedObjectId, NomType,
};
use crate::nomenclature::{
    NOM_ACT_POLL_MDIB_DATA, NOM_ACT_POLL_MDIB_DATA_EXT, NOM_NOTI_CONN_INDIC,
    NOM_NOTI_MDS_CREAT,
};
use crate::wire::{read_bytes, read_u16, read_u32, read_u8, Decode, Encode, WireError, WireResult};

// ── Beacon prefix ─────────────────────────────────────────────────────────────

/// Leading record of a discovery beacon (PIPG-53).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nomenclature {
    pub magic: u16,
    pub major_version: u8,
    pub minor_version: u8,
}

impl Default for Nomenclature {
    fn default() -> Self {
        Nomenclature { magic: 0, major_version: 1, minor_version: 0 }
    }
}

impl Decode for Nomenclature {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (magic, rest) = read_u16(buf)?;
        let (major_version, rest) = read_u8(rest)?;
        let (minor_version, rest) = read_u8(rest)?;
        Ok((Nomenclature { magic, major_version, minor_version }, rest))
    }
}

impl Encode for Nomenclature {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u16(self.magic);
        out.put_u8(self.major_version);
        out.put_u8(self.minor_version);
    }
}

// ── Session presentation prefix ───────────────────────────────────────────────

/// Fixed value identifying a data-export message (PIPG-42).
pub const SESSION_ID: u16 = 0xE100;

/// Context id for data-export commands under the suggested association
/// encoding (PIPG-42).
pub const DATA_EXPORT_CONTEXT_ID: u16 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SPpdu {
    pub session_id: u16,
    pub context_id: u16,
}

impl Default for SPpdu {
    fn default() -> Self {
        SPpdu { session_id: SESSION_ID, context_id: DATA_EXPORT_CONTEXT_ID }
    }
}

impl Decode for SPpdu {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (session_id, rest) = read_u16(buf)?;
        let (context_id, rest) = read_u16(rest)?;
        Ok((SPpdu { session_id, context_id }, rest))
    }
}

impl Encode for SPpdu {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u16(self.session_id);
        out.put_u16(self.context_id);
    }
}

// ── Remote-operation envelope ─────────────────────────────────────────────────

pub const ROIV_APDU: u16 = 1;
pub const RORS_APDU: u16 = 2;
pub const ROER_APDU: u16 = 3;
pub const ROLRS_APDU: u16 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum CommandType {
    EventReport = 0,
    ConfirmedEventReport = 1,
    Get = 3,
    Set = 4,
    ConfirmedSet = 5,
    ConfirmedAction = 7,
}

impl TryFrom<u16> for CommandType {
    type Error = WireError;

    fn try_from(value: u16) -> Result<Self, WireError> {
        match value {
            0 => Ok(CommandType::EventReport),
            1 => Ok(CommandType::ConfirmedEventReport),
            3 => Ok(CommandType::Get),
            4 => Ok(CommandType::Set),
            5 => Ok(CommandType::ConfirmedSet),
            7 => Ok(CommandType::ConfirmedAction),
            v => Err(WireError::UnknownTag { field: "command_type", value: v as u32 }),
        }
    }
}

// Error values carried by ROERapdu (PIPG-45).
pub const NO_SUCH_OBJECT_CLASS: u16 = 0;
pub const NO_SUCH_OBJECT_INSTANCE: u16 = 1;
pub const ACCESS_DENIED: u16 = 2;
pub const GET_LIST_ERROR: u16 = 7;
pub const SET_LIST_ERROR: u16 = 8;
pub const NO_SUCH_ACTION: u16 = 9;
pub const PROCESSING_FAILURE: u16 = 10;
pub const INVALID_ARGUMENT_VALUE: u16 = 15;
pub const INVALID_SCOPE: u16 = 16;
pub const INVALID_OBJECT_INSTANCE: u16 = 17;

pub fn error_value_name(value: u16) -> &'static str {
    match value {
        NO_SUCH_OBJECT_CLASS => "NO_SUCH_OBJECT_CLASS",
        NO_SUCH_OBJECT_INSTANCE => "NO_SUCH_OBJECT_INSTANCE",
        ACCESS_DENIED => "ACCESS_DENIED",
        GET_LIST_ERROR => "GET_LIST_ERROR",
        SET_LIST_ERROR => "SET_LIST_ERROR",
        NO_SUCH_ACTION => "NO_SUCH_ACTION",
        PROCESSING_FAILURE => "PROCESSING_FAILURE",
        INVALID_ARGUMENT_VALUE => "INVALID_ARGUMENT_VALUE",
        INVALID_SCOPE => "INVALID_SCOPE",
        INVALID_OBJECT_INSTANCE => "INVALID_OBJECT_INSTANCE",
        _ => "UNKNOWN_ERROR_VALUE",
    }
}

/// The ROapdus envelope plus its dispatched body.
#[derive(Clone, Debug, PartialEq)]
pub enum Ro {
    Invoke(RoInvoke),
    Result(RoResult),
    Error(RoError),
    LinkedResult(RoLinkedResult),
}

impl Decode for Ro {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (ro_type, rest) = read_u16(buf)?;
        let (length, rest) = read_u16(rest)?;
        let (body, rest) = read_bytes(rest, length as usize)?;
        let ro = match ro_type {
            ROIV_APDU => Ro::Invoke(RoInvoke::decode(body)?.0),
            RORS_APDU => Ro::Result(RoResult::decode(body)?.0),
            ROER_APDU => Ro::Error(RoError::decode(body)?.0),
            ROLRS_APDU => Ro::LinkedResult(RoLinkedResult::decode(body)?.0),
            v => return Err(WireError::UnknownTag { field: "ro_type", value: v as u32 }),
        };
        Ok((ro, rest))
    }
}

impl Encode for Ro {
    fn encode(&self, out: &mut Vec<u8>) {
        let (ro_type, body) = match self {
            Ro::Invoke(v) => (ROIV_APDU, v.to_vec()),
            Ro::Result(v) => (RORS_APDU, v.to_vec()),
            Ro::Error(v) => (ROER_APDU, v.to_vec()),
            Ro::LinkedResult(v) => (ROLRS_APDU, v.to_vec()),
        };
        out.put_u16(ro_type);
        out.put_u16(body.len() as u16);
        out.put_slice(&body);
    }
}

impl Ro {
    pub fn invoke_id(&self) -> u16 {
        match self {
            Ro::Invoke(v) => v.invoke_id,
            Ro::Result(v) => v.invoke_id,
            Ro::Error(v) => v.invoke_id,
            Ro::LinkedResult(v) => v.invoke_id,
        }
    }

    /// Poll-reply contents if this is a (linked) result carrying one.
    pub fn poll_info_list(&self) -> Option<&PollInfoList> {
        let body = match self {
            Ro::Result(v) => &v.body,
            Ro::LinkedResult(v) => &v.body,
            _ => return None,
        };
        match body {
            ResultBody::Action(result) => match &result.body {
                ActionResultBody::Poll(reply) => Some(&reply.poll_info_list),
                ActionResultBody::PollExt(reply) => Some(&reply.poll_info_list),
                ActionResultBody::Opaque(_) => None,
            },
            _ => None,
        }
    }
}

// ── Invocations ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct RoInvoke {
    pub invoke_id: u16,
    pub command_type: CommandType,
    pub body: CommandBody,
}

impl Decode for RoInvoke {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (invoke_id, rest) = read_u16(buf)?;
        let (raw_cmd, rest) = read_u16(rest)?;
        let command_type = CommandType::try_from(raw_cmd)?;
        let (length, rest) = read_u16(rest)?;
        let (body, rest) = read_bytes(rest, length as usize)?;
        let body = CommandBody::decode_for(command_type, body)?;
        Ok((RoInvoke { invoke_id, command_type, body }, rest))
    }
}

impl Encode for RoInvoke {
    fn encode(&self, out: &mut Vec<u8>) {
        let body = self.body.to_vec();
        out.put_u16(self.invoke_id);
        out.put_u16(self.command_type as u16);
        out.put_u16(body.len() as u16);
        out.put_slice(&body);
    }
}

/// Body of an invocation, selected by the command type.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandBody {
    EventReport(EventReportArgument),
    Action(ActionArgument),
    Opaque(Vec<u8>),
}

impl CommandBody {
    fn decode_for(command_type: CommandType, buf: &[u8]) -> Result<Self, WireError> {
        match command_type {
            CommandType::EventReport | CommandType::ConfirmedEventReport => {
                Ok(CommandBody::EventReport(EventReportArgument::decode(buf)?.0))
            }
            CommandType::ConfirmedAction => Ok(CommandBody::Action(ActionArgument::decode(buf)?.0)),
            _ => Ok(CommandBody::Opaque(buf.to_vec())),
        }
    }
}

impl Encode for CommandBody {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            CommandBody::EventReport(v) => v.encode(out),
            CommandBody::Action(v) => v.encode(out),
            CommandBody::Opaque(bytes) => out.put_slice(bytes),
        }
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct RoResult {
    pub invoke_id: u16,
    pub command_type: CommandType,
    pub body: ResultBody,
}

impl Decode for RoResult {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (invoke_id, rest) = read_u16(buf)?;
        let (raw_cmd, rest) = read_u16(rest)?;
        let command_type = CommandType::try_from(raw_cmd)?;
        let (length, rest) = read_u16(rest)?;
        let (body, rest) = read_bytes(rest, length as usize)?;
        let body = ResultBody::decode_for(command_type, body)?;
        Ok((RoResult { invoke_id, command_type, body }, rest))
    }
}

impl Encode for RoResult {
    fn encode(&self, out: &mut Vec<u8>) {
        let body = self.body.to_vec();
        out.put_u16(self.invoke_id);
        out.put_u16(self.command_type as u16);
        out.put_u16(body.len() as u16);
        out.put_slice(&body);
    }
}

/// Body of a result, selected by the command type.
#[derive(Clone, Debug, PartialEq)]
pub enum ResultBody {
    EventReport(EventReportResult),
    Action(ActionResult),
    Opaque(Vec<u8>),
}

impl ResultBody {
    fn decode_for(command_type: CommandType, buf: &[u8]) -> Result<Self, WireError> {
        match command_type {
            CommandType::EventReport | CommandType::ConfirmedEventReport => {
                Ok(ResultBody::EventReport(EventReportResult::decode(buf)?.0))
            }
            CommandType::ConfirmedAction => Ok(ResultBody::Action(ActionResult::decode(buf)?.0)),
            _ => Ok(ResultBody::Opaque(buf.to_vec())),
        }
    }
}

impl Encode for ResultBody {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            ResultBody::EventReport(v) => v.encode(out),
            ResultBody::Action(v) => v.encode(out),
            ResultBody::Opaque(bytes) => out.put_slice(bytes),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoError {
    pub invoke_id: u16,
    pub error_value: u16,
    pub data: Vec<u8>,
}

impl RoError {
    pub fn error_name(&self) -> &'static str {
        error_value_name(self.error_value)
    }
}

impl Decode for RoError {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (invoke_id, rest) = read_u16(buf)?;
        let (error_value, rest) = read_u16(rest)?;
        let (length, rest) = read_u16(rest)?;
        let (data, rest) = read_bytes(rest, length as usize)?;
        Ok((RoError { invoke_id, error_value, data: data.to_vec() }, rest))
    }
}

impl Encode for RoError {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u16(self.invoke_id);
        out.put_u16(self.error_value);
        out.put_u16(self.data.len() as u16);
        out.put_slice(&self.data);
    }
}

// ── Linked results ────────────────────────────────────────────────────────────

pub const RORLS_FIRST: u8 = 1;
pub const RORLS_NOT_FIRST_NOT_LAST: u8 = 2;
pub const RORLS_LAST: u8 = 3;

/// Continuation marker preceding a linked result (PIPG-44).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RorlsId {
    pub state: u8,
    pub count: u8,
}

impl RorlsId {
    pub fn is_last(&self) -> bool {
        self.state == RORLS_LAST
    }
}

impl Decode for RorlsId {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (state, rest) = read_u8(buf)?;
        let (count, rest) = read_u8(rest)?;
        Ok((RorlsId { state, count }, rest))
    }
}

impl Encode for RorlsId {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u8(self.state);
        out.put_u8(self.count);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoLinkedResult {
    pub linked_id: RorlsId,
    pub invoke_id: u16,
    pub command_type: CommandType,
    pub body: ResultBody,
}

impl Decode for RoLinkedResult {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (linked_id, rest) = RorlsId::decode(buf)?;
        let (invoke_id, rest) = read_u16(rest)?;
        let (raw_cmd, rest) = read_u16(rest)?;
        let command_type = CommandType::try_from(raw_cmd)?;
        let (length, rest) = read_u16(rest)?;
        let (body, rest) = read_bytes(rest, length as usize)?;
        let body = ResultBody::decode_for(command_type, body)?;
        Ok((RoLinkedResult { linked_id, invoke_id, command_type, body }, rest))
    }
}

impl Encode for RoLinkedResult {
    fn encode(&self, out: &mut Vec<u8>) {
        let body = self.body.to_vec();
        self.linked_id.encode(out);
        out.put_u16(self.invoke_id);
        out.put_u16(self.command_type as u16);
        out.put_u16(body.len() as u16);
        out.put_slice(&body);
    }
}

// ── Event reports ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct EventReportArgument {
    pub managed_object: ManagedObjectId,
    pub event_time: u32,
    pub event_type: u16,
    pub body: EventBody,
}

/// Event body, selected by the event type.
#[derive(Clone, Debug, PartialEq)]
pub enum EventBody {
    MdsCreate(MdsCreateInfo),
    ConnectIndication(AttributeList),
    Opaque(Vec<u8>),
}

impl Decode for EventReportArgument {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (managed_object, rest) = ManagedObjectId::decode(buf)?;
        let (event_time, rest) = read_u32(rest)?;
        let (event_type, rest) = read_u16(rest)?;
        let (length, rest) = read_u16(rest)?;
        let (body, rest) = read_bytes(rest, length as usize)?;
        let body = match event_type {
            NOM_NOTI_MDS_CREAT => EventBody::MdsCreate(MdsCreateInfo::decode(body)?.0),
            NOM_NOTI_CONN_INDIC => EventBody::ConnectIndication(AttributeList::decode(body)?.0),
            _ => EventBody::Opaque(body.to_vec()),
        };
        Ok((EventReportArgument { managed_object, event_time, event_type, body }, rest))
    }
}

impl Encode for EventReportArgument {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut body = Vec::new();
        match &self.body {
            EventBody::MdsCreate(v) => v.encode(&mut body),
            EventBody::ConnectIndication(v) => v.encode(&mut body),
            EventBody::Opaque(bytes) => body.extend_from_slice(bytes),
        }
        self.managed_object.encode(out);
        out.put_u32(self.event_time);
        out.put_u16(self.event_type);
        out.put_u16(body.len() as u16);
        out.put_slice(&body);
    }
}

/// Contents of the MDS-Create event (PIPG-54).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MdsCreateInfo {
    pub managed_object: ManagedObjectId,
    pub attribute_list: AttributeList,
}

impl Decode for MdsCreateInfo {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (managed_object, rest) = ManagedObjectId::decode(buf)?;
        let (attribute_list, rest) = AttributeList::decode(rest)?;
        Ok((MdsCreateInfo { managed_object, attribute_list }, rest))
    }
}

impl Encode for MdsCreateInfo {
    fn encode(&self, out: &mut Vec<u8>) {
        self.managed_object.encode(out);
        self.attribute_list.encode(out);
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventReportResult {
    pub managed_object: ManagedObjectId,
    pub current_time: u32,
    pub event_type: u16,
    pub data: Vec<u8>,
}

impl Decode for EventReportResult {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (managed_object, rest) = ManagedObjectId::decode(buf)?;
        let (current_time, rest) = read_u32(rest)?;
        let (event_type, rest) = read_u16(rest)?;
        let (length, rest) = read_u16(rest)?;
        let (data, rest) = read_bytes(rest, length as usize)?;
        Ok((EventReportResult { managed_object, current_time, event_type, data: data.to_vec() }, rest))
    }
}

impl Encode for EventReportResult {
    fn encode(&self, out: &mut Vec<u8>) {
        self.managed_object.encode(out);
        out.put_u32(self.current_time);
        out.put_u16(self.event_type);
        out.put_u16(self.data.len() as u16);
        out.put_slice(&self.data);
    }
}

// ── Actions ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct ActionArgument {
    pub managed_object: ManagedObjectId,
    pub scope: u32,
    pub action_type: u16,
    pub body: ActionBody,
}

/// Action body, selected by the action type.
#[derive(Clone, Debug, PartialEq)]
pub enum ActionBody {
    Poll(PollMdibDataReq),
    PollExt(PollMdibDataReqExt),
    Opaque(Vec<u8>),
}

impl Decode for ActionArgument {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (managed_object, rest) = ManagedObjectId::decode(buf)?;
        let (scope, rest) = read_u32(rest)?;
        let (action_type, rest) = read_u16(rest)?;
        let (length, rest) = read_u16(rest)?;
        let (body, rest) = read_bytes(rest, length as usize)?;
        let body = match action_type {
            NOM_ACT_POLL_MDIB_DATA => ActionBody::Poll(PollMdibDataReq::decode(body)?.0),
            NOM_ACT_POLL_MDIB_DATA_EXT => ActionBody::PollExt(PollMdibDataReqExt::decode(body)?.0),
            _ => ActionBody::Opaque(body.to_vec()),
        };
        Ok((ActionArgument { managed_object, scope, action_type, body }, rest))
    }
}

impl Encode for ActionArgument {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut body = Vec::new();
        match &self.body {
            ActionBody::Poll(v) => v.encode(&mut body),
            ActionBody::PollExt(v) => v.encode(&mut body),
            ActionBody::Opaque(bytes) => body.extend_from_slice(bytes),
        }
        self.managed_object.encode(out);
        out.put_u32(self.scope);
        out.put_u16(self.action_type);
        out.put_u16(body.len() as u16);
        out.put_slice(&body);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActionResult {
    pub managed_object: ManagedObjectId,
    pub action_type: u16,
    pub body: ActionResultBody,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActionResultBody {
    Poll(PollMdibDataReply),
    PollExt(PollMdibDataReplyExt),
    Opaque(Vec<u8>),
}

impl Decode for ActionResult {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (managed_object, rest) = ManagedObjectId::decode(buf)?;
        let (action_type, rest) = read_u16(rest)?;
        let (length, rest) = read_u16(rest)?;
        let (body, rest) = read_bytes(rest, length as usize)?;
        let body = match action_type {
            NOM_ACT_POLL_MDIB_DATA => ActionResultBody::Poll(PollMdibDataReply::decode(body)?.0),
            NOM_ACT_POLL_MDIB_DATA_EXT => {
                ActionResultBody::PollExt(PollMdibDataReplyExt::decode(body)?.0)
            }
            _ => ActionResultBody::Opaque(body.to_vec()),
        };
        Ok((ActionResult { managed_object, action_type, body }, rest))
    }
}

impl Encode for ActionResult {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut body = Vec::new();
        match &self.body {
            ActionResultBody::Poll(v) => v.encode(&mut body),
            ActionResultBody::PollExt(v) => v.encode(&mut body),
            ActionResultBody::Opaque(bytes) => body.extend_from_slice(bytes),
        }
        self.managed_object.encode(out);
        out.put_u16(self.action_type);
        out.put_u16(body.len() as u16);
        out.put_slice(&body);
    }
}

// ── Poll requests and replies ─────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollMdibDataReq {
    pub poll_number: u16,
    pub polled_obj_type: NomType,
    pub polled_attr_grp: u16,
}

impl Decode for PollMdibDataReq {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (poll_number, rest) = read_u16(buf)?;
        let (polled_obj_type, rest) = NomType::decode(rest)?;
        let (polled_attr_grp, rest) = read_u16(rest)?;
        Ok((PollMdibDataReq { poll_number, polled_obj_type, polled_attr_grp }, rest))
    }
}

impl Encode for PollMdibDataReq {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u16(self.poll_number);
        self.polled_obj_type.encode(out);
        out.put_u16(self.polled_attr_grp);
    }
}

/// Extended poll request (PIPG-59); the extension attributes negotiate
/// per-poll behavior and may be empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PollMdibDataReqExt {
    pub poll_number: u16,
    pub polled_obj_type: NomType,
    pub polled_attr_grp: u16,
    pub poll_ext_attr: AttributeList,
}

impl Decode for PollMdibDataReqExt {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (poll_number, rest) = read_u16(buf)?;
        let (polled_obj_type, rest) = NomType::decode(rest)?;
        let (polled_attr_grp, rest) = read_u16(rest)?;
        let (poll_ext_attr, rest) = AttributeList::decode(rest)?;
        Ok((PollMdibDataReqExt { poll_number, polled_obj_type, polled_attr_grp, poll_ext_attr }, rest))
    }
}

impl Encode for PollMdibDataReqExt {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u16(self.poll_number);
        self.polled_obj_type.encode(out);
        out.put_u16(self.polled_attr_grp);
        self.poll_ext_attr.encode(out);
    }
}

/// One polled object: its handle plus observed attributes (PIPG-58).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObservationPoll {
    pub obj_handle: u16,
    pub attributes: AttributeList,
}

impl Decode for ObservationPoll {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (obj_handle, rest) = read_u16(buf)?;
        let (attributes, rest) = AttributeList::decode(rest)?;
        Ok((ObservationPoll { obj_handle, attributes }, rest))
    }
}

impl Encode for ObservationPoll {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u16(self.obj_handle);
        self.attributes.encode(out);
    }
}

/// Observations within one MDS context (PIPG-58).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SingleContextPoll {
    pub context_id: u16,
    pub polls: Vec<ObservationPoll>,
}

impl Decode for SingleContextPoll {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (context_id, rest) = read_u16(buf)?;
        let (count, rest) = read_u16(rest)?;
        let (length, rest) = read_u16(rest)?;
        let (mut body, rest) = read_bytes(rest, length as usize)?;

        let mut polls = Vec::with_capacity(count as usize);
        while !body.is_empty() {
            let (poll, tail) = ObservationPoll::decode(body)?;
            polls.push(poll);
            body = tail;
        }
        if polls.len() != count as usize {
            return Err(WireError::BadLength { declared: count as usize, parsed: polls.len() });
        }
        Ok((SingleContextPoll { context_id, polls }, rest))
    }
}

impl Encode for SingleContextPoll {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut body = Vec::new();
        for poll in &self.polls {
            poll.encode(&mut body);
        }
        out.put_u16(self.context_id);
        out.put_u16(self.polls.len() as u16);
        out.put_u16(body.len() as u16);
        out.put_slice(&body);
    }
}

/// Top-level poll result container (PIPG-57).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PollInfoList {
    pub contexts: Vec<SingleContextPoll>,
}

impl Decode for PollInfoList {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (count, rest) = read_u16(buf)?;
        let (length, rest) = read_u16(rest)?;
        let (mut body, rest) = read_bytes(rest, length as usize)?;

        let mut contexts = Vec::with_capacity(count as usize);
        while !body.is_empty() {
            let (ctx, tail) = SingleContextPoll::decode(body)?;
            contexts.push(ctx);
            body = tail;
        }
        if contexts.len() != count as usize {
            return Err(WireError::BadLength { declared: count as usize, parsed: contexts.len() });
        }
        Ok((PollInfoList { contexts }, rest))
    }
}

impl Encode for PollInfoList {
    fn encode(&self, out: &mut Vec<u8>) {
        let mut body = Vec::new();
        for ctx in &self.contexts {
            ctx.encode(&mut body);
        }
        out.put_u16(self.contexts.len() as u16);
        out.put_u16(body.len() as u16);
        out.put_slice(&body);
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PollMdibDataReply {
    pub poll_number: u16,
    pub rel_time_stamp: u32,
    pub abs_time_stamp: AbsoluteTime,
    pub polled_obj_type: NomType,
    pub polled_attr_grp: u16,
    pub poll_info_list: PollInfoList,
}

impl Decode for PollMdibDataReply {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (poll_number, rest) = read_u16(buf)?;
        let (rel_time_stamp, rest) = read_u32(rest)?;
        let (abs_time_stamp, rest) = AbsoluteTime::decode(rest)?;
        let (polled_obj_type, rest) = NomType::decode(rest)?;
        let (polled_attr_grp, rest) = read_u16(rest)?;
        let (poll_info_list, rest) = PollInfoList::decode(rest)?;
        Ok((
            PollMdibDataReply {
                poll_number,
                rel_time_stamp,
                abs_time_stamp,
                polled_obj_type,
                polled_attr_grp,
                poll_info_list,
            },
            rest,
        ))
    }
}

impl Encode for PollMdibDataReply {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u16(self.poll_number);
        out.put_u32(self.rel_time_stamp);
        self.abs_time_stamp.encode(out);
        self.polled_obj_type.encode(out);
        out.put_u16(self.polled_attr_grp);
        self.poll_info_list.encode(out);
    }
}

/// Extended poll reply (PIPG-62): adds a sequence number for multi-part
/// results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PollMdibDataReplyExt {
    pub poll_number: u16,
    pub sequence_no: u16,
    pub rel_time_stamp: u32,
    pub abs_time_stamp: AbsoluteTime,
    pub polled_obj_type: NomType,
    pub polled_attr_grp: u16,
    pub poll_info_list: PollInfoList,
}

impl Decode for PollMdibDataReplyExt {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (poll_number, rest) = read_u16(buf)?;
        let (sequence_no, rest) = read_u16(rest)?;
        let (rel_time_stamp, rest) = read_u32(rest)?;
        let (abs_time_stamp, rest) = AbsoluteTime::decode(rest)?;
        let (polled_obj_type, rest) = NomType::decode(rest)?;
        let (polled_attr_grp, rest) = read_u16(rest)?;
        let (poll_info_list, rest) = PollInfoList::decode(rest)?;
        Ok((
            PollMdibDataReplyExt {
                poll_number,
                sequence_no,
                rel_time_stamp,
                abs_time_stamp,
                polled_obj_type,
                polled_attr_grp,
                poll_info_list,
            },
            rest,
        ))
    }
}

impl Encode for PollMdibDataReplyExt {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u16(self.poll_number);
        out.put_u16(self.sequence_no);
        out.put_u32(self.rel_time_stamp);
        self.abs_time_stamp.encode(out);
        self.polled_obj_type.encode(out);
        out.put_u16(self.polled_attr_grp);
        self.poll_info_list.encode(out);
    }
}

// ── Top-level parses ──────────────────────────────────────────────────────────

/// A complete data-export datagram.
#[derive(Clone, Debug, PartialEq)]
pub struct DataExportPdu {
    pub sp: SPpdu,
    pub ro: Ro,
}

impl Decode for DataExportPdu {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (sp, rest) = SPpdu::decode(buf)?;
        let (ro, rest) = Ro::decode(rest)?;
        Ok((DataExportPdu { sp, ro }, rest))
    }
}

impl Encode for DataExportPdu {
    fn encode(&self, out: &mut Vec<u8>) {
        self.sp.encode(out);
        self.ro.encode(out);
    }
}

/// A discovery beacon (PIPG-53): the remote-operation chain under a
/// `Nomenclature` prefix instead of an `SPpdu`.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectIndication {
    pub nomenclature: Nomenclature,
    pub ro: Ro,
}

impl ConnectIndication {
    /// The sender's network identity, if the beacon carries one.
    pub fn net_addr_info(&self) -> Option<&IpAddressInfo> {
        let Ro::Invoke(invoke) = &self.ro else { return None };
        let CommandBody::EventReport(report) = &invoke.body else { return None };
        let EventBody::ConnectIndication(attrs) = &report.body else { return None };
        attrs.attributes.iter().find_map(|a| match &a.value {
            AttrValue::NetAddress(info) => Some(info),
            _ => None,
        })
    }
}

impl Decode for ConnectIndication {
    fn decode(buf: &[u8]) -> WireResult<'_, Self> {
        let (nomenclature, rest) = Nomenclature::decode(buf)?;
        let (ro, rest) = Ro::decode(rest)?;
        Ok((ConnectIndication { nomenclature, ro }, rest))
    }
}

impl Encode for ConnectIndication {
    fn encode(&self, out: &mut Vec<u8>) {
        self.nomenclature.encode(out);
        self.ro.encode(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::{Attribute, MacAddr};
    use crate::float::to_bits;
    use crate::nomenclature::{
        NOM_ATTR_GRP_METRIC_VAL_OBS, NOM_ATTR_NET_ADDR_INFO, NOM_ATTR_NU_VAL_OBS,
        NOM_DIM_PERCENT, NOM_MOC_VMO_METRIC_NU, NOM_MOC_VMS_MDS, NOM_PULS_OXIM_SAT_O2,
    };
    use crate::attrs::NuObsValue;
    use std::net::Ipv4Addr;

    fn sample_poll_request() -> DataExportPdu {
        DataExportPdu {
            sp: SPpdu::default(),
            ro: Ro::Invoke(RoInvoke {
                invoke_id: 7,
                command_type: CommandType::ConfirmedAction,
                body: CommandBody::Action(ActionArgument {
                    managed_object: ManagedObjectId::class(NOM_MOC_VMS_MDS),
                    scope: 0,
                    action_type: NOM_ACT_POLL_MDIB_DATA_EXT,
                    body: ActionBody::PollExt(PollMdibDataReqExt {
                        poll_number: 1,
                        polled_obj_type: NomType { partition: 1, code: NOM_MOC_VMO_METRIC_NU },
                        polled_attr_grp: NOM_ATTR_GRP_METRIC_VAL_OBS,
                        poll_ext_attr: AttributeList::default(),
                    }),
                }),
            }),
        }
    }

    fn sample_poll_reply() -> DataExportPdu {
        let nu = NuObsValue {
            physio_id: NOM_PULS_OXIM_SAT_O2,
            state: 0,
            unit_code: NOM_DIM_PERCENT,
            value: to_bits(98, 0),
        };
        DataExportPdu {
            sp: SPpdu::default(),
            ro: Ro::Result(RoResult {
                invoke_id: 7,
                command_type: CommandType::ConfirmedAction,
                body: ResultBody::Action(ActionResult {
                    managed_object: ManagedObjectId::class(NOM_MOC_VMS_MDS),
                    action_type: NOM_ACT_POLL_MDIB_DATA_EXT,
                    body: ActionResultBody::PollExt(PollMdibDataReplyExt {
                        poll_number: 1,
                        sequence_no: 0,
                        rel_time_stamp: 0x1000,
                        abs_time_stamp: AbsoluteTime::default(),
                        polled_obj_type: NomType { partition: 1, code: NOM_MOC_VMO_METRIC_NU },
                        polled_attr_grp: NOM_ATTR_GRP_METRIC_VAL_OBS,
                        poll_info_list: PollInfoList {
                            contexts: vec![SingleContextPoll {
                                context_id: 1,
                                polls: vec![ObservationPoll {
                                    obj_handle: 2,
                                    attributes: AttributeList::new(vec![Attribute {
                                        attribute_id: NOM_ATTR_NU_VAL_OBS,
                                        value: AttrValue::NumericObservation(nu),
                                    }]),
                                }],
                            }],
                        },
                    }),
                }),
            }),
        }
    }

    #[test]
    fn poll_request_round_trip() {
        let pdu = sample_poll_request();
        let bytes = pdu.to_vec();
        assert_eq!(&bytes[..2], &[0xE1, 0x00]);
        let (decoded, rest) = DataExportPdu::decode(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn poll_reply_round_trip_and_lookup() {
        let pdu = sample_poll_reply();
        let bytes = pdu.to_vec();
        let (decoded, rest) = DataExportPdu::decode(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, pdu);

        let list = decoded.ro.poll_info_list().expect("poll reply carries a list");
        assert_eq!(list.contexts.len(), 1);
        assert_eq!(list.contexts[0].polls[0].obj_handle, 2);
    }

    #[test]
    fn mds_create_round_trip() {
        let pdu = DataExportPdu {
            sp: SPpdu::default(),
            ro: Ro::Invoke(RoInvoke {
                invoke_id: 42,
                command_type: CommandType::ConfirmedEventReport,
                body: CommandBody::EventReport(EventReportArgument {
                    managed_object: ManagedObjectId::class(NOM_MOC_VMS_MDS),
                    event_time: 0,
                    event_type: NOM_NOTI_MDS_CREAT,
                    body: EventBody::MdsCreate(MdsCreateInfo::default()),
                }),
            }),
        };
        let bytes = pdu.to_vec();
        let (decoded, rest) = DataExportPdu::decode(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn linked_result_round_trip() {
        let reply = sample_poll_reply();
        let Ro::Result(result) = reply.ro else { unreachable!() };
        let pdu = DataExportPdu {
            sp: SPpdu::default(),
            ro: Ro::LinkedResult(RoLinkedResult {
                linked_id: RorlsId { state: RORLS_LAST, count: 1 },
                invoke_id: result.invoke_id,
                command_type: result.command_type,
                body: result.body,
            }),
        };
        let bytes = pdu.to_vec();
        let (decoded, rest) = DataExportPdu::decode(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, pdu);
        let Ro::LinkedResult(lrs) = &decoded.ro else { panic!() };
        assert!(lrs.linked_id.is_last());
        assert!(decoded.ro.poll_info_list().is_some());
    }

    #[test]
    fn error_round_trip_and_names() {
        let pdu = DataExportPdu {
            sp: SPpdu::default(),
            ro: Ro::Error(RoError { invoke_id: 9, error_value: PROCESSING_FAILURE, data: vec![] }),
        };
        let bytes = pdu.to_vec();
        let (decoded, _) = DataExportPdu::decode(&bytes).unwrap();
        let Ro::Error(err) = &decoded.ro else { panic!() };
        assert_eq!(err.error_name(), "PROCESSING_FAILURE");
        assert_eq!(error_value_name(17), "INVALID_OBJECT_INSTANCE");
        assert_eq!(error_value_name(99), "UNKNOWN_ERROR_VALUE");
    }

    #[test]
    fn connect_indication_round_trip_and_mac() {
        let info = IpAddressInfo {
            mac_address: MacAddr([0x06, 0x08, 0x06, 0x08, 0x00, 0x01]),
            ip_address: Ipv4Addr::new(10, 13, 37, 2),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
        };
        let beacon = ConnectIndication {
            nomenclature: Nomenclature::default(),
            ro: Ro::Invoke(RoInvoke {
                invoke_id: 0,
                command_type: CommandType::EventReport,
                body: CommandBody::EventReport(EventReportArgument {
                    managed_object: ManagedObjectId::class(33),
                    event_time: 0,
                    event_type: NOM_NOTI_CONN_INDIC,
                    body: EventBody::ConnectIndication(AttributeList::new(vec![
                        Attribute::new(0x0920, vec![0x00, 0x03, 0x00, 0x00]),
                        Attribute {
                            attribute_id: NOM_ATTR_NET_ADDR_INFO,
                            value: AttrValue::NetAddress(info),
                        },
                    ])),
                }),
            }),
        };
        let bytes = beacon.to_vec();
        // Vendor framing: magic 0x0000, version 1.0, then ROIV 0x0001.
        assert_eq!(&bytes[..6], &[0x00, 0x00, 0x01, 0x00, 0x00, 0x01]);
        let (decoded, rest) = ConnectIndication::decode(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, beacon);
        assert_eq!(
            decoded.net_addr_info().unwrap().mac_address.to_string(),
            "06:08:06:08:00:01"
        );
    }

    #[test]
    fn unknown_tags_are_errors() {
        // ro_type 4 has no dispatch entry.
        let bytes = [0xE1, 0x00, 0x00, 0x02, 0x00, 0x04, 0x00, 0x00];
        match DataExportPdu::decode(&bytes) {
            Err(WireError::UnknownTag { field: "ro_type", value: 4 }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn envelope_length_is_authoritative() {
        let mut bytes = sample_poll_request().to_vec();
        // Trailing garbage after the envelope is returned, not consumed.
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        let (_, rest) = DataExportPdu::decode(&bytes).unwrap();
        assert_eq!(rest, &[0xAA, 0xBB]);

        // A length pointing past the buffer is a truncation error.
        let truncated = [0xE1, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0xFF];
        assert_eq!(DataExportPdu::decode(&truncated).unwrap_err(), WireError::TruncatedPdu);
    }

    #[test]
    fn poll_info_list_container_laws() {
        let reply = sample_poll_reply();
        let list = reply.ro.poll_info_list().unwrap();
        let bytes = list.to_vec();
        let count = u16::from_be_bytes([bytes[0], bytes[1]]);
        let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        assert_eq!(count as usize, list.contexts.len());
        assert_eq!(length, bytes.len() - 4);

        // Count claiming more contexts than the body holds is rejected.
        let mut broken = bytes.clone();
        broken[1] = 2;
        assert_eq!(
            PollInfoList::decode(&broken).unwrap_err(),
            WireError::BadLength { declared: 2, parsed: 1 }
        );
    }
}
