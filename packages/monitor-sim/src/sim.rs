//! sim.rs — the monitor side of the Data Export exchange.
//!
//! Mirrors what a bedside monitor does on the LAN:
//!   1. Broadcast a connection indication every couple of seconds while
//!      unassociated (from the connection-indication port, like real
//!      hardware — run the sim on a separate host or netns if the
//!      gateway holds that port locally)
//!   2. Accept an inbound association request, then push the MDS-Create
//!      event report
//!   3. Once the gateway confirms the handshake, answer numeric polls
//!      with canned vitals — including one INVALID entry so downstream
//!      filtering gets exercised
//!
//! Send errors are logged and never crash the sim.

use std::net::{Ipv4Addr, SocketAddr};

use chrono::{Datelike, Timelike, Utc};
use intellivue_proto::assoc::{AssociationMessage, SessionHeaderKind};
use intellivue_proto::attrs::{
    AbsoluteTime, Attribute, AttributeList, AttrValue, IpAddressInfo, ManagedObjectId, NuObsValue,
};
use intellivue_proto::float::to_bits;
use intellivue_proto::nomenclature::{
    INVALID, NOM_ATTR_NET_ADDR_INFO, NOM_ATTR_NU_VAL_OBS, NOM_DIM_BEAT_PER_MIN, NOM_DIM_PERCENT,
    NOM_DIM_RESP_PER_MIN, NOM_MOC_VMS_MDS, NOM_NOTI_CONN_INDIC, NOM_NOTI_MDS_CREAT,
    NOM_PLETH_PULS_RATE, NOM_PULS_OXIM_SAT_O2, NOM_RESP_RATE,
};
use intellivue_proto::pdu::{
    ActionResult, ActionResultBody, CommandBody, CommandType, ConnectIndication, DataExportPdu,
    EventBody, EventReportArgument, MdsCreateInfo, Nomenclature, ObservationPoll,
    PollMdibDataReplyExt, PollInfoList, Ro, RoInvoke, RoResult, ResultBody, SingleContextPoll,
};
use intellivue_proto::{Decode, Encode, MacAddr};
use rand::Rng;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Hardware address this monitor announces itself under.
    pub mac: MacAddr,
    /// Address advertised in the beacon's network info.
    pub ip: Ipv4Addr,
    /// Where beacons go (gateway host, connection-indication port).
    pub beacon_dest: SocketAddr,
    /// Baseline vitals; each poll reply jitters them slightly.
    pub spo2_pct: i32,
    pub pulse_bpm: i32,
    pub resp_rpm_x10: i32,
}

/// Session state of the fake monitor. Holds no sockets so the whole
/// exchange is testable as bytes-in, bytes-out.
pub struct SimState {
    config: SimConfig,
    associated: bool,
    connected: bool,
    rel_time: u32,
}

impl SimState {
    pub fn new(config: SimConfig) -> Self {
        SimState { config, associated: false, connected: false, rel_time: 0 }
    }

    pub fn associated(&self) -> bool {
        self.associated
    }

    #[cfg(test)]
    fn connected(&self) -> bool {
        self.connected
    }

    /// Beacon datagram announcing this monitor.
    pub fn beacon(&self) -> Vec<u8> {
        ConnectIndication {
            nomenclature: Nomenclature::default(),
            ro: Ro::Invoke(RoInvoke {
                invoke_id: 0,
                command_type: CommandType::EventReport,
                body: CommandBody::EventReport(EventReportArgument {
                    managed_object: ManagedObjectId::class(NOM_MOC_VMS_MDS),
                    event_time: self.rel_time,
                    event_type: NOM_NOTI_CONN_INDIC,
                    body: EventBody::ConnectIndication(AttributeList::new(vec![Attribute {
                        attribute_id: NOM_ATTR_NET_ADDR_INFO,
                        value: AttrValue::NetAddress(IpAddressInfo {
                            mac_address: self.config.mac,
                            ip_address: self.config.ip,
                            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
                        }),
                    }])),
                }),
            }),
        }
        .to_vec()
    }

    /// Feed one inbound datagram; returns the datagrams to send back.
    pub fn handle(&mut self, data: &[u8], src: SocketAddr) -> Vec<(Vec<u8>, SocketAddr)> {
        self.rel_time = self.rel_time.wrapping_add(0x100);
        if data.starts_with(&[0xE1, 0x00]) {
            self.handle_protocol(data, src)
        } else {
            self.handle_association(data, src)
        }
    }

    fn handle_association(&mut self, data: &[u8], src: SocketAddr) -> Vec<(Vec<u8>, SocketAddr)> {
        let message = match AssociationMessage::decode(data) {
            Ok((message, _)) => message,
            Err(e) => {
                warn!(%src, "ignoring malformed association message: {e}");
                return Vec::new();
            }
        };
        match message.kind {
            SessionHeaderKind::Connect => {
                info!(%src, "association request, accepting");
                self.associated = true;
                let accept =
                    AssociationMessage { kind: SessionHeaderKind::Accept, payload: Vec::new() }
                        .to_vec();
                vec![(accept, src), (self.mds_create_report(), src)]
            }
            SessionHeaderKind::Finish => {
                info!(%src, "release request, disconnecting");
                self.associated = false;
                self.connected = false;
                let disconnect =
                    AssociationMessage { kind: SessionHeaderKind::Disconnect, payload: Vec::new() }
                        .to_vec();
                vec![(disconnect, src)]
            }
            kind => {
                debug!(%src, ?kind, "ignoring association message");
                Vec::new()
            }
        }
    }

    fn handle_protocol(&mut self, data: &[u8], src: SocketAddr) -> Vec<(Vec<u8>, SocketAddr)> {
        let pdu = match DataExportPdu::decode(data) {
            Ok((pdu, _)) => pdu,
            Err(e) => {
                warn!(%src, "ignoring malformed protocol message: {e}");
                return Vec::new();
            }
        };
        match &pdu.ro {
            Ro::Result(result) if result.command_type == CommandType::ConfirmedEventReport => {
                info!(%src, "handshake confirmed, ready to be polled");
                self.connected = true;
                Vec::new()
            }
            Ro::Invoke(invoke) if invoke.command_type == CommandType::ConfirmedAction => {
                if !self.connected {
                    warn!(%src, "poll before handshake completion, ignoring");
                    return Vec::new();
                }
                let CommandBody::Action(action) = &invoke.body else {
                    return Vec::new();
                };
                let poll_number = match &action.body {
                    intellivue_proto::pdu::ActionBody::PollExt(req) => req.poll_number,
                    intellivue_proto::pdu::ActionBody::Poll(req) => req.poll_number,
                    intellivue_proto::pdu::ActionBody::Opaque(_) => 0,
                };
                debug!(%src, invoke_id = invoke.invoke_id, "poll, replying with vitals");
                vec![(
                    self.poll_reply(invoke.invoke_id, action.action_type, poll_number),
                    src,
                )]
            }
            _ => {
                debug!(%src, "ignoring protocol message");
                Vec::new()
            }
        }
    }

    /// The unsolicited MDS-Create event report that completes discovery.
    fn mds_create_report(&self) -> Vec<u8> {
        DataExportPdu {
            sp: Default::default(),
            ro: Ro::Invoke(RoInvoke {
                invoke_id: 1,
                command_type: CommandType::ConfirmedEventReport,
                body: CommandBody::EventReport(EventReportArgument {
                    managed_object: ManagedObjectId::class(NOM_MOC_VMS_MDS),
                    event_time: self.rel_time,
                    event_type: NOM_NOTI_MDS_CREAT,
                    body: EventBody::MdsCreate(MdsCreateInfo::default()),
                }),
            }),
        }
        .to_vec()
    }

    /// Poll reply carrying one context of numerics; the last entry is
    /// flagged INVALID on purpose.
    pub fn poll_reply(&self, invoke_id: u16, action_type: u16, poll_number: u16) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        let spo2 = self.config.spo2_pct + rng.gen_range(-1..=0);
        let pulse = self.config.pulse_bpm + rng.gen_range(-3..=3);
        let resp = self.config.resp_rpm_x10 + rng.gen_range(-5..=5);

        let observations = vec![
            numeric(NOM_PULS_OXIM_SAT_O2, 0, NOM_DIM_PERCENT, to_bits(spo2, 0)),
            numeric(NOM_PLETH_PULS_RATE, 0, NOM_DIM_BEAT_PER_MIN, to_bits(pulse, 0)),
            numeric(NOM_RESP_RATE, 0, NOM_DIM_RESP_PER_MIN, to_bits(resp, -1)),
            // A lead-off sensor: present in the MDIB but not measuring.
            numeric(NOM_PULS_OXIM_SAT_O2, INVALID, NOM_DIM_PERCENT, to_bits(0, 0)),
        ];

        DataExportPdu {
            sp: Default::default(),
            ro: Ro::Result(RoResult {
                invoke_id,
                command_type: CommandType::ConfirmedAction,
                body: ResultBody::Action(ActionResult {
                    managed_object: ManagedObjectId::class(NOM_MOC_VMS_MDS),
                    action_type,
                    body: ActionResultBody::PollExt(PollMdibDataReplyExt {
                        poll_number,
                        sequence_no: 0,
                        rel_time_stamp: self.rel_time,
                        abs_time_stamp: absolute_time_now(),
                        polled_obj_type: Default::default(),
                        polled_attr_grp: 0,
                        poll_info_list: PollInfoList {
                            contexts: vec![SingleContextPoll {
                                context_id: 1,
                                polls: vec![ObservationPoll {
                                    obj_handle: 2,
                                    attributes: AttributeList::new(observations),
                                }],
                            }],
                        },
                    }),
                }),
            }),
        }
        .to_vec()
    }
}

fn numeric(physio_id: u16, state: u16, unit_code: u16, value: u32) -> Attribute {
    Attribute {
        attribute_id: NOM_ATTR_NU_VAL_OBS,
        value: AttrValue::NumericObservation(NuObsValue { physio_id, state, unit_code, value }),
    }
}

fn absolute_time_now() -> AbsoluteTime {
    let now = Utc::now();
    AbsoluteTime {
        century: (now.year() / 100) as u8,
        year: (now.year() % 100) as u8,
        month: now.month() as u8,
        day: now.day() as u8,
        hour: now.hour() as u8,
        minute: now.minute() as u8,
        second: now.second() as u8,
        sec_fractions: (now.timestamp_subsec_millis() / 10) as u8,
    }
}

/// Bind the protocol and beacon sockets and run until cancelled.
pub async fn run_monitor_sim(
    config: SimConfig,
    listen: SocketAddr,
    beacon_bind: SocketAddr,
    beacon_interval: std::time::Duration,
) -> anyhow::Result<()> {
    let socket = tokio::net::UdpSocket::bind(listen).await?;
    info!("monitor {} listening on {listen}", config.mac);

    // Real monitors source their connection indications from the
    // connection-indication port; a gateway on the same host already
    // holds it, in which case discovery needs a second machine.
    let beacon_socket = match tokio::net::UdpSocket::bind(beacon_bind).await {
        Ok(socket) => {
            socket.set_broadcast(true)?;
            Some(socket)
        }
        Err(e) => {
            warn!("could not bind beacon port {beacon_bind}: {e} — beacons disabled");
            None
        }
    };

    let beacon_dest = config.beacon_dest;
    let mut sim = SimState::new(config);
    let mut ticker = tokio::time::interval(beacon_interval);
    let mut buf = vec![0u8; 8192];

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if sim.associated() {
                    continue;
                }
                if let Some(beacon_socket) = &beacon_socket {
                    debug!("broadcasting connection indication to {beacon_dest}");
                    if let Err(e) = beacon_socket.send_to(&sim.beacon(), beacon_dest).await {
                        warn!("beacon send failed: {e}");
                    }
                }
            }
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, src)) => {
                        let replies = sim.handle(&buf[..len], src);
                        for (data, dest) in replies {
                            if let Err(e) = socket.send_to(&data, dest).await {
                                warn!(%dest, "send failed: {e}");
                            }
                        }
                    }
                    Err(e) => {
                        warn!("UDP recv error: {e}");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intellivue_proto::assoc::association_request;
    use intellivue_proto::pdu::EventReportResult;
    use std::net::IpAddr;

    fn test_config() -> SimConfig {
        SimConfig {
            mac: MacAddr([0x06, 0x08, 0x06, 0x08, 0x00, 0x01]),
            ip: Ipv4Addr::new(127, 0, 0, 1),
            beacon_dest: "127.0.0.1:24005".parse().unwrap(),
            spo2_pct: 98,
            pulse_bpm: 72,
            resp_rpm_x10: 125,
        }
    }

    fn gateway_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::from(Ipv4Addr::new(127, 0, 0, 1)), 45000)
    }

    #[test]
    fn beacon_carries_our_mac() {
        let sim = SimState::new(test_config());
        let (beacon, _) = ConnectIndication::decode(&sim.beacon()).unwrap();
        assert_eq!(beacon.net_addr_info().unwrap().mac_address, test_config().mac);
    }

    #[test]
    fn association_request_is_accepted_and_followed_by_mds_create() {
        let mut sim = SimState::new(test_config());
        let replies = sim.handle(&association_request(), gateway_addr());
        assert!(sim.associated());
        assert_eq!(replies.len(), 2);

        let (accept, _) = AssociationMessage::decode(&replies[0].0).unwrap();
        assert_eq!(accept.kind, SessionHeaderKind::Accept);

        let (report, _) = DataExportPdu::decode(&replies[1].0).unwrap();
        let Ro::Invoke(invoke) = &report.ro else { panic!() };
        assert_eq!(invoke.command_type, CommandType::ConfirmedEventReport);

        // The gateway's confirmation completes the handshake.
        let confirmation = DataExportPdu {
            sp: Default::default(),
            ro: Ro::Result(RoResult {
                invoke_id: invoke.invoke_id,
                command_type: CommandType::ConfirmedEventReport,
                body: ResultBody::EventReport(EventReportResult {
                    managed_object: ManagedObjectId::class(NOM_MOC_VMS_MDS),
                    current_time: 0,
                    event_type: NOM_NOTI_MDS_CREAT,
                    data: Vec::new(),
                }),
            }),
        }
        .to_vec();
        sim.handle(&confirmation, gateway_addr());
        assert!(sim.connected());
    }

    #[test]
    fn poll_is_answered_with_vitals() {
        let mut sim = SimState::new(test_config());
        let reply = sim.poll_reply(7, intellivue_proto::nomenclature::NOM_ACT_POLL_MDIB_DATA_EXT, 3);
        let (pdu, _) = DataExportPdu::decode(&reply).unwrap();
        assert_eq!(pdu.ro.invoke_id(), 7);

        let list = pdu.ro.poll_info_list().expect("reply carries observations");
        let attrs = &list.contexts[0].polls[0].attributes.attributes;
        assert_eq!(attrs.len(), 4);

        let valid: Vec<_> = attrs
            .iter()
            .filter_map(|a| match &a.value {
                AttrValue::NumericObservation(nu) if nu.measurement_is_valid() => Some(nu),
                _ => None,
            })
            .collect();
        assert_eq!(valid.len(), 3);
    }

    #[test]
    fn release_tears_the_association_down() {
        let mut sim = SimState::new(test_config());
        sim.handle(&association_request(), gateway_addr());
        assert!(sim.associated());

        let replies = sim.handle(&intellivue_proto::assoc::RELEASE_REQUEST, gateway_addr());
        assert!(!sim.associated());
        let (disconnect, _) = AssociationMessage::decode(&replies[0].0).unwrap();
        assert_eq!(disconnect.kind, SessionHeaderKind::Disconnect);
    }
}
