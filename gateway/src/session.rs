//! # session
//!
//! Per-monitor protocol sessions over UDP.
//!
//! Monitors broadcast connection indications on port 24005; the engine
//! answers with an association request to port 24105, completes the
//! MDS-Create handshake, and from then on polls every connected monitor
//! for numeric observations on a fixed cadence. One socket bound to the
//! connection-indication port carries all traffic; the sender's port
//! tells beacons apart from protocol messages, and the leading two bytes
//! tell data-export PDUs (0xE100) apart from association control.
//!
//! ## Invariants
//! - datagram handling never crashes the gateway: every parse failure is
//!   a warning plus a drop, with session state untouched
//! - per monitor, transitions are totally ordered: the engine runs as a
//!   single task, alternating between inbound datagrams and poll ticks
//! - every confirmed invocation carries a fresh invoke id; replies must
//!   match an outstanding id or they are dropped

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use chrono::{DateTime, Utc};
use intellivue_proto::assoc::{association_request, AssociationMessage, SessionHeaderKind, RELEASE_REQUEST};
use intellivue_proto::attrs::{AttributeList, ManagedObjectId, NomType};
use intellivue_proto::nomenclature::{
    Partition, NOM_ACT_POLL_MDIB_DATA_EXT, NOM_ATTR_GRP_METRIC_VAL_OBS, NOM_MOC_VMO_METRIC_NU,
    NOM_MOC_VMS_MDS, NOM_NOTI_MDS_CREAT,
};
use intellivue_proto::pdu::{
    ActionArgument, ActionBody, CommandBody, CommandType, ConnectIndication, DataExportPdu,
    EventReportResult, PollInfoList, PollMdibDataReqExt, ResultBody, Ro, RoInvoke, RoResult,
};
use intellivue_proto::{Decode, Encode, MacAddr, PORT_CONNECTION_INDICATION, PORT_PROTOCOL};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::capture::CaptureSink;
use crate::dispatch;
use crate::state::{Monitor, SharedMonitors, SharedSubscriptions};

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cadence of the poll-all-connected-hosts tick (default 2 s).
    pub poll_interval: Duration,
    /// Demote a session to Discovered after this long without traffic
    /// (default 30 s); the next beacon re-associates.
    pub stale_after: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(
                std::env::var("POLL_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(2),
            ),
            stale_after: Duration::from_secs(
                std::env::var("STALE_AFTER_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(30),
            ),
        }
    }
}

// ── Session state machine ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Beacon seen, no association yet.
    Discovered,
    /// Association request sent, waiting for the session accept.
    Associating,
    /// Association accepted, waiting for the MDS-Create event.
    Associated,
    /// Handshake complete; this host is polled every tick.
    Connected,
}

#[derive(Debug)]
struct Session {
    state: SessionState,
    next_invoke_id: u16,
    /// Invoke ids of confirmed actions still awaiting a reply.
    pending_polls: HashSet<u16>,
    last_heard: DateTime<Utc>,
}

impl Session {
    fn new(now: DateTime<Utc>) -> Self {
        Session {
            state: SessionState::Discovered,
            next_invoke_id: 0,
            pending_polls: HashSet::new(),
            last_heard: now,
        }
    }

    fn reset(&mut self, now: DateTime<Utc>) {
        self.state = SessionState::Discovered;
        self.pending_polls.clear();
        self.last_heard = now;
    }

    fn take_invoke_id(&mut self) -> u16 {
        let id = self.next_invoke_id;
        self.next_invoke_id = self.next_invoke_id.wrapping_add(1);
        id
    }
}

/// A datagram the engine wants on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub data: Vec<u8>,
    pub dest: SocketAddr,
}

/// Result of feeding one datagram through the engine.
#[derive(Debug, Default)]
pub struct EngineOutput {
    pub outbound: Vec<Outbound>,
    /// Decoded poll reply to hand to the dispatcher, keyed by the
    /// monitor's MAC.
    pub poll_reply: Option<(MacAddr, PollInfoList)>,
}

pub struct SessionEngine {
    config: EngineConfig,
    sessions: HashMap<IpAddr, Session>,
    /// DIY ARP: monitors are identified by MAC, but datagrams arrive by
    /// IP. Refreshed on every beacon.
    host_to_mac: HashMap<IpAddr, MacAddr>,
    monitors: SharedMonitors,
}

impl SessionEngine {
    pub fn new(config: EngineConfig, monitors: SharedMonitors) -> Self {
        SessionEngine { config, sessions: HashMap::new(), host_to_mac: HashMap::new(), monitors }
    }

    #[cfg(test)]
    fn session_state(&self, host: IpAddr) -> Option<SessionState> {
        self.sessions.get(&host).map(|s| s.state)
    }

    /// Handle one inbound datagram. Never fails: malformed input is
    /// logged and dropped with state preserved.
    pub async fn handle_datagram(
        &mut self,
        data: &[u8],
        src: SocketAddr,
        now: DateTime<Utc>,
    ) -> EngineOutput {
        if src.port() == PORT_CONNECTION_INDICATION {
            self.handle_beacon(data, src, now).await
        } else if data.starts_with(&[0xE1, 0x00]) {
            self.handle_data_export(data, src, now)
        } else {
            self.handle_association(data, src, now)
        }
    }

    async fn handle_beacon(
        &mut self,
        data: &[u8],
        src: SocketAddr,
        now: DateTime<Utc>,
    ) -> EngineOutput {
        let mut output = EngineOutput::default();

        let beacon = match ConnectIndication::decode(data) {
            Ok((beacon, _)) => beacon,
            Err(e) => {
                warn!(%src, "dropping malformed beacon: {e}");
                return output;
            }
        };
        let Some(info) = beacon.net_addr_info() else {
            warn!(%src, "beacon carries no network address info, dropping");
            return output;
        };

        let mac = info.mac_address;
        let host = src.ip();
        debug!(%src, monitor = %mac, "connection indication");

        self.host_to_mac.insert(host, mac);
        self.monitors.write().await.insert(
            mac,
            Monitor { mac_address: mac, host, port: src.port(), last_seen: now },
        );

        let session = self.sessions.entry(host).or_insert_with(|| Session::new(now));
        session.last_heard = now;
        if session.state == SessionState::Discovered {
            info!(monitor = %mac, %host, "initiating association");
            session.state = SessionState::Associating;
            output.outbound.push(Outbound {
                data: association_request(),
                dest: SocketAddr::new(host, PORT_PROTOCOL),
            });
        }
        output
    }

    fn handle_association(
        &mut self,
        data: &[u8],
        src: SocketAddr,
        now: DateTime<Utc>,
    ) -> EngineOutput {
        let output = EngineOutput::default();
        let host = src.ip();

        let message = match AssociationMessage::decode(data) {
            Ok((message, _)) => message,
            Err(e) => {
                warn!(%src, "dropping malformed association message: {e}");
                return output;
            }
        };

        let Some(session) = self.sessions.get_mut(&host) else {
            warn!(%host, kind = ?message.kind, "association message from unknown host");
            return output;
        };
        session.last_heard = now;

        match message.kind {
            SessionHeaderKind::Accept => {
                if session.state == SessionState::Associating {
                    info!(%host, "association accepted");
                    session.state = SessionState::Associated;
                } else {
                    warn!(%host, state = ?session.state, "unexpected session accept");
                }
            }
            SessionHeaderKind::Refuse
            | SessionHeaderKind::Finish
            | SessionHeaderKind::Disconnect
            | SessionHeaderKind::Abort => {
                info!(%host, kind = ?message.kind, "association dropped by peer");
                session.reset(now);
            }
            SessionHeaderKind::Connect => {
                warn!(%host, "unexpected association request from monitor");
            }
        }
        output
    }

    fn handle_data_export(
        &mut self,
        data: &[u8],
        src: SocketAddr,
        now: DateTime<Utc>,
    ) -> EngineOutput {
        let mut output = EngineOutput::default();
        let host = src.ip();

        let pdu = match DataExportPdu::decode(data) {
            Ok((pdu, _)) => pdu,
            Err(e) => {
                warn!(%src, "dropping malformed protocol message: {e}");
                return output;
            }
        };

        let session = self.sessions.entry(host).or_insert_with(|| Session::new(now));
        session.last_heard = now;

        match &pdu.ro {
            Ro::Invoke(invoke) => {
                if invoke.command_type == CommandType::ConfirmedEventReport {
                    if let CommandBody::EventReport(report) = &invoke.body {
                        info!(%host, invoke_id = invoke.invoke_id, "MDS-Create event, completing handshake");
                        output.outbound.push(Outbound {
                            data: mds_create_result(invoke.invoke_id, report.managed_object).to_vec(),
                            dest: src,
                        });
                        session.state = SessionState::Connected;
                        return output;
                    }
                }
                warn!(%host, command = ?invoke.command_type, "unhandled invocation");
            }
            Ro::Result(result) => {
                if !session.pending_polls.remove(&result.invoke_id) {
                    warn!(%host, invoke_id = result.invoke_id, "unmatched result, dropping");
                    return output;
                }
                output.poll_reply = self.poll_reply_for(host, &pdu);
            }
            Ro::LinkedResult(linked) => {
                if !session.pending_polls.contains(&linked.invoke_id) {
                    warn!(%host, invoke_id = linked.invoke_id, "unmatched linked result, dropping");
                    return output;
                }
                // Chunks dispatch as they arrive; the id stays
                // outstanding until the terminal chunk.
                if linked.linked_id.is_last() {
                    session.pending_polls.remove(&linked.invoke_id);
                }
                output.poll_reply = self.poll_reply_for(host, &pdu);
            }
            Ro::Error(error) => {
                // A single failed action does not cost the association.
                session.pending_polls.remove(&error.invoke_id);
                warn!(
                    %host,
                    invoke_id = error.invoke_id,
                    error = error.error_name(),
                    "remote operation error"
                );
            }
        }
        output
    }

    fn poll_reply_for(&self, host: IpAddr, pdu: &DataExportPdu) -> Option<(MacAddr, PollInfoList)> {
        let list = pdu.ro.poll_info_list()?;
        match self.host_to_mac.get(&host) {
            Some(mac) => Some((*mac, list.clone())),
            None => {
                warn!(%host, "poll reply from host with no known MAC, dropping");
                None
            }
        }
    }

    /// Periodic tick: demote stale sessions, then emit one numerics poll
    /// per connected host.
    pub fn poll_tick(&mut self, now: DateTime<Utc>) -> Vec<Outbound> {
        let stale_after =
            chrono::Duration::from_std(self.config.stale_after).unwrap_or(chrono::Duration::seconds(30));

        let mut outbound = Vec::new();
        for (host, session) in self.sessions.iter_mut() {
            if session.state != SessionState::Discovered && now - session.last_heard > stale_after {
                warn!(%host, state = ?session.state, "session stale, awaiting rediscovery");
                session.reset(now);
                continue;
            }
            if session.state != SessionState::Connected {
                continue;
            }
            let invoke_id = session.take_invoke_id();
            session.pending_polls.insert(invoke_id);
            debug!(%host, invoke_id, "polling for numerics");
            outbound.push(Outbound {
                data: poll_numerics_request(invoke_id).to_vec(),
                dest: SocketAddr::new(*host, PORT_PROTOCOL),
            });
        }
        outbound
    }

    /// Release every active association, e.g. at shutdown.
    pub fn release_all(&mut self, now: DateTime<Utc>) -> Vec<Outbound> {
        let mut outbound = Vec::new();
        for (host, session) in self.sessions.iter_mut() {
            if matches!(session.state, SessionState::Associated | SessionState::Connected) {
                outbound.push(Outbound {
                    data: RELEASE_REQUEST.to_vec(),
                    dest: SocketAddr::new(*host, PORT_PROTOCOL),
                });
                session.reset(now);
            }
        }
        outbound
    }
}

// ── PDU builders ──────────────────────────────────────────────────────────────

/// Reply completing the MDS-Create handshake (PIPG-55): echoes the
/// invoke id and managed object.
fn mds_create_result(invoke_id: u16, managed_object: ManagedObjectId) -> DataExportPdu {
    DataExportPdu {
        sp: Default::default(),
        ro: Ro::Result(RoResult {
            invoke_id,
            command_type: CommandType::ConfirmedEventReport,
            body: ResultBody::EventReport(EventReportResult {
                managed_object,
                current_time: 0,
                event_type: NOM_NOTI_MDS_CREAT,
                data: Vec::new(),
            }),
        }),
    }
}

/// Confirmed action polling the numerics attribute group of the MDS
/// (PIPG-55): numbers about the attached patient.
fn poll_numerics_request(invoke_id: u16) -> DataExportPdu {
    DataExportPdu {
        sp: Default::default(),
        ro: Ro::Invoke(RoInvoke {
            invoke_id,
            command_type: CommandType::ConfirmedAction,
            body: CommandBody::Action(ActionArgument {
                managed_object: ManagedObjectId::class(NOM_MOC_VMS_MDS),
                scope: 0,
                action_type: NOM_ACT_POLL_MDIB_DATA_EXT,
                body: ActionBody::PollExt(PollMdibDataReqExt {
                    poll_number: invoke_id,
                    polled_obj_type: NomType {
                        partition: Partition::Object as u16,
                        code: NOM_MOC_VMO_METRIC_NU,
                    },
                    polled_attr_grp: NOM_ATTR_GRP_METRIC_VAL_OBS,
                    poll_ext_attr: AttributeList::default(),
                }),
            }),
        }),
    }
}

// ── Socket runner ─────────────────────────────────────────────────────────────

/// Bind the protocol socket and run the engine until shutdown.
///
/// Inbound datagrams and the poll tick are serialized through this one
/// task; only webhook deliveries run concurrently. A bind failure is
/// fatal; everything after that is log-and-continue.
pub async fn run_session_engine(
    config: EngineConfig,
    monitors: SharedMonitors,
    subscriptions: SharedSubscriptions,
    mut capture: CaptureSink,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", PORT_CONNECTION_INDICATION)).await?;
    socket.set_broadcast(true)?;
    info!("session engine listening on UDP {PORT_CONNECTION_INDICATION}");

    let client = reqwest::Client::builder().timeout(dispatch::WEBHOOK_TIMEOUT).build()?;
    let mut engine = SessionEngine::new(config.clone(), monitors);
    let mut ticker = tokio::time::interval(config.poll_interval);
    let mut buf = vec![0u8; 8192];

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, src)) => {
                        let data = &buf[..len];
                        capture.append(data).await;
                        let output = engine.handle_datagram(data, src, Utc::now()).await;
                        send_all(&socket, &mut capture, output.outbound).await;
                        if let Some((mac, list)) = output.poll_reply {
                            dispatch::publish(&client, &subscriptions, mac, &list).await;
                        }
                    }
                    Err(e) => {
                        // Never crash — log and continue
                        warn!("UDP recv error: {e}");
                    }
                }
            }
            _ = ticker.tick() => {
                let outbound = engine.poll_tick(Utc::now());
                send_all(&socket, &mut capture, outbound).await;
            }
            _ = shutdown.recv() => {
                info!("releasing associations before shutdown");
                let outbound = engine.release_all(Utc::now());
                send_all(&socket, &mut capture, outbound).await;
                return Ok(());
            }
        }
    }
}

async fn send_all(socket: &UdpSocket, capture: &mut CaptureSink, outbound: Vec<Outbound>) {
    for out in outbound {
        capture.append(&out.data).await;
        if let Err(e) = socket.send_to(&out.data, out.dest).await {
            warn!(dest = %out.dest, "UDP send failed: {e}");
        }
    }
}
